//! Clear command validation.
//!
//! Clears require the image to be declared in `TRANSFER_DST_OPTIMAL`,
//! `GENERAL` or the shared-present layout, and the declaration must agree
//! with the tracked model. Like the transfer commands, a clear binds the
//! first touch of the affected ranges to the declared layout.

use super::{report_mismatches, report_range_error};
use crate::{command_buffer::CommandBufferState, device::DeviceState, diagnostics::ObjectInfo};
use ash::vk;

const VUID_CLEAR_COLOR_LAYOUT_MATCH: &str = "VUID-vkCmdClearColorImage-imageLayout-00004";
const VUID_CLEAR_COLOR_LAYOUT_SET: &str = "VUID-vkCmdClearColorImage-imageLayout-00005";
const VUID_CLEAR_DS_LAYOUT_MATCH: &str = "VUID-vkCmdClearDepthStencilImage-imageLayout-00011";
const VUID_CLEAR_DS_LAYOUT_SET: &str = "VUID-vkCmdClearDepthStencilImage-imageLayout-00012";
const VUID_SUBRESOURCE: &str = "UNASSIGNED-clear-subresource-range";

fn is_clear_layout(layout: vk::ImageLayout) -> bool {
    matches!(
        layout,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
            | vk::ImageLayout::GENERAL
            | vk::ImageLayout::SHARED_PRESENT_KHR
    )
}

fn validate_clear(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    command: &str,
    image: vk::Image,
    declared: vk::ImageLayout,
    ranges: &[vk::ImageSubresourceRange],
    match_vuid: &'static str,
    set_vuid: &'static str,
) -> bool {
    if !device.checks.image_layout {
        return false;
    }

    let Some(image_state) = device.images.get(image) else {
        return false;
    };

    let mut bad = false;

    if !is_clear_layout(declared) {
        device.report(
            &[
                ObjectInfo::command_buffer(cb.handle()),
                ObjectInfo::image(image),
            ],
            set_vuid,
            &format!(
                "{}: declared layout {:?} is not one of the layouts this command permits",
                command, declared,
            ),
        );
        bad = true;
    }

    for raw_range in ranges {
        let range = match image_state.normalize_range(raw_range) {
            Ok(range) => range,
            Err(error) => {
                bad |= report_range_error(device, cb, image, command, &error, VUID_SUBRESOURCE);
                continue;
            }
        };

        if range.is_empty() {
            continue;
        }

        let mismatches = cb
            .tracker
            .validate(&image_state, &range, range.aspects, declared);
        bad |= report_mismatches(
            device,
            cb,
            &image_state,
            command,
            &mismatches,
            match_vuid,
            match_vuid,
        );

        cb.tracker
            .set_initial_layout(&image_state, &range, declared);
    }

    bad
}

/// Validates a `vkCmdClearColorImage` call. Returns whether any problem was
/// found.
pub fn cmd_clear_color_image(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    image: vk::Image,
    layout: vk::ImageLayout,
    ranges: &[vk::ImageSubresourceRange],
) -> bool {
    validate_clear(
        device,
        cb,
        "vkCmdClearColorImage",
        image,
        layout,
        ranges,
        VUID_CLEAR_COLOR_LAYOUT_MATCH,
        VUID_CLEAR_COLOR_LAYOUT_SET,
    )
}

/// Validates a `vkCmdClearDepthStencilImage` call.
pub fn cmd_clear_depth_stencil_image(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    image: vk::Image,
    layout: vk::ImageLayout,
    ranges: &[vk::ImageSubresourceRange],
) -> bool {
    validate_clear(
        device,
        cb,
        "vkCmdClearDepthStencilImage",
        image,
        layout,
        ranges,
        VUID_CLEAR_DS_LAYOUT_MATCH,
        VUID_CLEAR_DS_LAYOUT_SET,
    )
}
