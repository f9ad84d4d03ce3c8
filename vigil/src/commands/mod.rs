//! Per-command validation entry points.
//!
//! Every entry point takes the device state and the recording command
//! buffer, validates the command against the layout model, records the
//! command's effect into the tracker, and returns whether any problem was
//! found. The model is updated even when the command was flagged: the
//! tracker always reflects what the application declared, so subsequent
//! commands are validated against a consistent history.

use crate::{
    command_buffer::CommandBufferState,
    device::DeviceState,
    diagnostics::ObjectInfo,
    image::ImageState,
    layout::{required_format_features, required_usage},
    subresource::{NormalizedSubresourceRange, RangeError},
    tracker::{LayoutMismatch, MismatchKind},
};
use ash::vk;
use smallvec::SmallVec;
use std::sync::Arc;

pub mod clear;
pub mod render_pass;
pub mod secondary;
pub mod sync;
pub mod transfer;

/// Splits a range into per-aspect parts when the device validates depth and
/// stencil independently; otherwise the range is checked as a unit with its
/// combined aspect mask.
pub(crate) fn comparison_parts(
    device: &DeviceState,
    range: &NormalizedSubresourceRange,
) -> SmallVec<[(NormalizedSubresourceRange, vk::ImageAspectFlags); 2]> {
    let depth_stencil = vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL;

    if range.aspects == depth_stencil && device.features.separate_depth_stencil_layouts {
        // Walk every possible aspect bit and keep the set ones.
        (0..u32::BITS)
            .map(|bit| vk::ImageAspectFlags::from_raw(1u32 << bit))
            .filter(|&aspect| range.aspects.contains(aspect))
            .map(|aspect| {
                (
                    NormalizedSubresourceRange {
                        aspects: aspect,
                        ..range.clone()
                    },
                    aspect,
                )
            })
            .collect()
    } else {
        let mut parts = SmallVec::new();
        parts.push((range.clone(), range.aspects));
        parts
    }
}

/// Reports one diagnostic per mismatch, choosing the rule identifier by
/// whether the mismatch was against a layout this command buffer recorded or
/// against the prior submissions' ground truth.
pub(crate) fn report_mismatches(
    device: &DeviceState,
    cb: &CommandBufferState,
    image: &Arc<ImageState>,
    command: &str,
    mismatches: &[LayoutMismatch],
    current_vuid: &str,
    initial_vuid: &str,
) -> bool {
    for mismatch in mismatches {
        let vuid = match mismatch.kind {
            MismatchKind::Current => current_vuid,
            MismatchKind::Initial => initial_vuid,
        };

        device.report(
            &[
                ObjectInfo::command_buffer(cb.handle()),
                ObjectInfo::image(image.handle()),
            ],
            vuid,
            &format!(
                "{}: image expects layout {:?}, but subresource (aspect {:?}, mip level {}, \
                array layer {}) {} layout {:?}",
                command,
                mismatch.expected,
                mismatch.subresource.aspect,
                mismatch.subresource.mip_level,
                mismatch.subresource.array_layer,
                match mismatch.kind {
                    MismatchKind::Current => "was last transitioned to",
                    MismatchKind::Initial => "is in",
                },
                mismatch.actual,
            ),
        );
    }

    !mismatches.is_empty()
}

/// Checks that `layout` is compatible with the usage flags the image was
/// created with.
pub(crate) fn check_layout_usage(
    device: &DeviceState,
    cb: &CommandBufferState,
    image: &Arc<ImageState>,
    layout: vk::ImageLayout,
    aspects: vk::ImageAspectFlags,
    command: &str,
    vuid: &str,
) -> bool {
    if !device.checks.usage {
        return false;
    }

    let required = required_usage(layout, aspects);

    if !required.is_empty() && !image.usage().intersects(required) {
        device.report(
            &[
                ObjectInfo::command_buffer(cb.handle()),
                ObjectInfo::image(image.handle()),
            ],
            vuid,
            &format!(
                "{}: layout {:?} requires the image to have been created with one of the usage \
                flags {:?}, but its usage is {:?}",
                command,
                layout,
                required,
                image.usage(),
            ),
        );
        return true;
    }

    false
}

/// Checks that the image's format supports `layout` under the image's
/// tiling.
pub(crate) fn check_layout_format_features(
    device: &DeviceState,
    cb: &CommandBufferState,
    image: &Arc<ImageState>,
    layout: vk::ImageLayout,
    aspects: vk::ImageAspectFlags,
    command: &str,
    vuid: &str,
) -> bool {
    if !device.checks.format_features {
        return false;
    }

    let required = required_format_features(layout, aspects);

    if required.is_empty() {
        return false;
    }

    let supported = device
        .oracle()
        .format_features(image.format(), image.desc().tiling);

    if !supported.intersects(required) {
        device.report(
            &[
                ObjectInfo::command_buffer(cb.handle()),
                ObjectInfo::image(image.handle()),
            ],
            vuid,
            &format!(
                "{}: layout {:?} requires format {:?} to support one of the features {:?} under \
                {:?} tiling, but it supports {:?}",
                command,
                layout,
                image.format(),
                required,
                image.desc().tiling,
                supported,
            ),
        );
        return true;
    }

    false
}

/// Reports a structurally invalid subresource range. The caller skips deeper
/// checks for the item that carried the range and continues with its
/// siblings.
pub(crate) fn report_range_error(
    device: &DeviceState,
    cb: &CommandBufferState,
    image: vk::Image,
    command: &str,
    error: &RangeError,
    vuid: &str,
) -> bool {
    device.report(
        &[
            ObjectInfo::command_buffer(cb.handle()),
            ObjectInfo::image(image),
        ],
        vuid,
        &format!("{}: {}", command, error),
    );
    true
}
