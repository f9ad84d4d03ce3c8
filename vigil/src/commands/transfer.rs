//! Copy, blit and resolve validation.
//!
//! Transfer commands do not transition layouts; they *require* them. The
//! application declares the layout each side is in, the declared layout must
//! be one of the few the command permits, and the declaration must agree
//! with the tracked model. The declaration is then recorded as a first-use
//! assertion, so a later submission-time check can hold the application to
//! it.

use super::{report_mismatches, report_range_error};
use crate::{
    command_buffer::CommandBufferState,
    device::DeviceState,
    diagnostics::ObjectInfo,
    image::ImageState,
    subresource::NormalizedSubresourceRange,
};
use ash::vk;
use std::sync::Arc;

const VUID_COPY_SRC_LAYOUT_MATCH: &str = "VUID-vkCmdCopyImage-srcImageLayout-00128";
const VUID_COPY_SRC_LAYOUT_SET: &str = "VUID-vkCmdCopyImage-srcImageLayout-01917";
const VUID_COPY_DST_LAYOUT_MATCH: &str = "VUID-vkCmdCopyImage-dstImageLayout-00133";
const VUID_COPY_DST_LAYOUT_SET: &str = "VUID-vkCmdCopyImage-dstImageLayout-01395";
const VUID_BLIT_SRC_LAYOUT_MATCH: &str = "VUID-vkCmdBlitImage-srcImageLayout-00221";
const VUID_BLIT_SRC_LAYOUT_SET: &str = "VUID-vkCmdBlitImage-srcImageLayout-01398";
const VUID_BLIT_DST_LAYOUT_MATCH: &str = "VUID-vkCmdBlitImage-dstImageLayout-00226";
const VUID_BLIT_DST_LAYOUT_SET: &str = "VUID-vkCmdBlitImage-dstImageLayout-01399";
const VUID_RESOLVE_SRC_LAYOUT_MATCH: &str = "VUID-vkCmdResolveImage-srcImageLayout-00260";
const VUID_RESOLVE_SRC_LAYOUT_SET: &str = "VUID-vkCmdResolveImage-srcImageLayout-01400";
const VUID_RESOLVE_DST_LAYOUT_MATCH: &str = "VUID-vkCmdResolveImage-dstImageLayout-00262";
const VUID_RESOLVE_DST_LAYOUT_SET: &str = "VUID-vkCmdResolveImage-dstImageLayout-01401";
const VUID_SUBRESOURCE: &str = "UNASSIGNED-transfer-subresource-range";

struct LayoutRules {
    match_vuid: &'static str,
    set_vuid: &'static str,
}

/// The layouts a transfer source may be declared in.
fn is_transfer_src_layout(layout: vk::ImageLayout) -> bool {
    matches!(
        layout,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
            | vk::ImageLayout::GENERAL
            | vk::ImageLayout::SHARED_PRESENT_KHR
    )
}

/// The layouts a transfer destination may be declared in.
fn is_transfer_dst_layout(layout: vk::ImageLayout) -> bool {
    matches!(
        layout,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
            | vk::ImageLayout::GENERAL
            | vk::ImageLayout::SHARED_PRESENT_KHR
    )
}

/// Validates one side of one region of a transfer command. Structural
/// problems with this region's subresource skip its deeper checks; the
/// caller continues with the remaining regions.
fn validate_transfer_side(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    command: &str,
    image: &Arc<ImageState>,
    subresource: &vk::ImageSubresourceLayers,
    declared: vk::ImageLayout,
    layout_ok: bool,
    rules: &LayoutRules,
) -> bool {
    let mut bad = false;

    if !layout_ok {
        device.report(
            &[
                ObjectInfo::command_buffer(cb.handle()),
                ObjectInfo::image(image.handle()),
            ],
            rules.set_vuid,
            &format!(
                "{}: declared layout {:?} is not one of the layouts this command permits",
                command, declared,
            ),
        );
        bad = true;
    }

    let raw_range = vk::ImageSubresourceRange {
        aspect_mask: subresource.aspect_mask,
        base_mip_level: subresource.mip_level,
        level_count: 1,
        base_array_layer: subresource.base_array_layer,
        layer_count: subresource.layer_count,
    };

    let range: NormalizedSubresourceRange = match image.normalize_range(&raw_range) {
        Ok(range) => range,
        Err(error) => {
            return report_range_error(
                device,
                cb,
                image.handle(),
                command,
                &error,
                VUID_SUBRESOURCE,
            );
        }
    };

    let mismatches = cb
        .tracker
        .validate(image, &range, range.aspects, declared);
    bad |= report_mismatches(
        device,
        cb,
        image,
        command,
        &mismatches,
        rules.match_vuid,
        rules.match_vuid,
    );

    // First touch binds the subresource to the declared layout; it is not a
    // transition.
    cb.tracker.set_initial_layout(image, &range, declared);

    bad
}

fn validate_transfer(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    command: &str,
    src_image: vk::Image,
    src_layout: vk::ImageLayout,
    dst_image: vk::Image,
    dst_layout: vk::ImageLayout,
    regions: impl Iterator<Item = (vk::ImageSubresourceLayers, vk::ImageSubresourceLayers)>,
    src_rules: &LayoutRules,
    dst_rules: &LayoutRules,
) -> bool {
    if !device.checks.image_layout {
        return false;
    }

    let src = device.images.get(src_image);
    let dst = device.images.get(dst_image);
    let mut bad = false;

    for (src_subresource, dst_subresource) in regions {
        if let Some(src) = &src {
            bad |= validate_transfer_side(
                device,
                cb,
                command,
                src,
                &src_subresource,
                src_layout,
                is_transfer_src_layout(src_layout),
                src_rules,
            );
        }

        if let Some(dst) = &dst {
            bad |= validate_transfer_side(
                device,
                cb,
                command,
                dst,
                &dst_subresource,
                dst_layout,
                is_transfer_dst_layout(dst_layout),
                dst_rules,
            );
        }
    }

    bad
}

/// Validates a `vkCmdCopyImage` call. Returns whether any problem was found.
pub fn cmd_copy_image(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    src_image: vk::Image,
    src_layout: vk::ImageLayout,
    dst_image: vk::Image,
    dst_layout: vk::ImageLayout,
    regions: &[vk::ImageCopy],
) -> bool {
    validate_transfer(
        device,
        cb,
        "vkCmdCopyImage",
        src_image,
        src_layout,
        dst_image,
        dst_layout,
        regions
            .iter()
            .map(|region| (region.src_subresource, region.dst_subresource)),
        &LayoutRules {
            match_vuid: VUID_COPY_SRC_LAYOUT_MATCH,
            set_vuid: VUID_COPY_SRC_LAYOUT_SET,
        },
        &LayoutRules {
            match_vuid: VUID_COPY_DST_LAYOUT_MATCH,
            set_vuid: VUID_COPY_DST_LAYOUT_SET,
        },
    )
}

/// Validates a `vkCmdBlitImage` call.
pub fn cmd_blit_image(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    src_image: vk::Image,
    src_layout: vk::ImageLayout,
    dst_image: vk::Image,
    dst_layout: vk::ImageLayout,
    regions: &[vk::ImageBlit],
) -> bool {
    validate_transfer(
        device,
        cb,
        "vkCmdBlitImage",
        src_image,
        src_layout,
        dst_image,
        dst_layout,
        regions
            .iter()
            .map(|region| (region.src_subresource, region.dst_subresource)),
        &LayoutRules {
            match_vuid: VUID_BLIT_SRC_LAYOUT_MATCH,
            set_vuid: VUID_BLIT_SRC_LAYOUT_SET,
        },
        &LayoutRules {
            match_vuid: VUID_BLIT_DST_LAYOUT_MATCH,
            set_vuid: VUID_BLIT_DST_LAYOUT_SET,
        },
    )
}

/// Validates a `vkCmdResolveImage` call.
pub fn cmd_resolve_image(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    src_image: vk::Image,
    src_layout: vk::ImageLayout,
    dst_image: vk::Image,
    dst_layout: vk::ImageLayout,
    regions: &[vk::ImageResolve],
) -> bool {
    validate_transfer(
        device,
        cb,
        "vkCmdResolveImage",
        src_image,
        src_layout,
        dst_image,
        dst_layout,
        regions
            .iter()
            .map(|region| (region.src_subresource, region.dst_subresource)),
        &LayoutRules {
            match_vuid: VUID_RESOLVE_SRC_LAYOUT_MATCH,
            set_vuid: VUID_RESOLVE_SRC_LAYOUT_SET,
        },
        &LayoutRules {
            match_vuid: VUID_RESOLVE_DST_LAYOUT_MATCH,
            set_vuid: VUID_RESOLVE_DST_LAYOUT_SET,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command_buffer::CommandBufferLevel, diagnostics::CollectingSink, format::KnownFormats,
        image::ImageCreateDesc,
    };
    use ash::vk::Handle;
    use std::sync::Arc;

    fn test_device() -> (DeviceState, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let device = DeviceState::new(sink.clone(), Arc::new(KnownFormats));
        (device, sink)
    }

    fn subresource() -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    fn copy_region() -> vk::ImageCopy {
        vk::ImageCopy {
            src_subresource: subresource(),
            src_offset: vk::Offset3D::default(),
            dst_subresource: subresource(),
            dst_offset: vk::Offset3D::default(),
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
        }
    }

    #[test]
    fn copy_with_wrong_declared_layout_kind_is_flagged() {
        let (device, sink) = test_device();
        let src = vk::Image::from_raw(0x30);
        let dst = vk::Image::from_raw(0x31);
        device.create_image(
            src,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_SRC,
                ..Default::default()
            },
        );
        device.create_image(
            dst,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
        );

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x40),
            CommandBufferLevel::Primary,
            0,
        );

        // COLOR_ATTACHMENT_OPTIMAL is never a permitted copy source layout.
        assert!(cmd_copy_image(
            &device,
            &mut cb,
            src,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy_region()],
        ));
        assert_eq!(sink.count_vuid(VUID_COPY_SRC_LAYOUT_SET), 1);
        assert_eq!(sink.count_vuid(VUID_COPY_DST_LAYOUT_SET), 0);
    }

    #[test]
    fn copy_against_tracked_layout_is_flagged_per_side() {
        let (device, sink) = test_device();
        let src = vk::Image::from_raw(0x32);
        let dst = vk::Image::from_raw(0x33);
        device.create_image(
            src,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
        );
        device.create_image(
            dst,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
        );

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x41),
            CommandBufferLevel::Primary,
            0,
        );

        // The source was left in TRANSFER_DST by this recording.
        let src_state = device.images.get(src).unwrap();
        cb.tracker.set_layout(
            &src_state,
            &src_state.whole_range(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        );

        assert!(cmd_copy_image(
            &device,
            &mut cb,
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy_region()],
        ));
        assert_eq!(sink.count_vuid(VUID_COPY_SRC_LAYOUT_MATCH), 1);
        assert_eq!(sink.count_vuid(VUID_COPY_DST_LAYOUT_MATCH), 0);
    }

    #[test]
    fn first_touch_binds_declared_layout() {
        let (device, _sink) = test_device();
        let src = vk::Image::from_raw(0x34);
        let dst = vk::Image::from_raw(0x35);
        device.create_image(
            src,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_SRC,
                ..Default::default()
            },
        );
        device.create_image(
            dst,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
        );

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x42),
            CommandBufferLevel::Primary,
            0,
        );

        cmd_copy_image(
            &device,
            &mut cb,
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy_region()],
        );

        let map = cb.tracker().get(src).unwrap();
        let (_, entry) = map.iter().next().unwrap();
        assert_eq!(
            entry.initial_layout,
            Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
        );
    }

    #[test]
    fn structural_error_in_one_region_keeps_siblings() {
        let (device, sink) = test_device();
        let src = vk::Image::from_raw(0x36);
        let dst = vk::Image::from_raw(0x37);
        device.create_image(
            src,
            ImageCreateDesc {
                mip_levels: 2,
                usage: vk::ImageUsageFlags::TRANSFER_SRC,
                ..Default::default()
            },
        );
        device.create_image(
            dst,
            ImageCreateDesc {
                mip_levels: 2,
                usage: vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
        );

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x43),
            CommandBufferLevel::Primary,
            0,
        );

        let mut bad_region = copy_region();
        bad_region.src_subresource.mip_level = 7;

        assert!(cmd_copy_image(
            &device,
            &mut cb,
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[bad_region, copy_region()],
        ));
        assert_eq!(sink.count_vuid(VUID_SUBRESOURCE), 1);

        // The healthy region still bound its first-touch layouts.
        assert!(cb.tracker().get(src).is_some());
        assert!(cb.tracker().get(dst).is_some());
    }
}
