//! Pipeline barrier validation, in both encodings.
//!
//! `vkCmdPipelineBarrier` and `vkCmdPipelineBarrier2` run the same algorithm
//! over the normalized barrier shapes; the encoding only selects which rule
//! clauses a violation cites.

use super::{
    check_layout_format_features, check_layout_usage, comparison_parts, report_mismatches,
    report_range_error,
};
use crate::{
    barrier::{
        transfer_direction, BarrierScope, BufferBarrier, ImageBarrier, TransferDirection,
        TransferKey, TransferResource,
    },
    command_buffer::CommandBufferState,
    device::DeviceState,
    diagnostics::ObjectInfo,
    subresource::RangeError,
};
use ash::vk;

const VUID_OLD_LAYOUT: &str = "VUID-VkImageMemoryBarrier-oldLayout-01197";
const VUID_OLD_LAYOUT_2: &str = "VUID-VkImageMemoryBarrier2-oldLayout-01197";
const VUID_OLD_LAYOUT_INITIAL: &str = "UNASSIGNED-VkImageMemoryBarrier-oldLayout-initial-layout";
const VUID_OLD_LAYOUT_INITIAL_2: &str = "UNASSIGNED-VkImageMemoryBarrier2-oldLayout-initial-layout";
const VUID_LAYOUT_USAGE: &str = "VUID-VkImageMemoryBarrier-oldLayout-01208";
const VUID_LAYOUT_USAGE_2: &str = "VUID-VkImageMemoryBarrier2-oldLayout-01208";
const VUID_FORMAT_FEATURES: &str = "UNASSIGNED-VkImageMemoryBarrier-format-features";
const VUID_FORMAT_FEATURES_2: &str = "UNASSIGNED-VkImageMemoryBarrier2-format-features";
const VUID_MIP_RANGE: &str = "VUID-VkImageMemoryBarrier-subresourceRange-01486";
const VUID_LAYER_RANGE: &str = "VUID-VkImageMemoryBarrier-subresourceRange-01488";
const VUID_ASPECT_RANGE: &str = "VUID-VkImageMemoryBarrier-image-01673";
const VUID_DUPLICATE_RELEASE: &str = "UNASSIGNED-VkImageMemoryBarrier-duplicate-release";
const VUID_DUPLICATE_RELEASE_BUFFER: &str = "UNASSIGNED-VkBufferMemoryBarrier-duplicate-release";
const VUID_PRESENTED_IMAGE: &str = "UNASSIGNED-VkImageMemoryBarrier-presented-image";

/// Validates and records the barriers of a `vkCmdPipelineBarrier` call.
/// Returns whether any problem was found.
pub fn cmd_pipeline_barrier(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    buffer_barriers: &[vk::BufferMemoryBarrier<'_>],
    image_barriers: &[vk::ImageMemoryBarrier<'_>],
) -> bool {
    record_barriers(
        device,
        cb,
        BarrierScope::Legacy,
        buffer_barriers.iter().map(BufferBarrier::from),
        image_barriers.iter().map(ImageBarrier::from),
    )
}

/// Validates and records the barriers of a `vkCmdPipelineBarrier2` call.
pub fn cmd_pipeline_barrier2(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    buffer_barriers: &[vk::BufferMemoryBarrier2<'_>],
    image_barriers: &[vk::ImageMemoryBarrier2<'_>],
) -> bool {
    record_barriers(
        device,
        cb,
        BarrierScope::DependencyInfo,
        buffer_barriers.iter().map(BufferBarrier::from),
        image_barriers.iter().map(ImageBarrier::from),
    )
}

fn record_barriers(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    scope: BarrierScope,
    buffer_barriers: impl Iterator<Item = BufferBarrier>,
    image_barriers: impl Iterator<Item = ImageBarrier>,
) -> bool {
    if !device.checks.image_layout && !device.checks.queue_family_transfer {
        return false;
    }

    let mut bad = false;

    for barrier in buffer_barriers {
        bad |= record_buffer_barrier(device, cb, &barrier);
    }

    for barrier in image_barriers {
        bad |= record_image_barrier(device, cb, scope, &barrier);
    }

    bad
}

fn record_buffer_barrier(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    barrier: &BufferBarrier,
) -> bool {
    if !device.checks.queue_family_transfer {
        return false;
    }

    let Some(buffer) = device.buffers.get(barrier.buffer) else {
        return false;
    };

    let Some(direction) = transfer_direction(
        barrier.src_queue_family_index,
        barrier.dst_queue_family_index,
        cb.queue_family_index(),
    ) else {
        return false;
    };

    let key = TransferKey {
        resource: TransferResource::Buffer {
            buffer: barrier.buffer,
            span: buffer.normalize_span(barrier.offset, barrier.size),
        },
        src_queue_family_index: barrier.src_queue_family_index,
        dst_queue_family_index: barrier.dst_queue_family_index,
    };

    match direction {
        TransferDirection::Release => {
            if !cb.release_barriers.insert(key) {
                device.report(
                    &[
                        ObjectInfo::command_buffer(cb.handle()),
                        ObjectInfo::buffer(barrier.buffer),
                    ],
                    VUID_DUPLICATE_RELEASE_BUFFER,
                    &format!(
                        "vkCmdPipelineBarrier: a release barrier from queue family {} to {} for \
                        the same buffer range was already recorded in this command buffer",
                        barrier.src_queue_family_index, barrier.dst_queue_family_index,
                    ),
                );
                return true;
            }
        }
        TransferDirection::Acquire => cb.acquire_barriers.push(key),
    }

    false
}

fn record_image_barrier(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    scope: BarrierScope,
    barrier: &ImageBarrier,
) -> bool {
    let command = match scope {
        BarrierScope::Legacy => "vkCmdPipelineBarrier",
        BarrierScope::DependencyInfo => "vkCmdPipelineBarrier2",
    };

    let Some(image) = device.images.get(barrier.image) else {
        return false;
    };

    let range = match image.normalize_range(&barrier.subresource_range) {
        Ok(range) => range,
        Err(error) => {
            let vuid = match error {
                RangeError::MipLevelsOutOfRange { .. } => VUID_MIP_RANGE,
                RangeError::ArrayLayersOutOfRange { .. } => VUID_LAYER_RANGE,
                RangeError::AspectsNotInImage { .. } => VUID_ASPECT_RANGE,
            };
            return report_range_error(device, cb, barrier.image, command, &error, vuid);
        }
    };

    if range.is_empty() {
        return false;
    }

    let mut bad = false;

    let direction = transfer_direction(
        barrier.src_queue_family_index,
        barrier.dst_queue_family_index,
        cb.queue_family_index(),
    );

    if device.checks.queue_family_transfer {
        if direction.is_some() && image.is_presented() {
            // The presentation engine owns the image; no queue family can
            // release it until it is re-acquired.
            device.report(
                &[
                    ObjectInfo::command_buffer(cb.handle()),
                    ObjectInfo::image(barrier.image),
                ],
                VUID_PRESENTED_IMAGE,
                &format!(
                    "{}: ownership transfer barrier recorded for an image currently owned by the \
                    presentation engine",
                    command,
                ),
            );
            bad = true;
        }

        if let Some(direction) = direction {
            let key = TransferKey {
                resource: TransferResource::Image {
                    image: barrier.image,
                    range: range.clone(),
                },
                src_queue_family_index: barrier.src_queue_family_index,
                dst_queue_family_index: barrier.dst_queue_family_index,
            };

            match direction {
                TransferDirection::Release => {
                    if !cb.release_barriers.insert(key) {
                        device.report(
                            &[
                                ObjectInfo::command_buffer(cb.handle()),
                                ObjectInfo::image(barrier.image),
                            ],
                            VUID_DUPLICATE_RELEASE,
                            &format!(
                                "{}: a release barrier from queue family {} to {} for the same \
                                subresource range was already recorded in this command buffer",
                                command,
                                barrier.src_queue_family_index,
                                barrier.dst_queue_family_index,
                            ),
                        );
                        bad = true;
                    }
                }
                TransferDirection::Acquire => cb.acquire_barriers.push(key),
            }
        }
    }

    if !device.checks.image_layout {
        return bad;
    }

    // Expected prior layout against the tracked model, per comparison part.
    let (current_vuid, initial_vuid, usage_vuid, features_vuid) = match scope {
        BarrierScope::Legacy => (
            VUID_OLD_LAYOUT,
            VUID_OLD_LAYOUT_INITIAL,
            VUID_LAYOUT_USAGE,
            VUID_FORMAT_FEATURES,
        ),
        BarrierScope::DependencyInfo => (
            VUID_OLD_LAYOUT_2,
            VUID_OLD_LAYOUT_INITIAL_2,
            VUID_LAYOUT_USAGE_2,
            VUID_FORMAT_FEATURES_2,
        ),
    };

    for (part, match_aspects) in comparison_parts(device, &range) {
        let mismatches = cb
            .tracker
            .validate(&image, &part, match_aspects, barrier.old_layout);
        bad |= report_mismatches(
            device,
            cb,
            &image,
            command,
            &mismatches,
            current_vuid,
            initial_vuid,
        );
    }

    // Both endpoint layouts must be compatible with the image's usage; the
    // target layout must additionally be supported by the format.
    if barrier.old_layout != vk::ImageLayout::UNDEFINED {
        bad |= check_layout_usage(
            device,
            cb,
            &image,
            barrier.old_layout,
            range.aspects,
            command,
            usage_vuid,
        );
    }
    bad |= check_layout_usage(
        device,
        cb,
        &image,
        barrier.new_layout,
        range.aspects,
        command,
        usage_vuid,
    );
    bad |= check_layout_format_features(
        device,
        cb,
        &image,
        barrier.new_layout,
        range.aspects,
        command,
        features_vuid,
    );

    // Record the transition. For an ownership transfer the layout change
    // applies on the acquiring side only; the releasing side records the
    // pre-transition layout as its first-use assertion, so the transition is
    // not applied twice.
    match direction {
        Some(TransferDirection::Release) => {
            cb.tracker
                .set_initial_layout(&image, &range, barrier.old_layout);
        }
        _ => {
            let no_op =
                barrier.old_layout == barrier.new_layout && device.features.synchronization2;

            if !no_op {
                cb.tracker
                    .set_layout(&image, &range, barrier.new_layout, barrier.old_layout);
            }
        }
    }

    bad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::CollectingSink,
        format::KnownFormats,
        image::ImageCreateDesc,
        command_buffer::CommandBufferLevel,
    };
    use ash::vk::Handle;
    use std::sync::Arc;

    fn test_device() -> (DeviceState, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let device = DeviceState::new(sink.clone(), Arc::new(KnownFormats));
        (device, sink)
    }

    fn image_barrier(
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .image(image)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            })
    }

    #[test]
    fn transition_chain_validates_in_order() {
        let (device, sink) = test_device();
        let handle = vk::Image::from_raw(0x10);
        device.create_image(
            handle,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                ..Default::default()
            },
        );

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x20),
            CommandBufferLevel::Primary,
            0,
        );

        // UNDEFINED -> TRANSFER_DST, then TRANSFER_DST -> SHADER_READ_ONLY:
        // both consistent, no reports.
        assert!(!cmd_pipeline_barrier(
            &device,
            &mut cb,
            &[],
            &[image_barrier(
                handle,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )],
        ));
        assert!(!cmd_pipeline_barrier(
            &device,
            &mut cb,
            &[],
            &[image_barrier(
                handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )],
        ));
        assert_eq!(sink.count(), 0);

        // A barrier declaring the wrong old layout is flagged against the
        // recorded current layout.
        assert!(cmd_pipeline_barrier(
            &device,
            &mut cb,
            &[],
            &[image_barrier(
                handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::GENERAL,
            )],
        ));
        assert_eq!(sink.count_vuid(VUID_OLD_LAYOUT), 1);
    }

    #[test]
    fn dependency_info_variant_cites_its_own_rules() {
        let (device, sink) = test_device();
        let handle = vk::Image::from_raw(0x11);
        device.create_image(
            handle,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
        );

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x21),
            CommandBufferLevel::Primary,
            0,
        );

        let barrier = vk::ImageMemoryBarrier2::default()
            .image(handle)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        cmd_pipeline_barrier2(&device, &mut cb, &[], &[barrier]);

        let wrong = barrier
            .old_layout(vk::ImageLayout::GENERAL)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        cmd_pipeline_barrier2(&device, &mut cb, &[], &[wrong]);

        assert_eq!(sink.count_vuid(VUID_OLD_LAYOUT_2), 1);
        assert_eq!(sink.count_vuid(VUID_OLD_LAYOUT), 0);
    }

    #[test]
    fn usage_incompatible_target_layout_is_flagged() {
        let (device, sink) = test_device();
        let handle = vk::Image::from_raw(0x12);
        // No COLOR_ATTACHMENT usage.
        device.create_image(
            handle,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::SAMPLED,
                ..Default::default()
            },
        );

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x22),
            CommandBufferLevel::Primary,
            0,
        );

        assert!(cmd_pipeline_barrier(
            &device,
            &mut cb,
            &[],
            &[image_barrier(
                handle,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            )],
        ));
        assert_eq!(sink.count_vuid(VUID_LAYOUT_USAGE), 1);
    }

    #[test]
    fn equal_layouts_leave_no_history_under_synchronization2() {
        let (device, _sink) = test_device();
        let handle = vk::Image::from_raw(0x13);
        device.create_image(
            handle,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
        );

        let mut with_sync2 = DeviceState::new(
            Arc::new(CollectingSink::new()),
            Arc::new(KnownFormats),
        );
        with_sync2.features.synchronization2 = true;
        with_sync2.create_image(
            handle,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
        );

        // Without synchronization2 the no-op transition is recorded.
        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x23),
            CommandBufferLevel::Primary,
            0,
        );
        cmd_pipeline_barrier(
            &device,
            &mut cb,
            &[],
            &[image_barrier(
                handle,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::GENERAL,
            )],
        );
        assert!(cb.tracker().get(handle).is_some());

        // With it, the tracker stays empty.
        let mut cb2 = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x24),
            CommandBufferLevel::Primary,
            0,
        );
        cmd_pipeline_barrier2(
            &with_sync2,
            &mut cb2,
            &[],
            &[vk::ImageMemoryBarrier2::default()
                .image(handle)
                .old_layout(vk::ImageLayout::GENERAL)
                .new_layout(vk::ImageLayout::GENERAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })],
        );
        assert!(cb2.tracker().get(handle).is_none());
    }

    #[test]
    fn duplicate_release_in_one_command_buffer_is_flagged() {
        let (device, sink) = test_device();
        let handle = vk::Image::from_raw(0x14);
        device.create_image(
            handle,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_SRC,
                ..Default::default()
            },
        );

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x25),
            CommandBufferLevel::Primary,
            0,
        );

        let release = image_barrier(
            handle,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .src_queue_family_index(0)
        .dst_queue_family_index(1);

        assert!(!cmd_pipeline_barrier(&device, &mut cb, &[], &[release]));
        // Same key spelled with explicit counts instead of sentinels.
        let respelled = release.subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
        assert!(cmd_pipeline_barrier(&device, &mut cb, &[], &[respelled]));
        assert_eq!(sink.count_vuid(VUID_DUPLICATE_RELEASE), 1);
    }

    #[test]
    fn ownership_transfer_on_presented_image_is_flagged() {
        let (device, sink) = test_device();
        let handle = vk::Image::from_raw(0x18);
        let image = device.create_image(
            handle,
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::TRANSFER_SRC,
                ..Default::default()
            },
        );
        image.set_presented(true);

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x28),
            CommandBufferLevel::Primary,
            0,
        );

        let release = image_barrier(
            handle,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .src_queue_family_index(0)
        .dst_queue_family_index(1);

        assert!(cmd_pipeline_barrier(&device, &mut cb, &[], &[release]));
        assert_eq!(sink.count_vuid(VUID_PRESENTED_IMAGE), 1);
    }

    #[test]
    fn separate_depth_stencil_aspects_validate_independently() {
        let sink = Arc::new(CollectingSink::new());
        let mut device = DeviceState::new(sink.clone(), Arc::new(KnownFormats));
        device.features.separate_depth_stencil_layouts = true;

        let handle = vk::Image::from_raw(0x17);
        device.create_image(
            handle,
            ImageCreateDesc {
                format: vk::Format::D24_UNORM_S8_UINT,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED,
                ..Default::default()
            },
        );

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x27),
            CommandBufferLevel::Primary,
            0,
        );

        let single_aspect = |aspect, new_layout| {
            image_barrier(handle, vk::ImageLayout::UNDEFINED, new_layout).subresource_range(
                vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
            )
        };

        // Depth and stencil transitioned to independently declared layouts.
        assert!(!cmd_pipeline_barrier(
            &device,
            &mut cb,
            &[],
            &[
                single_aspect(
                    vk::ImageAspectFlags::DEPTH,
                    vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                ),
                single_aspect(
                    vk::ImageAspectFlags::STENCIL,
                    vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL,
                ),
            ],
        ));

        // A combined barrier declaring "depth+stencil attachment" agrees on
        // the depth component only; exactly the stencil aspect is flagged.
        let combined = image_barrier(
            handle,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
        assert!(cmd_pipeline_barrier(&device, &mut cb, &[], &[combined]));

        let reports = sink.reports();
        assert_eq!(sink.count_vuid(VUID_OLD_LAYOUT), 1);
        let report = reports
            .iter()
            .find(|report| report.vuid == VUID_OLD_LAYOUT)
            .unwrap();
        assert!(report.message.contains("STENCIL"));
        assert!(report
            .message
            .contains("STENCIL_READ_ONLY_OPTIMAL"));
    }

    #[test]
    fn disabled_category_skips_everything() {
        let sink = Arc::new(CollectingSink::new());
        let mut device = DeviceState::new(sink.clone(), Arc::new(KnownFormats));
        device.checks = crate::CheckCategories::none();

        let handle = vk::Image::from_raw(0x15);
        device.create_image(handle, ImageCreateDesc::default());

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x26),
            CommandBufferLevel::Primary,
            0,
        );

        assert!(!cmd_pipeline_barrier(
            &device,
            &mut cb,
            &[],
            &[image_barrier(
                handle,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )],
        ));
        assert_eq!(sink.count(), 0);
        assert!(cb.tracker().is_empty());
    }
}
