//! Render pass attachment layout transitions.
//!
//! Attachments transition automatically at declared points: into the
//! attachment's `initial_layout` when the render pass begins, between
//! per-subpass layouts as subpasses advance, and into `final_layout` when
//! the render pass ends. Beginning a render pass therefore both *checks* the
//! declared initial layout against the tracked model and *records* the
//! declared transitions, whether or not the check passed.

use super::{check_layout_usage, report_mismatches};
use crate::{
    command_buffer::{CommandBufferState, RenderPassInstance},
    deferred::DeferredCheck,
    device::DeviceState,
    diagnostics::ObjectInfo,
    image::ImageViewState,
    render_pass::{AttachmentDesc, RenderPassState},
    subresource::NormalizedSubresourceRange,
};
use ash::vk;
use smallvec::SmallVec;
use std::sync::Arc;

const VUID_INITIAL_LAYOUT: &str = "VUID-vkCmdBeginRenderPass-initialLayout-00900";
const VUID_INITIAL_LAYOUT_INITIAL: &str =
    "UNASSIGNED-vkCmdBeginRenderPass-initialLayout-initial-layout";
const VUID_INITIAL_LAYOUT_USAGE: &str = "VUID-vkCmdBeginRenderPass-initialLayout-00895";
const VUID_ATTACHMENT_COUNT: &str = "UNASSIGNED-vkCmdBeginRenderPass-attachment-count";
const VUID_CLEAR_ATTACHMENT_LAYOUT: &str = "UNASSIGNED-vkCmdClearAttachments-layout";

/// One comparison/transition unit of an attachment: when separate stencil
/// layouts are declared, the depth and stencil aspects carry independent
/// layouts and are handled as two units.
fn attachment_parts(
    range: &NormalizedSubresourceRange,
    layout: vk::ImageLayout,
    stencil_layout: Option<vk::ImageLayout>,
) -> SmallVec<[(NormalizedSubresourceRange, vk::ImageAspectFlags, vk::ImageLayout); 2]> {
    let mut parts = SmallVec::new();

    let has_depth = range.aspects.contains(vk::ImageAspectFlags::DEPTH);
    let has_stencil = range.aspects.contains(vk::ImageAspectFlags::STENCIL);

    match stencil_layout {
        Some(stencil_layout) if has_depth && has_stencil => {
            parts.push((
                NormalizedSubresourceRange {
                    aspects: vk::ImageAspectFlags::DEPTH,
                    ..range.clone()
                },
                vk::ImageAspectFlags::DEPTH,
                layout,
            ));
            parts.push((
                NormalizedSubresourceRange {
                    aspects: vk::ImageAspectFlags::STENCIL,
                    ..range.clone()
                },
                vk::ImageAspectFlags::STENCIL,
                stencil_layout,
            ));
        }
        Some(stencil_layout) if has_stencil && !has_depth => {
            parts.push((range.clone(), range.aspects, stencil_layout));
        }
        _ => parts.push((range.clone(), range.aspects, layout)),
    }

    parts
}

/// Validates the attachment initial layouts of a `vkCmdBeginRenderPass`
/// call, records the transitions into the first subpass, and enters the
/// render pass instance. Returns whether any problem was found.
pub fn cmd_begin_render_pass(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
) -> bool {
    if !device.checks.image_layout {
        return false;
    }

    let Some(render_pass) = device.render_passes.get(render_pass) else {
        return false;
    };
    let framebuffer = device.framebuffers.get(framebuffer);

    let mut bad = false;

    if let Some(framebuffer) = &framebuffer {
        if framebuffer.attachments().len() != render_pass.attachments().len() {
            // Cannot pair attachments with their descriptions; skip the
            // attachment checks but still enter the render pass.
            device.report(
                &[
                    ObjectInfo::command_buffer(cb.handle()),
                    ObjectInfo::render_pass(render_pass.handle()),
                    ObjectInfo::framebuffer(framebuffer.handle()),
                ],
                VUID_ATTACHMENT_COUNT,
                &format!(
                    "vkCmdBeginRenderPass: the framebuffer has {} attachments but the render pass \
                    declares {}",
                    framebuffer.attachments().len(),
                    render_pass.attachments().len(),
                ),
            );
            bad = true;
        } else {
            for (index, (view, desc)) in framebuffer
                .attachments()
                .iter()
                .zip(render_pass.attachments())
                .enumerate()
            {
                bad |= begin_attachment(device, cb, &render_pass, index as u32, view, desc);
            }
        }
    }

    cb.render_pass = Some(RenderPassInstance {
        render_pass,
        framebuffer,
        subpass: 0,
    });

    bad
}

fn begin_attachment(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    render_pass: &Arc<RenderPassState>,
    index: u32,
    view: &Arc<ImageViewState>,
    desc: &AttachmentDesc,
) -> bool {
    let image = view.image().clone();
    let mut bad = false;

    for (part, match_aspects, expected) in attachment_parts(
        view.range(),
        desc.initial_layout,
        desc.stencil_initial_layout,
    ) {
        // A declared initial layout of UNDEFINED resets the contract: the
        // attachment contents are discarded and any tracked layout passes.
        if expected != vk::ImageLayout::UNDEFINED {
            let mismatches = cb.tracker.validate(&image, &part, match_aspects, expected);
            bad |= report_mismatches(
                device,
                cb,
                &image,
                "vkCmdBeginRenderPass",
                &mismatches,
                VUID_INITIAL_LAYOUT,
                VUID_INITIAL_LAYOUT_INITIAL,
            );
            bad |= check_layout_usage(
                device,
                cb,
                &image,
                expected,
                match_aspects,
                "vkCmdBeginRenderPass",
                VUID_INITIAL_LAYOUT_USAGE,
            );
        }

        cb.tracker.set_initial_layout(&image, &part, expected);

        if let Some(reference) = render_pass.subpass_layout(0, index) {
            let layout = if match_aspects == vk::ImageAspectFlags::STENCIL {
                reference.stencil_layout.unwrap_or(reference.layout)
            } else {
                reference.layout
            };
            cb.tracker.set_layout(&image, &part, layout, expected);
        }
    }

    bad
}

/// Records the attachment transitions into the next subpass.
pub fn cmd_next_subpass(device: &DeviceState, cb: &mut CommandBufferState) -> bool {
    if !device.checks.image_layout {
        return false;
    }

    let Some(instance) = cb.render_pass.clone() else {
        return false;
    };

    let next = instance.subpass + 1;
    if next as usize >= instance.render_pass.subpasses().len() {
        return false;
    }

    if let Some(framebuffer) = &instance.framebuffer {
        if framebuffer.attachments().len() == instance.render_pass.attachments().len() {
            for (index, view) in framebuffer.attachments().iter().enumerate() {
                let Some(reference) = instance.render_pass.subpass_layout(next, index as u32)
                else {
                    continue;
                };

                let image = view.image().clone();
                for (part, _, layout) in
                    attachment_parts(view.range(), reference.layout, reference.stencil_layout)
                {
                    cb.tracker.set_layout(&image, &part, layout, layout);
                }
            }
        }
    }

    cb.render_pass.as_mut().unwrap().subpass = next;
    false
}

/// Records the attachment transitions into their final layouts and leaves
/// the render pass instance.
pub fn cmd_end_render_pass(device: &DeviceState, cb: &mut CommandBufferState) -> bool {
    if !device.checks.image_layout {
        return false;
    }

    let Some(instance) = cb.render_pass.take() else {
        return false;
    };

    if let Some(framebuffer) = &instance.framebuffer {
        if framebuffer.attachments().len() == instance.render_pass.attachments().len() {
            for (view, desc) in framebuffer
                .attachments()
                .iter()
                .zip(instance.render_pass.attachments())
            {
                let image = view.image().clone();
                for (part, _, layout) in
                    attachment_parts(view.range(), desc.final_layout, desc.stencil_final_layout)
                {
                    cb.tracker.set_layout(&image, &part, layout, layout);
                }
            }
        }
    }

    false
}

/// Validates that the attachments a `vkCmdClearAttachments` call touches are
/// in the layout the current subpass declares for them.
///
/// In a secondary command buffer whose framebuffer is inherited and not yet
/// known, the check is captured as a deferred item and runs at
/// execute-commands time.
pub fn cmd_clear_attachments(
    device: &DeviceState,
    cb: &mut CommandBufferState,
    attachments: &[vk::ClearAttachment],
) -> bool {
    if !device.checks.image_layout {
        return false;
    }

    let Some((render_pass, framebuffer, subpass)) = cb.current_render_pass() else {
        return false;
    };
    let render_pass = render_pass.clone();
    let framebuffer = framebuffer.cloned();

    let Some(subpass_desc) = render_pass.subpasses().get(subpass as usize) else {
        return false;
    };

    let mut bad = false;

    for clear in attachments {
        let reference = if clear.aspect_mask.contains(vk::ImageAspectFlags::COLOR) {
            subpass_desc
                .color_attachments
                .get(clear.color_attachment as usize)
        } else {
            subpass_desc.depth_stencil_attachment.as_ref()
        };

        // An unused or out-of-range reference cannot be validated further;
        // the remaining clears still are.
        let Some(reference) = reference.filter(|reference| !reference.is_unused()) else {
            continue;
        };

        match &framebuffer {
            Some(framebuffer) => {
                let Some(view) = framebuffer.attachments().get(reference.attachment as usize)
                else {
                    continue;
                };

                let mut range = view.range().clone();
                range.aspects &= clear.aspect_mask;
                if range.is_empty() {
                    continue;
                }

                let image = view.image().clone();
                let mismatches =
                    cb.tracker
                        .validate(&image, &range, range.aspects, reference.layout);
                bad |= report_mismatches(
                    device,
                    cb,
                    &image,
                    "vkCmdClearAttachments",
                    &mismatches,
                    VUID_CLEAR_ATTACHMENT_LAYOUT,
                    VUID_CLEAR_ATTACHMENT_LAYOUT,
                );
            }
            None => cb.deferred.push(DeferredCheck::AttachmentLayout {
                attachment: reference.attachment,
                subpass,
                aspects: clear.aspect_mask,
                expected: reference.layout,
                vuid: VUID_CLEAR_ATTACHMENT_LAYOUT,
            }),
        }
    }

    bad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command_buffer::{CommandBufferLevel, InheritanceInfo},
        commands::secondary::cmd_execute_commands,
        diagnostics::CollectingSink,
        format::KnownFormats,
        image::{ImageCreateDesc, ImageState},
        render_pass::{AttachmentRef, FramebufferState, SubpassDesc},
    };
    use ash::vk::Handle;

    fn test_device() -> (DeviceState, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let device = DeviceState::new(sink.clone(), Arc::new(KnownFormats));
        (device, sink)
    }

    fn color_attachment_pass(
        device: &DeviceState,
        raw: u64,
        initial_layout: vk::ImageLayout,
        subpass_layout: vk::ImageLayout,
        final_layout: vk::ImageLayout,
    ) -> (vk::RenderPass, Arc<RenderPassState>) {
        let handle = vk::RenderPass::from_raw(raw);
        let state = RenderPassState::new(
            handle,
            vec![AttachmentDesc {
                format: vk::Format::R8G8B8A8_UNORM,
                samples: vk::SampleCountFlags::TYPE_1,
                initial_layout,
                final_layout,
                stencil_initial_layout: None,
                stencil_final_layout: None,
            }],
            vec![SubpassDesc {
                color_attachments: vec![AttachmentRef {
                    attachment: 0,
                    layout: subpass_layout,
                    stencil_layout: None,
                }],
                ..Default::default()
            }],
        );
        device.render_passes.insert(handle, state.clone());
        (handle, state)
    }

    fn color_framebuffer(
        device: &DeviceState,
        raw: u64,
        image: &Arc<ImageState>,
    ) -> vk::Framebuffer {
        let view = ImageViewState::new(
            vk::ImageView::from_raw(raw + 1),
            image.clone(),
            vk::ImageViewType::TYPE_2D,
            &vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
        )
        .unwrap();
        device.image_views.insert(view.handle(), view.clone());

        let handle = vk::Framebuffer::from_raw(raw);
        device
            .framebuffers
            .insert(handle, FramebufferState::new(handle, vec![view]));
        handle
    }

    fn attachment_image(device: &DeviceState, raw: u64) -> Arc<ImageState> {
        device.create_image(
            vk::Image::from_raw(raw),
            ImageCreateDesc {
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
        )
    }

    #[test]
    fn begin_checks_declared_initial_layout() {
        let (device, sink) = test_device();
        let image = attachment_image(&device, 0x80);
        let (rp, _) = color_attachment_pass(
            &device,
            0x81,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        let fb = color_framebuffer(&device, 0x82, &image);

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x83),
            CommandBufferLevel::Primary,
            0,
        );

        // The recording left the attachment in TRANSFER_DST, but the render
        // pass declares it starts in COLOR_ATTACHMENT_OPTIMAL.
        cb.tracker.set_layout(
            &image,
            &image.whole_range(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        );

        assert!(cmd_begin_render_pass(&device, &mut cb, rp, fb));
        assert_eq!(sink.count_vuid(VUID_INITIAL_LAYOUT), 1);
    }

    #[test]
    fn undefined_initial_layout_passes_silently() {
        let (device, sink) = test_device();
        let image = attachment_image(&device, 0x84);
        let (rp, _) = color_attachment_pass(
            &device,
            0x85,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        let fb = color_framebuffer(&device, 0x86, &image);

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x87),
            CommandBufferLevel::Primary,
            0,
        );

        cb.tracker.set_layout(
            &image,
            &image.whole_range(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        );

        // UNDEFINED discards: no mismatch however the image was left.
        assert!(!cmd_begin_render_pass(&device, &mut cb, rp, fb));
        assert_eq!(sink.count(), 0);

        // The render pass still transitions the attachment: subpass layout
        // while inside, final layout after the end.
        let map = cb.tracker().get(image.handle()).unwrap();
        let (_, entry) = map.iter().next().unwrap();
        assert_eq!(
            entry.current_layout,
            Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );

        assert!(!cmd_end_render_pass(&device, &mut cb));
        let map = cb.tracker().get(image.handle()).unwrap();
        let (_, entry) = map.iter().next().unwrap();
        assert_eq!(
            entry.current_layout,
            Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        );
    }

    #[test]
    fn attachment_count_mismatch_is_structural() {
        let (device, sink) = test_device();
        let (rp, _) = color_attachment_pass(
            &device,
            0x89,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        // An empty framebuffer against a one-attachment render pass.
        let fb = vk::Framebuffer::from_raw(0x8a);
        device
            .framebuffers
            .insert(fb, FramebufferState::new(fb, Vec::new()));

        let mut cb = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x8b),
            CommandBufferLevel::Primary,
            0,
        );

        assert!(cmd_begin_render_pass(&device, &mut cb, rp, fb));
        assert_eq!(sink.count_vuid(VUID_ATTACHMENT_COUNT), 1);
        // No attachment state was touched.
        assert!(cb.tracker().is_empty());
    }

    #[test]
    fn clear_attachments_defers_until_framebuffer_is_known() {
        let (device, sink) = test_device();
        let image = attachment_image(&device, 0x8c);
        let (rp, _) = color_attachment_pass(
            &device,
            0x8d,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        let fb = color_framebuffer(&device, 0x8e, &image);

        // A second render pass declaring a different subpass layout; the
        // secondary inherits this one, so its deferred expectation will
        // disagree with what the primary establishes.
        let (_, other_rp_state) = color_attachment_pass(
            &device,
            0x8f,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::GENERAL,
        );

        let mut secondary = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x90),
            CommandBufferLevel::Secondary,
            0,
        );
        secondary.begin(InheritanceInfo {
            render_pass: Some(other_rp_state),
            subpass: 0,
            framebuffer: None,
        });

        let clear = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue { float32: [0.0; 4] },
            },
        };

        // Without a framebuffer the check is captured, not run.
        assert!(!cmd_clear_attachments(&device, &mut secondary, &[clear]));
        assert_eq!(secondary.deferred.len(), 1);
        assert_eq!(sink.count(), 0);

        let mut primary = CommandBufferState::new(
            vk::CommandBuffer::from_raw(0x91),
            CommandBufferLevel::Primary,
            0,
        );
        cmd_begin_render_pass(&device, &mut primary, rp, fb);

        // Executing the secondary resolves the framebuffer: the attachment
        // is in COLOR_ATTACHMENT_OPTIMAL, the deferred expectation says
        // GENERAL.
        assert!(cmd_execute_commands(&device, &mut primary, &[&secondary]));
        assert_eq!(sink.count_vuid(VUID_CLEAR_ATTACHMENT_LAYOUT), 1);
    }
}
