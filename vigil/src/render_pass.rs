//! Shadow state for render passes and framebuffers.
//!
//! Only the layout-relevant slice of a render pass is mirrored here: which
//! layouts each attachment is declared to start and end in, and which layout
//! each subpass holds it in while the subpass executes. Everything else
//! about render passes is somebody else's problem.

use crate::image::ImageViewState;
use ash::vk;
use std::sync::Arc;

/// Layout-relevant fields of one attachment description.
#[derive(Clone, Debug)]
pub struct AttachmentDesc {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    /// Separate stencil layouts, when the application supplied them.
    pub stencil_initial_layout: Option<vk::ImageLayout>,
    pub stencil_final_layout: Option<vk::ImageLayout>,
}

/// A reference from a subpass to an attachment, with the layout the
/// attachment holds for the duration of the subpass.
#[derive(Clone, Copy, Debug)]
pub struct AttachmentRef {
    pub attachment: u32,
    pub layout: vk::ImageLayout,
    pub stencil_layout: Option<vk::ImageLayout>,
}

impl AttachmentRef {
    pub fn is_unused(&self) -> bool {
        self.attachment == vk::ATTACHMENT_UNUSED
    }
}

#[derive(Clone, Debug, Default)]
pub struct SubpassDesc {
    pub input_attachments: Vec<AttachmentRef>,
    pub color_attachments: Vec<AttachmentRef>,
    pub resolve_attachments: Vec<AttachmentRef>,
    pub depth_stencil_attachment: Option<AttachmentRef>,
}

impl SubpassDesc {
    fn references(&self) -> impl Iterator<Item = &AttachmentRef> {
        self.input_attachments
            .iter()
            .chain(&self.color_attachments)
            .chain(&self.resolve_attachments)
            .chain(self.depth_stencil_attachment.as_ref())
    }
}

#[derive(Debug)]
pub struct RenderPassState {
    handle: vk::RenderPass,
    attachments: Vec<AttachmentDesc>,
    subpasses: Vec<SubpassDesc>,
}

impl RenderPassState {
    pub fn new(
        handle: vk::RenderPass,
        attachments: Vec<AttachmentDesc>,
        subpasses: Vec<SubpassDesc>,
    ) -> Arc<Self> {
        assert!(!subpasses.is_empty());

        Arc::new(RenderPassState {
            handle,
            attachments,
            subpasses,
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn attachments(&self) -> &[AttachmentDesc] {
        &self.attachments
    }

    pub fn subpasses(&self) -> &[SubpassDesc] {
        &self.subpasses
    }

    /// The layout `attachment` holds during `subpass`, or `None` if the
    /// subpass does not reference it (its layout is then unchanged).
    pub fn subpass_layout(&self, subpass: u32, attachment: u32) -> Option<&AttachmentRef> {
        self.subpasses
            .get(subpass as usize)?
            .references()
            .find(|reference| !reference.is_unused() && reference.attachment == attachment)
    }
}

#[derive(Debug)]
pub struct FramebufferState {
    handle: vk::Framebuffer,
    attachments: Vec<Arc<ImageViewState>>,
}

impl FramebufferState {
    pub fn new(handle: vk::Framebuffer, attachments: Vec<Arc<ImageViewState>>) -> Arc<Self> {
        Arc::new(FramebufferState {
            handle,
            attachments,
        })
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    pub fn attachments(&self) -> &[Arc<ImageViewState>] {
        &self.attachments
    }
}
