//! Per-command-buffer recording state.
//!
//! A [`CommandBufferState`] lives for one record/submit/reset cycle. It owns
//! the recording's layout tracker, the queue family ownership transfer sets,
//! the deferred-check queue, and the active render pass instance, and is only
//! ever touched by the thread currently recording the command buffer.

use crate::{
    barrier::TransferKey,
    deferred::DeferredCheck,
    render_pass::{FramebufferState, RenderPassState},
    tracker::LayoutTracker,
};
use ash::vk;
use foldhash::HashSet;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandBufferLevel {
    Primary,
    Secondary,
}

/// The render pass instance a primary command buffer is currently inside.
#[derive(Clone)]
pub struct RenderPassInstance {
    pub render_pass: Arc<RenderPassState>,
    pub framebuffer: Option<Arc<FramebufferState>>,
    pub subpass: u32,
}

/// Render pass state a secondary command buffer inherits from the primary it
/// will execute inside. The framebuffer is optional: when absent, checks
/// that need it are deferred until execute time.
#[derive(Clone, Default)]
pub struct InheritanceInfo {
    pub render_pass: Option<Arc<RenderPassState>>,
    pub subpass: u32,
    pub framebuffer: Option<Arc<FramebufferState>>,
}

pub struct CommandBufferState {
    handle: vk::CommandBuffer,
    level: CommandBufferLevel,
    // The family of the pool the command buffer was allocated from. Decides
    // which half of an ownership transfer a barrier is.
    queue_family_index: u32,
    pub(crate) tracker: LayoutTracker,
    pub(crate) release_barriers: HashSet<TransferKey>,
    pub(crate) acquire_barriers: Vec<TransferKey>,
    pub(crate) deferred: Vec<DeferredCheck>,
    pub(crate) render_pass: Option<RenderPassInstance>,
    pub(crate) inheritance: InheritanceInfo,
}

impl CommandBufferState {
    pub fn new(handle: vk::CommandBuffer, level: CommandBufferLevel, queue_family_index: u32) -> Self {
        CommandBufferState {
            handle,
            level,
            queue_family_index,
            tracker: LayoutTracker::new(),
            release_barriers: HashSet::default(),
            acquire_barriers: Vec::new(),
            deferred: Vec::new(),
            render_pass: None,
            inheritance: InheritanceInfo::default(),
        }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn tracker(&self) -> &LayoutTracker {
        &self.tracker
    }

    pub fn release_barriers(&self) -> impl Iterator<Item = &TransferKey> {
        self.release_barriers.iter()
    }

    pub fn acquire_barriers(&self) -> &[TransferKey] {
        &self.acquire_barriers
    }

    /// Begins a new recording. For a secondary command buffer,
    /// `inheritance` carries the render pass state inherited from the
    /// primary.
    pub fn begin(&mut self, inheritance: InheritanceInfo) {
        self.reset();
        self.inheritance = inheritance;
    }

    /// Returns the command buffer to its freshly-allocated state. All
    /// recorded layout assertions, ownership transfer sets and deferred
    /// checks vanish.
    pub fn reset(&mut self) {
        self.tracker.clear();
        self.release_barriers.clear();
        self.acquire_barriers.clear();
        self.deferred.clear();
        self.render_pass = None;
        self.inheritance = InheritanceInfo::default();
    }

    /// The render pass this command buffer currently records inside: its own
    /// active instance for a primary, the inherited one for a secondary.
    pub(crate) fn current_render_pass(
        &self,
    ) -> Option<(&Arc<RenderPassState>, Option<&Arc<FramebufferState>>, u32)> {
        if let Some(instance) = &self.render_pass {
            Some((
                &instance.render_pass,
                instance.framebuffer.as_ref(),
                instance.subpass,
            ))
        } else {
            self.inheritance.render_pass.as_ref().map(|render_pass| {
                (
                    render_pass,
                    self.inheritance.framebuffer.as_ref(),
                    self.inheritance.subpass,
                )
            })
        }
    }
}
