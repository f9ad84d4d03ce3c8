//! Deferred validation work.
//!
//! A secondary command buffer recorded with an inherited render pass may not
//! know its framebuffer until `vkCmdExecuteCommands` names the primary it
//! runs inside. Checks that need the framebuffer capture the few values they
//! depend on into a [`DeferredCheck`] (a plain value object, not a closure
//! over live state), and the execute-commands handler drains the queue once
//! the framebuffer is known.

use ash::vk;

#[derive(Clone, Debug)]
pub enum DeferredCheck {
    /// An expectation that `attachment` is in `expected` layout during
    /// `subpass`, recorded before the framebuffer was known.
    AttachmentLayout {
        attachment: u32,
        subpass: u32,
        aspects: vk::ImageAspectFlags,
        expected: vk::ImageLayout,
        vuid: &'static str,
    },
}
