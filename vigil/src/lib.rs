//! Validation core that shadows image layout state for Vulkan.
//!
//! `vigil` sits between an application and the driver, behind whatever
//! interception mechanism the deployment uses, and maintains a shadow model
//! of every image's per-subresource layout: the layout each command buffer
//! asserts on first use, the layout each recorded transition establishes,
//! and the device-wide layout that submissions leave behind. Every
//! layout-affecting command (pipeline barriers in both encodings, render
//! pass transitions, copies, blits, resolves and clears) is checked against
//! that model before it reaches the driver.
//!
//! The crate is deliberately observational: violations are reported through
//! a [`DiagnosticsSink`] and validation always runs to completion. Whether a
//! flagged call is forwarded to the driver is the dispatch layer's decision,
//! made from the aggregate result every entry point returns.
//!
//! # Collaborators
//!
//! - The dispatch trampoline resolves handles and calls into
//!   [`commands`] and [`queue`] with live shadow state; see [`DeviceState`].
//! - The [`FormatOracle`] answers format capability questions.
//! - The [`DiagnosticsSink`] records violations; the default [`LogSink`]
//!   forwards them to the `log` facade.
//!
//! [`DiagnosticsSink`]: diagnostics::DiagnosticsSink
//! [`LogSink`]: diagnostics::LogSink
//! [`FormatOracle`]: format::FormatOracle
//! [`DeviceState`]: device::DeviceState

pub mod barrier;
pub mod buffer;
pub mod command_buffer;
pub mod commands;
pub mod deferred;
pub mod device;
pub mod diagnostics;
pub mod format;
pub mod image;
pub mod layout;
pub mod layout_map;
pub mod queue;
pub mod render_pass;
pub mod store;
pub mod subresource;
pub mod tracker;

pub use crate::{
    command_buffer::{CommandBufferLevel, CommandBufferState},
    device::DeviceState,
    image::ImageCreateDesc,
};

/// Which rule categories are checked. A disabled category makes every entry
/// point it governs return "no problems" immediately, without touching any
/// tracker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckCategories {
    /// Layout mismatch checks against the recorded and global layout model.
    pub image_layout: bool,
    /// Queue family ownership transfer protocol checks.
    pub queue_family_transfer: bool,
    /// Target-layout-versus-image-usage checks.
    pub usage: bool,
    /// Target-layout-versus-format-feature checks.
    pub format_features: bool,
}

impl CheckCategories {
    pub const fn all() -> Self {
        CheckCategories {
            image_layout: true,
            queue_family_transfer: true,
            usage: true,
            format_features: true,
        }
    }

    pub const fn none() -> Self {
        CheckCategories {
            image_layout: false,
            queue_family_transfer: false,
            usage: false,
            format_features: false,
        }
    }
}

impl Default for CheckCategories {
    fn default() -> Self {
        Self::all()
    }
}

/// Device features that change validation semantics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnabledFeatures {
    /// With synchronization2, a barrier whose old and new layouts are equal
    /// is a no-op transition and leaves no tracker history.
    pub synchronization2: bool,
    /// With separate depth/stencil layouts, the depth and stencil aspects of
    /// a combined barrier are validated independently.
    pub separate_depth_stencil_layouts: bool,
}
