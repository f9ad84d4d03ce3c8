//! Reporting of detected violations.
//!
//! Violations are data, not control flow: every validation routine reports
//! what it finds through a [`DiagnosticsSink`] and keeps scanning, so a
//! single command with many offending subresource ranges produces one message
//! per maximal run. The sink's return value is advisory: it tells the
//! dispatch layer whether the application asked for violations to be treated
//! as fatal. It is never used to cut a scan short.

use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// The kind of API object a violation refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Image,
    ImageView,
    Buffer,
    CommandBuffer,
    Queue,
    RenderPass,
    Framebuffer,
}

/// One API object involved in a violation, by raw handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub handle: u64,
    pub kind: ObjectKind,
}

impl ObjectInfo {
    pub fn image(handle: vk::Image) -> Self {
        ObjectInfo {
            handle: handle.as_raw(),
            kind: ObjectKind::Image,
        }
    }

    pub fn buffer(handle: vk::Buffer) -> Self {
        ObjectInfo {
            handle: handle.as_raw(),
            kind: ObjectKind::Buffer,
        }
    }

    pub fn command_buffer(handle: vk::CommandBuffer) -> Self {
        ObjectInfo {
            handle: handle.as_raw(),
            kind: ObjectKind::CommandBuffer,
        }
    }

    pub fn queue(handle: vk::Queue) -> Self {
        ObjectInfo {
            handle: handle.as_raw(),
            kind: ObjectKind::Queue,
        }
    }

    pub fn render_pass(handle: vk::RenderPass) -> Self {
        ObjectInfo {
            handle: handle.as_raw(),
            kind: ObjectKind::RenderPass,
        }
    }

    pub fn framebuffer(handle: vk::Framebuffer) -> Self {
        ObjectInfo {
            handle: handle.as_raw(),
            kind: ObjectKind::Framebuffer,
        }
    }
}

impl Display for ObjectInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:?}(0x{:x})", self.kind, self.handle)
    }
}

/// Receiver for detected violations.
///
/// `report` returns whether the caller should treat the violation as fatal
/// for the intercepted call. The core itself ignores the value and always
/// finishes scanning the affected range; it only folds the value into the
/// aggregate result handed back to the dispatch layer.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, objects: &[ObjectInfo], vuid: &str, message: &str) -> bool;
}

/// Default sink: forwards every violation to the `log` facade at `warn`
/// level and never asks for the call to be aborted.
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&self, objects: &[ObjectInfo], vuid: &str, message: &str) -> bool {
        let mut objects_text = String::new();

        for (index, object) in objects.iter().enumerate() {
            if index != 0 {
                objects_text.push_str(", ");
            }
            objects_text.push_str(&object.to_string());
        }

        log::warn!("[{}] [{}] {}", vuid, objects_text, message);
        false
    }
}

/// One violation captured by a [`CollectingSink`].
#[derive(Clone, Debug)]
pub struct Report {
    pub objects: Vec<ObjectInfo>,
    pub vuid: String,
    pub message: String,
}

/// Sink that stores every report, for inspection by tests and tools.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<Report>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.reports.lock().len()
    }

    /// Number of captured reports carrying the given rule identifier.
    pub fn count_vuid(&self, vuid: &str) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|report| report.vuid == vuid)
            .count()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl DiagnosticsSink for CollectingSink {
    fn report(&self, objects: &[ObjectInfo], vuid: &str, message: &str) -> bool {
        self.reports.lock().push(Report {
            objects: objects.to_vec(),
            vuid: vuid.to_owned(),
            message: message.to_owned(),
        });
        false
    }
}
