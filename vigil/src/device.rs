//! Device-wide validation state.
//!
//! One [`DeviceState`] exists per device and owns everything shared between
//! recordings: the object registries, the diagnostics sink, the format
//! oracle, the enabled check categories, and the device-wide set of pending
//! queue family releases. There is deliberately no device-wide lock around
//! layout state; serialization happens per image, inside each image's own
//! map lock.

use crate::{
    barrier::TransferKey,
    buffer::BufferState,
    diagnostics::{DiagnosticsSink, LogSink, ObjectInfo},
    format::{FormatOracle, KnownFormats},
    image::{ImageCreateDesc, ImageState, ImageViewState},
    render_pass::{FramebufferState, RenderPassState},
    store::Registry,
    CheckCategories, EnabledFeatures,
};
use ash::vk;
use foldhash::HashSet;
use parking_lot::Mutex;
use std::sync::Arc;

pub struct DeviceState {
    pub checks: CheckCategories,
    pub features: EnabledFeatures,
    sink: Arc<dyn DiagnosticsSink>,
    oracle: Arc<dyn FormatOracle>,
    pub images: Registry<vk::Image, ImageState>,
    pub image_views: Registry<vk::ImageView, ImageViewState>,
    pub buffers: Registry<vk::Buffer, BufferState>,
    pub render_passes: Registry<vk::RenderPass, RenderPassState>,
    pub framebuffers: Registry<vk::Framebuffer, FramebufferState>,
    // Releases submitted but not yet consumed by a matching acquire.
    pending_releases: Mutex<HashSet<TransferKey>>,
}

impl DeviceState {
    pub fn new(sink: Arc<dyn DiagnosticsSink>, oracle: Arc<dyn FormatOracle>) -> Self {
        DeviceState {
            checks: CheckCategories::default(),
            features: EnabledFeatures::default(),
            sink,
            oracle,
            images: Registry::new(),
            image_views: Registry::new(),
            buffers: Registry::new(),
            render_passes: Registry::new(),
            framebuffers: Registry::new(),
            pending_releases: Mutex::new(HashSet::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(Arc::new(LogSink), Arc::new(KnownFormats))
    }

    pub fn sink(&self) -> &dyn DiagnosticsSink {
        &*self.sink
    }

    pub fn oracle(&self) -> &dyn FormatOracle {
        &*self.oracle
    }

    /// Registers the shadow state for a newly created image.
    pub fn create_image(&self, handle: vk::Image, desc: ImageCreateDesc) -> Arc<ImageState> {
        let state = ImageState::new(handle, desc, &*self.oracle);
        self.images.insert(handle, state.clone());
        state
    }

    /// Drops the shadow state of a destroyed image, taking its global layout
    /// map with it. Readers holding a snapshot of the state finish their
    /// scan on the snapshot.
    pub fn destroy_image(&self, handle: vk::Image) {
        self.images.remove(handle);
    }

    /// Reports one violation through the sink and returns its advisory
    /// verdict.
    pub fn report(&self, objects: &[ObjectInfo], vuid: &str, message: &str) -> bool {
        self.sink.report(objects, vuid, message)
    }

    pub(crate) fn pending_releases(&self) -> &Mutex<HashSet<TransferKey>> {
        &self.pending_releases
    }
}
