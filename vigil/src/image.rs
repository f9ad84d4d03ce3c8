//! Shadow state for images and image views.
//!
//! An [`ImageState`] mirrors the creation parameters the validator needs and
//! owns the image's *global* layout map: the last known layout of every
//! subresource across all submissions so far. The global map is only written
//! at submission-time reconciliation and read when validating the next
//! command buffer that touches the image, always through the per-image
//! reader/writer lock.

use crate::{
    format::FormatOracle,
    layout_map::ImageLayoutMap,
    subresource::{NormalizedSubresourceRange, RangeError, SubresourceGeometry, SubresourceIndex},
};
use ash::vk;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rangemap::RangeMap;
use smallvec::SmallVec;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// The subset of image creation parameters that layout validation consumes.
#[derive(Clone, Debug)]
pub struct ImageCreateDesc {
    pub flags: vk::ImageCreateFlags,
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: SmallVec<[u32; 4]>,
    pub initial_layout: vk::ImageLayout,
}

impl Default for ImageCreateDesc {
    fn default() -> Self {
        ImageCreateDesc {
            flags: vk::ImageCreateFlags::empty(),
            image_type: vk::ImageType::TYPE_2D,
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::empty(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: SmallVec::new(),
            initial_layout: vk::ImageLayout::UNDEFINED,
        }
    }
}

/// Validator-side state of one live image.
#[derive(Debug)]
pub struct ImageState {
    handle: vk::Image,
    desc: ImageCreateDesc,
    geometry: SubresourceGeometry,
    // Owned by the presentation engine after a present that has not been
    // re-acquired. Barriers on such an image violate the hand-off protocol.
    presented: AtomicBool,
    global_layout: RwLock<RangeMap<SubresourceIndex, vk::ImageLayout>>,
}

impl ImageState {
    pub fn new(handle: vk::Image, desc: ImageCreateDesc, oracle: &dyn FormatOracle) -> Arc<Self> {
        // A 3D image created 2D-array-compatible is tracked with one "layer"
        // per depth slice, so that attachment views of individual slices get
        // individual layout state.
        let tracked_layers = if desc.image_type == vk::ImageType::TYPE_3D
            && desc
                .flags
                .contains(vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE)
        {
            desc.extent.depth.max(1)
        } else {
            desc.array_layers
        };

        let geometry =
            SubresourceGeometry::new(oracle.aspects(desc.format), desc.mip_levels, tracked_layers);

        let mut global_layout = RangeMap::new();
        global_layout.insert(0..geometry.subresource_count(), desc.initial_layout);

        Arc::new(ImageState {
            handle,
            desc,
            geometry,
            presented: AtomicBool::new(false),
            global_layout: RwLock::new(global_layout),
        })
    }

    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn desc(&self) -> &ImageCreateDesc {
        &self.desc
    }

    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.desc.usage
    }

    pub fn geometry(&self) -> &SubresourceGeometry {
        &self.geometry
    }

    /// A fresh per-recording layout map for this image.
    pub fn new_layout_map(&self) -> ImageLayoutMap {
        ImageLayoutMap::new(self.geometry.clone())
    }

    /// Resolves a barrier or clear range against this image.
    ///
    /// For 3D images the array layer axis is forced to cover every depth
    /// slice: a transition of a 3D image always applies to the whole depth,
    /// whichever of the permitted layer spellings the application used.
    pub fn normalize_range(
        &self,
        range: &vk::ImageSubresourceRange,
    ) -> Result<NormalizedSubresourceRange, RangeError> {
        let mut normalized = self.geometry.normalize(range)?;

        if self.desc.image_type == vk::ImageType::TYPE_3D {
            normalized.array_layers = 0..self.geometry.array_layers();
        }

        Ok(normalized)
    }

    pub fn whole_range(&self) -> NormalizedSubresourceRange {
        self.geometry.whole_range()
    }

    pub fn is_presented(&self) -> bool {
        self.presented.load(Ordering::Acquire)
    }

    pub fn set_presented(&self, presented: bool) {
        self.presented.store(presented, Ordering::Release);
    }

    pub fn global_layout(
        &self,
    ) -> RwLockReadGuard<'_, RangeMap<SubresourceIndex, vk::ImageLayout>> {
        self.global_layout.read()
    }

    pub fn global_layout_mut(
        &self,
    ) -> RwLockWriteGuard<'_, RangeMap<SubresourceIndex, vk::ImageLayout>> {
        self.global_layout.write()
    }
}

/// Validator-side state of one image view.
///
/// The view's subresource selection is normalized once, at creation, so
/// everything downstream (framebuffer attachment transitions in particular)
/// works on resolved ranges.
#[derive(Debug)]
pub struct ImageViewState {
    handle: vk::ImageView,
    image: Arc<ImageState>,
    range: NormalizedSubresourceRange,
}

impl ImageViewState {
    pub fn new(
        handle: vk::ImageView,
        image: Arc<ImageState>,
        view_type: vk::ImageViewType,
        range: &vk::ImageSubresourceRange,
    ) -> Result<Arc<Self>, RangeError> {
        // For a 2D (array) view of a 2D-array-compatible 3D image, the
        // view's layer fields address depth slices, which the image's
        // geometry already models as layers: a view of one slice tracks one
        // slice. A 3D view always covers the full depth.
        let mut range = image.geometry().normalize(range)?;

        if image.desc().image_type == vk::ImageType::TYPE_3D
            && view_type == vk::ImageViewType::TYPE_3D
        {
            range.array_layers = 0..image.geometry().array_layers();
        }

        Ok(Arc::new(ImageViewState {
            handle,
            image,
            range,
        }))
    }

    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    pub fn image(&self) -> &Arc<ImageState> {
        &self.image
    }

    pub fn range(&self) -> &NormalizedSubresourceRange {
        &self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::KnownFormats;

    #[test]
    fn global_map_starts_at_creation_layout() {
        let desc = ImageCreateDesc {
            mip_levels: 3,
            array_layers: 2,
            initial_layout: vk::ImageLayout::PREINITIALIZED,
            tiling: vk::ImageTiling::LINEAR,
            ..Default::default()
        };
        let image = ImageState::new(vk::Image::null(), desc, &KnownFormats);

        let global = image.global_layout();
        let entries: Vec<_> = global.iter().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(*entries[0].1, vk::ImageLayout::PREINITIALIZED);
    }

    #[test]
    fn three_d_array_compatible_tracks_depth_slices() {
        let desc = ImageCreateDesc {
            image_type: vk::ImageType::TYPE_3D,
            flags: vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE,
            extent: vk::Extent3D {
                width: 16,
                height: 16,
                depth: 8,
            },
            ..Default::default()
        };
        let image = ImageState::new(vk::Image::null(), desc, &KnownFormats);

        assert_eq!(image.geometry().array_layers(), 8);

        // The single permitted layer spelling for a 3D image expands to all
        // depth slices.
        let range = image
            .normalize_range(&vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .unwrap();
        assert_eq!(range.array_layers, 0..8);
    }

    #[test]
    fn view_of_single_slice_keeps_its_range() {
        let desc = ImageCreateDesc {
            image_type: vk::ImageType::TYPE_3D,
            flags: vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE,
            extent: vk::Extent3D {
                width: 16,
                height: 16,
                depth: 8,
            },
            ..Default::default()
        };
        let image = ImageState::new(vk::Image::null(), desc, &KnownFormats);

        let view = ImageViewState::new(
            vk::ImageView::null(),
            image,
            vk::ImageViewType::TYPE_2D,
            &vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 5,
                layer_count: 1,
            },
        )
        .unwrap();

        assert_eq!(view.range().array_layers, 5..6);
    }
}
