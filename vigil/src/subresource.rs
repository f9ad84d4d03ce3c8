//! Addressing of image subresources as ranges of a linear index space.
//!
//! Every subresource of an image, one (aspect, mip level, array layer)
//! triple, is assigned a dense linear index. The index space is arranged
//! hierarchically: aspects at the top level, with the mip levels in that
//! aspect, and the array layers in that mip level. Layout state is then
//! stored in interval maps keyed by this index, so that a transition
//! covering thousands of subresources occupies a single map entry.

use ash::vk;
use smallvec::SmallVec;
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
    iter::FusedIterator,
    ops::Range,
};

/// The linear index of a single subresource within an image.
pub type SubresourceIndex = u64;

/// One (aspect, mip level, array layer) unit of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subresource {
    pub aspect: vk::ImageAspectFlags,
    pub mip_level: u32,
    pub array_layer: u32,
}

/// A subresource selection with all sentinels resolved against the owning
/// image.
///
/// Two normalized forms of the same selection compare equal, which makes this
/// type usable as a content-equality key (queue family ownership transfers
/// rely on that).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormalizedSubresourceRange {
    pub aspects: vk::ImageAspectFlags,
    pub mip_levels: Range<u32>,
    pub array_layers: Range<u32>,
}

impl NormalizedSubresourceRange {
    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty() || self.mip_levels.is_empty() || self.array_layers.is_empty()
    }
}

/// Error produced when a subresource range does not address the image it is
/// used with. The caller reports it and skips deeper checks for the one item
/// that carried the range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RangeError {
    AspectsNotInImage {
        aspects: vk::ImageAspectFlags,
        image_aspects: vk::ImageAspectFlags,
    },
    MipLevelsOutOfRange {
        range_end: u32,
        mip_levels: u32,
    },
    ArrayLayersOutOfRange {
        range_end: u32,
        array_layers: u32,
    },
}

impl Error for RangeError {}

impl Display for RangeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::AspectsNotInImage {
                aspects,
                image_aspects,
            } => write!(
                f,
                "the aspects {:?} are not present in the image, which has aspects {:?}",
                aspects, image_aspects,
            ),
            Self::MipLevelsOutOfRange {
                range_end,
                mip_levels,
            } => write!(
                f,
                "the end of the mip level range ({}) is greater than the number of mip levels in \
                the image ({})",
                range_end, mip_levels,
            ),
            Self::ArrayLayersOutOfRange {
                range_end,
                array_layers,
            } => write!(
                f,
                "the end of the array layer range ({}) is greater than the number of array layers \
                in the image ({})",
                range_end, array_layers,
            ),
        }
    }
}

// Aspect bits that occupy an encoding slot, in slot order. Planes of
// multi-planar formats get their own slots; metadata never carries a layout.
const SLOT_ASPECTS: [vk::ImageAspectFlags; 6] = [
    vk::ImageAspectFlags::COLOR,
    vk::ImageAspectFlags::DEPTH,
    vk::ImageAspectFlags::STENCIL,
    vk::ImageAspectFlags::PLANE_0,
    vk::ImageAspectFlags::PLANE_1,
    vk::ImageAspectFlags::PLANE_2,
];

/// The encoding geometry of one image: which aspects it has and how its
/// subresource indices are laid out.
///
/// `encode` and `decode` are mutual inverses over
/// `[0, aspect_count * mip_levels * array_layers)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubresourceGeometry {
    aspect_list: SmallVec<[vk::ImageAspectFlags; 4]>,
    mip_levels: u32,
    array_layers: u32,
    // Number of indices covered by one aspect and by one mip level.
    aspect_size: u64,
    mip_level_size: u64,
}

impl SubresourceGeometry {
    pub fn new(aspect_mask: vk::ImageAspectFlags, mip_levels: u32, array_layers: u32) -> Self {
        assert!(mip_levels >= 1);
        assert!(array_layers >= 1);

        let aspect_list: SmallVec<[vk::ImageAspectFlags; 4]> = SLOT_ASPECTS
            .into_iter()
            .filter(|&aspect| aspect_mask.contains(aspect))
            .collect();
        assert!(!aspect_list.is_empty());

        let mip_level_size = array_layers as u64;
        let aspect_size = mip_levels as u64 * mip_level_size;

        SubresourceGeometry {
            aspect_list,
            mip_levels,
            array_layers,
            aspect_size,
            mip_level_size,
        }
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// The aspects of the image that occupy encoding slots.
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        self.aspect_list
            .iter()
            .fold(vk::ImageAspectFlags::empty(), |mask, &aspect| mask | aspect)
    }

    /// Total number of subresources in the image.
    pub fn subresource_count(&self) -> u64 {
        self.aspect_list.len() as u64 * self.aspect_size
    }

    fn aspect_num(&self, aspect: vk::ImageAspectFlags) -> Option<usize> {
        self.aspect_list.iter().position(|&a| a == aspect)
    }

    /// The aspect that the subresource at `index` belongs to.
    pub fn aspect_at(&self, index: SubresourceIndex) -> vk::ImageAspectFlags {
        self.aspect_list[(index / self.aspect_size) as usize]
    }

    pub fn encode(&self, subresource: Subresource) -> Option<SubresourceIndex> {
        let aspect_num = self.aspect_num(subresource.aspect)?;

        if subresource.mip_level >= self.mip_levels || subresource.array_layer >= self.array_layers
        {
            return None;
        }

        Some(
            aspect_num as u64 * self.aspect_size
                + subresource.mip_level as u64 * self.mip_level_size
                + subresource.array_layer as u64,
        )
    }

    pub fn decode(&self, index: SubresourceIndex) -> Subresource {
        debug_assert!(index < self.subresource_count());

        let aspect = self.aspect_list[(index / self.aspect_size) as usize];
        let within_aspect = index % self.aspect_size;

        Subresource {
            aspect,
            mip_level: (within_aspect / self.mip_level_size) as u32,
            array_layer: (within_aspect % self.mip_level_size) as u32,
        }
    }

    /// Resolves a raw Vulkan subresource range against this image: the
    /// `REMAINING_*` sentinels are replaced by concrete counts, and on
    /// multi-planar images a `COLOR` aspect selects every plane.
    ///
    /// Out-of-range selections are an error; an empty selection is not (it
    /// normalizes to an empty range, and every range operation treats an
    /// empty range as a no-op).
    pub fn normalize(
        &self,
        range: &vk::ImageSubresourceRange,
    ) -> Result<NormalizedSubresourceRange, RangeError> {
        let mut aspects = range.aspect_mask & !vk::ImageAspectFlags::METADATA;

        // On multi-planar images, addressing the color aspect addresses all
        // planes at once.
        if aspects.contains(vk::ImageAspectFlags::COLOR)
            && self.aspect_num(vk::ImageAspectFlags::PLANE_0).is_some()
        {
            aspects &= !vk::ImageAspectFlags::COLOR;
            aspects |= vk::ImageAspectFlags::PLANE_0 | vk::ImageAspectFlags::PLANE_1;

            if self.aspect_num(vk::ImageAspectFlags::PLANE_2).is_some() {
                aspects |= vk::ImageAspectFlags::PLANE_2;
            }
        }

        if !self.aspect_mask().contains(aspects) {
            return Err(RangeError::AspectsNotInImage {
                aspects,
                image_aspects: self.aspect_mask(),
            });
        }

        let level_count = if range.level_count == vk::REMAINING_MIP_LEVELS {
            self.mip_levels.saturating_sub(range.base_mip_level)
        } else {
            range.level_count
        };
        let layer_count = if range.layer_count == vk::REMAINING_ARRAY_LAYERS {
            self.array_layers.saturating_sub(range.base_array_layer)
        } else {
            range.layer_count
        };

        let mip_levels = range.base_mip_level..range.base_mip_level.saturating_add(level_count);
        let array_layers =
            range.base_array_layer..range.base_array_layer.saturating_add(layer_count);

        if mip_levels.end > self.mip_levels {
            return Err(RangeError::MipLevelsOutOfRange {
                range_end: mip_levels.end,
                mip_levels: self.mip_levels,
            });
        }

        if array_layers.end > self.array_layers {
            return Err(RangeError::ArrayLayersOutOfRange {
                range_end: array_layers.end,
                array_layers: self.array_layers,
            });
        }

        Ok(NormalizedSubresourceRange {
            aspects,
            mip_levels,
            array_layers,
        })
    }

    /// A normalized range covering every subresource of the image.
    pub fn whole_range(&self) -> NormalizedSubresourceRange {
        NormalizedSubresourceRange {
            aspects: self.aspect_mask(),
            mip_levels: 0..self.mip_levels,
            array_layers: 0..self.array_layers,
        }
    }

    /// Returns an iterator over the maximal linear index intervals covering
    /// exactly the subresources selected by `range`.
    ///
    /// When the selection covers whole mip levels or whole aspects, adjacent
    /// runs are merged, so a full-image selection yields a single interval.
    pub fn iter_ranges(&self, range: &NormalizedSubresourceRange) -> SubresourceRangeIterator {
        debug_assert!(self.aspect_mask().contains(range.aspects));
        debug_assert!(range.mip_levels.end <= self.mip_levels);
        debug_assert!(range.array_layers.end <= self.array_layers);

        SubresourceRangeIterator::new(self, range)
    }

    /// Splits `interval` at aspect slot boundaries, pairing each piece with
    /// the aspect it lies in. Comparison rules are aspect-dependent, so
    /// validation walks never compare across a boundary.
    pub fn split_per_aspect(
        &self,
        interval: Range<SubresourceIndex>,
    ) -> impl Iterator<Item = (Range<SubresourceIndex>, vk::ImageAspectFlags)> + '_ {
        let aspect_size = self.aspect_size;
        let mut start = interval.start;
        let end = interval.end;

        std::iter::from_fn(move || {
            if start >= end {
                return None;
            }

            let slot_end = (start / aspect_size + 1) * aspect_size;
            let piece_end = slot_end.min(end);
            let piece = start..piece_end;
            start = piece_end;

            Some((piece.clone(), self.aspect_at(piece.start)))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IterStrategy {
    /// Only some array layers are selected: one interval per (aspect, mip
    /// level) pair.
    SomeLayers,
    /// All layers but only some mip levels: one interval per aspect.
    SomeLevelsAllLayers,
    /// All layers and all levels: one interval per run of adjacent aspect
    /// slots.
    AllLevelsAllLayers,
}

/// Iterator over the linear index intervals selected by a normalized
/// subresource range. Cloning it restarts the walk from its current position.
#[derive(Clone, Debug)]
pub struct SubresourceRangeIterator {
    strategy: IterStrategy,
    aspect_size: u64,
    mip_level_size: u64,
    mip_levels: Range<u32>,
    array_layers: Range<u32>,

    aspect_nums: SmallVec<[usize; 4]>,
    next_aspect: usize,
    current_mip_level: u32,
}

impl SubresourceRangeIterator {
    fn new(geometry: &SubresourceGeometry, range: &NormalizedSubresourceRange) -> Self {
        let strategy = if range.is_empty() {
            // Represented by an exhausted iterator below.
            IterStrategy::SomeLayers
        } else if range.array_layers != (0..geometry.array_layers) {
            IterStrategy::SomeLayers
        } else if range.mip_levels != (0..geometry.mip_levels) {
            IterStrategy::SomeLevelsAllLayers
        } else {
            IterStrategy::AllLevelsAllLayers
        };

        let aspect_nums: SmallVec<[usize; 4]> = if range.is_empty() {
            SmallVec::new()
        } else {
            SLOT_ASPECTS
                .into_iter()
                .filter(|&a| range.aspects.contains(a))
                .map(|a| geometry.aspect_num(a).unwrap())
                .collect()
        };

        SubresourceRangeIterator {
            strategy,
            aspect_size: geometry.aspect_size,
            mip_level_size: geometry.mip_level_size,
            mip_levels: range.mip_levels.clone(),
            array_layers: range.array_layers.clone(),
            aspect_nums,
            next_aspect: 0,
            current_mip_level: range.mip_levels.start,
        }
    }
}

impl Iterator for SubresourceRangeIterator {
    type Item = Range<SubresourceIndex>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.strategy {
            IterStrategy::SomeLayers => {
                let &aspect_num = self.aspect_nums.get(self.next_aspect)?;
                let offset = aspect_num as u64 * self.aspect_size
                    + self.current_mip_level as u64 * self.mip_level_size;

                self.current_mip_level += 1;
                if self.current_mip_level >= self.mip_levels.end {
                    self.current_mip_level = self.mip_levels.start;
                    self.next_aspect += 1;
                }

                let start = offset + self.array_layers.start as u64;
                let end = offset + self.array_layers.end as u64;
                Some(start..end)
            }
            IterStrategy::SomeLevelsAllLayers => {
                let &aspect_num = self.aspect_nums.get(self.next_aspect)?;
                self.next_aspect += 1;

                let offset = aspect_num as u64 * self.aspect_size;
                let start = offset + self.mip_levels.start as u64 * self.mip_level_size;
                let end = offset + self.mip_levels.end as u64 * self.mip_level_size;
                Some(start..end)
            }
            IterStrategy::AllLevelsAllLayers => {
                let &run_start = self.aspect_nums.get(self.next_aspect)?;
                self.next_aspect += 1;
                let mut run_end = run_start + 1;

                // Adjacent aspect slots form one contiguous interval.
                while self.aspect_nums.get(self.next_aspect) == Some(&run_end) {
                    self.next_aspect += 1;
                    run_end += 1;
                }

                Some(run_start as u64 * self.aspect_size..run_end as u64 * self.aspect_size)
            }
        }
    }
}

impl FusedIterator for SubresourceRangeIterator {}
