//! Normalized barrier shapes.
//!
//! The API spells barriers four ways: image or buffer, in the legacy
//! single-struct encoding or the synchronization2 dependency-info encoding.
//! The validators run one algorithm over a normalized form; the original
//! encoding survives only as a [`BarrierScope`] tag, because the two
//! encodings are covered by different rule clauses.

use crate::subresource::NormalizedSubresourceRange;
use ash::vk;
use std::ops::Range;

/// Which encoding a barrier arrived in. Selects the rule identifiers used
/// for its violations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierScope {
    /// `vkCmdPipelineBarrier` and friends.
    Legacy,
    /// `vkCmdPipelineBarrier2` dependency-info style.
    DependencyInfo,
}

/// An image barrier reduced to the fields layout validation consumes.
#[derive(Clone, Debug)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
    pub subresource_range: vk::ImageSubresourceRange,
}

impl From<&vk::ImageMemoryBarrier<'_>> for ImageBarrier {
    fn from(barrier: &vk::ImageMemoryBarrier<'_>) -> Self {
        ImageBarrier {
            image: barrier.image,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
            src_queue_family_index: barrier.src_queue_family_index,
            dst_queue_family_index: barrier.dst_queue_family_index,
            subresource_range: barrier.subresource_range,
        }
    }
}

impl From<&vk::ImageMemoryBarrier2<'_>> for ImageBarrier {
    fn from(barrier: &vk::ImageMemoryBarrier2<'_>) -> Self {
        ImageBarrier {
            image: barrier.image,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
            src_queue_family_index: barrier.src_queue_family_index,
            dst_queue_family_index: barrier.dst_queue_family_index,
            subresource_range: barrier.subresource_range,
        }
    }
}

impl ImageBarrier {
    pub fn has_ownership_transfer(&self) -> bool {
        has_ownership_transfer(self.src_queue_family_index, self.dst_queue_family_index)
    }
}

/// A buffer barrier reduced to the fields ownership-transfer validation
/// consumes.
#[derive(Clone, Debug)]
pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
}

impl From<&vk::BufferMemoryBarrier<'_>> for BufferBarrier {
    fn from(barrier: &vk::BufferMemoryBarrier<'_>) -> Self {
        BufferBarrier {
            buffer: barrier.buffer,
            offset: barrier.offset,
            size: barrier.size,
            src_queue_family_index: barrier.src_queue_family_index,
            dst_queue_family_index: barrier.dst_queue_family_index,
        }
    }
}

impl From<&vk::BufferMemoryBarrier2<'_>> for BufferBarrier {
    fn from(barrier: &vk::BufferMemoryBarrier2<'_>) -> Self {
        BufferBarrier {
            buffer: barrier.buffer,
            offset: barrier.offset,
            size: barrier.size,
            src_queue_family_index: barrier.src_queue_family_index,
            dst_queue_family_index: barrier.dst_queue_family_index,
        }
    }
}

impl BufferBarrier {
    pub fn has_ownership_transfer(&self) -> bool {
        has_ownership_transfer(self.src_queue_family_index, self.dst_queue_family_index)
    }
}

fn has_ownership_transfer(src: u32, dst: u32) -> bool {
    src != dst && src != vk::QUEUE_FAMILY_IGNORED && dst != vk::QUEUE_FAMILY_IGNORED
}

/// Which half of the hand-off a barrier is, relative to the queue family the
/// command buffer will be submitted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    Release,
    Acquire,
}

pub fn transfer_direction(
    src_queue_family_index: u32,
    dst_queue_family_index: u32,
    recording_family: u32,
) -> Option<TransferDirection> {
    if !has_ownership_transfer(src_queue_family_index, dst_queue_family_index) {
        None
    } else if src_queue_family_index == recording_family {
        Some(TransferDirection::Release)
    } else if dst_queue_family_index == recording_family {
        Some(TransferDirection::Acquire)
    } else {
        None
    }
}

/// The resource half of a transfer key. Content equality: two different
/// spellings of the same subresource selection or byte span produce equal
/// resources, because both sides are normalized before the key is built.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransferResource {
    Image {
        image: vk::Image,
        range: NormalizedSubresourceRange,
    },
    Buffer {
        buffer: vk::Buffer,
        span: Range<u64>,
    },
}

/// Identity of one queue family ownership transfer. A release and an acquire
/// agree out-of-band on exactly this tuple.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub resource: TransferResource,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_is_relative_to_recording_family() {
        assert_eq!(
            transfer_direction(0, 1, 0),
            Some(TransferDirection::Release),
        );
        assert_eq!(
            transfer_direction(0, 1, 1),
            Some(TransferDirection::Acquire),
        );
        assert_eq!(transfer_direction(0, 1, 2), None);
        assert_eq!(transfer_direction(1, 1, 1), None);
        assert_eq!(
            transfer_direction(vk::QUEUE_FAMILY_IGNORED, 1, 1),
            None,
        );
    }
}
