//! Shadow state for buffers.
//!
//! Buffers carry no layout, but they participate in queue family ownership
//! transfers, so the validator keeps the fields needed to key a transfer
//! barrier by content: the byte span it covers and the sharing mode.

use ash::vk;
use std::ops::Range;

#[derive(Debug)]
pub struct BufferState {
    handle: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    sharing_mode: vk::SharingMode,
}

impl BufferState {
    pub fn new(
        handle: vk::Buffer,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> Self {
        BufferState {
            handle,
            size,
            usage,
            sharing_mode,
        }
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn sharing_mode(&self) -> vk::SharingMode {
        self.sharing_mode
    }

    /// Resolves a barrier's `(offset, size)` pair against the buffer,
    /// replacing the `WHOLE_SIZE` sentinel, so that two spellings of the same
    /// span produce equal spans.
    pub fn normalize_span(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Range<u64> {
        let end = if size == vk::WHOLE_SIZE {
            self.size
        } else {
            offset.saturating_add(size).min(self.size)
        };

        offset.min(end)..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_size_matches_explicit_span() {
        let buffer = BufferState::new(
            vk::Buffer::null(),
            1024,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::SharingMode::EXCLUSIVE,
        );

        assert_eq!(
            buffer.normalize_span(256, vk::WHOLE_SIZE),
            buffer.normalize_span(256, 768),
        );
    }
}
