//! Format capability queries.
//!
//! The validators never hardcode format knowledge; they ask a
//! [`FormatOracle`]. The default [`KnownFormats`] oracle answers from a
//! static table covering the core format set. A deployment that has a live
//! device at hand can substitute an oracle backed by
//! `vkGetPhysicalDeviceFormatProperties` instead, which is the only way to
//! answer feature queries exactly.

use ash::vk;

/// Side-effect-free format capability queries.
pub trait FormatOracle: Send + Sync {
    /// The aspects present in images of this format.
    fn aspects(&self, format: vk::Format) -> vk::ImageAspectFlags;

    /// The texel block extent of the format, `[1, 1, 1]` for uncompressed
    /// formats.
    fn block_extent(&self, format: vk::Format) -> [u32; 3];

    /// The features supported by the format under the given tiling.
    fn format_features(
        &self,
        format: vk::Format,
        tiling: vk::ImageTiling,
    ) -> vk::FormatFeatureFlags;

    fn plane_count(&self, format: vk::Format) -> u32 {
        let aspects = self.aspects(format);

        [
            vk::ImageAspectFlags::PLANE_0,
            vk::ImageAspectFlags::PLANE_1,
            vk::ImageAspectFlags::PLANE_2,
        ]
        .into_iter()
        .filter(|&plane| aspects.contains(plane))
        .count() as u32
    }

    fn is_color(&self, format: vk::Format) -> bool {
        self.aspects(format).contains(vk::ImageAspectFlags::COLOR)
    }

    fn is_depth(&self, format: vk::Format) -> bool {
        self.aspects(format).contains(vk::ImageAspectFlags::DEPTH)
    }

    fn is_stencil(&self, format: vk::Format) -> bool {
        self.aspects(format).contains(vk::ImageAspectFlags::STENCIL)
    }

    fn is_multi_planar(&self, format: vk::Format) -> bool {
        self.plane_count(format) > 1
    }
}

/// Table-driven oracle for the core format set.
#[derive(Debug, Default)]
pub struct KnownFormats;

impl FormatOracle for KnownFormats {
    fn aspects(&self, format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
                vk::ImageAspectFlags::DEPTH
            }
            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
            vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            vk::Format::G8_B8R8_2PLANE_420_UNORM
            | vk::Format::G8_B8R8_2PLANE_422_UNORM
            | vk::Format::G10X6_B10X6R10X6_2PLANE_420_UNORM_3PACK16
            | vk::Format::G16_B16R16_2PLANE_420_UNORM => {
                vk::ImageAspectFlags::PLANE_0 | vk::ImageAspectFlags::PLANE_1
            }
            vk::Format::G8_B8_R8_3PLANE_420_UNORM
            | vk::Format::G8_B8_R8_3PLANE_422_UNORM
            | vk::Format::G8_B8_R8_3PLANE_444_UNORM
            | vk::Format::G16_B16_R16_3PLANE_420_UNORM => {
                vk::ImageAspectFlags::PLANE_0
                    | vk::ImageAspectFlags::PLANE_1
                    | vk::ImageAspectFlags::PLANE_2
            }
            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    fn block_extent(&self, format: vk::Format) -> [u32; 3] {
        match format {
            vk::Format::BC1_RGB_UNORM_BLOCK
            | vk::Format::BC1_RGB_SRGB_BLOCK
            | vk::Format::BC1_RGBA_UNORM_BLOCK
            | vk::Format::BC1_RGBA_SRGB_BLOCK
            | vk::Format::BC2_UNORM_BLOCK
            | vk::Format::BC2_SRGB_BLOCK
            | vk::Format::BC3_UNORM_BLOCK
            | vk::Format::BC3_SRGB_BLOCK
            | vk::Format::BC4_UNORM_BLOCK
            | vk::Format::BC4_SNORM_BLOCK
            | vk::Format::BC5_UNORM_BLOCK
            | vk::Format::BC5_SNORM_BLOCK
            | vk::Format::BC6H_UFLOAT_BLOCK
            | vk::Format::BC6H_SFLOAT_BLOCK
            | vk::Format::BC7_UNORM_BLOCK
            | vk::Format::BC7_SRGB_BLOCK
            | vk::Format::ETC2_R8G8B8_UNORM_BLOCK
            | vk::Format::ETC2_R8G8B8_SRGB_BLOCK
            | vk::Format::ETC2_R8G8B8A1_UNORM_BLOCK
            | vk::Format::ETC2_R8G8B8A1_SRGB_BLOCK
            | vk::Format::ETC2_R8G8B8A8_UNORM_BLOCK
            | vk::Format::ETC2_R8G8B8A8_SRGB_BLOCK
            | vk::Format::EAC_R11_UNORM_BLOCK
            | vk::Format::EAC_R11_SNORM_BLOCK
            | vk::Format::EAC_R11G11_UNORM_BLOCK
            | vk::Format::EAC_R11G11_SNORM_BLOCK
            | vk::Format::ASTC_4X4_UNORM_BLOCK
            | vk::Format::ASTC_4X4_SRGB_BLOCK => [4, 4, 1],
            vk::Format::ASTC_5X5_UNORM_BLOCK | vk::Format::ASTC_5X5_SRGB_BLOCK => [5, 5, 1],
            vk::Format::ASTC_8X8_UNORM_BLOCK | vk::Format::ASTC_8X8_SRGB_BLOCK => [8, 8, 1],
            _ => [1, 1, 1],
        }
    }

    fn format_features(
        &self,
        format: vk::Format,
        tiling: vk::ImageTiling,
    ) -> vk::FormatFeatureFlags {
        let aspects = self.aspects(format);
        let mut features = vk::FormatFeatureFlags::SAMPLED_IMAGE
            | vk::FormatFeatureFlags::TRANSFER_SRC
            | vk::FormatFeatureFlags::TRANSFER_DST;

        if tiling == vk::ImageTiling::OPTIMAL {
            if aspects
                .intersects(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
            {
                features |= vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
            } else {
                features |= vk::FormatFeatureFlags::COLOR_ATTACHMENT
                    | vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND;
            }
        }

        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_count_follows_aspects() {
        let oracle = KnownFormats;
        assert_eq!(oracle.plane_count(vk::Format::R8G8B8A8_UNORM), 0);
        assert_eq!(oracle.plane_count(vk::Format::G8_B8R8_2PLANE_420_UNORM), 2);
        assert_eq!(oracle.plane_count(vk::Format::G8_B8_R8_3PLANE_420_UNORM), 3);
    }

    #[test]
    fn depth_stencil_predicates() {
        let oracle = KnownFormats;
        assert!(oracle.is_depth(vk::Format::D24_UNORM_S8_UINT));
        assert!(oracle.is_stencil(vk::Format::D24_UNORM_S8_UINT));
        assert!(!oracle.is_color(vk::Format::D24_UNORM_S8_UINT));
        assert!(oracle.is_color(vk::Format::B8G8R8A8_SRGB));
    }

    #[test]
    fn linear_tiling_has_no_attachment_features() {
        let oracle = KnownFormats;
        let features =
            oracle.format_features(vk::Format::R8G8B8A8_UNORM, vk::ImageTiling::LINEAR);
        assert!(!features.intersects(vk::FormatFeatureFlags::COLOR_ATTACHMENT));
    }
}
