//! Comparison rules for image layouts.
//!
//! The API allows several spellings of the same GPU-visible state: the
//! synchronization2 generic layouts (`ATTACHMENT_OPTIMAL`,
//! `READ_ONLY_OPTIMAL`) stand in for whatever concrete layout the aspect mask
//! implies, and the single-aspect depth/stencil layouts overlap with the
//! combined ones. Layout comparison therefore runs in three tiers: exact
//! match, match after generic-layout normalization, and (for depth and/or
//! stencil selections only) component-wise match after collapsing each
//! aspect to its combined equivalent.

use ash::vk;

/// Maps the aspect-agnostic generic layouts to the concrete layout implied by
/// `aspects`. All other layouts are returned unchanged, which makes the
/// function idempotent.
pub fn normalize_layout(aspects: vk::ImageAspectFlags, layout: vk::ImageLayout) -> vk::ImageLayout {
    let has_depth = aspects.contains(vk::ImageAspectFlags::DEPTH);
    let has_stencil = aspects.contains(vk::ImageAspectFlags::STENCIL);

    match layout {
        vk::ImageLayout::ATTACHMENT_OPTIMAL => {
            if has_depth && has_stencil {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            } else if has_depth {
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
            } else if has_stencil {
                vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            }
        }
        vk::ImageLayout::READ_ONLY_OPTIMAL => {
            if has_depth && has_stencil {
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            } else if has_depth {
                vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
            } else if has_stencil {
                vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            }
        }
        other => other,
    }
}

/// Collapses `layout` to the combined depth/stencil layout that its *depth*
/// component denotes. Used for comparison only; stored state is never
/// rewritten through this.
pub fn normalize_depth_layout(layout: vk::ImageLayout) -> vk::ImageLayout {
    match layout {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL => {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
        vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        }
        other => other,
    }
}

/// Collapses `layout` to the combined depth/stencil layout that its *stencil*
/// component denotes.
pub fn normalize_stencil_layout(layout: vk::ImageLayout) -> vk::ImageLayout {
    match layout {
        vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
        vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL => {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        }
        other => other,
    }
}

/// Whether `a` and `b` denote the same GPU-visible state for the subresources
/// selected by `aspects`.
pub fn layouts_match(
    aspects: vk::ImageAspectFlags,
    a: vk::ImageLayout,
    b: vk::ImageLayout,
) -> bool {
    if a == b {
        return true;
    }

    let a = normalize_layout(aspects, a);
    let b = normalize_layout(aspects, b);

    if a == b {
        return true;
    }

    // The per-aspect equivalences only apply when the selection is exactly
    // depth, exactly stencil, or depth+stencil.
    let depth_only = aspects == vk::ImageAspectFlags::DEPTH;
    let stencil_only = aspects == vk::ImageAspectFlags::STENCIL;
    let depth_stencil = aspects == (vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);

    if depth_only {
        normalize_depth_layout(a) == normalize_depth_layout(b)
    } else if stencil_only {
        normalize_stencil_layout(a) == normalize_stencil_layout(b)
    } else if depth_stencil {
        normalize_depth_layout(a) == normalize_depth_layout(b)
            && normalize_stencil_layout(a) == normalize_stencil_layout(b)
    } else {
        false
    }
}

/// The usage flags of which an image must have at least one to be
/// transitioned into `layout`. An empty set means the layout carries no usage
/// requirement.
pub fn required_usage(
    layout: vk::ImageLayout,
    aspects: vk::ImageAspectFlags,
) -> vk::ImageUsageFlags {
    match normalize_layout(aspects, layout) {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::ImageUsageFlags::COLOR_ATTACHMENT,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        }
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        | vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL => {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::INPUT_ATTACHMENT
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::INPUT_ATTACHMENT
        }
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::ImageUsageFlags::TRANSFER_SRC,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::ImageUsageFlags::TRANSFER_DST,
        _ => vk::ImageUsageFlags::empty(),
    }
}

/// The format features of which at least one must be supported for the
/// image's format and tiling to use `layout`. An empty set means no feature
/// requirement.
pub fn required_format_features(
    layout: vk::ImageLayout,
    aspects: vk::ImageAspectFlags,
) -> vk::FormatFeatureFlags {
    match normalize_layout(aspects, layout) {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::FormatFeatureFlags::COLOR_ATTACHMENT,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        }
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        | vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL => {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::FormatFeatureFlags::SAMPLED_IMAGE
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::FormatFeatureFlags::SAMPLED_IMAGE,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::FormatFeatureFlags::TRANSFER_SRC,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::FormatFeatureFlags::TRANSFER_DST,
        _ => vk::FormatFeatureFlags::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_LAYOUTS: [vk::ImageLayout; 18] = [
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::GENERAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PREINITIALIZED,
        vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
        vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL,
        vk::ImageLayout::READ_ONLY_OPTIMAL,
        vk::ImageLayout::ATTACHMENT_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
    ];

    const MASKS: [vk::ImageAspectFlags; 4] = [
        vk::ImageAspectFlags::COLOR,
        vk::ImageAspectFlags::DEPTH,
        vk::ImageAspectFlags::STENCIL,
        vk::ImageAspectFlags::from_raw(
            vk::ImageAspectFlags::DEPTH.as_raw() | vk::ImageAspectFlags::STENCIL.as_raw(),
        ),
    ];

    #[test]
    fn normalization_is_idempotent() {
        for mask in MASKS {
            for layout in ALL_LAYOUTS {
                let once = normalize_layout(mask, layout);
                assert_eq!(normalize_layout(mask, once), once);
            }
        }
    }

    #[test]
    fn match_is_symmetric() {
        for mask in MASKS {
            for a in ALL_LAYOUTS {
                for b in ALL_LAYOUTS {
                    assert_eq!(
                        layouts_match(mask, a, b),
                        layouts_match(mask, b, a),
                        "asymmetric for {:?}: {:?} vs {:?}",
                        mask,
                        a,
                        b,
                    );
                }
            }
        }
    }

    #[test]
    fn generic_layouts_match_their_concrete_spelling() {
        assert!(layouts_match(
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::ATTACHMENT_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ));
        assert!(layouts_match(
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            vk::ImageLayout::ATTACHMENT_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ));
        assert!(layouts_match(
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::READ_ONLY_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ));
        assert!(!layouts_match(
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ));
    }

    #[test]
    fn depth_only_selection_ignores_stencil_component() {
        // For a depth-only selection, "depth attachment + stencil read-only"
        // and "depth+stencil attachment" agree on the depth component.
        assert!(layouts_match(
            vk::ImageAspectFlags::DEPTH,
            vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ));
        // But they disagree on the stencil component.
        assert!(!layouts_match(
            vk::ImageAspectFlags::STENCIL,
            vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ));
    }

    #[test]
    fn component_equivalence_needs_exact_depth_stencil_mask() {
        // A color selection never takes the per-aspect path.
        assert!(!layouts_match(
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ));
    }

    #[test]
    fn usage_requirements() {
        assert_eq!(
            required_usage(
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
            ),
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        );
        assert_eq!(
            required_usage(
                vk::ImageLayout::ATTACHMENT_OPTIMAL,
                vk::ImageAspectFlags::DEPTH,
            ),
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        assert!(required_usage(vk::ImageLayout::GENERAL, vk::ImageAspectFlags::COLOR).is_empty());
    }
}
