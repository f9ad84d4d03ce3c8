//! Command-buffer-scoped layout tracking.
//!
//! One [`LayoutTracker`] exists per command buffer recording and maps each
//! touched image to a recording-local [`ImageLayoutMap`], never the image's
//! global map. Two recordings touching the same image are fully independent
//! until submission-time reconciliation. The tracker is only ever used from
//! the thread currently recording its command buffer, so it needs no
//! internal locking; the host API forbids concurrent recording into one
//! command buffer.

use crate::{
    image::ImageState,
    layout::layouts_match,
    layout_map::{ImageLayoutMap, LayoutEntry},
    subresource::{NormalizedSubresourceRange, Subresource, SubresourceIndex},
};
use ash::vk;
use foldhash::HashMap;
use std::{ops::Range, sync::Arc};

/// What a reported mismatch was compared against: a layout this command
/// buffer established itself, or the ground truth inherited from earlier
/// submissions (the rule clauses differ between the two).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MismatchKind {
    /// The subresource was transitioned within this command buffer and the
    /// recorded current layout disagrees.
    Current,
    /// This command buffer has not touched the subresource; the last known
    /// layout from the global store disagrees.
    Initial,
}

/// One maximal run of subresources whose tracked layout disagrees with what
/// a command declared. The run is identified by its first subresource; the
/// interval is carried for message detail.
#[derive(Clone, Debug)]
pub struct LayoutMismatch {
    pub subresource: Subresource,
    pub interval: Range<SubresourceIndex>,
    pub expected: vk::ImageLayout,
    pub actual: vk::ImageLayout,
    pub kind: MismatchKind,
}

struct TrackedImage {
    image: Arc<ImageState>,
    map: ImageLayoutMap,
}

/// Per-recording layout state for every image the command buffer touches.
#[derive(Default)]
pub struct LayoutTracker {
    images: HashMap<vk::Image, TrackedImage>,
}

impl LayoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Iterates over every touched image and its recording-local map.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<ImageState>, &ImageLayoutMap)> {
        self.images
            .values()
            .map(|tracked| (&tracked.image, &tracked.map))
    }

    /// The recording-local map for `image`, created empty on first access.
    pub fn get_or_create(&mut self, image: &Arc<ImageState>) -> &mut ImageLayoutMap {
        &mut self
            .images
            .entry(image.handle())
            .or_insert_with(|| TrackedImage {
                image: image.clone(),
                map: image.new_layout_map(),
            })
            .map
    }

    pub fn get(&self, image: vk::Image) -> Option<&ImageLayoutMap> {
        self.images.get(&image).map(|tracked| &tracked.map)
    }

    /// Records the layout `range` is asserted to already be in, without
    /// counting as a transition. No-op for subresources already touched
    /// during this recording.
    pub fn set_initial_layout(
        &mut self,
        image: &Arc<ImageState>,
        range: &NormalizedSubresourceRange,
        layout: vk::ImageLayout,
    ) {
        self.get_or_create(image)
            .set_range_initial_layout(range, layout);
    }

    /// Records a layout transition of `range`. A subresource touched for the
    /// first time by this transition records `initial_if_first_touch`, what
    /// the command declared the prior layout to be, as its first-use
    /// assertion, not the transition target.
    pub fn set_layout(
        &mut self,
        image: &Arc<ImageState>,
        range: &NormalizedSubresourceRange,
        layout: vk::ImageLayout,
        initial_if_first_touch: vk::ImageLayout,
    ) {
        let map = self.get_or_create(image);
        map.set_range_initial_layout(range, initial_if_first_touch);
        map.set_range_layout(range, layout);
    }

    /// Compares the tracked layout of every subresource in `range` against
    /// `expected`, using `match_aspects` for the comparison rules.
    ///
    /// Subresources this recording has touched are compared against their
    /// recorded current layout. Untouched subresources fall back to the
    /// image's global map, the last known layout from prior submissions.
    /// An `expected` or actual layout of `UNDEFINED` never mismatches: it is
    /// first use, and first use resets the contract.
    ///
    /// Returns one mismatch per maximal offending run, in index order.
    pub fn validate(
        &self,
        image: &Arc<ImageState>,
        range: &NormalizedSubresourceRange,
        match_aspects: vk::ImageAspectFlags,
        expected: vk::ImageLayout,
    ) -> Vec<LayoutMismatch> {
        let mut mismatches = Vec::new();

        if expected == vk::ImageLayout::UNDEFINED || range.is_empty() {
            return mismatches;
        }

        for interval in image.geometry().iter_ranges(range) {
            self.validate_interval(image, interval, match_aspects, expected, &mut mismatches);
        }

        mismatches
    }

    /// The linear-interval core of [`validate`]. Used directly when the
    /// caller already holds linear intervals, for example when replaying a
    /// secondary command buffer's assertions into a primary.
    ///
    /// [`validate`]: Self::validate
    pub(crate) fn validate_interval(
        &self,
        image: &Arc<ImageState>,
        interval: Range<SubresourceIndex>,
        match_aspects: vk::ImageAspectFlags,
        expected: vk::ImageLayout,
        mismatches: &mut Vec<LayoutMismatch>,
    ) {
        if expected == vk::ImageLayout::UNDEFINED || interval.is_empty() {
            return;
        }

        match self.get(image.handle()) {
            Some(map) => {
                for (piece, entry) in map.intervals_in(interval) {
                    match entry {
                        Some(&LayoutEntry {
                            current_layout: Some(actual),
                            ..
                        })
                        | Some(&LayoutEntry {
                            initial_layout: Some(actual),
                            current_layout: None,
                        }) => check_piece(
                            image,
                            match_aspects,
                            expected,
                            piece,
                            actual,
                            MismatchKind::Current,
                            mismatches,
                        ),
                        _ => check_against_global(
                            image,
                            match_aspects,
                            expected,
                            piece,
                            mismatches,
                        ),
                    }
                }
            }
            None => check_against_global(image, match_aspects, expected, interval, mismatches),
        }
    }

    /// Replays another tracker's recorded state into this one: the other
    /// tracker's initial layouts become plain first-touch assertions here and
    /// its current layouts are applied as transitions, in index order, so
    /// "last transition wins" is preserved. Used when a secondary command
    /// buffer is executed inside a primary.
    pub fn absorb(&mut self, other: &LayoutTracker) {
        for (image, map) in other.iter() {
            let target = self.get_or_create(image);

            for (interval, entry) in map.iter() {
                if let Some(initial) = entry.initial_layout {
                    target.set_linear_initial_layout(interval.clone(), initial);
                }
                if let Some(current) = entry.current_layout {
                    target.set_linear_layout(interval, current);
                }
            }
        }
    }

    /// Discards all recorded state. Used on command buffer reset.
    pub fn clear(&mut self) {
        self.images.clear();
    }
}

fn check_piece(
    image: &Arc<ImageState>,
    match_aspects: vk::ImageAspectFlags,
    expected: vk::ImageLayout,
    piece: Range<SubresourceIndex>,
    actual: vk::ImageLayout,
    kind: MismatchKind,
    mismatches: &mut Vec<LayoutMismatch>,
) {
    // UNDEFINED on the tracked side means first use: nothing to disagree
    // with.
    if actual == vk::ImageLayout::UNDEFINED {
        return;
    }

    if !layouts_match(match_aspects, expected, actual) {
        mismatches.push(LayoutMismatch {
            subresource: image.geometry().decode(piece.start),
            interval: piece,
            expected,
            actual,
            kind,
        });
    }
}

fn check_against_global(
    image: &Arc<ImageState>,
    match_aspects: vk::ImageAspectFlags,
    expected: vk::ImageLayout,
    span: Range<SubresourceIndex>,
    mismatches: &mut Vec<LayoutMismatch>,
) {
    let global = image.global_layout();

    let mut cursor = span.start;
    for (stored, &layout) in global.overlapping(span.clone()) {
        let piece = stored.start.max(cursor)..stored.end.min(span.end);
        cursor = piece.end;
        check_piece(
            image,
            match_aspects,
            expected,
            piece,
            layout,
            MismatchKind::Initial,
            mismatches,
        );
    }
}
