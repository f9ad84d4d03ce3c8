//! Sparse per-image map from subresource indices to layout state.
//!
//! The map stores one [`LayoutEntry`] per maximal run of subresources that
//! share the same state. Adjacent runs with equal entries are coalesced by
//! the underlying interval map, so memory growth is bounded by the number of
//! distinct states, not by the subresource count.

use crate::subresource::{
    NormalizedSubresourceRange, Subresource, SubresourceGeometry, SubresourceIndex,
};
use ash::vk;
use rangemap::RangeMap;
use smallvec::SmallVec;
use std::ops::Range;

/// Layout state of one run of subresources within one command buffer
/// recording.
///
/// `initial_layout` is the layout the application asserts the run was in
/// before this command buffer's commands execute; it is set the first time
/// the run is touched and never overwritten afterwards. `current_layout` is
/// the layout established by the most recently recorded transition. A field
/// of `None` means the state is unknown; an entry that is `None` in both
/// fields is equivalent to not being stored at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutEntry {
    pub initial_layout: Option<vk::ImageLayout>,
    pub current_layout: Option<vk::ImageLayout>,
}

impl LayoutEntry {
    fn first_touch(layout: vk::ImageLayout) -> Self {
        LayoutEntry {
            initial_layout: Some(layout),
            current_layout: Some(layout),
        }
    }
}

/// Walks `span`, yielding maximal pieces that are either covered by one
/// stored entry or by no entry at all, in index order with no overlap and no
/// gap.
pub(crate) fn intervals_with_gaps<V: Eq + Clone>(
    map: &RangeMap<SubresourceIndex, V>,
    span: Range<SubresourceIndex>,
) -> impl Iterator<Item = (Range<SubresourceIndex>, Option<&V>)> + '_ {
    let end = span.end;
    let mut cursor = span.start;
    let mut overlapping = map.overlapping(span).peekable();

    std::iter::from_fn(move || {
        if cursor >= end {
            return None;
        }

        let stored = overlapping
            .peek()
            .map(|&(range, _)| (range.start.max(cursor), range.end.min(end)));

        match stored {
            Some((stored_start, stored_end)) if stored_start <= cursor => {
                let (_, value) = overlapping.next().unwrap();
                let piece = cursor..stored_end;
                cursor = stored_end;
                Some((piece, Some(value)))
            }
            Some((stored_start, _)) => {
                let piece = cursor..stored_start;
                cursor = stored_start;
                Some((piece, None))
            }
            None => {
                let piece = cursor..end;
                cursor = end;
                Some((piece, None))
            }
        }
    })
}

/// Sparse map from the subresources of one image to their recorded layout
/// state.
#[derive(Clone, Debug)]
pub struct ImageLayoutMap {
    geometry: SubresourceGeometry,
    ranges: RangeMap<SubresourceIndex, LayoutEntry>,
}

impl ImageLayoutMap {
    pub fn new(geometry: SubresourceGeometry) -> Self {
        ImageLayoutMap {
            geometry,
            ranges: RangeMap::new(),
        }
    }

    pub fn geometry(&self) -> &SubresourceGeometry {
        &self.geometry
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.iter().next().is_none()
    }

    pub fn get(&self, index: SubresourceIndex) -> Option<&LayoutEntry> {
        self.ranges.get(&index)
    }

    /// Iterates over all stored entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Range<SubresourceIndex>, &LayoutEntry)> + '_ {
        self.ranges.iter().map(|(range, entry)| (range.clone(), entry))
    }

    /// Walks the linear intervals selected by `range` in index order,
    /// yielding one piece per maximal run with the same stored state
    /// (`None` for untouched pieces).
    pub fn intervals_in(
        &self,
        linear: Range<SubresourceIndex>,
    ) -> impl Iterator<Item = (Range<SubresourceIndex>, Option<&LayoutEntry>)> + '_ {
        intervals_with_gaps(&self.ranges, linear)
    }

    /// Records a layout transition for every subresource in `range`:
    /// `current_layout` is overwritten, and a subresource touched for the
    /// first time also gets `layout` as its `initial_layout`.
    pub fn set_range_layout(&mut self, range: &NormalizedSubresourceRange, layout: vk::ImageLayout) {
        for interval in self.geometry.iter_ranges(range) {
            self.splice(interval, |existing| match existing {
                Some(entry) => Some(LayoutEntry {
                    initial_layout: entry.initial_layout.or(Some(layout)),
                    current_layout: Some(layout),
                }),
                None => Some(LayoutEntry::first_touch(layout)),
            });
        }
    }

    /// Records the layout a range is asserted to be in before any transition,
    /// without counting as a transition. Subresources already touched during
    /// this recording are left unchanged (first touch wins).
    pub fn set_range_initial_layout(
        &mut self,
        range: &NormalizedSubresourceRange,
        layout: vk::ImageLayout,
    ) {
        for interval in self.geometry.iter_ranges(range) {
            self.splice(interval, |existing| match existing {
                Some(_) => None,
                None => Some(LayoutEntry::first_touch(layout)),
            });
        }
    }

    /// Rewrites `interval` piecewise: `f` receives the existing entry of each
    /// maximal piece (or `None` for untouched pieces) and returns the new
    /// entry, or `None` to leave the piece as it is.
    fn splice(
        &mut self,
        interval: Range<SubresourceIndex>,
        f: impl Fn(Option<&LayoutEntry>) -> Option<LayoutEntry>,
    ) {
        if interval.is_empty() {
            return;
        }

        let new_pieces: SmallVec<[(Range<SubresourceIndex>, LayoutEntry); 4]> =
            intervals_with_gaps(&self.ranges, interval)
                .filter_map(|(piece, existing)| f(existing).map(|entry| (piece, entry)))
                .collect();

        for (piece, entry) in new_pieces {
            self.ranges.insert(piece, entry);
        }
    }

    /// Like [`set_range_layout`], but over an already-linearized interval.
    /// Used when replaying one map's recorded state into another.
    ///
    /// [`set_range_layout`]: Self::set_range_layout
    pub(crate) fn set_linear_layout(
        &mut self,
        interval: Range<SubresourceIndex>,
        layout: vk::ImageLayout,
    ) {
        self.splice(interval, |existing| match existing {
            Some(entry) => Some(LayoutEntry {
                initial_layout: entry.initial_layout.or(Some(layout)),
                current_layout: Some(layout),
            }),
            None => Some(LayoutEntry::first_touch(layout)),
        });
    }

    /// Like [`set_range_initial_layout`], but over an already-linearized
    /// interval.
    ///
    /// [`set_range_initial_layout`]: Self::set_range_initial_layout
    pub(crate) fn set_linear_initial_layout(
        &mut self,
        interval: Range<SubresourceIndex>,
        layout: vk::ImageLayout,
    ) {
        self.splice(interval, |existing| match existing {
            Some(_) => None,
            None => Some(LayoutEntry::first_touch(layout)),
        });
    }

    /// Invokes `found` once per maximal stored interval intersecting `range`,
    /// passing the first subresource of the interval and its entry, and
    /// returns `true` as soon as any call does. Untouched intervals are
    /// skipped entirely: a subresource that was never recorded has no state
    /// to mismatch.
    pub fn any_in_range(
        &self,
        range: &NormalizedSubresourceRange,
        mut found: impl FnMut(Subresource, &LayoutEntry) -> bool,
    ) -> bool {
        for interval in self.geometry.iter_ranges(range) {
            for (piece, entry) in intervals_with_gaps(&self.ranges, interval) {
                if let Some(entry) = entry {
                    if found(self.geometry.decode(piece.start), entry) {
                        return true;
                    }
                }
            }
        }

        false
    }

    /// The exact set of distinct current layouts present in the map, in order
    /// of first appearance.
    pub fn distinct_layouts(&self) -> SmallVec<[vk::ImageLayout; 4]> {
        let mut layouts = SmallVec::new();

        for (_, entry) in self.ranges.iter() {
            if let Some(layout) = entry.current_layout {
                if !layouts.contains(&layout) {
                    layouts.push(layout);
                }
            }
        }

        layouts
    }

    /// Discards all recorded state, returning the map to its freshly-created
    /// form. Used when the owning recording context is reset.
    pub fn clear(&mut self) {
        self.ranges = RangeMap::new();
    }
}
