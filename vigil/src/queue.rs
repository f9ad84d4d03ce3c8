//! Submission-time reconciliation.
//!
//! Submitting a command buffer is the moment its recording-local layout
//! model meets the device-wide ground truth. For each submitted command
//! buffer, in order: every first-use assertion it recorded is validated
//! against the image's global map under that image's read lock
//! (validate-then-commit: a submission never validates against its own
//! not-yet-committed writes), then its layout deltas overwrite the global
//! map under the write lock, then its queue family ownership transfers are
//! reconciled against the device-wide pending-release set.

use crate::{
    barrier::TransferResource,
    command_buffer::CommandBufferState,
    commands::report_mismatches,
    device::DeviceState,
    diagnostics::ObjectInfo,
    layout::layouts_match,
    tracker::{LayoutMismatch, MismatchKind},
};
use ash::vk;

const VUID_SUBMIT_LAYOUT: &str = "UNASSIGNED-CoreValidation-DrawState-InvalidImageLayout";
const VUID_ORPHANED_ACQUIRE: &str = "UNASSIGNED-CoreValidation-queue-family-acquire-without-release";

/// Validates the submitted command buffers against the global layout store,
/// commits their layout deltas, and reconciles ownership transfers. Returns
/// whether any problem was found.
///
/// Must be called once per successful submission, before the commands are
/// considered in flight. Command buffers are processed in submission order,
/// so a transition committed by an earlier command buffer in the batch is
/// ground truth for a later one.
pub fn queue_submit(
    device: &DeviceState,
    queue: vk::Queue,
    command_buffers: &[&CommandBufferState],
) -> bool {
    if !device.checks.image_layout && !device.checks.queue_family_transfer {
        return false;
    }

    let mut bad = false;

    for cb in command_buffers {
        if device.checks.image_layout {
            bad |= validate_against_global(device, cb);
            merge_into_global(cb);
        }

        if device.checks.queue_family_transfer {
            bad |= reconcile_ownership_transfers(device, queue, cb);
        }
    }

    bad
}

/// Compares every first-use assertion in the command buffer against the
/// image's last known layout, walking the recorded map and the global map in
/// lockstep per interval so the cost is proportional to the number of
/// distinct runs, never the subresource count.
fn validate_against_global(device: &DeviceState, cb: &CommandBufferState) -> bool {
    let mut bad = false;

    for (image, map) in cb.tracker().iter() {
        let mut mismatches: Vec<LayoutMismatch> = Vec::new();

        {
            // One read lock per image: a consistent snapshot for the whole
            // walk, excluded against concurrent merges of other submissions.
            let global = image.global_layout();

            for (interval, entry) in map.iter() {
                let Some(expected) = entry.initial_layout else {
                    continue;
                };

                if expected == vk::ImageLayout::UNDEFINED {
                    continue;
                }

                let mut cursor = interval.start;
                for (stored, &actual) in global.overlapping(interval.clone()) {
                    let piece = stored.start.max(cursor)..stored.end.min(interval.end);
                    cursor = piece.end;

                    if actual == vk::ImageLayout::UNDEFINED {
                        continue;
                    }

                    for (sub_piece, aspect) in image.geometry().split_per_aspect(piece) {
                        if !layouts_match(aspect, expected, actual) {
                            mismatches.push(LayoutMismatch {
                                subresource: image.geometry().decode(sub_piece.start),
                                interval: sub_piece,
                                expected,
                                actual,
                                kind: MismatchKind::Initial,
                            });
                        }
                    }
                }
            }
        }

        bad |= report_mismatches(
            device,
            cb,
            image,
            "vkQueueSubmit",
            &mismatches,
            VUID_SUBMIT_LAYOUT,
            VUID_SUBMIT_LAYOUT,
        );
    }

    bad
}

/// Overwrites the global map with the command buffer's layout deltas. Last
/// transition wins per subresource interval; subresources the command buffer
/// never transitioned keep their global state.
fn merge_into_global(cb: &CommandBufferState) {
    for (image, map) in cb.tracker().iter() {
        let mut global = image.global_layout_mut();

        for (interval, entry) in map.iter() {
            if let Some(layout) = entry.current_layout {
                global.insert(interval, layout);
            }
        }
    }
}

/// Reconciles the command buffer's ownership transfer sets with the
/// device-wide pending-release set.
///
/// Acquires are consumed first: an acquire matches a release from an earlier
/// submission (or an earlier command buffer in this batch), and a release
/// recorded here becomes visible to later acquires. An acquire with no
/// outstanding release is flagged exactly once.
fn reconcile_ownership_transfers(
    device: &DeviceState,
    queue: vk::Queue,
    cb: &CommandBufferState,
) -> bool {
    let mut bad = false;
    let mut pending = device.pending_releases().lock();

    for key in cb.acquire_barriers() {
        if !pending.remove(key) {
            let object = match &key.resource {
                TransferResource::Image { image, .. } => ObjectInfo::image(*image),
                TransferResource::Buffer { buffer, .. } => ObjectInfo::buffer(*buffer),
            };

            device.report(
                &[
                    ObjectInfo::queue(queue),
                    ObjectInfo::command_buffer(cb.handle()),
                    object,
                ],
                VUID_ORPHANED_ACQUIRE,
                &format!(
                    "vkQueueSubmit: acquire barrier from queue family {} to {} has no matching \
                    outstanding release for the same resource range",
                    key.src_queue_family_index, key.dst_queue_family_index,
                ),
            );
            bad = true;
        }
    }

    for key in cb.release_barriers() {
        pending.insert(key.clone());
    }

    bad
}
