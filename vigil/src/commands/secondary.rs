//! Execute-commands validation: replaying secondary command buffers into a
//! primary.
//!
//! A secondary command buffer carries its own layout assertions, ownership
//! transfer sets and deferred checks. Executing it inside a primary (a)
//! runs the deferred checks that were waiting for the inherited framebuffer,
//! (b) validates the secondary's first-use assertions against the primary's
//! view of the world, and (c) replays the secondary's state into the
//! primary so later commands and the eventual submission see one coherent
//! history.

use super::report_mismatches;
use crate::{
    command_buffer::CommandBufferState,
    deferred::DeferredCheck,
    device::DeviceState,
    diagnostics::ObjectInfo,
};

const VUID_EXECUTE_LAYOUT: &str = "UNASSIGNED-vkCmdExecuteCommands-image-layout";
const VUID_EXECUTE_DUPLICATE_RELEASE: &str = "UNASSIGNED-vkCmdExecuteCommands-duplicate-release";

/// Validates and replays the given secondary command buffers, in order.
/// Returns whether any problem was found.
pub fn cmd_execute_commands(
    device: &DeviceState,
    primary: &mut CommandBufferState,
    secondaries: &[&CommandBufferState],
) -> bool {
    if !device.checks.image_layout && !device.checks.queue_family_transfer {
        return false;
    }

    let mut bad = false;

    for secondary in secondaries {
        if device.checks.image_layout {
            bad |= run_deferred_checks(device, primary, secondary);
            bad |= validate_secondary_assertions(device, primary, secondary);
            primary.tracker.absorb(secondary.tracker());
        }

        if device.checks.queue_family_transfer {
            for key in secondary.release_barriers() {
                if !primary.release_barriers.insert(key.clone()) {
                    device.report(
                        &[
                            ObjectInfo::command_buffer(primary.handle()),
                            ObjectInfo::command_buffer(secondary.handle()),
                        ],
                        VUID_EXECUTE_DUPLICATE_RELEASE,
                        "vkCmdExecuteCommands: the secondary command buffer records a release \
                        barrier already recorded in the primary for the same resource range and \
                        queue family pair",
                    );
                    bad = true;
                }
            }

            primary
                .acquire_barriers
                .extend(secondary.acquire_barriers().iter().cloned());
        }
    }

    bad
}

/// Runs the secondary's checks that were deferred until the framebuffer
/// became known. Outside a render pass instance, or with the framebuffer
/// still unknown, there is nothing to resolve against and the items are
/// skipped.
fn run_deferred_checks(
    device: &DeviceState,
    primary: &CommandBufferState,
    secondary: &CommandBufferState,
) -> bool {
    let Some(instance) = &primary.render_pass else {
        return false;
    };
    let Some(framebuffer) = &instance.framebuffer else {
        return false;
    };

    let mut bad = false;

    for check in &secondary.deferred {
        let DeferredCheck::AttachmentLayout {
            attachment,
            subpass: _,
            aspects,
            expected,
            vuid,
        } = check;

        let Some(view) = framebuffer.attachments().get(*attachment as usize) else {
            continue;
        };

        let mut range = view.range().clone();
        range.aspects &= *aspects;
        if range.is_empty() {
            continue;
        }

        let image = view.image();
        let mismatches = primary
            .tracker
            .validate(image, &range, range.aspects, *expected);
        bad |= report_mismatches(
            device,
            primary,
            image,
            "vkCmdExecuteCommands",
            &mismatches,
            vuid,
            vuid,
        );
    }

    bad
}

/// Checks the secondary's first-use layout assertions against the layouts
/// the primary has established (or, transitively, the global ground truth).
fn validate_secondary_assertions(
    device: &DeviceState,
    primary: &CommandBufferState,
    secondary: &CommandBufferState,
) -> bool {
    let mut bad = false;

    for (image, map) in secondary.tracker().iter() {
        let mut mismatches = Vec::new();

        for (interval, entry) in map.iter() {
            let Some(initial) = entry.initial_layout else {
                continue;
            };

            for (piece, aspect) in image.geometry().split_per_aspect(interval) {
                primary
                    .tracker
                    .validate_interval(image, piece, aspect, initial, &mut mismatches);
            }
        }

        bad |= report_mismatches(
            device,
            primary,
            image,
            "vkCmdExecuteCommands",
            &mismatches,
            VUID_EXECUTE_LAYOUT,
            VUID_EXECUTE_LAYOUT,
        );
    }

    bad
}
