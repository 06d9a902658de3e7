//! Mode resolution
//!
//! Mode ids are not stable across reconnects, so stored configuration keeps a
//! size and refresh rate. Finding the live mode again follows a fixed chain:
//! exact match, preferred mode, biggest mode, and finally disabling the output.

use tracing::{debug, warn};

use crate::constants::mode::REFRESH_EPSILON;
use crate::output::{Mode, Output};
use crate::types::Size;

/// Relative comparison of refresh rates
pub fn refresh_matches(a: f64, b: f64) -> bool {
    (a - b).abs() <= REFRESH_EPSILON * a.abs().max(b.abs()).max(1.0)
}

/// Mode with the largest pixel area; ties go to the higher refresh rate
pub fn best_mode(output: &Output) -> Option<&Mode> {
    output.modes.iter().max_by(|a, b| {
        a.size
            .area()
            .cmp(&b.size.area())
            .then(a.refresh.total_cmp(&b.refresh))
    })
}

/// Pick the mode for `output` closest to a stored size and refresh rate
pub fn resolve(output: &Output, size: Size, refresh: f64) -> Option<&Mode> {
    if size.is_valid() {
        if let Some(mode) = output
            .modes
            .iter()
            .find(|m| m.size == size && refresh_matches(m.refresh, refresh))
        {
            debug!(output = %output.name, mode = %mode.id, "Found exact mode");
            return Some(mode);
        }
        warn!(
            output = %output.name,
            width = size.width,
            height = size.height,
            refresh = refresh,
            "No mode matches stored size and refresh, falling back to preferred mode"
        );
    }

    if let Some(mode) = output.preferred() {
        return Some(mode);
    }
    debug!(output = %output.name, "No preferred mode, falling back to biggest mode");
    best_mode(output)
}

/// Resolve and set the mode on `output`.
/// Returns false and disables the output when it has no modes at all.
pub fn apply_mode(output: &mut Output, size: Size, refresh: f64) -> bool {
    match resolve(output, size, refresh).map(|m| m.id.clone()) {
        Some(id) => {
            output.mode = Some(id);
            true
        }
        None => {
            warn!(output = %output.name, "Output has no modes, disabling it");
            output.mode = None;
            output.enabled = false;
            false
        }
    }
}
