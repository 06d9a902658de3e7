//! Output identity matching and read-in
//!
//! Output hashes come from EDID data and are not unique: two monitors of the
//! same model share a hash. When that happens the connector name stored in the
//! record metadata decides which record belongs to which output.
//!
//! Priority for each output: matching topology record > global record > defaults.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::mode::apply_mode;
use crate::output::{LiveConfig, Output, RetentionPolicy};
use crate::store::global::GlobalStore;
use crate::store::record::{ModeInfo, StoredOutputRecord};
use crate::types::{Rotation, Size};

/// Hashes shared by more than one output
pub fn duplicate_hashes(outputs: &[Output]) -> HashSet<&str> {
    let mut seen = HashSet::new();
    let mut duplicates = HashSet::new();
    for output in outputs {
        if !seen.insert(output.hash.as_str()) {
            duplicates.insert(output.hash.as_str());
        }
    }
    duplicates
}

/// Find the stored record belonging to each output, keyed by output id
pub fn match_records<'a>(
    outputs: &[Output],
    records: &'a [StoredOutputRecord],
) -> HashMap<u32, Option<&'a StoredOutputRecord>> {
    let duplicates = duplicate_hashes(outputs);

    outputs
        .iter()
        .map(|output| {
            let needs_name = !output.name.is_empty() && duplicates.contains(output.hash.as_str());
            let record = records.iter().find(|record| {
                record.id == output.hash && (!needs_name || record.metadata.name == output.name)
            });
            (output.id, record)
        })
        .collect()
}

/// Apply rotation and mode from stored data, running the mode fallback chain
pub fn read_in_global_part(output: &mut Output, rotation: Rotation, mode: Option<ModeInfo>) {
    output.rotation = rotation;
    let (size, refresh) = mode.map(|m| (m.size, m.refresh)).unwrap_or((Size::default(), 0.0));
    debug!(
        output = %output.name,
        width = size.width,
        height = size.height,
        refresh = refresh,
        "Finding a mode"
    );
    apply_mode(output, size, refresh);
}

/// Read rotation and mode from the global record. False if there is none.
pub fn read_in_global(output: &mut Output, globals: &GlobalStore) -> bool {
    match globals.read_for(output) {
        Some(record) => {
            read_in_global_part(output, record.rotation, record.mode);
            true
        }
        None => false,
    }
}

/// Built-in defaults: no rotation, mode chosen by the fallback chain
pub fn read_in_defaults(output: &mut Output) {
    read_in_global_part(output, Rotation::None, None);
}

/// Read one matched record into `output`. Returns the record's primary flag.
fn read_in(output: &mut Output, record: &StoredOutputRecord, globals: &GlobalStore) -> bool {
    output.position = record.pos.unwrap_or_default();
    output.enabled = record.enabled;
    if let Some(scale) = record.scale.filter(|s| *s > 0.0) {
        output.scale = scale;
    }

    if output.retention == RetentionPolicy::Individual || !read_in_global(output, globals) {
        read_in_global_part(output, record.rotation, record.mode);
    }
    record.primary
}

/// Overwrite the layout of `config` with stored `records`.
/// Unmatched outputs fall back to their global record, then to defaults.
pub fn read_in_outputs(config: &mut LiveConfig, records: &[StoredOutputRecord], globals: &GlobalStore) {
    let matches = match_records(&config.outputs, records);
    let mut primary = None;

    for output in &mut config.outputs {
        match matches.get(&output.id).copied().flatten() {
            Some(record) => {
                if read_in(output, record, globals) {
                    primary = Some(output.id);
                }
            }
            None => {
                warn!(
                    output = %output.name,
                    hash = %output.hash,
                    "No stored record for output, using global record or defaults"
                );
                if !read_in_global(output, globals) {
                    read_in_defaults(output);
                }
            }
        }
    }

    if let Some(id) = primary {
        config.set_primary_output(id);
    }
}
