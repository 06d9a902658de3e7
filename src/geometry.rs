//! Position correction after geometry changes
//!
//! Stored positions are only valid for the stored sizes. When an output comes
//! back with a different mode, scale or rotation, the neighbour to its right
//! would end up overlapping it or floating away. Outputs are walked left to
//! right and each one is moved so that it keeps the alignment it had with its
//! left neighbour in the stored layout.

use std::cmp::Ordering;
use tracing::debug;

use crate::matcher::match_records;
use crate::output::{LiveConfig, Output};
use crate::store::record::StoredOutputRecord;
use crate::types::{Position, Rect};

/// Rectangle with widened coordinates, so edge distances between far-off
/// stored rectangles cannot overflow
#[derive(Debug, Clone, Copy)]
struct Wide {
    left: i64,
    top: i64,
    width: i64,
    height: i64,
}

impl Wide {
    fn right(&self) -> i64 {
        self.left + self.width
    }

    fn bottom(&self) -> i64 {
        self.top + self.height
    }

    fn overlaps_vertically(&self, other: &Wide) -> bool {
        self.bottom() > other.top && self.top < other.bottom()
    }
}

impl From<Rect> for Wide {
    fn from(rect: Rect) -> Self {
        Self {
            left: rect.x as i64,
            top: rect.y as i64,
            width: rect.width as i64,
            height: rect.height as i64,
        }
    }
}

fn clamp_coordinate(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Whether `cur` was aligned to the top edge of `prev` in the stored layout.
///
/// Equal top-to-top and bottom-to-bottom distances (same heights, aligned)
/// count as top alignment.
fn top_aligned(prev: &Rect, cur: &Rect) -> bool {
    let (prev, cur) = (Wide::from(*prev), Wide::from(*cur));
    let top_to_top = (prev.top - cur.top).abs();
    let top_to_bottom = (prev.top - cur.bottom()).abs();
    let bottom_to_bottom = (prev.bottom() - cur.bottom()).abs();
    let bottom_to_top = (prev.bottom() - cur.top).abs();

    (top_to_top <= bottom_to_bottom && top_to_top <= bottom_to_top) || top_to_bottom < bottom_to_bottom
}

/// New position for the output at `cur_geo`, given where it and its left
/// neighbour were stored (`*_info`) and where the neighbour is now (`prev_geo`).
///
/// Each axis keeps the live coordinate when the live offset already equals
/// the stored one. Results outside the coordinate space are clamped.
pub fn correct_rects(prev_info: Rect, cur_info: Rect, prev_geo: Rect, cur_geo: Rect) -> Position {
    let aligned_to_top = top_aligned(&prev_info, &cur_info);
    let (prev_info, cur_info) = (Wide::from(prev_info), Wide::from(cur_info));
    let (prev_geo, cur_geo) = (Wide::from(prev_geo), Wide::from(cur_geo));

    // Horizontal gap, scaled with the neighbour's width
    let x_info_diff = cur_info.left - prev_info.right();
    let prev_right = prev_geo.right();
    let x_corrected =
        prev_right as f64 + prev_geo.width as f64 * x_info_diff as f64 / prev_info.width as f64;
    let x_diff = cur_geo.left - prev_right;

    let y_overlap = prev_info.overlaps_vertically(&cur_info);
    let mut y_info_diff = cur_info.top - prev_info.top;
    let mut y_diff = cur_geo.top - prev_geo.top;
    let y_corrected;

    if aligned_to_top {
        let mut base = prev_geo.top;
        if !y_overlap {
            // Previous top against current bottom
            y_info_diff += cur_info.height;
            y_diff += cur_geo.height;
            base -= cur_geo.height;
        }
        // Relative to the current output's own height
        let rel = y_info_diff as f64 / cur_info.height as f64;
        y_corrected = base as f64 + rel * cur_geo.height as f64;
    } else {
        y_info_diff -= prev_info.height;
        y_diff -= prev_geo.height;
        let mut base = prev_geo.bottom();

        if y_overlap {
            // Previous bottom against current bottom
            y_info_diff += cur_info.height;
            y_diff += cur_geo.height;
            base -= cur_geo.height;
        }
        // Relative to the previous output's height
        let rel = y_info_diff as f64 / prev_info.height as f64;
        y_corrected = base as f64 + rel * prev_geo.height as f64;
    }

    // Float to int casts saturate
    let x = if x_diff == x_info_diff { clamp_coordinate(cur_geo.left) } else { x_corrected as i32 };
    let y = if y_diff == y_info_diff { clamp_coordinate(cur_geo.top) } else { y_corrected as i32 };
    Position::new(x, y)
}

/// Corrected position for `cur` relative to its left neighbour `prev`.
/// None when either record lacks the position or mode needed for the stored layout.
pub fn correct(
    prev_record: &StoredOutputRecord,
    cur_record: &StoredOutputRecord,
    prev: &Output,
    cur: &Output,
) -> Option<Position> {
    let prev_info = prev_record.rect()?;
    let cur_info = cur_record.rect()?;
    if !(prev_info.width > 0 && prev_info.height > 0 && cur_info.height > 0) {
        return None;
    }
    Some(correct_rects(prev_info, cur_info, prev.geometry(), cur.geometry()))
}

fn by_position(a: &Position, b: &Position) -> Ordering {
    a.x.cmp(&b.x).then(a.y.cmp(&b.y))
}

/// Sweep enabled outputs left to right and correct each against the previous one.
pub fn adjust_positions(config: &mut LiveConfig, records: &[StoredOutputRecord]) {
    let matches = match_records(&config.outputs, records);

    let mut order: Vec<(Position, u32)> = config
        .outputs
        .iter()
        .filter(|o| o.is_positionable())
        .map(|o| (o.position, o.id))
        .collect();
    order.sort_by(|a, b| by_position(&a.0, &b.0));
    let order: Vec<u32> = order.into_iter().map(|(_, id)| id).collect();

    for pair in order.windows(2) {
        let (prev_id, cur_id) = (pair[0], pair[1]);
        let (Some(Some(prev_record)), Some(Some(cur_record))) = (matches.get(&prev_id), matches.get(&cur_id))
        else {
            continue;
        };
        let (Some(prev), Some(cur)) = (config.output(prev_id), config.output(cur_id)) else {
            continue;
        };
        let Some(position) = correct(prev_record, cur_record, prev, cur) else {
            continue;
        };

        if position != cur.position {
            debug!(
                output = %cur.name,
                from_x = cur.position.x,
                from_y = cur.position.y,
                to_x = position.x,
                to_y = position.y,
                "Correcting output position"
            );
        }
        if let Some(cur) = config.output_mut(cur_id) {
            cur.position = position;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Mode;
    use crate::store::record::{Metadata, ModeInfo};
    use crate::types::{Rotation, Size};

    fn rect(x: i32, y: i32, width: i32, height: i32) -> Rect {
        Rect { x, y, width, height }
    }

    fn output(id: u32, hash: &str, x: i32, y: i32, w: i32, h: i32) -> Output {
        let mut output = Output::new(id, hash, format!("DP-{id}"));
        output.modes.push(Mode::new("m", w, h, 60.0));
        output.mode = Some("m".to_string());
        output.position = Position::new(x, y);
        output
    }

    fn record(hash: &str, x: i32, y: i32, w: i32, h: i32) -> StoredOutputRecord {
        StoredOutputRecord {
            id: hash.to_string(),
            metadata: Metadata::default(),
            rotation: Rotation::None,
            scale: Some(1.0),
            mode: Some(ModeInfo {
                refresh: 60.0,
                size: Size::new(w, h),
            }),
            pos: Some(Position::new(x, y)),
            enabled: true,
            primary: false,
        }
    }

    #[test]
    fn test_mode_change_on_left_output_moves_right_neighbour() {
        // Stored side by side at 1080p, left output now runs at 1440p
        let position = correct_rects(
            rect(0, 0, 1920, 1080),
            rect(1920, 0, 1920, 1080),
            rect(0, 0, 2560, 1440),
            rect(1920, 0, 1920, 1080),
        );
        assert_eq!(position, Position::new(2560, 0));
    }

    #[test]
    fn test_unchanged_layout_is_left_alone() {
        for (cur_x, cur_y) in [(1920, 0), (1920, 200), (2000, -300)] {
            let prev = rect(0, 0, 1920, 1080);
            let cur = rect(cur_x, cur_y, 1280, 1024);
            assert_eq!(correct_rects(prev, cur, prev, cur), Position::new(cur_x, cur_y));
        }
    }

    #[test]
    fn test_gap_scales_with_previous_width() {
        let position = correct_rects(
            rect(0, 0, 1920, 1080),
            rect(2020, 0, 1920, 1080),
            rect(0, 0, 3840, 2160),
            rect(2020, 0, 1920, 1080),
        );
        assert_eq!(position, Position::new(4040, 0));
    }

    #[test]
    fn test_bottom_aligned_layout_stays_bottom_aligned() {
        let position = correct_rects(
            rect(0, 0, 1920, 1080),
            rect(1920, 280, 1280, 800),
            rect(0, 0, 2560, 1440),
            rect(1920, 280, 1280, 800),
        );
        assert_eq!(position, Position::new(2560, 640));
        assert_eq!(position.y + 800, 1440);
    }

    #[test]
    fn test_stacked_outputs_without_overlap() {
        let position = correct_rects(
            rect(0, 0, 1920, 1080),
            rect(0, 1080, 1920, 1080),
            rect(0, 0, 2560, 1440),
            rect(0, 1080, 1920, 1080),
        );
        assert_eq!(position, Position::new(0, 1440));
    }

    #[test]
    fn test_output_stacked_on_top_stays_on_top() {
        // Right neighbour stored with its bottom edge on the left output's top edge
        let prev = rect(0, 0, 1920, 1080);
        let stored = rect(1920, -1080, 1920, 1080);
        assert!(top_aligned(&prev, &stored));

        // It grows to 1440p and has to move up by the extra height
        let position = correct_rects(prev, stored, prev, rect(1920, -1080, 2560, 1440));
        assert_eq!(position, Position::new(1920, -1440));

        // With a 100px gap the gap scales with the new height
        let gapped = rect(1920, -1180, 1920, 1080);
        let position = correct_rects(prev, gapped, prev, rect(1920, -1180, 2560, 1440));
        assert_eq!(position, Position::new(1920, -1573));
    }

    #[test]
    fn test_far_off_rects_are_clamped() {
        let position = correct_rects(
            rect(i32::MAX - 3000, 0, 1920, 1080),
            rect(i32::MAX - 1080, 0, 1000, 1080),
            rect(i32::MAX - 3000, 0, 3840, 2160),
            rect(i32::MAX - 1080, 0, 1000, 1080),
        );
        assert_eq!(position.x, i32::MAX);
    }

    #[test]
    fn test_top_alignment_tie_break() {
        // Same height, same top: top aligned
        assert!(top_aligned(&rect(0, 0, 100, 100), &rect(100, 0, 100, 100)));
        // Bottoms flush, tops apart: bottom aligned
        assert!(!top_aligned(&rect(0, 0, 100, 100), &rect(100, 50, 100, 50)));
        // Sitting on top of the previous output
        assert!(top_aligned(&rect(0, 100, 100, 100), &rect(100, 0, 100, 100)));
    }

    #[test]
    fn test_correct_needs_stored_geometry() {
        let a = output(1, "a", 0, 0, 2560, 1440);
        let b = output(2, "b", 1920, 0, 1920, 1080);
        let mut without_pos = record("b", 1920, 0, 1920, 1080);
        without_pos.pos = None;
        assert_eq!(correct(&record("a", 0, 0, 1920, 1080), &without_pos, &a, &b), None);

        let mut without_mode = record("a", 0, 0, 1920, 1080);
        without_mode.mode = None;
        assert_eq!(correct(&without_mode, &record("b", 1920, 0, 1920, 1080), &a, &b), None);
    }

    #[test]
    fn test_stored_scale_is_respected() {
        // Stored 4K panel at scale 2 occupied 1920 logical pixels
        let mut panel = record("a", 0, 0, 3840, 2160);
        panel.scale = Some(2.0);
        let a = output(1, "a", 0, 0, 3840, 2160);
        let b = output(2, "b", 1920, 0, 1920, 1080);
        // Live panel now at scale 1
        let position = correct(&panel, &record("b", 1920, 0, 1920, 1080), &a, &b).unwrap();
        assert_eq!(position, Position::new(3840, 0));
    }

    #[test]
    fn test_adjust_positions_sweeps_left_to_right() {
        let mut config = LiveConfig::new(vec![
            output(3, "c", 3840, 0, 1920, 1080),
            output(1, "a", 0, 0, 2560, 1440),
            output(2, "b", 1920, 0, 1920, 1080),
        ]);
        let records = vec![
            record("a", 0, 0, 1920, 1080),
            record("b", 1920, 0, 1920, 1080),
            record("c", 3840, 0, 1920, 1080),
        ];
        adjust_positions(&mut config, &records);

        assert_eq!(config.output(1).unwrap().position, Position::new(0, 0));
        assert_eq!(config.output(2).unwrap().position, Position::new(2560, 0));
        assert_eq!(config.output(3).unwrap().position, Position::new(4480, 0));
    }

    #[test]
    fn test_adjust_positions_skips_disabled_and_unknown() {
        let mut disabled = output(2, "b", 1920, 0, 1920, 1080);
        disabled.enabled = false;
        let mut config = LiveConfig::new(vec![
            output(1, "a", 0, 0, 2560, 1440),
            disabled,
            output(3, "c", 1920, 500, 1920, 1080),
        ]);
        let records = vec![record("a", 0, 0, 1920, 1080), record("b", 1920, 0, 1920, 1080)];
        adjust_positions(&mut config, &records);

        assert_eq!(config.output(2).unwrap().position, Position::new(1920, 0));
        // No record for "c", nothing to infer
        assert_eq!(config.output(3).unwrap().position, Position::new(1920, 500));
    }
}
