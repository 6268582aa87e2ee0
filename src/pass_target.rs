use crate::error::{PipelineError, Result};
use crate::table::{bool_values, i64_values, require_columns, required, str_values};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

const TABLE: &str = "player_possession";

/// Attaches `frame_end_v2`: the frame where the ball actually arrives.
///
/// A successful pass that does not close the team possession ends when the
/// next player possession of the same team possession starts. Every other
/// event keeps its raw `frame_end`. A qualifying pass with no later member in
/// its team possession also falls back to the raw end frame.
pub fn resolve_pass_targets(segmented: &DataFrame) -> Result<DataFrame> {
    require_columns(
        segmented,
        TABLE,
        &[
            "match_id",
            "match_possession_id",
            "match_team_possession_id",
            "individual_poss_id",
            "index",
            "frame_start",
            "frame_end",
            "end_type",
            "pass_outcome",
            "last_player_possession_in_team_possession",
        ],
    )?;

    let mut sorted = segmented.sort(
        ["match_id", "match_possession_id", "index"],
        vec![false, false, false],
        true,
    )?;

    let team_keys = required(
        str_values(&sorted, TABLE, "match_team_possession_id")?,
        TABLE,
        "match_team_possession_id",
    )?;
    let event_keys = required(
        str_values(&sorted, TABLE, "individual_poss_id")?,
        TABLE,
        "individual_poss_id",
    )?;
    let frame_starts = i64_values(&sorted, TABLE, "frame_start")?;
    let frame_ends = i64_values(&sorted, TABLE, "frame_end")?;
    let end_types = str_values(&sorted, TABLE, "end_type")?;
    let outcomes = str_values(&sorted, TABLE, "pass_outcome")?;
    let last_flags = bool_values(&sorted, TABLE, "last_player_possession_in_team_possession")?;

    let next_starts = next_in_group(&team_keys, &frame_starts);

    let mut resolved: Vec<i64> = Vec::with_capacity(sorted.height());
    let mut extended = 0usize;
    for row in 0..sorted.height() {
        let completes_pass = end_types[row].as_deref() == Some("pass")
            && outcomes[row].as_deref() == Some("successful")
            && last_flags[row] == Some(false);

        let end = match (completes_pass, next_starts[row]) {
            (true, Some(next_start)) => {
                extended += 1;
                Some(next_start)
            }
            _ => frame_ends[row],
        };

        let end = end.ok_or_else(|| PipelineError::MissingEndFrame {
            individual_poss_id: event_keys[row].clone(),
        })?;
        resolved.push(end);
    }

    sorted.with_column(Series::new("frame_end_v2", resolved))?;
    debug!(
        events = sorted.height(),
        extended, "resolved pass reception frames"
    );
    Ok(sorted)
}

/// `frame_start` of the following member of each row's group, scanning
/// backwards so groups need not be contiguous.
fn next_in_group(keys: &[String], frame_starts: &[Option<i64>]) -> Vec<Option<i64>> {
    let mut upcoming: HashMap<&str, Option<i64>> = HashMap::new();
    let mut next = vec![None; keys.len()];
    for row in (0..keys.len()).rev() {
        next[row] = upcoming.get(keys[row].as_str()).copied().flatten();
        upcoming.insert(keys[row].as_str(), frame_starts[row]);
    }
    next
}
