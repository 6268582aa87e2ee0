use crate::error::Result;
use crate::table::{bool_values, i64_values, id_values, require_columns, required, str_values};
use polars::prelude::*;
use tracing::{debug, warn};

const TABLE: &str = "player_possession";

pub struct SegmentedPossessions {
    /// Player possessions sorted by `(match_id, index)` with possession keys attached.
    pub events: DataFrame,
    /// One row per `(match, ordinal, team possession, team)`, sorted by `(match, ordinal)`.
    pub metrics: DataFrame,
}

/// Numbers team possessions inside each match.
///
/// A row whose `first_player_possession_in_team_possession` flag is set opens a
/// new team possession; the ordinal is the running count of those markers,
/// inclusive. Rows that precede the first marker of a match (or every row of a
/// match with no marker at all) get ordinal 0 and are kept as one implicit
/// possession rather than rejected.
pub fn segment_possessions(events: &DataFrame) -> Result<SegmentedPossessions> {
    require_columns(
        events,
        TABLE,
        &[
            "match_id",
            "index",
            "event_id",
            "team_id",
            "team_shortname",
            "duration",
            "first_player_possession_in_team_possession",
        ],
    )?;

    let mut sorted = events.sort(["match_id", "index"], vec![false, false], true)?;

    let match_ids = required(id_values(&sorted, TABLE, "match_id")?, TABLE, "match_id")?;
    let indices = required(i64_values(&sorted, TABLE, "index")?, TABLE, "index")?;
    let event_ids = required(id_values(&sorted, TABLE, "event_id")?, TABLE, "event_id")?;
    let team_names = str_values(&sorted, TABLE, "team_shortname")?;
    let starts = bool_values(&sorted, TABLE, "first_player_possession_in_team_possession")?;

    let rows = sorted.height();
    let mut possession_start: Vec<i32> = Vec::with_capacity(rows);
    let mut ordinals: Vec<i64> = Vec::with_capacity(rows);
    let mut team_possession_ids: Vec<String> = Vec::with_capacity(rows);
    let mut individual_ids: Vec<String> = Vec::with_capacity(rows);

    let mut current_match: Option<&str> = None;
    let mut ordinal = 0i64;
    for row in 0..rows {
        let match_id = match_ids[row].as_str();
        if current_match != Some(match_id) {
            if current_match.is_some() && ordinal == 0 {
                warn_unmarked(current_match);
            }
            current_match = Some(match_id);
            ordinal = 0;
        }

        let is_start = starts[row].unwrap_or(false);
        if is_start {
            ordinal += 1;
        }

        let team = team_names[row].as_deref().unwrap_or("").trim();
        possession_start.push(i32::from(is_start));
        ordinals.push(ordinal);
        team_possession_ids.push(format!("{match_id}_{team}_{ordinal}"));
        individual_ids.push(format!("{match_id}_{}_{}", indices[row], event_ids[row]));
    }
    if ordinal == 0 {
        warn_unmarked(current_match);
    }

    sorted.with_column(Series::new("team_possession_start", possession_start))?;
    sorted.with_column(Series::new("match_possession_id", ordinals))?;
    sorted.with_column(Series::new("match_team_possession_id", team_possession_ids))?;
    sorted.with_column(Series::new("individual_poss_id", individual_ids))?;

    let metrics = possession_metrics(&sorted)?;
    debug!(
        events = sorted.height(),
        team_possessions = metrics.height(),
        "segmented possessions"
    );

    Ok(SegmentedPossessions {
        events: sorted,
        metrics,
    })
}

fn warn_unmarked(match_id: Option<&str>) {
    if let Some(match_id) = match_id {
        warn!(
            match_id,
            "match has no team possession start markers, treating it as possession 0"
        );
    }
}

/// Duration and player-possession count per team possession.
///
/// Expects the segmented, `(match_id, index)` sorted table: first appearance
/// order of each group is then already `(match_id, match_possession_id)` order.
pub fn possession_metrics(segmented: &DataFrame) -> Result<DataFrame> {
    let metrics = segmented
        .clone()
        .lazy()
        .group_by_stable([
            col("match_id"),
            col("match_possession_id"),
            col("match_team_possession_id"),
            col("team_id"),
        ])
        .agg([
            col("duration")
                .cast(DataType::Float64)
                .sum()
                .alias("team_possession_duration"),
            len()
                .cast(DataType::Int64)
                .alias("team_possession_num_sequences"),
        ])
        .collect()?;
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn events() -> DataFrame {
        df!(
            "match_id" => &["M", "M", "M", "N", "N"],
            "index" => &[0i64, 1, 2, 0, 1],
            "event_id" => &["a", "b", "c", "d", "e"],
            "team_id" => &["1", "1", "2", "3", "3"],
            "team_shortname" => &["Home ", "Home ", "Away", "Solo", "Solo"],
            "duration" => &[1.5, 2.0, 0.5, 1.0, 1.0],
            "first_player_possession_in_team_possession" => &[true, false, true, false, false]
        )
        .unwrap()
    }

    fn column_i64(df: &DataFrame, name: &str) -> Vec<i64> {
        df.column(name)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    fn column_str(df: &DataFrame, name: &str) -> Vec<String> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .map(|v| v.to_string())
            .collect()
    }

    #[test]
    fn ordinals_follow_start_markers() {
        let out = segment_possessions(&events()).unwrap();
        let ordinals = column_i64(&out.events, "match_possession_id");
        assert_eq!(&ordinals[..3], &[1, 1, 2]);
    }

    #[test]
    fn match_without_markers_is_possession_zero() {
        let out = segment_possessions(&events()).unwrap();
        let ordinals = column_i64(&out.events, "match_possession_id");
        assert_eq!(&ordinals[3..], &[0, 0]);
        let keys = column_str(&out.events, "match_team_possession_id");
        assert_eq!(keys[3], "N_Solo_0");
    }

    #[test]
    fn ordinal_is_non_decreasing_and_steps_on_markers() {
        let raw = df!(
            "match_id" => &["M"; 6],
            "index" => &[5i64, 0, 3, 1, 4, 2],
            "event_id" => &["f", "a", "d", "b", "e", "c"],
            "team_id" => &["1"; 6],
            "team_shortname" => &["T"; 6],
            "duration" => &[1.0; 6],
            "first_player_possession_in_team_possession" => &[false, true, true, false, true, false]
        )
        .unwrap();
        let out = segment_possessions(&raw).unwrap();
        let ordinals = column_i64(&out.events, "match_possession_id");
        let starts: Vec<i32> = out
            .events
            .column("team_possession_start")
            .unwrap()
            .i32()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(column_i64(&out.events, "index"), vec![0, 1, 2, 3, 4, 5]);
        for row in 1..ordinals.len() {
            assert_eq!(ordinals[row] - ordinals[row - 1], i64::from(starts[row]));
        }
        assert_eq!(ordinals, vec![1, 1, 1, 2, 3, 3]);
    }

    #[test]
    fn keys_are_composed_from_identifiers() {
        let out = segment_possessions(&events()).unwrap();
        let team_keys = column_str(&out.events, "match_team_possession_id");
        assert_eq!(team_keys[0], "M_Home_1");
        assert_eq!(team_keys[2], "M_Away_2");
        let event_keys = column_str(&out.events, "individual_poss_id");
        assert_eq!(event_keys[1], "M_1_b");
    }

    #[test]
    fn metrics_sum_member_durations() {
        let out = segment_possessions(&events()).unwrap();
        let metrics = out.metrics;
        assert_eq!(metrics.height(), 3);
        assert_eq!(
            column_str(&metrics, "match_team_possession_id"),
            vec!["M_Home_1", "M_Away_2", "N_Solo_0"]
        );
        let durations: Vec<f64> = metrics
            .column("team_possession_duration")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_relative_eq!(durations[0], 3.5, epsilon = 1e-9);
        assert_relative_eq!(durations[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(durations[2], 2.0, epsilon = 1e-9);
        assert_eq!(
            column_i64(&metrics, "team_possession_num_sequences"),
            vec![2, 1, 2]
        );
    }

    #[test]
    fn missing_marker_column_is_rejected() {
        let raw = events()
            .drop("first_player_possession_in_team_possession")
            .unwrap();
        assert!(segment_possessions(&raw).is_err());
    }
}
