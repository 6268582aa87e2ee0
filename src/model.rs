use crate::config::{MODEL_CONTEXT_COLUMNS, ModelFilter};
use crate::error::Result;
use crate::table::{i64_values, require_columns, str_values};
use polars::prelude::*;
use tracing::{debug, info};

const ROSTER_COLUMNS: [&str; 6] = [
    "match_id",
    "player_id",
    "team_id",
    "team_name",
    "player_short_name",
    "player_role_name",
];

const FAST_PHASES: [&str; 3] = ["transition", "quick_break", "direct"];
const CHAOTIC_PHASES: [&str; 2] = ["chaotic", "disruption"];

/// One row per tempo row, enriched with the player's roster entry, the
/// possession's event context and every contextual aggregate.
///
/// All joins are left joins, so the row count is that of `tempo`.
pub fn build_model_table(
    tempo: &DataFrame,
    roster: &DataFrame,
    events: &DataFrame,
    aggregates: &[DataFrame],
) -> Result<DataFrame> {
    require_columns(
        tempo,
        "possession_tempo",
        &["individual_poss_id", "match_id", "event_id", "player_id"],
    )?;
    require_columns(roster, "roster", &ROSTER_COLUMNS)?;
    require_columns(events, "player_possession", &MODEL_CONTEXT_COLUMNS)?;

    let players = roster
        .clone()
        .lazy()
        .select(ROSTER_COLUMNS.iter().map(|c| col(c)).collect::<Vec<_>>())
        .unique_stable(
            Some(vec!["match_id".to_string(), "player_id".to_string()]),
            UniqueKeepStrategy::First,
        );
    let context = events
        .clone()
        .lazy()
        .select(MODEL_CONTEXT_COLUMNS.iter().map(|c| col(c)).collect::<Vec<_>>());

    let mut lf = tempo
        .clone()
        .lazy()
        .join(
            players,
            [col("match_id"), col("player_id")],
            [col("match_id"), col("player_id")],
            JoinArgs::new(JoinType::Left),
        )
        .join(
            context,
            [col("individual_poss_id")],
            [col("individual_poss_id")],
            JoinArgs::new(JoinType::Left),
        );

    for aggregate in aggregates {
        require_columns(aggregate, "context_aggregate", &["match_id", "pp_event_id"])?;
        lf = lf.join(
            aggregate.clone().lazy(),
            [col("match_id"), col("event_id")],
            [col("match_id"), col("pp_event_id")],
            JoinArgs::new(JoinType::Left),
        );
    }

    let model = lf.collect()?;
    debug!(rows = model.height(), columns = model.width(), "built model table");
    Ok(model)
}

fn team_phase() -> Expr {
    let phase = "team_in_possession_phase_type";
    when(col(phase).is_in(lit(Series::new("fast_phases", FAST_PHASES))))
        .then(lit("fast or long"))
        .when(col(phase).is_in(lit(Series::new("chaotic_phases", CHAOTIC_PHASES))))
        .then(lit("chaotic or disruption"))
        .otherwise(col(phase))
        .alias("team_phase")
}

/// Keeps the rows suited to tempo modeling: the ball moved, the team
/// possession strung together enough player possessions (per `metrics`) and
/// the player has enough remaining rows. Adds the grouped `team_phase`.
pub fn filter_model_table(
    model: &DataFrame,
    metrics: &DataFrame,
    filter: &ModelFilter,
) -> Result<DataFrame> {
    require_columns(
        model,
        "model",
        &[
            "ball_total_distance_tempo",
            "match_team_possession_id",
            "player_short_name",
            "team_in_possession_phase_type",
        ],
    )?;
    require_columns(
        metrics,
        "possession_metrics",
        &["match_team_possession_id", "team_possession_num_sequences"],
    )?;

    let ids = str_values(metrics, "possession_metrics", "match_team_possession_id")?;
    let sequences = i64_values(metrics, "possession_metrics", "team_possession_num_sequences")?;
    let long_possessions: Vec<String> = ids
        .into_iter()
        .zip(sequences)
        .filter_map(|(id, n)| match (id, n) {
            (Some(id), Some(n)) if n >= i64::from(filter.min_team_sequences) => Some(id),
            _ => None,
        })
        .collect();

    let filtered = model
        .clone()
        .lazy()
        .filter(col("ball_total_distance_tempo").gt(lit(0.0)))
        .filter(
            col("match_team_possession_id")
                .is_in(lit(Series::new("long_possessions", long_possessions))),
        )
        // Unnamed players would otherwise share one count.
        .filter(col("player_short_name").is_not_null())
        .with_column(
            col("individual_poss_id")
                .count()
                .over([col("player_short_name")])
                .cast(DataType::Int64)
                .alias("player_possessions"),
        )
        .filter(col("player_possessions").gt_eq(lit(i64::from(filter.min_player_possessions))))
        .with_column(team_phase())
        .collect()?;

    info!(
        kept = filtered.height(),
        dropped = model.height() - filtered.height(),
        "filtered model table"
    );
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn tempo() -> DataFrame {
        df!(
            "individual_poss_id" => &["M_1_e1", "M_2_e2", "M_3_e3"],
            "event_id" => &["e1", "e2", "e3"],
            "player_id" => &["7", "8", "99"],
            "match_id" => &["M", "M", "M"],
            "match_team_possession_id" => &["M_100_1", "M_100_1", "M_200_2"],
            "ball_total_distance_tempo" => &[Some(12.0), Some(0.0), None],
            "ball_time_in_poss_tempo" => &[Some(1.2), Some(0.5), Some(0.0)],
            "ball_speed_tempo" => &[Some(10.0), Some(0.0), None]
        )
        .unwrap()
    }

    fn roster() -> DataFrame {
        df!(
            "match_name" => &["A vs B", "A vs B"],
            "match_id" => &["M", "M"],
            "player_id" => &["7", "8"],
            "team_id" => &["100", "100"],
            "team_name" => &["A", "A"],
            "player_short_name" => &["P. Seven", "P. Eight"],
            "player_role_name" => &["Left Back", "Centre Back"]
        )
        .unwrap()
    }

    fn events() -> DataFrame {
        df!(
            "individual_poss_id" => &["M_1_e1", "M_2_e2", "M_3_e3"],
            "duration" => &[1.2, 0.5, 0.1],
            "start_type" => &["pass_reception", "pass_reception", "recovery"],
            "end_type" => &["pass", "pass", "possession_loss"],
            "pass_outcome" => &[Some("successful"), Some("successful"), None],
            "pass_distance" => &[Some(14.0), Some(9.0), None],
            "separation_start" => &[2.0, 3.0, 1.0],
            "separation_end" => &[2.5, 1.0, 0.5],
            "n_passing_options" => &[3i64, 2, 0],
            "n_off_ball_runs" => &[1i64, 0, 0],
            "game_state" => &["drawing", "drawing", "winning"],
            "team_in_possession_phase_type" => &["build_up", "transition", "chaotic"],
            "third_start" => &["defensive_third", "middle_third", "attacking_third"],
            "first_player_possession_in_team_possession" => &[true, false, true],
            "last_player_possession_in_team_possession" => &[false, true, true]
        )
        .unwrap()
    }

    fn pressing() -> DataFrame {
        df!(
            "match_id" => &["M"],
            "pp_event_id" => &["e2"],
            "num_opp_press_players" => &[2i64],
            "opp_press_speed_avg_max" => &[6.5]
        )
        .unwrap()
    }

    #[test]
    fn left_joins_keep_every_tempo_row() {
        let model = build_model_table(&tempo(), &roster(), &events(), &[pressing()]).unwrap();
        assert_eq!(model.height(), 3);
        let names = model.column("player_short_name").unwrap();
        assert_eq!(names.null_count(), 1);
        let pressers: Vec<Option<i64>> = model
            .column("num_opp_press_players")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(pressers, vec![None, Some(2), None]);
        assert!(model.get_column_names().contains(&"third_start"));
        assert!(!model.get_column_names().contains(&"pp_event_id"));
    }

    #[test]
    fn missing_context_column_is_rejected() {
        let events = events().drop("third_start").unwrap();
        let err = build_model_table(&tempo(), &roster(), &events, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn filter_drops_stationary_and_short_possessions() {
        let model = build_model_table(&tempo(), &roster(), &events(), &[]).unwrap();
        let metrics = df!(
            "match_team_possession_id" => &["M_100_1", "M_200_2"],
            "team_possession_num_sequences" => &[3i64, 1]
        )
        .unwrap();
        let filter = ModelFilter {
            min_team_sequences: 3,
            min_player_possessions: 1,
        };
        let kept = filter_model_table(&model, &metrics, &filter).unwrap();
        assert_eq!(kept.height(), 1);
        let ids = kept.column("individual_poss_id").unwrap().str().unwrap().get(0);
        assert_eq!(ids, Some("M_1_e1"));
        let phase = kept.column("team_phase").unwrap().str().unwrap().get(0);
        assert_eq!(phase, Some("build_up"));

        let strict = ModelFilter {
            min_team_sequences: 3,
            min_player_possessions: 2,
        };
        assert_eq!(filter_model_table(&model, &metrics, &strict).unwrap().height(), 0);
    }

    #[test]
    fn unnamed_players_are_not_counted_together() {
        let model = df!(
            "individual_poss_id" => &["M_98_e1", "M_99_e2", "M_7_e3"],
            "match_team_possession_id" => &["M_100_1", "M_100_1", "M_100_1"],
            "ball_total_distance_tempo" => &[4.0, 6.0, 8.0],
            "player_short_name" => &[None, None, Some("P. Seven")],
            "team_in_possession_phase_type" => &["build_up", "build_up", "build_up"]
        )
        .unwrap();
        let metrics = df!(
            "match_team_possession_id" => &["M_100_1"],
            "team_possession_num_sequences" => &[3i64]
        )
        .unwrap();
        let filter = ModelFilter {
            min_team_sequences: 1,
            min_player_possessions: 2,
        };
        let kept = filter_model_table(&model, &metrics, &filter).unwrap();
        assert_eq!(kept.height(), 0);

        let loose = ModelFilter {
            min_team_sequences: 1,
            min_player_possessions: 1,
        };
        let kept = filter_model_table(&model, &metrics, &loose).unwrap();
        assert_eq!(kept.height(), 1);
        let name = kept.column("player_short_name").unwrap().str().unwrap().get(0);
        assert_eq!(name, Some("P. Seven"));
    }

    #[test]
    fn phases_are_grouped() {
        let model = df!(
            "team_in_possession_phase_type" => &["transition", "direct", "disruption", "build_up"]
        )
        .unwrap();
        let out = model.lazy().with_column(team_phase()).collect().unwrap();
        let phases: Vec<Option<&str>> = out.column("team_phase").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(
            phases,
            vec![
                Some("fast or long"),
                Some("fast or long"),
                Some("chaotic or disruption"),
                Some("build_up"),
            ]
        );
    }
}
