use crate::error::Result;
use crate::table::require_columns;
use anyhow::Context;
use polars::prelude::*;
use std::path::Path;

/// Distinct team possessions per match, labelled with the match name.
pub fn match_summary(metrics: &DataFrame, roster: &DataFrame) -> Result<DataFrame> {
    require_columns(
        metrics,
        "possession_metrics",
        &["match_id", "match_team_possession_id"],
    )?;
    require_columns(roster, "roster", &["match_id", "match_name"])?;

    let names = roster
        .clone()
        .lazy()
        .select([col("match_id"), col("match_name")])
        .unique_stable(None, UniqueKeepStrategy::First);

    let df = metrics
        .clone()
        .lazy()
        .group_by_stable([col("match_id")])
        .agg([col("match_team_possession_id")
            .n_unique()
            .cast(DataType::Int64)
            .alias("num_possession_changes")])
        .join(
            names,
            [col("match_id")],
            [col("match_id")],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    Ok(df)
}

/// Player-possession sequences per match and team, labelled with the team name.
pub fn team_summary(metrics: &DataFrame, roster: &DataFrame) -> Result<DataFrame> {
    require_columns(
        metrics,
        "possession_metrics",
        &["match_id", "team_id", "team_possession_num_sequences"],
    )?;
    require_columns(roster, "roster", &["match_id", "team_id", "team_name"])?;

    let names = roster
        .clone()
        .lazy()
        .select([col("match_id"), col("team_id"), col("team_name")])
        .unique_stable(None, UniqueKeepStrategy::First);

    let df = metrics
        .clone()
        .lazy()
        .group_by_stable([col("match_id"), col("team_id")])
        .agg([col("team_possession_num_sequences")
            .sum()
            .cast(DataType::Int64)
            .alias("team_possession_num_sequences")])
        .join(
            names,
            [col("match_id"), col("team_id")],
            [col("match_id"), col("team_id")],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    Ok(df)
}

pub fn print_summary(out_dir: &Path) -> anyhow::Result<()> {
    println!("== Possession Summary ==");

    let metrics_path = out_dir.join("possession_metrics.parquet");
    let roster_path = out_dir.join("roster.parquet");
    let metrics = LazyFrame::scan_parquet(&metrics_path, ScanArgsParquet::default())
        .and_then(|lf| lf.collect())
        .with_context(|| format!("reading {}", metrics_path.display()))?;
    let roster = LazyFrame::scan_parquet(&roster_path, ScanArgsParquet::default())
        .and_then(|lf| lf.collect())
        .with_context(|| format!("reading {}", roster_path.display()))?;

    println!("Possessions per match:\n{}", match_summary(&metrics, &roster)?);
    println!("Sequences per team:\n{}", team_summary(&metrics, &roster)?);

    let tempo_path = out_dir.join("possession_tempo.parquet");
    if tempo_path.exists() {
        let tempo = LazyFrame::scan_parquet(&tempo_path, ScanArgsParquet::default())?
            .group_by_stable([col("match_id")])
            .agg([
                len().alias("possessions"),
                col("ball_speed_tempo").null_count().alias("no_tempo"),
                col("ball_speed_tempo").mean().alias("mean_tempo"),
            ])
            .collect()?;
        println!("Tempo per match:\n{}", tempo);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> DataFrame {
        df!(
            "match_id" => &["M", "M", "M", "N"],
            "match_possession_id" => &[1i64, 2, 3, 1],
            "match_team_possession_id" => &["M_A_1", "M_B_2", "M_A_3", "N_A_1"],
            "team_id" => &["A", "B", "A", "A"],
            "team_possession_duration" => &[3.0, 1.0, 2.0, 4.0],
            "team_possession_num_sequences" => &[2i64, 1, 4, 3]
        )
        .unwrap()
    }

    fn roster() -> DataFrame {
        df!(
            "match_id" => &["M", "M", "M", "N"],
            "match_name" => &["A vs B", "A vs B", "A vs B", "A vs C"],
            "team_id" => &["A", "A", "B", "A"],
            "team_name" => &["Alpha", "Alpha", "Beta", "Alpha"]
        )
        .unwrap()
    }

    #[test]
    fn counts_possession_changes_per_match() {
        let out = match_summary(&metrics(), &roster()).unwrap();
        assert_eq!(out.height(), 2);
        let counts: Vec<Option<i64>> = out
            .column("num_possession_changes")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(counts, vec![Some(3), Some(1)]);
        let names = out.column("match_name").unwrap().str().unwrap().get(1);
        assert_eq!(names, Some("A vs C"));
    }

    #[test]
    fn sums_sequences_per_team() {
        let out = team_summary(&metrics(), &roster()).unwrap();
        assert_eq!(out.height(), 3);
        let totals: Vec<Option<i64>> = out
            .column("team_possession_num_sequences")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(totals, vec![Some(6), Some(1), Some(3)]);
        let team = out.column("team_name").unwrap().str().unwrap().get(1);
        assert_eq!(team, Some("Beta"));
    }
}
