use crate::config::{EventSelection, MergeSettings, ModelFilter, PipelineConfig};
use crate::context::ContextAggregator;
use crate::events::{check_column_sets, concat_match_events, select_events};
use crate::model::{build_model_table, filter_model_table};
use crate::orientation::{build_frames_dataframe, orient_frames};
use crate::pass_target::resolve_pass_targets;
use crate::possession::segment_possessions;
use crate::roster::{build_roster_dataframe, parse_match_roster};
use crate::source::{MatchFiles, load_match};
use crate::table::write_parquet;
use crate::tempo::{
    PossessionTempo, build_tempo_dataframe, build_windows_dataframe, merge_possessions,
    write_tempo_csv,
};
use crate::tracking::{build_tracking_dataframe, flatten_frames};
use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug)]
pub struct PipelineOutputs {
    /// Player possessions with possession keys and resolved end frames.
    pub events: DataFrame,
    pub metrics: DataFrame,
    pub roster: DataFrame,
    /// Flattened tracking rows before the roster join.
    pub tracking: DataFrame,
    pub frames: DataFrame,
    pub windows: DataFrame,
    pub tempo_rows: Vec<PossessionTempo>,
    pub tempo: DataFrame,
    /// `(aggregator name, aggregate)` pairs.
    pub aggregates: Vec<(String, DataFrame)>,
    pub model: DataFrame,
    pub model_filtered: DataFrame,
}

fn select_batch(matches: &[MatchFiles], selection: &EventSelection) -> Result<DataFrame> {
    let mut tables = Vec::with_capacity(matches.len());
    for m in matches {
        let selected = select_events(&m.events, selection)
            .with_context(|| format!("selecting {} events for match {}", selection.table, m.match_id))?;
        if selected.height() == 0 {
            warn!(match_id = %m.match_id, table = %selection.table, "match has no events of this type");
        }
        tables.push((m.match_id.clone(), selected));
    }
    let batch = concat_match_events(tables)
        .with_context(|| format!("concatenating {} events", selection.table))?;
    Ok(batch)
}

/// Runs every stage over an in-memory batch of matches.
pub fn run(
    matches: &[MatchFiles],
    merge: &MergeSettings,
    filter: &ModelFilter,
) -> Result<PipelineOutputs> {
    check_column_sets(matches.iter().map(|m| (m.match_id.as_str(), &m.events)))
        .context("raw event tables differ across matches")?;

    let possessions = select_batch(matches, &EventSelection::player_possessions())?;
    let passing_options = select_batch(matches, &EventSelection::passing_options())?;
    let engagements = select_batch(matches, &EventSelection::on_ball_engagements())?;

    let segmented = segment_possessions(&possessions)?;
    let events = resolve_pass_targets(&segmented.events)?;
    info!(
        possessions = events.height(),
        team_possessions = segmented.metrics.height(),
        "segmented possessions"
    );

    let mut tracking = Vec::new();
    let mut players = Vec::new();
    for m in matches {
        tracking.extend(flatten_frames(&m.match_id, &m.frames));
        players.extend(parse_match_roster(&m.match_id, &m.descriptor));
    }
    let oriented = orient_frames(&tracking, &players);
    let frames = build_frames_dataframe(&oriented)?;
    let tracking_table = build_tracking_dataframe(&tracking)?;
    let roster = build_roster_dataframe(&players)?;
    info!(
        tracking_rows = tracking.len(),
        oriented_rows = frames.height(),
        players = roster.height(),
        "normalized tracking"
    );

    let merged = merge_possessions(&events, &frames, merge)?;
    let windows = build_windows_dataframe(&merged.windows)?;
    let tempo = build_tempo_dataframe(&merged.tempo)?;

    let mut aggregates = Vec::new();
    for aggregator in ContextAggregator::defaults() {
        let source = if aggregator.subtypes.is_some() {
            &engagements
        } else {
            &passing_options
        };
        let aggregate = aggregator.aggregate(source, &events)?;
        aggregates.push((aggregator.name.clone(), aggregate));
    }

    let tables: Vec<DataFrame> = aggregates.iter().map(|(_, df)| df.clone()).collect();
    let model = build_model_table(&tempo, &roster, &events, &tables)?;
    let model_filtered = filter_model_table(&model, &segmented.metrics, filter)?;

    info!(
        matches = matches.len(),
        tempo_rows = tempo.height(),
        model_rows = model.height(),
        model_filtered_rows = model_filtered.height(),
        "pipeline complete"
    );

    Ok(PipelineOutputs {
        events,
        metrics: segmented.metrics,
        roster,
        tracking: tracking_table,
        frames,
        windows,
        tempo_rows: merged.tempo,
        tempo,
        aggregates,
        model,
        model_filtered,
    })
}

pub fn write_outputs(outputs: &mut PipelineOutputs, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut tables: Vec<(&str, &mut DataFrame)> = vec![
        ("events", &mut outputs.events),
        ("possession_metrics", &mut outputs.metrics),
        ("roster", &mut outputs.roster),
        ("tracking", &mut outputs.tracking),
        ("frames", &mut outputs.frames),
        ("possession_windows", &mut outputs.windows),
        ("possession_tempo", &mut outputs.tempo),
        ("model", &mut outputs.model),
        ("model_filtered", &mut outputs.model_filtered),
    ];
    for (name, df) in outputs.aggregates.iter_mut() {
        tables.push((name.as_str(), df));
    }

    for (name, df) in tables {
        let path = out_dir.join(format!("{name}.parquet"));
        write_parquet(df, &path).with_context(|| format!("writing {}", path.display()))?;
        info!(rows = df.height(), path = %path.display(), "wrote table");
    }

    let csv_path = out_dir.join("possession_tempo.csv");
    write_tempo_csv(&outputs.tempo_rows, &csv_path)
        .with_context(|| format!("writing {}", csv_path.display()))?;
    info!(rows = outputs.tempo_rows.len(), path = %csv_path.display(), "wrote table");
    Ok(())
}

/// Loads the configured matches from disk, runs the pipeline and writes every
/// table to the output directory.
pub fn process(config: &PipelineConfig) -> Result<()> {
    config.validate()?;
    info!(
        matches = config.match_ids.len(),
        data_dir = %config.data_dir.display(),
        include_pass = !config.raw_end_frame,
        "processing batch"
    );

    let mut matches = Vec::with_capacity(config.match_ids.len());
    for match_id in &config.match_ids {
        matches.push(load_match(&config.data_dir, match_id.trim())?);
    }

    let mut outputs = run(&matches, &config.merge_settings(), &config.model_filter())?;
    write_outputs(&mut outputs, &config.out_dir)?;
    Ok(())
}
