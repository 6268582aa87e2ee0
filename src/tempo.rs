use crate::config::MergeSettings;
use crate::error::Result;
use crate::table::{f64_values, i64_values, id_values, require_columns, required, str_values};
use csv::Writer;
use polars::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

const EVENTS: &str = "player_possession";
const FRAMES: &str = "frames";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallSample {
    pub frame: i64,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// Distinct ball positions per match, sorted by frame.
#[derive(Debug, Default)]
pub struct BallTrack {
    by_match: HashMap<String, Vec<BallSample>>,
}

impl BallTrack {
    pub fn from_frames_table(frames: &DataFrame) -> Result<Self> {
        require_columns(frames, FRAMES, &["match_id", "frame", "ball_x", "ball_y"])?;
        let match_ids = required(id_values(frames, FRAMES, "match_id")?, FRAMES, "match_id")?;
        let frame_numbers = required(i64_values(frames, FRAMES, "frame")?, FRAMES, "frame")?;
        let xs = f64_values(frames, FRAMES, "ball_x")?;
        let ys = f64_values(frames, FRAMES, "ball_y")?;

        let mut by_match: HashMap<String, Vec<BallSample>> = HashMap::new();
        for (row, match_id) in match_ids.into_iter().enumerate() {
            by_match.entry(match_id).or_default().push(BallSample {
                frame: frame_numbers[row],
                x: xs[row],
                y: ys[row],
            });
        }

        for samples in by_match.values_mut() {
            samples.sort_by(compare_samples);
            samples.dedup();
        }

        Ok(Self { by_match })
    }

    /// Samples with `start <= frame <= end`, empty when the match is unknown
    /// or the range holds no sampled frame.
    pub fn window(&self, match_id: &str, start: i64, end: i64) -> &[BallSample] {
        let Some(samples) = self.by_match.get(match_id) else {
            return &[];
        };
        let lo = samples.partition_point(|s| s.frame < start);
        let hi = samples.partition_point(|s| s.frame <= end);
        if lo >= hi { &[] } else { &samples[lo..hi] }
    }

    pub fn sample_count(&self) -> usize {
        self.by_match.values().map(Vec::len).sum()
    }
}

fn compare_samples(a: &BallSample, b: &BallSample) -> Ordering {
    a.frame
        .cmp(&b.frame)
        .then_with(|| compare_coord(a.x, b.x))
        .then_with(|| compare_coord(a.y, b.y))
}

fn compare_coord(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

#[derive(Debug, Clone)]
struct PossessionEvent {
    individual_poss_id: String,
    event_id: String,
    match_id: String,
    match_team_possession_id: String,
    player_id: String,
    player_name: Option<String>,
    index: i64,
    frame_start: i64,
    frame_end: Option<i64>,
    frame_end_v2: i64,
}

fn possession_events(events: &DataFrame) -> Result<Vec<PossessionEvent>> {
    require_columns(
        events,
        EVENTS,
        &[
            "individual_poss_id",
            "event_id",
            "match_id",
            "match_team_possession_id",
            "player_id",
            "index",
            "frame_start",
            "frame_end",
            "frame_end_v2",
        ],
    )?;

    let individual = required(
        str_values(events, EVENTS, "individual_poss_id")?,
        EVENTS,
        "individual_poss_id",
    )?;
    let event_ids = required(id_values(events, EVENTS, "event_id")?, EVENTS, "event_id")?;
    let match_ids = required(id_values(events, EVENTS, "match_id")?, EVENTS, "match_id")?;
    let team_keys = required(
        str_values(events, EVENTS, "match_team_possession_id")?,
        EVENTS,
        "match_team_possession_id",
    )?;
    let player_ids = required(id_values(events, EVENTS, "player_id")?, EVENTS, "player_id")?;
    let player_names = if events.get_column_names().contains(&"player_name") {
        str_values(events, EVENTS, "player_name")?
    } else {
        vec![None; events.height()]
    };
    let indices = required(i64_values(events, EVENTS, "index")?, EVENTS, "index")?;
    let starts = required(i64_values(events, EVENTS, "frame_start")?, EVENTS, "frame_start")?;
    let ends = i64_values(events, EVENTS, "frame_end")?;
    let resolved = required(
        i64_values(events, EVENTS, "frame_end_v2")?,
        EVENTS,
        "frame_end_v2",
    )?;

    let mut out = Vec::with_capacity(events.height());
    for row in 0..events.height() {
        out.push(PossessionEvent {
            individual_poss_id: individual[row].clone(),
            event_id: event_ids[row].clone(),
            match_id: match_ids[row].clone(),
            match_team_possession_id: team_keys[row].clone(),
            player_id: player_ids[row].clone(),
            player_name: player_names[row].clone(),
            index: indices[row],
            frame_start: starts[row],
            frame_end: ends[row],
            frame_end_v2: resolved[row],
        });
    }
    Ok(out)
}

/// One sampled frame inside one possession event's window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRow {
    pub individual_poss_id: String,
    pub match_id: String,
    pub match_team_possession_id: String,
    pub player_id: String,
    pub player_name: Option<String>,
    pub index: i64,
    pub frame_start: i64,
    pub frame_end: Option<i64>,
    pub frame_end_v2: i64,
    pub num_frames: i64,
    pub frame: i64,
    pub ball_x: Option<f64>,
    pub ball_y: Option<f64>,
    pub ball_time_in_poss_tempo: f64,
    pub ball_dist_step: f64,
    pub ball_dist_cum: f64,
}

/// Ball kinematics of one possession event.
///
/// `ball_total_distance_tempo` is null for an empty window and
/// `ball_speed_tempo` is null whenever distance or a positive elapsed time is
/// missing; filtering those out is left to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PossessionTempo {
    pub individual_poss_id: String,
    pub event_id: String,
    pub player_id: String,
    pub match_id: String,
    pub match_team_possession_id: String,
    pub num_frames: Option<i64>,
    pub window_frames: i64,
    pub ball_total_distance_tempo: Option<f64>,
    pub ball_time_in_poss_tempo: Option<f64>,
    pub ball_speed_tempo: Option<f64>,
}

pub struct MergedPossessions {
    pub windows: Vec<WindowRow>,
    pub tempo: Vec<PossessionTempo>,
}

/// Joins each possession event to the ball samples of its frame window and
/// measures how far and how fast the ball moved.
///
/// Frames are indexed per match up front, so an event only ever scans the
/// samples of its own match.
pub fn merge_possessions(
    events: &DataFrame,
    frames: &DataFrame,
    settings: &MergeSettings,
) -> Result<MergedPossessions> {
    let track = BallTrack::from_frames_table(frames)?;
    let events = possession_events(events)?;

    let mut windows = Vec::new();
    let mut tempo = Vec::with_capacity(events.len());
    let mut empty_windows = 0usize;

    for event in &events {
        let effective_end = if settings.include_pass {
            Some(event.frame_end_v2)
        } else {
            event.frame_end
        };
        let num_frames = effective_end.map(|end| end - event.frame_start);
        let elapsed = num_frames.map(|n| n as f64 * settings.frame_duration_seconds);

        let samples: &[BallSample] = match effective_end {
            Some(end) => track.window(&event.match_id, event.frame_start, end),
            None => &[],
        };

        let mut cumulative = 0.0;
        let mut previous: Option<&BallSample> = None;
        for sample in samples {
            let step = previous.map(|p| step_distance(p, sample)).unwrap_or(0.0);
            cumulative += step;
            previous = Some(sample);

            windows.push(WindowRow {
                individual_poss_id: event.individual_poss_id.clone(),
                match_id: event.match_id.clone(),
                match_team_possession_id: event.match_team_possession_id.clone(),
                player_id: event.player_id.clone(),
                player_name: event.player_name.clone(),
                index: event.index,
                frame_start: event.frame_start,
                frame_end: event.frame_end,
                frame_end_v2: event.frame_end_v2,
                num_frames: num_frames.unwrap_or_default(),
                frame: sample.frame,
                ball_x: sample.x,
                ball_y: sample.y,
                ball_time_in_poss_tempo: elapsed.unwrap_or_default(),
                ball_dist_step: step,
                ball_dist_cum: cumulative,
            });
        }

        let distance = if samples.is_empty() {
            empty_windows += 1;
            None
        } else {
            Some(cumulative)
        };
        let speed = match (distance, elapsed) {
            (Some(d), Some(t)) if t > 0.0 => Some(d / t),
            _ => None,
        };

        tempo.push(PossessionTempo {
            individual_poss_id: event.individual_poss_id.clone(),
            event_id: event.event_id.clone(),
            player_id: event.player_id.clone(),
            match_id: event.match_id.clone(),
            match_team_possession_id: event.match_team_possession_id.clone(),
            num_frames,
            window_frames: samples.len() as i64,
            ball_total_distance_tempo: distance,
            ball_time_in_poss_tempo: elapsed,
            ball_speed_tempo: speed,
        });
    }

    debug!(
        events = events.len(),
        ball_samples = track.sample_count(),
        window_rows = windows.len(),
        empty_windows,
        "merged possessions with tracking"
    );

    Ok(MergedPossessions { windows, tempo })
}

/// Euclidean ball travel between consecutive samples; a gap in either
/// sample's coordinates counts as no movement.
fn step_distance(from: &BallSample, to: &BallSample) -> f64 {
    match (from.x, from.y, to.x, to.y) {
        (Some(x0), Some(y0), Some(x1), Some(y1)) => ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt(),
        _ => 0.0,
    }
}

pub fn build_windows_dataframe(rows: &[WindowRow]) -> Result<DataFrame> {
    let n = rows.len();
    let mut individual_poss_id: Vec<&str> = Vec::with_capacity(n);
    let mut match_id: Vec<&str> = Vec::with_capacity(n);
    let mut match_team_possession_id: Vec<&str> = Vec::with_capacity(n);
    let mut player_id: Vec<&str> = Vec::with_capacity(n);
    let mut player_name: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut index: Vec<i64> = Vec::with_capacity(n);
    let mut frame_start: Vec<i64> = Vec::with_capacity(n);
    let mut frame_end: Vec<Option<i64>> = Vec::with_capacity(n);
    let mut frame_end_v2: Vec<i64> = Vec::with_capacity(n);
    let mut num_frames: Vec<i64> = Vec::with_capacity(n);
    let mut frame: Vec<i64> = Vec::with_capacity(n);
    let mut ball_x: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut ball_y: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut time: Vec<f64> = Vec::with_capacity(n);
    let mut step: Vec<f64> = Vec::with_capacity(n);
    let mut cumulative: Vec<f64> = Vec::with_capacity(n);

    for row in rows {
        individual_poss_id.push(&row.individual_poss_id);
        match_id.push(&row.match_id);
        match_team_possession_id.push(&row.match_team_possession_id);
        player_id.push(&row.player_id);
        player_name.push(row.player_name.as_deref());
        index.push(row.index);
        frame_start.push(row.frame_start);
        frame_end.push(row.frame_end);
        frame_end_v2.push(row.frame_end_v2);
        num_frames.push(row.num_frames);
        frame.push(row.frame);
        ball_x.push(row.ball_x);
        ball_y.push(row.ball_y);
        time.push(row.ball_time_in_poss_tempo);
        step.push(row.ball_dist_step);
        cumulative.push(row.ball_dist_cum);
    }

    let df = DataFrame::new(vec![
        Series::new("individual_poss_id", individual_poss_id),
        Series::new("match_id", match_id),
        Series::new("match_team_possession_id", match_team_possession_id),
        Series::new("player_id", player_id),
        Series::new("player_name", player_name),
        Series::new("index", index),
        Series::new("frame_start", frame_start),
        Series::new("frame_end", frame_end),
        Series::new("frame_end_v2", frame_end_v2),
        Series::new("num_frames", num_frames),
        Series::new("frame", frame),
        Series::new("ball_x", ball_x),
        Series::new("ball_y", ball_y),
        Series::new("ball_time_in_poss_tempo", time),
        Series::new("ball_dist_step", step),
        Series::new("ball_dist_cum", cumulative),
    ])?;
    Ok(df)
}

pub fn build_tempo_dataframe(rows: &[PossessionTempo]) -> Result<DataFrame> {
    let n = rows.len();
    let mut individual_poss_id: Vec<&str> = Vec::with_capacity(n);
    let mut event_id: Vec<&str> = Vec::with_capacity(n);
    let mut player_id: Vec<&str> = Vec::with_capacity(n);
    let mut match_id: Vec<&str> = Vec::with_capacity(n);
    let mut match_team_possession_id: Vec<&str> = Vec::with_capacity(n);
    let mut num_frames: Vec<Option<i64>> = Vec::with_capacity(n);
    let mut window_frames: Vec<i64> = Vec::with_capacity(n);
    let mut distance: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut time: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut speed: Vec<Option<f64>> = Vec::with_capacity(n);

    for row in rows {
        individual_poss_id.push(&row.individual_poss_id);
        event_id.push(&row.event_id);
        player_id.push(&row.player_id);
        match_id.push(&row.match_id);
        match_team_possession_id.push(&row.match_team_possession_id);
        num_frames.push(row.num_frames);
        window_frames.push(row.window_frames);
        distance.push(row.ball_total_distance_tempo);
        time.push(row.ball_time_in_poss_tempo);
        speed.push(row.ball_speed_tempo);
    }

    let df = DataFrame::new(vec![
        Series::new("individual_poss_id", individual_poss_id),
        Series::new("event_id", event_id),
        Series::new("player_id", player_id),
        Series::new("match_id", match_id),
        Series::new("match_team_possession_id", match_team_possession_id),
        Series::new("num_frames", num_frames),
        Series::new("window_frames", window_frames),
        Series::new("ball_total_distance_tempo", distance),
        Series::new("ball_time_in_poss_tempo", time),
        Series::new("ball_speed_tempo", speed),
    ])?;
    Ok(df)
}

pub fn write_tempo_csv(rows: &[PossessionTempo], out_file: &Path) -> Result<()> {
    if let Some(parent) = out_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = Writer::from_path(out_file)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
