use crate::error::Result;
use chrono::{NaiveTime, Timelike};
use polars::prelude::*;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// One line of the extrapolated tracking feed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    pub frame: i64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub period: Option<i64>,
    #[serde(default)]
    pub player_data: Option<Vec<RawEntity>>,
    #[serde(default)]
    pub possession: Option<RawPossession>,
    #[serde(default)]
    pub ball_data: Option<RawBall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEntity {
    #[serde(default, deserialize_with = "opaque_id")]
    pub player_id: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub is_detected: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPossession {
    #[serde(default, deserialize_with = "opaque_id")]
    pub player_id: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBall {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
    #[serde(default)]
    pub is_detected: Option<bool>,
}

/// Ids arrive as integers, floats or strings depending on the feed.
fn opaque_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}

pub fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(|v| v.to_string())
            .or_else(|| n.as_f64().map(|v| format!("{}", v.trunc() as i64))),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// One entity in one frame, with the frame's possession owner and ball state.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingRow {
    pub match_id: String,
    pub frame: i64,
    pub timestamp: Option<String>,
    pub period: Option<i64>,
    pub player_id: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub is_detected: Option<bool>,
    pub possession_player_id: Option<String>,
    pub possession_group: Option<String>,
    pub ball_x: Option<f64>,
    pub ball_y: Option<f64>,
    pub ball_z: Option<f64>,
    pub is_detected_ball: Option<bool>,
}

/// Flattens nested frames to one row per (frame, entity).
///
/// Frame-level fields and the ball state are copied onto every entity row of
/// the frame. Frames without entities contribute no rows; entities without an
/// id are skipped.
pub fn flatten_frames(match_id: &str, frames: &[RawFrame]) -> Vec<TrackingRow> {
    let mut rows = Vec::new();
    let mut anonymous = 0usize;
    for frame in frames {
        let Some(entities) = frame.player_data.as_ref() else {
            continue;
        };

        let (possession_player_id, possession_group) = match &frame.possession {
            Some(p) => (p.player_id.clone(), p.group.clone()),
            None => (None, None),
        };
        let ball = frame.ball_data.clone().unwrap_or_default();

        for entity in entities {
            let Some(player_id) = entity.player_id.clone() else {
                anonymous += 1;
                continue;
            };

            rows.push(TrackingRow {
                match_id: match_id.to_string(),
                frame: frame.frame,
                timestamp: frame.timestamp.clone(),
                period: frame.period,
                player_id,
                x: entity.x,
                y: entity.y,
                is_detected: entity.is_detected,
                possession_player_id: possession_player_id.clone(),
                possession_group: possession_group.clone(),
                ball_x: ball.x,
                ball_y: ball.y,
                ball_z: ball.z,
                is_detected_ball: ball.is_detected,
            });
        }
    }
    debug!(match_id, kept = rows.len(), anonymous, "flattened tracking frames");
    rows
}

pub fn parse_frames(lines: &str) -> Result<Vec<RawFrame>> {
    let mut frames = Vec::new();
    for line in lines.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        frames.push(serde_json::from_str(trimmed)?);
    }
    Ok(frames)
}

/// `HH:MM:SS.ff` match clock to seconds.
pub fn timestamp_seconds(timestamp: &str) -> Option<f64> {
    let time = NaiveTime::parse_from_str(timestamp.trim(), "%H:%M:%S%.f").ok()?;
    Some(time.num_seconds_from_midnight() as f64 + f64::from(time.nanosecond()) / 1e9)
}

pub fn build_tracking_dataframe(rows: &[TrackingRow]) -> Result<DataFrame> {
    let mut match_id: Vec<&str> = Vec::with_capacity(rows.len());
    let mut frame: Vec<i64> = Vec::with_capacity(rows.len());
    let mut timestamp: Vec<Option<&str>> = Vec::with_capacity(rows.len());
    let mut seconds: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut period: Vec<Option<i64>> = Vec::with_capacity(rows.len());
    let mut player_id: Vec<&str> = Vec::with_capacity(rows.len());
    let mut x: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut y: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut is_detected: Vec<Option<bool>> = Vec::with_capacity(rows.len());
    let mut possession_player_id: Vec<Option<&str>> = Vec::with_capacity(rows.len());
    let mut possession_group: Vec<Option<&str>> = Vec::with_capacity(rows.len());
    let mut ball_x: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut ball_y: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut ball_z: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    let mut is_detected_ball: Vec<Option<bool>> = Vec::with_capacity(rows.len());

    for row in rows {
        match_id.push(&row.match_id);
        frame.push(row.frame);
        timestamp.push(row.timestamp.as_deref());
        seconds.push(row.timestamp.as_deref().and_then(timestamp_seconds));
        period.push(row.period);
        player_id.push(&row.player_id);
        x.push(row.x);
        y.push(row.y);
        is_detected.push(row.is_detected);
        possession_player_id.push(row.possession_player_id.as_deref());
        possession_group.push(row.possession_group.as_deref());
        ball_x.push(row.ball_x);
        ball_y.push(row.ball_y);
        ball_z.push(row.ball_z);
        is_detected_ball.push(row.is_detected_ball);
    }

    let df = DataFrame::new(vec![
        Series::new("match_id", match_id),
        Series::new("frame", frame),
        Series::new("timestamp", timestamp),
        Series::new("timestamp_seconds", seconds),
        Series::new("period", period),
        Series::new("player_id", player_id),
        Series::new("x", x),
        Series::new("y", y),
        Series::new("is_detected", is_detected),
        Series::new("possession_player_id", possession_player_id),
        Series::new("possession_group", possession_group),
        Series::new("ball_x", ball_x),
        Series::new("ball_y", ball_y),
        Series::new("ball_z", ball_z),
        Series::new("is_detected_ball", is_detected_ball),
    ])?;
    Ok(df)
}
