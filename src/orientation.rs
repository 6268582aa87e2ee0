use crate::error::Result;
use crate::roster::{AttackDirection, PlayerMeta};
use crate::tracking::{TrackingRow, timestamp_seconds};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Stand-in for "nobody owns the ball" in `possession_player_id`.
pub const NO_POSSESSION_PLAYER: &str = "None";

const HOME_GROUP: &str = "home team";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PossessionFlag {
    InPossession,
    OutOfPossession,
}

impl PossessionFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InPossession => "IP",
            Self::OutOfPossession => "OOP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    First,
    Second,
}

impl Half {
    /// Anything that is not period 1 reads the second-half direction.
    pub fn from_period(period: Option<i64>) -> Self {
        if period == Some(1) {
            Self::First
        } else {
            Self::Second
        }
    }
}

/// Everything that decides whether a row's coordinates are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientationContext {
    pub flag: PossessionFlag,
    pub direction: Option<AttackDirection>,
}

impl OrientationContext {
    pub fn new(flag: PossessionFlag, half: Half, meta: &PlayerMeta) -> Self {
        let direction = match half {
            Half::First => meta.direction_1st_half,
            Half::Second => meta.direction_2nd_half,
        };
        Self { flag, direction }
    }

    /// The attacking team runs toward +x after mirroring, so its own
    /// right-to-left half is mirrored; defenders are mirrored in the halves
    /// where they attack left-to-right, which puts them facing -x.
    pub fn mirrors(&self) -> bool {
        match (self.flag, self.direction) {
            (PossessionFlag::InPossession, Some(AttackDirection::RightToLeft)) => true,
            (PossessionFlag::OutOfPossession, Some(AttackDirection::LeftToRight)) => true,
            (PossessionFlag::InPossession, Some(AttackDirection::LeftToRight)) => false,
            (PossessionFlag::OutOfPossession, Some(AttackDirection::RightToLeft)) => false,
            (_, None) => false,
        }
    }

    pub fn apply(&self, value: Option<f64>) -> Option<f64> {
        if self.mirrors() {
            value.map(|v| -v)
        } else {
            value
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrientedRow {
    pub tracking: TrackingRow,
    pub team_id: String,
    pub team_name: String,
    pub player_short_name: String,
    pub player_role_name: Option<String>,
    pub possession_player_id: String,
    pub possession_team_name: String,
    pub possession_flag: PossessionFlag,
    pub direction_player: Option<AttackDirection>,
    pub adj_x: Option<f64>,
    pub adj_y: Option<f64>,
    pub ball_adj_x: Option<f64>,
    pub ball_adj_y: Option<f64>,
}

/// Reprojects tracking rows so every possession reads left to right.
///
/// Rows without a possession group, and rows whose entity is not on the
/// match roster (the ball, officials), are dropped. Each remaining row is
/// mirrored at most once, player and ball coordinates together.
pub fn orient_frames(rows: &[TrackingRow], roster: &[PlayerMeta]) -> Vec<OrientedRow> {
    let lookup: HashMap<(&str, &str), &PlayerMeta> = roster
        .iter()
        .map(|p| ((p.match_id.as_str(), p.player_id.as_str()), p))
        .collect();

    let mut oriented = Vec::with_capacity(rows.len());
    let mut unassigned = 0usize;
    let mut off_roster = 0usize;
    for row in rows {
        let Some(group) = row.possession_group.as_deref() else {
            unassigned += 1;
            continue;
        };
        let Some(meta) = lookup.get(&(row.match_id.as_str(), row.player_id.as_str())) else {
            off_roster += 1;
            continue;
        };

        let possession_team_name = if group == HOME_GROUP {
            &meta.home_team_name
        } else {
            &meta.away_team_name
        };
        let flag = if *possession_team_name == meta.team_name {
            PossessionFlag::InPossession
        } else {
            PossessionFlag::OutOfPossession
        };
        let context = OrientationContext::new(flag, Half::from_period(row.period), meta);

        oriented.push(OrientedRow {
            tracking: row.clone(),
            team_id: meta.team_id.clone(),
            team_name: meta.team_name.clone(),
            player_short_name: meta.player_short_name.clone(),
            player_role_name: meta.role_name.clone(),
            possession_player_id: row
                .possession_player_id
                .clone()
                .unwrap_or_else(|| NO_POSSESSION_PLAYER.to_string()),
            possession_team_name: possession_team_name.clone(),
            possession_flag: flag,
            direction_player: context.direction,
            adj_x: context.apply(row.x),
            adj_y: context.apply(row.y),
            ball_adj_x: context.apply(row.ball_x),
            ball_adj_y: context.apply(row.ball_y),
        });
    }

    debug!(
        kept = oriented.len(),
        unassigned, off_roster, "oriented tracking rows"
    );
    oriented
}

pub fn build_frames_dataframe(rows: &[OrientedRow]) -> Result<DataFrame> {
    let n = rows.len();
    let mut adj_x: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut adj_y: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut ball_adj_x: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut ball_adj_y: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut match_id: Vec<&str> = Vec::with_capacity(n);
    let mut frame: Vec<i64> = Vec::with_capacity(n);
    let mut timestamp: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut seconds: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut period: Vec<Option<i64>> = Vec::with_capacity(n);
    let mut player_id: Vec<&str> = Vec::with_capacity(n);
    let mut x: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut y: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut possession_player_id: Vec<&str> = Vec::with_capacity(n);
    let mut possession_group: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut ball_x: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut ball_y: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut ball_z: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut is_detected: Vec<Option<bool>> = Vec::with_capacity(n);
    let mut is_detected_ball: Vec<Option<bool>> = Vec::with_capacity(n);
    let mut team_id: Vec<&str> = Vec::with_capacity(n);
    let mut team_name: Vec<&str> = Vec::with_capacity(n);
    let mut player_short_name: Vec<&str> = Vec::with_capacity(n);
    let mut player_role_name: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut possession_team_name: Vec<&str> = Vec::with_capacity(n);
    let mut possession_flag: Vec<&str> = Vec::with_capacity(n);
    let mut direction_player: Vec<Option<&str>> = Vec::with_capacity(n);

    for row in rows {
        let t = &row.tracking;
        adj_x.push(row.adj_x);
        adj_y.push(row.adj_y);
        ball_adj_x.push(row.ball_adj_x);
        ball_adj_y.push(row.ball_adj_y);
        match_id.push(&t.match_id);
        frame.push(t.frame);
        timestamp.push(t.timestamp.as_deref());
        seconds.push(t.timestamp.as_deref().and_then(timestamp_seconds));
        period.push(t.period);
        player_id.push(&t.player_id);
        x.push(t.x);
        y.push(t.y);
        possession_player_id.push(&row.possession_player_id);
        possession_group.push(t.possession_group.as_deref());
        ball_x.push(t.ball_x);
        ball_y.push(t.ball_y);
        ball_z.push(t.ball_z);
        is_detected.push(t.is_detected);
        is_detected_ball.push(t.is_detected_ball);
        team_id.push(&row.team_id);
        team_name.push(&row.team_name);
        player_short_name.push(&row.player_short_name);
        player_role_name.push(row.player_role_name.as_deref());
        possession_team_name.push(&row.possession_team_name);
        possession_flag.push(row.possession_flag.as_str());
        direction_player.push(row.direction_player.map(AttackDirection::as_str));
    }

    let df = DataFrame::new(vec![
        Series::new("adj_x", adj_x),
        Series::new("adj_y", adj_y),
        Series::new("ball_adj_x", ball_adj_x),
        Series::new("ball_adj_y", ball_adj_y),
        Series::new("match_id", match_id),
        Series::new("frame", frame),
        Series::new("timestamp", timestamp),
        Series::new("timestamp_seconds", seconds),
        Series::new("period", period),
        Series::new("player_id", player_id),
        Series::new("x", x),
        Series::new("y", y),
        Series::new("possession_player_id", possession_player_id),
        Series::new("possession_group", possession_group),
        Series::new("ball_x", ball_x),
        Series::new("ball_y", ball_y),
        Series::new("ball_z", ball_z),
        Series::new("is_detected", is_detected),
        Series::new("is_detected_ball", is_detected_ball),
        Series::new("team_id", team_id),
        Series::new("team_name", team_name),
        Series::new("player_short_name", player_short_name),
        Series::new("player_role_name", player_role_name),
        Series::new("possession_team_name", possession_team_name),
        Series::new("possession_flag", possession_flag),
        Series::new("direction_player", direction_player),
    ])?;
    Ok(df)
}
