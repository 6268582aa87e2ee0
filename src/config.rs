use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;

/// Open-data matches the pipeline was built against.
pub const DEFAULT_MATCH_IDS: [&str; 10] = [
    "1886347", "1899585", "1925299", "1953632", "1996435", "2006229", "2011166", "2013725",
    "2015213", "2017461",
];

/// Sample interval of 10Hz tracking capture.
pub const DEFAULT_FRAME_DURATION_SECONDS: f64 = 0.1;

#[derive(Args, Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding `<match_id>/<match_id>_*` event, tracking and match files
    #[arg(long, env = "POSSESSION_DATA_DIR", default_value = "data/matches")]
    pub data_dir: PathBuf,

    /// Comma separated match ids to process as one batch
    #[arg(
        long,
        env = "POSSESSION_MATCH_IDS",
        value_delimiter = ',',
        default_values_t = DEFAULT_MATCH_IDS.iter().map(|id| id.to_string()).collect::<Vec<_>>()
    )]
    pub match_ids: Vec<String>,

    /// Output directory for parquet/csv tables
    #[arg(long, env = "POSSESSION_OUT_DIR", default_value = "out")]
    pub out_dir: PathBuf,

    /// Use the raw event end frame instead of the pass reception frame
    #[arg(long, env = "POSSESSION_RAW_END_FRAME", default_value = "false")]
    pub raw_end_frame: bool,

    /// Seconds per tracking frame
    #[arg(long, env = "POSSESSION_FRAME_DURATION", default_value_t = DEFAULT_FRAME_DURATION_SECONDS)]
    pub frame_duration: f64,

    /// Minimum player possessions in a team possession kept for modeling
    #[arg(long, env = "POSSESSION_MIN_TEAM_SEQUENCES", default_value = "3")]
    pub min_team_sequences: u32,

    /// Minimum modeled possessions per player kept for modeling
    #[arg(long, env = "POSSESSION_MIN_PLAYER_POSSESSIONS", default_value = "31")]
    pub min_player_possessions: u32,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.match_ids.is_empty() {
            bail!("at least one match id is required");
        }
        if self.match_ids.iter().any(|id| id.trim().is_empty()) {
            bail!("match ids must not be blank");
        }
        if !(self.frame_duration > 0.0) {
            bail!("frame duration must be positive, got {}", self.frame_duration);
        }
        Ok(())
    }

    pub fn merge_settings(&self) -> MergeSettings {
        MergeSettings {
            include_pass: !self.raw_end_frame,
            frame_duration_seconds: self.frame_duration,
        }
    }

    pub fn model_filter(&self) -> ModelFilter {
        ModelFilter {
            min_team_sequences: self.min_team_sequences,
            min_player_possessions: self.min_player_possessions,
        }
    }
}

/// Which end frame bounds a possession window and how long a frame lasts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeSettings {
    pub include_pass: bool,
    pub frame_duration_seconds: f64,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            include_pass: true,
            frame_duration_seconds: DEFAULT_FRAME_DURATION_SECONDS,
        }
    }
}

impl MergeSettings {
    pub fn end_frame_column(&self) -> &'static str {
        if self.include_pass {
            "frame_end_v2"
        } else {
            "frame_end"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFilter {
    pub min_team_sequences: u32,
    pub min_player_possessions: u32,
}

impl Default for ModelFilter {
    fn default() -> Self {
        Self {
            min_team_sequences: 3,
            min_player_possessions: 31,
        }
    }
}

/// One event subtype projected onto a fixed column set.
#[derive(Debug, Clone)]
pub struct EventSelection {
    pub table: String,
    pub event_type: String,
    pub columns: Vec<String>,
    pub renames: Vec<(String, String)>,
}

impl EventSelection {
    pub fn new(table: &str, event_type: &str, columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            event_type: event_type.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            renames: Vec::new(),
        }
    }

    pub fn rename(mut self, from: &str, to: &str) -> Self {
        self.renames.push((from.to_string(), to.to_string()));
        self
    }

    pub fn player_possessions() -> Self {
        Self::new(
            "player_possession",
            "player_possession",
            &[
                "match_id",
                "index",
                "event_id",
                "event_type",
                "x_start",
                "y_start",
                "x_end",
                "y_end",
                "frame_start",
                "frame_end",
                "duration",
                "player_id",
                "player_name",
                "team_id",
                "team_shortname",
                "targeted_passing_option_event_id",
                "player_targeted_name",
                "start_type",
                "end_type",
                "pass_outcome",
                "pass_distance",
                "separation_start",
                "separation_end",
                "distance_covered",
                "n_passing_options",
                "n_off_ball_runs",
                "team_score",
                "opponent_team_score",
                "game_state",
                "speed_avg",
                "speed_avg_band",
                "team_in_possession_phase_type",
                "team_out_of_possession_phase_type",
                "third_start",
                "first_player_possession_in_team_possession",
                "last_player_possession_in_team_possession",
            ],
        )
    }

    pub fn passing_options() -> Self {
        Self::new(
            "passing_option",
            "passing_option",
            &[
                "match_id",
                "player_id",
                "player_name",
                "associated_player_possession_event_id",
                "interplayer_distance",
                "interplayer_angle",
                "passing_option_score",
                "separation_start",
                "separation_end",
                "separation_gain",
            ],
        )
        .rename("associated_player_possession_event_id", "pp_event_id")
    }

    pub fn on_ball_engagements() -> Self {
        Self::new(
            "on_ball_engagement",
            "on_ball_engagement",
            &[
                "match_id",
                "event_subtype",
                "player_id",
                "player_name",
                "associated_player_possession_event_id",
                "speed_avg",
                "speed_avg_band",
                "distance_covered",
                "pressing_chain",
                "pressing_chain_end_type",
                "pressing_chain_length",
                "simultaneous_defensive_engagement_same_target",
            ],
        )
        .rename("associated_player_possession_event_id", "pp_event_id")
    }
}

/// Player-possession columns carried into the modeling table.
pub const MODEL_CONTEXT_COLUMNS: [&str; 15] = [
    "individual_poss_id",
    "duration",
    "start_type",
    "end_type",
    "pass_outcome",
    "pass_distance",
    "separation_start",
    "separation_end",
    "n_passing_options",
    "n_off_ball_runs",
    "game_state",
    "team_in_possession_phase_type",
    "third_start",
    "first_player_possession_in_team_possession",
    "last_player_possession_in_team_possession",
];
