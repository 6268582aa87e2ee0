use crate::error::Result;
use crate::tracking::id_from_value;
use polars::prelude::*;
use serde_json::Value;

/// Regulation time credited to a player with no recorded end time.
const FULL_MATCH_SECONDS: i64 = 90 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttackDirection {
    LeftToRight,
    RightToLeft,
}

impl AttackDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "left_to_right" => Some(Self::LeftToRight),
            "right_to_left" => Some(Self::RightToLeft),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LeftToRight => "left_to_right",
            Self::RightToLeft => "right_to_left",
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::LeftToRight => Self::RightToLeft,
            Self::RightToLeft => Self::LeftToRight,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMeta {
    pub match_id: String,
    pub match_name: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub player_id: String,
    pub player_short_name: String,
    pub player_number: Option<i64>,
    pub team_id: String,
    pub team_name: String,
    pub is_home: bool,
    pub position_group: Option<String>,
    pub role_name: Option<String>,
    pub role_acronym: Option<String>,
    pub direction_1st_half: Option<AttackDirection>,
    pub direction_2nd_half: Option<AttackDirection>,
    pub time_played_seconds: Option<i64>,
}

/// `HH:MM:SS` match clock to whole seconds; a missing clock means full time.
pub fn clock_seconds(raw: Option<&str>) -> Option<i64> {
    let Some(raw) = raw else {
        return Some(FULL_MATCH_SECONDS);
    };
    let mut parts = raw.trim().split(':').map(|p| p.parse::<i64>().ok());
    let (Some(Some(h)), Some(Some(m)), Some(Some(s)), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    Some(h * 3600 + m * 60 + s)
}

/// Players who took part in the match, with their team context and the
/// direction their team attacks in each half.
pub fn parse_match_roster(match_id: &str, match_json: &Value) -> Vec<PlayerMeta> {
    let home_team = match_json.get("home_team");
    let away_team = match_json.get("away_team");
    let home_team_id = home_team.and_then(|t| t.get("id")).and_then(id_from_value);
    let home_team_name = team_name(home_team);
    let away_team_name = team_name(away_team);
    let match_name = format!("{} vs {}", home_team_name, away_team_name);

    // Home side per half, e.g. ["left_to_right", "right_to_left"].
    let sides: Vec<Option<AttackDirection>> = match_json
        .get("home_team_side")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .map(|v| v.as_str().and_then(AttackDirection::parse))
                .collect()
        })
        .unwrap_or_default();
    let home_1st = sides.first().copied().flatten();
    // Teams switch ends at half-time when only the opening side is recorded.
    let home_2nd = sides
        .get(1)
        .copied()
        .flatten()
        .or(home_1st.map(AttackDirection::reversed));

    let Some(players) = match_json.get("players").and_then(|p| p.as_array()) else {
        return Vec::new();
    };

    let mut roster = Vec::new();
    for player in players {
        let start_time = player.get("start_time").and_then(|v| v.as_str());
        let end_time = player.get("end_time").and_then(|v| v.as_str());
        if start_time.is_none() && end_time.is_none() {
            continue;
        }

        let Some(player_id) = player.get("id").and_then(id_from_value) else {
            continue;
        };
        let team_id = player
            .get("team_id")
            .and_then(id_from_value)
            .unwrap_or_default();
        let is_home = home_team_id.as_deref() == Some(team_id.as_str());

        let (direction_1st_half, direction_2nd_half) = if is_home {
            (home_1st, home_2nd)
        } else {
            (home_2nd, home_1st)
        };

        let role = player.get("player_role");
        let role_field = |key: &str| {
            role.and_then(|r| r.get(key))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };

        let time_played_seconds = match (clock_seconds(start_time), clock_seconds(end_time)) {
            (Some(start), Some(end)) if start_time.is_some() => Some(end - start),
            _ => None,
        };

        roster.push(PlayerMeta {
            match_id: match_id.to_string(),
            match_name: match_name.clone(),
            home_team_name: home_team_name.clone(),
            away_team_name: away_team_name.clone(),
            player_id,
            player_short_name: player
                .get("short_name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            player_number: player.get("number").and_then(|v| v.as_i64()),
            team_id,
            team_name: if is_home {
                home_team_name.clone()
            } else {
                away_team_name.clone()
            },
            is_home,
            position_group: role_field("position_group"),
            role_name: role_field("name"),
            role_acronym: role_field("acronym"),
            direction_1st_half,
            direction_2nd_half,
            time_played_seconds,
        });
    }

    roster
}

fn team_name(team: Option<&Value>) -> String {
    team.and_then(|t| t.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

pub fn build_roster_dataframe(roster: &[PlayerMeta]) -> Result<DataFrame> {
    let mut match_name: Vec<&str> = Vec::with_capacity(roster.len());
    let mut match_id: Vec<&str> = Vec::with_capacity(roster.len());
    let mut home_team_name: Vec<&str> = Vec::with_capacity(roster.len());
    let mut away_team_name: Vec<&str> = Vec::with_capacity(roster.len());
    let mut player_id: Vec<&str> = Vec::with_capacity(roster.len());
    let mut player_short_name: Vec<&str> = Vec::with_capacity(roster.len());
    let mut player_number: Vec<Option<i64>> = Vec::with_capacity(roster.len());
    let mut team_id: Vec<&str> = Vec::with_capacity(roster.len());
    let mut team_name: Vec<&str> = Vec::with_capacity(roster.len());
    let mut home_away_player: Vec<&str> = Vec::with_capacity(roster.len());
    let mut position_group: Vec<Option<&str>> = Vec::with_capacity(roster.len());
    let mut role_name: Vec<Option<&str>> = Vec::with_capacity(roster.len());
    let mut role_acronym: Vec<Option<&str>> = Vec::with_capacity(roster.len());
    let mut direction_1st: Vec<Option<&str>> = Vec::with_capacity(roster.len());
    let mut direction_2nd: Vec<Option<&str>> = Vec::with_capacity(roster.len());
    let mut time_played: Vec<Option<i64>> = Vec::with_capacity(roster.len());

    for player in roster {
        match_name.push(&player.match_name);
        match_id.push(&player.match_id);
        home_team_name.push(&player.home_team_name);
        away_team_name.push(&player.away_team_name);
        player_id.push(&player.player_id);
        player_short_name.push(&player.player_short_name);
        player_number.push(player.player_number);
        team_id.push(&player.team_id);
        team_name.push(&player.team_name);
        home_away_player.push(if player.is_home { "Home" } else { "Away" });
        position_group.push(player.position_group.as_deref());
        role_name.push(player.role_name.as_deref());
        role_acronym.push(player.role_acronym.as_deref());
        direction_1st.push(player.direction_1st_half.map(AttackDirection::as_str));
        direction_2nd.push(player.direction_2nd_half.map(AttackDirection::as_str));
        time_played.push(player.time_played_seconds);
    }

    let df = DataFrame::new(vec![
        Series::new("match_name", match_name),
        Series::new("match_id", match_id),
        Series::new("home_team_name", home_team_name),
        Series::new("away_team_name", away_team_name),
        Series::new("player_id", player_id),
        Series::new("player_short_name", player_short_name),
        Series::new("player_number", player_number),
        Series::new("team_id", team_id),
        Series::new("team_name", team_name),
        Series::new("home_away_player", home_away_player),
        Series::new("player_role_position_group", position_group),
        Series::new("player_role_name", role_name),
        Series::new("player_role_acronym", role_acronym),
        Series::new("direction_player_1st_half", direction_1st),
        Series::new("direction_player_2nd_half", direction_2nd),
        Series::new("time_played_seconds", time_played),
    ])?;
    Ok(df)
}
