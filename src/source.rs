use crate::tracking::{RawFrame, parse_frames};
use anyhow::{Context, Result};
use polars::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Raw inputs for one match as read from disk.
#[derive(Debug, Clone)]
pub struct MatchFiles {
    pub match_id: String,
    pub events: DataFrame,
    pub frames: Vec<RawFrame>,
    pub descriptor: Value,
}

fn match_file(data_dir: &Path, match_id: &str, suffix: &str) -> PathBuf {
    data_dir
        .join(match_id)
        .join(format!("{match_id}_{suffix}"))
}

pub fn read_events(data_dir: &Path, match_id: &str) -> Result<DataFrame> {
    let path = match_file(data_dir, match_id, "dynamic_events.csv");
    let df = CsvReader::from_path(&path)
        .and_then(|reader| reader.has_header(true).finish())
        .with_context(|| format!("reading events {}", path.display()))?;
    Ok(df)
}

pub fn read_tracking(data_dir: &Path, match_id: &str) -> Result<Vec<RawFrame>> {
    let path = match_file(data_dir, match_id, "tracking_extrapolated.jsonl");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let frames =
        parse_frames(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(frames)
}

pub fn read_descriptor(data_dir: &Path, match_id: &str) -> Result<Value> {
    let path = match_file(data_dir, match_id, "match.json");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

pub fn load_match(data_dir: &Path, match_id: &str) -> Result<MatchFiles> {
    let events = read_events(data_dir, match_id)?;
    let frames = read_tracking(data_dir, match_id)?;
    let descriptor = read_descriptor(data_dir, match_id)?;
    info!(
        match_id,
        events = events.height(),
        frames = frames.len(),
        "loaded match"
    );
    Ok(MatchFiles {
        match_id: match_id.to_string(),
        events,
        frames,
        descriptor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("possession-tempo-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("42")).unwrap();
        dir
    }

    #[test]
    fn reads_the_match_layout() {
        let dir = scratch_dir("layout");
        fs::write(
            dir.join("42/42_dynamic_events.csv"),
            "match_id,index,event_id,event_type\n42,0,1_0,player_possession\n",
        )
        .unwrap();
        fs::write(
            dir.join("42/42_tracking_extrapolated.jsonl"),
            "{\"frame\": 1, \"player_data\": []}\n\n{\"frame\": 2}\n",
        )
        .unwrap();
        fs::write(dir.join("42/42_match.json"), "{\"players\": []}").unwrap();

        let files = load_match(&dir, "42").unwrap();
        assert_eq!(files.match_id, "42");
        assert_eq!(files.events.height(), 1);
        assert_eq!(files.frames.len(), 2);
        assert!(files.descriptor.get("players").is_some());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = scratch_dir("missing");
        let err = read_descriptor(&dir, "42").unwrap_err();
        assert!(format!("{err:#}").contains("42_match.json"));
        fs::remove_dir_all(&dir).unwrap();
    }
}
