use crate::config::EventSelection;
use crate::error::{PipelineError, Result};
use crate::table::{id_values, require_columns};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::debug;

const ID_COLUMNS: [&str; 5] = ["match_id", "event_id", "player_id", "team_id", "pp_event_id"];

/// Projects one event subtype onto its fixed column set, preserving row order.
///
/// Identifier columns come out as strings regardless of how the source typed
/// them, so later joins never compare a numeric id with a textual one.
pub fn select_events(raw: &DataFrame, selection: &EventSelection) -> Result<DataFrame> {
    require_columns(raw, &selection.table, &["event_type"])?;
    require_columns(raw, &selection.table, &selection.columns)?;

    let projection: Vec<Expr> = selection.columns.iter().map(|c| col(c)).collect();
    let mut selected = raw
        .clone()
        .lazy()
        .filter(col("event_type").eq(lit(selection.event_type.as_str())))
        .select(projection)
        .collect()?;

    for (from, to) in &selection.renames {
        selected.rename(from, to)?;
    }

    for name in ID_COLUMNS {
        if selected.get_column_names().contains(&name) {
            let ids = id_values(&selected, &selection.table, name)?;
            selected.with_column(Series::new(name, ids))?;
        }
    }

    debug!(
        table = %selection.table,
        rows = selected.height(),
        "selected events"
    );
    Ok(selected)
}

/// Fails unless every table carries exactly the first table's column set.
pub fn check_column_sets<'a, I>(tables: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a DataFrame)>,
{
    let mut iter = tables.into_iter();
    let Some((_, first)) = iter.next() else {
        return Ok(());
    };
    let columns = first.get_column_names();
    for (match_id, table) in iter {
        let found = table.width();
        let present = table.get_column_names();
        if found != columns.len() || !columns.iter().all(|c| present.contains(c)) {
            return Err(PipelineError::ColumnMismatch {
                match_id: match_id.to_string(),
                expected: columns.len(),
                found,
            });
        }
    }
    Ok(())
}

/// Stacks per-match event tables into one batch.
///
/// Every match must carry the same column set as the first one, and each
/// non-empty table must contribute exactly one distinct match to the batch.
/// A match with no rows of a subtype is not an error.
pub fn concat_match_events(tables: Vec<(String, DataFrame)>) -> Result<DataFrame> {
    let expected = tables.iter().filter(|(_, t)| t.height() > 0).count();
    check_column_sets(tables.iter().map(|(id, t)| (id.as_str(), t)))?;
    let mut iter = tables.into_iter();
    let Some((_, mut batch)) = iter.next() else {
        return Err(PipelineError::MatchCountMismatch { expected: 1, found: 0 });
    };

    let columns: Vec<String> = batch
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect();

    for (_, table) in iter {
        // The CSV reader infers types per file; follow the first match's.
        let mut aligned = table.select(&columns)?;
        for name in &columns {
            let target = batch.column(name)?.dtype().clone();
            if aligned.column(name)?.dtype() != &target {
                let cast = aligned.column(name)?.cast(&target)?;
                aligned.with_column(cast)?;
            }
        }
        batch.vstack_mut(&aligned)?;
    }

    require_columns(&batch, "events", &["match_id"])?;
    let found = id_values(&batch, "events", "match_id")?
        .into_iter()
        .flatten()
        .collect::<HashSet<_>>()
        .len();
    if found != expected {
        return Err(PipelineError::MatchCountMismatch { expected, found });
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_events() -> DataFrame {
        df!(
            "match_id" => &[10i64, 10, 10, 10],
            "event_id" => &["1_0", "1_1", "1_2", "1_3"],
            "event_type" => &["player_possession", "passing_option", "player_possession", "on_ball_engagement"],
            "player_id" => &[7i64, 8, 9, 11],
            "associated_player_possession_event_id" => &[None, Some("1_0"), None, Some("1_2")],
            "x_start" => &[1.0, 2.0, 3.0, 4.0]
        )
        .unwrap()
    }

    #[test]
    fn filters_subtype_and_keeps_order() {
        let selection = EventSelection::new(
            "player_possession",
            "player_possession",
            &["match_id", "event_id", "player_id", "x_start"],
        );
        let out = select_events(&raw_events(), &selection).unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(out.width(), 4);
        let events = id_values(&out, "t", "event_id").unwrap();
        assert_eq!(events, vec![Some("1_0".to_string()), Some("1_2".to_string())]);
        assert_eq!(out.column("match_id").unwrap().dtype(), &DataType::String);
        assert_eq!(out.column("player_id").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn renames_association_column() {
        let selection = EventSelection::new(
            "passing_option",
            "passing_option",
            &["match_id", "player_id", "associated_player_possession_event_id"],
        )
        .rename("associated_player_possession_event_id", "pp_event_id");
        let out = select_events(&raw_events(), &selection).unwrap();
        assert_eq!(out.height(), 1);
        let ids = id_values(&out, "t", "pp_event_id").unwrap();
        assert_eq!(ids, vec![Some("1_0".to_string())]);
    }

    #[test]
    fn absent_field_fails_the_batch() {
        let selection = EventSelection::new(
            "player_possession",
            "player_possession",
            &["match_id", "frame_start"],
        );
        let err = select_events(&raw_events(), &selection).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { ref column, .. } if column == "frame_start"));
    }

    #[test]
    fn concat_rejects_column_mismatch() {
        let a = df!("match_id" => &[1i64], "x" => &[0.0]).unwrap();
        let b = df!("match_id" => &[2i64]).unwrap();
        let err = concat_match_events(vec![("1".into(), a), ("2".into(), b)]).unwrap_err();
        assert!(matches!(err, PipelineError::ColumnMismatch { expected: 2, found: 1, .. }));
    }

    #[test]
    fn concat_aligns_column_order() {
        let a = df!("match_id" => &[1i64], "x" => &[0.5]).unwrap();
        let b = df!("x" => &[1.5], "match_id" => &[2i64]).unwrap();
        let out = concat_match_events(vec![("1".into(), a), ("2".into(), b)]).unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(out.get_column_names(), vec!["match_id", "x"]);
    }

    #[test]
    fn concat_checks_match_count() {
        let a = df!("match_id" => &[1i64]).unwrap();
        let b = df!("match_id" => &[1i64]).unwrap();
        let err = concat_match_events(vec![("1".into(), a), ("2".into(), b)]).unwrap_err();
        assert!(matches!(err, PipelineError::MatchCountMismatch { expected: 2, found: 1 }));
    }

    #[test]
    fn match_without_subtype_rows_is_allowed() {
        let a = df!("match_id" => &["1"], "x" => &[0.5]).unwrap();
        let b = a.clear();
        let out = concat_match_events(vec![("1".into(), a), ("2".into(), b)]).unwrap();
        assert_eq!(out.height(), 1);
    }
}
