use crate::error::{PipelineError, Result};
use crate::table::{id_values, require_columns};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Min,
    Mean,
    Max,
}

impl Stat {
    fn label(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Mean => "mean",
            Self::Max => "max",
        }
    }

    fn apply(self, expr: Expr) -> Expr {
        match self {
            Self::Min => expr.min(),
            Self::Mean => expr.mean(),
            Self::Max => expr.max(),
        }
    }
}

/// A summary statistic of one source column, named `<source>_<stat>` unless
/// renamed.
#[derive(Debug, Clone)]
pub struct StatSpec {
    pub source: String,
    pub stat: Stat,
    pub alias: String,
}

impl StatSpec {
    pub fn new(source: &str, stat: Stat) -> Self {
        Self {
            source: source.to_string(),
            stat,
            alias: format!("{}_{}", source, stat.label()),
        }
    }

    pub fn renamed(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }
}

/// Summarises the opponents/options attached to each player possession.
///
/// Rows are grouped by `(match_id, pp_event_id)`; optionally only rows whose
/// `event_subtype` is in `subtypes` are considered. Rows not attached to any
/// player possession are ignored, but an attachment to an event that is not
/// in the possession table rejects the batch.
#[derive(Debug, Clone)]
pub struct ContextAggregator {
    pub name: String,
    pub subtypes: Option<Vec<String>>,
    pub distinct_alias: String,
    pub stats: Vec<StatSpec>,
}

impl ContextAggregator {
    pub fn passing_options() -> Self {
        Self {
            name: "passing_options".to_string(),
            subtypes: None,
            distinct_alias: "po_options_custom".to_string(),
            stats: vec![
                StatSpec::new("interplayer_distance", Stat::Min),
                StatSpec::new("interplayer_distance", Stat::Mean),
                StatSpec::new("passing_option_score", Stat::Max),
                StatSpec::new("passing_option_score", Stat::Mean),
            ],
        }
    }

    /// On-ball engagements of the given subtypes, with columns named after
    /// `label` (`num_opp_<label>_players`, `opp_<label>_dist_covered_mean`, ...).
    pub fn engagements(name: &str, label: &str, subtypes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            subtypes: Some(subtypes.iter().map(|s| s.to_string()).collect()),
            distinct_alias: format!("num_opp_{label}_players"),
            stats: vec![
                StatSpec::new("distance_covered", Stat::Mean)
                    .renamed(&format!("opp_{label}_dist_covered_mean")),
                StatSpec::new("distance_covered", Stat::Min)
                    .renamed(&format!("opp_{label}_dist_covered_min")),
                StatSpec::new("speed_avg", Stat::Mean)
                    .renamed(&format!("opp_{label}_speed_avg_mean")),
                StatSpec::new("speed_avg", Stat::Max)
                    .renamed(&format!("opp_{label}_speed_avg_max")),
            ],
        }
    }

    pub fn pressing() -> Self {
        Self::engagements(
            "pressing",
            "press",
            &["pressing", "counter_press", "recovery_press"],
        )
    }

    pub fn pressure() -> Self {
        Self::engagements("pressure", "pressure", &["pressure"])
    }

    pub fn other_engagements() -> Self {
        Self::engagements("other_engagements", "other_obe", &["other"])
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::passing_options(),
            Self::pressing(),
            Self::pressure(),
            Self::other_engagements(),
        ]
    }

    /// `context` is the projected event subtype table (see
    /// [`crate::config::EventSelection`]); `possessions` is the player
    /// possession table it refers to.
    pub fn aggregate(&self, context: &DataFrame, possessions: &DataFrame) -> Result<DataFrame> {
        let mut required = vec!["match_id", "pp_event_id", "player_id"];
        if self.subtypes.is_some() {
            required.push("event_subtype");
        }
        required.extend(self.stats.iter().map(|s| s.source.as_str()));
        require_columns(context, &self.name, &required)?;

        self.check_references(context, possessions)?;

        let mut lf = context
            .clone()
            .lazy()
            .filter(col("pp_event_id").is_not_null());
        if let Some(subtypes) = &self.subtypes {
            let allowed = Series::new("subtype_filter", subtypes.clone());
            lf = lf.filter(col("event_subtype").is_in(lit(allowed)));
        }

        let mut aggs: Vec<Expr> = vec![
            col("player_id")
                .n_unique()
                .cast(DataType::Int64)
                .alias(&self.distinct_alias),
        ];
        for spec in &self.stats {
            aggs.push(
                spec.stat
                    .apply(col(&spec.source).cast(DataType::Float64))
                    .alias(&spec.alias),
            );
        }

        let out = lf
            .group_by_stable([col("match_id"), col("pp_event_id")])
            .agg(aggs)
            .collect()?;

        debug!(
            aggregator = %self.name,
            possessions = out.height(),
            "aggregated possession context"
        );
        Ok(out)
    }

    fn check_references(&self, context: &DataFrame, possessions: &DataFrame) -> Result<()> {
        let pp_matches = id_values(possessions, "player_possession", "match_id")?;
        let pp_events = id_values(possessions, "player_possession", "event_id")?;
        let known: HashSet<(String, String)> = pp_matches
            .into_iter()
            .zip(pp_events)
            .filter_map(|(m, e)| Some((m?, e?)))
            .collect();

        let matches = id_values(context, &self.name, "match_id")?;
        let targets = id_values(context, &self.name, "pp_event_id")?;
        for (match_id, event_id) in matches.into_iter().zip(targets) {
            let Some(event_id) = event_id else {
                continue;
            };
            let match_id = match_id.unwrap_or_default();
            if !known.contains(&(match_id.clone(), event_id.clone())) {
                return Err(PipelineError::UnknownPossessionEvent {
                    table: self.name.clone(),
                    match_id,
                    event_id,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn possessions() -> DataFrame {
        df!(
            "match_id" => &["M", "M"],
            "event_id" => &["p1", "p2"]
        )
        .unwrap()
    }

    fn engagements() -> DataFrame {
        df!(
            "match_id" => &["M", "M", "M", "M", "M"],
            "event_subtype" => &["pressing", "counter_press", "pressure", "pressing", "other"],
            "player_id" => &["10", "11", "12", "10", "13"],
            "pp_event_id" => &[Some("p1"), Some("p1"), Some("p1"), Some("p2"), None],
            "distance_covered" => &[4.0, 2.0, 9.0, 6.0, 1.0],
            "speed_avg" => &[5.0, 7.0, 3.0, 4.0, 2.0]
        )
        .unwrap()
    }

    fn f64_at(df: &DataFrame, name: &str, row: usize) -> f64 {
        df.column(name).unwrap().f64().unwrap().get(row).unwrap()
    }

    #[test]
    fn pressing_groups_all_press_subtypes() {
        let out = ContextAggregator::pressing()
            .aggregate(&engagements(), &possessions())
            .unwrap();
        assert_eq!(out.height(), 2);
        let counts: Vec<i64> = out
            .column("num_opp_press_players")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(counts, vec![2, 1]);
        assert_relative_eq!(f64_at(&out, "opp_press_dist_covered_mean", 0), 3.0);
        assert_relative_eq!(f64_at(&out, "opp_press_dist_covered_min", 0), 2.0);
        assert_relative_eq!(f64_at(&out, "opp_press_speed_avg_mean", 0), 6.0);
        assert_relative_eq!(f64_at(&out, "opp_press_speed_avg_max", 0), 7.0);
    }

    #[test]
    fn subtype_partitions_do_not_overlap() {
        let pressure = ContextAggregator::pressure()
            .aggregate(&engagements(), &possessions())
            .unwrap();
        assert_eq!(pressure.height(), 1);
        assert_relative_eq!(f64_at(&pressure, "opp_pressure_dist_covered_min", 0), 9.0);

        // The only "other" engagement is unattached.
        let other = ContextAggregator::other_engagements()
            .aggregate(&engagements(), &possessions())
            .unwrap();
        assert_eq!(other.height(), 0);
        assert!(
            other
                .get_column_names()
                .contains(&"opp_other_obe_speed_avg_max")
        );
    }

    #[test]
    fn passing_options_use_flattened_names() {
        let options = df!(
            "match_id" => &["M", "M", "M"],
            "player_id" => &["20", "21", "21"],
            "pp_event_id" => &["p1", "p1", "p1"],
            "interplayer_distance" => &[10.0, 20.0, 30.0],
            "passing_option_score" => &[0.1, 0.5, 0.3]
        )
        .unwrap();
        let aggregator = ContextAggregator::passing_options();
        let out = aggregator.aggregate(&options, &possessions()).unwrap();
        let names = out.get_column_names();
        assert!(names.contains(&aggregator.distinct_alias.as_str()));
        for spec in &aggregator.stats {
            assert!(names.contains(&spec.alias.as_str()), "{}", spec.alias);
        }
        assert_relative_eq!(f64_at(&out, "interplayer_distance_min", 0), 10.0);
        assert_relative_eq!(f64_at(&out, "interplayer_distance_mean", 0), 20.0);
        assert_relative_eq!(f64_at(&out, "passing_option_score_max", 0), 0.5);
        let distinct = out.column("po_options_custom").unwrap().i64().unwrap().get(0);
        assert_eq!(distinct, Some(2));
    }

    #[test]
    fn dangling_reference_rejects_the_batch() {
        let mut rows = engagements();
        rows.with_column(Series::new(
            "pp_event_id",
            &[Some("p1"), Some("p9"), None, None, None],
        ))
        .unwrap();
        let err = ContextAggregator::pressing()
            .aggregate(&rows, &possessions())
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::UnknownPossessionEvent { ref event_id, .. } if event_id == "p9")
        );
    }

    #[test]
    fn missing_stat_source_is_a_contract_violation() {
        let rows = engagements().drop("speed_avg").unwrap();
        let err = ContextAggregator::pressure()
            .aggregate(&rows, &possessions())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }
}
