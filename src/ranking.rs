use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::averages::average;
use crate::engine::Engine;
use crate::error::{CoefficientError, Result};
use crate::models::{
    AverageMode, AverageValue, ExamRecord, Filter, PersonIdentity, ScoreBreakdown,
};
use crate::performance::member_performance;
use crate::progression::{available_count, progression_coefficient};
use crate::score::breakdown;
use crate::standardized::PopulationStatistics;

pub const TOP_N: usize = 20;

pub(crate) struct Member {
    pub identity: PersonIdentity,
    pub records: Vec<ExamRecord>,
}

/// Distinct (name, login code) pairs in order of first appearance.
pub(crate) fn population(records: &[ExamRecord]) -> Vec<Member> {
    let mut positions: HashMap<(&str, &str), usize> = HashMap::new();
    let mut members: Vec<Member> = Vec::new();

    for record in records {
        let key = (record.person_name.as_str(), record.person_login_code.as_str());
        let position = *positions.entry(key).or_insert_with(|| {
            members.push(Member {
                identity: record.identity(),
                records: Vec::new(),
            });
            members.len() - 1
        });
        members[position].records.push(record.clone());
    }

    members
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Average(AverageMode),
    Performance,
    Progression,
    Standardized,
    Score,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Average(mode) => write!(f, "{mode} average"),
            Metric::Performance => f.write_str("performance coefficient"),
            Metric::Progression => f.write_str("progression coefficient"),
            Metric::Standardized => f.write_str("standardized coefficient"),
            Metric::Score => f.write_str("final score"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Coefficient(f64),
    Score(ScoreBreakdown),
}

impl MetricValue {
    pub fn sort_value(&self) -> f64 {
        match self {
            MetricValue::Coefficient(value) => *value,
            MetricValue::Score(breakdown) => breakdown.score,
        }
    }
}

/// Full row as built, before any column projection.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub rank: usize,
    pub identity: PersonIdentity,
    pub value: MetricValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub include_name: bool,
    pub include_external_id: bool,
    /// Score rankings only: drop the CR/CP/CRP breakdown and keep the score.
    pub metric_only: bool,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            include_name: true,
            include_external_id: false,
            metric_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingRow {
    pub id: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(flatten)]
    pub values: RowValues,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowValues {
    Coefficient { coefficient: f64 },
    Breakdown(ScoreBreakdown),
    Score { score: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub metric: Metric,
    pub category: Option<String>,
    pub entries: Vec<RankedEntry>,
}

impl Ranking {
    pub fn rows(&self, columns: &Columns) -> Vec<RankingRow> {
        self.entries
            .iter()
            .map(|entry| RankingRow {
                id: entry.rank,
                name: columns.include_name.then(|| entry.identity.name.clone()),
                external_id: columns
                    .include_external_id
                    .then(|| entry.identity.external_id.clone()),
                values: match entry.value {
                    MetricValue::Coefficient(coefficient) => RowValues::Coefficient { coefficient },
                    MetricValue::Score(breakdown) if columns.metric_only => RowValues::Score {
                        score: breakdown.score,
                    },
                    MetricValue::Score(breakdown) => RowValues::Breakdown(breakdown),
                },
            })
            .collect()
    }
}

/// Sorts by value descending, ties by enumeration position, then assigns ranks.
pub fn rank(values: Vec<(PersonIdentity, MetricValue)>, top20: bool) -> Result<Vec<RankedEntry>> {
    let mut indexed: Vec<(usize, PersonIdentity, MetricValue)> = values
        .into_iter()
        .enumerate()
        .map(|(position, (identity, value))| (position, identity, value))
        .collect();

    indexed.sort_by(|a, b| {
        b.2.sort_value()
            .partial_cmp(&a.2.sort_value())
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    if top20 {
        indexed.truncate(TOP_N);
    }
    if indexed.is_empty() {
        return Err(CoefficientError::EmptyResultSet);
    }

    Ok(indexed
        .into_iter()
        .enumerate()
        .map(|(index, (_, identity, value))| RankedEntry {
            rank: index + 1,
            identity,
            value,
        })
        .collect())
}

impl Engine<'_> {
    pub async fn ranking(
        &self,
        metric: Metric,
        category: Option<&str>,
        top20: bool,
    ) -> Result<Ranking> {
        if metric == Metric::Average(AverageMode::All) {
            return Err(CoefficientError::InvalidMode(AverageMode::All.to_string()));
        }

        let records = self
            .required_records(&Filter::scope(category, None))
            .await?;
        let members = population(&records);
        info!(%metric, ?category, population = members.len(), "building ranking");

        let values = match metric {
            Metric::Average(mode) => members
                .iter()
                .map(|m| match average(&m.records, mode)? {
                    AverageValue::Single(value) => Ok(MetricValue::Coefficient(value)),
                    AverageValue::All(_) => Err(CoefficientError::InvalidMode(mode.to_string())),
                })
                .collect::<Result<Vec<_>>>()?,
            Metric::Performance => member_performance(&members)?
                .into_iter()
                .map(MetricValue::Coefficient)
                .collect(),
            Metric::Progression => {
                let trainings = self.available_trainings(category).await?;
                let available = available_count(&trainings, category)?;
                members
                    .iter()
                    .map(|m| {
                        MetricValue::Coefficient(progression_coefficient(&m.records, available))
                    })
                    .collect()
            }
            Metric::Standardized => {
                let performance = member_performance(&members)?;
                let statistics = PopulationStatistics::from_values(&performance)?;
                performance
                    .iter()
                    .map(|cr| statistics.standardize(*cr).map(MetricValue::Coefficient))
                    .collect::<Result<Vec<_>>>()?
            }
            Metric::Score => {
                let trainings = self.available_trainings(category).await?;
                let available = available_count(&trainings, category)?;
                let performance = member_performance(&members)?;
                let statistics = PopulationStatistics::from_values(&performance)?;
                members
                    .iter()
                    .zip(&performance)
                    .map(|(m, cr)| {
                        let cp = progression_coefficient(&m.records, available);
                        let crp = statistics.standardize(*cr)?;
                        Ok(MetricValue::Score(breakdown(*cr, cp, crp)))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };

        let identities = members.into_iter().map(|m| m.identity);
        let entries = rank(identities.zip(values).collect(), top20)?;

        Ok(Ranking {
            metric,
            category: category.map(str::to_owned),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::{record, sample_store};
    use crate::store::InMemoryStore;

    fn identity(name: &str) -> PersonIdentity {
        PersonIdentity {
            name: name.to_string(),
            login_code: name.to_lowercase(),
            external_id: format!("id-{name}"),
        }
    }

    fn names(entries: &[RankedEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.identity.name.as_str()).collect()
    }

    #[test]
    fn ties_keep_enumeration_order() {
        let values = vec![
            (identity("First"), MetricValue::Coefficient(0.5)),
            (identity("Best"), MetricValue::Coefficient(0.9)),
            (identity("Second"), MetricValue::Coefficient(0.5)),
        ];

        let entries = rank(values, false).unwrap();
        assert_eq!(names(&entries), vec!["Best", "First", "Second"]);
        assert_eq!(entries.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn signed_zero_ties_keep_enumeration_order() {
        let values = vec![
            (identity("First"), MetricValue::Coefficient(-0.0)),
            (identity("Second"), MetricValue::Coefficient(0.0)),
        ];

        let entries = rank(values, false).unwrap();
        assert_eq!(names(&entries), vec!["First", "Second"]);
    }

    #[test]
    fn truncation_keeps_relative_order() {
        let values: Vec<(PersonIdentity, MetricValue)> = (0..30)
            .map(|i| (identity(&format!("P{i}")), MetricValue::Coefficient((i % 7) as f64)))
            .collect();

        let full = rank(values.clone(), false).unwrap();
        let top = rank(values, true).unwrap();
        assert_eq!(top.len(), TOP_N);
        assert_eq!(top[..], full[..TOP_N]);
    }

    #[test]
    fn empty_ranking_is_an_error() {
        assert_eq!(rank(Vec::new(), true), Err(CoefficientError::EmptyResultSet));
    }

    #[test]
    fn population_dedupes_by_name_and_login() {
        let records = vec![
            record("Ana", "ana1", "1", "T1", "X", 10.0),
            record("Ana", "ana2", "2", "T1", "X", 11.0),
            record("Ana", "ana1", "1", "T2", "X", 12.0),
        ];
        let members = population(&records);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].records.len(), 2);
        assert_eq!(members[1].identity.login_code, "ana2");
    }

    #[tokio::test]
    async fn performance_ranking_orders_by_coefficient() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let ranking = engine.ranking(Metric::Performance, None, false).await.unwrap();
        assert_eq!(names(&ranking.entries), vec!["Bruno Lima", "Paula Reis", "Carla Dias"]);
    }

    #[tokio::test]
    async fn manual_tie_ranks_first_attempt_higher() {
        let store = InMemoryStore::from_records(vec![
            record("Late", "late", "2", "T1", "X", 1.0),
            record("Early", "early", "1", "T1", "X", 14.0),
            record("Late", "late", "2", "T1", "X", 14.0),
        ]);
        let engine = Engine::new(&store);

        // Both have a best attempt of 14, Late appeared first.
        let ranking = engine
            .ranking(Metric::Average(AverageMode::Final), Some("X"), false)
            .await
            .unwrap();
        assert_eq!(names(&ranking.entries), vec!["Late", "Early"]);
    }

    #[tokio::test]
    async fn average_ranking_rejects_all_mode() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let err = engine
            .ranking(Metric::Average(AverageMode::All), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoefficientError::InvalidMode(_)));
    }

    #[tokio::test]
    async fn progression_ranking_respects_category() {
        let store = sample_store().with_training("T4", "X");
        let engine = Engine::new(&store);

        let ranking = engine.ranking(Metric::Progression, Some("X"), false).await.unwrap();
        assert_eq!(names(&ranking.entries), vec!["Paula Reis", "Bruno Lima"]);
        assert_eq!(ranking.entries[0].value, MetricValue::Coefficient(2.0 / 3.0));
    }

    #[tokio::test]
    async fn standardized_ranking_fails_for_single_member() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let err = engine
            .ranking(Metric::Standardized, Some("Y"), false)
            .await
            .unwrap_err();
        assert_eq!(err, CoefficientError::DegenerateStatistics);
    }

    #[tokio::test]
    async fn empty_scope_reports_no_result() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let err = engine
            .ranking(Metric::Performance, Some("missing"), true)
            .await
            .unwrap_err();
        assert_eq!(err, CoefficientError::EmptyResultSet);
    }

    #[tokio::test]
    async fn score_ranking_matches_person_lookup() {
        let store = sample_store();
        let engine = Engine::new(&store);

        let ranking = engine.ranking(Metric::Score, Some("X"), false).await.unwrap();
        let top = &ranking.entries[0];
        let lookup = engine
            .score_breakdown(
                crate::models::PersonKey::LoginCode(top.identity.login_code.clone()),
                Some("X"),
            )
            .await
            .unwrap();
        assert_eq!(top.value, MetricValue::Score(lookup));
    }

    #[tokio::test]
    async fn column_projection() {
        let store = sample_store();
        let engine = Engine::new(&store);
        let ranking = engine.ranking(Metric::Score, Some("X"), false).await.unwrap();

        let metric_only = ranking.rows(&Columns {
            include_name: false,
            include_external_id: false,
            metric_only: true,
        });
        assert!(metric_only.iter().all(|row| row.name.is_none() && row.external_id.is_none()));
        assert!(matches!(metric_only[0].values, RowValues::Score { .. }));

        let full = ranking.rows(&Columns {
            include_name: true,
            include_external_id: true,
            metric_only: false,
        });
        assert_eq!(full[0].external_id.as_deref(), Some("9002"));
        assert!(matches!(full[0].values, RowValues::Breakdown(_)));

        let json = serde_json::to_value(&metric_only[0]).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 2);
    }
}
