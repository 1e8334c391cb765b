use std::collections::HashMap;
use std::hash::Hash;

use crate::engine::Engine;
use crate::error::{CoefficientError, Result};
use crate::models::{AverageMode, AverageValue, Averages, ExamRecord, Filter, PersonKey};

/// Scores grouped by key, groups in order of first appearance and scores in
/// ingestion order within each group.
pub(crate) fn group_scores<'r, K, F>(records: &'r [ExamRecord], key: F) -> Vec<Vec<f64>>
where
    K: Eq + Hash,
    F: Fn(&'r ExamRecord) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<f64>> = Vec::new();

    for record in records {
        let position = *positions.entry(key(record)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[position].push(record.score);
    }

    groups
}

pub(crate) fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(CoefficientError::EmptyResultSet);
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean over every attempt.
pub fn general_average(records: &[ExamRecord]) -> Result<f64> {
    let scores: Vec<f64> = records.iter().map(|r| r.score).collect();
    mean(&scores)
}

/// Mean of the earliest attempt per training.
pub fn primary_average(records: &[ExamRecord]) -> Result<f64> {
    first_of_groups(group_scores(records, |r| r.training_id.as_str()))
}

/// Mean of the best attempt per training.
pub fn final_average(records: &[ExamRecord]) -> Result<f64> {
    best_of_groups(group_scores(records, |r| r.training_id.as_str()))
}

fn first_of_groups(groups: Vec<Vec<f64>>) -> Result<f64> {
    let firsts: Vec<f64> = groups.iter().filter_map(|g| g.first().copied()).collect();
    mean(&firsts)
}

fn best_of_groups(groups: Vec<Vec<f64>>) -> Result<f64> {
    let bests: Vec<f64> = groups
        .iter()
        .map(|g| g.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        .collect();
    mean(&bests)
}

pub fn average(records: &[ExamRecord], mode: AverageMode) -> Result<AverageValue> {
    Ok(match mode {
        AverageMode::General => AverageValue::Single(general_average(records)?),
        AverageMode::Primary => AverageValue::Single(primary_average(records)?),
        AverageMode::Final => AverageValue::Single(final_average(records)?),
        AverageMode::All => AverageValue::All(Averages {
            general: general_average(records)?,
            primary: primary_average(records)?,
            final_: final_average(records)?,
        }),
    })
}

/// Averages over a whole scope. Primary and final group by person rather
/// than by training: each person's first attempt, each person's best attempt.
pub fn scope_average(records: &[ExamRecord], mode: AverageMode) -> Result<AverageValue> {
    let by_person = || {
        group_scores(records, |r| {
            (r.person_name.as_str(), r.person_login_code.as_str())
        })
    };

    Ok(match mode {
        AverageMode::General => AverageValue::Single(general_average(records)?),
        AverageMode::Primary => AverageValue::Single(first_of_groups(by_person())?),
        AverageMode::Final => AverageValue::Single(best_of_groups(by_person())?),
        AverageMode::All => AverageValue::All(Averages {
            general: general_average(records)?,
            primary: first_of_groups(by_person())?,
            final_: best_of_groups(by_person())?,
        }),
    })
}

impl Engine<'_> {
    pub async fn person_average(
        &self,
        key: PersonKey,
        category: Option<&str>,
        training: Option<&str>,
        mode: AverageMode,
    ) -> Result<AverageValue> {
        let filter = Filter::person(key)
            .with_category(category)
            .with_training(training);
        let records = self.required_records(&filter).await?;
        average(&records, mode)
    }

    pub async fn scope_average(
        &self,
        category: Option<&str>,
        training: Option<&str>,
        mode: AverageMode,
    ) -> Result<AverageValue> {
        let records = self
            .required_records(&Filter::scope(category, training))
            .await?;
        scope_average(&records, mode)
    }
}
