use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CoefficientError;

/// One exam attempt, in the order the store ingested it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamRecord {
    pub person_name: String,
    pub person_login_code: String,
    pub person_external_id: String,
    pub training_id: String,
    pub score: f64,
    pub category: String,
}

impl ExamRecord {
    pub fn identity(&self) -> PersonIdentity {
        PersonIdentity {
            name: self.person_name.clone(),
            login_code: self.person_login_code.clone(),
            external_id: self.person_external_id.clone(),
        }
    }

    pub fn matches(&self, filter: &Filter) -> bool {
        let person = match &filter.person {
            Some(PersonKey::Name(value)) => &self.person_name == value,
            Some(PersonKey::LoginCode(value)) => &self.person_login_code == value,
            Some(PersonKey::ExternalId(value)) => &self.person_external_id == value,
            None => true,
        };
        let category = filter
            .category
            .as_deref()
            .map_or(true, |value| self.category == value);
        let training = filter
            .training
            .as_deref()
            .map_or(true, |value| self.training_id == value);

        person && category && training
    }
}

/// Any of the three interchangeable keys that identify a person.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PersonKey {
    Name(String),
    LoginCode(String),
    ExternalId(String),
}

impl fmt::Display for PersonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersonKey::Name(value) => write!(f, "name '{value}'"),
            PersonKey::LoginCode(value) => write!(f, "login code '{value}'"),
            PersonKey::ExternalId(value) => write!(f, "external id '{value}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersonIdentity {
    pub name: String,
    pub login_code: String,
    pub external_id: String,
}

/// Structured query filter. Every field is optional and they compose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub person: Option<PersonKey>,
    pub category: Option<String>,
    pub training: Option<String>,
}

impl Filter {
    pub fn person(key: PersonKey) -> Self {
        Self {
            person: Some(key),
            ..Self::default()
        }
    }

    pub fn scope(category: Option<&str>, training: Option<&str>) -> Self {
        Self {
            person: None,
            category: category.map(str::to_owned),
            training: training.map(str::to_owned),
        }
    }

    pub fn with_category(mut self, category: Option<&str>) -> Self {
        self.category = category.map(str::to_owned);
        self
    }

    pub fn with_training(mut self, training: Option<&str>) -> Self {
        self.training = training.map(str::to_owned);
        self
    }
}

/// A training that has an exam attached, i.e. one a person can complete.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailableTraining {
    pub training_id: String,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AverageMode {
    #[default]
    General,
    Primary,
    Final,
    All,
}

impl FromStr for AverageMode {
    type Err = CoefficientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(AverageMode::General),
            "primary" => Ok(AverageMode::Primary),
            "final" => Ok(AverageMode::Final),
            "all" => Ok(AverageMode::All),
            _ => Err(CoefficientError::InvalidMode(value.to_string())),
        }
    }
}

impl fmt::Display for AverageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AverageMode::General => "general",
            AverageMode::Primary => "primary",
            AverageMode::Final => "final",
            AverageMode::All => "all",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Averages {
    pub general: f64,
    pub primary: f64,
    pub final_: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AverageValue {
    Single(f64),
    All(Averages),
}

/// The three coefficients behind a final score, with CR and CP already on the 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub performance: f64,
    pub progression: f64,
    pub standardized: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    #[default]
    Hundred,
    /// Divided by 100. The standardized bonus can still push values past 1.
    Unit,
}
