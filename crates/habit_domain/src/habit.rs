use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HabitError;

/// Backend-assigned habit identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(String);

impl HabitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Intended frequency of a habit. Informational only: it never gates completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    pub const ALL: [Cadence; 3] = [Cadence::Daily, Cadence::Weekly, Cadence::Monthly];

    pub fn as_str(self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        }
    }

    /// Capitalised label used by the rendering layer.
    pub fn label(self) -> &'static str {
        match self {
            Cadence::Daily => "Daily",
            Cadence::Weekly => "Weekly",
            Cadence::Monthly => "Monthly",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Cadence {
    type Err = HabitError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim();
        Cadence::ALL
            .into_iter()
            .find(|cadence| cadence.as_str().eq_ignore_ascii_case(normalized))
            .ok_or_else(|| HabitError::InvalidDraft(format!("unknown cadence `{normalized}`")))
    }
}

/// A habit as stored in the registry.
///
/// `streak_count` and `last_completed_at` are a cache maintained by the completion
/// recorder; the ledger-derived [`crate::streak::StreakStats`] are authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    #[serde(rename = "$id")]
    pub id: HabitId,
    #[serde(rename = "user_id")]
    pub owner_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "frequency", default)]
    pub cadence: Cadence,
    #[serde(default)]
    pub streak_count: u32,
    #[serde(rename = "last_completed")]
    pub last_completed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// User input for the create path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HabitDraft {
    pub title: String,
    pub description: String,
    pub cadence: Cadence,
}

impl HabitDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn validate(&self) -> Result<(), HabitError> {
        if self.title.trim().is_empty() {
            return Err(HabitError::InvalidDraft("title must not be empty".into()));
        }
        Ok(())
    }
}

/// Stored shape of a new habit, minus the id the store assigns.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewHabitFields<'a> {
    pub user_id: &'a UserId,
    pub title: &'a str,
    pub description: &'a str,
    pub frequency: Cadence,
    pub streak_count: u32,
    pub last_completed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct StreakCacheFields {
    pub streak_count: u32,
    pub last_completed: DateTime<Utc>,
}
