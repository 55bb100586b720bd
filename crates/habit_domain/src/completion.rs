use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::habit::{HabitId, UserId};
use crate::store::{fields, Filter};

/// An immutable record that a habit was performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub habit_id: HabitId,
    #[serde(rename = "user_id")]
    pub owner_id: UserId,
    pub completed_at: DateTime<Utc>,
}

/// What a caller supplies to the ledger. The timestamp is assigned on append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionDraft {
    pub habit_id: HabitId,
    pub owner_id: UserId,
}

impl CompletionDraft {
    pub fn new(habit_id: HabitId, owner_id: UserId) -> Self {
        Self { habit_id, owner_id }
    }

    pub(crate) fn stamp(self, completed_at: DateTime<Utc>) -> CompletionEvent {
        CompletionEvent {
            habit_id: self.habit_id,
            owner_id: self.owner_id,
            completed_at,
        }
    }
}

/// Optional narrowing of a ledger query. `since` is inclusive, `until` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionFilter {
    pub habit_id: Option<HabitId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl CompletionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            ..Self::default()
        }
    }

    pub fn for_habit(mut self, habit_id: HabitId) -> Self {
        self.habit_id = Some(habit_id);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub(crate) fn to_store_filters(&self, owner: &UserId) -> Vec<Filter> {
        let mut filters = vec![Filter::equal(fields::USER_ID, owner.as_str())];
        if let Some(habit_id) = &self.habit_id {
            filters.push(Filter::equal(fields::HABIT_ID, habit_id.as_str()));
        }
        if let Some(since) = self.since {
            filters.push(Filter::greater_than_equal(
                fields::COMPLETED_AT,
                since.to_rfc3339(),
            ));
        }
        if let Some(until) = self.until {
            filters.push(Filter::less_than(fields::COMPLETED_AT, until.to_rfc3339()));
        }
        filters
    }
}
