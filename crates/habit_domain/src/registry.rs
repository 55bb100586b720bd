use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::clock::Clock;
use crate::error::{HabitError, Result};
use crate::habit::{Habit, HabitDraft, HabitId, NewHabitFields, StreakCacheFields, UserId};
use crate::store::{fields, to_fields, Collection, Filter, RecordId, RecordStore};

/// The user's habit definitions. Stores whatever streak cache it is given and never
/// derives one itself.
#[derive(Clone)]
pub struct HabitRegistry {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl HabitRegistry {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn list(&self, owner: &UserId) -> Result<Vec<Habit>> {
        let records = self
            .store
            .list_records(
                Collection::Habits,
                &[Filter::equal(fields::USER_ID, owner.as_str())],
            )
            .await
            .map_err(HabitError::Read)?;
        records
            .iter()
            .map(|record| record.decode().map_err(HabitError::Read))
            .collect()
    }

    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create(&self, owner: &UserId, draft: &HabitDraft) -> Result<Habit> {
        draft.validate()?;
        let now = self.clock.now();
        let data = to_fields(&NewHabitFields {
            user_id: owner,
            title: draft.title.trim(),
            description: draft.description.trim(),
            frequency: draft.cadence,
            streak_count: 0,
            last_completed: now,
            created_at: now,
        })
        .map_err(HabitError::Write)?;
        let record = self
            .store
            .create_record(Collection::Habits, data)
            .await
            .map_err(HabitError::Write)?;
        debug!(id = %record.id, "habit created");
        record.decode().map_err(HabitError::Write)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &HabitId) -> Result<()> {
        self.store
            .delete_record(Collection::Habits, &RecordId::new(id.as_str()))
            .await
            .map_err(HabitError::Write)
    }

    pub async fn update_streak_cache(
        &self,
        id: &HabitId,
        streak_count: u32,
        last_completed_at: DateTime<Utc>,
    ) -> Result<Habit> {
        let data = to_fields(&StreakCacheFields {
            streak_count,
            last_completed: last_completed_at,
        })
        .map_err(HabitError::Write)?;
        let record = self
            .store
            .update_record(Collection::Habits, &RecordId::new(id.as_str()), data)
            .await
            .map_err(HabitError::Write)?;
        record.decode().map_err(HabitError::Write)
    }
}
