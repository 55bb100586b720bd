use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::clock::Clock;
use crate::completion::{CompletionDraft, CompletionEvent, CompletionFilter};
use crate::error::{HabitError, Result};
use crate::habit::UserId;
use crate::store::{to_fields, Collection, RecordStore};

/// Append-only completion history, the source of truth for streaks.
#[derive(Clone)]
pub struct CompletionLedger {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl CompletionLedger {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persists a completion stamped with the current time and returns the stored copy.
    #[instrument(skip(self), fields(habit = %draft.habit_id))]
    pub async fn append(&self, draft: CompletionDraft) -> Result<CompletionEvent> {
        let event = draft.stamp(self.clock.now());
        let data = to_fields(&event).map_err(HabitError::Write)?;
        let record = self
            .store
            .create_record(Collection::Completions, data)
            .await
            .map_err(HabitError::Write)?;
        let stored: CompletionEvent = record.decode().map_err(|err| {
            warn!(id = %record.id, "completion stored but the returned record is malformed");
            HabitError::Write(err)
        })?;
        debug!(completed_at = %stored.completed_at, "completion appended");
        Ok(stored)
    }

    /// Completions owned by `owner` matching `filter`, in store order.
    pub async fn query(
        &self,
        owner: &UserId,
        filter: &CompletionFilter,
    ) -> Result<Vec<CompletionEvent>> {
        let records = self
            .store
            .list_records(Collection::Completions, &filter.to_store_filters(owner))
            .await
            .map_err(HabitError::Read)?;
        records
            .iter()
            .map(|record| record.decode().map_err(HabitError::Read))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::FixedClock;
    use crate::error::StoreError;
    use crate::habit::HabitId;
    use crate::memory_store::MemoryStore;
    use crate::store::{Fields, Filter, Record, RecordId, Subscription};

    /// Accepts writes but answers creates with an empty payload.
    struct LossyStore(MemoryStore);

    #[async_trait]
    impl RecordStore for LossyStore {
        async fn create_record(
            &self,
            collection: Collection,
            data: Fields,
        ) -> std::result::Result<Record, StoreError> {
            let mut record = self.0.create_record(collection, data).await?;
            record.data.clear();
            Ok(record)
        }

        async fn list_records(
            &self,
            collection: Collection,
            filters: &[Filter],
        ) -> std::result::Result<Vec<Record>, StoreError> {
            self.0.list_records(collection, filters).await
        }

        async fn update_record(
            &self,
            collection: Collection,
            id: &RecordId,
            data: Fields,
        ) -> std::result::Result<Record, StoreError> {
            self.0.update_record(collection, id, data).await
        }

        async fn delete_record(
            &self,
            collection: Collection,
            id: &RecordId,
        ) -> std::result::Result<(), StoreError> {
            self.0.delete_record(collection, id).await
        }

        async fn subscribe(
            &self,
            collection: Collection,
        ) -> std::result::Result<Subscription, StoreError> {
            self.0.subscribe(collection).await
        }
    }

    #[tokio::test]
    async fn malformed_append_reply_is_a_write_error() {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 4, 10, 9, 30, 0).unwrap(),
        ));
        let ledger = CompletionLedger::new(Arc::new(LossyStore(store.clone())), clock);
        let user = UserId::new("user-1");

        let err = ledger
            .append(CompletionDraft::new(HabitId::new("h1"), user.clone()))
            .await;
        assert!(matches!(err, Err(HabitError::Write(StoreError::Malformed(_)))));

        let history = ledger.query(&user, &CompletionFilter::all()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(store.len(Collection::Completions), 1);
    }
}
