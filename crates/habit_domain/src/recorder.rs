use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};

use crate::completion::{CompletionDraft, CompletionEvent};
use crate::error::{HabitError, Result};
use crate::habit::{Habit, HabitId, UserId};
use crate::ledger::CompletionLedger;
use crate::registry::HabitRegistry;

/// The caller's loaded state that completion preconditions are checked against.
#[derive(Debug, Clone, Copy)]
pub struct LoadedView<'a> {
    pub habits: &'a [Habit],
    pub completed_today: &'a HashSet<HabitId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Recorded {
        event: CompletionEvent,
        streak_count: u32,
    },
    /// The habit already has a completion today; nothing was written.
    AlreadyCompletedToday,
}

/// Write path for completions: ledger append, then the habit's cached counter.
#[derive(Clone)]
pub struct CompletionRecorder {
    ledger: CompletionLedger,
    registry: HabitRegistry,
}

impl CompletionRecorder {
    pub fn new(ledger: CompletionLedger, registry: HabitRegistry) -> Self {
        Self { ledger, registry }
    }

    /// Records one completion of `habit_id` for `user`.
    ///
    /// The two writes are not atomic. If the counter update fails after the append,
    /// the error is returned and the cached counter stays one behind the ledger.
    #[instrument(skip(self, view), fields(habit = %habit_id))]
    pub async fn record_completion(
        &self,
        habit_id: &HabitId,
        user: Option<&UserId>,
        view: LoadedView<'_>,
    ) -> Result<CompletionOutcome> {
        let user = user.ok_or(HabitError::AuthRequired)?;
        let habit = view
            .habits
            .iter()
            .find(|habit| &habit.id == habit_id && &habit.owner_id == user)
            .ok_or_else(|| HabitError::NotFound(habit_id.clone()))?;

        if view.completed_today.contains(habit_id) {
            debug!("already completed today, skipping");
            return Ok(CompletionOutcome::AlreadyCompletedToday);
        }

        let event = self
            .ledger
            .append(CompletionDraft::new(habit_id.clone(), user.clone()))
            .await?;

        let streak_count = habit.streak_count.saturating_add(1);
        if let Err(err) = self
            .registry
            .update_streak_cache(habit_id, streak_count, event.completed_at)
            .await
        {
            warn!(%err, "completion stored but streak cache was not updated");
            return Err(err);
        }

        info!(streak_count, "completion recorded");
        Ok(CompletionOutcome::Recorded {
            event,
            streak_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::FixedClock;
    use crate::completion::CompletionFilter;
    use crate::habit::HabitDraft;
    use crate::memory_store::{MemoryStore, StoreOp};
    use crate::store::Collection;

    struct Fixture {
        store: MemoryStore,
        ledger: CompletionLedger,
        registry: HabitRegistry,
        recorder: CompletionRecorder,
        user: UserId,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 4, 10, 9, 30, 0).unwrap(),
        ));
        let ledger = CompletionLedger::new(Arc::new(store.clone()), clock.clone());
        let registry = HabitRegistry::new(Arc::new(store.clone()), clock);
        let recorder = CompletionRecorder::new(ledger.clone(), registry.clone());
        Fixture {
            store,
            ledger,
            registry,
            recorder,
            user: UserId::new("user-1"),
        }
    }

    #[tokio::test]
    async fn records_event_and_bumps_cached_counter() {
        let fx = fixture();
        let habit = fx
            .registry
            .create(&fx.user, &HabitDraft::new("Floss"))
            .await
            .unwrap();
        let habits = vec![habit.clone()];
        let today = HashSet::new();

        let outcome = fx
            .recorder
            .record_completion(
                &habit.id,
                Some(&fx.user),
                LoadedView {
                    habits: &habits,
                    completed_today: &today,
                },
            )
            .await
            .unwrap();

        let CompletionOutcome::Recorded {
            event,
            streak_count,
        } = outcome
        else {
            panic!("expected a recorded completion");
        };
        assert_eq!(streak_count, 1);
        assert_eq!(event.habit_id, habit.id);
        assert_eq!(
            event.completed_at,
            Utc.with_ymd_and_hms(2025, 4, 10, 9, 30, 0).unwrap()
        );

        let refreshed = fx.registry.list(&fx.user).await.unwrap();
        assert_eq!(refreshed[0].streak_count, 1);
        assert_eq!(refreshed[0].last_completed_at, event.completed_at);
    }

    #[tokio::test]
    async fn completed_today_is_a_silent_no_op() {
        let fx = fixture();
        let habit = fx
            .registry
            .create(&fx.user, &HabitDraft::new("Floss"))
            .await
            .unwrap();
        let habits = vec![habit.clone()];
        let today = HashSet::from([habit.id.clone()]);

        let outcome = fx
            .recorder
            .record_completion(
                &habit.id,
                Some(&fx.user),
                LoadedView {
                    habits: &habits,
                    completed_today: &today,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, CompletionOutcome::AlreadyCompletedToday);
        assert!(fx.store.is_empty(Collection::Completions));
    }

    #[tokio::test]
    async fn requires_session_and_loaded_habit() {
        let fx = fixture();
        let habits = Vec::new();
        let today = HashSet::new();
        let view = LoadedView {
            habits: &habits,
            completed_today: &today,
        };
        let id = HabitId::new("ghost");

        let err = fx.recorder.record_completion(&id, None, view).await;
        assert!(matches!(err, Err(HabitError::AuthRequired)));

        let err = fx
            .recorder
            .record_completion(&id, Some(&fx.user), view)
            .await;
        assert!(matches!(err, Err(HabitError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn habits_of_other_users_are_not_completable() {
        let fx = fixture();
        let other = UserId::new("user-2");
        let habit = fx
            .registry
            .create(&other, &HabitDraft::new("Not mine"))
            .await
            .unwrap();
        let habits = vec![habit.clone()];
        let today = HashSet::new();
        let err = fx
            .recorder
            .record_completion(
                &habit.id,
                Some(&fx.user),
                LoadedView {
                    habits: &habits,
                    completed_today: &today,
                },
            )
            .await;
        assert!(matches!(err, Err(HabitError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_counter_update_leaves_ledger_ahead() {
        let fx = fixture();
        let habit = fx
            .registry
            .create(&fx.user, &HabitDraft::new("Floss"))
            .await
            .unwrap();
        let habits = vec![habit.clone()];
        let today = HashSet::new();
        fx.store.fail_next(Collection::Habits, StoreOp::Update);

        let err = fx
            .recorder
            .record_completion(
                &habit.id,
                Some(&fx.user),
                LoadedView {
                    habits: &habits,
                    completed_today: &today,
                },
            )
            .await;
        assert!(matches!(err, Err(HabitError::Write(_))));

        let history = fx
            .ledger
            .query(&fx.user, &CompletionFilter::all())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(fx.registry.list(&fx.user).await.unwrap()[0].streak_count, 0);
    }

    #[tokio::test]
    async fn failed_append_writes_nothing() {
        let fx = fixture();
        let habit = fx
            .registry
            .create(&fx.user, &HabitDraft::new("Floss"))
            .await
            .unwrap();
        let habits = vec![habit.clone()];
        let today = HashSet::new();
        fx.store.fail_next(Collection::Completions, StoreOp::Create);

        let err = fx
            .recorder
            .record_completion(
                &habit.id,
                Some(&fx.user),
                LoadedView {
                    habits: &habits,
                    completed_today: &today,
                },
            )
            .await;
        assert!(matches!(err, Err(HabitError::Write(_))));
        assert!(fx.store.is_empty(Collection::Completions));
        assert_eq!(fx.registry.list(&fx.user).await.unwrap()[0].streak_count, 0);
    }
}
