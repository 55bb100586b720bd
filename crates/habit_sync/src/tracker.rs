use std::sync::Arc;

use habit_domain::clock::{Clock, SystemClock};
use habit_domain::habit::{Habit, HabitDraft, HabitId, UserId};
use habit_domain::store::{Collection, RecordStore};
use habit_domain::streak::{StreakBoard, StreakPolicy};
use habit_domain::{
    CompletionLedger, CompletionOutcome, CompletionRecorder, HabitError, HabitRegistry,
};
use tokio::sync::watch;
use tracing::{instrument, warn};

use crate::reconciler::Reconciler;
use crate::view::{LoadedSnapshot, TodayEntry};

pub struct HabitTrackerBuilder {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    policy: StreakPolicy,
}

impl HabitTrackerBuilder {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            policy: StreakPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_streak_policy(mut self, policy: StreakPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> HabitTracker {
        let registry = HabitRegistry::new(Arc::clone(&self.store), Arc::clone(&self.clock));
        let ledger = CompletionLedger::new(Arc::clone(&self.store), Arc::clone(&self.clock));
        HabitTracker {
            recorder: CompletionRecorder::new(ledger, registry.clone()),
            registry,
            reconciler: Reconciler::new(self.store, self.clock, self.policy),
        }
    }
}

/// Session-scoped entry point for the rendering layer: imperative actions plus the
/// two reactive boards.
pub struct HabitTracker {
    reconciler: Reconciler,
    registry: HabitRegistry,
    recorder: CompletionRecorder,
}

impl HabitTracker {
    pub fn builder(store: Arc<dyn RecordStore>) -> HabitTrackerBuilder {
        HabitTrackerBuilder::new(store)
    }

    pub async fn sign_in(&mut self, user: UserId) -> Result<(), HabitError> {
        self.reconciler.start(user).await
    }

    pub fn sign_out(&mut self) {
        self.reconciler.stop();
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.reconciler.active_user()
    }

    pub fn today_board(&self) -> watch::Receiver<Vec<TodayEntry>> {
        self.reconciler.today_board()
    }

    pub fn streak_board(&self) -> watch::Receiver<StreakBoard> {
        self.reconciler.streak_board()
    }

    pub fn loaded(&self) -> LoadedSnapshot {
        self.reconciler.loaded()
    }

    /// Refetches both collections, e.g. once the local day has changed. A failed read
    /// is returned and the previous view stays published.
    pub async fn refresh(&self) -> Result<(), HabitError> {
        self.current_user().ok_or(HabitError::AuthRequired)?;
        self.reconciler.refresh_all().await
    }

    /// Marks `habit_id` done for today. A second call on the same local day is a no-op.
    #[instrument(skip(self))]
    pub async fn complete(&self, habit_id: &HabitId) -> Result<CompletionOutcome, HabitError> {
        let user = self.current_user();
        let loaded = self.reconciler.loaded();
        let outcome = self
            .recorder
            .record_completion(habit_id, user.as_ref(), loaded.view())
            .await;
        if matches!(
            outcome,
            Ok(CompletionOutcome::Recorded { .. }) | Err(HabitError::Write(_))
        ) {
            resync(self.reconciler.refresh_all().await);
        }
        outcome
    }

    /// Deletes a loaded habit. Its completions stay in the ledger.
    #[instrument(skip(self))]
    pub async fn delete(&self, habit_id: &HabitId) -> Result<(), HabitError> {
        self.current_user().ok_or(HabitError::AuthRequired)?;
        if !self.reconciler.loaded().contains(habit_id) {
            return Err(HabitError::NotFound(habit_id.clone()));
        }
        self.registry.delete(habit_id).await?;
        resync(self.reconciler.refresh(Collection::Habits).await);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create(&self, draft: HabitDraft) -> Result<Habit, HabitError> {
        let user = self.current_user().ok_or(HabitError::AuthRequired)?;
        let habit = self.registry.create(&user, &draft).await?;
        resync(self.reconciler.refresh(Collection::Habits).await);
        Ok(habit)
    }
}

/// The write already happened and its result is what the caller gets. A failed
/// follow-up read leaves the previous view until the notification feed catches up.
fn resync(refreshed: Result<(), HabitError>) {
    if let Err(err) = refreshed {
        warn!(%err, "view not refreshed after write");
    }
}
