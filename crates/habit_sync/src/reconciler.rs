//! Live mirror of the active user's habits and completions.
//!
//! Store notifications never patch the mirror. They enqueue a full refetch of the
//! collection they concern, and the refetched set replaces the previous one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use habit_domain::clock::Clock;
use habit_domain::completion::CompletionFilter;
use habit_domain::habit::UserId;
use habit_domain::store::{
    fields, ChangeNotification, Collection, RecordStore, UnsubscribeHandle,
};
use habit_domain::streak::{StreakBoard, StreakPolicy};
use habit_domain::{CompletionLedger, HabitError, HabitRegistry, StoreError};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::job::{JobQueue, SyncJobKind};
use crate::view::{LoadedSnapshot, Mirror, TodayEntry};

#[derive(Debug, Default)]
struct SessionState {
    user: Option<UserId>,
    epoch: u64,
}

struct SyncContext {
    registry: HabitRegistry,
    ledger: CompletionLedger,
    clock: Arc<dyn Clock>,
    policy: StreakPolicy,
    session: RwLock<SessionState>,
    mirror: RwLock<Mirror>,
    next_seq: AtomicU64,
    today_tx: watch::Sender<Vec<TodayEntry>>,
    streaks_tx: watch::Sender<StreakBoard>,
}

impl SyncContext {
    fn active(&self) -> Option<(UserId, u64)> {
        let session = self.session.read();
        session.user.clone().map(|user| (user, session.epoch))
    }

    fn begin_session(&self, user: UserId) -> u64 {
        let mut session = self.session.write();
        session.epoch += 1;
        session.user = Some(user);
        session.epoch
    }

    fn end_session(&self) {
        let mut session = self.session.write();
        session.epoch += 1;
        session.user = None;
        let mut mirror = self.mirror.write();
        *mirror = Mirror::default();
        self.publish(&mirror);
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Applies a fetch result unless the session it was issued for has ended.
    fn apply(&self, epoch: u64, update: impl FnOnce(&mut Mirror) -> bool) {
        let session = self.session.read();
        if session.epoch != epoch {
            debug!(epoch, current = session.epoch, "discarding fetch from ended session");
            return;
        }
        let mut mirror = self.mirror.write();
        if update(&mut mirror) {
            self.publish(&mirror);
        } else {
            debug!("newer fetch already applied");
        }
    }

    fn publish(&self, mirror: &Mirror) {
        self.today_tx.send_replace(mirror.today_board());
        self.streaks_tx.send_replace(mirror.streak_board(&self.policy));
    }

    /// Runs one refetch for the active session. Without a session there is nothing to
    /// fetch and the job is skipped.
    async fn run_job(&self, job: SyncJobKind) -> Result<(), HabitError> {
        let Some((user, epoch)) = self.active() else {
            debug!(?job, "no active session, skipping refetch");
            return Ok(());
        };
        match job {
            SyncJobKind::InitialFetch => {
                self.refetch_habits(&user, epoch).await?;
                self.refetch_completions(&user, epoch).await
            }
            SyncJobKind::RefetchHabits => self.refetch_habits(&user, epoch).await,
            SyncJobKind::RefetchCompletions => self.refetch_completions(&user, epoch).await,
        }
    }

    async fn refetch_habits(&self, user: &UserId, epoch: u64) -> Result<(), HabitError> {
        let seq = self.next_seq();
        let habits = self.registry.list(user).await?;
        debug!(count = habits.len(), seq, "habits refetched");
        self.apply(epoch, |mirror| mirror.replace_habits(seq, habits));
        Ok(())
    }

    async fn refetch_completions(&self, user: &UserId, epoch: u64) -> Result<(), HabitError> {
        let seq = self.next_seq();
        let today_start = self.clock.start_of_today();
        let history = self.ledger.query(user, &CompletionFilter::all()).await?;
        let today = self
            .ledger
            .query(user, &CompletionFilter::since(today_start))
            .await?;
        debug!(total = history.len(), today = today.len(), seq, "completions refetched");
        self.apply(epoch, |mirror| {
            mirror.replace_completions(seq, history, today)
        });
        Ok(())
    }
}

struct Worker {
    user: UserId,
    subscriptions: Vec<UnsubscribeHandle>,
    task: JoinHandle<()>,
}

/// Keeps the in-memory mirror for one signed-in user in step with the store.
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    context: Arc<SyncContext>,
    worker: Option<Worker>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, policy: StreakPolicy) -> Self {
        let (today_tx, _) = watch::channel(Vec::new());
        let (streaks_tx, _) = watch::channel(StreakBoard::default());
        let context = SyncContext {
            registry: HabitRegistry::new(Arc::clone(&store), Arc::clone(&clock)),
            ledger: CompletionLedger::new(Arc::clone(&store), Arc::clone(&clock)),
            clock,
            policy,
            session: RwLock::new(SessionState::default()),
            mirror: RwLock::new(Mirror::default()),
            next_seq: AtomicU64::new(0),
            today_tx,
            streaks_tx,
        };
        Self {
            store,
            context: Arc::new(context),
            worker: None,
        }
    }

    /// Opens a fresh subscription pair for `user` and performs the initial fetch.
    /// Any previous session is stopped first. If subscribing or the initial fetch
    /// fails, the session is torn down and the store error is returned.
    #[instrument(skip(self))]
    pub async fn start(&mut self, user: UserId) -> Result<(), HabitError> {
        self.stop();
        let epoch = self.context.begin_session(user.clone());

        let subscribed = async {
            let habits = self.store.subscribe(Collection::Habits).await?;
            let completions = self.store.subscribe(Collection::Completions).await?;
            Ok::<_, StoreError>((habits, completions))
        }
        .await;
        let (habits, completions) = match subscribed {
            Ok(pair) => pair,
            Err(err) => {
                self.context.end_session();
                return Err(HabitError::Read(err));
            }
        };

        let (habits_rx, habits_handle) = habits.into_parts();
        let (completions_rx, completions_handle) = completions.into_parts();
        let task = tokio::spawn(listen(
            Arc::clone(&self.context),
            user.clone(),
            habits_rx,
            completions_rx,
        ));
        self.worker = Some(Worker {
            user: user.clone(),
            subscriptions: vec![habits_handle, completions_handle],
            task,
        });

        if let Err(err) = self.context.run_job(SyncJobKind::InitialFetch).await {
            warn!(%user, %err, "initial fetch failed");
            self.stop();
            return Err(err);
        }
        info!(%user, epoch, "live sync started");
        Ok(())
    }

    /// Releases both subscriptions and clears the mirror. Fetches still in flight
    /// for the ended session are discarded when they complete.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        for handle in worker.subscriptions {
            handle.unsubscribe();
        }
        worker.task.abort();
        self.context.end_session();
        info!(user = %worker.user, "live sync stopped");
    }

    pub fn active_user(&self) -> Option<UserId> {
        self.context.active().map(|(user, _)| user)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Refetches one collection now, outside the notification feed. On failure the
    /// previous view is kept and the error is returned.
    pub async fn refresh(&self, collection: Collection) -> Result<(), HabitError> {
        self.context
            .run_job(SyncJobKind::for_collection(collection))
            .await
    }

    /// Refetches everything, e.g. after the local day has rolled over.
    pub async fn refresh_all(&self) -> Result<(), HabitError> {
        self.context.run_job(SyncJobKind::InitialFetch).await
    }

    pub fn loaded(&self) -> LoadedSnapshot {
        self.context.mirror.read().snapshot()
    }

    pub fn today_board(&self) -> watch::Receiver<Vec<TodayEntry>> {
        self.context.today_tx.subscribe()
    }

    pub fn streak_board(&self) -> watch::Receiver<StreakBoard> {
        self.context.streaks_tx.subscribe()
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Whether a notification can affect `user`'s view. Payloads without an owner field
/// are treated as relevant.
fn is_relevant(user: &UserId, notification: &ChangeNotification) -> bool {
    notification
        .record
        .field_str(fields::USER_ID)
        .map_or(true, |owner| owner == user.as_str())
}

fn enqueue(user: &UserId, queue: &mut JobQueue, notification: ChangeNotification) {
    if !is_relevant(user, &notification) {
        return;
    }
    debug!(
        collection = %notification.collection,
        kind = ?notification.kind,
        id = %notification.record.id,
        "change notification"
    );
    queue.push(SyncJobKind::for_collection(notification.collection));
}

async fn listen(
    context: Arc<SyncContext>,
    user: UserId,
    mut habits_rx: mpsc::UnboundedReceiver<ChangeNotification>,
    mut completions_rx: mpsc::UnboundedReceiver<ChangeNotification>,
) {
    let mut queue = JobQueue::default();

    loop {
        let notification = tokio::select! {
            Some(notification) = habits_rx.recv() => notification,
            Some(notification) = completions_rx.recv() => notification,
            else => break,
        };
        enqueue(&user, &mut queue, notification);
        while let Ok(notification) = habits_rx.try_recv() {
            enqueue(&user, &mut queue, notification);
        }
        while let Ok(notification) = completions_rx.try_recv() {
            enqueue(&user, &mut queue, notification);
        }
        while let Some(job) = queue.pop() {
            if let Err(err) = context.run_job(job).await {
                warn!(?job, %err, "refetch failed, keeping previous view");
            }
        }
    }
    debug!("notification feeds closed");
}
