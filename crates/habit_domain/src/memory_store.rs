use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{
    ChangeKind, ChangeNotification, Collection, Fields, Filter, Record, RecordId, RecordStore,
    Subscription, UnsubscribeHandle,
};

/// Store operations that can be made to fail for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    List,
    Update,
    Delete,
    Subscribe,
}

/// In-process [`RecordStore`] with push notifications.
///
/// Records keep insertion order. Cloning shares the underlying data, so several
/// sessions can observe each other's writes.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    records: RwLock<HashMap<Collection, Vec<Record>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
    faults: Mutex<HashMap<(Collection, StoreOp), usize>>,
}

struct Subscriber {
    id: u64,
    collection: Collection,
    sender: mpsc::UnboundedSender<ChangeNotification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `op` against `collection` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, collection: Collection, op: StoreOp) {
        *self.inner.faults.lock().entry((collection, op)).or_default() += 1;
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.inner
            .records
            .read()
            .get(&collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.inner
            .subscribers
            .lock()
            .iter()
            .filter(|subscriber| subscriber.collection == collection)
            .count()
    }

    fn check_fault(&self, collection: Collection, op: StoreOp) -> Result<(), StoreError> {
        let mut faults = self.inner.faults.lock();
        if let Some(remaining) = faults.get_mut(&(collection, op)) {
            *remaining -= 1;
            if *remaining == 0 {
                faults.remove(&(collection, op));
            }
            return Err(StoreError::Unavailable(format!(
                "injected {op:?} failure on {collection}"
            )));
        }
        Ok(())
    }

    fn publish(&self, kind: ChangeKind, record: &Record) {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|subscriber| {
            if subscriber.collection != record.collection {
                return true;
            }
            subscriber
                .sender
                .send(ChangeNotification {
                    collection: record.collection,
                    kind,
                    record: record.clone(),
                })
                .is_ok()
        });
        trace!(collection = %record.collection, id = %record.id, ?kind, "published change");
    }
}

fn unsubscribe(inner: &Weak<Inner>, id: u64) {
    if let Some(inner) = inner.upgrade() {
        inner
            .subscribers
            .lock()
            .retain(|subscriber| subscriber.id != id);
        debug!(subscriber = id, "subscription released");
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_record(
        &self,
        collection: Collection,
        data: Fields,
    ) -> Result<Record, StoreError> {
        self.check_fault(collection, StoreOp::Create)?;
        let record = Record {
            id: RecordId::new(Uuid::new_v4().to_string()),
            collection,
            data,
        };
        self.inner
            .records
            .write()
            .entry(collection)
            .or_default()
            .push(record.clone());
        self.publish(ChangeKind::Created, &record);
        Ok(record)
    }

    async fn list_records(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Vec<Record>, StoreError> {
        self.check_fault(collection, StoreOp::List)?;
        let records = self.inner.records.read();
        Ok(records
            .get(&collection)
            .into_iter()
            .flatten()
            .filter(|record| filters.iter().all(|filter| filter.matches(&record.data)))
            .cloned()
            .collect())
    }

    async fn update_record(
        &self,
        collection: Collection,
        id: &RecordId,
        data: Fields,
    ) -> Result<Record, StoreError> {
        self.check_fault(collection, StoreOp::Update)?;
        let updated = {
            let mut records = self.inner.records.write();
            let record = records
                .get_mut(&collection)
                .and_then(|records| records.iter_mut().find(|record| &record.id == id))
                .ok_or_else(|| StoreError::NotFound {
                    collection,
                    id: id.clone(),
                })?;
            record.data.extend(data);
            record.clone()
        };
        self.publish(ChangeKind::Updated, &updated);
        Ok(updated)
    }

    async fn delete_record(&self, collection: Collection, id: &RecordId) -> Result<(), StoreError> {
        self.check_fault(collection, StoreOp::Delete)?;
        let removed = {
            let mut records = self.inner.records.write();
            let entries = records.entry(collection).or_default();
            let position = entries
                .iter()
                .position(|record| &record.id == id)
                .ok_or_else(|| StoreError::NotFound {
                    collection,
                    id: id.clone(),
                })?;
            entries.remove(position)
        };
        self.publish(ChangeKind::Deleted, &removed);
        Ok(())
    }

    async fn subscribe(&self, collection: Collection) -> Result<Subscription, StoreError> {
        self.check_fault(collection, StoreOp::Subscribe)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push(Subscriber {
            id,
            collection,
            sender,
        });
        debug!(subscriber = id, %collection, "subscription opened");
        let weak = Arc::downgrade(&self.inner);
        let handle = UnsubscribeHandle::new(move || unsubscribe(&weak, id));
        Ok(Subscription::new(collection, receiver, handle))
    }
}
