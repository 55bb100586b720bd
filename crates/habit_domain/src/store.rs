//! The persistent-store collaborator.
//!
//! The backend datastore is an external service; this module only fixes the shape of
//! the conversation with it: schemaless records grouped in collections, owner-scoped
//! list queries, and a push channel of change notifications per collection.

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::StoreError;

/// Stored field names shared by the ledger, the registry and the sync layer.
pub mod fields {
    pub const ID: &str = "$id";
    pub const USER_ID: &str = "user_id";
    pub const HABIT_ID: &str = "habit_id";
    pub const COMPLETED_AT: &str = "completed_at";
}

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Habits,
    Completions,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Habits => "habits",
            Collection::Completions => "completions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub collection: Collection,
    pub data: Fields,
}

impl Record {
    /// Decodes the record into a typed value, exposing the id under `$id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut data = self.data.clone();
        data.insert(fields::ID.to_string(), Value::String(self.id.0.clone()));
        Ok(serde_json::from_value(Value::Object(data))?)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }
}

/// Serialises a value into record fields. Only struct-like values are accepted.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed(serde::de::Error::custom(format!(
            "expected an object, got `{other}`"
        )))),
    }
}

/// A single list-query constraint, evaluated against a record's fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal { field: String, value: Value },
    GreaterThanEqual { field: String, value: Value },
    LessThan { field: String, value: Value },
}

impl Filter {
    pub fn equal(field: &str, value: impl Into<Value>) -> Self {
        Filter::Equal {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn greater_than_equal(field: &str, value: impl Into<Value>) -> Self {
        Filter::GreaterThanEqual {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn less_than(field: &str, value: impl Into<Value>) -> Self {
        Filter::LessThan {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, data: &Fields) -> bool {
        match self {
            Filter::Equal { field, value } => data.get(field) == Some(value),
            Filter::GreaterThanEqual { field, value } => data
                .get(field)
                .and_then(|actual| compare_values(actual, value))
                .is_some_and(|ordering| ordering != Ordering::Less),
            Filter::LessThan { field, value } => data
                .get(field)
                .and_then(|actual| compare_values(actual, value))
                .is_some_and(|ordering| ordering == Ordering::Less),
        }
    }
}

/// Orders two field values. Timestamps compare as instants, not as text, since
/// RFC 3339 strings with and without fractional seconds do not sort lexically.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => {
            match (
                DateTime::parse_from_rfc3339(l),
                DateTime::parse_from_rfc3339(r),
            ) {
                (Ok(l), Ok(r)) => Some(l.cmp(&r)),
                _ => Some(l.cmp(r)),
            }
        }
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Push notification for one record change. The payload is the record as it was
/// after the change (or just before deletion).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub record: Record,
}

/// Releases a subscription exactly once, either explicitly or on drop.
pub struct UnsubscribeHandle(Option<Box<dyn FnOnce() + Send + Sync>>);

impl UnsubscribeHandle {
    pub fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self(Some(Box::new(release)))
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl Drop for UnsubscribeHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for UnsubscribeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsubscribeHandle")
            .field("active", &self.0.is_some())
            .finish()
    }
}

/// A live feed of change notifications for one collection.
#[derive(Debug)]
pub struct Subscription {
    pub collection: Collection,
    receiver: mpsc::UnboundedReceiver<ChangeNotification>,
    handle: UnsubscribeHandle,
}

impl Subscription {
    pub fn new(
        collection: Collection,
        receiver: mpsc::UnboundedReceiver<ChangeNotification>,
        handle: UnsubscribeHandle,
    ) -> Self {
        Self {
            collection,
            receiver,
            handle,
        }
    }

    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.receiver.recv().await
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<ChangeNotification>,
        UnsubscribeHandle,
    ) {
        (self.receiver, self.handle)
    }
}

/// Backend datastore adapters implement this trait.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_record(&self, collection: Collection, data: Fields)
        -> Result<Record, StoreError>;

    async fn list_records(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> Result<Vec<Record>, StoreError>;

    /// Merges `data` into the stored record.
    async fn update_record(
        &self,
        collection: Collection,
        id: &RecordId,
        data: Fields,
    ) -> Result<Record, StoreError>;

    async fn delete_record(&self, collection: Collection, id: &RecordId)
        -> Result<(), StoreError>;

    async fn subscribe(&self, collection: Collection) -> Result<Subscription, StoreError>;
}
