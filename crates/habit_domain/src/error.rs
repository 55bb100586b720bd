use crate::habit::HabitId;
use crate::store::{Collection, RecordId};

/// Failures reported by a [`crate::store::RecordStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record `{id}` not found in {collection}")]
    NotFound { collection: Collection, id: RecordId },

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors surfaced to the action that triggered them.
///
/// Store failures are wrapped as-is; nothing in this crate retries.
#[derive(Debug, thiserror::Error)]
pub enum HabitError {
    #[error("read failed: {0}")]
    Read(#[source] StoreError),

    #[error("write failed: {0}")]
    Write(#[source] StoreError),

    #[error("sign in required")]
    AuthRequired,

    #[error("habit `{0}` is not loaded for the current user")]
    NotFound(HabitId),

    #[error("invalid habit: {0}")]
    InvalidDraft(String),
}

pub type Result<T, E = HabitError> = std::result::Result<T, E>;
