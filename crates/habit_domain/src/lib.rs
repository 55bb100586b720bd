pub mod clock;
pub mod completion;
pub mod error;
pub mod habit;
pub mod ledger;
pub mod memory_store;
pub mod recorder;
pub mod registry;
pub mod store;
pub mod streak;

pub use crate::error::{HabitError, StoreError};
pub use crate::ledger::CompletionLedger;
pub use crate::recorder::{CompletionOutcome, CompletionRecorder, LoadedView};
pub use crate::registry::HabitRegistry;
