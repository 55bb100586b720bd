pub mod job;
pub mod reconciler;
pub mod tracker;
pub mod view;

pub use crate::reconciler::Reconciler;
pub use crate::tracker::{HabitTracker, HabitTrackerBuilder};
pub use crate::view::{LoadedSnapshot, TodayEntry};
