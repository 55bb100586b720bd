use std::collections::HashSet;

use habit_domain::completion::CompletionEvent;
use habit_domain::habit::{Habit, HabitId};
use habit_domain::streak::{StreakBoard, StreakPolicy};
use habit_domain::LoadedView;
use serde::Serialize;

/// One row of the "today" screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodayEntry {
    pub habit: Habit,
    pub completed_today: bool,
}

/// Owned copy of the loaded habits and today's completed set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedSnapshot {
    pub habits: Vec<Habit>,
    pub completed_today: HashSet<HabitId>,
}

impl LoadedSnapshot {
    pub fn view(&self) -> LoadedView<'_> {
        LoadedView {
            habits: &self.habits,
            completed_today: &self.completed_today,
        }
    }

    pub fn contains(&self, habit_id: &HabitId) -> bool {
        self.habits.iter().any(|habit| &habit.id == habit_id)
    }
}

/// In-memory mirror of the active user's collections. Each half is only ever
/// replaced wholesale, tagged with the sequence number of the fetch that produced it.
#[derive(Debug, Default)]
pub(crate) struct Mirror {
    habits: Vec<Habit>,
    history: Vec<CompletionEvent>,
    completed_today: HashSet<HabitId>,
    habits_seq: u64,
    completions_seq: u64,
}

impl Mirror {
    pub(crate) fn replace_habits(&mut self, seq: u64, habits: Vec<Habit>) -> bool {
        if seq <= self.habits_seq {
            return false;
        }
        self.habits = habits;
        self.habits_seq = seq;
        true
    }

    pub(crate) fn replace_completions(
        &mut self,
        seq: u64,
        history: Vec<CompletionEvent>,
        today: Vec<CompletionEvent>,
    ) -> bool {
        if seq <= self.completions_seq {
            return false;
        }
        self.history = history;
        self.completed_today = today.into_iter().map(|event| event.habit_id).collect();
        self.completions_seq = seq;
        true
    }

    pub(crate) fn snapshot(&self) -> LoadedSnapshot {
        LoadedSnapshot {
            habits: self.habits.clone(),
            completed_today: self.completed_today.clone(),
        }
    }

    pub(crate) fn today_board(&self) -> Vec<TodayEntry> {
        self.habits
            .iter()
            .map(|habit| TodayEntry {
                habit: habit.clone(),
                completed_today: self.completed_today.contains(&habit.id),
            })
            .collect()
    }

    pub(crate) fn streak_board(&self, policy: &StreakPolicy) -> StreakBoard {
        StreakBoard::rank(&self.habits, &self.history, policy)
    }
}
