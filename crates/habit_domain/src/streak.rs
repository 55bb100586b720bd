//! Streak statistics derived from the completion ledger.
//!
//! A streak is a run of completions whose consecutive gaps never exceed the policy's
//! maximum gap. The default tolerance of 36 hours absorbs clock skew and a completion
//! logged late one day and early the next, without any calendar arithmetic.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::completion::CompletionEvent;
use crate::habit::{Habit, HabitId};

pub const DEFAULT_MAX_GAP_HOURS: i64 = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakPolicy {
    /// Largest gap that still continues a run. Inclusive.
    pub max_gap: Duration,
}

impl StreakPolicy {
    /// `None` when the gap is negative or too large to represent.
    pub fn from_hours(hours: i64) -> Option<Self> {
        Duration::try_hours(hours)
            .filter(|gap| *gap >= Duration::zero())
            .map(|max_gap| Self { max_gap })
    }

    fn continues(&self, previous: DateTime<Utc>, next: DateTime<Utc>) -> bool {
        next - previous <= self.max_gap
    }
}

impl Default for StreakPolicy {
    fn default() -> Self {
        Self {
            max_gap: Duration::hours(DEFAULT_MAX_GAP_HOURS),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakStats {
    /// Length of the run ending at the most recent completion, however old it is.
    pub streak: u32,
    pub best_streak: u32,
    pub total: u32,
}

/// Computes streak statistics for one habit's completions, in any order.
pub fn compute_streak<'a>(
    completions: impl IntoIterator<Item = &'a CompletionEvent>,
    policy: &StreakPolicy,
) -> StreakStats {
    let timestamps = completions
        .into_iter()
        .map(|event| event.completed_at)
        .collect();
    stats_from_timestamps(timestamps, policy)
}

fn stats_from_timestamps(mut timestamps: Vec<DateTime<Utc>>, policy: &StreakPolicy) -> StreakStats {
    timestamps.sort_unstable();

    let mut stats = StreakStats {
        total: timestamps.len() as u32,
        ..StreakStats::default()
    };
    let mut previous: Option<DateTime<Utc>> = None;
    let mut current_run = 0u32;

    for at in timestamps {
        current_run = match previous {
            Some(prev) if policy.continues(prev, at) => current_run + 1,
            _ => 1,
        };
        stats.best_streak = stats.best_streak.max(current_run);
        previous = Some(at);
    }
    stats.streak = current_run;
    stats
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakSummary {
    pub habit: Habit,
    pub stats: StreakStats,
}

/// Habits ranked by best streak, highest first.
///
/// Ties keep the order in which the habits were given, which is the registry's
/// listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreakBoard {
    entries: Vec<StreakSummary>,
}

impl StreakBoard {
    pub fn rank(habits: &[Habit], completions: &[CompletionEvent], policy: &StreakPolicy) -> Self {
        let mut by_habit: HashMap<&HabitId, Vec<DateTime<Utc>>> = HashMap::new();
        for event in completions {
            by_habit
                .entry(&event.habit_id)
                .or_default()
                .push(event.completed_at);
        }

        let mut entries: Vec<StreakSummary> = habits
            .iter()
            .map(|habit| StreakSummary {
                habit: habit.clone(),
                stats: stats_from_timestamps(
                    by_habit.remove(&habit.id).unwrap_or_default(),
                    policy,
                ),
            })
            .collect();
        entries.sort_by(|a, b| b.stats.best_streak.cmp(&a.stats.best_streak));
        Self { entries }
    }

    pub fn entries(&self) -> &[StreakSummary] {
        &self.entries
    }

    /// The podium: at most `n` leading entries.
    pub fn top(&self, n: usize) -> &[StreakSummary] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn get(&self, habit_id: &HabitId) -> Option<&StreakSummary> {
        self.entries.iter().find(|entry| &entry.habit.id == habit_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::{Cadence, UserId};
    use chrono::TimeZone;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap() + Duration::days(n - 1)
    }

    fn events(habit: &str, at: &[DateTime<Utc>]) -> Vec<CompletionEvent> {
        at.iter()
            .map(|completed_at| CompletionEvent {
                habit_id: HabitId::new(habit),
                owner_id: UserId::new("u1"),
                completed_at: *completed_at,
            })
            .collect()
    }

    fn stats(at: &[DateTime<Utc>]) -> StreakStats {
        compute_streak(&events("h", at), &StreakPolicy::default())
    }

    fn habit(id: &str) -> Habit {
        Habit {
            id: HabitId::new(id),
            owner_id: UserId::new("u1"),
            title: id.to_uppercase(),
            description: String::new(),
            cadence: Cadence::Daily,
            streak_count: 0,
            last_completed_at: day(1),
            created_at: day(1),
        }
    }

    #[test]
    fn empty_history_is_all_zero() {
        assert_eq!(stats(&[]), StreakStats::default());
    }

    #[test]
    fn single_completion() {
        assert_eq!(
            stats(&[day(3)]),
            StreakStats {
                streak: 1,
                best_streak: 1,
                total: 1
            }
        );
    }

    #[test]
    fn consecutive_days_form_one_run() {
        assert_eq!(
            stats(&[day(1), day(2), day(3)]),
            StreakStats {
                streak: 3,
                best_streak: 3,
                total: 3
            }
        );
    }

    #[test]
    fn trailing_isolated_completion_resets_current_streak() {
        assert_eq!(
            stats(&[day(1), day(2), day(10)]),
            StreakStats {
                streak: 1,
                best_streak: 2,
                total: 3
            }
        );
    }

    #[test]
    fn gap_boundary_is_inclusive() {
        let start = day(1);
        assert_eq!(stats(&[start, start + Duration::hours(36)]).best_streak, 2);
        assert_eq!(
            stats(&[start, start + Duration::hours(36) + Duration::minutes(1)]).best_streak,
            1
        );
    }

    #[test]
    fn policy_rejects_unrepresentable_gaps() {
        assert_eq!(StreakPolicy::from_hours(36), Some(StreakPolicy::default()));
        assert_eq!(
            StreakPolicy::from_hours(48).map(|policy| policy.max_gap),
            Some(Duration::hours(48))
        );
        assert!(StreakPolicy::from_hours(i64::MAX / 1000).is_none());
        assert!(StreakPolicy::from_hours(-1).is_none());
    }

    #[test]
    fn input_order_does_not_matter() {
        let ordered = [day(1), day(2), day(3), day(7), day(8)];
        let shuffled = [day(7), day(2), day(8), day(1), day(3)];
        let mut reversed = ordered;
        reversed.reverse();
        let expected = stats(&ordered);
        assert_eq!(stats(&shuffled), expected);
        assert_eq!(stats(&reversed), expected);
        assert_eq!(expected.total, 5);
        assert_eq!(expected.best_streak, 3);
        assert_eq!(expected.streak, 2);
    }

    #[test]
    fn same_day_double_logging_extends_the_run() {
        let start = day(1);
        let result = stats(&[start, start + Duration::hours(1), day(2)]);
        assert_eq!(result.streak, 3);
    }

    #[test]
    fn best_is_never_below_current() {
        let histories: [&[DateTime<Utc>]; 4] = [
            &[],
            &[day(5), day(1)],
            &[day(1), day(2), day(4), day(5), day(6)],
            &[day(9), day(3), day(4), day(20)],
        ];
        for history in histories {
            let result = stats(history);
            assert!(result.best_streak >= result.streak);
            assert_eq!(result.streak == 0, result.total == 0);
        }
    }

    #[test]
    fn ranking_orders_by_best_streak_only() {
        let habits = vec![habit("a"), habit("b"), habit("c")];
        let mut completions = events("a", &[day(1), day(2), day(3), day(10), day(20)]);
        completions.extend(events("b", &[day(1), day(2), day(3), day(4), day(5)]));
        completions.extend(events("c", &[day(1), day(2), day(3)]));

        let board = StreakBoard::rank(&habits, &completions, &StreakPolicy::default());
        let order: Vec<_> = board.entries().iter().map(|e| e.habit.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(board.get(&HabitId::new("a")).unwrap().stats.total, 5);
    }

    #[test]
    fn ranking_ties_keep_registry_order_and_podium_is_capped() {
        let habits = vec![habit("x"), habit("y"), habit("z"), habit("w")];
        let completions = events("z", &[day(1), day(2)]);
        let board = StreakBoard::rank(&habits, &completions, &StreakPolicy::default());
        let order: Vec<_> = board.entries().iter().map(|e| e.habit.id.as_str()).collect();
        assert_eq!(order, vec!["z", "x", "y", "w"]);
        assert_eq!(board.top(3).len(), 3);
        assert_eq!(board.top(10).len(), 4);
    }

    #[test]
    fn completions_of_unknown_habits_are_ignored() {
        let habits = vec![habit("kept")];
        let completions = events("deleted", &[day(1), day(2)]);
        let board = StreakBoard::rank(&habits, &completions, &StreakPolicy::default());
        assert_eq!(board.len(), 1);
        assert_eq!(board.entries()[0].stats, StreakStats::default());
    }
}
