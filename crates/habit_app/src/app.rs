use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use habit_domain::{
    habit::{Cadence, HabitDraft, HabitId, UserId},
    memory_store::MemoryStore,
    streak::{StreakBoard, StreakPolicy, DEFAULT_MAX_GAP_HOURS},
    CompletionOutcome,
};
use habit_sync::{HabitTracker, TodayEntry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) user: UserId,
    pub(crate) streak_gap_hours: i64,
    pub(crate) top_streaks: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(user) = std::env::var("HABIT_USER") {
            let user = user.trim();
            if !user.is_empty() {
                config.user = UserId::new(user);
            }
        }
        if let Ok(gap) = std::env::var("HABIT_STREAK_GAP_HOURS") {
            if let Some(value) = parse_gap_hours(&gap) {
                config.streak_gap_hours = value;
            }
        }
        if let Ok(top) = std::env::var("HABIT_TOP_STREAKS") {
            if let Ok(value) = top.trim().parse::<usize>() {
                config.top_streaks = value;
            }
        }
        Ok(config)
    }

    pub(crate) fn streak_policy(&self) -> StreakPolicy {
        StreakPolicy::from_hours(self.streak_gap_hours).unwrap_or_default()
    }
}

/// A positive hour count that fits a streak policy; anything else is ignored.
fn parse_gap_hours(input: &str) -> Option<i64> {
    input
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|hours| *hours > 0 && StreakPolicy::from_hours(*hours).is_some())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user: UserId::new("local"),
            streak_gap_hours: DEFAULT_MAX_GAP_HOURS,
            top_streaks: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Add(HabitDraft),
    Done(usize),
    Remove(usize),
    List,
    Streaks,
    Refresh,
    SignIn(UserId),
    SignOut,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Habit numbers are the 1-based positions shown by `list`.
    pub(crate) fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match word.to_ascii_lowercase().as_str() {
            "add" => parse_draft(rest).map(Command::Add),
            "done" => parse_position(rest).map(Command::Done),
            "rm" | "delete" => parse_position(rest).map(Command::Remove),
            "" | "list" | "ls" => Ok(Command::List),
            "streaks" => Ok(Command::Streaks),
            "refresh" => Ok(Command::Refresh),
            "login" if !rest.is_empty() => Ok(Command::SignIn(UserId::new(rest))),
            "login" => Err("usage: login <user>".into()),
            "logout" => Ok(Command::SignOut),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command `{other}`, try `help`")),
        }
    }
}

/// `title | description | cadence`, where the last two parts are optional.
fn parse_draft(input: &str) -> Result<HabitDraft, String> {
    let mut parts = input.split('|').map(str::trim);
    let title = parts.next().unwrap_or_default();
    if title.is_empty() {
        return Err("usage: add <title> [| description] [| daily|weekly|monthly]".into());
    }
    let mut draft = HabitDraft::new(title);
    if let Some(description) = parts.next() {
        draft = draft.with_description(description);
    }
    if let Some(cadence) = parts.next().filter(|value| !value.is_empty()) {
        let cadence: Cadence = cadence.parse().map_err(|err| format!("{err}"))?;
        draft = draft.with_cadence(cadence);
    }
    Ok(draft)
}

fn parse_position(input: &str) -> Result<usize, String> {
    match input.parse::<usize>() {
        Ok(position) if position > 0 => Ok(position),
        _ => Err(format!("expected a habit number, got `{input}`")),
    }
}

struct HabitAppController {
    tracker: HabitTracker,
    config: AppConfig,
}

impl HabitAppController {
    fn new(config: AppConfig) -> Self {
        info!(user = %config.user, gap_hours = config.streak_gap_hours, "initializing controller");
        let store = Arc::new(MemoryStore::new());
        let tracker = HabitTracker::builder(store)
            .with_streak_policy(config.streak_policy())
            .build();
        Self { tracker, config }
    }

    /// Handles one command and returns the text to show. `None` ends the session.
    async fn handle(&mut self, command: Command) -> Option<String> {
        debug!(?command, "handling command");
        let message = match command {
            Command::Add(draft) => match self.tracker.create(draft).await {
                Ok(habit) => format!("Added \"{}\".\n{}", habit.title, self.render_today()),
                Err(err) => format!("Unable to add habit: {err}"),
            },
            Command::Done(position) => match self.habit_at(position) {
                Ok(id) => match self.tracker.complete(&id).await {
                    Ok(CompletionOutcome::Recorded { streak_count, .. }) => {
                        format!("Completed! {streak_count} day streak.\n{}", self.render_today())
                    }
                    Ok(CompletionOutcome::AlreadyCompletedToday) => {
                        "Already completed today.".to_string()
                    }
                    Err(err) => format!("Unable to complete habit: {err}"),
                },
                Err(message) => message,
            },
            Command::Remove(position) => match self.habit_at(position) {
                Ok(id) => match self.tracker.delete(&id).await {
                    Ok(()) => format!("Deleted.\n{}", self.render_today()),
                    Err(err) => format!("Unable to delete habit: {err}"),
                },
                Err(message) => message,
            },
            Command::List => self.render_today(),
            Command::Streaks => self.render_streaks(),
            Command::Refresh => match self.tracker.refresh().await {
                Ok(()) => self.render_today(),
                Err(err) => format!("Unable to refresh: {err}"),
            },
            Command::SignIn(user) => match self.tracker.sign_in(user.clone()).await {
                Ok(()) => format!("Signed in as {user}.\n{}", self.render_today()),
                Err(err) => format!("Sign in failed: {err}"),
            },
            Command::SignOut => {
                self.tracker.sign_out();
                "Signed out.".to_string()
            }
            Command::Help => HELP.to_string(),
            Command::Quit => return None,
        };
        Some(message)
    }

    fn habit_at(&self, position: usize) -> Result<HabitId, String> {
        self.tracker
            .today_board()
            .borrow()
            .get(position - 1)
            .map(|entry| entry.habit.id.clone())
            .ok_or_else(|| format!("no habit number {position}"))
    }

    fn render_today(&self) -> String {
        if self.tracker.current_user().is_none() {
            return "Not signed in. Use `login <user>`.".to_string();
        }
        let board = self.tracker.today_board().borrow().clone();
        format_today(&board, Local::now().date_naive())
    }

    fn render_streaks(&self) -> String {
        let board = self.tracker.streak_board().borrow().clone();
        format_streaks(&board, self.config.top_streaks)
    }
}

const HELP: &str = "\
Commands:
  list                       today's habits
  add <title> [| description] [| daily|weekly|monthly]
  done <n>                   mark habit n completed today
  rm <n>                     delete habit n
  streaks                    ranked streak summary
  refresh                    re-fetch everything
  login <user> / logout
  quit";

pub fn run(config: AppConfig) -> Result<()> {
    info!("starting habit shell");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(session(config))
}

async fn session(config: AppConfig) -> Result<()> {
    let user = config.user.clone();
    let mut controller = HabitAppController::new(config);
    controller
        .tracker
        .sign_in(user)
        .await
        .context("failed to start live sync")?;
    println!("{HELP}\n\n{}", controller.render_today());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        let output = match Command::parse(&line) {
            Ok(command) => match controller.handle(command).await {
                Some(output) => output,
                None => break,
            },
            Err(message) => message,
        };
        println!("{output}");
    }

    controller.tracker.sign_out();
    info!("habit shell finished");
    Ok(())
}

pub(crate) fn format_today(board: &[TodayEntry], today: NaiveDate) -> String {
    if board.is_empty() {
        return "No habits yet. Add your first one with `add <title>`.".to_string();
    }
    let mut out = format!("Today's Habits ({} to complete)", board.len());
    for (index, entry) in board.iter().enumerate() {
        let habit = &entry.habit;
        let mark = if entry.completed_today { "x" } else { " " };
        out.push_str(&format!(
            "\n  {}. [{}] {} ({}) - {} day streak",
            index + 1,
            mark,
            habit.title,
            habit.cadence,
            habit.streak_count
        ));
        if habit.streak_count > 0 {
            let last = habit.last_completed_at.with_timezone(&Local).date_naive();
            out.push_str(&format!(", last {}", format_relative_label(last, today)));
        }
        if !habit.description.is_empty() {
            out.push_str(&format!("\n       {}", habit.description));
        }
    }
    out
}

pub(crate) fn format_streaks(board: &StreakBoard, top: usize) -> String {
    if board.is_empty() {
        return "No habits yet. Add your first habit to start tracking streaks!".to_string();
    }
    let mut out = String::from("Top Streaks");
    for (index, entry) in board.top(top).iter().enumerate() {
        out.push_str(&format!(
            "\n  {}. {} - {} days",
            index + 1,
            entry.habit.title,
            entry.stats.best_streak
        ));
    }
    out.push_str("\n\nAll Habits");
    for entry in board.entries() {
        out.push_str(&format!(
            "\n  {}: current {} | best {} | total {}",
            entry.habit.title, entry.stats.streak, entry.stats.best_streak, entry.stats.total
        ));
    }
    out
}

fn format_relative_label(date: NaiveDate, today: NaiveDate) -> String {
    match today.signed_duration_since(date).num_days() {
        0 => "today".to_string(),
        1 => "yesterday".to_string(),
        d if d > 1 => format!("{d} days ago"),
        _ => date.format("%Y-%m-%d").to_string(),
    }
}
