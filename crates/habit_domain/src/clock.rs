use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveTime, Offset, TimeZone, Utc,
};
use parking_lot::RwLock;

/// Source of "now" and of the caller's local day boundary.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Midnight of the current day in the caller's local time, as a UTC instant.
    fn start_of_today(&self) -> DateTime<Utc>;
}

/// Wall clock in the process's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn start_of_today(&self) -> DateTime<Utc> {
        local_midnight(&Local, Utc::now())
    }
}

/// Manually driven clock at a fixed UTC offset.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    pub fn with_offset(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: RwLock::new(now),
            offset,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.write() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }

    fn start_of_today(&self) -> DateTime<Utc> {
        local_midnight(&self.offset, self.now())
    }
}

/// Local midnight of the day containing `now`. When midnight does not exist because
/// of a DST jump, the earliest valid instant after it is used.
pub fn local_midnight<Tz: TimeZone>(tz: &Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let day = now.with_timezone(tz).date_naive();
    let mut candidate = day.and_time(NaiveTime::MIN);
    for _ in 0..4 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(at) => return at.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => candidate += Duration::minutes(30),
        }
    }
    now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midnight_follows_the_local_offset() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        // 03:00 UTC on the 2nd is still 22:00 on the 1st at UTC-5.
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 3, 0, 0).unwrap();
        let clock = FixedClock::with_offset(now, offset);
        assert_eq!(
            clock.start_of_today(),
            Utc.with_ymd_and_hms(2025, 6, 1, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn advancing_moves_now() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 23, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), start + Duration::hours(2));
        assert_eq!(
            clock.start_of_today(),
            Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
        );
    }
}
