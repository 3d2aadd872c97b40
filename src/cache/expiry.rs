use chrono::{DateTime, Duration, Utc};

/// Data-refresh schedule used to align cache expiry.
///
/// Refreshes happen at `offset + k * interval` seconds since the Unix epoch.
/// Every cache entry written while serving one request expires at the first
/// refresh strictly after the request started, so a request never sees its
/// own entries expire mid-flight and they all go stale together.
///
/// # Examples
///
/// ```
/// use sankey_engine::cache::expiry::RefreshSchedule;
/// use chrono::{TimeZone, Utc};
///
/// let daily = RefreshSchedule::daily();
/// let now = Utc.with_ymd_and_hms(2025, 6, 1, 15, 30, 0).unwrap();
/// assert_eq!(
///     daily.next_expiry(now),
///     Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    interval_secs: i64,
    offset_secs: i64,
}

impl RefreshSchedule {
    /// Interval is clamped to at least one second; the offset is reduced
    /// modulo the interval.
    pub fn new(interval: Duration, offset: Duration) -> Self {
        let interval_secs = interval.num_seconds().max(1);
        Self {
            interval_secs,
            offset_secs: offset.num_seconds().rem_euclid(interval_secs),
        }
    }

    /// Refresh at every UTC midnight.
    pub fn daily() -> Self {
        Self::new(Duration::days(1), Duration::zero())
    }

    pub fn interval(&self) -> Duration {
        Duration::seconds(self.interval_secs)
    }

    /// First refresh boundary strictly after `now`.
    pub fn next_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let since_offset = now.timestamp() - self.offset_secs;
        let next = (since_offset.div_euclid(self.interval_secs) + 1) * self.interval_secs
            + self.offset_secs;
        DateTime::from_timestamp(next, 0).unwrap_or(now + self.interval())
    }
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self::daily()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_boundary_is_strictly_after_now() {
        let daily = RefreshSchedule::daily();
        let midnight = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(daily.next_expiry(midnight), midnight + Duration::days(1));

        let just_before = midnight - Duration::milliseconds(1);
        assert_eq!(daily.next_expiry(just_before), midnight);
    }

    #[test]
    fn test_offset_schedule() {
        // every 6 hours, starting at 02:00
        let schedule = RefreshSchedule::new(Duration::hours(6), Duration::hours(2));
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 7, 59, 0).unwrap();
        assert_eq!(
            schedule.next_expiry(now),
            Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()
        );
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 23, 0, 0).unwrap();
        assert_eq!(
            schedule.next_expiry(now),
            Utc.with_ymd_and_hms(2025, 1, 2, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_same_window_shares_expiry() {
        let schedule = RefreshSchedule::new(Duration::hours(1), Duration::zero());
        let a = Utc.with_ymd_and_hms(2025, 1, 1, 10, 1, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 1, 1, 10, 59, 59).unwrap();
        assert_eq!(schedule.next_expiry(a), schedule.next_expiry(b));
    }

    #[test]
    fn test_degenerate_interval_clamped() {
        let schedule = RefreshSchedule::new(Duration::zero(), Duration::seconds(5));
        assert_eq!(schedule.interval(), Duration::seconds(1));
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(schedule.next_expiry(now), now + Duration::seconds(1));
    }
}
