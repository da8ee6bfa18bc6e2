use chrono::{DateTime, Duration, FixedOffset, TimeZone, Timelike};
use crate::config::{ConfigError, ReportTrigger, ScheduleConfig};

/// Interval length, window around each boundary, and the timezone boundaries live in.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentPolicy {
    interval_secs: i64,
    before_secs: i64,
    after_secs: i64,
    offset: FixedOffset,
}

impl AlignmentPolicy {
    pub fn new(interval_minutes: u32, before_minutes: u32, after_minutes: u32, offset: FixedOffset) -> Self {
        Self {
            interval_secs: i64::from(interval_minutes) * 60,
            before_secs: i64::from(before_minutes) * 60,
            after_secs: i64::from(after_minutes) * 60,
            offset,
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The slot whose window contains `now`, with that slot's boundary in local time.
    pub fn slot_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<(Slot, DateTime<FixedOffset>)> {
        let local = now.with_timezone(&self.offset);
        let local = local.with_nanosecond(0).unwrap_or(local);
        // seconds on the local wall clock, so boundaries fall on local hours
        let wall = local.timestamp() + i64::from(self.offset.local_minus_utc());

        let index = (wall + self.before_secs).div_euclid(self.interval_secs);
        let into_slot = wall - index * self.interval_secs;
        if into_slot >= self.after_secs {
            return None;
        }

        Some((Slot(index), local - Duration::seconds(into_slot)))
    }
}

/// Index of an aligned boundary since the epoch, in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Idle,
    SampleDue { slot: Slot, boundary: DateTime<FixedOffset> },
    ReportDue { slot: Slot, boundary: DateTime<FixedOffset> },
}

impl Decision {
    pub fn slot(&self) -> Option<Slot> {
        match self {
            Decision::Idle => None,
            Decision::SampleDue { slot, .. } | Decision::ReportDue { slot, .. } => Some(*slot),
        }
    }

    pub fn boundary(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Decision::Idle => None,
            Decision::SampleDue { boundary, .. } | Decision::ReportDue { boundary, .. } => Some(*boundary),
        }
    }

    pub fn report_due(&self) -> bool {
        matches!(self, Decision::ReportDue { .. })
    }
}

/// Decides from wall-clock time whether to sample and whether to report.
///
/// The only state is the last slot that produced a stored row; a slot never
/// fires twice however many ticks land in its window, and a failed cycle
/// leaves the slot open for the next tick.
#[derive(Debug, Clone)]
pub struct Scheduler {
    policy: AlignmentPolicy,
    report_trigger: ReportTrigger,
    last_fired: Option<Slot>,
}

impl Scheduler {
    pub fn new(policy: AlignmentPolicy, report_trigger: ReportTrigger) -> Self {
        Self {
            policy,
            report_trigger,
            last_fired: None,
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        let offset = crate::config::parse_utc_offset(&config.utc_offset)?;
        let policy = AlignmentPolicy::new(
            config.interval_minutes,
            config.window_before_minutes,
            config.window_after_minutes,
            offset,
        );
        Ok(Self::new(policy, config.report_trigger))
    }

    pub fn policy(&self) -> &AlignmentPolicy {
        &self.policy
    }

    pub fn last_fired(&self) -> Option<Slot> {
        self.last_fired
    }

    pub fn poll<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Decision {
        let Some((slot, boundary)) = self.policy.slot_at(now) else {
            return Decision::Idle;
        };
        if self.last_fired.is_some_and(|last| last >= slot) {
            return Decision::Idle;
        }

        if self.report_matches(&boundary) {
            Decision::ReportDue { slot, boundary }
        } else {
            Decision::SampleDue { slot, boundary }
        }
    }

    /// Record that `slot` produced a stored row.
    pub fn mark_fired(&mut self, slot: Slot) {
        if self.last_fired.map_or(true, |last| slot > last) {
            self.last_fired = Some(slot);
        }
    }

    /// Treat the slot containing a previously stored row as already fired.
    pub fn seed_from<Tz: TimeZone>(&mut self, captured_at: &DateTime<Tz>) {
        if let Some((slot, _)) = self.policy.slot_at(captured_at) {
            self.mark_fired(slot);
        }
    }

    fn report_matches(&self, boundary: &DateTime<FixedOffset>) -> bool {
        match self.report_trigger {
            ReportTrigger::EverySample => true,
            ReportTrigger::Hourly => boundary.minute() == 0,
            ReportTrigger::Daily { hour } => boundary.hour() == hour && boundary.minute() == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, h, m, s).unwrap()
    }

    /// Walk a simulated clock from `start` for `span`, firing whenever due.
    fn simulate(scheduler: &mut Scheduler, start: DateTime<Utc>, span: Duration, ticks: &[i64]) -> Vec<Slot> {
        let mut fired = Vec::new();
        let mut now = start;
        let mut i = 0;
        while now < start + span {
            if let Some(slot) = scheduler.poll(&now).slot() {
                scheduler.mark_fired(slot);
                fired.push(slot);
            }
            now += Duration::seconds(ticks[i % ticks.len()]);
            i += 1;
        }
        fired
    }

    #[test]
    fn test_hourly_window_fires_once_per_hour() {
        let mut scheduler = Scheduler::new(AlignmentPolicy::new(60, 3, 3, utc()), ReportTrigger::Hourly);

        // uneven ticks, all shorter than the 6-minute window
        let fired = simulate(&mut scheduler, at(0, 30, 0), Duration::hours(24), &[20, 7, 33, 19, 61, 2]);

        assert_eq!(fired.len(), 24);
        assert!(fired.windows(2).all(|w| w[1].0 == w[0].0 + 1));
    }

    #[test]
    fn test_five_minute_interval_fires_once_per_period() {
        let mut scheduler = Scheduler::new(AlignmentPolicy::new(5, 0, 1, utc()), ReportTrigger::Hourly);

        let fired = simulate(&mut scheduler, at(6, 0, 0), Duration::hours(3), &[20, 13, 27]);

        assert_eq!(fired.len(), 36);
    }

    #[test]
    fn test_outside_window_is_idle() {
        let scheduler = Scheduler::new(AlignmentPolicy::new(60, 3, 3, utc()), ReportTrigger::Hourly);

        assert_eq!(scheduler.poll(&at(10, 30, 0)), Decision::Idle);
        assert_eq!(scheduler.poll(&at(10, 3, 0)), Decision::Idle);
        assert_eq!(scheduler.poll(&at(10, 56, 59)), Decision::Idle);
        assert!(scheduler.poll(&at(10, 57, 0)).slot().is_some());
        assert!(scheduler.poll(&at(10, 2, 59)).slot().is_some());
    }

    #[test]
    fn test_window_before_boundary_belongs_to_next_hour() {
        let scheduler = Scheduler::new(AlignmentPolicy::new(60, 3, 3, utc()), ReportTrigger::Hourly);

        let early = scheduler.poll(&at(10, 58, 30));
        let late = scheduler.poll(&at(11, 1, 0));
        assert_eq!(early.slot(), late.slot());
        assert_eq!(early.boundary(), late.boundary());
        match early {
            Decision::ReportDue { boundary, .. } => assert_eq!(boundary, at(11, 0, 0)),
            other => panic!("expected report, got {:?}", other),
        }
    }

    #[test]
    fn test_unmarked_slot_is_retried() {
        let mut scheduler = Scheduler::new(AlignmentPolicy::new(60, 0, 2, utc()), ReportTrigger::Hourly);

        // first tick fails to store; no mark
        let first = scheduler.poll(&at(9, 0, 5));
        assert!(first.slot().is_some());

        let retry = scheduler.poll(&at(9, 0, 25));
        assert_eq!(retry.slot(), first.slot());
        scheduler.mark_fired(retry.slot().unwrap());

        assert_eq!(scheduler.poll(&at(9, 0, 45)), Decision::Idle);
        assert_eq!(scheduler.poll(&at(9, 1, 59)), Decision::Idle);
    }

    #[test]
    fn test_clock_going_backwards_does_not_refire() {
        let mut scheduler = Scheduler::new(AlignmentPolicy::new(60, 0, 5, utc()), ReportTrigger::Hourly);
        let slot = scheduler.poll(&at(12, 1, 0)).slot().unwrap();
        scheduler.mark_fired(slot);

        assert_eq!(scheduler.poll(&at(11, 0, 30)), Decision::Idle);
        scheduler.mark_fired(Slot(slot.0 - 1));
        assert_eq!(scheduler.last_fired(), Some(slot));
    }

    #[test]
    fn test_report_trigger_modes() {
        let policy = AlignmentPolicy::new(15, 0, 1, utc());

        let hourly = Scheduler::new(policy, ReportTrigger::Hourly);
        assert!(hourly.poll(&at(3, 0, 10)).report_due());
        assert!(!hourly.poll(&at(3, 15, 10)).report_due());
        assert!(hourly.poll(&at(3, 15, 10)).slot().is_some());

        let daily = Scheduler::new(policy, ReportTrigger::Daily { hour: 0 });
        assert!(daily.poll(&at(0, 0, 10)).report_due());
        assert!(!daily.poll(&at(3, 0, 10)).report_due());

        let every = Scheduler::new(policy, ReportTrigger::EverySample);
        assert!(every.poll(&at(3, 45, 0)).report_due());
    }

    #[test]
    fn test_boundaries_follow_configured_offset() {
        let plus8 = FixedOffset::east_opt(8 * 3600).unwrap();
        let scheduler = Scheduler::new(
            AlignmentPolicy::new(60, 3, 3, plus8),
            ReportTrigger::Daily { hour: 0 },
        );

        // 15:58 UTC is 23:58 at +08:00, in the window before local midnight
        match scheduler.poll(&at(15, 58, 0)) {
            Decision::ReportDue { boundary, .. } => {
                assert_eq!(boundary.hour(), 0);
                assert_eq!(boundary.offset().local_minus_utc(), 8 * 3600);
                assert_eq!(boundary.with_timezone(&Utc), at(16, 0, 0));
            }
            other => panic!("expected daily report, got {:?}", other),
        }

        assert!(!scheduler.poll(&at(0, 1, 0)).report_due());
    }

    #[test]
    fn test_half_hour_offset_aligns_to_local_hours() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let scheduler = Scheduler::new(AlignmentPolicy::new(60, 0, 1, ist), ReportTrigger::Hourly);

        // 04:30 UTC is 10:00 local
        assert!(scheduler.poll(&at(4, 30, 20)).report_due());
        assert_eq!(scheduler.poll(&at(5, 0, 20)), Decision::Idle);
    }

    #[test]
    fn test_seed_from_previous_row() {
        let mut scheduler = Scheduler::new(AlignmentPolicy::new(60, 3, 3, utc()), ReportTrigger::Hourly);
        scheduler.seed_from(&at(8, 59, 0));

        assert_eq!(scheduler.poll(&at(9, 1, 0)), Decision::Idle);
        assert!(scheduler.poll(&at(10, 0, 0)).slot().is_some());

        // a row outside any window seeds nothing
        let mut fresh = Scheduler::new(AlignmentPolicy::new(60, 3, 3, utc()), ReportTrigger::Hourly);
        fresh.seed_from(&at(8, 30, 0));
        assert_eq!(fresh.last_fired(), None);
    }
}
