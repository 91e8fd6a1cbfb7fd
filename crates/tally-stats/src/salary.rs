use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tally_types::{RateSettings, ScheduleRecord};

const NIGHT_STARTS: u32 = 22;
const NIGHT_ENDS: u32 = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HourSplit {
    pub day_hours: f64,
    pub night_hours: f64,
}

impl HourSplit {
    pub fn total(&self) -> f64 {
        self.day_hours + self.night_hours
    }
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

fn ceil_div(a: i64, b: i64) -> i64 {
    a.div_euclid(b) + i64::from(a.rem_euclid(b) != 0)
}

/// Split `[start, end)` into day and night hours.
///
/// Samples the interval once per minute from `start`; a sample counts as a night
/// minute when its local hour is in `[22, 24) ∪ [0, 6)`. Samples are counted per
/// local night window rather than stepped through, so long intervals stay cheap.
/// Day hours are the remainder of the exact duration. An empty or inverted
/// interval yields zero.
pub fn split_hours(start: DateTime<Utc>, end: DateTime<Utc>, offset: FixedOffset) -> HourSplit {
    if end <= start {
        return HourSplit::default();
    }
    let start_ms = start.timestamp_millis();
    let end_ms = end.timestamp_millis();
    let samples = ceil_div(end_ms - start_ms, MINUTE_MS);
    let offset_ms = i64::from(offset.local_minus_utc()) * 1_000;

    // Night window of local day `d` runs from d 22:00 to d+1 06:00.
    let first_day = (start_ms + offset_ms).div_euclid(DAY_MS) - 1;
    let last_day = (end_ms + offset_ms).div_euclid(DAY_MS);
    let mut night_minutes = 0i64;
    for day in first_day..=last_day {
        let window_start = day * DAY_MS + i64::from(NIGHT_STARTS) * HOUR_MS - offset_ms;
        let window_end = window_start + i64::from(24 - NIGHT_STARTS + NIGHT_ENDS) * HOUR_MS;
        let first = ceil_div(window_start - start_ms, MINUTE_MS).max(0);
        let last = ceil_div(window_end - start_ms, MINUTE_MS).min(samples);
        if last > first {
            night_minutes += last - first;
        }
    }

    let total = (end_ms - start_ms) as f64 / HOUR_MS as f64;
    let night_hours = night_minutes as f64 / 60.0;
    HourSplit {
        day_hours: total - night_hours,
        night_hours,
    }
}

/// Role multiplier from the title tag: `(OC)`, then `(AS)`, then `(Sup`, else 1.
pub fn role_multiplier(title: &str, rates: &RateSettings) -> f64 {
    if title.contains("(OC)") {
        rates.oc_multiplier
    } else if title.contains("(AS)") {
        rates.as_multiplier
    } else if title.contains("(Sup") {
        rates.sup_multiplier
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalaryReport {
    pub total_hours: f64,
    pub night_hours: f64,
    pub day_hours: f64,
    /// Zero unless an hourly rate is configured.
    pub total_pay: f64,
    /// Number of shifts counted.
    pub shifts: usize,
}

impl SalaryReport {
    /// Pay converted at `exchange_rate`.
    pub fn converted(&self, exchange_rate: f64) -> f64 {
        self.total_pay * exchange_rate
    }
}

/// Hours and pay over every shift of `person` in `shifts`.
///
/// Shifts whose times do not parse are skipped.
pub fn salary_for(
    shifts: &[ScheduleRecord],
    person: &str,
    rates: &RateSettings,
    offset: FixedOffset,
) -> SalaryReport {
    let mut report = SalaryReport::default();
    for shift in shifts.iter().filter(|s| s.belongs_to(person)) {
        let (Some(start), Some(end)) = (shift.start(), shift.end()) else {
            continue;
        };
        let split = split_hours(start, end, offset);
        report.shifts += 1;
        report.night_hours += split.night_hours;
        report.day_hours += split.day_hours;
        report.total_hours += split.total();

        if rates.hourly_rate > 0.0 {
            let base = rates.hourly_rate * role_multiplier(&shift.title, rates);
            report.total_pay +=
                split.day_hours * base + split.night_hours * base * rates.night_multiplier;
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn shift(title: &str, starts_at: &str, ends_at: &str) -> ScheduleRecord {
        ScheduleRecord {
            id: "1".to_string(),
            starts_at: starts_at.to_string(),
            ends_at: ends_at.to_string(),
            title: title.to_string(),
            color: None,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn evening_into_night_split() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 2, 2, 0, 0).unwrap();
        let split = split_hours(start, end, utc());
        assert!(approx(split.day_hours, 2.0));
        assert!(approx(split.night_hours, 4.0));
    }

    #[test]
    fn local_offset_shifts_the_night_window() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 2, 2, 0, 0).unwrap();
        let split = split_hours(start, end, FixedOffset::east_opt(2 * 3600).unwrap());
        assert!(approx(split.day_hours, 0.0));
        assert!(approx(split.night_hours, 6.0));
    }

    #[test]
    fn inverted_interval_is_empty() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        assert_eq!(split_hours(t, t, utc()), HourSplit::default());
        assert_eq!(
            split_hours(t, t - Duration::hours(1), utc()),
            HourSplit::default()
        );
    }

    #[test]
    fn multi_day_interval_counts_every_night() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let split = split_hours(start, end, utc());
        // Per day: 00:00-06:00 and 22:00-24:00.
        assert!(approx(split.night_hours, 24.0));
        assert!(approx(split.day_hours, 48.0));

        let split = split_hours(start, end, FixedOffset::east_opt(-5 * 3600).unwrap());
        assert!(approx(split.night_hours, 24.0));
    }

    #[test]
    fn unaligned_start_samples_by_minute() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 21, 59, 30).unwrap();
        // One sample at 21:59:30: day.
        let split = split_hours(start, start + Duration::seconds(60), utc());
        assert!(approx(split.night_hours, 0.0));
        // Samples at 21:59:30 and 22:00:30: one night minute.
        let split = split_hours(start, start + Duration::seconds(90), utc());
        assert!(approx(split.night_hours, 1.0 / 60.0));
        assert!(approx(split.day_hours, 0.5 / 60.0));
        // Morning edge: samples 05:59:30 (night) and 06:00:30 (day).
        let morning = Utc.with_ymd_and_hms(2024, 3, 2, 5, 59, 30).unwrap();
        let split = split_hours(morning, morning + Duration::seconds(90), utc());
        assert!(approx(split.night_hours, 1.0 / 60.0));
    }

    #[test]
    fn far_future_end_returns_promptly() {
        let shifts = vec![shift("Jane Doe (OC)", "2024-03-05T06:00:00", "9999-01-01T00:00:00")];
        let report = salary_for(&shifts, "Jane Doe", &RateSettings::default(), utc());
        assert_eq!(report.shifts, 1);
        assert!(report.night_hours > 0.0);
        assert!(report.day_hours > report.night_hours);
    }

    #[test]
    fn multiplier_precedence() {
        let rates = RateSettings {
            oc_multiplier: 1.5,
            as_multiplier: 1.2,
            sup_multiplier: 1.3,
            ..RateSettings::default()
        };
        assert_eq!(role_multiplier("Jane (OC)", &rates), 1.5);
        assert_eq!(role_multiplier("Jane (AS) (OC)", &rates), 1.5);
        assert_eq!(role_multiplier("Jane (AS)", &rates), 1.2);
        assert_eq!(role_multiplier("Jane (Supervisor)", &rates), 1.3);
        assert_eq!(role_multiplier("Jane (CEM)", &rates), 1.0);
    }

    #[test]
    fn pay_needs_a_rate() {
        let shifts = vec![
            shift("Jane Doe (OC)", "2024-03-01T20:00:00", "2024-03-02T02:00:00"),
            shift("John Roe (OC)", "2024-03-01T08:00:00", "2024-03-01T16:00:00"),
        ];
        let report = salary_for(&shifts, "Jane Doe", &RateSettings::default(), utc());
        assert_eq!(report.shifts, 1);
        assert!(approx(report.total_hours, 6.0));
        assert_eq!(report.total_pay, 0.0);

        let rates = RateSettings {
            hourly_rate: 10.0,
            night_multiplier: 1.5,
            oc_multiplier: 2.0,
            ..RateSettings::default()
        };
        let report = salary_for(&shifts, "Jane Doe", &rates, utc());
        // 2h * 10 * 2 + 4h * 10 * 2 * 1.5
        assert!(approx(report.total_pay, 160.0));
        assert!(approx(report.converted(41.0), 6_560.0));
    }
}
