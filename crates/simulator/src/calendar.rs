//! D-1 calendar helpers.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rand::Rng;

use salesim_core::TimeWindow;

const SECONDS_PER_DAY: i64 = 86_400;

/// The day before `today`: the default target of a batch run.
pub fn d_minus_one(today: NaiveDate) -> NaiveDate {
    today.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN)
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// `[date 00:00:00, date 23:59:59]`.
pub fn day_window(date: NaiveDate) -> TimeWindow {
    let start = start_of_day(date);
    TimeWindow::new(start, start + TimeDelta::seconds(SECONDS_PER_DAY - 1))
}

/// Uniform whole-second instant within `date`.
pub fn random_timestamp<R: Rng>(date: NaiveDate, rng: &mut R) -> NaiveDateTime {
    start_of_day(date) + TimeDelta::seconds(rng.random_range(0..SECONDS_PER_DAY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn d_minus_one_crosses_month_and_year_boundaries() {
        assert_eq!(d_minus_one(date(2026, 3, 1)), date(2026, 2, 28));
        assert_eq!(d_minus_one(date(2026, 1, 1)), date(2025, 12, 31));
        assert_eq!(d_minus_one(date(2024, 3, 1)), date(2024, 2, 29));
    }

    #[test]
    fn day_window_spans_the_whole_day() {
        let window = day_window(date(2026, 5, 17));
        assert_eq!(window.from, date(2026, 5, 17).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(window.to, date(2026, 5, 17).and_hms_opt(23, 59, 59).unwrap());
        assert!(!window.contains(date(2026, 5, 18).and_hms_opt(0, 0, 0).unwrap()));
    }

    #[test]
    fn random_timestamps_stay_within_the_day() {
        let mut rng = StdRng::seed_from_u64(7);
        let day = date(2026, 5, 17);
        let window = day_window(day);
        for _ in 0..1_000 {
            assert!(window.contains(random_timestamp(day, &mut rng)));
        }
    }

    #[test]
    fn seeded_timestamps_are_reproducible() {
        let day = date(2026, 5, 17);
        let a: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..5).map(|_| random_timestamp(day, &mut rng)).collect()
        };
        let b: Vec<_> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..5).map(|_| random_timestamp(day, &mut rng)).collect()
        };
        assert_eq!(a, b);
    }
}
