//! Interval planning: fire points inside a window, and the next window to activate.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;

use pinbot_types::Interval;

/// A declared interval that cannot be planned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("actions per hour must be positive, got {0}")]
    NonPositiveRate(i32),
    #[error("interval {start}-{end} does not end after it starts")]
    EmptyWindow { start: NaiveTime, end: NaiveTime },
}

/// Reject intervals the planner cannot place fire times in.
pub fn validate(interval: &Interval) -> Result<(), PlanError> {
    if interval.actions_per_hour <= 0 {
        return Err(PlanError::NonPositiveRate(interval.actions_per_hour));
    }
    if interval.end <= interval.start {
        return Err(PlanError::EmptyWindow {
            start: interval.start,
            end: interval.end,
        });
    }
    Ok(())
}

/// Jittered fire points for one interval, in ascending order.
///
/// The window is split into `actions_per_hour` slots of `avg` minutes; each
/// slot fires once at a uniformly random minute inside it. Points past the
/// window end are dropped, so the result never exceeds the rate.
pub fn fire_points<R: Rng + ?Sized>(
    interval: &Interval,
    rng: &mut R,
) -> Result<Vec<NaiveTime>, PlanError> {
    validate(interval)?;

    let count = i64::from(interval.actions_per_hour);
    let avg = interval.duration_minutes() / count;
    let mut points = Vec::with_capacity(count as usize);

    for i in 0..count {
        let jitter = if avg > 0 { rng.gen_range(0..avg) } else { 0 };
        let (fire, wrapped) = interval
            .start
            .overflowing_add_signed(Duration::minutes(i * avg + jitter));
        if wrapped == 0 && fire <= interval.end {
            points.push(fire);
        }
    }
    Ok(points)
}

/// When the agent should next become active, and under which interval.
///
/// Inside an interval: now. Otherwise the earliest interval starting later
/// today; otherwise the earliest interval of the next day. `None` when the
/// agent declares no intervals.
pub fn next_activation(
    intervals: &[Interval],
    now: NaiveDateTime,
) -> Option<(NaiveDateTime, &Interval)> {
    let time = now.time();
    if let Some(current) = intervals.iter().find(|i| i.covers(time)) {
        return Some((now, current));
    }

    let mut sorted: Vec<&Interval> = intervals.iter().collect();
    sorted.sort_by_key(|i| i.start);

    if let Some(later) = sorted.iter().copied().find(|i| i.start > time) {
        return Some((now.date().and_time(later.start), later));
    }

    let first = *sorted.first()?;
    let tomorrow = now.date().succ_opt()?;
    Some((tomorrow.and_time(first.start), first))
}

/// End of `interval` on `date`.
pub fn deactivation(date: NaiveDate, interval: &Interval) -> NaiveDateTime {
    date.and_time(interval.end)
}

/// Concrete local fire times for the next active day.
///
/// Every interval is validated first; one bad interval fails the whole plan
/// so a reschedule never registers a partial day. Times are placed on the
/// next-activation date and kept only when strictly after `now` and strictly
/// before their interval's deactivation.
pub fn plan_day<R: Rng + ?Sized>(
    intervals: &[Interval],
    now: NaiveDateTime,
    rng: &mut R,
) -> Result<Vec<NaiveDateTime>, PlanError> {
    for interval in intervals {
        validate(interval)?;
    }
    let Some((activation, _)) = next_activation(intervals, now) else {
        return Ok(Vec::new());
    };
    let date = activation.date();

    let mut plan = Vec::new();
    for interval in intervals {
        let end = deactivation(date, interval);
        for point in fire_points(interval, rng)? {
            let at = date.and_time(point);
            if at > now && at < end {
                plan.push(at);
            }
        }
    }
    plan.sort();
    plan.dedup();
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, d)
            .unwrap()
            .and_time(hm(h, m))
    }

    #[test]
    fn test_fire_points_one_hour_rate_four() {
        let interval = Interval::new(hm(9, 0), hm(10, 0), 4);
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let points = fire_points(&interval, &mut rng).unwrap();
            assert_eq!(points.len(), 4);
            for (i, p) in points.iter().enumerate() {
                let slot_start = hm(9, 0) + Duration::minutes(15 * i as i64);
                assert!(*p >= slot_start && *p < slot_start + Duration::minutes(15));
            }
        }
    }

    #[test]
    fn test_fire_points_stay_inside_window() {
        let cases = [
            Interval::new(hm(0, 0), hm(23, 59), 7),
            Interval::new(hm(13, 10), hm(13, 17), 3),
            Interval::new(hm(22, 0), hm(23, 0), 60),
            Interval::new(hm(8, 0), hm(8, 5), 20),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        for interval in &cases {
            let points = fire_points(interval, &mut rng).unwrap();
            assert!(points.len() <= interval.actions_per_hour as usize);
            for p in points {
                assert!(p >= interval.start && p <= interval.end);
            }
        }
    }

    #[test]
    fn test_rate_above_window_minutes_has_no_jitter() {
        let interval = Interval::new(hm(8, 0), hm(8, 5), 20);
        let mut rng = StdRng::seed_from_u64(1);
        let points = fire_points(&interval, &mut rng).unwrap();
        assert_eq!(points.len(), 20);
        assert!(points.iter().all(|p| *p == hm(8, 0)));
    }

    #[test]
    fn test_non_positive_rate_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let zero = Interval::new(hm(9, 0), hm(10, 0), 0);
        assert_eq!(
            fire_points(&zero, &mut rng),
            Err(PlanError::NonPositiveRate(0))
        );
        let negative = Interval::new(hm(9, 0), hm(10, 0), -3);
        assert!(fire_points(&negative, &mut rng).is_err());
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let inverted = Interval::new(hm(10, 0), hm(9, 0), 2);
        assert!(matches!(
            fire_points(&inverted, &mut rng),
            Err(PlanError::EmptyWindow { .. })
        ));
    }

    #[test]
    fn test_next_activation_inside_interval_is_now() {
        let intervals = vec![Interval::new(hm(9, 0), hm(10, 0), 4)];
        let now = at(3, 9, 20);
        let (activation, chosen) = next_activation(&intervals, now).unwrap();
        assert_eq!(activation, now);
        assert_eq!(chosen.start, hm(9, 0));
    }

    #[test]
    fn test_next_activation_picks_earliest_later_today() {
        let intervals = vec![
            Interval::new(hm(20, 0), hm(21, 0), 1),
            Interval::new(hm(14, 0), hm(15, 0), 1),
            Interval::new(hm(9, 0), hm(10, 0), 1),
        ];
        let (activation, chosen) = next_activation(&intervals, at(3, 11, 0)).unwrap();
        assert_eq!(activation, at(3, 14, 0));
        assert_eq!(chosen.end, hm(15, 0));
    }

    #[test]
    fn test_next_activation_rolls_to_tomorrow() {
        let intervals = vec![
            Interval::new(hm(14, 0), hm(15, 0), 1),
            Interval::new(hm(9, 0), hm(10, 0), 1),
        ];
        let (activation, chosen) = next_activation(&intervals, at(3, 22, 30)).unwrap();
        assert_eq!(activation, at(4, 9, 0));
        assert_eq!(deactivation(activation.date(), chosen), at(4, 10, 0));
    }

    #[test]
    fn test_next_activation_without_intervals() {
        assert!(next_activation(&[], at(3, 12, 0)).is_none());
    }

    #[test]
    fn test_plan_day_skips_elapsed_points() {
        let intervals = vec![Interval::new(hm(9, 0), hm(10, 0), 4)];
        let now = at(3, 9, 30);
        let mut rng = StdRng::seed_from_u64(3);
        let plan = plan_day(&intervals, now, &mut rng).unwrap();
        assert!(plan.len() <= 2);
        assert!(plan.iter().all(|t| *t > now && *t < at(3, 10, 0)));
        assert!(plan.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_plan_day_after_last_interval_plans_tomorrow() {
        let intervals = vec![
            Interval::new(hm(9, 0), hm(10, 0), 4),
            Interval::new(hm(18, 0), hm(19, 0), 2),
        ];
        let mut rng = StdRng::seed_from_u64(9);
        let plan = plan_day(&intervals, at(3, 23, 0), &mut rng).unwrap();
        assert_eq!(plan.len(), 6);
        assert!(plan.iter().all(|t| t.date() == at(4, 0, 0).date()));
    }

    #[test]
    fn test_plan_day_fails_on_any_invalid_interval() {
        let intervals = vec![
            Interval::new(hm(9, 0), hm(10, 0), 4),
            Interval::new(hm(18, 0), hm(19, 0), 0),
        ];
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(
            plan_day(&intervals, at(3, 8, 0), &mut rng),
            Err(PlanError::NonPositiveRate(0))
        );
    }
}
