use anyhow::{Context, Result};
use chrono::NaiveTime;

use pinbot_cron::planner::fire_points;
use pinbot_types::Interval;

pub fn parse_interval(start: &str, end: &str, rate: i32) -> Result<Interval> {
    let start = NaiveTime::parse_from_str(start, "%H:%M")
        .with_context(|| format!("invalid start time {start:?}, expected HH:MM"))?;
    let end = NaiveTime::parse_from_str(end, "%H:%M")
        .with_context(|| format!("invalid end time {end:?}, expected HH:MM"))?;
    Ok(Interval::new(start, end, rate))
}

/// Print one random draw of the interval's fire times.
pub fn print_plan(start: &str, end: &str, rate: i32) -> Result<()> {
    let interval = parse_interval(start, end, rate)?;
    let points = fire_points(&interval, &mut rand::thread_rng())?;
    println!(
        "{} fire times between {} and {}:",
        points.len(),
        interval.start.format("%H:%M"),
        interval.end.format("%H:%M")
    );
    for point in points {
        println!("  {}", point.format("%H:%M"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        let interval = parse_interval("08:30", "11:00", 5).unwrap();
        assert_eq!(interval.duration_minutes(), 150);
        assert_eq!(interval.actions_per_hour, 5);
    }

    #[test]
    fn test_parse_interval_rejects_bad_time() {
        assert!(parse_interval("8h", "11:00", 5).is_err());
    }
}
