use chrono::{DateTime, Utc};

const MINUTES_IN_DAY: i64 = 1_440;
const MINUTES_IN_MONTH: i64 = 43_200;
const MINUTES_IN_TWO_MONTHS: i64 = 86_400;

/// Distance between `at` and `now` in words, suffixed with "ago" or
/// prefixed with "in" depending on direction.
pub fn format_distance(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(at);
    let words = distance_in_words(delta.num_seconds().unsigned_abs() as i64);
    if delta.num_seconds() < 0 {
        format!("in {words}")
    } else {
        format!("{words} ago")
    }
}

fn distance_in_words(seconds: i64) -> String {
    let minutes = (seconds as f64 / 60.0).round() as i64;

    if minutes < 1 {
        return "less than a minute".to_string();
    }
    if minutes < 45 {
        return plural(minutes, "minute");
    }
    if minutes < 90 {
        return "about 1 hour".to_string();
    }
    if minutes < MINUTES_IN_DAY {
        let hours = (minutes as f64 / 60.0).round() as i64;
        return format!("about {}", plural(hours, "hour"));
    }
    // 1.75 days
    if minutes < 2_520 {
        return "1 day".to_string();
    }
    if minutes < MINUTES_IN_MONTH {
        let days = (minutes as f64 / MINUTES_IN_DAY as f64).round() as i64;
        return plural(days, "day");
    }
    if minutes < MINUTES_IN_TWO_MONTHS {
        let months = (minutes as f64 / MINUTES_IN_MONTH as f64).round() as i64;
        return format!("about {}", plural(months, "month"));
    }

    // Whole months pick the bucket; the label uses the nearest month.
    let months = minutes / MINUTES_IN_MONTH;
    if months < 12 {
        let nearest = (minutes as f64 / MINUTES_IN_MONTH as f64).round() as i64;
        return plural(nearest, "month");
    }

    let years = months / 12;
    let remainder = months % 12;
    if remainder < 3 {
        format!("about {}", plural(years, "year"))
    } else if remainder < 9 {
        format!("over {}", plural(years, "year"))
    } else {
        format!("almost {}", plural(years + 1, "year"))
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
