use chrono::{Duration, NaiveDate};

/// This is the standard way of converting a date to a history key in timetab.
pub fn date_to_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Formats seconds as `1h2m3s`, dropping leading zero units.
pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}
