use chrono::{DateTime, Utc};

pub fn time_str(sec: f64) -> String {
    let ms = sec * 1000f64;
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// Formats a chunk time as an ISO 8601 UTC timestamp with microseconds.
pub fn utc_str(seconds: i64, micros: i64) -> String {
    let total = seconds * 1_000_000 + micros;
    match DateTime::<Utc>::from_timestamp_micros(total) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        None => format!("{seconds}s + {micros}us"),
    }
}

#[test]
fn formats() {
    assert_eq!(time_str(3723.25), "01:02:03.250");
    assert_eq!(utc_str(1_700_000_000, 20833), "2023-11-14T22:13:20.020833Z");
}
