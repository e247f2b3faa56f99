use chrono::{DateTime, Local, TimeZone};

/// Derive a replacement storage key after the server reports a name
/// conflict.
///
/// The replacement is the original key prefixed with a 14-digit calendar
/// timestamp (`YYYYMMDDHHMMSS`, second granularity). Any non-alphanumeric
/// character a timestamp format could introduce is stripped, so the
/// prefix is always pure digits. Pure function of its inputs; callers
/// supply the clock.
pub fn resolve<Tz: TimeZone>(original_key: &str, now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp: String = now
        .format("%Y%m%d%H%M%S")
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{}{}", stamp, original_key)
}

/// `resolve` against the local wall clock.
pub fn resolve_now(original_key: &str) -> String {
    resolve(original_key, Local::now())
}
