//! Ten-minute accounting buckets.
//!
//! Buckets are anchored to the top of each wall-clock hour (`09:00-09:09`,
//! `09:10-09:19`, ...). They are not a rolling window from the previous ping.

use chrono::{Datelike, NaiveDateTime, Timelike};

/// Width of one bucket in minutes.
pub const BUCKET_WIDTH_MINUTES: u32 = 10;

/// Returns true when both timestamps fall into the same bucket.
pub fn same_bucket(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    // ---
    a.year() == b.year()
        && a.month() == b.month()
        && a.day() == b.day()
        && a.hour() == b.hour()
        && a.minute() / BUCKET_WIDTH_MINUTES == b.minute() / BUCKET_WIDTH_MINUTES
}

/// Decides whether a ping at `now` opens a new bucket for a user.
///
/// A freshly created user always opens one. An existing user without a
/// stored last ping is treated the same way.
pub fn opens_new_bucket(just_created: bool, previous_ping: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    // ---
    match previous_ping {
        _ if just_created => true,
        Some(previous) => !same_bucket(now, previous),
        None => true,
    }
}
