//! Stable document identity.
//!
//! Document ids depend only on the channel and on the thread timestamp or
//! the week bucket, never on chunk or page boundaries. A retried, resumed or
//! split unit therefore always writes to the same document.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
pub const MS_PER_WEEK: i64 = 7 * MS_PER_DAY;

/// A `[start_ms, end_ms)` week window starting Monday 00:00 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeBucket {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeBucket {
    pub fn containing(ts_ms: i64) -> Self {
        let start_ms = week_start_ms(ts_ms);
        Self {
            start_ms,
            end_ms: start_ms + MS_PER_WEEK,
        }
    }

    /// Buckets are keyed by their start.
    pub fn key(&self) -> i64 {
        self.start_ms
    }
}

/// Monday 00:00 UTC of the week containing `ts_ms`.
pub fn week_start_ms(ts_ms: i64) -> i64 {
    let days = ts_ms.div_euclid(MS_PER_DAY);
    // 1970-01-01 was a Thursday, three days after a Monday.
    let since_monday = (days + 3).rem_euclid(7);
    (days - since_monday) * MS_PER_DAY
}

/// Parse a platform timestamp (`"1700000000.000100"`) into milliseconds.
pub fn ts_to_ms(ts: &str) -> Option<i64> {
    let (secs, frac) = split_ts(ts)?;
    Some(secs * 1000 + frac / 1000)
}

/// Milliseconds to a platform timestamp, for history range bounds.
pub fn ms_to_ts(ms: i64) -> String {
    format!("{}.{:06}", ms.div_euclid(1000), ms.rem_euclid(1000) * 1000)
}

/// Last platform timestamp inside millisecond `ms`, for an inclusive
/// upper bound. Timestamps carry microseconds, so `ms_to_ts` would cut off
/// the final 999 of them.
pub fn ms_to_latest_ts(ms: i64) -> String {
    format!("{}.{:06}", ms.div_euclid(1000), ms.rem_euclid(1000) * 1000 + 999)
}

/// Total order over platform timestamps: (seconds, microseconds).
pub fn ts_sort_key(ts: &str) -> (i64, i64) {
    split_ts(ts).unwrap_or((i64::MAX, i64::MAX))
}

pub fn ts_to_datetime(ts: &str) -> Option<DateTime<Utc>> {
    let ms = ts_to_ms(ts)?;
    Utc.timestamp_millis_opt(ms).single()
}

fn split_ts(ts: &str) -> Option<(i64, i64)> {
    let mut parts = ts.trim().splitn(2, '.');
    let secs = parts.next()?.parse::<i64>().ok()?;
    let frac = match parts.next() {
        Some(raw) if !raw.is_empty() => {
            let digits: String = raw.chars().take(6).collect();
            let padded = format!("{:0<6}", digits);
            padded.parse::<i64>().ok()?
        }
        _ => 0,
    };
    Some((secs, frac))
}

pub(crate) fn date_of(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ms.to_string())
}

pub fn channel_folder_id(channel_id: &str) -> String {
    format!("slack-channel-{}", channel_id)
}

pub fn thread_document_id(channel_id: &str, thread_ts: &str) -> String {
    format!("slack-{}-thread-{}", channel_id, thread_ts)
}

pub fn bucket_document_id(channel_id: &str, bucket: &TimeBucket) -> String {
    format!(
        "slack-{}-messages-{}-{}",
        channel_id,
        date_of(bucket.start_ms),
        date_of(bucket.end_ms)
    )
}

/// What a document id points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
    ChannelFolder {
        channel_id: String,
    },
    Thread {
        channel_id: String,
        thread_ts: String,
    },
    Messages {
        channel_id: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

pub fn parse_document_id(document_id: &str) -> Option<DocumentRef> {
    if let Some(channel_id) = document_id.strip_prefix("slack-channel-") {
        return Some(DocumentRef::ChannelFolder {
            channel_id: channel_id.to_string(),
        });
    }

    let rest = document_id.strip_prefix("slack-")?;
    if let Some((channel_id, thread_ts)) = rest.split_once("-thread-") {
        return Some(DocumentRef::Thread {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
        });
    }

    let (channel_id, dates) = rest.split_once("-messages-")?;
    if dates.len() != 21 {
        return None;
    }
    let start = NaiveDate::parse_from_str(dates.get(..10)?, "%Y-%m-%d").ok()?;
    let end = NaiveDate::parse_from_str(dates.get(11..)?, "%Y-%m-%d").ok()?;
    Some(DocumentRef::Messages {
        channel_id: channel_id.to_string(),
        start,
        end,
    })
}
