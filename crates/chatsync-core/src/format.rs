//! Message-to-document rendering.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use chatsync_ingest::{Channel, DocumentSection, Folder};

use crate::identity::{channel_folder_id, date_of, ts_sort_key, ts_to_datetime, TimeBucket};
use crate::providers::Message;

pub const THREAD_MIME_TYPE: &str = "application/vnd.chatsync.slack.thread";
pub const MESSAGES_MIME_TYPE: &str = "application/vnd.chatsync.slack.messages";
pub const CHANNEL_MIME_TYPE: &str = "application/vnd.chatsync.slack.channel";

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@([A-Z0-9]+)(?:\|[^>]*)?>").expect("mention pattern is valid"));

/// Replace `<@U123>` mentions with `@Name`.
pub fn clean_text(text: &str, names: &HashMap<String, String>) -> String {
    MENTION_RE
        .replace_all(text, |caps: &regex::Captures| {
            let user_id = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let name = names
                .get(user_id)
                .cloned()
                .unwrap_or_else(|| user_id.to_string());
            format!("@{}", name)
        })
        .to_string()
}

pub fn author_name(message: &Message, names: &HashMap<String, String>) -> String {
    match (message.user.as_ref(), message.bot_id.as_ref()) {
        (Some(user), _) => names.get(user).cloned().unwrap_or_else(|| user.clone()),
        (None, Some(bot_id)) => bot_id.clone(),
        (None, None) => "Unknown".to_string(),
    }
}

pub fn section_for(message: &Message, names: &HashMap<String, String>) -> DocumentSection {
    let when = ts_to_datetime(&message.ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| message.ts.clone());
    DocumentSection {
        message_ts: message.ts.clone(),
        prefix: format!(">> @{} [{}]:", author_name(message, names), when),
        content: clean_text(message.text.as_deref().unwrap_or(""), names),
    }
}

/// Sections in chronological order, whatever order `messages` came in.
pub fn sections_from_messages(
    messages: &[Message],
    names: &HashMap<String, String>,
) -> Vec<DocumentSection> {
    let mut sorted: Vec<&Message> = messages.iter().collect();
    sorted.sort_by_key(|m| ts_sort_key(&m.ts));
    sorted.into_iter().map(|m| section_for(m, names)).collect()
}

/// Union of two section lists keyed by message timestamp; `incoming` wins.
pub fn merge_sections(
    existing: Vec<DocumentSection>,
    incoming: Vec<DocumentSection>,
) -> Vec<DocumentSection> {
    let mut by_ts = BTreeMap::new();
    for section in existing.into_iter().chain(incoming) {
        by_ts.insert((ts_sort_key(&section.message_ts), section.message_ts.clone()), section);
    }
    by_ts.into_values().collect()
}

pub fn document_tags(
    channel_id: &str,
    channel_name: &str,
    created_at_ms: Option<i64>,
    title: &str,
) -> Vec<String> {
    let mut tags = vec![
        format!("channelId:{}", channel_id),
        format!("channelName:{}", channel_name),
    ];
    if let Some(ms) = created_at_ms {
        tags.push(format!("createdAt:{}", ms));
    }
    tags.push(format!("title:{}", title));
    tags
}

pub fn thread_title(channel_name: &str, thread_ts: &str) -> String {
    let when = ts_to_datetime(thread_ts)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| thread_ts.to_string());
    format!("#{} thread {}", channel_name, when)
}

pub fn bucket_title(channel_name: &str, bucket: &TimeBucket) -> String {
    format!(
        "#{} {} - {}",
        channel_name,
        date_of(bucket.start_ms),
        date_of(bucket.end_ms)
    )
}

pub fn channel_folder(channel: &Channel) -> Folder {
    Folder {
        folder_id: channel_folder_id(&channel.channel_id),
        title: format!("#{}", channel.name),
        parent_id: None,
        mime_type: CHANNEL_MIME_TYPE.to_string(),
    }
}
