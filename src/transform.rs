// src/transform.rs
//
// Second half of the pipeline: persisted source records become
// IdeaInspiration entries. The transformer is pure and reads only the
// record row plus its stored metrics blob; a record that fails here is
// skipped by the batch path, never a batch abort.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::normalize::SourceFamily;
use crate::store::SourceRecord;

/// Descriptions are clipped to this many characters; `content` keeps
/// the full text.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

const VIDEO_HOSTS: [&str; 3] = ["youtube.com", "youtu.be", "vimeo.com"];

/// Broad content class of an idea's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Video,
    Audio,
    Unknown,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Video => "video",
            ContentType::Audio => "audio",
            ContentType::Unknown => "unknown",
        }
    }
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::Unknown
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The downstream idea shape: platform-agnostic, with everything that
/// did not fit flattened into string metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IdeaInspiration {
    pub title: String,
    pub description: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub source_type: ContentType,
    pub metadata: BTreeMap<String, String>,
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Default for IdeaInspiration {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            content: String::new(),
            keywords: Vec::new(),
            source_type: ContentType::Unknown,
            metadata: BTreeMap::new(),
            source_id: String::new(),
            source_url: None,
            source_created_by: None,
            source_created_at: None,
            score: None,
            category: None,
        }
    }
}

/// Stateless transformer from stored records to ideas.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transformer;

impl Transformer {
    pub fn new() -> Self {
        Self
    }

    /// Builds one idea from one record. Fails only on an empty title
    /// or source id; everything else degrades to defaults.
    pub fn transform(&self, record: &SourceRecord) -> Result<IdeaInspiration> {
        if record.title.trim().is_empty() {
            return Err(Error::MissingField { id: record.id, field: "title" });
        }
        if record.source_id.trim().is_empty() {
            return Err(Error::MissingField { id: record.id, field: "source_id" });
        }

        // 1. Stored metrics, tolerated when absent or unreadable.
        let blob = parse_blob(record);
        let family = family_of(record, &blob);

        // 2. Tags become keywords.
        let keywords = split_tags(record.tags.as_deref());

        // 3. Clipped description, full family text as content.
        let full_description = record.description.clone().unwrap_or_default();
        let description = clip_chars(&full_description, MAX_DESCRIPTION_CHARS);
        let content = content_text(family, &full_description, &blob);

        // 4. Flat string metadata: record context plus the family's
        //    fields from the blob.
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), record.source.clone());
        metadata.insert(
            id_key(family).to_string(),
            record.source_id.clone(),
        );
        metadata.insert("created_at".to_string(), record.created_at.to_rfc3339());
        if let Some(family) = family {
            extend_metadata(family, &blob, &mut metadata);
        }

        // 5.-7. Family lookup rules against the blob.
        let source_url = source_url(family, &record.source_id, &blob);
        let source_created_by = creator(family, &blob);
        let source_created_at = created_timestamp(family, record, &blob);

        // 8. Content class, upgraded when an external link points at a
        //    video host.
        let source_type = content_class(family, &blob);

        Ok(IdeaInspiration {
            title: record.title.clone(),
            description,
            content,
            keywords,
            source_type,
            metadata,
            source_id: record.source_id.clone(),
            source_url,
            source_created_by,
            source_created_at,
            score: record.score.map(|s| s.round() as i64),
            category: category_of(family, &blob),
        })
    }

    /// Transforms a batch, skipping records that fail with a warning.
    /// Returns the ideas plus how many records were skipped.
    pub fn transform_batch(&self, records: &[SourceRecord]) -> (Vec<IdeaInspiration>, usize) {
        let mut ideas = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for record in records {
            match self.transform(record) {
                Ok(idea) => ideas.push(idea),
                Err(e) => {
                    warn!(record_id = record.id, error = %e, "skipping record");
                    skipped += 1;
                }
            }
        }
        (ideas, skipped)
    }
}

fn parse_blob(record: &SourceRecord) -> Map<String, Value> {
    let raw = match record.metrics_blob.as_deref() {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Map::new(),
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            debug!(record_id = record.id, "unreadable metrics blob, continuing without");
            Map::new()
        }
    }
}

/// The blob's own platform label wins; otherwise the record source
/// prefix decides (feed labels are `<family>_<feed>`).
fn family_of(record: &SourceRecord, blob: &Map<String, Value>) -> Option<SourceFamily> {
    blob.get("platform")
        .and_then(Value::as_str)
        .and_then(SourceFamily::parse)
        .or_else(|| {
            SourceFamily::ALL
                .into_iter()
                .find(|f| record.source.starts_with(f.label()))
        })
}

fn split_tags(tags: Option<&str>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// First `max` characters, never splitting a code point.
fn clip_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn id_key(family: Option<SourceFamily>) -> &'static str {
    match family {
        Some(SourceFamily::HackerNews) => "hn_item_id",
        Some(SourceFamily::Reddit) => "reddit_post_id",
        Some(SourceFamily::YouTubeShorts) | Some(SourceFamily::TikTok) => "video_id",
        Some(SourceFamily::InstagramReels) => "reel_id",
        Some(SourceFamily::TwitchClips) | Some(SourceFamily::KickClips) => "clip_id",
        Some(SourceFamily::Medium) | Some(SourceFamily::WebArticles) => "article_id",
        Some(SourceFamily::ApplePodcasts) | Some(SourceFamily::SpotifyPodcasts) => "episode_id",
        None => "source_id",
    }
}

/// Walks nested object keys.
fn path<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    let (first, rest) = keys.split_first()?;
    let mut current = map.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

fn path_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    path(map, keys).and_then(Value::as_str)
}

/// Metadata values are stored as plain strings: JSON strings unquoted,
/// everything else in its JSON spelling.
fn fmt_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn put(meta: &mut BTreeMap<String, String>, key: &str, value: Option<&Value>) {
    if let Some(v) = value.filter(|v| !v.is_null()) {
        meta.insert(key.to_string(), fmt_value(v));
    }
}

fn put_str(meta: &mut BTreeMap<String, String>, key: &str, value: &str) {
    meta.insert(key.to_string(), value.to_string());
}

fn extend_metadata(family: SourceFamily, blob: &Map<String, Value>, meta: &mut BTreeMap<String, String>) {
    match family {
        SourceFamily::HackerNews => {
            put(meta, "hn_score", path(blob, &["platform_specific", "score"]));
            put(meta, "descendants", path(blob, &["platform_specific", "descendants"]));
            put(meta, "engagement_rate", blob.get("engagement_rate"));
            put(meta, "viral_velocity", blob.get("viral_velocity"));
            put(meta, "points_per_hour", blob.get("points_per_hour"));
            put(meta, "hn_type", path(blob, &["platform_specific", "type"]));
            put(meta, "author", path(blob, &["platform_specific", "by"]));
            put(meta, "external_url", path(blob, &["platform_specific", "url"]));
        }
        SourceFamily::Reddit => {
            put(meta, "reddit_score", path(blob, &["platform_specific", "score"]));
            put(meta, "upvote_ratio", blob.get("upvote_ratio"));
            put(meta, "num_comments", blob.get("comment_count"));
            put(meta, "engagement_rate", blob.get("engagement_rate"));
            put(meta, "viral_velocity", blob.get("viral_velocity"));
            put(meta, "author_link_karma", path(blob, &["platform_specific", "author", "link_karma"]));
            put(meta, "author_comment_karma", path(blob, &["platform_specific", "author", "comment_karma"]));
            put(meta, "subreddit", path(blob, &["platform_specific", "subreddit", "name"]));
            put(meta, "subreddit_subscribers", path(blob, &["platform_specific", "subreddit", "subscribers"]));
        }
        SourceFamily::YouTubeShorts => {
            put(meta, "views", blob.get("view_count"));
            put(meta, "likes", blob.get("like_count"));
            put(meta, "comments", blob.get("comment_count"));
            put(meta, "engagement_rate", blob.get("engagement_rate"));
            put(meta, "channel_id", path(blob, &["platform_specific", "channel_id"]));
            put(meta, "channel_title", path(blob, &["platform_specific", "channel_title"]));
            put(meta, "duration", path(blob, &["platform_specific", "duration"]));
        }
        SourceFamily::TikTok => {
            put_str(meta, "platform", "tiktok");
            put(meta, "views", blob.get("view_count"));
            put(meta, "likes", blob.get("like_count"));
            put(meta, "comments", blob.get("comment_count"));
            put(meta, "shares", blob.get("share_count"));
            put(meta, "engagement_rate", blob.get("engagement_rate"));
        }
        SourceFamily::InstagramReels => {
            put(meta, "engagement_rate", blob.get("engagement_rate"));
            put(meta, "plays_count", blob.get("view_count"));
            put(meta, "like_count", blob.get("like_count"));
            put(meta, "comment_count", blob.get("comment_count"));
            put(meta, "audio", path(blob, &["platform_specific", "audio"]));
            put(meta, "location", path(blob, &["platform_specific", "location"]));
        }
        SourceFamily::TwitchClips => {
            put_str(meta, "platform", "twitch");
            put_str(meta, "content_type", "clip");
            put(meta, "broadcaster_name", path(blob, &["platform_specific", "broadcaster_name"]));
            put(meta, "game_name", path(blob, &["platform_specific", "game_name"]));
            match blob.get("language").and_then(Value::as_str) {
                Some(lang) if !lang.is_empty() => put_str(meta, "language", lang),
                _ => put_str(meta, "language", "unknown"),
            }
            match blob.get("duration_seconds") {
                Some(d) => put(meta, "duration", Some(d)),
                None => put_str(meta, "duration", "0"),
            }
            if let Some(views) = blob.get("view_count").and_then(Value::as_u64).filter(|v| *v > 0) {
                put_str(meta, "view_count", &views.to_string());
            }
            put(meta, "vod_offset", path(blob, &["platform_specific", "vod_offset"]));
        }
        SourceFamily::KickClips => {
            put(meta, "duration", blob.get("duration_seconds"));
            put(meta, "language", path(blob, &["platform_specific", "clip", "language"]));
            put(meta, "views", blob.get("view_count"));
            put(meta, "reactions", blob.get("reaction_count"));
        }
        SourceFamily::Medium => {
            put(meta, "reading_time_min", path(blob, &["platform_specific", "reading_time_min"]));
            put(meta, "claps_per_day", path(blob, &["platform_specific", "claps_per_day"]));
            put(meta, "viral_velocity", path(blob, &["platform_specific", "viral_velocity"]));
            put(meta, "author_username", path(blob, &["platform_specific", "author_username"]));
            put(meta, "publication", path(blob, &["platform_specific", "publication"]));
            put(meta, "views", blob.get("view_count"));
            put(meta, "claps", blob.get("like_count"));
            put(meta, "responses", blob.get("comment_count"));
            put(meta, "engagement_rate", blob.get("engagement_rate"));
            put(meta, "views_per_day", blob.get("views_per_day"));
            put(meta, "author_followers", blob.get("author_follower_count"));
            put_str(meta, "platform", "medium");
            put_str(meta, "source_type", "article");
        }
        SourceFamily::WebArticles => {
            match blob.get("word_count") {
                Some(n) => put(meta, "word_count", Some(n)),
                None => put_str(meta, "word_count", "0"),
            }
            match blob.get("reading_time_min") {
                Some(n) => put(meta, "reading_time_min", Some(n)),
                None => put_str(meta, "reading_time_min", "0"),
            }
            put_str(meta, "domain", path_str(blob, &["platform_specific", "domain"]).unwrap_or(""));
            put_str(
                meta,
                "publication",
                path_str(blob, &["platform_specific", "publication"]).unwrap_or(""),
            );
            put(meta, "quality_score", blob.get("quality_score"));
            put(meta, "freshness_score", blob.get("freshness_score"));
            put(meta, "engagement_rate", blob.get("engagement_rate"));
        }
        SourceFamily::ApplePodcasts => {
            put(meta, "rating", path(blob, &["platform_specific", "rating"]));
            put(meta, "rating_count", path(blob, &["platform_specific", "rating_count"]));
            put(meta, "review_count", path(blob, &["platform_specific", "review_count"]));
            put(meta, "duration_ms", path(blob, &["platform_specific", "duration_ms"]));
            put(meta, "duration_seconds", blob.get("duration_seconds"));
            put(meta, "episode_number", path(blob, &["platform_specific", "episode_number"]));
            put(meta, "season_number", path(blob, &["platform_specific", "season_number"]));
            put(meta, "episode_type", path(blob, &["platform_specific", "episode_type"]));
            put(meta, "show_name", path(blob, &["platform_specific", "show", "name"]));
            put(meta, "show_artist", path(blob, &["platform_specific", "show", "artist"]));
            put(meta, "show_rating", path(blob, &["platform_specific", "show", "rating"]));
            if let Some(genres) = blob.get("categories").and_then(Value::as_array) {
                let joined: Vec<&str> = genres.iter().filter_map(Value::as_str).collect();
                if !joined.is_empty() {
                    put_str(meta, "genres", &joined.join(","));
                }
            }
            put(meta, "language", blob.get("language"));
            put(meta, "country", path(blob, &["platform_specific", "country"]));
            put(meta, "track_id", path(blob, &["platform_specific", "track_id"]));
            put(meta, "collection_id", path(blob, &["platform_specific", "collection_id"]));
            put(meta, "feed_url", path(blob, &["platform_specific", "feed_url"]));
            put_str(meta, "platform", "apple_podcasts");
            put_str(meta, "source_type", "audio");
        }
        SourceFamily::SpotifyPodcasts => {
            put(meta, "show_name", path(blob, &["platform_specific", "show", "name"]));
            put(meta, "publisher", path(blob, &["platform_specific", "show", "publisher"]));
            put(meta, "total_episodes", path(blob, &["platform_specific", "show", "total_episodes"]));
            put(meta, "duration_ms", path(blob, &["platform_specific", "duration_ms"]));
            put(meta, "release_date", blob.get("upload_date"));
            put(meta, "language", blob.get("language"));
            put(meta, "explicit", path(blob, &["platform_specific", "explicit"]));
        }
    }
}

fn source_url(
    family: Option<SourceFamily>,
    source_id: &str,
    blob: &Map<String, Value>,
) -> Option<String> {
    let family = family?;
    match family {
        SourceFamily::HackerNews => {
            Some(format!("https://news.ycombinator.com/item?id={source_id}"))
        }
        SourceFamily::Reddit => Some(format!("https://reddit.com/comments/{source_id}")),
        SourceFamily::YouTubeShorts => {
            Some(format!("https://www.youtube.com/watch?v={source_id}"))
        }
        SourceFamily::TikTok => None,
        SourceFamily::InstagramReels => {
            Some(format!("https://www.instagram.com/reel/{source_id}/"))
        }
        SourceFamily::TwitchClips => {
            path_str(blob, &["platform_specific", "url"]).map(str::to_string)
        }
        SourceFamily::KickClips => Some(format!("https://kick.com/video/{source_id}")),
        SourceFamily::Medium => path_str(blob, &["platform_specific", "article_url"])
            .map(str::to_string)
            .or_else(|| Some(format!("https://medium.com/p/{source_id}"))),
        SourceFamily::WebArticles => {
            path_str(blob, &["platform_specific", "article_url"]).map(str::to_string)
        }
        SourceFamily::ApplePodcasts => path(blob, &["platform_specific", "track_id"])
            .map(fmt_value)
            .map(|track| format!("https://podcasts.apple.com/podcast/id{track}")),
        SourceFamily::SpotifyPodcasts => Some(format!("spotify:episode:{source_id}")),
    }
}

fn creator(family: Option<SourceFamily>, blob: &Map<String, Value>) -> Option<String> {
    let found = match family? {
        SourceFamily::HackerNews => path_str(blob, &["platform_specific", "by"]),
        SourceFamily::Reddit => path_str(blob, &["platform_specific", "author", "name"]),
        SourceFamily::YouTubeShorts => path_str(blob, &["platform_specific", "channel_title"]),
        SourceFamily::TikTok => None,
        SourceFamily::InstagramReels | SourceFamily::WebArticles => {
            blob.get("author_name").and_then(Value::as_str)
        }
        SourceFamily::TwitchClips => path_str(blob, &["platform_specific", "broadcaster_name"]),
        SourceFamily::KickClips => path_str(blob, &["platform_specific", "streamer", "username"]),
        SourceFamily::Medium => path_str(blob, &["platform_specific", "author_username"]),
        SourceFamily::ApplePodcasts => path_str(blob, &["platform_specific", "show", "artist"]),
        SourceFamily::SpotifyPodcasts => path_str(blob, &["platform_specific", "show", "name"]),
    };
    found.filter(|s| !s.is_empty()).map(str::to_string)
}

fn created_timestamp(
    family: Option<SourceFamily>,
    record: &SourceRecord,
    blob: &Map<String, Value>,
) -> Option<String> {
    match family? {
        SourceFamily::HackerNews => {
            timestamp_string(path(blob, &["platform_specific", "time"])?)
        }
        SourceFamily::Reddit => {
            timestamp_string(path(blob, &["platform_specific", "created_utc"])?)
        }
        SourceFamily::InstagramReels => blob
            .get("upload_date")
            .and_then(timestamp_string)
            .or_else(|| Some(record.created_at.to_rfc3339())),
        SourceFamily::KickClips => path(blob, &["platform_specific", "clip", "created_at"])
            .or_else(|| blob.get("upload_date"))
            .and_then(timestamp_string),
        _ => blob.get("upload_date").and_then(timestamp_string),
    }
}

/// Normalizes one stored timestamp value: epoch seconds and `YYYYMMDD`
/// strings become ISO-8601, everything else passes through unchanged.
fn timestamp_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
            .map(|dt| dt.to_rfc3339()),
        Value::String(s) => {
            if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y%m%d") {
                    return Some(format!("{}", date.and_hms_opt(0, 0, 0)?.format("%Y-%m-%dT%H:%M:%S")));
                }
            }
            Some(s.clone())
        }
        _ => None,
    }
}

fn content_text(
    family: Option<SourceFamily>,
    full_description: &str,
    blob: &Map<String, Value>,
) -> String {
    match family {
        Some(SourceFamily::HackerNews)
        | Some(SourceFamily::Reddit)
        | Some(SourceFamily::InstagramReels)
        | Some(SourceFamily::SpotifyPodcasts) => full_description.to_string(),
        Some(SourceFamily::Medium) | Some(SourceFamily::WebArticles) => {
            path_str(blob, &["platform_specific", "article_content"])
                .unwrap_or_default()
                .to_string()
        }
        Some(SourceFamily::ApplePodcasts) => {
            path_str(blob, &["platform_specific", "transcript"])
                .unwrap_or_default()
                .to_string()
        }
        // Clip and short-video families have no transcript to carry.
        Some(SourceFamily::YouTubeShorts)
        | Some(SourceFamily::TikTok)
        | Some(SourceFamily::TwitchClips)
        | Some(SourceFamily::KickClips) => String::new(),
        None => full_description.to_string(),
    }
}

fn content_class(family: Option<SourceFamily>, blob: &Map<String, Value>) -> ContentType {
    let base = match family {
        Some(SourceFamily::HackerNews)
        | Some(SourceFamily::Reddit)
        | Some(SourceFamily::Medium)
        | Some(SourceFamily::WebArticles) => ContentType::Text,
        Some(SourceFamily::YouTubeShorts)
        | Some(SourceFamily::TikTok)
        | Some(SourceFamily::InstagramReels)
        | Some(SourceFamily::TwitchClips)
        | Some(SourceFamily::KickClips) => ContentType::Video,
        Some(SourceFamily::ApplePodcasts) | Some(SourceFamily::SpotifyPodcasts) => {
            ContentType::Audio
        }
        None => ContentType::Unknown,
    };

    // Text posts linking out to a video host are video ideas.
    if base == ContentType::Text {
        let external = match family {
            Some(SourceFamily::HackerNews) => path_str(blob, &["platform_specific", "url"]),
            Some(SourceFamily::Reddit) => {
                path_str(blob, &["platform_specific", "content", "url"])
            }
            _ => None,
        };
        if let Some(url) = external {
            if VIDEO_HOSTS.iter().any(|host| url.contains(host)) {
                return ContentType::Video;
            }
        }
    }
    base
}

fn category_of(family: Option<SourceFamily>, blob: &Map<String, Value>) -> Option<String> {
    match family? {
        SourceFamily::HackerNews => Some("hackernews".to_string()),
        SourceFamily::Reddit => Some("reddit".to_string()),
        SourceFamily::ApplePodcasts | SourceFamily::SpotifyPodcasts => {
            Some("podcast".to_string())
        }
        SourceFamily::TwitchClips => path_str(blob, &["platform_specific", "game_name"])
            .filter(|g| !g.is_empty())
            .map(str::to_string),
        SourceFamily::KickClips => path_str(blob, &["platform_specific", "category", "name"])
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn mk_record(source: &str, source_id: &str, title: &str) -> SourceRecord {
        let at: DateTime<Utc> = "2024-06-01T12:00:00Z".parse().unwrap();
        SourceRecord {
            id: 1,
            source: source.to_string(),
            source_id: source_id.to_string(),
            title: title.to_string(),
            description: None,
            tags: None,
            score: None,
            metrics_blob: None,
            processed: false,
            created_at: at,
            updated_at: at,
        }
    }

    fn blob(v: serde_json::Value) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn hackernews_record_builds_full_idea() {
        let mut record = mk_record("hackernews_frontpage", "39001", "Show HN: a thing");
        record.description = Some("I built a thing".to_string());
        record.tags = Some("rust, tools".to_string());
        record.score = Some(50.4);
        record.metrics_blob = blob(serde_json::json!({
            "platform": "hackernews",
            "like_count": 1000,
            "comment_count": 500,
            "engagement_rate": 50.0,
            "points_per_hour": 100.0,
            "viral_velocity": 500.0,
            "platform_specific": {
                "score": 1000,
                "descendants": 500,
                "type": "story",
                "by": "pg",
                "time": 1717236000i64,
                "url": "https://example.com/thing"
            }
        }));

        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.title, "Show HN: a thing");
        assert_eq!(idea.source_type, ContentType::Text);
        assert_eq!(idea.keywords, vec!["rust", "tools"]);
        assert_eq!(idea.score, Some(50));
        assert_eq!(idea.category.as_deref(), Some("hackernews"));
        assert_eq!(
            idea.source_url.as_deref(),
            Some("https://news.ycombinator.com/item?id=39001")
        );
        assert_eq!(idea.source_created_by.as_deref(), Some("pg"));
        assert_eq!(
            idea.source_created_at.as_deref(),
            Some("2024-06-01T10:00:00+00:00")
        );
        assert_eq!(idea.metadata.get("hn_score").map(String::as_str), Some("1000"));
        assert_eq!(idea.metadata.get("descendants").map(String::as_str), Some("500"));
        assert_eq!(idea.metadata.get("engagement_rate").map(String::as_str), Some("50.0"));
        assert_eq!(idea.metadata.get("author").map(String::as_str), Some("pg"));
        assert_eq!(
            idea.metadata.get("external_url").map(String::as_str),
            Some("https://example.com/thing")
        );
        assert_eq!(idea.metadata.get("source").map(String::as_str), Some("hackernews_frontpage"));
        assert_eq!(idea.metadata.get("hn_item_id").map(String::as_str), Some("39001"));
    }

    #[test]
    fn hackernews_video_link_upgrades_content_type() {
        let mut record = mk_record("hackernews_frontpage", "1", "A talk");
        record.metrics_blob = blob(serde_json::json!({
            "platform": "hackernews",
            "platform_specific": { "url": "https://youtu.be/dQw4w9WgXcQ" }
        }));
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.source_type, ContentType::Video);
    }

    #[test]
    fn empty_title_is_rejected() {
        let record = mk_record("reddit_rising", "abc", "   ");
        let err = Transformer::new().transform(&record).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "title", .. }));
    }

    #[test]
    fn empty_source_id_is_rejected() {
        let record = mk_record("reddit_rising", "", "Title");
        let err = Transformer::new().transform(&record).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "source_id", .. }));
    }

    #[test]
    fn malformed_blob_still_transforms() {
        let mut record = mk_record("tiktok_trending", "v9", "Dance");
        record.metrics_blob = Some("{not json".to_string());
        let idea = Transformer::new().transform(&record).unwrap();
        // Family still resolves from the source prefix.
        assert_eq!(idea.source_type, ContentType::Video);
        assert_eq!(idea.metadata.get("platform").map(String::as_str), Some("tiktok"));
        assert_eq!(idea.source_url, None);
    }

    #[test]
    fn description_clipped_at_boundary() {
        let mut record = mk_record("medium_tag", "m1", "Long read");
        // 499 ASCII chars then multi-byte chars across the cut.
        let text = "a".repeat(499) + "日本語テキスト";
        record.description = Some(text.clone());
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.description.chars().count(), 500);
        assert!(idea.description.ends_with('日'));
        // Content keeps the full text for text families.
        assert_eq!(idea.content, "");
    }

    #[test]
    fn reddit_content_comes_from_description() {
        let mut record = mk_record("reddit_rising", "r2", "TIL");
        record.description = Some("long selftext".to_string());
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.content, "long selftext");
        assert_eq!(idea.source_url.as_deref(), Some("https://reddit.com/comments/r2"));
        assert_eq!(idea.category.as_deref(), Some("reddit"));
    }

    #[test]
    fn medium_prefers_stored_article_url_and_content() {
        let mut record = mk_record("medium_tag", "abc123", "Ten lessons");
        record.metrics_blob = blob(serde_json::json!({
            "platform": "medium",
            "platform_specific": {
                "article_url": "https://medium.com/@jdoe/ten-lessons-abc123",
                "article_content": "Full article text",
                "author_username": "jdoe"
            }
        }));
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(
            idea.source_url.as_deref(),
            Some("https://medium.com/@jdoe/ten-lessons-abc123")
        );
        assert_eq!(idea.content, "Full article text");
        assert_eq!(idea.source_created_by.as_deref(), Some("jdoe"));
        assert_eq!(idea.category, None);
    }

    #[test]
    fn medium_without_stored_url_gets_canonical() {
        let record = mk_record("medium_tag", "abc123", "Ten lessons");
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.source_url.as_deref(), Some("https://medium.com/p/abc123"));
    }

    #[test]
    fn twitch_category_is_game_and_url_from_blob() {
        let mut record = mk_record("twitch_trending", "SpicyClip", "Insane play");
        record.metrics_blob = blob(serde_json::json!({
            "platform": "twitch",
            "view_count": 1200,
            "duration_seconds": 28,
            "language": "en",
            "platform_specific": {
                "url": "https://clips.twitch.tv/SpicyClip",
                "broadcaster_name": "streamer_x",
                "game_name": "StarCraft II"
            }
        }));
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.category.as_deref(), Some("StarCraft II"));
        assert_eq!(idea.source_url.as_deref(), Some("https://clips.twitch.tv/SpicyClip"));
        assert_eq!(idea.source_created_by.as_deref(), Some("streamer_x"));
        assert_eq!(idea.metadata.get("view_count").map(String::as_str), Some("1200"));
        assert_eq!(idea.metadata.get("duration").map(String::as_str), Some("28"));
        assert_eq!(idea.content, "");
    }

    #[test]
    fn twitch_without_blob_url_has_none() {
        let record = mk_record("twitch_trending", "clip1", "Clip");
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.source_url, None);
        assert_eq!(idea.metadata.get("language").map(String::as_str), Some("unknown"));
        assert_eq!(idea.metadata.get("duration").map(String::as_str), Some("0"));
    }

    #[test]
    fn kick_category_and_creator_from_context_objects() {
        let mut record = mk_record("kick_trending", "k77", "Wild moment");
        record.metrics_blob = blob(serde_json::json!({
            "platform": "kick",
            "view_count": 900,
            "platform_specific": {
                "streamer": { "username": "kicker", "followers": 8000 },
                "category": { "name": "Just Chatting" },
                "clip": { "created_at": "2024-05-30T10:00:00Z", "language": "en" }
            }
        }));
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.source_url.as_deref(), Some("https://kick.com/video/k77"));
        assert_eq!(idea.source_created_by.as_deref(), Some("kicker"));
        assert_eq!(idea.source_created_at.as_deref(), Some("2024-05-30T10:00:00Z"));
        assert_eq!(idea.category.as_deref(), Some("Just Chatting"));
        assert_eq!(idea.metadata.get("language").map(String::as_str), Some("en"));
    }

    #[test]
    fn apple_normalizes_compact_release_date() {
        let mut record = mk_record("apple_podcasts_charts", "ep9", "Episode 9");
        record.metrics_blob = blob(serde_json::json!({
            "platform": "apple_podcasts",
            "upload_date": "20240115",
            "categories": ["Technology", "News"],
            "platform_specific": {
                "track_id": "1234567890",
                "show": { "name": "The Daily Byte", "artist": "Jane Host" }
            }
        }));
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.source_type, ContentType::Audio);
        assert_eq!(idea.source_created_at.as_deref(), Some("2024-01-15T00:00:00"));
        assert_eq!(
            idea.source_url.as_deref(),
            Some("https://podcasts.apple.com/podcast/id1234567890")
        );
        assert_eq!(idea.source_created_by.as_deref(), Some("Jane Host"));
        assert_eq!(idea.category.as_deref(), Some("podcast"));
        assert_eq!(
            idea.metadata.get("genres").map(String::as_str),
            Some("Technology,News")
        );
        assert_eq!(idea.metadata.get("show_name").map(String::as_str), Some("The Daily Byte"));
    }

    #[test]
    fn spotify_uri_and_show_creator() {
        let mut record = mk_record("spotify_podcasts_trending", "5Xyz", "Deep dive");
        record.description = Some("Episode notes".to_string());
        record.metrics_blob = blob(serde_json::json!({
            "platform": "spotify_podcasts",
            "upload_date": "2024-01-15",
            "platform_specific": {
                "show": { "name": "Rustacean Radio", "publisher": "RR Media" }
            }
        }));
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.source_url.as_deref(), Some("spotify:episode:5Xyz"));
        assert_eq!(idea.source_created_by.as_deref(), Some("Rustacean Radio"));
        assert_eq!(idea.source_created_at.as_deref(), Some("2024-01-15"));
        assert_eq!(idea.content, "Episode notes");
        assert_eq!(idea.category.as_deref(), Some("podcast"));
        assert_eq!(
            idea.metadata.get("release_date").map(String::as_str),
            Some("2024-01-15")
        );
    }

    #[test]
    fn keywords_drop_empty_segments() {
        let mut record = mk_record("reddit_rising", "r1", "Tagged");
        record.tags = Some("a, b, , c".to_string());
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.keywords, vec!["a", "b", "c"]);

        record.tags = None;
        let idea = Transformer::new().transform(&record).unwrap();
        assert!(idea.keywords.is_empty());
    }

    #[test]
    fn score_zero_survives_rounding() {
        let mut record = mk_record("reddit_rising", "r0", "Quiet post");
        record.score = Some(0.0);
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.score, Some(0));

        record.score = Some(7.6);
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.score, Some(8));

        record.score = None;
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.score, None);
    }

    #[test]
    fn batch_skips_bad_records() {
        let good = mk_record("hackernews_frontpage", "1", "Fine");
        let mut bad = mk_record("hackernews_frontpage", "2", "");
        bad.id = 2;
        let (ideas, skipped) = Transformer::new().transform_batch(&[good, bad]);
        assert_eq!(ideas.len(), 1);
        assert_eq!(skipped, 1);
        assert_eq!(ideas[0].title, "Fine");
    }

    #[test]
    fn unknown_source_degrades_gracefully() {
        let mut record = mk_record("mystery_feed", "x1", "Odd item");
        record.description = Some("text".to_string());
        let idea = Transformer::new().transform(&record).unwrap();
        assert_eq!(idea.source_type, ContentType::Unknown);
        assert_eq!(idea.source_url, None);
        assert_eq!(idea.category, None);
        assert_eq!(idea.content, "text");
        assert_eq!(idea.metadata.get("source_id").map(String::as_str), Some("x1"));
    }

    #[test]
    fn idea_serialization_omits_absent_options() {
        let record = mk_record("tiktok_trending", "v1", "Clip");
        let idea = Transformer::new().transform(&record).unwrap();
        let json = serde_json::to_value(&idea).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("score"));
        assert!(!obj.contains_key("category"));
        assert!(!obj.contains_key("source_url"));
        assert_eq!(obj.get("source_type"), Some(&serde_json::json!("video")));
    }
}
