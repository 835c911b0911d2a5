// src/normalize/shorts.rs
//
// Short-video families: YouTube Shorts, TikTok and Instagram Reels.
// All three count views (TikTok and Instagram call them plays), so the
// shared views-based derivation applies; Instagram folds saves into
// the engagement numerator and rates every ratio unconditionally.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::Result;
use crate::sources::RawItem;

use super::{days_since_min_one, parse_iso_utc, MetricsMapper, SourceFamily, UniversalMetrics};

/// ISO-8601 time duration as YouTube reports it, `PT#H#M#S` with every
/// component optional.
static ISO_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("duration regex"));

fn parse_iso8601_duration(s: &str) -> Option<u64> {
    let caps = ISO_DURATION.captures(s)?;
    let part = |i: usize| {
        caps.get(i)
            .and_then(|g| g.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    Some(part(1) * 3600 + part(2) * 60 + part(3))
}

pub struct YouTubeShortsMapper;

impl MetricsMapper for YouTubeShortsMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::YouTubeShorts
    }

    fn map(&self, item: &RawItem, _now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let raw = item.telemetry();
        let snippet = raw.submap("snippet").unwrap_or_default();
        let stats = raw.submap("statistics").unwrap_or_default();
        let details = raw.submap("contentDetails").unwrap_or_default();

        let mut m = UniversalMetrics::for_family(SourceFamily::YouTubeShorts);
        m.content_type = Some("video".to_string());
        // The Data API reports counters as decimal strings.
        m.view_count = stats.u64_field("viewCount").unwrap_or(0);
        m.like_count = stats.u64_field("likeCount").unwrap_or(0);
        m.comment_count = stats.u64_field("commentCount").unwrap_or(0);
        m.dislike_count = stats.u64_field("dislikeCount");
        m.favorite_count = stats.u64_field("favoriteCount");

        m.title_length = snippet.str_field("title").map(|t| t.chars().count() as u64);
        m.description_length = snippet
            .str_field("description")
            .map(|t| t.chars().count() as u64);
        m.tag_count = snippet.get("tags").and_then(Value::as_array).map(|t| t.len() as u64);
        m.upload_date = snippet.str_field("publishedAt").map(str::to_string);
        if let Some(category) = snippet.str_field("categoryId").filter(|c| !c.is_empty()) {
            m.categories = vec![category.to_string()];
        }
        m.duration_seconds = details
            .str_field("duration")
            .and_then(parse_iso8601_duration);

        m.derive_view_ratios(0);
        m.derive_daily_rates();

        if let Some(id) = raw.id_field("id").or_else(|| item.id_field("id")) {
            m.platform_specific.insert("video_id".into(), Value::String(id));
        }
        if let Some(channel) = snippet.str_field("channelId").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("channel_id".into(), Value::String(channel.to_string()));
        }
        if let Some(title) = snippet.str_field("channelTitle").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("channel_title".into(), Value::String(title.to_string()));
        }
        if let Some(duration) = details.str_field("duration").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("duration".into(), Value::String(duration.to_string()));
        }

        Ok(m)
    }
}

pub struct TikTokMapper;

impl MetricsMapper for TikTokMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::TikTok
    }

    fn map(&self, item: &RawItem, _now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let raw = item.telemetry();
        let stats = raw.submap("stats").unwrap_or_default();

        let mut m = UniversalMetrics::for_family(SourceFamily::TikTok);
        m.content_type = Some("video".to_string());
        m.view_count = stats.u64_field("playCount").unwrap_or(0);
        m.like_count = stats.u64_field("diggCount").unwrap_or(0);
        m.comment_count = stats.u64_field("commentCount").unwrap_or(0);
        m.share_count = stats.u64_field("shareCount").unwrap_or(0);
        // Reposts are tracked but stay out of the engagement numerator.
        m.repost_count = stats.u64_field("repostCount");

        let created = raw
            .u64_field("createTime")
            .or_else(|| item.u64_field("createTime"))
            .and_then(|t| Utc.timestamp_opt(t as i64, 0).single());
        if let Some(created) = created {
            m.upload_date = Some(created.to_rfc3339());
        }

        m.derive_view_ratios(0);
        m.derive_daily_rates();

        Ok(m)
    }
}

pub struct InstagramReelsMapper;

impl MetricsMapper for InstagramReelsMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::InstagramReels
    }

    fn map(&self, item: &RawItem, now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let stats = item.submap("metrics").unwrap_or_default();
        let creator = item.submap("creator").unwrap_or_default();
        let reel = item.submap("reel").unwrap_or_default();

        let mut m = UniversalMetrics::for_family(SourceFamily::InstagramReels);
        m.content_type = Some("reel".to_string());
        m.view_count = stats.u64_field("plays").unwrap_or(0);
        m.like_count = stats.u64_field("likes").unwrap_or(0);
        m.comment_count = stats.u64_field("comments").unwrap_or(0);
        m.share_count = stats.u64_field("shares").unwrap_or(0);
        m.save_count = stats.u64_field("saves");
        let saves = m.save_count.unwrap_or(0);

        // Saves count as engagement on Instagram, and every ratio is
        // rated even at zero.
        if m.view_count > 0 {
            let plays = m.view_count as f64;
            let total = (m.like_count + m.comment_count + saves + m.share_count) as f64;
            m.engagement_rate = Some(total / plays * 100.0);
            m.like_to_view_ratio = Some(m.like_count as f64 / plays * 100.0);
            m.comment_to_view_ratio = Some(m.comment_count as f64 / plays * 100.0);
            m.share_to_view_ratio = Some(m.share_count as f64 / plays * 100.0);
            m.save_to_view_ratio = Some(saves as f64 / plays * 100.0);
        }

        let upload = item
            .str_field("upload_date")
            .or_else(|| item.str_field("taken_at"));
        if let Some(date_raw) = upload {
            m.upload_date = Some(date_raw.to_string());
            if let Some(uploaded) = parse_iso_utc(date_raw) {
                m.days_since_upload = Some(days_since_min_one(now, uploaded));
            }
        }
        m.derive_daily_rates();
        // Plays velocity doubles as the viral signal.
        m.viral_velocity = m.views_per_hour.filter(|v| *v > 0.0);

        m.duration_seconds = reel.u64_field("duration");
        m.description_length = item.str_field("description").map(|t| t.chars().count() as u64);

        let hashtags = match item.get("tags") {
            Some(Value::Array(tags)) => tags
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(csv)) => csv
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        m.tag_count = Some(hashtags.len() as u64);
        if !hashtags.is_empty() {
            m.platform_specific.insert("hashtags".into(), json!(hashtags));
        }

        m.author_name = creator
            .str_field("username")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        m.author_follower_count = creator.u64_field("followers");
        m.author_verified = creator.bool_field("verified").unwrap_or(false);

        if let Some(audio) = reel.str_field("audio").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("audio".into(), Value::String(audio.to_string()));
            m.platform_specific
                .insert("has_original_audio".into(), json!(audio.contains("Original audio")));
        }
        if let Some(location) = reel.str_field("location").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("location".into(), Value::String(location.to_string()));
        }
        for key in ["filters", "effects"] {
            if let Some(values) = reel.get(key).and_then(Value::as_array) {
                if !values.is_empty() {
                    m.platform_specific.insert(key.into(), Value::Array(values.clone()));
                }
            }
        }

        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn mk_item(v: serde_json::Value) -> RawItem {
        RawItem::from_value(v).expect("object literal")
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn youtube_parses_string_statistics() {
        let item = mk_item(serde_json::json!({
            "id": "dQw4w9WgXcQ",
            "snippet": {
                "title": "Short one",
                "description": "desc",
                "publishedAt": "2024-05-20T08:00:00Z",
                "channelId": "UC123",
                "channelTitle": "Creator",
                "categoryId": "22",
                "tags": ["a", "b", "c"]
            },
            "statistics": {
                "viewCount": "1000",
                "likeCount": "100",
                "commentCount": "20",
                "favoriteCount": "0"
            },
            "contentDetails": { "duration": "PT2M30S" }
        }));

        let m = YouTubeShortsMapper.map(&item, fixed_now()).unwrap();
        assert_eq!(m.view_count, 1000);
        assert_eq!(m.like_count, 100);
        assert_eq!(m.comment_count, 20);
        assert_eq!(m.favorite_count, Some(0));
        assert_eq!(m.dislike_count, None);
        assert_eq!(m.duration_seconds, Some(150));
        assert_eq!(m.engagement_rate, Some(12.0));
        assert_eq!(m.categories, vec!["22"]);
        assert_eq!(m.upload_date.as_deref(), Some("2024-05-20T08:00:00Z"));
        assert_eq!(
            m.platform_specific.get("video_id"),
            Some(&serde_json::json!("dQw4w9WgXcQ"))
        );
        assert_eq!(
            m.platform_specific.get("channel_title"),
            Some(&serde_json::json!("Creator"))
        );
        // Upload age is not tracked for shorts, so no daily rates.
        assert_eq!(m.views_per_day, None);
    }

    #[test]
    fn iso_durations_parse_or_reject() {
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("PT3M"), Some(180));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("three minutes"), None);
        assert_eq!(parse_iso8601_duration("P1DT2S"), None);
    }

    #[test]
    fn tiktok_reposts_stay_out_of_engagement() {
        let item = mk_item(serde_json::json!({
            "stats": {
                "playCount": 1000,
                "diggCount": 100,
                "commentCount": 20,
                "shareCount": 10,
                "repostCount": 100
            },
            "createTime": fixed_now().timestamp()
        }));

        let m = TikTokMapper.map(&item, fixed_now()).unwrap();
        assert_eq!(m.view_count, 1000);
        assert_eq!(m.repost_count, Some(100));
        // (100 + 20 + 10) / 1000, reposts excluded.
        assert_eq!(m.engagement_rate, Some(13.0));
        assert_eq!(m.like_to_view_ratio, Some(10.0));
        assert!(m.upload_date.is_some());
    }

    #[test]
    fn instagram_counts_saves_as_engagement() {
        let now = fixed_now();
        let item = mk_item(serde_json::json!({
            "description": "caption",
            "upload_date": (now - Duration::days(2)).to_rfc3339(),
            "tags": ["fitness", "gym"],
            "creator": { "username": "athlete", "followers": 50_000, "verified": true },
            "reel": { "duration": 30, "audio": "Original audio - athlete" },
            "metrics": { "plays": 1000, "likes": 100, "comments": 20, "shares": 10, "saves": 70 }
        }));

        let m = InstagramReelsMapper.map(&item, now).unwrap();
        assert_eq!(m.view_count, 1000);
        assert_eq!(m.save_count, Some(70));
        // (100 + 20 + 70 + 10) / 1000
        assert_eq!(m.engagement_rate, Some(20.0));
        assert_eq!(m.save_to_view_ratio, Some(7.0));
        // Instagram rates the share ratio even when it would be zero
        // elsewhere.
        assert_eq!(m.share_to_view_ratio, Some(1.0));
        assert_eq!(m.days_since_upload, Some(2));
        assert_eq!(m.views_per_day, Some(500.0));
        // Viral velocity is the hourly play rate.
        assert_eq!(m.viral_velocity, m.views_per_hour);
        assert_eq!(m.author_name.as_deref(), Some("athlete"));
        assert!(m.author_verified);
        assert_eq!(
            m.platform_specific.get("has_original_audio"),
            Some(&serde_json::json!(true))
        );
    }

    #[test]
    fn instagram_splits_comma_separated_tags() {
        let item = mk_item(serde_json::json!({
            "tags": "fitness, gym , ,cardio",
            "metrics": { "plays": 10 }
        }));
        let m = InstagramReelsMapper.map(&item, fixed_now()).unwrap();
        assert_eq!(m.tag_count, Some(3));
        assert_eq!(
            m.platform_specific.get("hashtags"),
            Some(&serde_json::json!(["fitness", "gym", "cardio"]))
        );
    }

    #[test]
    fn instagram_fresh_reel_floors_age_at_one_day() {
        let now = fixed_now();
        let item = mk_item(serde_json::json!({
            "upload_date": now.to_rfc3339(),
            "metrics": { "plays": 240 }
        }));
        let m = InstagramReelsMapper.map(&item, now).unwrap();
        assert_eq!(m.days_since_upload, Some(1));
        assert_eq!(m.views_per_day, Some(240.0));
        assert_eq!(m.views_per_hour, Some(10.0));
        assert_eq!(m.viral_velocity, Some(10.0));
    }
}
