// src/normalize/clips.rs
//
// Live-stream clip families: Twitch and Kick. Twitch's Helix API only
// exposes a view count, so its ratios rate a zero numerator; Kick
// reports the full counter set plus reactions, which join the
// engagement numerator.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::sources::RawItem;

use super::{days_since_min_one, parse_iso_utc, MetricsMapper, SourceFamily, UniversalMetrics};

pub struct TwitchClipsMapper;

impl MetricsMapper for TwitchClipsMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::TwitchClips
    }

    fn map(&self, item: &RawItem, now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let raw = item.telemetry();

        let mut m = UniversalMetrics::for_family(SourceFamily::TwitchClips);
        m.content_type = Some("clip".to_string());
        m.view_count = raw.u64_field("view_count").unwrap_or(0);
        // Helix exposes no like/comment/share counters for clips.

        // Duration arrives as a float of seconds, occasionally as a
        // string.
        m.duration_seconds = raw
            .f64_field("duration")
            .filter(|d| *d > 0.0)
            .map(|d| d as u64);
        m.title_length = raw.str_field("title").map(|t| t.chars().count() as u64);
        m.author_verified = raw.str_field("broadcaster_type") == Some("partner");
        m.language = raw
            .str_field("language")
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(created_raw) = raw.str_field("created_at") {
            m.upload_date = Some(created_raw.to_string());
            if let Some(created) = parse_iso_utc(created_raw) {
                m.days_since_upload = Some(days_since_min_one(now, created));
            }
        }

        m.derive_view_ratios(0);
        m.derive_daily_rates();

        if let Some(id) = raw.id_field("id").or_else(|| item.id_field("source_id")) {
            m.platform_specific.insert("clip_id".into(), Value::String(id));
        }
        if let Some(url) = raw.str_field("url").filter(|s| !s.is_empty()) {
            m.platform_specific.insert("url".into(), Value::String(url.to_string()));
            if let Some(slug) = url.rsplit('/').next().filter(|s| !s.is_empty()) {
                m.platform_specific
                    .insert("clip_slug".into(), Value::String(slug.to_string()));
            }
        }
        for key in [
            "broadcaster_id",
            "broadcaster_name",
            "creator_name",
            "game_id",
            "game_name",
            "language",
        ] {
            if let Some(v) = raw.str_field(key).filter(|s| !s.is_empty()) {
                m.platform_specific.insert(key.into(), Value::String(v.to_string()));
            }
        }
        if let Some(offset) = raw.u64_field("vod_offset") {
            m.platform_specific.insert("vod_offset".into(), json!(offset));
        }

        Ok(m)
    }

    /// Clips have no like-based engagement, so daily view velocity is
    /// the ranking signal, with the raw count as a fallback for items
    /// whose age is unknown.
    fn record_score(&self, metrics: &UniversalMetrics) -> f64 {
        metrics
            .views_per_day
            .filter(|v| *v > 0.0)
            .unwrap_or(metrics.view_count as f64)
    }
}

pub struct KickClipsMapper;

impl MetricsMapper for KickClipsMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::KickClips
    }

    fn map(&self, item: &RawItem, now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let raw = item.telemetry();

        let mut m = UniversalMetrics::for_family(SourceFamily::KickClips);
        m.content_type = Some("clip".to_string());
        m.view_count = raw.u64_field("views").unwrap_or(0);
        m.like_count = raw.u64_field("likes").unwrap_or(0);
        m.comment_count = raw.u64_field("comments").unwrap_or(0);
        m.share_count = raw.u64_field("shares").unwrap_or(0);
        let reactions = raw.u64_field("reactions").unwrap_or(0);
        m.reaction_count = Some(reactions);

        m.duration_seconds = raw.u64_field("duration").filter(|d| *d > 0);
        m.author_follower_count = raw.u64_field("streamer_followers");
        m.author_verified = raw.bool_field("streamer_verified").unwrap_or(false);

        if let Some(created_raw) = raw.str_field("created_at") {
            m.upload_date = Some(created_raw.to_string());
            // An unparsable creation date still counts as one day old
            // so the velocity math stays defined.
            m.days_since_upload = Some(
                parse_iso_utc(created_raw).map_or(1, |created| days_since_min_one(now, created)),
            );
        }

        m.derive_view_ratios(reactions);
        m.derive_daily_rates();

        // Growth factor tuned up for a young platform: hourly view rate
        // relative to clip age, doubled.
        if let (Some(per_hour), Some(days)) = (m.views_per_hour, m.days_since_upload) {
            if days > 0 {
                m.viral_velocity = Some(per_hour / days as f64 * 2.0);
            }
        }

        // The whole Kick metrics payload rides along; it is small and
        // the downstream metadata rules pick from it.
        m.platform_specific = raw.into_inner();
        // Context objects (streamer, category, clip) sit next to the
        // metrics map when the collector separates them out.
        for key in ["streamer", "category", "clip"] {
            if let Some(obj) = item.get(key).filter(|v| v.is_object()) {
                m.platform_specific.insert(key.into(), obj.clone());
            }
        }

        Ok(m)
    }
}
