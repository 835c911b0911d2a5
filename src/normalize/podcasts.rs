// src/normalize/podcasts.rs
//
// Podcast families: Apple Podcasts and Spotify. Neither platform
// reports play counts, so engagement is estimated from what is public:
// Apple's star ratings, Spotify's show follower count on a log scale.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::sources::RawItem;

use super::{MetricsMapper, SourceFamily, UniversalMetrics};

pub struct ApplePodcastsMapper;

impl MetricsMapper for ApplePodcastsMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::ApplePodcasts
    }

    fn map(&self, item: &RawItem, _now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let raw = item.telemetry();
        let show = raw.submap("show").unwrap_or_default();

        let mut m = UniversalMetrics::for_family(SourceFamily::ApplePodcasts);
        m.content_type = Some("audio".to_string());

        // iTunes reports duration in milliseconds under either key.
        let duration_ms = raw
            .u64_field("duration_ms")
            .or_else(|| raw.u64_field("trackTimeMillis"));
        m.duration_seconds = duration_ms.map(|ms| ms / 1000);

        // Kept verbatim: the transformer normalizes YYYYMMDD later.
        m.upload_date = raw
            .str_field("release_date")
            .or_else(|| raw.str_field("releaseDate"))
            .map(str::to_string);
        m.language = raw
            .str_field("language")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if let Some(genres) = raw.get("genres").and_then(Value::as_array) {
            m.categories = genres
                .iter()
                .filter_map(|g| g.as_str().map(str::to_string))
                .collect();
        }

        let rating = raw.f64_field("rating").filter(|r| *r > 0.0);
        let show_rating = show.f64_field("rating").filter(|r| *r > 0.0);
        // Stars normalized to a 0-100 scale, falling back to the show
        // average when the episode itself is unrated.
        m.engagement_estimate = rating.or(show_rating).map(|r| r / 5.0 * 100.0);

        m.author_name = show
            .str_field("artist")
            .or_else(|| raw.str_field("artistName"))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(r) = rating {
            m.platform_specific.insert("rating".into(), json!(r));
        }
        if let Some(c) = raw.u64_field("rating_count") {
            m.platform_specific.insert("rating_count".into(), json!(c));
        }
        if let Some(c) = raw.u64_field("review_count") {
            m.platform_specific.insert("review_count".into(), json!(c));
        }
        if let Some(ms) = duration_ms {
            m.platform_specific.insert("duration_ms".into(), json!(ms));
        }
        for key in ["episode_number", "season_number"] {
            if let Some(n) = raw.u64_field(key) {
                m.platform_specific.insert(key.into(), json!(n));
            }
        }
        if let Some(kind) = raw.str_field("episode_type").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("episode_type".into(), Value::String(kind.to_string()));
        }
        if let Some(country) = raw.str_field("country").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("country".into(), Value::String(country.to_string()));
        }
        m.platform_specific.insert(
            "explicit".into(),
            json!(raw.str_field("contentAdvisoryRating") == Some("Explicit")),
        );

        // Show context, normalized to one nested object whether the
        // collector nested it or used the flat iTunes keys.
        let mut show_out = show.into_inner();
        if !show_out.contains_key("name") {
            if let Some(name) = raw.str_field("collectionName").filter(|s| !s.is_empty()) {
                show_out.insert("name".into(), Value::String(name.to_string()));
            }
        }
        if !show_out.contains_key("artist") {
            if let Some(artist) = raw.str_field("artistName").filter(|s| !s.is_empty()) {
                show_out.insert("artist".into(), Value::String(artist.to_string()));
            }
        }
        if !show_out.is_empty() {
            m.platform_specific.insert("show".into(), Value::Object(show_out));
        }

        for key in ["trackId", "collectionId", "artistId"] {
            if let Some(id) = raw.id_field(key) {
                let out_key = match key {
                    "trackId" => "track_id",
                    "collectionId" => "collection_id",
                    _ => "artist_id",
                };
                m.platform_specific.insert(out_key.into(), Value::String(id));
            }
        }
        if let Some(feed) = raw.str_field("feedUrl").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("feed_url".into(), Value::String(feed.to_string()));
        }
        if let Some(art) = raw
            .str_field("artworkUrl600")
            .or_else(|| raw.str_field("artworkUrl100"))
            .filter(|s| !s.is_empty())
        {
            m.platform_specific
                .insert("artwork_url".into(), Value::String(art.to_string()));
        }
        // Episode transcripts, when a collector supplies them, become
        // the idea content downstream.
        if let Some(transcript) = raw.str_field("transcript").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("transcript".into(), Value::String(transcript.to_string()));
        }

        Ok(m)
    }

    fn record_score(&self, metrics: &UniversalMetrics) -> f64 {
        metrics.engagement_estimate.unwrap_or(0.0)
    }
}

pub struct SpotifyPodcastsMapper;

impl MetricsMapper for SpotifyPodcastsMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::SpotifyPodcasts
    }

    fn map(&self, item: &RawItem, _now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let raw = item.telemetry();
        let show = raw.submap("show").unwrap_or_default();

        let mut m = UniversalMetrics::for_family(SourceFamily::SpotifyPodcasts);
        m.content_type = Some("audio".to_string());

        let duration_ms = raw.u64_field("duration_ms");
        m.duration_seconds = duration_ms.map(|ms| ms / 1000);
        m.upload_date = raw.str_field("release_date").map(str::to_string);
        m.language = raw
            .str_field("language")
            .or_else(|| {
                raw.get("languages")
                    .and_then(Value::as_array)
                    .and_then(|l| l.first())
                    .and_then(Value::as_str)
            })
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        m.author_name = show
            .str_field("publisher")
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        // Spotify exposes no per-episode engagement at all; the show's
        // follower count on a log10 scale is the best available proxy.
        let followers = raw
            .u64_field("show_followers")
            .or_else(|| show.u64_field("followers"));
        if let Some(f) = followers.filter(|f| *f > 0) {
            m.engagement_estimate = Some((((f + 1) as f64).log10() * 10.0).min(100.0));
        }
        m.author_follower_count = followers;

        if let Some(ms) = duration_ms {
            m.platform_specific.insert("duration_ms".into(), json!(ms));
        }
        m.platform_specific
            .insert("explicit".into(), json!(raw.bool_field("explicit").unwrap_or(false)));
        if let Some(f) = followers {
            m.platform_specific.insert("show_followers".into(), json!(f));
        }
        if let Some(id) = raw.id_field("id") {
            m.platform_specific.insert("episode_id".into(), Value::String(id));
        }
        if let Some(uri) = raw.str_field("uri").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("episode_uri".into(), Value::String(uri.to_string()));
        }
        if let Some(urls) = raw.get("external_urls").filter(|u| u.is_object()) {
            m.platform_specific.insert("external_urls".into(), urls.clone());
        }

        let show_out = show.into_inner();
        if !show_out.is_empty() {
            m.platform_specific.insert("show".into(), Value::Object(show_out));
        }

        Ok(m)
    }

    fn record_score(&self, metrics: &UniversalMetrics) -> f64 {
        metrics.engagement_estimate.unwrap_or(0.0)
    }
}
