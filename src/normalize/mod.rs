// src/normalize/mod.rs
//
// Metrics normalization: one mapper per platform family turns a raw
// telemetry map into the shared UniversalMetrics shape. Mappers are
// pure given an explicit `now`; adding a platform means adding one
// mapper and one registry arm.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::sources::RawItem;

pub mod articles;
pub mod clips;
pub mod forums;
pub mod podcasts;
pub mod shorts;

/// Supported platform families. The label doubles as the `platform`
/// field of the normalized metrics and as the config/file spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SourceFamily {
    #[serde(rename = "hackernews")]
    HackerNews,
    #[serde(rename = "reddit")]
    Reddit,
    #[serde(rename = "youtube")]
    YouTubeShorts,
    #[serde(rename = "tiktok")]
    TikTok,
    #[serde(rename = "instagram_reels")]
    InstagramReels,
    #[serde(rename = "twitch")]
    TwitchClips,
    #[serde(rename = "kick")]
    KickClips,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "web_articles")]
    WebArticles,
    #[serde(rename = "apple_podcasts")]
    ApplePodcasts,
    #[serde(rename = "spotify_podcasts")]
    SpotifyPodcasts,
}

impl SourceFamily {
    pub const ALL: [SourceFamily; 11] = [
        SourceFamily::HackerNews,
        SourceFamily::Reddit,
        SourceFamily::YouTubeShorts,
        SourceFamily::TikTok,
        SourceFamily::InstagramReels,
        SourceFamily::TwitchClips,
        SourceFamily::KickClips,
        SourceFamily::Medium,
        SourceFamily::WebArticles,
        SourceFamily::ApplePodcasts,
        SourceFamily::SpotifyPodcasts,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SourceFamily::HackerNews => "hackernews",
            SourceFamily::Reddit => "reddit",
            SourceFamily::YouTubeShorts => "youtube",
            SourceFamily::TikTok => "tiktok",
            SourceFamily::InstagramReels => "instagram_reels",
            SourceFamily::TwitchClips => "twitch",
            SourceFamily::KickClips => "kick",
            SourceFamily::Medium => "medium",
            SourceFamily::WebArticles => "web_articles",
            SourceFamily::ApplePodcasts => "apple_podcasts",
            SourceFamily::SpotifyPodcasts => "spotify_podcasts",
        }
    }

    pub fn parse(label: &str) -> Option<SourceFamily> {
        Self::ALL.iter().copied().find(|f| f.label() == label)
    }

    /// The family's mapper, a stateless static.
    pub fn mapper(self) -> &'static dyn MetricsMapper {
        match self {
            SourceFamily::HackerNews => &forums::HackerNewsMapper,
            SourceFamily::Reddit => &forums::RedditMapper,
            SourceFamily::YouTubeShorts => &shorts::YouTubeShortsMapper,
            SourceFamily::TikTok => &shorts::TikTokMapper,
            SourceFamily::InstagramReels => &shorts::InstagramReelsMapper,
            SourceFamily::TwitchClips => &clips::TwitchClipsMapper,
            SourceFamily::KickClips => &clips::KickClipsMapper,
            SourceFamily::Medium => &articles::MediumMapper,
            SourceFamily::WebArticles => &articles::WebArticlesMapper,
            SourceFamily::ApplePodcasts => &podcasts::ApplePodcastsMapper,
            SourceFamily::SpotifyPodcasts => &podcasts::SpotifyPodcastsMapper,
        }
    }
}

impl std::fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for SourceFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SourceFamily::parse(s).ok_or_else(|| format!("unknown source family `{s}`"))
    }
}

/// Cross-platform metrics shape. Optional fields stay `None` when the
/// platform does not report them or their denominator is degenerate;
/// serialization omits absent values so the stored blob only carries
/// what was actually measured.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct UniversalMetrics {
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    // Core engagement counts.
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    pub share_count: u64,

    // Platform-specific counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repost_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upvote_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dislike_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub award_count: Option<u64>,

    // Engagement ratios.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upvote_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_to_view_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_to_view_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_to_view_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_to_view_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction_to_view_ratio: Option<f64>,

    // Time-based performance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views_per_day: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views_per_hour: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_per_hour: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viral_velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_upload: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_score: Option<f64>,

    // Content metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_time_min: Option<u64>,

    // Author context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_follower_count: Option<u64>,
    pub author_verified: bool,

    // Publication context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Open extension map for anything that has no universal slot.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub platform_specific: Map<String, Value>,
}

impl Default for UniversalMetrics {
    fn default() -> Self {
        Self {
            platform: "unknown".to_string(),
            content_type: None,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            share_count: 0,
            save_count: None,
            repost_count: None,
            reaction_count: None,
            upvote_count: None,
            dislike_count: None,
            favorite_count: None,
            award_count: None,
            upvote_ratio: None,
            engagement_rate: None,
            like_to_view_ratio: None,
            comment_to_view_ratio: None,
            share_to_view_ratio: None,
            save_to_view_ratio: None,
            reaction_to_view_ratio: None,
            views_per_day: None,
            views_per_hour: None,
            points_per_hour: None,
            viral_velocity: None,
            days_since_upload: None,
            engagement_estimate: None,
            freshness_score: None,
            quality_score: None,
            social_score: None,
            duration_seconds: None,
            title_length: None,
            description_length: None,
            tag_count: None,
            word_count: None,
            reading_time_min: None,
            author_name: None,
            author_follower_count: None,
            author_verified: false,
            upload_date: None,
            language: None,
            categories: Vec::new(),
            platform_specific: Map::new(),
        }
    }
}

impl UniversalMetrics {
    pub fn for_family(family: SourceFamily) -> Self {
        Self {
            platform: family.label().to_string(),
            ..Self::default()
        }
    }

    /// Views-based ratio block shared by the view-counting families.
    /// `extra_numerator` folds platform counts (saves, reactions) into
    /// the engagement total. No-op when there are no views, so a
    /// zero-view item keeps every ratio absent.
    pub(crate) fn derive_view_ratios(&mut self, extra_numerator: u64) {
        if self.view_count == 0 {
            return;
        }
        let views = self.view_count as f64;
        let total = (self.like_count + self.comment_count + self.share_count + extra_numerator) as f64;
        self.engagement_rate = Some(total / views * 100.0);
        self.like_to_view_ratio = Some(self.like_count as f64 / views * 100.0);
        self.comment_to_view_ratio = Some(self.comment_count as f64 / views * 100.0);
        if self.share_count > 0 {
            self.share_to_view_ratio = Some(self.share_count as f64 / views * 100.0);
        }
        if let Some(saves) = self.save_count.filter(|s| *s > 0) {
            self.save_to_view_ratio = Some(saves as f64 / views * 100.0);
        }
        if let Some(reactions) = self.reaction_count.filter(|r| *r > 0) {
            self.reaction_to_view_ratio = Some(reactions as f64 / views * 100.0);
        }
    }

    /// Daily/hourly view rates; requires `days_since_upload` to be set
    /// and positive first.
    pub(crate) fn derive_daily_rates(&mut self) {
        if let Some(days) = self.days_since_upload.filter(|d| *d > 0) {
            let per_day = self.view_count as f64 / days as f64;
            self.views_per_day = Some(per_day);
            if per_day > 0.0 {
                self.views_per_hour = Some(per_day / 24.0);
            }
        }
    }
}

/// One platform family's mapping from raw telemetry to the universal
/// shape. Implementations are stateless; `map` must be deterministic
/// for a fixed `now` and must not fail on absent optional fields.
pub trait MetricsMapper: Send + Sync {
    fn family(&self) -> SourceFamily;

    fn map(&self, raw: &RawItem, now: DateTime<Utc>) -> Result<UniversalMetrics>;

    /// Scalar persisted as the record's `score`, derived from the
    /// normalized metrics. Most families rank by engagement rate.
    fn record_score(&self, metrics: &UniversalMetrics) -> f64 {
        metrics.engagement_rate.unwrap_or(0.0)
    }

    /// Identity fallback for feeds whose items carry no native id.
    fn fallback_source_id(&self, _item: &RawItem) -> Option<String> {
        None
    }
}

/// The raw key a family's native identifier lives under.
fn raw_id_key(family: SourceFamily) -> &'static str {
    match family {
        SourceFamily::ApplePodcasts => "trackId",
        _ => "id",
    }
}

/// Native identity of a raw item: the family's id key, then the
/// prepared `source_id`, then whatever the mapper can derive (web
/// articles hash their URL).
pub fn native_id(family: SourceFamily, item: &RawItem) -> Option<String> {
    item.id_field(raw_id_key(family))
        .or_else(|| item.id_field("source_id"))
        .or_else(|| family.mapper().fallback_source_id(item))
}

/// Normalizes a raw item's telemetry for `family` at an explicit
/// instant. Mappers route their own payload: families whose telemetry
/// arrives under the nested `metrics` key unwrap it, the article and
/// reel families read the whole item. An item with no resolvable
/// identity cannot become a record and is rejected here.
pub fn normalize_at(
    family: SourceFamily,
    item: &RawItem,
    now: DateTime<Utc>,
) -> Result<UniversalMetrics> {
    if native_id(family, item).is_none() {
        return Err(crate::error::Error::MissingRawField {
            family,
            field: raw_id_key(family),
        });
    }
    family.mapper().map(item, now)
}

/// `normalize_at` against the current wall clock.
pub fn normalize(family: SourceFamily, item: &RawItem) -> Result<UniversalMetrics> {
    normalize_at(family, item, Utc::now())
}

/// Days elapsed between `then` and `now`, floored at one. Several
/// families treat anything younger than a day as one day old to keep
/// per-day rates finite.
pub(crate) fn days_since_min_one(now: DateTime<Utc>, then: DateTime<Utc>) -> i64 {
    (now - then).num_days().max(1)
}

/// Lenient ISO-8601 parse: full RFC 3339, a naive datetime, or a bare
/// date. Naive inputs are taken as UTC.
pub(crate) fn parse_iso_utc(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mk_item(v: serde_json::Value) -> RawItem {
        RawItem::from_value(v).expect("object literal")
    }

    #[test]
    fn family_labels_round_trip() {
        for family in SourceFamily::ALL {
            assert_eq!(SourceFamily::parse(family.label()), Some(family));
            assert_eq!(family.label().parse::<SourceFamily>().ok(), Some(family));
        }
        assert!(SourceFamily::parse("myspace").is_none());
    }

    #[test]
    fn registry_covers_every_family() {
        for family in SourceFamily::ALL {
            assert_eq!(family.mapper().family(), family);
        }
    }

    #[test]
    fn zero_views_leave_ratios_absent() {
        let mut m = UniversalMetrics::for_family(SourceFamily::TikTok);
        m.like_count = 10;
        m.comment_count = 5;
        m.derive_view_ratios(0);
        m.derive_daily_rates();
        assert_eq!(m.engagement_rate, None);
        assert_eq!(m.like_to_view_ratio, None);
        assert_eq!(m.views_per_day, None);
        assert_eq!(m.views_per_hour, None);
    }

    #[test]
    fn view_ratios_are_percentages() {
        let mut m = UniversalMetrics::for_family(SourceFamily::TikTok);
        m.view_count = 1000;
        m.like_count = 100;
        m.comment_count = 20;
        m.share_count = 10;
        m.derive_view_ratios(0);
        assert_eq!(m.engagement_rate, Some(13.0));
        assert_eq!(m.like_to_view_ratio, Some(10.0));
        assert_eq!(m.comment_to_view_ratio, Some(2.0));
        assert_eq!(m.share_to_view_ratio, Some(1.0));
    }

    #[test]
    fn serialization_omits_absent_fields() {
        let m = UniversalMetrics::for_family(SourceFamily::Reddit);
        let blob = serde_json::to_value(&m).unwrap();
        let obj = blob.as_object().unwrap();
        assert_eq!(obj.get("platform"), Some(&serde_json::json!("reddit")));
        assert!(obj.contains_key("view_count"));
        assert!(!obj.contains_key("engagement_rate"));
        assert!(!obj.contains_key("platform_specific"));
    }

    #[test]
    fn normalize_prefers_nested_metrics_payload() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let item = mk_item(serde_json::json!({
            "source_id": "42",
            "title": "nested",
            "metrics": { "stats": { "playCount": 200, "diggCount": 50 } }
        }));
        let m = normalize_at(SourceFamily::TikTok, &item, now).unwrap();
        assert_eq!(m.view_count, 200);
        assert_eq!(m.like_count, 50);
    }

    #[test]
    fn normalize_is_deterministic_for_fixed_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let item = mk_item(serde_json::json!({
            "id": 7u64,
            "metrics": { "score": 10, "descendants": 2, "time": 1_717_200_000u64 }
        }));
        let a = normalize_at(SourceFamily::HackerNews, &item, now).unwrap();
        let b = normalize_at(SourceFamily::HackerNews, &item, now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn item_without_identity_is_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let item = mk_item(serde_json::json!({ "title": "anonymous", "metrics": {} }));
        let err = normalize_at(SourceFamily::Reddit, &item, now).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::MissingRawField { family: SourceFamily::Reddit, field: "id" }
        ));
    }

    #[test]
    fn native_id_prefers_the_family_key() {
        let apple = mk_item(serde_json::json!({ "trackId": 99u64, "source_id": "fallback" }));
        assert_eq!(native_id(SourceFamily::ApplePodcasts, &apple), Some("99".to_string()));

        let prepared = mk_item(serde_json::json!({ "source_id": "abc" }));
        assert_eq!(native_id(SourceFamily::TikTok, &prepared), Some("abc".to_string()));

        // Web articles derive a stable id from their URL.
        let article = mk_item(serde_json::json!({ "url": "https://example.com/post" }));
        let id = native_id(SourceFamily::WebArticles, &article).unwrap();
        assert_eq!(id.len(), 16);
    }
}
