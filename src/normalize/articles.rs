// src/normalize/articles.rs
//
// Long-form families: Medium and generic web articles. Both read the
// whole item rather than the telemetry submap because the interesting
// fields (publish date, tags, author, content text) live at the top
// level next to the counts.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::sources::RawItem;

use super::{parse_iso_utc, MetricsMapper, SourceFamily, UniversalMetrics};

pub struct MediumMapper;

impl MetricsMapper for MediumMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::Medium
    }

    fn map(&self, item: &RawItem, now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let stats = item.submap("metrics").unwrap_or_default();
        let author = item.submap("author").unwrap_or_default();

        let mut m = UniversalMetrics::for_family(SourceFamily::Medium);
        m.content_type = Some("article".to_string());
        m.view_count = stats.u64_field("views").unwrap_or(0);
        // Claps are Medium's likes, responses its comments. Shares are
        // not exposed.
        m.like_count = stats.u64_field("claps").unwrap_or(0);
        m.comment_count = stats.u64_field("responses").unwrap_or(0);

        let reading_time = stats.u64_field("reading_time_min").unwrap_or(0);
        if reading_time > 0 {
            m.reading_time_min = Some(reading_time);
            m.duration_seconds = Some(reading_time * 60);
        }
        m.title_length = item.str_field("title").map(|t| t.chars().count() as u64);
        m.description_length = item.str_field("description").map(|t| t.chars().count() as u64);
        if let Some(tags) = item.get("tags").and_then(Value::as_array) {
            m.tag_count = Some(tags.len() as u64);
            m.categories = tags
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect();
        }
        m.author_follower_count = author.u64_field("followers");

        if let Some(date_raw) = item.str_field("publish_date") {
            m.upload_date = Some(date_raw.to_string());
            if let Some(published) = parse_iso_utc(date_raw) {
                // A future-dated publish timestamp counts as zero days.
                m.days_since_upload = Some((now - published).num_days().max(0));
            }
        }

        m.derive_view_ratios(0);
        m.derive_daily_rates();

        if let Some(id) = item.id_field("source_id") {
            m.platform_specific.insert("article_id".into(), Value::String(id));
        }
        if let Some(username) = author.str_field("username").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("author_username".into(), Value::String(username.to_string()));
        }
        m.platform_specific
            .insert("reading_time_min".into(), json!(reading_time));
        if let Some(publication) = item.str_field("publication").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("publication".into(), Value::String(publication.to_string()));
        }
        if let Some(url) = item.str_field("url").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("article_url".into(), Value::String(url.to_string()));
        }
        if let Some(content) = item.str_field("content").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("article_content".into(), Value::String(content.to_string()));
        }

        // Collector-supplied velocity figures are kept, then replaced
        // by our own once the publish age is known.
        if let Some(cpd) = stats.f64_field("claps_per_day") {
            m.platform_specific.insert("claps_per_day".into(), json!(cpd));
        }
        if let Some(vv) = stats.f64_field("viral_velocity") {
            m.platform_specific.insert("viral_velocity".into(), json!(vv));
        }
        if let Some(days) = m.days_since_upload.filter(|d| *d > 0) {
            let claps_per_day = m.like_count as f64 / days as f64;
            m.platform_specific
                .insert("claps_per_day".into(), json!(claps_per_day));
            if let Some(er) = m.engagement_rate.filter(|er| *er > 0.0) {
                m.platform_specific
                    .insert("viral_velocity".into(), json!(er * claps_per_day));
            }
        }

        Ok(m)
    }
}

pub struct WebArticlesMapper;

impl MetricsMapper for WebArticlesMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::WebArticles
    }

    fn map(&self, item: &RawItem, now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let stats = item.submap("metrics").unwrap_or_default();
        let source_info = item.submap("source_info").unwrap_or_default();

        // Content arrives either as plain text or as an extraction
        // object with `text` and image fields.
        let content = item.get("content");
        let content_text = match content {
            Some(Value::String(s)) => s.as_str(),
            Some(Value::Object(o)) => o.get("text").and_then(Value::as_str).unwrap_or(""),
            _ => "",
        };
        let word_count = content_text.split_whitespace().count() as u64;
        let (has_images, image_count) = match content {
            Some(Value::Object(o)) => {
                let top = o
                    .get("top_image")
                    .and_then(Value::as_str)
                    .is_some_and(|s| !s.is_empty());
                let images = o
                    .get("images")
                    .and_then(Value::as_array)
                    .map_or(0, |a| a.len() as u64);
                (top || images > 0, images)
            }
            _ => (false, 0),
        };

        let mut m = UniversalMetrics::for_family(SourceFamily::WebArticles);
        m.content_type = Some("article".to_string());
        m.view_count = stats.u64_field("view_count").unwrap_or(0);
        m.like_count = stats.u64_field("like_count").unwrap_or(0);
        m.comment_count = stats.u64_field("comment_count").unwrap_or(0);
        m.share_count = stats
            .u64_field("share_count")
            .or_else(|| stats.u64_field("social_shares"))
            .unwrap_or(0);
        m.save_count = stats.u64_field("bookmark_count");

        if word_count > 0 {
            m.word_count = Some(word_count);
            // Assuming roughly 200 words per minute.
            m.reading_time_min = Some((word_count / 200).max(1));
        }
        m.title_length = item.str_field("title").map(|t| t.chars().count() as u64);
        m.description_length = item.str_field("description").map(|t| t.chars().count() as u64);
        if let Some(tags) = item.get("tags").and_then(Value::as_array) {
            m.tag_count = Some(tags.len() as u64);
            m.categories = tags
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect();
        }

        match item.get("author") {
            Some(Value::Object(_)) => {
                let author = item.submap("author").unwrap_or_default();
                m.author_name = author
                    .str_field("name")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                m.author_follower_count = author.u64_field("follower_count");
            }
            Some(Value::String(name)) if !name.is_empty() => {
                m.author_name = Some(name.clone());
            }
            _ => {}
        }

        if let Some(date_raw) = item.str_field("published_at") {
            m.upload_date = Some(date_raw.to_string());
            if let Some(published) = parse_iso_utc(date_raw) {
                // A future-dated publish timestamp counts as zero days.
                m.days_since_upload = Some((now - published).num_days().max(0));
            }
        }

        // Articles only get the aggregate rate; the per-count view
        // ratios stay absent.
        if m.view_count > 0 {
            let total = (m.like_count + m.comment_count + m.share_count) as f64;
            m.engagement_rate = Some(total / m.view_count as f64 * 100.0);
        }
        m.social_score = Some(social_score(&m));
        if let Some(days) = m.days_since_upload.filter(|d| *d > 0) {
            m.views_per_day = Some(m.view_count as f64 / days as f64);
        }
        // Freshness decays exponentially, losing about half its value
        // after three weeks.
        if let Some(days) = m.days_since_upload {
            m.freshness_score = Some((-(days as f64) / 30.0).exp());
        }
        m.quality_score = Some(quality_score(&m, word_count, has_images));

        if let Some(base) = stats.map_field("platform_specific") {
            m.platform_specific = base.clone();
        }
        if let Some(claps) = stats.u64_field("clap_count") {
            m.platform_specific.insert("clap_count".into(), json!(claps));
        }
        m.platform_specific.insert("has_images".into(), json!(has_images));
        m.platform_specific.insert("image_count".into(), json!(image_count));
        m.platform_specific
            .insert("content_length".into(), json!(content_text.chars().count() as u64));
        if let Some(domain) = source_info.str_field("domain").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("domain".into(), Value::String(domain.to_string()));
        }
        if let Some(publication) = source_info.str_field("publication").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("publication".into(), Value::String(publication.to_string()));
        }
        if let Some(url) = item.str_field("url").filter(|s| !s.is_empty()) {
            m.platform_specific
                .insert("article_url".into(), Value::String(url.to_string()));
        }
        if !content_text.is_empty() {
            m.platform_specific
                .insert("article_content".into(), Value::String(content_text.to_string()));
        }

        Ok(m)
    }

    /// Articles rank by editorial quality rather than raw engagement.
    fn record_score(&self, metrics: &UniversalMetrics) -> f64 {
        metrics.quality_score.unwrap_or(0.0)
    }

    fn fallback_source_id(&self, item: &RawItem) -> Option<String> {
        item.str_field("url")
            .filter(|u| !u.is_empty())
            .map(article_id_from_url)
    }
}

/// Stable identity for articles without a native id: the first 16 hex
/// characters of the URL's SHA-256.
pub fn article_id_from_url(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Combined social signal on a 0-10 scale. Likes and comments are
/// worth up to three points each, shares up to four.
fn social_score(m: &UniversalMetrics) -> f64 {
    let mut score = 0.0;
    if m.like_count > 0 {
        score += (m.like_count as f64 / 100.0).min(3.0);
    }
    if m.comment_count > 0 {
        score += (m.comment_count as f64 / 20.0).min(3.0);
    }
    if m.share_count > 0 {
        score += (m.share_count as f64 / 10.0).min(4.0);
    }
    score.min(10.0)
}

/// Heuristic quality on a 0-10 scale: word-count bracket (800-2000
/// words is the sweet spot), engagement, social proof, images and a
/// sane tag count.
fn quality_score(m: &UniversalMetrics, word_count: u64, has_images: bool) -> f64 {
    let mut score = 0.0;
    if (800..=2000).contains(&word_count) {
        score += 3.0;
    } else if (500..800).contains(&word_count) || (2001..=3000).contains(&word_count) {
        score += 2.0;
    } else if word_count >= 300 {
        score += 1.0;
    }
    if let Some(er) = m.engagement_rate.filter(|er| *er > 1.0) {
        score += (er / 2.0).min(3.0);
    }
    if let Some(social) = m.social_score.filter(|s| *s > 0.0) {
        score += (social / 2.0).min(2.0);
    }
    if has_images {
        score += 1.0;
    }
    if let Some(tags) = m.tag_count {
        if (3..=10).contains(&tags) {
            score += 1.0;
        }
    }
    score.min(10.0)
}
