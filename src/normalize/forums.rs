// src/normalize/forums.rs
//
// Forum families: HackerNews and Reddit. Neither platform reports
// views, so engagement is rated against points instead; the basis is
// recorded in platform_specific so downstream consumers can tell the
// two denominators apart.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::sources::RawItem;

use super::{days_since_min_one, MetricsMapper, SourceFamily, UniversalMetrics};

pub struct HackerNewsMapper;

impl MetricsMapper for HackerNewsMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::HackerNews
    }

    fn map(&self, item: &RawItem, now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let raw = item.telemetry();
        let score = raw.u64_field("score").unwrap_or(0);
        let descendants = raw.u64_field("descendants").unwrap_or(0);
        let item_type = raw.str_field("type").unwrap_or("story");

        let mut m = UniversalMetrics::for_family(SourceFamily::HackerNews);
        m.content_type = Some(item_type.to_string());
        m.like_count = score;
        m.comment_count = descendants;
        m.title_length = raw.str_field("title").map(|t| t.chars().count() as u64);
        m.description_length = Some(raw.str_field("text").map_or(0, |t| t.chars().count() as u64));

        // Engagement: comments earned per point, as a percentage.
        if m.like_count > 0 {
            m.engagement_rate = Some(m.comment_count as f64 / m.like_count as f64 * 100.0);
        }

        // Hours since posting, floored at 0.1 so fresh items do not
        // divide by a near-zero interval.
        let created = raw
            .u64_field("time")
            .and_then(|t| Utc.timestamp_opt(t as i64, 0).single());
        if let Some(created) = created {
            let hours = ((now - created).num_seconds() as f64 / 3600.0).max(0.1);
            if m.like_count > 0 {
                let pph = m.like_count as f64 / hours;
                m.points_per_hour = Some(pph);
                if let Some(er) = m.engagement_rate.filter(|er| *er > 0.0) {
                    m.viral_velocity = Some(pph * er / 10.0);
                }
            }
            m.days_since_upload = Some(((hours / 24.0) as i64).max(1));
            m.upload_date = Some(created.to_rfc3339());
        }

        m.platform_specific.insert("score".into(), json!(score));
        m.platform_specific.insert("descendants".into(), json!(descendants));
        m.platform_specific.insert("type".into(), json!(item_type));
        if let Some(t) = raw.u64_field("time") {
            m.platform_specific.insert("time".into(), json!(t));
        }
        if let Some(by) = raw.str_field("by").filter(|s| !s.is_empty()) {
            m.platform_specific.insert("by".into(), Value::String(by.to_string()));
        }
        if let Some(url) = raw.str_field("url").filter(|s| !s.is_empty()) {
            m.platform_specific.insert("url".into(), Value::String(url.to_string()));
        }
        m.platform_specific
            .insert("engagement_basis".into(), json!("comments_per_point"));

        Ok(m)
    }
}

pub struct RedditMapper;

impl MetricsMapper for RedditMapper {
    fn family(&self) -> SourceFamily {
        SourceFamily::Reddit
    }

    fn map(&self, item: &RawItem, now: DateTime<Utc>) -> Result<UniversalMetrics> {
        let raw = item.telemetry();
        let mut m = UniversalMetrics::for_family(SourceFamily::Reddit);
        m.view_count = raw.u64_field("num_views").unwrap_or(0);
        m.like_count = raw.u64_field("score").unwrap_or(0);
        m.upvote_count = raw.u64_field("ups");
        m.comment_count = raw.u64_field("num_comments").unwrap_or(0);
        m.upvote_ratio = raw.f64_field("upvote_ratio");
        m.award_count = raw.u64_field("total_awards_received");
        m.title_length = raw.str_field("title").map(|t| t.chars().count() as u64);
        m.description_length = raw.str_field("selftext").map(|t| t.chars().count() as u64);

        let created = raw
            .u64_field("created_utc")
            .and_then(|t| Utc.timestamp_opt(t as i64, 0).single());
        if let Some(created) = created {
            m.days_since_upload = Some(days_since_min_one(now, created));
            m.upload_date = Some(created.to_rfc3339());
        }

        m.derive_view_ratios(0);
        m.derive_daily_rates();

        // Score velocity: points gathered per hour since posting,
        // combined with engagement into a viral factor.
        if let Some(days) = m.days_since_upload.filter(|d| *d > 0) {
            if m.like_count > 0 {
                let per_hour = m.like_count as f64 / days as f64 / 24.0;
                m.points_per_hour = Some(per_hour);
                if let Some(er) = m.engagement_rate.filter(|er| *er > 0.0) {
                    m.viral_velocity = Some(per_hour * er / 10.0);
                }
            }
        }

        // Awards per thousand upvotes.
        if let (Some(awards), Some(ups)) = (m.award_count, m.upvote_count) {
            if awards > 0 && ups > 0 {
                m.platform_specific.insert(
                    "award_density".into(),
                    json!(awards as f64 / ups as f64 * 1000.0),
                );
            }
        }
        if let Some(awardings) = raw.get("all_awardings").and_then(Value::as_array) {
            let names: Vec<Value> = awardings
                .iter()
                .take(5)
                .map(|a| match a {
                    Value::Object(o) => o.get("name").cloned().unwrap_or(json!("Unknown")),
                    other => json!(other.to_string()),
                })
                .collect();
            if !names.is_empty() {
                m.platform_specific.insert("award_types".into(), Value::Array(names));
            }
        }

        m.platform_specific.insert("score".into(), json!(m.like_count));
        if let Some(ups) = m.upvote_count {
            m.platform_specific.insert("ups".into(), json!(ups));
        }
        if let Some(ratio) = m.upvote_ratio {
            m.platform_specific.insert("upvote_ratio".into(), json!(ratio));
        }
        if let Some(awards) = m.award_count {
            m.platform_specific.insert("total_awards".into(), json!(awards));
        }
        if let Some(t) = raw.u64_field("created_utc") {
            m.platform_specific.insert("created_utc".into(), json!(t));
        }
        if let Some(author) = raw.get("author").filter(|a| a.is_object()) {
            m.platform_specific.insert("author".into(), author.clone());
        }
        if let Some(sub) = raw.get("subreddit").filter(|s| s.is_object()) {
            m.platform_specific.insert("subreddit".into(), sub.clone());
        }
        if let Some(content) = raw.get("content").filter(|c| c.is_object()) {
            m.platform_specific.insert("content".into(), content.clone());
        }

        Ok(m)
    }
}
