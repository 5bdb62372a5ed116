use super::{status_error, ReviewItem, ReviewPage, ReviewQuery, ReviewSource};
use crate::error::{ImportError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_BASE_URL: &str = "https://content.guardianapis.com";

const MUSICBRAINZ_REFERENCE: &str = "musicbrainz";

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchResponse,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pages: u32,
    #[serde(default)]
    results: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentItem {
    id: String,
    web_url: String,
    web_publication_date: String,
    #[serde(default)]
    fields: Fields,
    #[serde(default)]
    references: Vec<Reference>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fields {
    headline: Option<String>,
    byline: Option<String>,
    trail_text: Option<String>,
    star_rating: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Reference {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

impl ContentItem {
    fn into_review(self) -> Option<ReviewItem> {
        let publication_date = match DateTime::parse_from_rfc3339(&self.web_publication_date) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                warn!(
                    "Skipping review {} with bad date '{}': {}",
                    self.id, self.web_publication_date, e
                );
                return None;
            }
        };
        let musicbrainz_ids = self
            .references
            .iter()
            .filter(|r| r.kind == MUSICBRAINZ_REFERENCE)
            .filter_map(|r| r.id.rsplit('/').next())
            .map(str::to_string)
            .collect();
        Some(ReviewItem {
            external_id: self.id,
            url: self.web_url,
            publication_date,
            headline: self.fields.headline.unwrap_or_default(),
            byline: self.fields.byline.unwrap_or_default(),
            trail: self.fields.trail_text.unwrap_or_default(),
            rating: self
                .fields
                .star_rating
                .as_ref()
                .and_then(parse_rating),
            musicbrainz_ids,
        })
    }
}

/// Ratings arrive as "4" or 4
fn parse_rating(value: &Value) -> Option<u8> {
    let rating = match value {
        Value::String(s) => s.trim().parse::<u8>().ok()?,
        Value::Number(n) => u8::try_from(n.as_u64()?).ok()?,
        _ => return None,
    };
    (rating <= 5).then_some(rating)
}

fn decode_page(body: &str) -> Result<ReviewPage> {
    let envelope: SearchEnvelope = serde_json::from_str(body)?;
    Ok(ReviewPage {
        pages: envelope.response.pages,
        results: envelope
            .response
            .results
            .into_iter()
            .filter_map(ContentItem::into_review)
            .collect(),
    })
}

pub struct GuardianClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl GuardianClient {
    pub fn new(api_key: &str, base_url: &str, page_size: u32, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ImportError::MissingDependency(
                "Guardian API key (GUARDIAN_API_KEY)".to_string(),
            ));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            page_size,
        })
    }

    fn query_params(&self, query: &ReviewQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("api-key", self.api_key.clone()),
            ("section", "music".to_string()),
            ("tag", "tone/reviews".to_string()),
            ("page-size", self.page_size.to_string()),
            ("order-by", "oldest".to_string()),
            ("format", "json".to_string()),
            (
                "show-fields",
                "headline,byline,trail-text,star-rating".to_string(),
            ),
            ("show-references", MUSICBRAINZ_REFERENCE.to_string()),
            ("reference-type", MUSICBRAINZ_REFERENCE.to_string()),
            ("page", query.page.max(1).to_string()),
        ];
        if let Some(from) = query.from_date {
            params.push(("from-date", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(reference) = &query.reference {
            params.push(("reference", reference.clone()));
        }
        params
    }
}

#[async_trait]
impl ReviewSource for GuardianClient {
    #[instrument(skip(self))]
    async fn review_page(&self, query: &ReviewQuery) -> Result<ReviewPage> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&self.query_params(query))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(status_error("Guardian", status, &body));
        }
        let page = decode_page(&body)?;
        debug!(
            "Review page {} of {} has {} results",
            query.page,
            page.pages,
            page.results.len()
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_decode_page() {
        let body = r#"{"response":{"status":"ok","pages":3,"results":[
            {"id":"music/2009/may/01/mogwai-review","webUrl":"https://gu.com/a",
             "webPublicationDate":"2009-05-01T23:05:00+01:00",
             "fields":{"headline":"Mogwai - review","byline":"A Critic","trailText":"Loud","starRating":"4"},
             "references":[{"id":"musicbrainz/d700b3f5-45af-4d02-95ed-57d301bda93e","type":"musicbrainz"},
                           {"id":"isbn/123","type":"isbn"}]},
            {"id":"music/unrated","webUrl":"https://gu.com/b",
             "webPublicationDate":"2010-01-01T00:00:00Z","fields":{"headline":"Unrated"}}]}}"#;
        let page = decode_page(body).unwrap();
        assert_eq!(page.pages, 3);
        assert_eq!(page.results.len(), 2);

        let first = &page.results[0];
        assert_eq!(first.rating, Some(4));
        assert_eq!(
            first.musicbrainz_ids,
            vec!["d700b3f5-45af-4d02-95ed-57d301bda93e".to_string()]
        );
        assert_eq!(first.publication_date.to_rfc3339(), "2009-05-01T22:05:00+00:00");
        assert_eq!(page.results[1].rating, None);
    }

    #[test]
    fn test_query_params_include_paging_and_reference() {
        let client = GuardianClient::new("key", DEFAULT_BASE_URL, 50, Duration::from_secs(5)).unwrap();
        let params = client.query_params(&ReviewQuery {
            page: 2,
            from_date: NaiveDate::from_ymd_opt(2024, 1, 31),
            reference: Some("musicbrainz/abc".to_string()),
        });
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("page"), Some("2"));
        assert_eq!(get("page-size"), Some("50"));
        assert_eq!(get("order-by"), Some("oldest"));
        assert_eq!(get("from-date"), Some("2024-01-31"));
        assert_eq!(get("reference"), Some("musicbrainz/abc"));
    }
}
