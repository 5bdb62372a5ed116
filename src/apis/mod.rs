pub mod guardian;
pub mod lastfm;
pub mod musicbrainz;
pub mod retry;
pub mod ripping_records;

use crate::error::{ImportError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;

/// Artist details from Last.fm
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistInfo {
    pub image_url: Option<String>,
    pub biography: Option<String>,
    /// Publication date of the biography, as Last.fm formats it
    pub bio_published: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarArtist {
    pub name: String,
    pub score: f64,
}

/// A country-specific release date of an album
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEvent {
    pub country: String,
    pub date: String,
}

/// An official album release from MusicBrainz
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub mbid: String,
    pub title: String,
    pub asin: Option<String>,
    pub events: Vec<ReleaseEvent>,
}

/// One page request against the review search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewQuery {
    pub page: u32,
    pub from_date: Option<NaiveDate>,
    /// e.g. "musicbrainz/<mbid>"
    pub reference: Option<String>,
}

impl ReviewQuery {
    pub fn page(page: u32) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPage {
    pub pages: u32,
    pub results: Vec<ReviewItem>,
}

/// A review as returned by the search, before any filtering
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewItem {
    pub external_id: String,
    pub url: String,
    pub publication_date: DateTime<Utc>,
    pub headline: String,
    pub byline: String,
    pub trail: String,
    pub rating: Option<u8>,
    pub musicbrainz_ids: Vec<String>,
}

#[async_trait]
pub trait ArtistMetadataSource: Send + Sync {
    /// `None` when the service does not know the artist
    async fn artist_info(&self, artist: &str) -> Result<Option<ArtistInfo>>;
    async fn similar_artists(&self, artist: &str) -> Result<Option<Vec<SimilarArtist>>>;
    async fn album_cover_url(&self, artist: &str, album: &str) -> Result<Option<String>>;
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn artist_mbid(&self, artist: &str) -> Result<Option<String>>;
    async fn official_albums(&self, artist: &str) -> Result<Vec<ReleaseInfo>>;
}

#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn review_page(&self, query: &ReviewQuery) -> Result<ReviewPage>;
}

/// Map a failed HTTP status to an error. Rate limiting and server errors
/// are transient.
pub(crate) fn status_error(what: &str, status: StatusCode, body: &str) -> ImportError {
    let message = format!("{} returned {}: {}", what, status, truncate(body, 200));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ImportError::Transient(message)
    } else {
        ImportError::Api { message }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// GET raw bytes from a URL
pub(crate) async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(url, status, &body));
    }
    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_classification() {
        assert!(status_error("x", StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(status_error("x", StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(!status_error("x", StatusCode::FORBIDDEN, "").is_transient());
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("caf\u{e9} society", 4), "caf\u{e9}");
        assert_eq!(truncate("short", 200), "short");
    }
}
