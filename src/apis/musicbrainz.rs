use super::{status_error, ReleaseEvent, ReleaseInfo, ReleaseSource};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://musicbrainz.org/ws/2";

const RELEASE_PAGE_LIMIT: &str = "100";

#[derive(Debug, Deserialize)]
struct ArtistSearch {
    #[serde(default)]
    artists: Vec<ArtistHit>,
}

#[derive(Debug, Deserialize)]
struct ArtistHit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseSearch {
    #[serde(default)]
    releases: Vec<ReleaseHit>,
}

#[derive(Debug, Deserialize)]
struct ReleaseHit {
    id: String,
    title: String,
    asin: Option<String>,
    country: Option<String>,
    date: Option<String>,
    #[serde(rename = "release-events", default)]
    release_events: Vec<ReleaseEventHit>,
}

#[derive(Debug, Deserialize)]
struct ReleaseEventHit {
    date: Option<String>,
    area: Option<Area>,
}

#[derive(Debug, Deserialize)]
struct Area {
    #[serde(rename = "iso-3166-1-codes", default)]
    codes: Vec<String>,
}

impl From<ReleaseHit> for ReleaseInfo {
    fn from(hit: ReleaseHit) -> Self {
        let mut events: Vec<ReleaseEvent> = hit
            .release_events
            .into_iter()
            .filter_map(|e| {
                let date = e.date.filter(|d| !d.is_empty())?;
                let country = e.area?.codes.into_iter().next()?;
                Some(ReleaseEvent { country, date })
            })
            .collect();
        if events.is_empty() {
            if let (Some(country), Some(date)) = (hit.country, hit.date) {
                events.push(ReleaseEvent { country, date });
            }
        }
        ReleaseInfo {
            mbid: hit.id,
            title: hit.title,
            asin: hit.asin.filter(|a| !a.trim().is_empty()),
            events,
        }
    }
}

/// Lucene phrase for a search field
fn phrase(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

pub struct MusicBrainzClient {
    client: reqwest::Client,
    base_url: String,
}

impl MusicBrainzClient {
    /// MusicBrainz rejects requests without a descriptive User-Agent
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn search<T: serde::de::DeserializeOwned>(
        &self,
        entity: &str,
        query: &str,
        limit: &str,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, entity);
        let response = self
            .client
            .get(&url)
            .query(&[("query", query), ("fmt", "json"), ("limit", limit)])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(status_error("MusicBrainz", status, &body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ReleaseSource for MusicBrainzClient {
    #[instrument(skip(self))]
    async fn artist_mbid(&self, artist: &str) -> Result<Option<String>> {
        let query = format!("artist:{}", phrase(artist));
        let search: ArtistSearch = self.search("artist", &query, "1").await?;
        let mbid = search.artists.into_iter().next().map(|a| a.id);
        debug!("MusicBrainz id for {}: {:?}", artist, mbid);
        Ok(mbid)
    }

    #[instrument(skip(self))]
    async fn official_albums(&self, artist: &str) -> Result<Vec<ReleaseInfo>> {
        let query = format!(
            "artist:{} AND primarytype:album AND status:official",
            phrase(artist)
        );
        let search: ReleaseSearch = self.search("release", &query, RELEASE_PAGE_LIMIT).await?;
        Ok(search.releases.into_iter().map(ReleaseInfo::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_events_from_search_hit() {
        let body = r#"{"releases":[
            {"id":"r1","title":"Puzzle","asin":"B000GIXHT4",
             "release-events":[
                {"date":"2007-06","area":{"iso-3166-1-codes":["GB"]}},
                {"date":"2007-06-19","area":{"iso-3166-1-codes":["US"]}}]},
            {"id":"r2","title":"Bonus Disc","country":"XE","date":"2008"}]}"#;
        let search: ReleaseSearch = serde_json::from_str(body).unwrap();
        let releases: Vec<ReleaseInfo> = search.releases.into_iter().map(ReleaseInfo::from).collect();

        assert_eq!(releases[0].asin.as_deref(), Some("B000GIXHT4"));
        assert_eq!(releases[0].events.len(), 2);
        assert_eq!(releases[0].events[0].country, "GB");
        assert_eq!(releases[1].asin, None);
        assert_eq!(
            releases[1].events,
            vec![ReleaseEvent {
                country: "XE".to_string(),
                date: "2008".to_string()
            }]
        );
    }

    #[test]
    fn test_phrase_escapes_quotes() {
        assert_eq!(phrase("The \"Band\""), "\"The \\\"Band\\\"\"");
    }
}
