use super::{fetch_bytes, status_error, ArtistInfo, ArtistMetadataSource, SimilarArtist};
use crate::constants::LASTFM_NOT_FOUND;
use crate::error::{ImportError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Sizes Last.fm offers, largest first
const IMAGE_SIZES: [&str; 5] = ["mega", "extralarge", "large", "medium", "small"];

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(rename = "#text", default)]
    url: String,
    #[serde(default)]
    size: String,
}

#[derive(Debug, Deserialize)]
struct Bio {
    published: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastfmArtist {
    #[serde(default)]
    image: Vec<Image>,
    bio: Option<Bio>,
}

#[derive(Debug, Deserialize)]
struct ArtistInfoResponse {
    artist: LastfmArtist,
}

#[derive(Debug, Deserialize)]
struct SimilarEntry {
    name: String,
    #[serde(rename = "match")]
    score: Value,
}

#[derive(Debug, Deserialize)]
struct SimilarList {
    #[serde(default)]
    artist: Vec<SimilarEntry>,
}

#[derive(Debug, Deserialize)]
struct SimilarResponse {
    similarartists: SimilarList,
}

#[derive(Debug, Deserialize)]
struct LastfmAlbum {
    #[serde(default)]
    image: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct AlbumInfoResponse {
    album: LastfmAlbum,
}

/// Largest non-empty image
fn primary_image(images: &[Image]) -> Option<String> {
    IMAGE_SIZES
        .iter()
        .find_map(|size| {
            images
                .iter()
                .find(|i| i.size == *size && !i.url.is_empty())
        })
        .or_else(|| images.iter().rev().find(|i| !i.url.is_empty()))
        .map(|i| i.url.clone())
}

/// Last.fm sends the match score as a string or a number
fn parse_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode a response body, treating "not found" as no data
fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<Option<T>> {
    let value: Value = serde_json::from_str(body)?;
    if let Some(code) = value.get("error").and_then(Value::as_i64) {
        if code == LASTFM_NOT_FOUND {
            return Ok(None);
        }
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(ImportError::Api {
            message: format!("Last.fm error {}: {}", code, message),
        });
    }
    Ok(Some(serde_json::from_value(value)?))
}

pub struct LastfmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LastfmClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ImportError::MissingDependency(
                "Last.fm API key (LASTFM_API_KEY)".to_string(),
            ));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("method", method),
                ("api_key", self.api_key.as_str()),
                ("format", "json"),
                ("autocorrect", "1"),
            ])
            .query(params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        // Error payloads carry their own code even on non-2xx responses
        if !status.is_success() && !body.contains("\"error\"") {
            return Err(status_error("Last.fm", status, &body));
        }
        decode(&body)
    }
}

#[async_trait]
impl ArtistMetadataSource for LastfmClient {
    #[instrument(skip(self))]
    async fn artist_info(&self, artist: &str) -> Result<Option<ArtistInfo>> {
        let Some(response) = self
            .call::<ArtistInfoResponse>("artist.getinfo", &[("artist", artist)])
            .await?
        else {
            debug!("Last.fm has no artist {}", artist);
            return Ok(None);
        };
        let bio = response.artist.bio;
        Ok(Some(ArtistInfo {
            image_url: primary_image(&response.artist.image),
            biography: bio.as_ref().and_then(|b| b.content.clone()),
            bio_published: bio
                .and_then(|b| b.published)
                .filter(|p| !p.trim().is_empty()),
        }))
    }

    #[instrument(skip(self))]
    async fn similar_artists(&self, artist: &str) -> Result<Option<Vec<SimilarArtist>>> {
        let response = self
            .call::<SimilarResponse>("artist.getsimilar", &[("artist", artist)])
            .await?;
        Ok(response.map(|r| {
            r.similarartists
                .artist
                .into_iter()
                .filter_map(|entry| {
                    parse_score(&entry.score).map(|score| SimilarArtist {
                        name: entry.name,
                        score,
                    })
                })
                .collect()
        }))
    }

    #[instrument(skip(self))]
    async fn album_cover_url(&self, artist: &str, album: &str) -> Result<Option<String>> {
        let response = self
            .call::<AlbumInfoResponse>("album.getinfo", &[("artist", artist), ("album", album)])
            .await?;
        Ok(response.and_then(|r| primary_image(&r.album.image)))
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        fetch_bytes(&self.client, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error_is_no_data() {
        let body = r#"{"error":6,"message":"The artist you supplied could not be found"}"#;
        let decoded: Option<ArtistInfoResponse> = decode(body).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_other_errors_are_api_errors() {
        let body = r#"{"error":10,"message":"Invalid API key"}"#;
        let err = decode::<ArtistInfoResponse>(body).unwrap_err();
        assert!(matches!(err, ImportError::Api { .. }));
    }

    #[test]
    fn test_artist_info_picks_largest_image() {
        let body = r##"{"artist":{"name":"Mogwai","image":[
            {"#text":"http://img/s.jpg","size":"small"},
            {"#text":"http://img/xl.jpg","size":"extralarge"},
            {"#text":"","size":"mega"}],
            "bio":{"published":"01 Jan 2010, 00:00","content":"<b>Post</b>-rock band"}}}"##;
        let decoded: ArtistInfoResponse = decode(body).unwrap().unwrap();
        assert_eq!(
            primary_image(&decoded.artist.image).as_deref(),
            Some("http://img/xl.jpg")
        );
    }

    #[test]
    fn test_similar_scores_as_strings_or_numbers() {
        let body = r#"{"similarartists":{"artist":[
            {"name":"Arab Strap","match":"0.83"},
            {"name":"Slint","match":0.2},
            {"name":"Broken","match":null}]}}"#;
        let decoded: SimilarResponse = decode(body).unwrap().unwrap();
        let scores: Vec<Option<f64>> = decoded
            .similarartists
            .artist
            .iter()
            .map(|a| parse_score(&a.score))
            .collect();
        assert_eq!(scores, vec![Some(0.83), Some(0.2), None]);
    }

    #[test]
    fn test_missing_api_key_is_missing_dependency() {
        let result = LastfmClient::new("", DEFAULT_BASE_URL, Duration::from_secs(5));
        assert!(matches!(result, Err(ImportError::MissingDependency(_))));
    }
}
