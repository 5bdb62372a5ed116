//! Jobs that fill in artist data from external services.

pub mod albums;
pub mod media;
pub mod metadata;
pub mod reviews;
pub mod similar;

use crate::error::Result;
use crate::hooks::ArtistEnricher;
use crate::storage::Storage;
use crate::types::Artist;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

pub use albums::{AlbumImportJob, AlbumSummary};
pub use media::MediaStore;
pub use metadata::{ArtistMetadataJob, MetadataSummary};
pub use reviews::{ReviewImportJob, ReviewSummary};
pub use similar::{SimilarArtistLinker, SimilarSummary};

/// Published artists, limited to those created within `age_hours` when it is non-zero
pub async fn select_artists(
    storage: &dyn Storage,
    age_hours: u32,
    now: DateTime<Utc>,
) -> Result<Vec<Artist>> {
    let earliest = now - Duration::hours(i64::from(age_hours));
    Ok(storage
        .get_all_artists()
        .await?
        .into_iter()
        .filter(|a| a.published && (age_hours == 0 || a.created_at >= earliest))
        .collect())
}

/// Enrichment run for every artist the importer creates: metadata first,
/// then the album set.
pub struct NewArtistEnricher {
    metadata: ArtistMetadataJob,
    albums: Option<AlbumImportJob>,
}

impl NewArtistEnricher {
    pub fn new(metadata: ArtistMetadataJob, albums: Option<AlbumImportJob>) -> Self {
        Self { metadata, albums }
    }
}

#[async_trait]
impl ArtistEnricher for NewArtistEnricher {
    async fn enrich_new_artist(&self, artist: &Artist) -> Result<()> {
        let metadata = self.metadata.enrich(artist).await;
        if let Some(albums) = &self.albums {
            if let Err(e) = albums.import_for(artist).await {
                warn!("Album import failed for {}: {}", artist.name, e);
            }
        }
        metadata.map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use crate::apis::*;
    use crate::error::{ImportError, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned Last.fm answers keyed by artist name
    #[derive(Default)]
    pub struct FakeLastfm {
        pub info: HashMap<String, ArtistInfo>,
        pub similar: HashMap<String, Vec<SimilarArtist>>,
        pub covers: HashMap<(String, String), String>,
        pub failing: Vec<String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeLastfm {
        fn record(&self, call: String) -> Result<()> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call.clone());
            }
            if self.failing.iter().any(|f| call.ends_with(f.as_str())) {
                return Err(ImportError::Transient(format!("{} timed out", call)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ArtistMetadataSource for FakeLastfm {
        async fn artist_info(&self, artist: &str) -> Result<Option<ArtistInfo>> {
            self.record(format!("info:{}", artist))?;
            Ok(self.info.get(artist).cloned())
        }

        async fn similar_artists(&self, artist: &str) -> Result<Option<Vec<SimilarArtist>>> {
            self.record(format!("similar:{}", artist))?;
            Ok(self.similar.get(artist).cloned())
        }

        async fn album_cover_url(&self, artist: &str, album: &str) -> Result<Option<String>> {
            self.record(format!("cover:{}", album))?;
            Ok(self
                .covers
                .get(&(artist.to_string(), album.to_string()))
                .cloned())
        }

        async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
            self.record(format!("image:{}", url))?;
            Ok(url.as_bytes().to_vec())
        }
    }

    #[derive(Default)]
    pub struct FakeMusicBrainz {
        pub mbids: HashMap<String, String>,
        pub albums: HashMap<String, Vec<ReleaseInfo>>,
    }

    #[async_trait]
    impl ReleaseSource for FakeMusicBrainz {
        async fn artist_mbid(&self, artist: &str) -> Result<Option<String>> {
            Ok(self.mbids.get(artist).cloned())
        }

        async fn official_albums(&self, artist: &str) -> Result<Vec<ReleaseInfo>> {
            Ok(self.albums.get(artist).cloned().unwrap_or_default())
        }
    }

    /// Review pages served in order of request; `fail_first` requests fail transiently
    #[derive(Default)]
    pub struct FakeGuardian {
        pub pages: HashMap<u32, ReviewPage>,
        pub by_reference: HashMap<String, ReviewPage>,
        pub fail_first: Mutex<u32>,
        pub queries: Mutex<Vec<ReviewQuery>>,
    }

    #[async_trait]
    impl ReviewSource for FakeGuardian {
        async fn review_page(&self, query: &ReviewQuery) -> Result<ReviewPage> {
            if let Ok(mut queries) = self.queries.lock() {
                queries.push(query.clone());
            }
            if let Ok(mut remaining) = self.fail_first.lock() {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ImportError::Transient("502 Bad Gateway".to_string()));
                }
            }
            let empty = ReviewPage {
                pages: 1,
                results: Vec::new(),
            };
            let page = match &query.reference {
                Some(reference) => self.by_reference.get(reference),
                None => self.pages.get(&query.page),
            };
            Ok(page.cloned().unwrap_or(empty))
        }
    }
}
