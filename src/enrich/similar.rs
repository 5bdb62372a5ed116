use crate::apis::ArtistMetadataSource;
use crate::error::{ImportError, Result};
use crate::storage::Storage;
use crate::types::Artist;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimilarSummary {
    pub artists: usize,
    pub links_added: usize,
    pub skipped: usize,
}

/// Links published artists with the Last.fm artists they resemble.
/// Links always go both ways.
pub struct SimilarArtistLinker {
    storage: Arc<dyn Storage>,
    lastfm: Arc<dyn ArtistMetadataSource>,
    threshold: f64,
    delay: Duration,
}

impl SimilarArtistLinker {
    pub fn new(
        storage: Arc<dyn Storage>,
        lastfm: Arc<dyn ArtistMetadataSource>,
        threshold: f64,
        delay: Duration,
    ) -> Self {
        Self {
            storage,
            lastfm,
            threshold,
            delay,
        }
    }

    /// Add `to` to the similar set of `from`. Returns false if already there.
    async fn add_link(&self, from: Uuid, to: Uuid) -> Result<bool> {
        let mut artist = self
            .storage
            .get_artist_by_id(from)
            .await?
            .ok_or_else(|| ImportError::NotFound(format!("artist {}", from)))?;
        if artist.similar_artist_ids.contains(&to) {
            return Ok(false);
        }
        artist.similar_artist_ids.push(to);
        artist.updated_at = Utc::now();
        self.storage.update_artist(&artist).await?;
        Ok(true)
    }

    async fn link_artist(&self, artist: &Artist) -> Result<usize> {
        let Some(similar) = self.lastfm.similar_artists(&artist.name).await? else {
            debug!("Last.fm does not know {}", artist.name);
            return Ok(0);
        };
        let mut added = 0;
        for candidate in similar.iter().filter(|s| s.score >= self.threshold) {
            let Some(other) = self.storage.get_artist_by_name(&candidate.name).await? else {
                continue;
            };
            if other.id == artist.id {
                continue;
            }
            if self.add_link(artist.id, other.id).await? {
                info!("{} similar ({:.3}) to {}", other.name, candidate.score, artist.name);
                added += 1;
            }
            if self.add_link(other.id, artist.id).await? {
                info!("{} similar ({:.3}) to {}", artist.name, candidate.score, other.name);
                added += 1;
            }
        }
        Ok(added)
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SimilarSummary> {
        let artists: Vec<Artist> = self
            .storage
            .get_all_artists()
            .await?
            .into_iter()
            .filter(|a| a.published)
            .collect();
        info!("Linking similar artists for {} artists", artists.len());
        let mut summary = SimilarSummary::default();
        for artist in artists {
            summary.artists += 1;
            match self.link_artist(&artist).await {
                Ok(added) => summary.links_added += added,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping similar artists for {}: {}", artist.name, e);
                    summary.skipped += 1;
                }
            }
            tokio::time::sleep(self.delay).await;
        }
        info!("Added {} similar artist links", summary.links_added);
        Ok(summary)
    }
}
