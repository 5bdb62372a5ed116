use super::media::{album_cover_path, MediaStore};
use super::select_artists;
use crate::apis::{ArtistMetadataSource, ReleaseEvent, ReleaseInfo, ReleaseSource};
use crate::constants::RELEASE_COUNTRY_PREFERENCE;
use crate::error::Result;
use crate::storage::Storage;
use crate::types::{Album, Artist, ReleaseLocation};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlbumSummary {
    pub artists: usize,
    pub releases: usize,
    pub created: usize,
    pub covers: usize,
}

impl AlbumSummary {
    fn add(&mut self, other: &AlbumSummary) {
        self.artists += other.artists;
        self.releases += other.releases;
        self.created += other.created;
        self.covers += other.covers;
    }
}

/// "2010", "2010-02" or "2010-02-18" as a date, filling in day and month 1
pub fn parse_partial_date(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split('-').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let year: i32 = parts.first()?.parse().ok()?;
    let month: u32 = match parts.get(1) {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.get(2) {
        Some(d) => d.parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Release event of the most preferred country. A later event for the same
/// country replaces an earlier one.
pub fn preferred_release(events: &[ReleaseEvent]) -> Option<(ReleaseLocation, &str)> {
    RELEASE_COUNTRY_PREFERENCE.iter().find_map(|country| {
        let event = events.iter().rev().find(|e| e.country == *country)?;
        Some((ReleaseLocation::from_code(country)?, event.date.as_str()))
    })
}

/// Album set of artists from MusicBrainz, with cover art from Last.fm
pub struct AlbumImportJob {
    storage: Arc<dyn Storage>,
    releases: Arc<dyn ReleaseSource>,
    lastfm: Option<Arc<dyn ArtistMetadataSource>>,
    media: MediaStore,
    delay: Duration,
}

impl AlbumImportJob {
    pub fn new(
        storage: Arc<dyn Storage>,
        releases: Arc<dyn ReleaseSource>,
        lastfm: Option<Arc<dyn ArtistMetadataSource>>,
        media: MediaStore,
        delay: Duration,
    ) -> Self {
        Self {
            storage,
            releases,
            lastfm,
            media,
            delay,
        }
    }

    fn album_from_release(artist: &Artist, release: &ReleaseInfo, asin: &str) -> Album {
        let mut album = Album::new(artist.id, &release.title, asin, &release.mbid);
        if let Some((location, raw)) = preferred_release(&release.events) {
            album.released_in = Some(location);
            album.release_date_raw = Some(raw.to_string());
            album.release_date = parse_partial_date(raw);
            if album.release_date.is_none() {
                debug!("Ignoring release date '{}' of {}", raw, release.title);
            }
        }
        album
    }

    async fn fetch_cover(&self, artist: &Artist, album: &mut Album) -> Result<bool> {
        let Some(lastfm) = &self.lastfm else {
            return Ok(false);
        };
        let Some(url) = lastfm.album_cover_url(&artist.name, &album.title).await? else {
            return Ok(false);
        };
        let data = lastfm.fetch_image(&url).await?;
        let path = album_cover_path(&artist.name, &album.title);
        album.cover_art = Some(self.media.save(&path, &data).await?);
        self.storage.update_album(album).await?;
        Ok(true)
    }

    /// Create albums for the official releases of one artist that carry an ASIN
    #[instrument(skip(self, artist), fields(artist = %artist.name))]
    pub async fn import_for(&self, artist: &Artist) -> Result<AlbumSummary> {
        let mut summary = AlbumSummary {
            artists: 1,
            ..AlbumSummary::default()
        };
        for release in self.releases.official_albums(&artist.name).await? {
            let Some(asin) = release.asin.as_deref() else {
                continue;
            };
            summary.releases += 1;
            if self.storage.get_album_by_asin(asin).await?.is_some() {
                debug!("Album with ASIN {} already exists", asin);
                continue;
            }
            let mut album = Self::album_from_release(artist, &release, asin);
            self.storage.create_album(&album).await?;
            summary.created += 1;
            info!("Created album {} for {}", album.title, artist.name);

            match self.fetch_cover(artist, &mut album).await {
                Ok(stored) => summary.covers += usize::from(stored),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("No cover art for {}: {}", album.title, e),
            }
        }
        Ok(summary)
    }

    #[instrument(skip(self))]
    pub async fn run(&self, age_hours: u32) -> Result<AlbumSummary> {
        let artists = select_artists(self.storage.as_ref(), age_hours, Utc::now()).await?;
        info!("Importing albums for {} artists", artists.len());
        let mut summary = AlbumSummary::default();
        for artist in artists {
            match self.import_for(&artist).await {
                Ok(found) => summary.add(&found),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping albums for {}: {}", artist.name, e);
                    summary.artists += 1;
                }
            }
            tokio::time::sleep(self.delay).await;
        }
        info!(
            "Album import complete: {} albums created from {} releases",
            summary.created, summary.releases
        );
        Ok(summary)
    }
}
