use super::media::{artist_photo_path, MediaStore};
use super::select_artists;
use crate::apis::{ArtistInfo, ArtistMetadataSource, ReleaseSource};
use crate::error::Result;
use crate::hooks::ArtistHooks;
use crate::storage::Storage;
use crate::types::Artist;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("html tag pattern"));

pub fn strip_tags(html: &str) -> String {
    TAG_RE.replace_all(html, "").trim().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataSummary {
    pub artists: usize,
    pub photos: usize,
    pub biographies: usize,
    pub skipped: usize,
}

/// Photo, biography and MusicBrainz id for artists
pub struct ArtistMetadataJob {
    storage: Arc<dyn Storage>,
    lastfm: Arc<dyn ArtistMetadataSource>,
    musicbrainz: Option<Arc<dyn ReleaseSource>>,
    media: MediaStore,
    hooks: ArtistHooks,
    delay: Duration,
}

impl ArtistMetadataJob {
    pub fn new(
        storage: Arc<dyn Storage>,
        lastfm: Arc<dyn ArtistMetadataSource>,
        musicbrainz: Option<Arc<dyn ReleaseSource>>,
        media: MediaStore,
        delay: Duration,
    ) -> Self {
        let hooks = ArtistHooks::new(storage.clone(), None);
        Self {
            storage,
            lastfm,
            musicbrainz,
            media,
            hooks,
            delay,
        }
    }

    /// Last.fm biography, when it has been published and differs from ours
    pub fn apply_biography(artist: &mut Artist, info: &ArtistInfo) -> bool {
        let (Some(_), Some(content)) = (&info.bio_published, &info.biography) else {
            return false;
        };
        let plain = strip_tags(content);
        if plain != artist.biography || artist.biography.is_empty() {
            artist.biography = plain;
            return true;
        }
        false
    }

    async fn store_photo(&self, artist: &mut Artist, info: &ArtistInfo) -> Result<bool> {
        let Some(url) = &info.image_url else {
            debug!("No photo for {}", artist.name);
            return Ok(false);
        };
        let data = self.lastfm.fetch_image(url).await?;
        let photo = self.media.save(&artist_photo_path(&artist.slug), &data).await?;
        info!("Photo for {} added", artist.name);
        artist.photo = Some(photo);
        Ok(true)
    }

    async fn fetch_musicbrainz_id(&self, artist: &mut Artist) -> Result<bool> {
        let Some(musicbrainz) = &self.musicbrainz else {
            return Ok(false);
        };
        let Some(mbid) = musicbrainz.artist_mbid(&artist.name).await? else {
            return Ok(false);
        };
        if artist.mbid.as_deref() == Some(mbid.as_str()) {
            return Ok(false);
        }
        if let Some(other) = self.storage.get_artist_by_mbid(&mbid).await? {
            warn!(
                "MusicBrainz id {} for {} already belongs to {}",
                mbid, artist.name, other.name
            );
            return Ok(false);
        }
        artist.mbid = Some(mbid);
        Ok(true)
    }

    async fn save(&self, artist: &mut Artist) -> Result<()> {
        artist.updated_at = Utc::now();
        self.storage.update_artist(artist).await?;
        self.hooks
            .artist_updated(artist, Utc::now().date_naive())
            .await?;
        Ok(())
    }

    /// Photo, biography and MusicBrainz id for one artist
    #[instrument(skip(self, artist), fields(artist = %artist.name))]
    pub async fn enrich(&self, artist: &Artist) -> Result<MetadataSummary> {
        let mut artist = artist.clone();
        let mut summary = MetadataSummary {
            artists: 1,
            ..MetadataSummary::default()
        };
        match self.lastfm.artist_info(&artist.name).await? {
            Some(info) => {
                summary.photos += usize::from(self.store_photo(&mut artist, &info).await?);
                summary.biographies += usize::from(Self::apply_biography(&mut artist, &info));
            }
            None => debug!("Last.fm does not know {}", artist.name),
        }
        let mbid_changed = self.fetch_musicbrainz_id(&mut artist).await?;
        if summary.photos + summary.biographies > 0 || mbid_changed {
            self.save(&mut artist).await?;
        }
        Ok(summary)
    }

    /// Photo and biography for published artists, optionally only recent ones
    #[instrument(skip(self))]
    pub async fn run(&self, age_hours: u32) -> Result<MetadataSummary> {
        let artists = select_artists(self.storage.as_ref(), age_hours, Utc::now()).await?;
        info!("Importing metadata for {} artists", artists.len());
        let mut summary = MetadataSummary::default();
        for mut artist in artists {
            summary.artists += 1;
            let result = async {
                let Some(info) = self.lastfm.artist_info(&artist.name).await? else {
                    return Ok((false, false));
                };
                let photo = self.store_photo(&mut artist, &info).await?;
                let biography = Self::apply_biography(&mut artist, &info);
                if photo || biography {
                    self.save(&mut artist).await?;
                }
                Ok::<_, crate::error::ImportError>((photo, biography))
            }
            .await;
            match result {
                Ok((photo, biography)) => {
                    summary.photos += usize::from(photo);
                    summary.biographies += usize::from(biography);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping metadata for {}: {}", artist.name, e);
                    summary.skipped += 1;
                }
            }
            tokio::time::sleep(self.delay).await;
        }
        info!(
            "Metadata import complete: {} photos, {} biographies for {} artists",
            summary.photos, summary.biographies, summary.artists
        );
        Ok(summary)
    }

    /// Photos for every artist that has none
    #[instrument(skip(self))]
    pub async fn run_photos(&self) -> Result<MetadataSummary> {
        let artists: Vec<Artist> = self
            .storage
            .get_all_artists()
            .await?
            .into_iter()
            .filter(|a| a.photo.is_none())
            .collect();
        info!("Searching photos for {} artists", artists.len());
        let mut summary = MetadataSummary::default();
        for mut artist in artists {
            summary.artists += 1;
            debug!("Searching for a photo for {}", artist.name);
            let result = async {
                let Some(info) = self.lastfm.artist_info(&artist.name).await? else {
                    return Ok(false);
                };
                let stored = self.store_photo(&mut artist, &info).await?;
                if stored {
                    self.save(&mut artist).await?;
                }
                Ok::<_, crate::error::ImportError>(stored)
            }
            .await;
            match result {
                Ok(stored) => summary.photos += usize::from(stored),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping photo for {}: {}", artist.name, e);
                    summary.skipped += 1;
                }
            }
            tokio::time::sleep(self.delay).await;
        }
        info!("Photo import complete: {} photos added", summary.photos);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::fakes::{FakeLastfm, FakeMusicBrainz};
    use crate::storage::InMemoryStorage;

    fn info(image: Option<&str>, bio: Option<&str>, published: Option<&str>) -> ArtistInfo {
        ArtistInfo {
            image_url: image.map(str::to_string),
            biography: bio.map(str::to_string),
            bio_published: published.map(str::to_string),
        }
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(
            strip_tags("<p>Scottish <b>post-rock</b> band.</p> <a href=\"x\">Read more</a>"),
            "Scottish post-rock band. Read more"
        );
    }

    #[test]
    fn test_biography_requires_published_date() {
        let mut artist = Artist::new("Mogwai");
        assert!(!ArtistMetadataJob::apply_biography(
            &mut artist,
            &info(None, Some("Band"), None)
        ));
        assert!(ArtistMetadataJob::apply_biography(
            &mut artist,
            &info(None, Some("<b>Band</b>"), Some("01 Jan 2010"))
        ));
        assert_eq!(artist.biography, "Band");
        // Unchanged text needs no save
        assert!(!ArtistMetadataJob::apply_biography(
            &mut artist,
            &info(None, Some("Band"), Some("01 Jan 2010"))
        ));
    }

    #[tokio::test]
    async fn test_run_stores_photo_and_biography() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(InMemoryStorage::new());
        let mogwai = Artist::new("Mogwai");
        let unknown = Artist::new("Nobody Knows");
        storage.create_artist(&mogwai).await.unwrap();
        storage.create_artist(&unknown).await.unwrap();

        let mut lastfm = FakeLastfm::default();
        lastfm.info.insert(
            "Mogwai".to_string(),
            info(Some("http://img/mogwai.jpg"), Some("Glasgow band"), Some("2010")),
        );
        let job = ArtistMetadataJob::new(
            storage.clone(),
            Arc::new(lastfm),
            None,
            MediaStore::new(dir.path()),
            Duration::ZERO,
        );

        let summary = job.run(0).await.unwrap();
        assert_eq!(summary.artists, 2);
        assert_eq!(summary.photos, 1);
        assert_eq!(summary.biographies, 1);

        let mogwai = storage.get_artist_by_id(mogwai.id).await.unwrap().unwrap();
        assert_eq!(mogwai.photo.as_deref(), Some("gigs/img/artists/mogwai.jpg"));
        assert_eq!(mogwai.biography, "Glasgow band");
        assert!(dir.path().join("gigs/img/artists/mogwai.jpg").exists());
    }

    #[tokio::test]
    async fn test_service_failure_skips_artist() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(InMemoryStorage::new());
        storage.create_artist(&Artist::new("Broken")).await.unwrap();
        let lastfm = FakeLastfm {
            failing: vec!["Broken".to_string()],
            ..FakeLastfm::default()
        };
        let job = ArtistMetadataJob::new(
            storage,
            Arc::new(lastfm),
            None,
            MediaStore::new(dir.path()),
            Duration::ZERO,
        );
        let summary = job.run_photos().await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.photos, 0);
    }

    #[tokio::test]
    async fn test_enrich_sets_musicbrainz_id() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(InMemoryStorage::new());
        let artist = Artist::new("Biffy Clyro");
        storage.create_artist(&artist).await.unwrap();

        let mut musicbrainz = FakeMusicBrainz::default();
        musicbrainz
            .mbids
            .insert("Biffy Clyro".to_string(), "mbid-biffy".to_string());
        let job = ArtistMetadataJob::new(
            storage.clone(),
            Arc::new(FakeLastfm::default()),
            Some(Arc::new(musicbrainz)),
            MediaStore::new(dir.path()),
            Duration::ZERO,
        );

        job.enrich(&artist).await.unwrap();
        let stored = storage.get_artist_by_id(artist.id).await.unwrap().unwrap();
        assert_eq!(stored.mbid.as_deref(), Some("mbid-biffy"));
    }
}
