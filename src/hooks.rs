use crate::error::Result;
use crate::storage::Storage;
use crate::types::Artist;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fetches external data for an artist the importer has just created
#[async_trait]
pub trait ArtistEnricher: Send + Sync {
    async fn enrich_new_artist(&self, artist: &Artist) -> Result<()>;
}

/// Side effects of artist lifecycle events
#[derive(Clone)]
pub struct ArtistHooks {
    storage: Arc<dyn Storage>,
    enricher: Option<Arc<dyn ArtistEnricher>>,
}

impl std::fmt::Debug for ArtistHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtistHooks")
            .field("storage", &"<Arc<dyn Storage>>")
            .field("enricher", &self.enricher.is_some())
            .finish()
    }
}

impl ArtistHooks {
    pub fn new(storage: Arc<dyn Storage>, enricher: Option<Arc<dyn ArtistEnricher>>) -> Self {
        Self { storage, enricher }
    }

    /// Run enrichment for a new artist. Failures are logged, never returned.
    pub async fn artist_created(&self, artist: &Artist) {
        let Some(enricher) = &self.enricher else {
            debug!("No enricher configured, skipping {}", artist.name);
            return;
        };
        if let Err(e) = enricher.enrich_new_artist(artist).await {
            warn!("Enrichment failed for new artist {}: {}", artist.name, e);
        }
    }

    /// Point upcoming gigs at the artist's current slug. Returns how many changed.
    pub async fn artist_updated(&self, artist: &Artist, today: NaiveDate) -> Result<usize> {
        let mut changed = 0;
        for mut gig in self.storage.get_gigs_by_artist(artist.id).await? {
            if gig.date < today || gig.slug == artist.slug {
                continue;
            }
            gig.slug = artist.slug.clone();
            gig.updated_at = Utc::now();
            self.storage.update_gig(&gig).await?;
            changed += 1;
        }
        if changed > 0 {
            info!("Updated slug of {} upcoming gigs for {}", changed, artist.name);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportError;
    use crate::storage::InMemoryStorage;
    use crate::types::{slugify, Gig, GigArgs, GigStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct FailingEnricher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArtistEnricher for FailingEnricher {
        async fn enrich_new_artist(&self, _artist: &Artist) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ImportError::Api {
                message: "service unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_enricher_failure_is_swallowed() {
        let storage = Arc::new(InMemoryStorage::new());
        let enricher = Arc::new(FailingEnricher {
            calls: AtomicUsize::new(0),
        });
        let hooks = ArtistHooks::new(storage, Some(enricher.clone()));

        hooks.artist_created(&Artist::new("Mogwai")).await;
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_artist_update_resyncs_upcoming_gig_slugs() {
        let storage = Arc::new(InMemoryStorage::new());
        let hooks = ArtistHooks::new(storage.clone(), None);
        let today = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();

        let mut artist = Artist::new("Idlewild");
        storage.create_artist(&artist).await.unwrap();
        let gig_on = |date: NaiveDate| {
            Gig::new(GigArgs {
                artist_id: artist.id,
                artist_slug: artist.slug.clone(),
                venue_id: Uuid::new_v4(),
                promoter_id: None,
                date,
                price: None,
                status: GigStatus::Normal,
                extra_information: None,
            })
        };
        let past = gig_on(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
        let upcoming = gig_on(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        storage.create_gig(&past).await.unwrap();
        storage.create_gig(&upcoming).await.unwrap();

        artist.name = "Idlewild (band)".to_string();
        artist.slug = slugify(&artist.name);
        storage.update_artist(&artist).await.unwrap();
        assert_eq!(hooks.artist_updated(&artist, today).await.unwrap(), 1);

        let past = storage.get_gig_by_id(past.id).await.unwrap().unwrap();
        let upcoming = storage.get_gig_by_id(upcoming.id).await.unwrap().unwrap();
        assert_eq!(past.slug, "idlewild");
        assert_eq!(upcoming.slug, "idlewild-band");
    }
}
