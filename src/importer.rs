use crate::error::Result;
use crate::reconcile::Reconciler;
use crate::storage::Storage;
use crate::types::*;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What happened to the gig for one scraped row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeType {
    Created,
    Updated,
    VenueChanged,
    NoChange,
}

/// A record of the change a scraped gig caused
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
    pub change_type: ChangeType,
    pub change_log: String,
    pub gig_id: Uuid,
    pub artist_id: Uuid,
    pub venue_id: Uuid,
    pub artist_created: bool,
    pub venue_created: bool,
}

impl ImportRecord {
    fn new(change_type: ChangeType, change_log: String, gig: &Gig) -> Self {
        Self {
            change_type,
            change_log,
            gig_id: gig.id,
            artist_id: gig.artist_id,
            venue_id: gig.venue_id,
            artist_created: false,
            venue_created: false,
        }
    }
}

/// Note appended to a gig that moved venue, after any existing note
pub fn venue_change_note(base: Option<&str>, from: &str, to: &str) -> String {
    let note = format!("Venue changed from {} to {}.", from, to);
    match base.map(|b| b.trim().trim_end_matches('.').trim_end()) {
        Some(base) if !base.is_empty() => format!("{}. {}", base, note),
        _ => note,
    }
}

/// The stored note followed by the newly scraped one. A new note the stored
/// one already contains is dropped.
pub fn merge_notes(existing: Option<&str>, incoming: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [existing, incoming]
        .into_iter()
        .flatten()
        .map(|n| n.trim().trim_end_matches('.').trim_end())
        .filter(|n| !n.is_empty())
        .collect();
    match parts.as_slice() {
        [] => None,
        [only] => Some(only.to_string()),
        [old, new, ..] if old.contains(new) => Some(old.to_string()),
        [old, new, ..] => Some(format!("{}. {}", old, new)),
    }
}

/// Writes scraped gigs into the catalogue
pub struct GigImporter {
    storage: Arc<dyn Storage>,
    reconciler: Reconciler,
}

impl std::fmt::Debug for GigImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GigImporter")
            .field("storage", &"<Arc<dyn Storage>>")
            .finish()
    }
}

impl GigImporter {
    pub fn new(storage: Arc<dyn Storage>, reconciler: Reconciler) -> Self {
        Self {
            storage,
            reconciler,
        }
    }

    /// Resolve every entity a scraped gig names, then create or update the gig
    #[instrument(skip(self, scraped), fields(gig = %scraped))]
    pub async fn import_gig(&self, scraped: &ScrapedGig) -> Result<ImportRecord> {
        let artist = self.reconciler.resolve_artist(&scraped.artist).await?;
        let town = self
            .reconciler
            .resolve_town(scraped.town.as_deref())
            .await?
            .into_inner();
        let venue = self.reconciler.resolve_venue(&scraped.venue, &town).await?;
        let promoter = self
            .reconciler
            .resolve_promoter(scraped.promoter.as_deref())
            .await?
            .map(|p| p.into_inner());

        let (artist_created, venue_created) = (artist.was_created(), venue.was_created());
        let (artist, venue) = (artist.into_inner(), venue.into_inner());

        let label = scraped.identifier_label();
        let (identifier, linked) = self.reconciler.resolve_gig_identifier(&label).await?;

        let mut record = match linked {
            Some(gig) => self.update_status(gig, scraped).await?,
            None => {
                self.place_gig(scraped, &artist, &venue, promoter.as_ref())
                    .await?
            }
        };
        self.storage
            .link_identifier(identifier.id, record.gig_id)
            .await?;

        record.artist_created = artist_created;
        record.venue_created = venue_created;
        Ok(record)
    }

    /// A gig seen for the first time under this label: an existing gig at the
    /// same venue, a venue change, or a new gig.
    async fn place_gig(
        &self,
        scraped: &ScrapedGig,
        artist: &Artist,
        venue: &Venue,
        promoter: Option<&Promoter>,
    ) -> Result<ImportRecord> {
        let same_day = self
            .storage
            .get_gigs_by_artist_and_date(artist.id, scraped.date)
            .await?;

        if let Some(gig) = same_day.iter().find(|g| g.venue_id == venue.id) {
            debug!("Gig already exists under another label: {}", gig.id);
            return self.update_status(gig.clone(), scraped).await;
        }

        if let Some(gig) = same_day.first() {
            if same_day.len() > 1 {
                warn!(
                    "{} gigs for {} on {}, moving the earliest created",
                    same_day.len(),
                    artist.name,
                    scraped.date
                );
            }
            return self
                .change_venue(gig.clone(), scraped, venue, promoter)
                .await;
        }

        let gig = Gig::new(GigArgs {
            artist_id: artist.id,
            artist_slug: artist.slug.clone(),
            venue_id: venue.id,
            promoter_id: promoter.map(|p| p.id),
            date: scraped.date,
            price: scraped.price,
            status: scraped.status,
            extra_information: scraped.info.clone(),
        });
        self.storage.create_gig(&gig).await?;
        info!("Created new gig: {} ({})", scraped, gig.id);
        Ok(ImportRecord::new(
            ChangeType::Created,
            format!("Created new gig: {}", scraped),
            &gig,
        ))
    }

    /// Only the sold out and cancelled flags follow the sheet for a known gig
    async fn update_status(&self, mut gig: Gig, scraped: &ScrapedGig) -> Result<ImportRecord> {
        let status = scraped.status;
        if gig.sold_out == status.sold_out() && gig.cancelled == status.cancelled() {
            debug!("No changes needed for gig: {}", scraped);
            return Ok(ImportRecord::new(
                ChangeType::NoChange,
                format!("No changes needed for gig: {}", scraped),
                &gig,
            ));
        }

        let previous = gig.status();
        gig.sold_out = status.sold_out();
        gig.cancelled = status.cancelled();
        gig.updated_at = Utc::now();
        self.storage.update_gig(&gig).await?;
        info!("Updated gig status: {} ({:?} -> {:?})", scraped, previous, status);
        Ok(ImportRecord::new(
            ChangeType::Updated,
            format!("Updated status of gig {} from {:?} to {:?}", scraped, previous, status),
            &gig,
        ))
    }

    async fn change_venue(
        &self,
        mut gig: Gig,
        scraped: &ScrapedGig,
        venue: &Venue,
        promoter: Option<&Promoter>,
    ) -> Result<ImportRecord> {
        let old_venue = self
            .storage
            .get_venue_by_id(gig.venue_id)
            .await?
            .map(|v| v.name)
            .unwrap_or_else(|| gig.venue_id.to_string());

        let base = merge_notes(gig.extra_information.as_deref(), scraped.info.as_deref());
        let note = venue_change_note(base.as_deref(), &old_venue, &venue.name);

        gig.venue_id = venue.id;
        gig.promoter_id = promoter.map(|p| p.id);
        gig.price = scraped.price;
        gig.sold_out = scraped.status.sold_out();
        gig.cancelled = scraped.status.cancelled();
        gig.extra_information = Some(note);
        gig.updated_at = Utc::now();
        self.storage.update_gig(&gig).await?;

        info!(
            "Venue changed for gig {} ({}): {} -> {}",
            scraped, gig.id, old_venue, venue.name
        );
        Ok(ImportRecord::new(
            ChangeType::VenueChanged,
            format!("Venue changed from {} to {} for {}", old_venue, venue.name, scraped),
            &gig,
        ))
    }
}
