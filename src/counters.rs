use crate::error::Result;
use crate::storage::Storage;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

/// How many entities had their upcoming gig count rewritten
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterRefreshSummary {
    pub artists: usize,
    pub venues: usize,
    pub towns: usize,
    pub promoters: usize,
}

fn count(counts: &HashMap<Uuid, u32>, id: &Uuid) -> u32 {
    counts.get(id).copied().unwrap_or(0)
}

/// Recount published gigs dated `today` or later for every artist, venue,
/// town and promoter, and store the counts.
#[instrument(skip(storage))]
pub async fn refresh_upcoming_gig_counts(
    storage: &dyn Storage,
    today: NaiveDate,
) -> Result<CounterRefreshSummary> {
    let venues = storage.get_all_venues().await?;
    let town_of: HashMap<Uuid, Uuid> = venues.iter().map(|v| (v.id, v.town_id)).collect();

    let mut by_artist: HashMap<Uuid, u32> = HashMap::new();
    let mut by_venue: HashMap<Uuid, u32> = HashMap::new();
    let mut by_town: HashMap<Uuid, u32> = HashMap::new();
    let mut by_promoter: HashMap<Uuid, u32> = HashMap::new();

    for gig in storage
        .get_all_gigs()
        .await?
        .iter()
        .filter(|g| g.is_upcoming(today))
    {
        *by_artist.entry(gig.artist_id).or_default() += 1;
        *by_venue.entry(gig.venue_id).or_default() += 1;
        if let Some(town_id) = town_of.get(&gig.venue_id) {
            *by_town.entry(*town_id).or_default() += 1;
        }
        if let Some(promoter_id) = gig.promoter_id {
            *by_promoter.entry(promoter_id).or_default() += 1;
        }
    }

    let now = Utc::now();
    let mut summary = CounterRefreshSummary::default();

    for mut artist in storage.get_all_artists().await? {
        artist.number_of_upcoming_gigs = count(&by_artist, &artist.id);
        artist.updated_at = now;
        storage.update_artist(&artist).await?;
        summary.artists += 1;
    }
    for mut venue in venues {
        venue.number_of_upcoming_gigs = count(&by_venue, &venue.id);
        venue.updated_at = now;
        storage.update_venue(&venue).await?;
        summary.venues += 1;
    }
    for mut town in storage.get_all_towns().await? {
        town.number_of_upcoming_gigs = count(&by_town, &town.id);
        town.updated_at = now;
        storage.update_town(&town).await?;
        summary.towns += 1;
    }
    for mut promoter in storage.get_all_promoters().await? {
        promoter.number_of_upcoming_gigs = count(&by_promoter, &promoter.id);
        promoter.updated_at = now;
        storage.update_promoter(&promoter).await?;
        summary.promoters += 1;
    }

    info!(
        "Refreshed upcoming gig counts: {} artists, {} venues, {} towns, {} promoters",
        summary.artists, summary.venues, summary.towns, summary.promoters
    );
    Ok(summary)
}
