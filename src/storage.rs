use crate::error::{ImportError, Result};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Storage trait for the gig catalogue and its import identifiers.
///
/// Every call is atomic. Uniqueness constraints are enforced here and a
/// violation is reported as [`ImportError::Conflict`].
#[async_trait]
pub trait Storage: Send + Sync {
    // Import identifier operations
    async fn get_or_create_identifier(
        &self,
        identifier: &str,
        kind: IdentifierKind,
    ) -> Result<ImportIdentifier>;
    async fn link_identifier(&self, identifier_id: Uuid, entity_id: Uuid) -> Result<()>;
    /// Entity ids linked to an identifier, oldest link first
    async fn get_linked_entity_ids(&self, identifier_id: Uuid) -> Result<Vec<Uuid>>;
    async fn count_identifiers(&self) -> Result<usize>;

    // Artist operations
    async fn create_artist(&self, artist: &Artist) -> Result<()>;
    async fn update_artist(&self, artist: &Artist) -> Result<()>;
    async fn get_artist_by_id(&self, artist_id: Uuid) -> Result<Option<Artist>>;
    async fn get_artist_by_name(&self, name: &str) -> Result<Option<Artist>>;
    async fn get_artist_by_slug(&self, slug: &str) -> Result<Option<Artist>>;
    async fn get_artist_by_mbid(&self, mbid: &str) -> Result<Option<Artist>>;
    async fn get_all_artists(&self) -> Result<Vec<Artist>>;

    // Venue operations
    async fn create_venue(&self, venue: &Venue) -> Result<()>;
    async fn update_venue(&self, venue: &Venue) -> Result<()>;
    async fn get_venue_by_id(&self, venue_id: Uuid) -> Result<Option<Venue>>;
    async fn get_venue_by_slug(&self, slug: &str) -> Result<Option<Venue>>;
    async fn get_all_venues(&self) -> Result<Vec<Venue>>;

    // Town operations
    async fn create_town(&self, town: &Town) -> Result<()>;
    async fn update_town(&self, town: &Town) -> Result<()>;
    async fn get_town_by_id(&self, town_id: Uuid) -> Result<Option<Town>>;
    async fn get_town_by_name(&self, name: &str) -> Result<Option<Town>>;
    async fn get_town_by_slug(&self, slug: &str) -> Result<Option<Town>>;
    async fn get_all_towns(&self) -> Result<Vec<Town>>;

    // Promoter operations
    async fn create_promoter(&self, promoter: &Promoter) -> Result<()>;
    async fn update_promoter(&self, promoter: &Promoter) -> Result<()>;
    async fn get_promoter_by_id(&self, promoter_id: Uuid) -> Result<Option<Promoter>>;
    async fn get_promoter_by_name(&self, name: &str) -> Result<Option<Promoter>>;
    async fn get_promoter_by_slug(&self, slug: &str) -> Result<Option<Promoter>>;
    async fn get_all_promoters(&self) -> Result<Vec<Promoter>>;

    // Gig operations
    async fn create_gig(&self, gig: &Gig) -> Result<()>;
    async fn update_gig(&self, gig: &Gig) -> Result<()>;
    async fn get_gig_by_id(&self, gig_id: Uuid) -> Result<Option<Gig>>;
    /// Gigs of one artist on one date, earliest created first
    async fn get_gigs_by_artist_and_date(
        &self,
        artist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Gig>>;
    async fn get_gigs_by_artist(&self, artist_id: Uuid) -> Result<Vec<Gig>>;
    async fn get_all_gigs(&self) -> Result<Vec<Gig>>;

    // Album operations
    async fn create_album(&self, album: &Album) -> Result<()>;
    async fn update_album(&self, album: &Album) -> Result<()>;
    async fn get_album_by_asin(&self, asin: &str) -> Result<Option<Album>>;
    async fn get_albums_by_artist(&self, artist_id: Uuid) -> Result<Vec<Album>>;

    // Review operations
    async fn create_review(&self, review: &Review) -> Result<()>;
    async fn get_review_by_external_id(&self, external_id: &str) -> Result<Option<Review>>;
    async fn get_latest_review_date(&self) -> Result<Option<DateTime<Utc>>>;
}

fn lock<'a, T>(mutex: &'a Mutex<T>, table: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| ImportError::Storage(format!("{} table lock poisoned", table)))
}

fn conflict(what: impl Into<String>) -> ImportError {
    ImportError::Conflict(what.into())
}

fn not_found(kind: &str, id: Uuid) -> ImportError {
    ImportError::NotFound(format!("{} {}", kind, id))
}

/// In-memory storage implementation for development/testing
pub struct InMemoryStorage {
    identifiers: Arc<Mutex<HashMap<(String, IdentifierKind), ImportIdentifier>>>,
    identifier_links: Arc<Mutex<Vec<(Uuid, Uuid)>>>,
    artists: Arc<Mutex<HashMap<Uuid, Artist>>>,
    venues: Arc<Mutex<HashMap<Uuid, Venue>>>,
    towns: Arc<Mutex<HashMap<Uuid, Town>>>,
    promoters: Arc<Mutex<HashMap<Uuid, Promoter>>>,
    gigs: Arc<Mutex<HashMap<Uuid, Gig>>>,
    albums: Arc<Mutex<HashMap<Uuid, Album>>>,
    reviews: Arc<Mutex<HashMap<Uuid, Review>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            identifiers: Arc::new(Mutex::new(HashMap::new())),
            identifier_links: Arc::new(Mutex::new(Vec::new())),
            artists: Arc::new(Mutex::new(HashMap::new())),
            venues: Arc::new(Mutex::new(HashMap::new())),
            towns: Arc::new(Mutex::new(HashMap::new())),
            promoters: Arc::new(Mutex::new(HashMap::new())),
            gigs: Arc::new(Mutex::new(HashMap::new())),
            albums: Arc::new(Mutex::new(HashMap::new())),
            reviews: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn check_artist(artists: &HashMap<Uuid, Artist>, artist: &Artist) -> Result<()> {
        for other in artists.values().filter(|a| a.id != artist.id) {
            if other.name == artist.name {
                return Err(conflict(format!("artist name '{}'", artist.name)));
            }
            if other.slug == artist.slug {
                return Err(conflict(format!("artist slug '{}'", artist.slug)));
            }
            if artist.mbid.is_some() && other.mbid == artist.mbid {
                return Err(conflict(format!("artist mbid {:?}", artist.mbid)));
            }
        }
        Ok(())
    }

    fn check_venue(venues: &HashMap<Uuid, Venue>, venue: &Venue) -> Result<()> {
        if venues
            .values()
            .any(|v| v.id != venue.id && v.slug == venue.slug)
        {
            return Err(conflict(format!("venue slug '{}'", venue.slug)));
        }
        Ok(())
    }

    fn check_town(towns: &HashMap<Uuid, Town>, town: &Town) -> Result<()> {
        for other in towns.values().filter(|t| t.id != town.id) {
            if other.name == town.name {
                return Err(conflict(format!("town name '{}'", town.name)));
            }
            if other.slug == town.slug {
                return Err(conflict(format!("town slug '{}'", town.slug)));
            }
        }
        Ok(())
    }

    fn check_promoter(promoters: &HashMap<Uuid, Promoter>, promoter: &Promoter) -> Result<()> {
        for other in promoters.values().filter(|p| p.id != promoter.id) {
            if other.name == promoter.name {
                return Err(conflict(format!("promoter name '{}'", promoter.name)));
            }
            if other.slug == promoter.slug {
                return Err(conflict(format!("promoter slug '{}'", promoter.slug)));
            }
        }
        Ok(())
    }

    fn check_gig(gigs: &HashMap<Uuid, Gig>, gig: &Gig) -> Result<()> {
        for other in gigs.values().filter(|g| g.id != gig.id && g.date == gig.date) {
            if other.artist_id == gig.artist_id && other.venue_id == gig.venue_id {
                return Err(conflict(format!(
                    "gig for artist {} at venue {} on {}",
                    gig.artist_id, gig.venue_id, gig.date
                )));
            }
            if other.slug == gig.slug {
                return Err(conflict(format!("gig slug '{}' on {}", gig.slug, gig.date)));
            }
        }
        Ok(())
    }

    fn check_album(albums: &HashMap<Uuid, Album>, album: &Album) -> Result<()> {
        for other in albums.values().filter(|a| a.id != album.id) {
            if other.mbid == album.mbid {
                return Err(conflict(format!("album mbid '{}'", album.mbid)));
            }
            if other.title == album.title
                && other.artist_id == album.artist_id
                && other.asin == album.asin
            {
                return Err(conflict(format!("album '{}' ({})", album.title, album.asin)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get_or_create_identifier(
        &self,
        identifier: &str,
        kind: IdentifierKind,
    ) -> Result<ImportIdentifier> {
        let mut identifiers = lock(&self.identifiers, "import_identifiers")?;
        let entry = identifiers
            .entry((identifier.to_string(), kind))
            .or_insert_with(|| {
                debug!("Created {} identifier '{}'", kind, identifier);
                ImportIdentifier::new(identifier, kind)
            });
        Ok(entry.clone())
    }

    async fn link_identifier(&self, identifier_id: Uuid, entity_id: Uuid) -> Result<()> {
        let mut links = lock(&self.identifier_links, "identifier_links")?;
        if !links.contains(&(identifier_id, entity_id)) {
            links.push((identifier_id, entity_id));
        }
        Ok(())
    }

    async fn get_linked_entity_ids(&self, identifier_id: Uuid) -> Result<Vec<Uuid>> {
        let links = lock(&self.identifier_links, "identifier_links")?;
        Ok(links
            .iter()
            .filter(|(id, _)| *id == identifier_id)
            .map(|(_, entity_id)| *entity_id)
            .collect())
    }

    async fn count_identifiers(&self) -> Result<usize> {
        Ok(lock(&self.identifiers, "import_identifiers")?.len())
    }

    async fn create_artist(&self, artist: &Artist) -> Result<()> {
        let mut artists = lock(&self.artists, "artists")?;
        Self::check_artist(&artists, artist)?;
        artists.insert(artist.id, artist.clone());
        debug!("Created artist: {} with id {}", artist.name, artist.id);
        Ok(())
    }

    async fn update_artist(&self, artist: &Artist) -> Result<()> {
        let mut artists = lock(&self.artists, "artists")?;
        if !artists.contains_key(&artist.id) {
            return Err(not_found("artist", artist.id));
        }
        Self::check_artist(&artists, artist)?;
        artists.insert(artist.id, artist.clone());
        Ok(())
    }

    async fn get_artist_by_id(&self, artist_id: Uuid) -> Result<Option<Artist>> {
        Ok(lock(&self.artists, "artists")?.get(&artist_id).cloned())
    }

    async fn get_artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        let artists = lock(&self.artists, "artists")?;
        Ok(artists.values().find(|a| a.name == name).cloned())
    }

    async fn get_artist_by_slug(&self, slug: &str) -> Result<Option<Artist>> {
        let artists = lock(&self.artists, "artists")?;
        Ok(artists.values().find(|a| a.slug == slug).cloned())
    }

    async fn get_artist_by_mbid(&self, mbid: &str) -> Result<Option<Artist>> {
        let artists = lock(&self.artists, "artists")?;
        Ok(artists
            .values()
            .find(|a| a.mbid.as_deref() == Some(mbid))
            .cloned())
    }

    async fn get_all_artists(&self) -> Result<Vec<Artist>> {
        let artists = lock(&self.artists, "artists")?;
        let mut all: Vec<Artist> = artists.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_venue(&self, venue: &Venue) -> Result<()> {
        let mut venues = lock(&self.venues, "venues")?;
        Self::check_venue(&venues, venue)?;
        venues.insert(venue.id, venue.clone());
        debug!("Created venue: {} with id {}", venue.name, venue.id);
        Ok(())
    }

    async fn update_venue(&self, venue: &Venue) -> Result<()> {
        let mut venues = lock(&self.venues, "venues")?;
        if !venues.contains_key(&venue.id) {
            return Err(not_found("venue", venue.id));
        }
        Self::check_venue(&venues, venue)?;
        venues.insert(venue.id, venue.clone());
        Ok(())
    }

    async fn get_venue_by_id(&self, venue_id: Uuid) -> Result<Option<Venue>> {
        Ok(lock(&self.venues, "venues")?.get(&venue_id).cloned())
    }

    async fn get_venue_by_slug(&self, slug: &str) -> Result<Option<Venue>> {
        let venues = lock(&self.venues, "venues")?;
        Ok(venues.values().find(|v| v.slug == slug).cloned())
    }

    async fn get_all_venues(&self) -> Result<Vec<Venue>> {
        let venues = lock(&self.venues, "venues")?;
        let mut all: Vec<Venue> = venues.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_town(&self, town: &Town) -> Result<()> {
        let mut towns = lock(&self.towns, "towns")?;
        Self::check_town(&towns, town)?;
        towns.insert(town.id, town.clone());
        debug!("Created town: {} with id {}", town.name, town.id);
        Ok(())
    }

    async fn update_town(&self, town: &Town) -> Result<()> {
        let mut towns = lock(&self.towns, "towns")?;
        if !towns.contains_key(&town.id) {
            return Err(not_found("town", town.id));
        }
        Self::check_town(&towns, town)?;
        towns.insert(town.id, town.clone());
        Ok(())
    }

    async fn get_town_by_id(&self, town_id: Uuid) -> Result<Option<Town>> {
        Ok(lock(&self.towns, "towns")?.get(&town_id).cloned())
    }

    async fn get_town_by_name(&self, name: &str) -> Result<Option<Town>> {
        let towns = lock(&self.towns, "towns")?;
        Ok(towns.values().find(|t| t.name == name).cloned())
    }

    async fn get_town_by_slug(&self, slug: &str) -> Result<Option<Town>> {
        let towns = lock(&self.towns, "towns")?;
        Ok(towns.values().find(|t| t.slug == slug).cloned())
    }

    async fn get_all_towns(&self) -> Result<Vec<Town>> {
        let towns = lock(&self.towns, "towns")?;
        let mut all: Vec<Town> = towns.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_promoter(&self, promoter: &Promoter) -> Result<()> {
        let mut promoters = lock(&self.promoters, "promoters")?;
        Self::check_promoter(&promoters, promoter)?;
        promoters.insert(promoter.id, promoter.clone());
        debug!("Created promoter: {} with id {}", promoter.name, promoter.id);
        Ok(())
    }

    async fn update_promoter(&self, promoter: &Promoter) -> Result<()> {
        let mut promoters = lock(&self.promoters, "promoters")?;
        if !promoters.contains_key(&promoter.id) {
            return Err(not_found("promoter", promoter.id));
        }
        Self::check_promoter(&promoters, promoter)?;
        promoters.insert(promoter.id, promoter.clone());
        Ok(())
    }

    async fn get_promoter_by_id(&self, promoter_id: Uuid) -> Result<Option<Promoter>> {
        Ok(lock(&self.promoters, "promoters")?.get(&promoter_id).cloned())
    }

    async fn get_promoter_by_name(&self, name: &str) -> Result<Option<Promoter>> {
        let promoters = lock(&self.promoters, "promoters")?;
        Ok(promoters.values().find(|p| p.name == name).cloned())
    }

    async fn get_promoter_by_slug(&self, slug: &str) -> Result<Option<Promoter>> {
        let promoters = lock(&self.promoters, "promoters")?;
        Ok(promoters.values().find(|p| p.slug == slug).cloned())
    }

    async fn get_all_promoters(&self) -> Result<Vec<Promoter>> {
        let promoters = lock(&self.promoters, "promoters")?;
        let mut all: Vec<Promoter> = promoters.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_gig(&self, gig: &Gig) -> Result<()> {
        let mut gigs = lock(&self.gigs, "gigs")?;
        Self::check_gig(&gigs, gig)?;
        gigs.insert(gig.id, gig.clone());
        debug!("Created gig: {} on {} with id {}", gig.slug, gig.date, gig.id);
        Ok(())
    }

    async fn update_gig(&self, gig: &Gig) -> Result<()> {
        let mut gigs = lock(&self.gigs, "gigs")?;
        if !gigs.contains_key(&gig.id) {
            return Err(not_found("gig", gig.id));
        }
        Self::check_gig(&gigs, gig)?;
        gigs.insert(gig.id, gig.clone());
        Ok(())
    }

    async fn get_gig_by_id(&self, gig_id: Uuid) -> Result<Option<Gig>> {
        Ok(lock(&self.gigs, "gigs")?.get(&gig_id).cloned())
    }

    async fn get_gigs_by_artist_and_date(
        &self,
        artist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Gig>> {
        let gigs = lock(&self.gigs, "gigs")?;
        let mut matching: Vec<Gig> = gigs
            .values()
            .filter(|g| g.artist_id == artist_id && g.date == date)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn get_gigs_by_artist(&self, artist_id: Uuid) -> Result<Vec<Gig>> {
        let gigs = lock(&self.gigs, "gigs")?;
        let mut matching: Vec<Gig> = gigs
            .values()
            .filter(|g| g.artist_id == artist_id)
            .cloned()
            .collect();
        matching.sort_by_key(|g| g.date);
        Ok(matching)
    }

    async fn get_all_gigs(&self) -> Result<Vec<Gig>> {
        let gigs = lock(&self.gigs, "gigs")?;
        let mut all: Vec<Gig> = gigs.values().cloned().collect();
        all.sort_by(|a, b| a.date.cmp(&b.date).then(a.slug.cmp(&b.slug)));
        Ok(all)
    }

    async fn create_album(&self, album: &Album) -> Result<()> {
        let mut albums = lock(&self.albums, "albums")?;
        Self::check_album(&albums, album)?;
        albums.insert(album.id, album.clone());
        debug!("Created album: {} with id {}", album.title, album.id);
        Ok(())
    }

    async fn update_album(&self, album: &Album) -> Result<()> {
        let mut albums = lock(&self.albums, "albums")?;
        if !albums.contains_key(&album.id) {
            return Err(not_found("album", album.id));
        }
        Self::check_album(&albums, album)?;
        albums.insert(album.id, album.clone());
        Ok(())
    }

    async fn get_album_by_asin(&self, asin: &str) -> Result<Option<Album>> {
        let albums = lock(&self.albums, "albums")?;
        Ok(albums.values().find(|a| a.asin == asin).cloned())
    }

    async fn get_albums_by_artist(&self, artist_id: Uuid) -> Result<Vec<Album>> {
        let albums = lock(&self.albums, "albums")?;
        let mut matching: Vec<Album> = albums
            .values()
            .filter(|a| a.artist_id == artist_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(matching)
    }

    async fn create_review(&self, review: &Review) -> Result<()> {
        let mut reviews = lock(&self.reviews, "reviews")?;
        if reviews
            .values()
            .any(|r| r.external_id == review.external_id)
        {
            return Err(conflict(format!("review '{}'", review.external_id)));
        }
        reviews.insert(review.id, review.clone());
        debug!("Created review: {} with id {}", review.headline, review.id);
        Ok(())
    }

    async fn get_review_by_external_id(&self, external_id: &str) -> Result<Option<Review>> {
        let reviews = lock(&self.reviews, "reviews")?;
        Ok(reviews
            .values()
            .find(|r| r.external_id == external_id)
            .cloned())
    }

    async fn get_latest_review_date(&self) -> Result<Option<DateTime<Utc>>> {
        let reviews = lock(&self.reviews, "reviews")?;
        Ok(reviews.values().map(|r| r.publication_date).max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gig_for(artist: &Artist, venue_id: Uuid, date: NaiveDate) -> Gig {
        Gig::new(GigArgs {
            artist_id: artist.id,
            artist_slug: artist.slug.clone(),
            venue_id,
            promoter_id: None,
            date,
            price: None,
            status: GigStatus::Normal,
            extra_information: None,
        })
    }

    #[tokio::test]
    async fn test_identifier_get_or_create_is_idempotent() {
        let storage = InMemoryStorage::new();
        let first = storage
            .get_or_create_identifier("Biffy Clyro", IdentifierKind::Artist)
            .await
            .unwrap();
        let second = storage
            .get_or_create_identifier("Biffy Clyro", IdentifierKind::Artist)
            .await
            .unwrap();
        let other_kind = storage
            .get_or_create_identifier("Biffy Clyro", IdentifierKind::Venue)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other_kind.id);
        assert_eq!(storage.count_identifiers().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_links_keep_insertion_order() {
        let storage = InMemoryStorage::new();
        let identifier = storage
            .get_or_create_identifier("Usher Hall", IdentifierKind::Venue)
            .await
            .unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        storage.link_identifier(identifier.id, a).await.unwrap();
        storage.link_identifier(identifier.id, b).await.unwrap();
        storage.link_identifier(identifier.id, a).await.unwrap();

        let linked = storage.get_linked_entity_ids(identifier.id).await.unwrap();
        assert_eq!(linked, vec![a, b]);
    }

    #[tokio::test]
    async fn test_duplicate_artist_name_is_a_conflict() {
        let storage = InMemoryStorage::new();
        storage.create_artist(&Artist::new("Mogwai")).await.unwrap();
        let err = storage.create_artist(&Artist::new("Mogwai")).await.unwrap_err();
        assert!(matches!(err, ImportError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_gig_uniqueness_per_artist_venue_date() {
        let storage = InMemoryStorage::new();
        let artist = Artist::new("Mogwai");
        let venue_id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2024, 11, 1).unwrap();

        storage.create_gig(&gig_for(&artist, venue_id, date)).await.unwrap();
        let err = storage
            .create_gig(&gig_for(&artist, venue_id, date))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Conflict(_)));

        // A second gig on the same date clashes on the slug as well
        let err = storage
            .create_gig(&gig_for(&artist, Uuid::new_v4(), date))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_missing_entity_is_not_found() {
        let storage = InMemoryStorage::new();
        let err = storage.update_town(&Town::new("Leith")).await.unwrap_err();
        assert!(matches!(err, ImportError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_latest_review_date() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.get_latest_review_date().await.unwrap(), None);

        let artist_id = Uuid::new_v4();
        let older = DateTime::parse_from_rfc3339("2023-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let newer = DateTime::parse_from_rfc3339("2024-02-11T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        for (external_id, publication_date) in [("music/a", older), ("music/b", newer)] {
            storage
                .create_review(&Review {
                    id: Uuid::new_v4(),
                    artist_id,
                    external_id: external_id.to_string(),
                    publication_date,
                    headline: "Headline".to_string(),
                    trail: String::new(),
                    byline: String::new(),
                    url: String::new(),
                    rating: 4,
                })
                .await
                .unwrap();
        }
        assert_eq!(storage.get_latest_review_date().await.unwrap(), Some(newer));
    }
}
