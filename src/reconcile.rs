//! Maps scraped labels to canonical catalogue entities through import
//! identifiers. An identifier is created the first time a label is seen and
//! linked to whichever entity that label resolved to.

use crate::constants::DEFAULT_TOWN;
use crate::error::Result;
use crate::hooks::ArtistHooks;
use crate::storage::Storage;
use crate::types::*;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Outcome of resolving a label
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<T> {
    Found(T),
    Created(T),
}

impl<T> Resolved<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, Resolved::Created(_))
    }

    pub fn entity(&self) -> &T {
        match self {
            Resolved::Found(e) | Resolved::Created(e) => e,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Resolved::Found(e) | Resolved::Created(e) => e,
        }
    }
}

pub struct Reconciler {
    storage: Arc<dyn Storage>,
    hooks: ArtistHooks,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("storage", &"<Arc<dyn Storage>>")
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Reconciler {
    pub fn new(storage: Arc<dyn Storage>, hooks: ArtistHooks) -> Self {
        Self { storage, hooks }
    }

    /// First linked entity that `load` can find. Links to other kinds are skipped.
    async fn first_linked<T, F, Fut>(&self, identifier: &ImportIdentifier, load: F) -> Result<Option<T>>
    where
        F: Fn(Uuid) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for entity_id in self.storage.get_linked_entity_ids(identifier.id).await? {
            if let Some(entity) = load(entity_id).await? {
                return Ok(Some(entity));
            }
        }
        Ok(None)
    }

    #[instrument(skip(self))]
    pub async fn resolve_artist(&self, label: &str) -> Result<Resolved<Artist>> {
        let identifier = self
            .storage
            .get_or_create_identifier(label, IdentifierKind::Artist)
            .await?;
        if let Some(artist) = self
            .first_linked(&identifier, |id| self.storage.get_artist_by_id(id))
            .await?
        {
            debug!("Found existing artist: {} ({})", artist.name, artist.id);
            return Ok(Resolved::Found(artist));
        }

        // An unlinked identifier can still name an artist that already exists,
        // possibly spelt with different case or punctuation
        if let Some(artist) = self.existing_artist(label).await? {
            self.storage.link_identifier(identifier.id, artist.id).await?;
            debug!("Linked identifier '{}' to artist {}", label, artist.id);
            return Ok(Resolved::Found(artist));
        }

        let artist = Artist::new(label);
        self.storage.create_artist(&artist).await?;
        self.storage.link_identifier(identifier.id, artist.id).await?;
        info!("Created new artist: {} ({})", artist.name, artist.id);

        self.hooks.artist_created(&artist).await;
        let artist = self
            .storage
            .get_artist_by_id(artist.id)
            .await?
            .unwrap_or(artist);
        Ok(Resolved::Created(artist))
    }

    /// Town named by the row, or the default town when the row names none
    #[instrument(skip(self))]
    pub async fn resolve_town(&self, label: Option<&str>) -> Result<Resolved<Town>> {
        let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
            return self.default_town().await;
        };
        let identifier = self
            .storage
            .get_or_create_identifier(label, IdentifierKind::Town)
            .await?;
        if let Some(town) = self
            .first_linked(&identifier, |id| self.storage.get_town_by_id(id))
            .await?
        {
            return Ok(Resolved::Found(town));
        }

        let resolved = self.find_or_create_town(label).await?;
        self.storage
            .link_identifier(identifier.id, resolved.entity().id)
            .await?;
        Ok(resolved)
    }

    async fn default_town(&self) -> Result<Resolved<Town>> {
        self.find_or_create_town(DEFAULT_TOWN).await
    }

    async fn existing_artist(&self, label: &str) -> Result<Option<Artist>> {
        if let Some(artist) = self.storage.get_artist_by_name(label).await? {
            return Ok(Some(artist));
        }
        match non_empty_slug(label) {
            Some(slug) => self.storage.get_artist_by_slug(&slug).await,
            None => Ok(None),
        }
    }

    async fn find_or_create_town(&self, name: &str) -> Result<Resolved<Town>> {
        if let Some(town) = self.storage.get_town_by_name(name).await? {
            return Ok(Resolved::Found(town));
        }
        if let Some(slug) = non_empty_slug(name) {
            if let Some(town) = self.storage.get_town_by_slug(&slug).await? {
                return Ok(Resolved::Found(town));
            }
        }
        let town = Town::new(name);
        self.storage.create_town(&town).await?;
        info!("Created new town: {} ({})", town.name, town.id);
        Ok(Resolved::Created(town))
    }

    /// Venue for a label. A new venue is placed in `town`.
    #[instrument(skip(self, town), fields(town = %town.name))]
    pub async fn resolve_venue(&self, label: &str, town: &Town) -> Result<Resolved<Venue>> {
        let identifier = self
            .storage
            .get_or_create_identifier(label, IdentifierKind::Venue)
            .await?;
        if let Some(venue) = self
            .first_linked(&identifier, |id| self.storage.get_venue_by_id(id))
            .await?
        {
            debug!("Found existing venue: {} ({})", venue.name, venue.id);
            return Ok(Resolved::Found(venue));
        }

        if let Some(slug) = non_empty_slug(label) {
            if let Some(venue) = self.storage.get_venue_by_slug(&slug).await? {
                self.storage.link_identifier(identifier.id, venue.id).await?;
                debug!("Linked identifier '{}' to venue {}", label, venue.id);
                return Ok(Resolved::Found(venue));
            }
        }

        let venue = Venue::new(label, town.id);
        self.storage.create_venue(&venue).await?;
        self.storage.link_identifier(identifier.id, venue.id).await?;
        info!("Created new venue: {} ({}) in {}", venue.name, venue.id, town.name);
        Ok(Resolved::Created(venue))
    }

    /// Promoter for a code such as "DF". No code means no promoter.
    #[instrument(skip(self))]
    pub async fn resolve_promoter(&self, label: Option<&str>) -> Result<Option<Resolved<Promoter>>> {
        let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
            return Ok(None);
        };
        let identifier = self
            .storage
            .get_or_create_identifier(label, IdentifierKind::Promoter)
            .await?;
        if let Some(promoter) = self
            .first_linked(&identifier, |id| self.storage.get_promoter_by_id(id))
            .await?
        {
            return Ok(Some(Resolved::Found(promoter)));
        }

        let existing = match self.storage.get_promoter_by_name(label).await? {
            Some(promoter) => Some(promoter),
            None => match non_empty_slug(label) {
                Some(slug) => self.storage.get_promoter_by_slug(&slug).await?,
                None => None,
            },
        };
        let resolved = match existing {
            Some(promoter) => Resolved::Found(promoter),
            None => {
                let promoter = Promoter::new(label);
                self.storage.create_promoter(&promoter).await?;
                info!("Created new promoter: {} ({})", promoter.name, promoter.id);
                Resolved::Created(promoter)
            }
        };
        self.storage
            .link_identifier(identifier.id, resolved.entity().id)
            .await?;
        Ok(Some(resolved))
    }

    /// The gig identifier for a label and the gig it already links, if any.
    /// Gigs are never created here.
    #[instrument(skip(self))]
    pub async fn resolve_gig_identifier(
        &self,
        label: &str,
    ) -> Result<(ImportIdentifier, Option<Gig>)> {
        let identifier = self
            .storage
            .get_or_create_identifier(label, IdentifierKind::Gig)
            .await?;
        let gig = self
            .first_linked(&identifier, |id| self.storage.get_gig_by_id(id))
            .await?;
        Ok((identifier, gig))
    }
}

fn non_empty_slug(label: &str) -> Option<String> {
    Some(slugify(label)).filter(|slug| !slug.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn reconciler() -> (Arc<InMemoryStorage>, Reconciler) {
        let storage = Arc::new(InMemoryStorage::new());
        let hooks = ArtistHooks::new(storage.clone(), None);
        (storage.clone(), Reconciler::new(storage, hooks))
    }

    #[tokio::test]
    async fn test_same_label_resolves_to_same_artist() {
        let (storage, reconciler) = reconciler();
        let first = reconciler.resolve_artist("Biffy Clyro").await.unwrap();
        let second = reconciler.resolve_artist("Biffy Clyro").await.unwrap();

        assert!(first.was_created());
        assert!(!second.was_created());
        assert_eq!(first.entity().id, second.entity().id);
        assert_eq!(first.entity().slug, "biffy-clyro");
        assert_eq!(storage.get_all_artists().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_alias_label_links_to_existing_entity() {
        let (storage, reconciler) = reconciler();
        let artist = reconciler.resolve_artist("Mogwai").await.unwrap().into_inner();

        let alias = storage
            .get_or_create_identifier("MOGWAI (live)", IdentifierKind::Artist)
            .await
            .unwrap();
        storage.link_identifier(alias.id, artist.id).await.unwrap();

        let resolved = reconciler.resolve_artist("MOGWAI (live)").await.unwrap();
        assert_eq!(resolved, Resolved::Found(artist));
    }

    #[tokio::test]
    async fn test_spelling_variants_share_one_entity() {
        let (storage, reconciler) = reconciler();
        let mogwai = reconciler.resolve_artist("Mogwai").await.unwrap().into_inner();
        let shouted = reconciler.resolve_artist("MOGWAI").await.unwrap();
        assert_eq!(shouted, Resolved::Found(mogwai.clone()));

        let biffy = reconciler.resolve_artist("Biffy Clyro").await.unwrap().into_inner();
        let excited = reconciler.resolve_artist("Biffy Clyro!").await.unwrap();
        assert_eq!(excited.entity().id, biffy.id);
        assert_eq!(storage.get_all_artists().await.unwrap().len(), 2);

        // The variant is now linked, so the next lookup goes through its identifier
        let identifier = storage
            .get_or_create_identifier("MOGWAI", IdentifierKind::Artist)
            .await
            .unwrap();
        assert_eq!(
            storage.get_linked_entity_ids(identifier.id).await.unwrap(),
            vec![mogwai.id]
        );

        let town = reconciler.resolve_town(Some("Glasgow")).await.unwrap().into_inner();
        let upper = reconciler.resolve_town(Some("GLASGOW")).await.unwrap();
        assert_eq!(upper.entity().id, town.id);

        let df = reconciler.resolve_promoter(Some("DF")).await.unwrap().unwrap();
        let lower = reconciler.resolve_promoter(Some("df")).await.unwrap().unwrap();
        assert!(!lower.was_created());
        assert_eq!(lower.entity().id, df.entity().id);
    }

    #[tokio::test]
    async fn test_unsluggable_labels_create_distinct_artists() {
        let (storage, reconciler) = reconciler();
        let bangs = reconciler.resolve_artist("!!!").await.unwrap();
        let marks = reconciler.resolve_artist("???").await.unwrap();
        assert!(bangs.was_created() && marks.was_created());
        assert_ne!(bangs.entity().id, marks.entity().id);

        let again = reconciler.resolve_artist("!!!").await.unwrap();
        assert_eq!(again.entity().id, bangs.entity().id);
        assert_eq!(storage.get_all_artists().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_links_to_other_kinds_are_ignored() {
        let (storage, reconciler) = reconciler();
        let town = reconciler.resolve_town(Some("Glasgow")).await.unwrap().into_inner();

        // Wrongly linked to a town first, then to the real venue
        let identifier = storage
            .get_or_create_identifier("Barrowlands", IdentifierKind::Venue)
            .await
            .unwrap();
        storage.link_identifier(identifier.id, town.id).await.unwrap();
        let venue = Venue::new("Barrowlands", town.id);
        storage.create_venue(&venue).await.unwrap();
        storage.link_identifier(identifier.id, venue.id).await.unwrap();

        let resolved = reconciler.resolve_venue("Barrowlands", &town).await.unwrap();
        assert_eq!(resolved.entity().id, venue.id);
    }

    #[tokio::test]
    async fn test_missing_town_uses_default() {
        let (storage, reconciler) = reconciler();
        let town = reconciler.resolve_town(None).await.unwrap();
        assert_eq!(town.entity().name, DEFAULT_TOWN);
        let again = reconciler.resolve_town(Some("  ")).await.unwrap();
        assert_eq!(again.entity().id, town.entity().id);
        // The default town never needs an identifier
        assert_eq!(storage.count_identifiers().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_named_default_town_is_shared() {
        let (storage, reconciler) = reconciler();
        let defaulted = reconciler.resolve_town(None).await.unwrap().into_inner();
        let named = reconciler
            .resolve_town(Some(DEFAULT_TOWN))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(defaulted.id, named.id);
        assert_eq!(storage.get_all_towns().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_promoter_code() {
        let (_, reconciler) = reconciler();
        assert!(reconciler.resolve_promoter(None).await.unwrap().is_none());
        let promoter = reconciler.resolve_promoter(Some("DF")).await.unwrap().unwrap();
        assert_eq!(promoter.entity().slug, "df");
    }

    #[tokio::test]
    async fn test_long_labels_truncate_slug() {
        let (_, reconciler) = reconciler();
        let label = "The Unbelievably Long Named Orchestra Of The Northern Isles";
        let artist = reconciler.resolve_artist(label).await.unwrap().into_inner();
        assert_eq!(artist.name, label);
        assert_eq!(artist.slug.len(), crate::constants::SLUG_MAX_LENGTH);
    }
}
