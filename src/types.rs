use crate::constants::SLUG_MAX_LENGTH;
use crate::error::{ImportError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A spreadsheet row as a list of raw cell values
pub type RawRow = Vec<String>;

/// Core trait for anything that yields spreadsheet rows in document order
#[async_trait::async_trait]
pub trait RowSource: Send + Sync {
    /// Name used in logs and metrics
    fn source_name(&self) -> &'static str;

    /// Fetch every row of the sheet, in order
    async fn fetch_rows(&self) -> Result<Vec<RawRow>>;
}

/// The entity kind an import identifier names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierKind {
    Gig,
    Artist,
    Venue,
    Town,
    Promoter,
}

impl IdentifierKind {
    pub fn code(self) -> i64 {
        match self {
            IdentifierKind::Gig => 1,
            IdentifierKind::Artist => 2,
            IdentifierKind::Venue => 3,
            IdentifierKind::Town => 4,
            IdentifierKind::Promoter => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(IdentifierKind::Gig),
            2 => Some(IdentifierKind::Artist),
            3 => Some(IdentifierKind::Venue),
            4 => Some(IdentifierKind::Town),
            5 => Some(IdentifierKind::Promoter),
            _ => None,
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentifierKind::Gig => "gig",
            IdentifierKind::Artist => "artist",
            IdentifierKind::Venue => "venue",
            IdentifierKind::Town => "town",
            IdentifierKind::Promoter => "promoter",
        };
        f.write_str(name)
    }
}

/// A scraped label that has been seen for one kind of entity.
///
/// The spreadsheet spells the same artist or venue in several ways; every
/// spelling gets its own identifier and all of them link to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportIdentifier {
    pub id: Uuid,
    pub identifier: String,
    pub kind: IdentifierKind,
}

impl ImportIdentifier {
    pub fn new(identifier: &str, kind: IdentifierKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier: identifier.to_string(),
            kind,
        }
    }
}

/// A ticket price held in pence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(u32);

impl Price {
    /// Largest price the catalogue stores (999.99)
    pub const MAX_PENCE: u32 = 99_999;

    pub fn from_pence(pence: u32) -> Self {
        Self(pence)
    }

    pub fn pence(self) -> u32 {
        self.0
    }
}

impl FromStr for Price {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ImportError::InvalidPrice(s.to_string());
        let (pounds, pence) = s.trim().split_once('.').ok_or_else(invalid)?;
        if pounds.is_empty()
            || pence.len() != 2
            || !pounds.chars().all(|c| c.is_ascii_digit())
            || !pence.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let pounds: u32 = pounds.parse().map_err(|_| invalid())?;
        let pence: u32 = pence.parse().map_err(|_| invalid())?;
        let total = pounds
            .checked_mul(100)
            .and_then(|p| p.checked_add(pence))
            .filter(|p| *p <= Self::MAX_PENCE)
            .ok_or_else(invalid)?;
        Ok(Self(total))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Ticket status of a gig. Sold out and cancelled never hold together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GigStatus {
    #[default]
    Normal,
    SoldOut,
    Cancelled,
}

impl GigStatus {
    pub fn sold_out(self) -> bool {
        self == GigStatus::SoldOut
    }

    pub fn cancelled(self) -> bool {
        self == GigStatus::Cancelled
    }
}

/// One gig as read from the spreadsheet, before reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedGig {
    pub artist: String,
    pub venue: String,
    pub town: Option<String>,
    pub promoter: Option<String>,
    pub date: NaiveDate,
    pub price: Option<Price>,
    pub status: GigStatus,
    pub info: Option<String>,
}

impl ScrapedGig {
    /// Synthetic label identifying this gig across runs
    pub fn identifier_label(&self) -> String {
        format!("{} at {} on {}", self.artist, self.venue, self.date)
    }
}

impl fmt::Display for ScrapedGig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {} on {}", self.artist, self.venue, self.date)
    }
}

/// Slug for a label: lower case ASCII words joined by hyphens, truncated.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_hyphen = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        }
    }
    slug.chars().take(SLUG_MAX_LENGTH).collect()
}

/// Slug for a new catalogue entity. A name with no usable characters
/// falls back to the entity id.
fn entity_slug(name: &str, id: Uuid) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        id.simple().to_string()
    } else {
        slug
    }
}

/// A musician, singer, or band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub biography: String,
    pub photo: Option<String>,
    pub web_site: Option<String>,
    pub mbid: Option<String>,
    pub similar_artist_ids: Vec<Uuid>,
    pub number_of_upcoming_gigs: u32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artist {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            name: name.to_string(),
            slug: entity_slug(name, id),
            biography: String::new(),
            photo: None,
            web_site: None,
            mbid: None,
            similar_artist_ids: Vec::new(),
            number_of_upcoming_gigs: 0,
            published: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A place within a town where gigs take place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub address: String,
    pub town_id: Uuid,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub web_site: Option<String>,
    pub number_of_upcoming_gigs: u32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Venue {
    pub fn new(name: &str, town_id: Uuid) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            name: name.to_string(),
            slug: entity_slug(name, id),
            description: String::new(),
            address: String::new(),
            town_id,
            latitude: None,
            longitude: None,
            web_site: None,
            number_of_upcoming_gigs: 0,
            published: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Town {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub number_of_upcoming_gigs: u32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Town {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            name: name.to_string(),
            slug: entity_slug(name, id),
            latitude: None,
            longitude: None,
            number_of_upcoming_gigs: 0,
            published: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The company or organisation that organises gigs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promoter {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub web_site: Option<String>,
    pub number_of_upcoming_gigs: u32,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Promoter {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            name: name.to_string(),
            slug: entity_slug(name, id),
            web_site: None,
            number_of_upcoming_gigs: 0,
            published: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One headline act on a specific date at a specific venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gig {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub venue_id: Uuid,
    pub promoter_id: Option<Uuid>,
    pub date: NaiveDate,
    pub slug: String,
    pub price: Option<Price>,
    pub sold_out: bool,
    pub cancelled: bool,
    pub extra_information: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Arguments for creating a gig
#[derive(Debug, Clone)]
pub struct GigArgs {
    pub artist_id: Uuid,
    pub artist_slug: String,
    pub venue_id: Uuid,
    pub promoter_id: Option<Uuid>,
    pub date: NaiveDate,
    pub price: Option<Price>,
    pub status: GigStatus,
    pub extra_information: Option<String>,
}

impl Gig {
    pub fn new(args: GigArgs) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            artist_id: args.artist_id,
            venue_id: args.venue_id,
            promoter_id: args.promoter_id,
            date: args.date,
            slug: args.artist_slug,
            price: args.price,
            sold_out: args.status.sold_out(),
            cancelled: args.status.cancelled(),
            extra_information: args.extra_information,
            published: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Published and dated today or later
    pub fn is_upcoming(&self, today: NaiveDate) -> bool {
        self.published && self.date >= today
    }

    pub fn status(&self) -> GigStatus {
        if self.cancelled {
            GigStatus::Cancelled
        } else if self.sold_out {
            GigStatus::SoldOut
        } else {
            GigStatus::Normal
        }
    }
}

/// Country an album release date applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseLocation {
    UnitedKingdom,
    UnitedStates,
    WorldWide,
}

impl ReleaseLocation {
    pub fn code(self) -> &'static str {
        match self {
            ReleaseLocation::UnitedKingdom => "GB",
            ReleaseLocation::UnitedStates => "US",
            ReleaseLocation::WorldWide => "XE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "GB" => Some(ReleaseLocation::UnitedKingdom),
            "US" => Some(ReleaseLocation::UnitedStates),
            "XE" => Some(ReleaseLocation::WorldWide),
            _ => None,
        }
    }
}

/// A musical release by an artist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub title: String,
    pub cover_art: Option<String>,
    pub release_date_raw: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub released_in: Option<ReleaseLocation>,
    pub asin: String,
    pub mbid: String,
    pub published: bool,
}

impl Album {
    pub fn new(artist_id: Uuid, title: &str, asin: &str, mbid: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            artist_id,
            title: title.to_string(),
            cover_art: None,
            release_date_raw: None,
            release_date: None,
            released_in: None,
            asin: asin.to_string(),
            mbid: mbid.to_string(),
            published: true,
        }
    }
}

/// A rated review from the news API, tied to an artist by MusicBrainz id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub external_id: String,
    pub publication_date: DateTime<Utc>,
    pub headline: String,
    pub trail: String,
    pub byline: String,
    pub url: String,
    pub rating: u8,
}
