use crate::error::{ImportError, Result};
use crate::storage::Storage;
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS import_identifiers (
    id          TEXT PRIMARY KEY,
    identifier  TEXT NOT NULL,
    kind        INTEGER NOT NULL,
    UNIQUE (identifier, kind)
);
CREATE TABLE IF NOT EXISTS identifier_links (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier_id  TEXT NOT NULL,
    entity_id      TEXT NOT NULL,
    UNIQUE (identifier_id, entity_id)
);
CREATE TABLE IF NOT EXISTS artists (
    id                       TEXT PRIMARY KEY,
    name                     TEXT NOT NULL UNIQUE,
    slug                     TEXT NOT NULL UNIQUE,
    biography                TEXT NOT NULL,
    photo                    TEXT,
    web_site                 TEXT,
    mbid                     TEXT UNIQUE,
    number_of_upcoming_gigs  INTEGER NOT NULL,
    published                INTEGER NOT NULL,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS artist_similar (
    artist_id   TEXT NOT NULL,
    similar_id  TEXT NOT NULL,
    PRIMARY KEY (artist_id, similar_id)
);
CREATE TABLE IF NOT EXISTS towns (
    id                       TEXT PRIMARY KEY,
    name                     TEXT NOT NULL UNIQUE,
    slug                     TEXT NOT NULL UNIQUE,
    latitude                 REAL,
    longitude                REAL,
    number_of_upcoming_gigs  INTEGER NOT NULL,
    published                INTEGER NOT NULL,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS venues (
    id                       TEXT PRIMARY KEY,
    name                     TEXT NOT NULL,
    slug                     TEXT NOT NULL UNIQUE,
    description              TEXT NOT NULL,
    address                  TEXT NOT NULL,
    town_id                  TEXT NOT NULL,
    latitude                 REAL,
    longitude                REAL,
    web_site                 TEXT,
    number_of_upcoming_gigs  INTEGER NOT NULL,
    published                INTEGER NOT NULL,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS promoters (
    id                       TEXT PRIMARY KEY,
    name                     TEXT NOT NULL UNIQUE,
    slug                     TEXT NOT NULL UNIQUE,
    web_site                 TEXT,
    number_of_upcoming_gigs  INTEGER NOT NULL,
    published                INTEGER NOT NULL,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS gigs (
    id                 TEXT PRIMARY KEY,
    artist_id          TEXT NOT NULL,
    venue_id           TEXT NOT NULL,
    promoter_id        TEXT,
    date               TEXT NOT NULL,
    slug               TEXT NOT NULL,
    price_pence        INTEGER,
    sold_out           INTEGER NOT NULL,
    cancelled          INTEGER NOT NULL,
    extra_information  TEXT,
    published          INTEGER NOT NULL,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL,
    UNIQUE (artist_id, venue_id, date),
    UNIQUE (slug, date)
);
CREATE INDEX IF NOT EXISTS gigs_artist_date ON gigs (artist_id, date);
CREATE TABLE IF NOT EXISTS albums (
    id                TEXT PRIMARY KEY,
    artist_id         TEXT NOT NULL,
    title             TEXT NOT NULL,
    cover_art         TEXT,
    release_date_raw  TEXT,
    release_date      TEXT,
    released_in       TEXT,
    asin              TEXT NOT NULL,
    mbid              TEXT NOT NULL UNIQUE,
    published         INTEGER NOT NULL,
    UNIQUE (title, artist_id, asin)
);
CREATE TABLE IF NOT EXISTS reviews (
    id                TEXT PRIMARY KEY,
    artist_id         TEXT NOT NULL,
    external_id       TEXT NOT NULL UNIQUE,
    publication_date  TEXT NOT NULL,
    headline          TEXT NOT NULL,
    trail             TEXT NOT NULL,
    byline            TEXT NOT NULL,
    url               TEXT NOT NULL,
    rating            INTEGER NOT NULL
);
"#;

const ARTIST_COLUMNS: &str = "id, name, slug, biography, photo, web_site, mbid, \
     number_of_upcoming_gigs, published, created_at, updated_at";
const TOWN_COLUMNS: &str = "id, name, slug, latitude, longitude, number_of_upcoming_gigs, \
     published, created_at, updated_at";
const VENUE_COLUMNS: &str = "id, name, slug, description, address, town_id, latitude, longitude, \
     web_site, number_of_upcoming_gigs, published, created_at, updated_at";
const PROMOTER_COLUMNS: &str =
    "id, name, slug, web_site, number_of_upcoming_gigs, published, created_at, updated_at";
const GIG_COLUMNS: &str = "id, artist_id, venue_id, promoter_id, date, slug, price_pence, \
     sold_out, cancelled, extra_information, published, created_at, updated_at";
const ALBUM_COLUMNS: &str = "id, artist_id, title, cover_art, release_date_raw, release_date, \
     released_in, asin, mbid, published";
const REVIEW_COLUMNS: &str =
    "id, artist_id, external_id, publication_date, headline, trail, byline, url, rating";

/// SQLite-backed catalogue
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (creating if needed) the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Opened gig database at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ImportError::Storage("sqlite connection lock poisoned".to_string()))
    }

    fn similar_ids(conn: &Connection, artist_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = conn.prepare(
            "SELECT similar_id FROM artist_similar WHERE artist_id = ?1 ORDER BY similar_id",
        )?;
        let rows = stmt.query_map(params![artist_id.to_string()], |row| uuid_col(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn load_artist(conn: &Connection, sql_where: &str, value: &str) -> Result<Option<Artist>> {
        let sql = format!("SELECT {} FROM artists WHERE {} = ?1", ARTIST_COLUMNS, sql_where);
        let artist = conn
            .query_row(&sql, params![value], map_artist)
            .optional()?;
        match artist {
            Some(mut artist) => {
                artist.similar_artist_ids = Self::similar_ids(conn, artist.id)?;
                Ok(Some(artist))
            }
            None => Ok(None),
        }
    }

    fn write_similar(conn: &Connection, artist: &Artist) -> Result<()> {
        conn.execute(
            "DELETE FROM artist_similar WHERE artist_id = ?1",
            params![artist.id.to_string()],
        )?;
        for similar_id in &artist.similar_artist_ids {
            conn.execute(
                "INSERT OR IGNORE INTO artist_similar (artist_id, similar_id) VALUES (?1, ?2)",
                params![artist.id.to_string(), similar_id.to_string()],
            )?;
        }
        Ok(())
    }

    fn query_all<T, F>(&self, sql: &str, value: Option<&str>, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = match value {
            Some(value) => stmt.query_map(params![value], map)?,
            None => stmt.query_map([], map)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn query_one<T, F>(&self, sql: &str, value: &str, map: F) -> Result<Option<T>>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn()?;
        Ok(conn.query_row(sql, params![value], map).optional()?)
    }
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn opt_uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| Uuid::parse_str(&r).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn opt_date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| NaiveDate::parse_from_str(&r, "%Y-%m-%d").map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn map_artist(row: &Row<'_>) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        biography: row.get(3)?,
        photo: row.get(4)?,
        web_site: row.get(5)?,
        mbid: row.get(6)?,
        similar_artist_ids: Vec::new(),
        number_of_upcoming_gigs: row.get(7)?,
        published: row.get(8)?,
        created_at: timestamp_col(row, 9)?,
        updated_at: timestamp_col(row, 10)?,
    })
}

fn map_town(row: &Row<'_>) -> rusqlite::Result<Town> {
    Ok(Town {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        number_of_upcoming_gigs: row.get(5)?,
        published: row.get(6)?,
        created_at: timestamp_col(row, 7)?,
        updated_at: timestamp_col(row, 8)?,
    })
}

fn map_venue(row: &Row<'_>) -> rusqlite::Result<Venue> {
    Ok(Venue {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        address: row.get(4)?,
        town_id: uuid_col(row, 5)?,
        latitude: row.get(6)?,
        longitude: row.get(7)?,
        web_site: row.get(8)?,
        number_of_upcoming_gigs: row.get(9)?,
        published: row.get(10)?,
        created_at: timestamp_col(row, 11)?,
        updated_at: timestamp_col(row, 12)?,
    })
}

fn map_promoter(row: &Row<'_>) -> rusqlite::Result<Promoter> {
    Ok(Promoter {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        web_site: row.get(3)?,
        number_of_upcoming_gigs: row.get(4)?,
        published: row.get(5)?,
        created_at: timestamp_col(row, 6)?,
        updated_at: timestamp_col(row, 7)?,
    })
}

fn map_gig(row: &Row<'_>) -> rusqlite::Result<Gig> {
    let price_pence: Option<u32> = row.get(6)?;
    Ok(Gig {
        id: uuid_col(row, 0)?,
        artist_id: uuid_col(row, 1)?,
        venue_id: uuid_col(row, 2)?,
        promoter_id: opt_uuid_col(row, 3)?,
        date: date_col(row, 4)?,
        slug: row.get(5)?,
        price: price_pence.map(Price::from_pence),
        sold_out: row.get(7)?,
        cancelled: row.get(8)?,
        extra_information: row.get(9)?,
        published: row.get(10)?,
        created_at: timestamp_col(row, 11)?,
        updated_at: timestamp_col(row, 12)?,
    })
}

fn map_album(row: &Row<'_>) -> rusqlite::Result<Album> {
    let released_in: Option<String> = row.get(6)?;
    Ok(Album {
        id: uuid_col(row, 0)?,
        artist_id: uuid_col(row, 1)?,
        title: row.get(2)?,
        cover_art: row.get(3)?,
        release_date_raw: row.get(4)?,
        release_date: opt_date_col(row, 5)?,
        released_in: released_in.as_deref().and_then(ReleaseLocation::from_code),
        asin: row.get(7)?,
        mbid: row.get(8)?,
        published: row.get(9)?,
    })
}

fn map_review(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: uuid_col(row, 0)?,
        artist_id: uuid_col(row, 1)?,
        external_id: row.get(2)?,
        publication_date: timestamp_col(row, 3)?,
        headline: row.get(4)?,
        trail: row.get(5)?,
        byline: row.get(6)?,
        url: row.get(7)?,
        rating: row.get(8)?,
    })
}

/// Constraint failures become conflicts, anything else stays a SQLite error
fn write_error(what: &str, err: rusqlite::Error) -> ImportError {
    match err {
        rusqlite::Error::SqliteFailure(e, message) if e.code == ErrorCode::ConstraintViolation => {
            ImportError::Conflict(format!(
                "{}: {}",
                what,
                message.unwrap_or_else(|| "constraint violated".to_string())
            ))
        }
        other => ImportError::Sqlite(other),
    }
}

fn ensure_updated(changed: usize, kind: &str, id: Uuid) -> Result<()> {
    if changed == 0 {
        return Err(ImportError::NotFound(format!("{} {}", kind, id)));
    }
    Ok(())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_or_create_identifier(
        &self,
        identifier: &str,
        kind: IdentifierKind,
    ) -> Result<ImportIdentifier> {
        let conn = self.conn()?;
        let created = conn.execute(
            "INSERT INTO import_identifiers (id, identifier, kind) VALUES (?1, ?2, ?3)
             ON CONFLICT(identifier, kind) DO NOTHING",
            params![Uuid::new_v4().to_string(), identifier, kind.code()],
        )?;
        if created > 0 {
            debug!("Created {} identifier '{}'", kind, identifier);
        }
        let id = conn.query_row(
            "SELECT id FROM import_identifiers WHERE identifier = ?1 AND kind = ?2",
            params![identifier, kind.code()],
            |row| uuid_col(row, 0),
        )?;
        Ok(ImportIdentifier {
            id,
            identifier: identifier.to_string(),
            kind,
        })
    }

    async fn link_identifier(&self, identifier_id: Uuid, entity_id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO identifier_links (identifier_id, entity_id) VALUES (?1, ?2)",
            params![identifier_id.to_string(), entity_id.to_string()],
        )?;
        Ok(())
    }

    async fn get_linked_entity_ids(&self, identifier_id: Uuid) -> Result<Vec<Uuid>> {
        self.query_all(
            "SELECT entity_id FROM identifier_links WHERE identifier_id = ?1 ORDER BY seq",
            Some(&identifier_id.to_string()),
            |row| uuid_col(row, 0),
        )
    }

    async fn count_identifiers(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM import_identifiers", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| ImportError::Storage(e.to_string()))
    }

    async fn create_artist(&self, artist: &Artist) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO artists ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                ARTIST_COLUMNS
            ),
            params![
                artist.id.to_string(),
                artist.name,
                artist.slug,
                artist.biography,
                artist.photo,
                artist.web_site,
                artist.mbid,
                artist.number_of_upcoming_gigs,
                artist.published,
                timestamp(&artist.created_at),
                timestamp(&artist.updated_at),
            ],
        )
        .map_err(|e| write_error("artist", e))?;
        Self::write_similar(&tx, artist)?;
        tx.commit()?;
        debug!("Created artist: {} with id {}", artist.name, artist.id);
        Ok(())
    }

    async fn update_artist(&self, artist: &Artist) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx
            .execute(
                "UPDATE artists SET name = ?2, slug = ?3, biography = ?4, photo = ?5, web_site = ?6,
                 mbid = ?7, number_of_upcoming_gigs = ?8, published = ?9, updated_at = ?10
                 WHERE id = ?1",
                params![
                    artist.id.to_string(),
                    artist.name,
                    artist.slug,
                    artist.biography,
                    artist.photo,
                    artist.web_site,
                    artist.mbid,
                    artist.number_of_upcoming_gigs,
                    artist.published,
                    timestamp(&artist.updated_at),
                ],
            )
            .map_err(|e| write_error("artist", e))?;
        ensure_updated(changed, "artist", artist.id)?;
        Self::write_similar(&tx, artist)?;
        tx.commit()?;
        Ok(())
    }

    async fn get_artist_by_id(&self, artist_id: Uuid) -> Result<Option<Artist>> {
        let conn = self.conn()?;
        Self::load_artist(&conn, "id", &artist_id.to_string())
    }

    async fn get_artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        let conn = self.conn()?;
        Self::load_artist(&conn, "name", name)
    }

    async fn get_artist_by_slug(&self, slug: &str) -> Result<Option<Artist>> {
        let conn = self.conn()?;
        Self::load_artist(&conn, "slug", slug)
    }

    async fn get_artist_by_mbid(&self, mbid: &str) -> Result<Option<Artist>> {
        let conn = self.conn()?;
        Self::load_artist(&conn, "mbid", mbid)
    }

    async fn get_all_artists(&self) -> Result<Vec<Artist>> {
        let conn = self.conn()?;
        let mut similar: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        {
            let mut stmt = conn
                .prepare("SELECT artist_id, similar_id FROM artist_similar ORDER BY similar_id")?;
            let rows = stmt.query_map([], |row| Ok((uuid_col(row, 0)?, uuid_col(row, 1)?)))?;
            for row in rows {
                let (artist_id, similar_id) = row?;
                similar.entry(artist_id).or_default().push(similar_id);
            }
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM artists ORDER BY name",
            ARTIST_COLUMNS
        ))?;
        let rows = stmt.query_map([], map_artist)?;
        let mut artists = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        for artist in &mut artists {
            artist.similar_artist_ids = similar.remove(&artist.id).unwrap_or_default();
        }
        Ok(artists)
    }

    async fn create_venue(&self, venue: &Venue) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO venues ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                VENUE_COLUMNS
            ),
            params![
                venue.id.to_string(),
                venue.name,
                venue.slug,
                venue.description,
                venue.address,
                venue.town_id.to_string(),
                venue.latitude,
                venue.longitude,
                venue.web_site,
                venue.number_of_upcoming_gigs,
                venue.published,
                timestamp(&venue.created_at),
                timestamp(&venue.updated_at),
            ],
        )
        .map_err(|e| write_error("venue", e))?;
        debug!("Created venue: {} with id {}", venue.name, venue.id);
        Ok(())
    }

    async fn update_venue(&self, venue: &Venue) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE venues SET name = ?2, slug = ?3, description = ?4, address = ?5, town_id = ?6,
                 latitude = ?7, longitude = ?8, web_site = ?9, number_of_upcoming_gigs = ?10,
                 published = ?11, updated_at = ?12 WHERE id = ?1",
                params![
                    venue.id.to_string(),
                    venue.name,
                    venue.slug,
                    venue.description,
                    venue.address,
                    venue.town_id.to_string(),
                    venue.latitude,
                    venue.longitude,
                    venue.web_site,
                    venue.number_of_upcoming_gigs,
                    venue.published,
                    timestamp(&venue.updated_at),
                ],
            )
            .map_err(|e| write_error("venue", e))?;
        ensure_updated(changed, "venue", venue.id)
    }

    async fn get_venue_by_id(&self, venue_id: Uuid) -> Result<Option<Venue>> {
        self.query_one(
            &format!("SELECT {} FROM venues WHERE id = ?1", VENUE_COLUMNS),
            &venue_id.to_string(),
            map_venue,
        )
    }

    async fn get_venue_by_slug(&self, slug: &str) -> Result<Option<Venue>> {
        self.query_one(
            &format!("SELECT {} FROM venues WHERE slug = ?1", VENUE_COLUMNS),
            slug,
            map_venue,
        )
    }

    async fn get_all_venues(&self) -> Result<Vec<Venue>> {
        self.query_all(
            &format!("SELECT {} FROM venues ORDER BY name", VENUE_COLUMNS),
            None,
            map_venue,
        )
    }

    async fn create_town(&self, town: &Town) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO towns ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                TOWN_COLUMNS
            ),
            params![
                town.id.to_string(),
                town.name,
                town.slug,
                town.latitude,
                town.longitude,
                town.number_of_upcoming_gigs,
                town.published,
                timestamp(&town.created_at),
                timestamp(&town.updated_at),
            ],
        )
        .map_err(|e| write_error("town", e))?;
        debug!("Created town: {} with id {}", town.name, town.id);
        Ok(())
    }

    async fn update_town(&self, town: &Town) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE towns SET name = ?2, slug = ?3, latitude = ?4, longitude = ?5,
                 number_of_upcoming_gigs = ?6, published = ?7, updated_at = ?8 WHERE id = ?1",
                params![
                    town.id.to_string(),
                    town.name,
                    town.slug,
                    town.latitude,
                    town.longitude,
                    town.number_of_upcoming_gigs,
                    town.published,
                    timestamp(&town.updated_at),
                ],
            )
            .map_err(|e| write_error("town", e))?;
        ensure_updated(changed, "town", town.id)
    }

    async fn get_town_by_id(&self, town_id: Uuid) -> Result<Option<Town>> {
        self.query_one(
            &format!("SELECT {} FROM towns WHERE id = ?1", TOWN_COLUMNS),
            &town_id.to_string(),
            map_town,
        )
    }

    async fn get_town_by_name(&self, name: &str) -> Result<Option<Town>> {
        self.query_one(
            &format!("SELECT {} FROM towns WHERE name = ?1", TOWN_COLUMNS),
            name,
            map_town,
        )
    }

    async fn get_town_by_slug(&self, slug: &str) -> Result<Option<Town>> {
        self.query_one(
            &format!("SELECT {} FROM towns WHERE slug = ?1", TOWN_COLUMNS),
            slug,
            map_town,
        )
    }

    async fn get_all_towns(&self) -> Result<Vec<Town>> {
        self.query_all(
            &format!("SELECT {} FROM towns ORDER BY name", TOWN_COLUMNS),
            None,
            map_town,
        )
    }

    async fn create_promoter(&self, promoter: &Promoter) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO promoters ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                PROMOTER_COLUMNS
            ),
            params![
                promoter.id.to_string(),
                promoter.name,
                promoter.slug,
                promoter.web_site,
                promoter.number_of_upcoming_gigs,
                promoter.published,
                timestamp(&promoter.created_at),
                timestamp(&promoter.updated_at),
            ],
        )
        .map_err(|e| write_error("promoter", e))?;
        debug!("Created promoter: {} with id {}", promoter.name, promoter.id);
        Ok(())
    }

    async fn update_promoter(&self, promoter: &Promoter) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE promoters SET name = ?2, slug = ?3, web_site = ?4,
                 number_of_upcoming_gigs = ?5, published = ?6, updated_at = ?7 WHERE id = ?1",
                params![
                    promoter.id.to_string(),
                    promoter.name,
                    promoter.slug,
                    promoter.web_site,
                    promoter.number_of_upcoming_gigs,
                    promoter.published,
                    timestamp(&promoter.updated_at),
                ],
            )
            .map_err(|e| write_error("promoter", e))?;
        ensure_updated(changed, "promoter", promoter.id)
    }

    async fn get_promoter_by_id(&self, promoter_id: Uuid) -> Result<Option<Promoter>> {
        self.query_one(
            &format!("SELECT {} FROM promoters WHERE id = ?1", PROMOTER_COLUMNS),
            &promoter_id.to_string(),
            map_promoter,
        )
    }

    async fn get_promoter_by_name(&self, name: &str) -> Result<Option<Promoter>> {
        self.query_one(
            &format!("SELECT {} FROM promoters WHERE name = ?1", PROMOTER_COLUMNS),
            name,
            map_promoter,
        )
    }

    async fn get_promoter_by_slug(&self, slug: &str) -> Result<Option<Promoter>> {
        self.query_one(
            &format!("SELECT {} FROM promoters WHERE slug = ?1", PROMOTER_COLUMNS),
            slug,
            map_promoter,
        )
    }

    async fn get_all_promoters(&self) -> Result<Vec<Promoter>> {
        self.query_all(
            &format!("SELECT {} FROM promoters ORDER BY name", PROMOTER_COLUMNS),
            None,
            map_promoter,
        )
    }

    async fn create_gig(&self, gig: &Gig) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO gigs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                GIG_COLUMNS
            ),
            params![
                gig.id.to_string(),
                gig.artist_id.to_string(),
                gig.venue_id.to_string(),
                gig.promoter_id.map(|id| id.to_string()),
                gig.date.to_string(),
                gig.slug,
                gig.price.map(Price::pence),
                gig.sold_out,
                gig.cancelled,
                gig.extra_information,
                gig.published,
                timestamp(&gig.created_at),
                timestamp(&gig.updated_at),
            ],
        )
        .map_err(|e| write_error("gig", e))?;
        debug!("Created gig: {} on {} with id {}", gig.slug, gig.date, gig.id);
        Ok(())
    }

    async fn update_gig(&self, gig: &Gig) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE gigs SET artist_id = ?2, venue_id = ?3, promoter_id = ?4, date = ?5,
                 slug = ?6, price_pence = ?7, sold_out = ?8, cancelled = ?9,
                 extra_information = ?10, published = ?11, updated_at = ?12 WHERE id = ?1",
                params![
                    gig.id.to_string(),
                    gig.artist_id.to_string(),
                    gig.venue_id.to_string(),
                    gig.promoter_id.map(|id| id.to_string()),
                    gig.date.to_string(),
                    gig.slug,
                    gig.price.map(Price::pence),
                    gig.sold_out,
                    gig.cancelled,
                    gig.extra_information,
                    gig.published,
                    timestamp(&gig.updated_at),
                ],
            )
            .map_err(|e| write_error("gig", e))?;
        ensure_updated(changed, "gig", gig.id)
    }

    async fn get_gig_by_id(&self, gig_id: Uuid) -> Result<Option<Gig>> {
        self.query_one(
            &format!("SELECT {} FROM gigs WHERE id = ?1", GIG_COLUMNS),
            &gig_id.to_string(),
            map_gig,
        )
    }

    async fn get_gigs_by_artist_and_date(
        &self,
        artist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Gig>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM gigs WHERE artist_id = ?1 AND date = ?2 ORDER BY created_at, rowid",
            GIG_COLUMNS
        ))?;
        let rows = stmt.query_map(params![artist_id.to_string(), date.to_string()], map_gig)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn get_gigs_by_artist(&self, artist_id: Uuid) -> Result<Vec<Gig>> {
        self.query_all(
            &format!(
                "SELECT {} FROM gigs WHERE artist_id = ?1 ORDER BY date",
                GIG_COLUMNS
            ),
            Some(&artist_id.to_string()),
            map_gig,
        )
    }

    async fn get_all_gigs(&self) -> Result<Vec<Gig>> {
        self.query_all(
            &format!("SELECT {} FROM gigs ORDER BY date, slug", GIG_COLUMNS),
            None,
            map_gig,
        )
    }

    async fn create_album(&self, album: &Album) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO albums ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                ALBUM_COLUMNS
            ),
            params![
                album.id.to_string(),
                album.artist_id.to_string(),
                album.title,
                album.cover_art,
                album.release_date_raw,
                album.release_date.map(|d| d.to_string()),
                album.released_in.map(ReleaseLocation::code),
                album.asin,
                album.mbid,
                album.published,
            ],
        )
        .map_err(|e| write_error("album", e))?;
        debug!("Created album: {} with id {}", album.title, album.id);
        Ok(())
    }

    async fn update_album(&self, album: &Album) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE albums SET artist_id = ?2, title = ?3, cover_art = ?4, release_date_raw = ?5,
                 release_date = ?6, released_in = ?7, asin = ?8, mbid = ?9, published = ?10
                 WHERE id = ?1",
                params![
                    album.id.to_string(),
                    album.artist_id.to_string(),
                    album.title,
                    album.cover_art,
                    album.release_date_raw,
                    album.release_date.map(|d| d.to_string()),
                    album.released_in.map(ReleaseLocation::code),
                    album.asin,
                    album.mbid,
                    album.published,
                ],
            )
            .map_err(|e| write_error("album", e))?;
        ensure_updated(changed, "album", album.id)
    }

    async fn get_album_by_asin(&self, asin: &str) -> Result<Option<Album>> {
        self.query_one(
            &format!(
                "SELECT {} FROM albums WHERE asin = ?1 ORDER BY rowid LIMIT 1",
                ALBUM_COLUMNS
            ),
            asin,
            map_album,
        )
    }

    async fn get_albums_by_artist(&self, artist_id: Uuid) -> Result<Vec<Album>> {
        self.query_all(
            &format!(
                "SELECT {} FROM albums WHERE artist_id = ?1 ORDER BY title",
                ALBUM_COLUMNS
            ),
            Some(&artist_id.to_string()),
            map_album,
        )
    }

    async fn create_review(&self, review: &Review) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO reviews ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                REVIEW_COLUMNS
            ),
            params![
                review.id.to_string(),
                review.artist_id.to_string(),
                review.external_id,
                timestamp(&review.publication_date),
                review.headline,
                review.trail,
                review.byline,
                review.url,
                review.rating,
            ],
        )
        .map_err(|e| write_error("review", e))?;
        debug!("Created review: {} with id {}", review.headline, review.id);
        Ok(())
    }

    async fn get_review_by_external_id(&self, external_id: &str) -> Result<Option<Review>> {
        self.query_one(
            &format!("SELECT {} FROM reviews WHERE external_id = ?1", REVIEW_COLUMNS),
            external_id,
            map_review,
        )
    }

    async fn get_latest_review_date(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let latest: Option<String> =
            conn.query_row("SELECT MAX(publication_date) FROM reviews", [], |row| row.get(0))?;
        latest
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| ImportError::Storage(format!("bad review date '{}': {}", raw, e)))
            })
            .transpose()
    }
}
