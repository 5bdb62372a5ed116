/// Source name used in logs and metrics labels
pub const RIPPING_RECORDS_SOURCE: &str = "ripping_records";

/// User-Agent sent when fetching the spreadsheet export
pub const SPREADSHEET_USER_AGENT: &str = "Ripping Records scraper";

/// Month names as they appear in the spreadsheet header rows, January first
pub const MONTH_NAMES: [&str; 12] = [
    "JANUARY",
    "FEBRUARY",
    "MARCH",
    "APRIL",
    "MAY",
    "JUNE",
    "JULY",
    "AUGUST",
    "SEPTEMBER",
    "OCTOBER",
    "NOVEMBER",
    "DECEMBER",
];

/// Towns recognised as a trailing token of the venue cell
pub const KNOWN_TOWNS: [&str; 2] = ["Edinburgh", "Glasgow"];

/// Town used when a row names none
pub const DEFAULT_TOWN: &str = "Edinburgh";

/// First cells of rows that look like gigs but are headers or padding
pub const PLACEHOLDER_CELLS: [&str; 2] = ["*DATE*", "--"];

/// Slugs are truncated to this many characters
pub const SLUG_MAX_LENGTH: usize = 50;

/// Relative directory for downloaded artist photos
pub const ARTIST_PHOTO_DIRECTORY: &str = "gigs/img/artists";

/// Relative directory for downloaded album covers
pub const ALBUM_COVER_DIRECTORY: &str = "gigs/img/albums";

/// Last.fm error code for an unknown artist or album
pub const LASTFM_NOT_FOUND: i64 = 6;

/// Release countries in order of preference: UK, world wide, US
pub const RELEASE_COUNTRY_PREFERENCE: [&str; 3] = ["GB", "XE", "US"];
