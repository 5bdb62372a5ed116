//! Turns spreadsheet rows into [`ScrapedGig`] values.
//!
//! The sheet gives the month only in occasional header rows, so rows are
//! scanned as a fold: each row takes the current [`MonthTracker`] and hands
//! back the tracker for the next row together with what the row contained.

use crate::constants::{KNOWN_TOWNS, MONTH_NAMES, PLACEHOLDER_CELLS};
use crate::error::{ImportError, Result};
use crate::types::{GigStatus, Price, RawRow, ScrapedGig};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z]{3} (?P<day>\d+)[a-z]{2}").expect("date pattern"));

static MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^\*(?P<month>{})( .+)?\*$",
        MONTH_NAMES.join("|")
    ))
    .expect("month header pattern")
});

static VENUE_AND_PROMOTER_RE: Lazy<Regex> = Lazy::new(|| {
    let towns: Vec<String> = KNOWN_TOWNS.iter().map(|t| regex::escape(t)).collect();
    Regex::new(&format!(
        r"^(?P<venue>.+?)( (?P<town>{}))?( (?P<promoter>[A-Z]{{1,3}}))?$",
        towns.join("|")
    ))
    .expect("venue and promoter pattern")
});

// A second, slash-separated price is matched and thrown away.
static PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\??(?P<price>\d+\.\d{2})?(/\??\d+\.\d{2})? ?(?P<status>SOLD OUT|CANCELLED)? ?(?P<info>.+?)?$",
    )
    .expect("price and info pattern")
});

/// Why a row produced no gig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No cells, or only empty ones
    Blank,
    /// Column header or padding row
    Placeholder,
    /// Neither a month header nor a dated gig row
    Unmatched,
    /// Date cell parsed but the artist or venue cell is empty
    Unusable,
}

/// What one row contributed to the scan
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    MonthChanged(u32),
    Gig(ScrapedGig),
    Skipped(SkipReason),
}

/// The month (and reference year) that date rows are read against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthTracker {
    month: u32,
    year: i32,
}

impl MonthTracker {
    /// Start of a sheet: January of the reference year
    pub fn new(year: i32) -> Self {
        Self { month: 1, year }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Read one row. Returns the tracker for the next row and the outcome.
    pub fn scan(self, row: &[String]) -> Result<(Self, RowOutcome)> {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            debug!("Ignored blank row");
            return Ok((self, RowOutcome::Skipped(SkipReason::Blank)));
        }

        // Exported sheets pad header rows out to the full width
        let first = row.first().map(String::as_str).unwrap_or_default();
        if let Some(month) = parse_month_header(first) {
            debug!(
                "Month changed from {} to {}",
                month_name(self.month),
                month_name(month)
            );
            return Ok((Self { month, ..self }, RowOutcome::MonthChanged(month)));
        }

        let [date_cell, artist_cell, venue_cell, price_cell, ..] = row else {
            debug!("Unmatched row: '{}'", row.join(", "));
            return Ok((self, RowOutcome::Skipped(SkipReason::Unmatched)));
        };

        if PLACEHOLDER_CELLS.contains(&date_cell.trim()) {
            debug!("Ignored placeholder row: '{}'", row.join(", "));
            return Ok((self, RowOutcome::Skipped(SkipReason::Placeholder)));
        }

        // A bad date only aborts the import when the row names a gig
        let names_a_gig =
            !clean_field(artist_cell).is_empty() || !clean_field(venue_cell).is_empty();
        if !names_a_gig && !DATE_RE.is_match(&clean_field(date_cell)) {
            debug!("Unmatched row: '{}'", row.join(", "));
            return Ok((self, RowOutcome::Skipped(SkipReason::Unmatched)));
        }

        let date = self.parse_date_cell(date_cell)?;
        match parse_gig_cells(artist_cell, venue_cell, date, price_cell) {
            Some(gig) => {
                debug!("Parsed gig: {}", gig);
                Ok((self, RowOutcome::Gig(gig)))
            }
            None => {
                warn!("Skipping row without artist or venue: '{}'", row.join(", "));
                Ok((self, RowOutcome::Skipped(SkipReason::Unusable)))
            }
        }
    }

    /// Build the full date for a cell such as "Mon 18th"
    pub fn parse_date_cell(&self, cell: &str) -> Result<NaiveDate> {
        let cleaned = clean_field(cell);
        let day: u32 = DATE_RE
            .captures(&cleaned)
            .and_then(|caps| caps.name("day"))
            .and_then(|day| day.as_str().parse().ok())
            .ok_or_else(|| ImportError::DateParse {
                cell: cell.to_string(),
                reason: "expected a day such as 'Mon 18th'".to_string(),
            })?;
        NaiveDate::from_ymd_opt(self.year, self.month, day).ok_or_else(|| ImportError::DateParse {
            cell: cell.to_string(),
            reason: format!(
                "day {} does not exist in {} {}",
                day,
                month_name(self.month),
                self.year
            ),
        })
    }
}

/// Scan rows in order, collecting gigs. A malformed date cell aborts the scan.
pub fn scan_rows(rows: &[RawRow], tracker: MonthTracker) -> Result<Vec<ScrapedGig>> {
    let (_, gigs) = rows
        .iter()
        .try_fold((tracker, Vec::new()), |(tracker, mut gigs), row| {
            let (next, outcome) = tracker.scan(row)?;
            if let RowOutcome::Gig(gig) = outcome {
                gigs.push(gig);
            }
            Ok::<_, ImportError>((next, gigs))
        })?;
    Ok(gigs)
}

/// Month number (1-12) for a header cell such as "*OCTOBER 2024*"
pub fn parse_month_header(cell: &str) -> Option<u32> {
    let caps = MONTH_RE.captures(cell.trim())?;
    let name = caps.name("month")?.as_str().to_uppercase();
    MONTH_NAMES
        .iter()
        .position(|m| *m == name)
        .and_then(|index| u32::try_from(index + 1).ok())
}

fn month_name(month: u32) -> &'static str {
    usize::try_from(month)
        .ok()
        .and_then(|m| m.checked_sub(1))
        .and_then(|index| MONTH_NAMES.get(index))
        .copied()
        .unwrap_or("UNKNOWN")
}

/// Drop non-ASCII noise and the asterisks the spreadsheet export uses for
/// emphasis. Unicode whitespace becomes a plain space first so words stay apart.
pub fn clean_field(raw: &str) -> String {
    let ascii: String = raw
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(char::is_ascii)
        .collect();
    ascii
        .trim_matches(|c: char| c == '*' || c.is_whitespace())
        .to_string()
}

/// Venue, optional town and optional promoter code from the combined cell
pub fn split_venue_and_promoter(cell: &str) -> Option<(String, Option<String>, Option<String>)> {
    let caps = VENUE_AND_PROMOTER_RE.captures(cell)?;
    let venue = caps.name("venue")?.as_str().trim().to_string();
    let town = caps.name("town").map(|m| m.as_str().to_string());
    let promoter = caps.name("promoter").map(|m| m.as_str().to_string());
    Some((venue, town, promoter))
}

/// Price, status and free-text note from the combined cell
pub fn split_price_and_info(cell: &str) -> (Option<Price>, GigStatus, Option<String>) {
    let Some(caps) = PRICE_RE.captures(cell) else {
        return (None, GigStatus::Normal, non_empty(cell));
    };
    let price = caps.name("price").and_then(|m| m.as_str().parse().ok());
    let status = match caps.name("status").map(|m| m.as_str()) {
        Some("SOLD OUT") => GigStatus::SoldOut,
        Some("CANCELLED") => GigStatus::Cancelled,
        _ => GigStatus::Normal,
    };
    let info = caps.name("info").and_then(|m| non_empty(m.as_str()));
    (price, status, info)
}

fn parse_gig_cells(
    artist_cell: &str,
    venue_cell: &str,
    date: NaiveDate,
    price_cell: &str,
) -> Option<ScrapedGig> {
    let artist = clean_field(artist_cell);
    if artist.is_empty() {
        return None;
    }
    let (venue, town, promoter) = split_venue_and_promoter(&clean_field(venue_cell))?;
    let (price, status, info) = split_price_and_info(&clean_field(price_cell));
    Some(ScrapedGig {
        artist,
        venue,
        town,
        promoter,
        date,
        price,
        status,
        info,
    })
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn october_2024() -> MonthTracker {
        MonthTracker { month: 10, year: 2024 }
    }

    #[test]
    fn test_parses_full_gig_row() {
        let (_, outcome) = october_2024()
            .scan(&row(&["Mon 18th", "Biffy Clyro", "Barrowlands Glasgow ABC", "15.00 Support: X"]))
            .unwrap();
        let RowOutcome::Gig(gig) = outcome else {
            panic!("expected a gig, got {outcome:?}");
        };
        assert_eq!(gig.artist, "Biffy Clyro");
        assert_eq!(gig.venue, "Barrowlands");
        assert_eq!(gig.town.as_deref(), Some("Glasgow"));
        assert_eq!(gig.promoter.as_deref(), Some("ABC"));
        assert_eq!(gig.price.map(|p| p.to_string()).as_deref(), Some("15.00"));
        assert_eq!(gig.info.as_deref(), Some("Support: X"));
        assert_eq!(gig.status, GigStatus::Normal);
        assert_eq!(gig.date, NaiveDate::from_ymd_opt(2024, 10, 18).unwrap());
    }

    #[test]
    fn test_sold_out_without_price() {
        let (price, status, info) = split_price_and_info("SOLD OUT");
        assert_eq!(price, None);
        assert!(status.sold_out());
        assert!(!status.cancelled());
        assert_eq!(info, None);
    }

    #[test]
    fn test_cancelled_with_second_price_discarded() {
        let (price, status, info) = split_price_and_info("12.50/10.00 CANCELLED rescheduled");
        assert_eq!(price.unwrap().pence(), 1250);
        assert_eq!(status, GigStatus::Cancelled);
        assert_eq!(info.as_deref(), Some("rescheduled"));
    }

    #[test]
    fn test_free_text_only_price_cell() {
        let (price, status, info) = split_price_and_info("Free entry");
        assert_eq!(price, None);
        assert_eq!(status, GigStatus::Normal);
        assert_eq!(info.as_deref(), Some("Free entry"));
    }

    #[test]
    fn test_venue_without_town_or_promoter() {
        let (venue, town, promoter) = split_venue_and_promoter("The Liquid Room").unwrap();
        assert_eq!(venue, "The Liquid Room");
        assert_eq!(town, None);
        assert_eq!(promoter, None);

        let (venue, town, promoter) = split_venue_and_promoter("Cabaret Voltaire DF").unwrap();
        assert_eq!(venue, "Cabaret Voltaire");
        assert_eq!(town, None);
        assert_eq!(promoter.as_deref(), Some("DF"));

        let (venue, town, promoter) = split_venue_and_promoter("Usher Hall Edinburgh").unwrap();
        assert_eq!(venue, "Usher Hall");
        assert_eq!(town.as_deref(), Some("Edinburgh"));
        assert_eq!(promoter, None);
    }

    #[test]
    fn test_clean_field_strips_emphasis_and_noise() {
        assert_eq!(clean_field("*Biffy Clyro*"), "Biffy Clyro");
        assert_eq!(clean_field("  Sigur R\u{f3}s "), "Sigur Rs");
        assert_eq!(clean_field("Biffy\u{a0}Clyro"), "Biffy Clyro");
    }

    #[test]
    fn test_short_rows_yield_no_gig_and_no_error() {
        let tracker = october_2024();
        for cells in [vec![], vec!["Tickets"], vec!["a", "b", "c"]] {
            let (next, outcome) = tracker.scan(&row(&cells)).unwrap();
            assert!(matches!(outcome, RowOutcome::Skipped(_)));
            assert_eq!(next, tracker);
        }
    }

    #[test]
    fn test_placeholder_rows_are_skipped() {
        let tracker = october_2024();
        let (_, outcome) = tracker.scan(&row(&["*DATE*", "*ARTIST*", "*VENUE*", "*PRICE*"])).unwrap();
        assert_eq!(outcome, RowOutcome::Skipped(SkipReason::Placeholder));
        let (_, outcome) = tracker.scan(&row(&["--", "--", "--", "--"])).unwrap();
        assert_eq!(outcome, RowOutcome::Skipped(SkipReason::Placeholder));
    }

    #[test]
    fn test_month_header_carries_forward() {
        let rows = vec![
            row(&["*OCTOBER 2024*"]),
            row(&["Mon 18th", "Biffy Clyro", "Barrowlands Glasgow", "15.00"]),
            row(&["*november*"]),
            row(&["Fri 1st", "Mogwai", "Usher Hall Edinburgh", "20.00"]),
            row(&["Sat 2nd", "Arab Strap", "Summerhall", ""]),
        ];
        let gigs = scan_rows(&rows, MonthTracker::new(2024)).unwrap();
        let dates: Vec<String> = gigs.iter().map(|g| g.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-10-18", "2024-11-01", "2024-11-02"]);
    }

    #[test]
    fn test_padded_month_header_changes_month() {
        let (next, outcome) = october_2024()
            .scan(&row(&["*NOVEMBER*", "", "", ""]))
            .unwrap();
        assert_eq!(outcome, RowOutcome::MonthChanged(11));
        assert_eq!(next.month(), 11);

        let rows = vec![
            row(&["*NOVEMBER*", "", "", ""]),
            row(&["Fri 1st", "Mogwai", "Usher Hall Edinburgh", "20.00"]),
        ];
        let gigs = scan_rows(&rows, october_2024()).unwrap();
        assert_eq!(gigs[0].date, NaiveDate::from_ymd_opt(2024, 11, 1).unwrap());
    }

    #[test]
    fn test_padded_noise_row_is_unmatched() {
        let tracker = october_2024();
        let (next, outcome) = tracker
            .scan(&row(&["Tickets available in store", "", "", ""]))
            .unwrap();
        assert_eq!(outcome, RowOutcome::Skipped(SkipReason::Unmatched));
        assert_eq!(next, tracker);

        let rows = vec![
            row(&["Tickets available in store", "", "", "", ""]),
            row(&["Mon 18th", "Biffy Clyro", "Barrowlands", "15.00"]),
        ];
        assert_eq!(scan_rows(&rows, tracker).unwrap().len(), 1);
    }

    #[test]
    fn test_month_header_without_emphasis_is_unmatched() {
        assert_eq!(parse_month_header("OCTOBER"), None);
        assert_eq!(parse_month_header("*DECEMBER*"), Some(12));
        assert_eq!(parse_month_header("*May gigs*"), Some(5));
    }

    #[test]
    fn test_malformed_date_cell_aborts_scan() {
        let rows = vec![
            row(&["Mon 18th", "Biffy Clyro", "Barrowlands", "15.00"]),
            row(&["soon", "Mogwai", "Usher Hall", "20.00"]),
        ];
        let err = scan_rows(&rows, october_2024()).unwrap_err();
        assert!(matches!(err, ImportError::DateParse { .. }));
    }

    #[test]
    fn test_day_outside_month_is_a_date_error() {
        let tracker = MonthTracker { month: 2, year: 2023 };
        let err = tracker.parse_date_cell("Wed 30th").unwrap_err();
        assert!(matches!(err, ImportError::DateParse { .. }));
    }

    #[test]
    fn test_row_without_venue_is_unusable() {
        let (_, outcome) = october_2024()
            .scan(&row(&["Tue 19th", "Biffy Clyro", "**", "10.00"]))
            .unwrap();
        assert_eq!(outcome, RowOutcome::Skipped(SkipReason::Unusable));
    }

    #[test]
    fn test_fields_survive_reserialising() {
        let original = ScrapedGig {
            artist: "The Twilight Sad".to_string(),
            venue: "Oran Mor".to_string(),
            town: Some("Glasgow".to_string()),
            promoter: Some("RM".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 10, 5).unwrap(),
            price: Some("14.00".parse().unwrap()),
            status: GigStatus::SoldOut,
            info: Some("Doors 7pm".to_string()),
        };
        let cells = row(&[
            "*Sat 5th*",
            "*The Twilight Sad*",
            "Oran Mor Glasgow RM",
            "14.00 SOLD OUT Doors 7pm",
        ]);
        let (_, outcome) = october_2024().scan(&cells).unwrap();
        assert_eq!(outcome, RowOutcome::Gig(original));
    }
}
