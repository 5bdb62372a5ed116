use crate::constants::RIPPING_RECORDS_SOURCE;
use crate::error::Result;
use crate::types::{RawRow, RowSource};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// The gig listings spreadsheet, fetched as a CSV export
pub struct RippingRecordsSheet {
    client: reqwest::Client,
    url: String,
}

impl RippingRecordsSheet {
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl RowSource for RippingRecordsSheet {
    fn source_name(&self) -> &'static str {
        RIPPING_RECORDS_SOURCE
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_rows(&self) -> Result<Vec<RawRow>> {
        info!("Fetching gig spreadsheet");
        let body = super::fetch_bytes(&self.client, &self.url).await?;
        debug!("Fetched {} bytes", body.len());
        let rows = parse_csv(&body)?;
        info!("Spreadsheet has {} rows", rows.len());
        Ok(rows)
    }
}

/// Split a CSV export into rows. Rows may have any number of cells and
/// invalid UTF-8 is replaced rather than rejected.
pub fn parse_csv(data: &[u8]) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect(),
        );
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_with_ragged_rows() {
        let data = b"*OCTOBER 2024*\n\
            Mon 18th,Biffy Clyro,Barrowlands Glasgow ABC,\"15.00 Support: X, Y\"\n\
            ,,,\n";
        let rows = parse_csv(data).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["*OCTOBER 2024*"]);
        assert_eq!(rows[1][3], "15.00 Support: X, Y");
        assert_eq!(rows[2], vec!["", "", "", ""]);
    }

    #[test]
    fn test_parse_csv_replaces_invalid_utf8() {
        let rows = parse_csv(b"Sat 2nd,Sigur R\xf3s,Usher Hall,20.00\n").unwrap();
        assert_eq!(rows[0][1], "Sigur R\u{fffd}s");
    }
}
