use crate::counters::{refresh_upcoming_gig_counts, CounterRefreshSummary};
use crate::error::Result;
use crate::hooks::{ArtistEnricher, ArtistHooks};
use crate::importer::{ChangeType, GigImporter};
use crate::parser::{scan_rows, MonthTracker};
use crate::reconcile::Reconciler;
use crate::storage::Storage;
use crate::types::RowSource;
use chrono::NaiveDate;
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Everything one import run depends on
pub struct ImportContext {
    pub storage: Arc<dyn Storage>,
    /// Enrichment for newly created artists; none disables it
    pub enricher: Option<Arc<dyn ArtistEnricher>>,
    /// Gigs dated on or after this day are upcoming
    pub today: NaiveDate,
    /// Year the spreadsheet's dates are in
    pub reference_year: i32,
}

impl std::fmt::Debug for ImportContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportContext")
            .field("storage", &"<Arc<dyn Storage>>")
            .field("enricher", &self.enricher.is_some())
            .field("today", &self.today)
            .field("reference_year", &self.reference_year)
            .finish()
    }
}

/// Result of a complete import run
#[derive(Debug, Default, Serialize)]
pub struct PipelineResult {
    pub source: String,
    pub total_rows: usize,
    pub gigs_found: usize,
    pub created: usize,
    pub updated: usize,
    pub venue_changed: usize,
    pub unchanged: usize,
    pub artists_created: usize,
    pub venues_created: usize,
    pub errors: Vec<String>,
    pub counters: CounterRefreshSummary,
}

pub struct Pipeline;

impl Pipeline {
    /// Fetch the sheet, import every gig in row order, then refresh the
    /// upcoming gig counts.
    ///
    /// An unreadable date cell aborts the run before anything is written.
    /// Catalogue errors abort it part way; rows already imported stay.
    #[instrument(skip(ctx, source), fields(source = %source.source_name()))]
    pub async fn run_import(ctx: &ImportContext, source: &dyn RowSource) -> Result<PipelineResult> {
        let source_name = source.source_name();
        info!("Starting gig import from {}", source_name);
        counter!("gigs_import_runs_total", "source" => source_name).increment(1);
        let t_pipeline = Instant::now();

        let t_fetch = Instant::now();
        let rows = source.fetch_rows().await?;
        histogram!("gigs_import_fetch_duration_seconds", "source" => source_name)
            .record(t_fetch.elapsed().as_secs_f64());

        let gigs = scan_rows(&rows, MonthTracker::new(ctx.reference_year))?;
        info!("Found {} gigs in {} rows", gigs.len(), rows.len());
        histogram!("gigs_import_rows_per_run", "source" => source_name).record(rows.len() as f64);

        let hooks = ArtistHooks::new(ctx.storage.clone(), ctx.enricher.clone());
        let importer = GigImporter::new(ctx.storage.clone(), Reconciler::new(ctx.storage.clone(), hooks));

        let mut result = PipelineResult {
            source: source_name.to_string(),
            total_rows: rows.len(),
            gigs_found: gigs.len(),
            ..PipelineResult::default()
        };

        for gig in &gigs {
            let record = match importer.import_gig(gig).await {
                Ok(record) => record,
                Err(e) if e.is_fatal() => {
                    error!("Import aborted at {}: {}", gig, e);
                    counter!("gigs_import_errors_total", "source" => source_name).increment(1);
                    return Err(e);
                }
                Err(e) => {
                    error!("Failed to import {}: {}", gig, e);
                    counter!("gigs_import_errors_total", "source" => source_name).increment(1);
                    result.errors.push(format!("{}: {}", gig, e));
                    continue;
                }
            };
            match record.change_type {
                ChangeType::Created => result.created += 1,
                ChangeType::Updated => result.updated += 1,
                ChangeType::VenueChanged => result.venue_changed += 1,
                ChangeType::NoChange => result.unchanged += 1,
            }
            result.artists_created += usize::from(record.artist_created);
            result.venues_created += usize::from(record.venue_created);
        }

        counter!("gigs_import_created_total", "source" => source_name).increment(result.created as u64);
        counter!("gigs_import_updated_total", "source" => source_name)
            .increment((result.updated + result.venue_changed) as u64);

        result.counters = refresh_upcoming_gig_counts(ctx.storage.as_ref(), ctx.today).await?;

        histogram!("gigs_import_duration_seconds", "source" => source_name)
            .record(t_pipeline.elapsed().as_secs_f64());
        info!(
            "Import complete: {} created, {} updated, {} venue changes, {} unchanged, {} errors",
            result.created,
            result.updated,
            result.venue_changed,
            result.unchanged,
            result.errors.len()
        );
        Ok(result)
    }
}
