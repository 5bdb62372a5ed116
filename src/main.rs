use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gig_scraper::apis::guardian::GuardianClient;
use gig_scraper::apis::lastfm::LastfmClient;
use gig_scraper::apis::musicbrainz::MusicBrainzClient;
use gig_scraper::apis::ripping_records::RippingRecordsSheet;
use gig_scraper::apis::{ArtistMetadataSource, ReleaseSource};
use gig_scraper::config::Config;
use gig_scraper::counters::refresh_upcoming_gig_counts;
use gig_scraper::db::SqliteStorage;
use gig_scraper::enrich::{
    AlbumImportJob, ArtistMetadataJob, MediaStore, NewArtistEnricher, ReviewImportJob,
    SimilarArtistLinker,
};
use gig_scraper::hooks::ArtistEnricher;
use gig_scraper::{logging, ImportContext, Pipeline, Storage};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gig_scraper")]
#[command(about = "Import gig listings and enrich the artists playing them")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (default: ./config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 0 = errors only, 1 = info, 2 = debug, 3 = trace
    #[arg(long, global = true, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=3))]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import gigs from the listings spreadsheet
    ImportGigs {
        /// CSV export URL, overriding the config
        #[arg(long)]
        url: Option<String>,
    },
    /// Fetch photos and biographies from Last.fm
    ImportMetadata {
        /// Only artists created within this many hours (0 = all)
        #[arg(long, default_value_t = 0)]
        age: u32,
    },
    /// Fetch photos for every artist without one
    ImportPhotos,
    /// Import official albums from MusicBrainz
    ImportAlbums {
        /// Only artists created within this many hours (0 = all)
        #[arg(long, default_value_t = 0)]
        age: u32,
    },
    /// Import rated reviews from the Guardian
    ImportReviews,
    /// Link similar artists using Last.fm
    LinkSimilar,
    /// Recount upcoming gigs for every artist, venue, town and promoter
    RefreshCounts,
}

fn init_metrics(listen_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid metrics listen address '{}'", listen_addr))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    info!("Prometheus exporter listening on http://{}/metrics", addr);
    Ok(())
}

fn lastfm_client(config: &Config) -> anyhow::Result<Arc<dyn ArtistMetadataSource>> {
    let key = config.lastfm.api_key.as_deref().unwrap_or_default();
    Ok(Arc::new(LastfmClient::new(
        key,
        &config.lastfm.base_url,
        config.enrichment.timeout(),
    )?))
}

fn musicbrainz_client(config: &Config) -> anyhow::Result<Arc<dyn ReleaseSource>> {
    Ok(Arc::new(MusicBrainzClient::new(
        &config.musicbrainz.base_url,
        &config.musicbrainz.user_agent,
        config.enrichment.timeout(),
    )?))
}

fn metadata_job(config: &Config, storage: Arc<dyn Storage>) -> anyhow::Result<ArtistMetadataJob> {
    Ok(ArtistMetadataJob::new(
        storage,
        lastfm_client(config)?,
        Some(musicbrainz_client(config)?),
        MediaStore::new(&config.enrichment.media_root),
        config.enrichment.delay(),
    ))
}

fn album_job(
    config: &Config,
    storage: Arc<dyn Storage>,
    lastfm: Option<Arc<dyn ArtistMetadataSource>>,
) -> anyhow::Result<AlbumImportJob> {
    Ok(AlbumImportJob::new(
        storage,
        musicbrainz_client(config)?,
        lastfm,
        MediaStore::new(&config.enrichment.media_root),
        config.enrichment.delay(),
    ))
}

/// Enrichment for artists the importer creates, if Last.fm is configured
fn new_artist_enricher(
    config: &Config,
    storage: Arc<dyn Storage>,
) -> anyhow::Result<Option<Arc<dyn ArtistEnricher>>> {
    let Ok(lastfm) = lastfm_client(config) else {
        warn!("No Last.fm API key configured; new artists will not be enriched");
        return Ok(None);
    };
    let metadata = metadata_job(config, storage.clone())?;
    let albums = album_job(config, storage, Some(lastfm))?;
    Ok(Some(Arc::new(NewArtistEnricher::new(metadata, Some(albums)))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let _guard = logging::init_logging(&config.logging, cli.verbosity)?;

    if let Some(addr) = &config.metrics.listen_addr {
        init_metrics(addr)?;
    }

    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::open(&config.storage.database_path).with_context(|| {
            format!(
                "failed to open database {}",
                config.storage.database_path.display()
            )
        })?,
    );
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::ImportGigs { url } => {
            let Some(url) = url.or_else(|| config.spreadsheet.url.clone()) else {
                bail!("no spreadsheet URL: pass --url or set spreadsheet.url / GIGS_SPREADSHEET_URL");
            };
            let source = RippingRecordsSheet::new(
                &url,
                &config.spreadsheet.user_agent,
                config.spreadsheet.timeout(),
            )?;
            let ctx = ImportContext {
                storage: storage.clone(),
                enricher: new_artist_enricher(&config, storage)?,
                today,
                reference_year: config.spreadsheet.year_or_current(),
            };
            let result = Pipeline::run_import(&ctx, &source).await?;
            info!(
                "Imported {} gigs: {} created, {} updated, {} venue changes, {} unchanged",
                result.gigs_found,
                result.created,
                result.updated,
                result.venue_changed,
                result.unchanged
            );
            for error in &result.errors {
                warn!("{}", error);
            }
        }
        Commands::ImportMetadata { age } => {
            let summary = metadata_job(&config, storage)?.run(age).await?;
            info!(
                "Metadata: {} artists, {} photos, {} biographies, {} skipped",
                summary.artists, summary.photos, summary.biographies, summary.skipped
            );
        }
        Commands::ImportPhotos => {
            let summary = metadata_job(&config, storage)?.run_photos().await?;
            info!(
                "Photos: {} added for {} artists, {} skipped",
                summary.photos, summary.artists, summary.skipped
            );
        }
        Commands::ImportAlbums { age } => {
            let lastfm = match lastfm_client(&config) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Cover art disabled: {}", e);
                    None
                }
            };
            let summary = album_job(&config, storage, lastfm)?.run(age).await?;
            info!(
                "Albums: {} created from {} releases, {} covers",
                summary.created, summary.releases, summary.covers
            );
        }
        Commands::ImportReviews => {
            let key = config.guardian.api_key.as_deref().unwrap_or_default();
            let guardian = GuardianClient::new(
                key,
                &config.guardian.base_url,
                config.guardian.page_size,
                config.enrichment.timeout(),
            )?;
            let job = ReviewImportJob::new(
                storage,
                Arc::new(guardian),
                config.guardian.retry_policy(),
                config.enrichment.delay(),
                config.guardian.new_artist_window(),
            );
            let summary = job.run(chrono::Utc::now()).await?;
            info!(
                "Reviews: {} saved from {} pages, {} for new artists",
                summary.saved, summary.pages, summary.new_artist_reviews
            );
        }
        Commands::LinkSimilar => {
            let linker = SimilarArtistLinker::new(
                storage,
                lastfm_client(&config)?,
                config.enrichment.similarity_threshold,
                config.enrichment.delay(),
            );
            let summary = linker.run().await?;
            info!(
                "Similar artists: {} links added across {} artists",
                summary.links_added, summary.artists
            );
        }
        Commands::RefreshCounts => {
            let summary = refresh_upcoming_gig_counts(storage.as_ref(), today).await?;
            info!(
                "Counts refreshed for {} artists, {} venues, {} towns, {} promoters",
                summary.artists, summary.venues, summary.towns, summary.promoters
            );
        }
    }
    Ok(())
}
