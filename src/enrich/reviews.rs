use crate::apis::retry::{with_retry, RetryPolicy};
use crate::apis::{ReviewItem, ReviewPage, ReviewQuery, ReviewSource};
use crate::error::Result;
use crate::storage::Storage;
use crate::types::Review;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const HEADLINE_SUFFIXES: [&str; 2] = [" \u{2013} review", " - review"];

/// Headline without the trailing " - review"
pub fn clean_headline(headline: &str) -> &str {
    HEADLINE_SUFFIXES
        .iter()
        .find_map(|suffix| headline.strip_suffix(suffix))
        .unwrap_or(headline)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub pages: u32,
    pub saved: usize,
    pub new_artists: usize,
    pub new_artist_reviews: usize,
}

/// Rated reviews linked to artists through their MusicBrainz id
pub struct ReviewImportJob {
    storage: Arc<dyn Storage>,
    source: Arc<dyn ReviewSource>,
    retry: RetryPolicy,
    delay: Duration,
    new_artist_window: chrono::Duration,
}

impl ReviewImportJob {
    pub fn new(
        storage: Arc<dyn Storage>,
        source: Arc<dyn ReviewSource>,
        retry: RetryPolicy,
        delay: Duration,
        new_artist_window: chrono::Duration,
    ) -> Self {
        Self {
            storage,
            source,
            retry,
            delay,
            new_artist_window,
        }
    }

    async fn fetch_page(&self, query: &ReviewQuery) -> Result<ReviewPage> {
        let what = match &query.reference {
            Some(reference) => format!("reviews for {}", reference),
            None => format!("reviews page {}", query.page),
        };
        with_retry(&self.retry, &what, || self.source.review_page(query)).await
    }

    /// Store a review if it is rated, new, and about an artist we know
    pub async fn save_review(&self, item: &ReviewItem) -> Result<bool> {
        let Some(rating) = item.rating else {
            return Ok(false);
        };
        for mbid in &item.musicbrainz_ids {
            let Some(artist) = self.storage.get_artist_by_mbid(mbid).await? else {
                continue;
            };
            if self
                .storage
                .get_review_by_external_id(&item.external_id)
                .await?
                .is_some()
            {
                continue;
            }
            let review = Review {
                id: Uuid::new_v4(),
                artist_id: artist.id,
                external_id: item.external_id.clone(),
                publication_date: item.publication_date,
                headline: clean_headline(&item.headline).to_string(),
                trail: item.trail.clone(),
                byline: item.byline.clone(),
                url: item.url.clone(),
                rating,
            };
            self.storage.create_review(&review).await?;
            debug!("Saved review {} for {}", review.headline, artist.name);
            return Ok(true);
        }
        Ok(false)
    }

    async fn save_page(&self, page: &ReviewPage) -> Result<usize> {
        let mut saved = 0;
        for item in &page.results {
            saved += usize::from(self.save_review(item).await?);
        }
        Ok(saved)
    }

    /// Reviews newer than the latest stored one, then older reviews for
    /// recently created artists.
    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReviewSummary> {
        let latest = self.storage.get_latest_review_date().await?;
        match latest {
            Some(latest) => debug!("Latest review date: {}", latest),
            None => debug!("No reviews stored; retrieving all reviews"),
        }
        let from_date = latest.map(|ts| ts.date_naive());
        let mut summary = ReviewSummary::default();

        let query = ReviewQuery {
            page: 1,
            from_date,
            reference: None,
        };
        let first = self.fetch_page(&query).await?;
        summary.pages = first.pages.max(1);
        summary.saved += self.save_page(&first).await?;
        info!("API indicates {} pages in total", summary.pages);

        for page in 2..=summary.pages {
            tokio::time::sleep(self.delay).await;
            let query = ReviewQuery {
                page,
                from_date,
                reference: None,
            };
            let found = self.fetch_page(&query).await?;
            summary.saved += self.save_page(&found).await?;
        }
        info!("Saved {} new reviews", summary.saved);

        if latest.is_some() {
            let earliest_creation = now - self.new_artist_window;
            let artists: Vec<_> = self
                .storage
                .get_all_artists()
                .await?
                .into_iter()
                .filter(|a| a.published && a.created_at >= earliest_creation)
                .filter(|a| a.mbid.as_deref().is_some_and(|m| !m.is_empty()))
                .collect();
            info!("{} artists created within the review window", artists.len());
            summary.new_artists = artists.len();

            for artist in artists {
                let Some(mbid) = &artist.mbid else {
                    continue;
                };
                tokio::time::sleep(self.delay).await;
                let query = ReviewQuery {
                    page: 1,
                    from_date: None,
                    reference: Some(format!("musicbrainz/{}", mbid)),
                };
                let found = self.fetch_page(&query).await?;
                let saved = self.save_page(&found).await?;
                info!("Saved {} reviews for {}", saved, artist.name);
                summary.new_artist_reviews += saved;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::fakes::FakeGuardian;
    use crate::error::ImportError;
    use crate::storage::InMemoryStorage;
    use crate::types::Artist;
    use std::sync::Mutex;

    fn item(id: &str, mbid: &str, rating: Option<u8>, published: &str) -> ReviewItem {
        ReviewItem {
            external_id: id.to_string(),
            url: format!("https://gu.com/{}", id),
            publication_date: DateTime::parse_from_rfc3339(published)
                .unwrap()
                .with_timezone(&Utc),
            headline: "Mogwai \u{2013} review".to_string(),
            byline: "A Critic".to_string(),
            trail: "Loud".to_string(),
            rating,
            musicbrainz_ids: vec![mbid.to_string()],
        }
    }

    fn quick_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    async fn storage_with_mogwai() -> (Arc<InMemoryStorage>, Artist) {
        let storage = Arc::new(InMemoryStorage::new());
        let mut artist = Artist::new("Mogwai");
        artist.mbid = Some("mbid-mogwai".to_string());
        storage.create_artist(&artist).await.unwrap();
        (storage, artist)
    }

    #[test]
    fn test_clean_headline() {
        assert_eq!(clean_headline("Mogwai \u{2013} review"), "Mogwai");
        assert_eq!(clean_headline("Mogwai - review"), "Mogwai");
        assert_eq!(clean_headline("Mogwai live"), "Mogwai live");
    }

    #[tokio::test]
    async fn test_pages_through_results_and_filters() {
        let (storage, artist) = storage_with_mogwai().await;
        let mut guardian = FakeGuardian::default();
        guardian.pages.insert(
            1,
            ReviewPage {
                pages: 2,
                results: vec![
                    item("music/1", "mbid-mogwai", Some(4), "2024-01-01T10:00:00Z"),
                    item("music/2", "mbid-mogwai", None, "2024-01-02T10:00:00Z"),
                ],
            },
        );
        guardian.pages.insert(
            2,
            ReviewPage {
                pages: 2,
                results: vec![
                    item("music/3", "mbid-unknown", Some(5), "2024-01-03T10:00:00Z"),
                    item("music/1", "mbid-mogwai", Some(4), "2024-01-01T10:00:00Z"),
                ],
            },
        );
        let guardian = Arc::new(guardian);
        let job = ReviewImportJob::new(
            storage.clone(),
            guardian.clone(),
            quick_retry(3),
            Duration::ZERO,
            chrono::Duration::days(2),
        );

        let summary = job.run(Utc::now()).await.unwrap();
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.saved, 1);
        // No reviews were stored before the run, so no second stage
        assert_eq!(summary.new_artists, 0);

        let review = storage.get_review_by_external_id("music/1").await.unwrap().unwrap();
        assert_eq!(review.headline, "Mogwai");
        assert_eq!(review.artist_id, artist.id);
        assert_eq!(review.rating, 4);
    }

    #[tokio::test]
    async fn test_second_stage_fetches_new_artist_reviews() {
        let (storage, _) = storage_with_mogwai().await;
        let job_storage: Arc<dyn Storage> = storage.clone();
        let seed = ReviewImportJob::new(
            job_storage.clone(),
            Arc::new(FakeGuardian::default()),
            quick_retry(1),
            Duration::ZERO,
            chrono::Duration::days(2),
        );
        assert!(seed
            .save_review(&item("music/old", "mbid-mogwai", Some(3), "2023-06-01T10:00:00Z"))
            .await
            .unwrap());

        let mut guardian = FakeGuardian::default();
        guardian.by_reference.insert(
            "musicbrainz/mbid-mogwai".to_string(),
            ReviewPage {
                pages: 1,
                results: vec![item("music/early", "mbid-mogwai", Some(2), "2019-02-01T10:00:00Z")],
            },
        );
        let guardian = Arc::new(guardian);
        let job = ReviewImportJob::new(
            job_storage,
            guardian.clone(),
            quick_retry(1),
            Duration::ZERO,
            chrono::Duration::days(2),
        );

        let summary = job.run(Utc::now()).await.unwrap();
        assert_eq!(summary.new_artists, 1);
        assert_eq!(summary.new_artist_reviews, 1);

        let queries = guardian.queries.lock().unwrap();
        assert_eq!(queries[0].from_date, chrono::NaiveDate::from_ymd_opt(2023, 6, 1));
        assert_eq!(
            queries.last().and_then(|q| q.reference.as_deref()),
            Some("musicbrainz/mbid-mogwai")
        );
    }

    #[tokio::test]
    async fn test_page_fetch_gives_up_after_bounded_retries() {
        let (storage, _) = storage_with_mogwai().await;
        let guardian = Arc::new(FakeGuardian {
            fail_first: Mutex::new(10),
            ..FakeGuardian::default()
        });
        let job = ReviewImportJob::new(
            storage,
            guardian.clone(),
            quick_retry(3),
            Duration::ZERO,
            chrono::Duration::days(2),
        );

        let err = job.run(Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(guardian.queries.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (storage, _) = storage_with_mogwai().await;
        let mut guardian = FakeGuardian {
            fail_first: Mutex::new(2),
            ..FakeGuardian::default()
        };
        guardian.pages.insert(
            1,
            ReviewPage {
                pages: 1,
                results: vec![item("music/1", "mbid-mogwai", Some(4), "2024-01-01T10:00:00Z")],
            },
        );
        let job = ReviewImportJob::new(
            storage,
            Arc::new(guardian),
            quick_retry(3),
            Duration::ZERO,
            chrono::Duration::days(2),
        );
        assert_eq!(job.run(Utc::now()).await.unwrap().saved, 1);
    }
}
