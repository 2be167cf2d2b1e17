use crate::{
    domain::{CaptionStore, LinkProbe},
    errors::RepoError,
    models::FeedCaption,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// How many captions to pull from the store before probing.
const CANDIDATE_LIMIT: usize = 100;
/// How many survivors the feed serves.
const FEED_LIMIT: usize = 50;
/// Per-probe deadline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Assembles the rating feed: top captions by popularity, kept only when
/// their image URL still answers a HEAD request.
pub struct RatingFeed {
    captions: Arc<dyn CaptionStore>,
    probe: Arc<dyn LinkProbe>,
}

impl RatingFeed {
    pub fn new(captions: Arc<dyn CaptionStore>, probe: Arc<dyn LinkProbe>) -> Self {
        Self { captions, probe }
    }

    /// Probes every candidate concurrently and keeps the first `FEED_LIMIT`
    /// whose image responded, in the store's popularity order. A dead or
    /// slow link silently drops its caption; an empty result is an empty
    /// feed, never an error.
    pub async fn assemble(&self) -> Result<Vec<FeedCaption>, RepoError> {
        let candidates = self.captions.feed_candidates(CANDIDATE_LIMIT).await?;
        tracing::debug!(candidates = candidates.len(), "probing feed image links");

        let checks =
            join_all(candidates.iter().map(|c| self.probe.is_live(&c.image.url))).await;

        let survivors: Vec<FeedCaption> = candidates
            .into_iter()
            .zip(checks)
            .filter_map(|(caption, live)| live.then_some(caption))
            .take(FEED_LIMIT)
            .collect();

        tracing::info!(served = survivors.len(), "rating feed assembled");
        Ok(survivors)
    }
}

/// HEAD-request probe with a short deadline. Anything but a timely success
/// status counts as dead.
#[derive(Debug, Clone)]
pub struct ReqwestLinkProbe {
    client: reqwest::Client,
}

impl ReqwestLinkProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkProbe for ReqwestLinkProbe {
    async fn is_live(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url, error = %e, "image link probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaptionImage;
    use std::collections::HashMap;

    struct FixedCaptionStore {
        candidates: Vec<FeedCaption>,
    }

    #[async_trait]
    impl CaptionStore for FixedCaptionStore {
        async fn feed_candidates(&self, limit: usize) -> Result<Vec<FeedCaption>, RepoError> {
            Ok(self.candidates.iter().take(limit).cloned().collect())
        }
    }

    /// URL → alive? Unknown URLs behave like a probe timeout: dead.
    struct MapProbe {
        alive: HashMap<String, bool>,
    }

    #[async_trait]
    impl LinkProbe for MapProbe {
        async fn is_live(&self, url: &str) -> bool {
            self.alive.get(url).copied().unwrap_or(false)
        }
    }

    fn caption(n: usize, like_count: i64) -> FeedCaption {
        FeedCaption {
            caption_id: format!("cap-{n}"),
            content: format!("caption {n}"),
            like_count,
            image: CaptionImage {
                image_id: format!("img-{n}"),
                url: format!("https://cdn.example/{n}.png"),
            },
        }
    }

    #[tokio::test]
    async fn dead_and_timed_out_links_drop_silently() {
        let store = Arc::new(FixedCaptionStore {
            candidates: vec![caption(1, 30), caption(2, 20), caption(3, 10)],
        });
        // First link healthy, second 404s, third never answers.
        let probe = Arc::new(MapProbe {
            alive: HashMap::from([
                ("https://cdn.example/1.png".to_string(), true),
                ("https://cdn.example/2.png".to_string(), false),
            ]),
        });

        let feed = RatingFeed::new(store, probe).assemble().await.unwrap();

        let ids: Vec<&str> = feed.iter().map(|c| c.caption_id.as_str()).collect();
        assert_eq!(ids, vec!["cap-1"]);
    }

    #[tokio::test]
    async fn survivors_keep_popularity_order_and_cap_at_fifty() {
        let candidates: Vec<FeedCaption> =
            (0..80).map(|n| caption(n, 1000 - n as i64)).collect();
        let alive = candidates
            .iter()
            .map(|c| (c.image.url.clone(), true))
            .collect();

        let store = Arc::new(FixedCaptionStore { candidates });
        let probe = Arc::new(MapProbe { alive });

        let feed = RatingFeed::new(store, probe).assemble().await.unwrap();

        assert_eq!(feed.len(), 50);
        assert_eq!(feed[0].caption_id, "cap-0");
        assert_eq!(feed[49].caption_id, "cap-49");
    }

    #[tokio::test]
    async fn empty_candidate_set_is_an_empty_feed() {
        let store = Arc::new(FixedCaptionStore { candidates: vec![] });
        let probe = Arc::new(MapProbe {
            alive: HashMap::new(),
        });

        let feed = RatingFeed::new(store, probe).assemble().await.unwrap();
        assert!(feed.is_empty());
    }
}
