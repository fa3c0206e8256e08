//! Descoberta web.

use async_trait::async_trait;
use std::sync::Arc;

use super::{HitSource, QueryGenerator, RawHit, RoundDiscoverer};
use crate::config::ResearchConfig;
use crate::rate_limiter::RateLimiter;
use crate::search::{SearchClient, SearchError};
use crate::types::SourceType;

/// Provedor web (adapta `SearchClient`)
pub struct WebSource(pub Arc<dyn SearchClient>);

#[async_trait]
impl HitSource for WebSource {
    fn source_type(&self) -> SourceType {
        SourceType::Web
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawHit>, SearchError> {
        Ok(self
            .0
            .search(query, limit)
            .await?
            .into_iter()
            .map(|hit| RawHit {
                url: hit.url,
                title: hit.title,
                snippet: hit.snippet,
            })
            .collect())
    }
}

/// Descobridor web
pub type WebDiscoverer = RoundDiscoverer<WebSource>;

impl RoundDiscoverer<WebSource> {
    pub fn new(
        client: Arc<dyn SearchClient>,
        queries: Arc<QueryGenerator>,
        limiter: Arc<RateLimiter>,
        config: &ResearchConfig,
    ) -> Self {
        Self::with_source(WebSource(client), queries, limiter, config)
    }
}
