//! Descoberta acadêmica.

use async_trait::async_trait;
use std::sync::Arc;

use super::{HitSource, QueryGenerator, RawHit, RoundDiscoverer};
use crate::config::ResearchConfig;
use crate::rate_limiter::RateLimiter;
use crate::search::{AcademicClient, SearchError};
use crate::types::SourceType;
use crate::utils::extract_keywords;

/// Keywords por busca acadêmica
const MAX_KEYWORDS: usize = 6;

/// Provedor acadêmico (adapta `AcademicClient`)
pub struct AcademicSource(pub Arc<dyn AcademicClient>);

#[async_trait]
impl HitSource for AcademicSource {
    fn source_type(&self) -> SourceType {
        SourceType::Academic
    }

    fn prepare_query(&self, query: &str) -> String {
        let keywords = extract_keywords(query, MAX_KEYWORDS);
        if keywords.is_empty() {
            query.to_string()
        } else {
            keywords.join(" ")
        }
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
                snippet: hit.abstract_text,
            })
            .collect())
    }
}

/// Descobridor acadêmico
pub type AcademicDiscoverer = RoundDiscoverer<AcademicSource>;

impl RoundDiscoverer<AcademicSource> {
    pub fn new(
        client: Arc<dyn AcademicClient>,
        queries: Arc<QueryGenerator>,
        limiter: Arc<RateLimiter>,
        config: &ResearchConfig,
    ) -> Self {
        Self::with_source(AcademicSource(client), queries, limiter, config)
    }
}
