// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DESCOBERTA DE FONTES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// `Discover(question, depth) -> seq<CandidateDocument>`
//
// Para cada query gerada:
// - rodada 1: busca com a query (5 resultados)
// - rodada 2 (depth >= 2): busca exploratória a partir do melhor resultado (2)
// - rodada 3 (depth == 3): mais uma a partir do melhor da rodada 2 (1)
//
// Toda busca passa pelo RateLimiter compartilhado. Falha de uma query é
// logada e ignorada; as outras seguem.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod academic;
mod queries;
mod web;

pub use academic::{AcademicDiscoverer, AcademicSource};
pub use queries::QueryGenerator;
pub use web::{WebDiscoverer, WebSource};

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ResearchConfig;
use crate::rate_limiter::RateLimiter;
use crate::search::{normalize_url, SearchError};
use crate::types::{CandidateDocument, ResearchQuestion, SourceType};

/// Profundidade máxima de descoberta recursiva
pub const MAX_DISCOVERY_DEPTH: u8 = 3;

/// Descobridor de fontes para uma pergunta
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Tipo das fontes produzidas
    fn source_type(&self) -> SourceType;

    /// Busca candidatos para a pergunta (nunca falha; vazio no pior caso)
    async fn discover(&self, question: &ResearchQuestion, depth: u8) -> Vec<CandidateDocument>;
}

/// Resultado bruto de uma busca, comum aos dois provedores
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Provedor de resultados por trás de um descobridor
#[async_trait]
pub trait HitSource: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Adapta o texto da query ao provedor (keywords para busca acadêmica)
    fn prepare_query(&self, query: &str) -> String {
        query.to_string()
    }

    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<RawHit>, SearchError>;
}

/// Descobridor genérico por rodadas.
///
/// `WebDiscoverer` e `AcademicDiscoverer` são instâncias com provedores
/// diferentes.
pub struct RoundDiscoverer<S: HitSource> {
    source: S,
    queries: Arc<QueryGenerator>,
    limiter: Arc<RateLimiter>,
    round_sizes: [usize; 3],
    timeout: Duration,
    max_retries: u32,
}

impl<S: HitSource> RoundDiscoverer<S> {
    pub(crate) fn with_source(
        source: S,
        queries: Arc<QueryGenerator>,
        limiter: Arc<RateLimiter>,
        config: &ResearchConfig,
    ) -> Self {
        Self {
            source,
            queries,
            limiter,
            round_sizes: config.round_sizes,
            timeout: config.search_timeout,
            max_retries: config.max_retries.min(crate::config::MAX_RETRIES_CEILING),
        }
    }

    /// Uma busca: reserva no limiter, timeout e retries para falhas transitórias
    async fn fetch_with_retry(&self, query: &str, limit: usize) -> Result<Vec<RawHit>, SearchError> {
        let prepared = self.source.prepare_query(query);
        let mut attempt = 0;
        loop {
            self.limiter.reserve().await;
            let result = match tokio::time::timeout(self.timeout, self.source.fetch(&prepared, limit)).await {
                Ok(result) => result,
                Err(_) => Err(SearchError::Timeout(self.timeout)),
            };

            match result {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "⚠️ [{}] '{}' falhou ({}), retry {}/{}",
                        self.source.source_type(),
                        prepared,
                        e,
                        attempt,
                        self.max_retries
                    );
                }
                other => return other,
            }
        }
    }

    /// Rodadas 1..=depth para uma query
    async fn run_query(&self, question: &ResearchQuestion, query: &str, depth: u8) -> Vec<RawHit> {
        let mut collected = Vec::new();
        let mut current = query.to_string();

        for round in 1..=depth {
            let limit = self.round_sizes[(round - 1) as usize];
            match self.fetch_with_retry(&current, limit).await {
                Ok(hits) => {
                    log::debug!(
                        "🔍 Q{} [{}] rodada {} '{}': {} resultados",
                        question.id,
                        self.source.source_type(),
                        round,
                        current,
                        hits.len()
                    );
                    let next = hits.first().map(|top| exploratory_query(top));
                    collected.extend(hits);
                    match next {
                        Some(q) => current = q,
                        None => break,
                    }
                }
                Err(e) => {
                    log::warn!(
                        "⚠️ Q{} [{}] query '{}' ignorada: {}",
                        question.id,
                        self.source.source_type(),
                        current,
                        e
                    );
                    break;
                }
            }
        }

        collected
    }
}

/// Query exploratória derivada do melhor resultado
fn exploratory_query(top: &RawHit) -> String {
    if top.title.trim().is_empty() {
        crate::utils::ellipsize(&top.snippet, 120)
    } else {
        top.title.trim().to_string()
    }
}

#[async_trait]
impl<S: HitSource> Discoverer for RoundDiscoverer<S> {
    fn source_type(&self) -> SourceType {
        self.source.source_type()
    }

    async fn discover(&self, question: &ResearchQuestion, depth: u8) -> Vec<CandidateDocument> {
        let depth = depth.clamp(1, MAX_DISCOVERY_DEPTH);
        let source_type = self.source.source_type();
        let queries = self.queries.generate(question, source_type).await;

        let per_query = join_all(queries.iter().map(|q| self.run_query(question, q, depth))).await;

        let mut seen = HashSet::new();
        let candidates: Vec<CandidateDocument> = per_query
            .into_iter()
            .flatten()
            .filter(|hit| !hit.url.trim().is_empty())
            .filter(|hit| seen.insert(normalize_url(&hit.url)))
            .map(|hit| CandidateDocument {
                url: hit.url,
                title: hit.title,
                snippet: hit.snippet,
                source_type,
                question_id: question.id,
            })
            .collect();

        log::info!(
            "📚 Q{} [{}] {} queries, {} candidatos",
            question.id,
            source_type,
            queries.len(),
            candidates.len()
        );
        candidates
    }
}
