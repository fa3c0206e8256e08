// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CLIENTES DE BUSCA
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Traits e implementações para busca web e busca acadêmica.
// - Web: Jina Search (s.jina.ai)
// - Acadêmica: Semantic Scholar Graph API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Erros dos clientes de busca
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Search API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl SearchError {
    /// Falhas que valem retry automático
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotFound(_) => false,
        }
    }

    fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            reqwest::StatusCode::NOT_FOUND => Self::NotFound(message),
            _ => Self::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Resultado de busca web
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Resultado de busca acadêmica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicHit {
    pub url: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

/// Busca web: `Search(query) -> [{url, title, snippet}]`
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// Busca acadêmica: `AcademicSearch(keywords) -> [{url, title, abstract}]`
#[async_trait]
pub trait AcademicClient: Send + Sync {
    async fn search(&self, keywords: &str, limit: usize) -> Result<Vec<AcademicHit>, SearchError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IMPLEMENTAÇÕES MOCK PARA TESTES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type WebHandler = Box<dyn Fn(&str, usize) -> Result<Vec<SearchHit>, SearchError> + Send + Sync>;
type AcademicHandler =
    Box<dyn Fn(&str, usize) -> Result<Vec<AcademicHit>, SearchError> + Send + Sync>;

fn slug(text: &str) -> String {
    crate::utils::normalize_query(text).replace(' ', "-")
}

/// Cliente web mock.
///
/// Sem handler, gera `limit` resultados determinísticos por query. O handler
/// recebe `(query, índice_da_chamada)` começando em 1.
#[derive(Default)]
pub struct MockSearchClient {
    handler: Option<WebHandler>,
    calls: AtomicUsize,
}

impl MockSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str, usize) -> Result<Vec<SearchHit>, SearchError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Resultados padrão para a query
    pub fn default_hits(query: &str, limit: usize) -> Vec<SearchHit> {
        (1..=limit)
            .map(|i| SearchHit {
                url: format!("https://example.com/{}/{}", slug(query), i),
                title: format!("{} result {}", query, i),
                snippet: format!("Snippet {} about {}", i, query),
            })
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.handler {
            Some(handler) => handler(query, call),
            None => Ok(Self::default_hits(query, limit)),
        }
    }
}

/// Cliente acadêmico mock (mesma mecânica do web)
#[derive(Default)]
pub struct MockAcademicClient {
    handler: Option<AcademicHandler>,
    calls: AtomicUsize,
}

impl MockAcademicClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str, usize) -> Result<Vec<AcademicHit>, SearchError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn default_hits(keywords: &str, limit: usize) -> Vec<AcademicHit> {
        (1..=limit)
            .map(|i| AcademicHit {
                url: format!("https://papers.example.org/{}/{}", slug(keywords), i),
                title: format!("Paper {} on {}", i, keywords),
                abstract_text: format!("We study {} (paper {}).", keywords, i),
            })
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AcademicClient for MockAcademicClient {
    async fn search(&self, keywords: &str, limit: usize) -> Result<Vec<AcademicHit>, SearchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.handler {
            Some(handler) => handler(keywords, call),
            None => Ok(Self::default_hits(keywords, limit)),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IMPLEMENTAÇÃO JINA
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cliente para Jina Search
pub struct JinaClient {
    api_key: Option<String>,
    search_endpoint: String,
    client: reqwest::Client,
}

impl JinaClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            search_endpoint: "https://s.jina.ai/".into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct JinaSearchResponse {
    #[serde(default)]
    data: Vec<JinaSearchItem>,
}

#[derive(Deserialize)]
struct JinaSearchItem {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl SearchClient for JinaClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        let url = format!("{}?q={}", self.search_endpoint, urlencoding::encode(query));
        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::from_status(status, message));
        }

        let body: JinaSearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Network(format!("invalid search payload: {}", e)))?;

        Ok(body
            .data
            .into_iter()
            .take(limit)
            .map(|item| SearchHit {
                url: item.url,
                title: item.title,
                snippet: item.description,
            })
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IMPLEMENTAÇÃO SEMANTIC SCHOLAR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cliente para a Semantic Scholar Graph API
pub struct SemanticScholarClient {
    api_key: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

impl SemanticScholarClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            endpoint: "https://api.semanticscholar.org/graph/v1/paper/search".into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct ScholarResponse {
    #[serde(default)]
    data: Vec<ScholarPaper>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScholarPaper {
    paper_id: String,
    #[serde(default)]
    title: String,
    url: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}

#[async_trait]
impl AcademicClient for SemanticScholarClient {
    async fn search(&self, keywords: &str, limit: usize) -> Result<Vec<AcademicHit>, SearchError> {
        let url = format!(
            "{}?query={}&limit={}&fields=title,url,abstract",
            self.endpoint,
            urlencoding::encode(keywords),
            limit
        );
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::from_status(status, message));
        }

        let body: ScholarResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Network(format!("invalid academic payload: {}", e)))?;

        Ok(body
            .data
            .into_iter()
            .take(limit)
            .map(|paper| AcademicHit {
                url: paper.url.unwrap_or_else(|| {
                    format!("https://www.semanticscholar.org/paper/{}", paper.paper_id)
                }),
                title: paper.title,
                abstract_text: paper.abstract_text.unwrap_or_default(),
            })
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UTILITÁRIOS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extrai hostname de uma URL
pub fn extract_hostname(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
}

/// Normaliza URL para deduplicação de fontes.
///
/// Remove fragmento, parâmetros `utm_*` e barra final do path. URLs que não
/// parseiam são apenas aparadas.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut parsed = match url::Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return trimmed.to_string(),
    };

    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut out = parsed.to_string();
    if parsed.path() != "/" && out.ends_with('/') && parsed.query().is_none() {
        out.pop();
    }
    if parsed.path() == "/" && parsed.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    out
}
