// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// KNOWLEDGE INDEX
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// `Index(text, metadata)` / `Query(text, k)`.
//
// A implementação em memória usa embeddings por hashing de tokens e
// similaridade de cosseno calculada em paralelo (rayon). Resultado ordenado
// por relevância decrescente e, em empate, por ordem de inserção, o que
// torna a consulta determinística para o mesmo estado.
//
// Também fica aqui a extração de entidades (triplas) dos fragmentos.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use async_trait::async_trait;
use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::config::ModelRole;
use crate::llm::LlmGateway;
use crate::types::{Fragment, Metadata, QuestionId, Source, Triplet};
use crate::utils::{ellipsize, extract_json};

/// Dimensão padrão dos vetores
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Erros do índice
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Cannot index empty text")]
    EmptyText,
}

/// Armazenamento vetorial
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    /// Adiciona um texto com metadados
    async fn add(&self, text: &str, metadata: Metadata) -> Result<(), IndexError>;

    /// Recupera até `k` fragmentos mais relevantes
    async fn query(&self, text: &str, k: usize) -> Result<Vec<Fragment>, IndexError>;

    /// Fragmentos indexados para as perguntas dadas (metadado `question_id`).
    ///
    /// Ordem: posição do id em `question_ids`, depois score da fonte.
    async fn by_question(&self, question_ids: &[QuestionId], k: usize) -> Result<Vec<Fragment>, IndexError>;

    /// Número de entradas
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Indexa uma fonte aprovada; falhas são logadas e engolidas
pub async fn index_source(index: &dyn KnowledgeIndex, source: &Source) -> bool {
    let text = format!("{}\n{}", source.title, source.snippet);
    let mut metadata = Metadata::new();
    metadata.insert("url".into(), source.url.clone());
    metadata.insert("title".into(), source.title.clone());
    metadata.insert("question_id".into(), source.question_id.to_string());
    metadata.insert("source_type".into(), source.source_type.to_string());
    metadata.insert("score".into(), format!("{:.2}", source.score));

    match index.add(&text, metadata).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("⚠️ Falha ao indexar {}: {}", source.url, e);
            false
        }
    }
}

/// Fragmentos por pergunta, tolerante a falhas (falha → vazio)
pub async fn by_question_best_effort(
    index: &dyn KnowledgeIndex,
    question_ids: &[QuestionId],
    k: usize,
) -> Vec<Fragment> {
    match index.by_question(question_ids, k).await {
        Ok(fragments) => fragments,
        Err(e) => {
            log::warn!("⚠️ Consulta por pergunta falhou: {}", e);
            Vec::new()
        }
    }
}

/// Consulta tolerante a falhas (falha → vazio)
pub async fn query_best_effort(index: &dyn KnowledgeIndex, text: &str, k: usize) -> Vec<Fragment> {
    match index.query(text, k).await {
        Ok(fragments) => fragments,
        Err(e) => {
            log::warn!("⚠️ Consulta ao índice falhou: {}", e);
            Vec::new()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EMBEDDINGS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Gera vetores para texto
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Embedding por hashing de tokens (feature hashing com sinal)
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 2)
            .map(str::to_lowercase)
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

/// Similaridade de cosseno
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ÍNDICE EM MEMÓRIA
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Entry {
    text: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

/// Índice vetorial em memória
pub struct InMemoryKnowledgeIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<Entry>>,
}

impl Default for InMemoryKnowledgeIndex {
    fn default() -> Self {
        Self::new(Arc::new(HashingEmbedder::default()))
    }
}

impl InMemoryKnowledgeIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Consulta síncrona (usada também pelo benchmark)
    pub fn search(&self, text: &str, k: usize) -> Vec<Fragment> {
        if k == 0 || text.trim().is_empty() {
            return Vec::new();
        }
        let query = self.embedder.embed(text);
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());

        let mut scored: Vec<(usize, f32)> = entries
            .par_iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(&query, &entry.vector)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, relevance)| Fragment {
                text: entries[i].text.clone(),
                metadata: entries[i].metadata.clone(),
                relevance,
            })
            .collect()
    }

    /// Entradas marcadas com um dos `question_ids`; relevância = score da fonte
    pub fn tagged(&self, question_ids: &[QuestionId], k: usize) -> Vec<Fragment> {
        if k == 0 || question_ids.is_empty() {
            return Vec::new();
        }
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());

        let mut matched: Vec<(usize, usize, f32)> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let id = entry.metadata.get("question_id")?.parse::<QuestionId>().ok()?;
                let rank = question_ids.iter().position(|q| *q == id)?;
                let score = entry
                    .metadata
                    .get("score")
                    .and_then(|v| v.parse::<f32>().ok())
                    .unwrap_or(0.0);
                Some((rank, i, score))
            })
            .collect();

        matched.sort_by(|a, b| a.0.cmp(&b.0).then(b.2.total_cmp(&a.2)).then(a.1.cmp(&b.1)));
        matched.truncate(k);

        matched
            .into_iter()
            .map(|(_, i, score)| Fragment {
                text: entries[i].text.clone(),
                metadata: entries[i].metadata.clone(),
                relevance: score,
            })
            .collect()
    }

    /// Inserção síncrona; duplicata exata (texto + url) é ignorada
    pub fn insert(&self, text: &str, metadata: Metadata) -> Result<bool, IndexError> {
        if text.trim().is_empty() {
            return Err(IndexError::EmptyText);
        }
        let vector = self.embedder.embed(text);
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());

        let url = metadata.get("url");
        if entries
            .iter()
            .any(|e| e.text == text && e.metadata.get("url") == url)
        {
            return Ok(false);
        }

        entries.push(Entry {
            text: text.to_string(),
            metadata,
            vector,
        });
        Ok(true)
    }
}

#[async_trait]
impl KnowledgeIndex for InMemoryKnowledgeIndex {
    async fn add(&self, text: &str, metadata: Metadata) -> Result<(), IndexError> {
        self.insert(text, metadata).map(|_| ())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<Fragment>, IndexError> {
        Ok(self.search(text, k))
    }

    async fn by_question(&self, question_ids: &[QuestionId], k: usize) -> Result<Vec<Fragment>, IndexError> {
        Ok(self.tagged(question_ids, k))
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EXTRAÇÃO DE ENTIDADES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const EXTRACTOR_SYSTEM_PROMPT: &str = "You extract structured knowledge. From the evidence, \
list factual relations as a JSON list of objects with 'subject', 'predicate' and 'object'.";

/// Caracteres por fragmento no prompt
const FRAGMENT_PROMPT_CHARS: usize = 600;

/// Extrai triplas (sujeito, predicado, objeto) dos fragmentos
pub struct EntityExtractor {
    llm: Arc<LlmGateway>,
}

impl EntityExtractor {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    /// Uma chamada ao modelo; falha ou resposta ilegível → vazio
    pub async fn extract(&self, fragments: &[Fragment]) -> Vec<Triplet> {
        if fragments.is_empty() {
            return Vec::new();
        }

        let evidence = fragments
            .iter()
            .enumerate()
            .map(|(i, f)| format!("[{}] {}", i + 1, ellipsize(&f.text, FRAGMENT_PROMPT_CHARS)))
            .collect::<Vec<_>>()
            .join("\n");

        let text = match self
            .llm
            .complete(ModelRole::Extractor, EXTRACTOR_SYSTEM_PROMPT, &evidence)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                log::warn!("⚠️ Extração de entidades falhou: {}", e);
                return Vec::new();
            }
        };

        let triplets: Vec<Triplet> = extract_json::<Vec<Triplet>>(&text)
            .unwrap_or_default()
            .into_iter()
            .filter(|t| {
                !t.subject.trim().is_empty()
                    && !t.predicate.trim().is_empty()
                    && !t.object.trim().is_empty()
            })
            .collect();

        log::info!("🧩 {} entidades extraídas de {} fragmentos", triplets.len(), fragments.len());
        triplets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResearchConfig;
    use crate::llm::MockLlmClient;

    fn meta(url: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("url".into(), url.into());
        m
    }

    #[test]
    fn test_embedding_is_normalized_and_stable() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("Rust ownership and borrowing");
        let b = embedder.embed("Rust ownership and borrowing");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[1.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_relevance_order() {
        let index = InMemoryKnowledgeIndex::default();
        index.add("tokio async runtime scheduler", meta("a")).await.unwrap();
        index.add("baking sourdough bread at home", meta("b")).await.unwrap();
        index.add("async runtime internals", meta("c")).await.unwrap();

        let results = index.query("async runtime", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|f| f.url() != Some("b")));
        assert!(results[0].relevance >= results[1].relevance);
    }

    #[tokio::test]
    async fn test_query_is_deterministic() {
        let index = InMemoryKnowledgeIndex::default();
        for i in 0..20 {
            index
                .add(&format!("distributed consensus note {}", i % 4), meta(&i.to_string()))
                .await
                .unwrap();
        }
        let first = index.query("distributed consensus", 8).await.unwrap();
        let second = index.query("distributed consensus", 8).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_and_duplicates_skipped() {
        let index = InMemoryKnowledgeIndex::default();
        assert!(matches!(index.add("  ", meta("x")).await, Err(IndexError::EmptyText)));

        index.add("same text", meta("x")).await.unwrap();
        index.add("same text", meta("x")).await.unwrap();
        index.add("same text", meta("y")).await.unwrap();
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_by_question_uses_tags_not_wording() {
        let index = InMemoryKnowledgeIndex::default();
        let tagged = |url: &str, qid: &str, score: &str| {
            let mut m = meta(url);
            m.insert("question_id".into(), qid.into());
            m.insert("score".into(), score.into());
            m
        };
        index.add("zebra migration patterns", tagged("a", "1", "0.60")).await.unwrap();
        index.add("savanna rainfall records", tagged("b", "1", "0.90")).await.unwrap();
        index.add("unrelated follow-up notes", tagged("c", "2", "0.99")).await.unwrap();
        index.add("no tag at all", meta("d")).await.unwrap();

        let own = index.by_question(&[1], 8).await.unwrap();
        let urls: Vec<_> = own.iter().filter_map(|f| f.url()).collect();
        assert_eq!(urls, vec!["b", "a"]);

        let lineage = index.by_question(&[1, 2], 8).await.unwrap();
        let urls: Vec<_> = lineage.iter().filter_map(|f| f.url()).collect();
        assert_eq!(urls, vec!["b", "a", "c"]);

        assert_eq!(index.by_question(&[1, 2], 1).await.unwrap().len(), 1);
        assert!(index.by_question(&[], 8).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let index = Arc::new(InMemoryKnowledgeIndex::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = Arc::clone(&index);
                tokio::spawn(async move {
                    index.add(&format!("entry number {}", i), meta(&i.to_string())).await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(index.len(), 8);
    }

    #[tokio::test]
    async fn test_extractor_filters_incomplete_triplets() {
        let mock = MockLlmClient::new().with_response(
            ModelRole::Extractor,
            r#"[{"subject": "Raft", "predicate": "is", "object": "consensus protocol"},
                {"subject": "", "predicate": "x", "object": "y"}]"#,
        );
        let gw = LlmGateway::new(Arc::new(mock), &ResearchConfig::default());
        let extractor = EntityExtractor::new(Arc::new(gw));
        let fragment = Fragment {
            text: "Raft is a consensus protocol".into(),
            metadata: Metadata::new(),
            relevance: 1.0,
        };

        let triplets = extractor.extract(&[fragment]).await;
        assert_eq!(triplets.len(), 1);
        assert_eq!(triplets[0].subject, "Raft");
        assert!(extractor.extract(&[]).await.is_empty());
    }
}
