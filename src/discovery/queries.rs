//! Geração de queries de busca a partir de uma pergunta.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ModelRole;
use crate::llm::LlmGateway;
use crate::types::{ResearchQuestion, SourceType};
use crate::utils::extract_string_list;

const WEB_SYSTEM_PROMPT: &str = "You are a search specialist. Given a research question, \
write concise web search queries that would surface authoritative sources. \
Output a JSON list of strings.";

const ACADEMIC_SYSTEM_PROMPT: &str = "You are an academic librarian. Given a research question, \
write short keyword queries suited for a scholarly paper search engine. \
Output a JSON list of strings.";

/// Gera queries via modelo com fallback em camadas.
///
/// JSON → frases entre aspas → divisão por linha → texto da própria pergunta.
pub struct QueryGenerator {
    llm: Arc<LlmGateway>,
    max_queries: usize,
}

impl QueryGenerator {
    pub fn new(llm: Arc<LlmGateway>, max_queries: usize) -> Self {
        Self {
            llm,
            max_queries: max_queries.max(1),
        }
    }

    /// Queries para a pergunta no tipo de busca informado
    pub async fn generate(&self, question: &ResearchQuestion, source_type: SourceType) -> Vec<String> {
        let system = match source_type {
            SourceType::Academic => ACADEMIC_SYSTEM_PROMPT,
            SourceType::Web | SourceType::Rss => WEB_SYSTEM_PROMPT,
        };
        let user = format!(
            "Research question: {}\nWrite up to {} queries.",
            question.text, self.max_queries
        );

        let raw = match self.llm.complete(ModelRole::QueryWriter, system, &user).await {
            Ok(text) => extract_string_list(&text, "queries"),
            Err(e) => {
                log::warn!("⚠️ Q{} geração de queries falhou ({}), usando a pergunta", question.id, e);
                Vec::new()
            }
        };

        let queries = dedupe(raw, self.max_queries);
        if queries.is_empty() {
            vec![question.text.clone()]
        } else {
            queries
        }
    }
}

fn dedupe(queries: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    queries
        .into_iter()
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(max)
        .collect()
}
