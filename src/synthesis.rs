// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNTHESIZER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Uma seção por pergunta (ordenadas por id), depois a composição do
// relatório. Falha em uma seção gera placeholder só para ela.
//
// Evidência da seção: fontes indexadas para a pergunta e seus follow-ups,
// completadas pela busca por similaridade ao texto da pergunta.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::config::ModelRole;
use crate::knowledge::{by_question_best_effort, query_best_effort, KnowledgeIndex};
use crate::llm::LlmGateway;
use crate::search::extract_hostname;
use crate::types::{Fragment, QuestionId, ResearchQuestion};
use crate::utils::ellipsize;

const WRITER_SYSTEM_PROMPT: &str = "You are a senior research analyst. Answer the research \
question using only the numbered evidence. Cite evidence inline as [n]. Write concise Markdown \
paragraphs without a heading.";

const EVIDENCE_PROMPT_CHARS: usize = 800;

/// Texto usado quando não há evidência para a pergunta
pub const NO_EVIDENCE_PLACEHOLDER: &str = "_No evidence was collected for this question._";

/// Texto usado quando a escrita da seção falha
pub const FAILED_SECTION_PLACEHOLDER: &str = "_This section could not be generated._";

/// Seção escrita para uma pergunta
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub question: ResearchQuestion,
    pub body: String,
    /// Citações (título, url) na ordem da evidência
    pub citations: Vec<(String, String)>,
}

/// Escritor do relatório final
pub struct Synthesizer {
    llm: Arc<LlmGateway>,
    index: Arc<dyn KnowledgeIndex>,
    fragments_per_section: usize,
}

impl Synthesizer {
    pub fn new(llm: Arc<LlmGateway>, index: Arc<dyn KnowledgeIndex>, fragments_per_section: usize) -> Self {
        Self {
            llm,
            index,
            fragments_per_section,
        }
    }

    /// `WriteSection(question, fragments) -> markdown`
    pub async fn write_section(&self, question: &ResearchQuestion, fragments: &[Fragment]) -> Section {
        let citations = citations(fragments);

        if fragments.is_empty() {
            return Section {
                question: question.clone(),
                body: NO_EVIDENCE_PLACEHOLDER.to_string(),
                citations,
            };
        }

        let evidence = fragments
            .iter()
            .enumerate()
            .map(|(i, f)| format!("[{}] {}", i + 1, ellipsize(&f.text, EVIDENCE_PROMPT_CHARS)))
            .collect::<Vec<_>>()
            .join("\n");
        let user = format!("Question: {}\n\nEvidence:\n{}", question.text, evidence);

        let body = match self.llm.complete(ModelRole::Writer, WRITER_SYSTEM_PROMPT, &user).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                log::warn!("⚠️ Seção Q{} veio vazia", question.id);
                FAILED_SECTION_PLACEHOLDER.to_string()
            }
            Err(e) => {
                log::warn!("⚠️ Seção Q{} falhou: {}", question.id, e);
                FAILED_SECTION_PLACEHOLDER.to_string()
            }
        };

        Section {
            question: question.clone(),
            body,
            citations,
        }
    }

    /// `Compose(topic, sections) -> report` (seções ordenadas por id)
    pub fn compose(&self, topic: &str, sections: Vec<Section>, notice: Option<&str>) -> String {
        compose_report(topic, sections, notice)
    }

    /// Recupera evidência e escreve uma seção por pergunta, depois compõe
    pub async fn synthesize(
        &self,
        topic: &str,
        questions: &[ResearchQuestion],
        notice: Option<&str>,
    ) -> String {
        log::info!("✍️ Sintetizando {} seções", questions.len());

        let mut ordered: Vec<&ResearchQuestion> = questions.iter().collect();
        ordered.sort_by_key(|q| q.id);

        let sections = join_all(ordered.into_iter().map(|q| async move {
            let fragments = self.gather_evidence(q, questions).await;
            self.write_section(q, &fragments).await
        }))
        .await;

        self.compose(topic, sections, notice)
    }

    /// Fontes da pergunta e dos follow-ups primeiro, depois similaridade;
    /// uma entrada por URL, no máximo `fragments_per_section`
    pub async fn gather_evidence(&self, question: &ResearchQuestion, questions: &[ResearchQuestion]) -> Vec<Fragment> {
        let k = self.fragments_per_section;
        let lineage = lineage(question.id, questions);

        let mut fragments = by_question_best_effort(self.index.as_ref(), &lineage, k).await;
        fragments.extend(query_best_effort(self.index.as_ref(), &question.text, k).await);

        let mut seen = HashSet::new();
        fragments.retain(|f| seen.insert(f.url().unwrap_or(&f.text).to_string()));
        fragments.truncate(k);
        fragments
    }
}

/// A pergunta seguida dos descendentes (follow-ups de follow-ups inclusive)
fn lineage(root: QuestionId, questions: &[ResearchQuestion]) -> Vec<QuestionId> {
    let mut ids = vec![root];
    let mut cursor = 0;
    while cursor < ids.len() {
        let parent = ids[cursor];
        for q in questions {
            if q.parent_id == Some(parent) && !ids.contains(&q.id) {
                ids.push(q.id);
            }
        }
        cursor += 1;
    }
    ids
}

fn citations(fragments: &[Fragment]) -> Vec<(String, String)> {
    fragments
        .iter()
        .filter_map(|f| {
            let url = f.url()?;
            let title = f
                .title()
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string)
                .or_else(|| extract_hostname(url))
                .unwrap_or_else(|| url.to_string());
            Some((title, url.to_string()))
        })
        .collect()
}

/// Monta o relatório Markdown
pub fn compose_report(topic: &str, mut sections: Vec<Section>, notice: Option<&str>) -> String {
    sections.sort_by_key(|s| s.question.id);

    let mut report = format!("# Research Report: {}\n\n", topic);
    if let Some(notice) = notice {
        report.push_str(&format!("> **Partial report:** {}\n\n", notice));
    }

    let mut all_sources = BTreeSet::new();
    for section in &sections {
        let heading = if section.question.depth == 0 { "##" } else { "###" };
        report.push_str(&format!(
            "{} {}. {}\n\n{}\n\n",
            heading, section.question.id, section.question.text, section.body
        ));
        if !section.citations.is_empty() {
            for (i, (title, url)) in section.citations.iter().enumerate() {
                report.push_str(&format!("[{}]: [{}]({})\n", i + 1, title, url));
                all_sources.insert(url.clone());
            }
            report.push('\n');
        }
    }

    report.push_str(&format!("---\n_{} sections, {} distinct sources._\n", sections.len(), all_sources.len()));
    report
}
