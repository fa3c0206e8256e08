// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// QUESTION PLANNER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// - `decompose(topic, constraints)`: perguntas de nível 0, ids 1..N
// - `expand_gaps(gaps, existing)`: um follow-up por lacuna, ids continuando
//   após o maior existente; todas as perguntas pendentes viram `analyzed`
// - `refine(question)`: reformulações alternativas de uma pergunta
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use crate::config::ModelRole;
use crate::llm::LlmGateway;
use crate::types::{
    clamp_priority, Constraints, Gap, QuestionId, QuestionStatus, ResearchQuestion,
};
use crate::utils::{extract_json, extract_string_list};

const DECOMPOSE_SYSTEM_PROMPT: &str = "You are a Senior Research Architect. Decompose the \
research topic into 5-10 specific, non-overlapping research questions designed to uncover \
deep insights, methodology or expert perspectives. Order them from foundational to advanced. \
Output a JSON list of objects with 'id', 'question' and 'priority' (1-5).";

const FOLLOW_UP_SYSTEM_PROMPT: &str = "You are a research planner. Given a research question \
and a gap in what is known about it, write one focused follow-up question that would close \
the gap. Output a JSON list with a single object with 'question' and 'priority' (1-5).";

const REFINE_SYSTEM_PROMPT: &str = "You are a research editor. Rewrite the research question \
in 3 alternative phrasings that are more precise and searchable. Output a JSON list of strings.";

/// Resultado de um passo de planejamento
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOutcome {
    /// Perguntas criadas neste passo
    pub new_questions: Vec<ResearchQuestion>,
    /// Perguntas que deixam de ser pendentes
    pub consumed: Vec<QuestionId>,
}

impl PlanOutcome {
    pub fn is_empty(&self) -> bool {
        self.new_questions.is_empty() && self.consumed.is_empty()
    }
}

/// Pergunta ativa: pendente e abaixo da profundidade máxima
pub fn is_active(question: &ResearchQuestion, max_depth: u32) -> bool {
    question.is_pending() && question.depth < max_depth
}

/// Marca como `analyzed` as perguntas com id em `ids`
pub fn mark_consumed(questions: &mut [ResearchQuestion], ids: &[QuestionId]) {
    for q in questions.iter_mut().filter(|q| ids.contains(&q.id)) {
        q.status = QuestionStatus::Analyzed;
    }
}

/// Próximo id livre
pub fn next_question_id(existing: &[ResearchQuestion]) -> QuestionId {
    existing.iter().map(|q| q.id).max().unwrap_or(0) + 1
}

/// (texto, prioridade) lidos de um item JSON
fn planned_item(item: &Value) -> Option<(String, Option<u8>)> {
    let text = match item {
        Value::String(s) => s.as_str(),
        Value::Object(_) => item
            .get("question")
            .or_else(|| item.get("text"))
            .and_then(Value::as_str)?,
        _ => return None,
    }
    .trim();

    if text.is_empty() {
        return None;
    }
    let priority = item
        .get("priority")
        .and_then(Value::as_u64)
        .map(|p| p.min(u8::MAX as u64) as u8);
    Some((text.to_string(), priority))
}

/// Planejador de perguntas
pub struct QuestionPlanner {
    llm: Arc<LlmGateway>,
}

impl QuestionPlanner {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    /// Decompõe o tópico em perguntas de nível 0.
    ///
    /// Nunca devolve vazio: sem resultado utilizável, cai para
    /// "General overview of {topic}".
    pub async fn decompose(&self, topic: &str, constraints: &Constraints) -> Vec<ResearchQuestion> {
        log::info!("🧭 Decompondo tópico: {}", topic);
        let constraints_json = serde_json::to_string(constraints).unwrap_or_else(|_| "{}".into());
        let user = format!(
            "Topic: {}\nConstraints: {}\n\nProvide the JSON list now:",
            topic, constraints_json
        );

        let items: Vec<(String, Option<u8>)> =
            match self.llm.complete(ModelRole::Planner, DECOMPOSE_SYSTEM_PROMPT, &user).await {
                Ok(text) => extract_json::<Vec<Value>>(&text)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(planned_item)
                    .collect(),
                Err(e) => {
                    log::warn!("⚠️ Decomposição falhou: {}", e);
                    Vec::new()
                }
            };

        if items.is_empty() {
            log::warn!("⚠️ Nenhuma pergunta utilizável, usando visão geral");
            return vec![ResearchQuestion::new(1, format!("General overview of {}", topic), 1)];
        }

        let questions: Vec<ResearchQuestion> = items
            .into_iter()
            .enumerate()
            .map(|(i, (text, priority))| {
                ResearchQuestion::new(i as QuestionId + 1, text, priority.unwrap_or(3))
            })
            .collect();

        log::info!("📋 {} perguntas geradas", questions.len());
        questions
    }

    /// Um follow-up por lacuna válida; lista vazia é no-op.
    pub async fn expand_gaps(&self, gaps: &[Gap], existing: &[ResearchQuestion]) -> PlanOutcome {
        if gaps.is_empty() {
            return PlanOutcome::default();
        }

        let with_parent: Vec<(&Gap, &ResearchQuestion)> = gaps
            .iter()
            .filter_map(|gap| {
                let parent = existing.iter().find(|q| q.id == gap.related_question_id);
                if parent.is_none() {
                    log::warn!(
                        "⚠️ Lacuna para pergunta inexistente {} descartada",
                        gap.related_question_id
                    );
                }
                parent.map(|p| (gap, p))
            })
            .collect();

        let drafts = join_all(
            with_parent
                .iter()
                .map(|(gap, parent)| self.draft_follow_up(gap, parent)),
        )
        .await;

        let mut next_id = next_question_id(existing);
        let new_questions: Vec<ResearchQuestion> = with_parent
            .iter()
            .zip(drafts)
            .map(|((_, parent), (text, priority))| {
                let q = ResearchQuestion::follow_up(next_id, text, priority, parent);
                next_id += 1;
                q
            })
            .collect();

        let consumed: Vec<QuestionId> = existing
            .iter()
            .filter(|q| q.is_pending())
            .map(|q| q.id)
            .collect();

        log::info!(
            "🌱 {} follow-ups criados, {} perguntas consumidas",
            new_questions.len(),
            consumed.len()
        );
        PlanOutcome {
            new_questions,
            consumed,
        }
    }

    async fn draft_follow_up(&self, gap: &Gap, parent: &ResearchQuestion) -> (String, u8) {
        let fallback_priority = clamp_priority(parent.priority.saturating_add(1));
        let user = format!(
            "Original question: {}\nGap: {}",
            parent.text, gap.description
        );

        let drafted = match self.llm.complete(ModelRole::Planner, FOLLOW_UP_SYSTEM_PROMPT, &user).await {
            Ok(text) => extract_json::<Vec<Value>>(&text)
                .and_then(|items| items.iter().find_map(planned_item))
                .or_else(|| extract_json::<Value>(&text).as_ref().and_then(planned_item)),
            Err(e) => {
                log::warn!("⚠️ Follow-up para Q{} falhou: {}", parent.id, e);
                None
            }
        };

        match drafted {
            Some((text, priority)) => (text, priority.unwrap_or(fallback_priority)),
            None => (gap.description.clone(), fallback_priority),
        }
    }

    /// Reformulações alternativas; sempre inclui a original como primeira opção
    pub async fn refine(&self, question: &str) -> Vec<String> {
        let mut options = vec![question.trim().to_string()];

        match self.llm.complete(ModelRole::Planner, REFINE_SYSTEM_PROMPT, question).await {
            Ok(text) => {
                for alt in extract_string_list(&text, "questions") {
                    if !options.iter().any(|o| o.eq_ignore_ascii_case(&alt)) {
                        options.push(alt);
                    }
                }
            }
            Err(e) => log::warn!("⚠️ Refinamento falhou: {}", e),
        }
        options
    }
}
