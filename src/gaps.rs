// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GAP ANALYZER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// `FindGaps(active_questions, context) -> seq<Gap>`
//
// Uma chamada ao modelo. Qualquer falha (modelo, parse) resulta em lista
// vazia. Lacuna com `related_question_id` desconhecido é descartada.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ModelRole;
use crate::llm::LlmGateway;
use crate::types::{Fragment, Gap, QuestionId, ResearchQuestion};
use crate::utils::{ellipsize, extract_json};

const ANALYST_SYSTEM_PROMPT: &str = "You are a critical research analyst. Compare the research \
questions with the collected evidence and identify what is still missing, contradictory or \
shallow. Output a JSON list of objects with 'related_question_id' (one of the given ids) and \
'description'. Output [] when the evidence is sufficient.";

const CONTEXT_PROMPT_CHARS: usize = 500;

/// Analisador de lacunas
pub struct GapAnalyzer {
    llm: Arc<LlmGateway>,
}

impl GapAnalyzer {
    pub fn new(llm: Arc<LlmGateway>) -> Self {
        Self { llm }
    }

    /// Detecta lacunas nas perguntas ativas
    pub async fn find_gaps(&self, active_questions: &[ResearchQuestion], context: &[Fragment]) -> Vec<Gap> {
        if active_questions.is_empty() {
            return Vec::new();
        }

        let questions = active_questions
            .iter()
            .map(|q| format!("- [{}] {}", q.id, q.text))
            .collect::<Vec<_>>()
            .join("\n");
        let evidence = if context.is_empty() {
            "(no evidence collected yet)".to_string()
        } else {
            context
                .iter()
                .map(|f| format!("- {}", ellipsize(&f.text, CONTEXT_PROMPT_CHARS)))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let user = format!("Questions:\n{}\n\nEvidence:\n{}", questions, evidence);

        let text = match self.llm.complete(ModelRole::Analyst, ANALYST_SYSTEM_PROMPT, &user).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("⚠️ Análise de lacunas falhou: {}", e);
                return Vec::new();
            }
        };

        let Some(items) = extract_json::<Vec<Value>>(&text) else {
            log::warn!("⚠️ Resposta de lacunas ilegível, assumindo nenhuma");
            return Vec::new();
        };

        let known: HashSet<QuestionId> = active_questions.iter().map(|q| q.id).collect();
        let gaps: Vec<Gap> = items.iter().filter_map(|item| parse_gap(item, &known)).collect();

        log::info!("🕳️ {} lacunas detectadas", gaps.len());
        gaps
    }
}

fn parse_gap(item: &Value, known: &HashSet<QuestionId>) -> Option<Gap> {
    let id = match item.get("related_question_id")? {
        Value::Number(n) => n.as_u64().and_then(|n| QuestionId::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<QuestionId>().ok(),
        _ => None,
    }?;

    let description = item
        .get("description")
        .or_else(|| item.get("gap"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())?;

    if !known.contains(&id) {
        log::warn!("⚠️ Lacuna referencia pergunta inexistente {} (descartada)", id);
        return None;
    }

    Some(Gap {
        related_question_id: id,
        description: description.to_string(),
    })
}
