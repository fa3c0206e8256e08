// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// QUALITY SCORER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// `Score(candidates) -> {scored, average_score}`
//
// Uma chamada ao modelo por candidato (score + justificativa). Resposta que
// não parseia descarta o candidato. Candidatos acima do teto por chamada são
// ignorados.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::ModelRole;
use crate::llm::LlmGateway;
use crate::types::{CandidateDocument, Source};
use crate::utils::{ellipsize, extract_json};

const SCORER_SYSTEM_PROMPT: &str = "You are a research quality reviewer. Rate how credible \
and relevant a source is for the research question on a scale from 0.0 to 1.0. \
Respond with JSON: {\"score\": <number>, \"justification\": \"<one sentence>\"}.";

/// Tamanho máximo do snippet enviado ao modelo
const SNIPPET_PROMPT_CHARS: usize = 1200;

#[derive(Debug, Deserialize)]
struct Rating {
    score: f32,
    #[serde(default)]
    justification: String,
}

/// Resultado de uma rodada de pontuação
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreReport {
    /// Fontes pontuadas (ordem dos candidatos)
    pub scored: Vec<Source>,
    /// Média dos scores (0.0 se nenhum)
    pub average_score: f32,
    /// Candidatos descartados (resposta inválida ou falha do modelo)
    pub dropped: usize,
}

/// Média de scores; `0.0` para lista vazia
pub fn average_score(sources: &[Source]) -> f32 {
    if sources.is_empty() {
        0.0
    } else {
        sources.iter().map(|s| s.score).sum::<f32>() / sources.len() as f32
    }
}

/// Pontuador de qualidade
pub struct QualityScorer {
    llm: Arc<LlmGateway>,
    max_candidates: usize,
}

impl QualityScorer {
    pub fn new(llm: Arc<LlmGateway>, max_candidates: usize) -> Self {
        Self { llm, max_candidates }
    }

    /// Pontua os candidatos (respeitando o teto por chamada)
    pub async fn score(&self, question_text: &str, candidates: Vec<CandidateDocument>) -> ScoreReport {
        let total = candidates.len();
        if total > self.max_candidates {
            log::info!(
                "✂️ Pontuando {} de {} candidatos (teto por chamada)",
                self.max_candidates,
                total
            );
        }

        let capped: Vec<CandidateDocument> = candidates.into_iter().take(self.max_candidates).collect();
        let attempted = capped.len();

        let ratings = join_all(capped.iter().map(|c| self.rate(question_text, c))).await;

        let scored: Vec<Source> = capped
            .into_iter()
            .zip(ratings)
            .filter_map(|(candidate, rating)| rating.map(|score| Source::from_candidate(candidate, score)))
            .collect();

        let report = ScoreReport {
            average_score: average_score(&scored),
            dropped: attempted - scored.len(),
            scored,
        };

        log::info!(
            "⭐ {} fontes pontuadas (média {:.2}, {} descartadas)",
            report.scored.len(),
            report.average_score,
            report.dropped
        );
        report
    }

    async fn rate(&self, question_text: &str, candidate: &CandidateDocument) -> Option<f32> {
        let user = format!(
            "Research question: {}\n\nSource URL: {}\nTitle: {}\nSnippet: {}",
            question_text,
            candidate.url,
            candidate.title,
            ellipsize(&candidate.snippet, SNIPPET_PROMPT_CHARS)
        );

        let text = match self.llm.complete(ModelRole::Scorer, SCORER_SYSTEM_PROMPT, &user).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("⚠️ Score de {} falhou: {}", candidate.url, e);
                return None;
            }
        };

        match extract_json::<Rating>(&text) {
            Some(rating) if rating.score.is_finite() => {
                log::debug!("{} → {:.2} ({})", candidate.url, rating.score, rating.justification);
                Some(rating.score.clamp(0.0, 1.0))
            }
            _ => {
                log::warn!("⚠️ Resposta de score ilegível para {}, descartando", candidate.url);
                None
            }
        }
    }
}
