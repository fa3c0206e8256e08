// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NÓS DA MÁQUINA DE ESTADOS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Cada nó lê o estado e devolve um `StateDelta`. Nenhum nó muta o estado;
// quem aplica é o driver em `ResearchLoop::drive`.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use super::state::{should_continue, Decision, ResearchState, StateDelta};
use super::ResearchLoop;
use crate::discovery::Discoverer;
use crate::knowledge::{index_source, query_best_effort, KnowledgeIndex};
use crate::scoring::QualityScorer;
use crate::search::normalize_url;
use crate::types::{CandidateDocument, QuestionId, ResearchQuestion};

impl ResearchLoop {
    /// Planning: perguntas fornecidas, ExpandGaps, Decompose ou fechamento
    pub(super) async fn plan_node(&self, state: &ResearchState) -> StateDelta {
        if state.iteration_count == 0 && !state.questions.is_empty() {
            let line = format!("📋 Using {} supplied questions", state.questions.len());
            log::info!("{}", line);
            return StateDelta::log(line);
        }

        if !state.gaps.is_empty() {
            let outcome = self.planner.expand_gaps(&state.gaps, &state.questions).await;
            let line = format!(
                "🌱 Iteration {}: {} follow-up questions from {} gaps",
                state.iteration_count,
                outcome.new_questions.len(),
                state.gaps.len()
            );
            log::info!("{}", line);
            return StateDelta {
                new_questions: outcome.new_questions,
                consumed: outcome.consumed,
                logs: vec![line],
                ..Default::default()
            };
        }

        if state.questions.is_empty() {
            let questions = self.planner.decompose(&state.topic, &state.constraints).await;
            let line = format!("📋 Decomposed topic into {} questions", questions.len());
            log::info!("{}", line);
            return StateDelta {
                new_questions: questions,
                logs: vec![line],
                ..Default::default()
            };
        }

        // Sem lacunas após uma passagem: as pendentes estão cobertas
        let consumed: Vec<QuestionId> = state.pending_questions().map(|q| q.id).collect();
        let line = format!(
            "✅ Iteration {}: no gaps, closing {} pending questions",
            state.iteration_count,
            consumed.len()
        );
        log::info!("{}", line);
        StateDelta {
            consumed,
            logs: vec![line],
            ..Default::default()
        }
    }

    /// Discovery: fan-out web ∥ acadêmico, fan-in com merge por URL
    pub(super) async fn discovery_node(&self, state: &ResearchState) -> StateDelta {
        let active = state.active_questions(self.config.max_question_depth);
        if active.is_empty() {
            let line = "🔍 No active questions, discovery skipped".to_string();
            log::info!("{}", line);
            return StateDelta::log(line);
        }

        let known = Arc::new(state.known_urls());
        let branch = |discoverer: Arc<dyn Discoverer>| {
            tokio::spawn(discovery_branch(
                discoverer,
                self.scorer.clone(),
                self.index.clone(),
                active.clone(),
                known.clone(),
                self.config.discovery_depth,
                self.config.quality_threshold,
            ))
        };
        let web = branch(self.web.clone());
        let academic = branch(self.academic.clone());

        let (web, academic) = tokio::join!(web, academic);
        let web = web.unwrap_or_else(|e| {
            log::error!("❌ Ramo web abortou: {}", e);
            StateDelta::log(format!("⚠️ Web discovery aborted: {}", e))
        });
        let academic = academic.unwrap_or_else(|e| {
            log::error!("❌ Ramo acadêmico abortou: {}", e);
            StateDelta::log(format!("⚠️ Academic discovery aborted: {}", e))
        });

        web.merge(academic)
    }

    /// KnowledgeStructuring: fragmentos + entidades para as pendentes
    pub(super) async fn structuring_node(&self, state: &ResearchState) -> StateDelta {
        let pending: Vec<&ResearchQuestion> = state.pending_questions().collect();
        if pending.is_empty() {
            return StateDelta::log("🧩 No pending questions, structuring skipped");
        }

        let combined = pending
            .iter()
            .map(|q| q.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let retrieved =
            query_best_effort(self.index.as_ref(), &combined, self.config.fragments_per_query).await;

        let existing: HashSet<(&str, Option<&str>)> = state
            .knowledge_fragments
            .iter()
            .map(|f| (f.text.as_str(), f.url()))
            .collect();
        let fragments: Vec<_> = retrieved
            .into_iter()
            .filter(|f| !existing.contains(&(f.text.as_str(), f.url())))
            .collect();

        let entities = self.extractor.extract(&fragments).await;

        let line = format!(
            "🧩 {} new fragments, {} entities for {} pending questions",
            fragments.len(),
            entities.len(),
            pending.len()
        );
        log::info!("{}", line);
        StateDelta {
            fragments,
            entities,
            logs: vec![line],
            ..Default::default()
        }
    }

    /// GapAnalysis: lacunas sobre as ativas; sempre avança a iteração
    pub(super) async fn gap_node(&self, state: &ResearchState) -> StateDelta {
        let active = state.active_questions(self.config.max_question_depth);
        let gaps = if active.is_empty() {
            Vec::new()
        } else {
            let context =
                query_best_effort(self.index.as_ref(), &state.topic, self.config.fragments_per_query).await;
            self.gaps.find_gaps(&active, &context).await
        };

        let line = format!(
            "🕳️ Iteration {} analysed: {} gaps over {} active questions",
            state.iteration_count,
            gaps.len(),
            active.len()
        );
        log::info!("{}", line);
        StateDelta {
            gaps: Some(gaps),
            advance_iteration: true,
            logs: vec![line],
            ..Default::default()
        }
    }

    /// Decision: só lê o estado
    pub(super) fn decision_node(&self, state: &ResearchState, max_iterations: u32) -> (Decision, StateDelta) {
        let decision = should_continue(state, max_iterations);
        let pending = state.pending_questions().count();
        let line = match decision {
            Decision::Continue => format!(
                "🔁 Continue: iteration {}/{}, {} pending",
                state.iteration_count, max_iterations, pending
            ),
            Decision::Finish if state.iteration_count >= max_iterations => format!(
                "🛑 Iteration ceiling reached ({}/{})",
                state.iteration_count, max_iterations
            ),
            Decision::Finish => format!(
                "🏁 No pending questions after {} iterations",
                state.iteration_count
            ),
        };
        log::info!("{}", line);
        (decision, StateDelta::log(line))
    }

    /// Synthesis: uma seção por pergunta já criada
    pub(super) async fn synthesis_node(&self, state: &ResearchState) -> StateDelta {
        let report = self
            .synthesizer
            .synthesize(&state.topic, &state.questions, None)
            .await;
        let line = format!(
            "📝 Report written: {} sections, {} sources",
            state.questions.len(),
            state.sources.len()
        );
        log::info!("{}", line);
        StateDelta {
            final_report: Some(report),
            complete: true,
            logs: vec![line],
            ..Default::default()
        }
    }
}

/// Um ramo de descoberta: descobre, pontua uma vez e indexa as aprovadas.
///
/// URLs já presentes no estado (ou vistas antes neste ramo) não são
/// pontuadas de novo.
pub(super) async fn discovery_branch(
    discoverer: Arc<dyn Discoverer>,
    scorer: Arc<QualityScorer>,
    index: Arc<dyn KnowledgeIndex>,
    questions: Vec<ResearchQuestion>,
    known: Arc<HashSet<String>>,
    depth: u8,
    threshold: f32,
) -> StateDelta {
    let source_type = discoverer.source_type();
    let per_question = join_all(questions.iter().map(|q| discoverer.discover(q, depth))).await;

    let mut seen: HashSet<String> = known.as_ref().clone();
    let batches: Vec<(&ResearchQuestion, Vec<CandidateDocument>)> = questions
        .iter()
        .zip(per_question)
        .map(|(q, candidates)| {
            let fresh = candidates
                .into_iter()
                .filter(|c| seen.insert(normalize_url(&c.url)))
                .collect::<Vec<_>>();
            (q, fresh)
        })
        .filter(|(_, fresh)| !fresh.is_empty())
        .collect();

    let candidate_count: usize = batches.iter().map(|(_, c)| c.len()).sum();
    let reports = join_all(
        batches
            .into_iter()
            .map(|(q, candidates)| scorer.score(&q.text, candidates)),
    )
    .await;

    let sources: Vec<_> = reports.into_iter().flat_map(|r| r.scored).collect();

    let mut indexed = 0;
    for source in sources.iter().filter(|s| s.score >= threshold) {
        if index_source(index.as_ref(), source).await {
            indexed += 1;
        }
    }

    let line = format!(
        "📚 [{}] {} candidates, {} scored, {} indexed",
        source_type,
        candidate_count,
        sources.len(),
        indexed
    );
    log::info!("{}", line);
    StateDelta {
        sources,
        logs: vec![line],
        ..Default::default()
    }
}
