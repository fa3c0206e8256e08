// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ESTADO DA PESQUISA
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// `ResearchState` é o acumulador do loop. Cada nó devolve um `StateDelta`
// e o driver aplica com `ResearchState::apply`. Invariantes:
// - campos append-only nunca encolhem
// - `sources` é união por URL (a primeira fonte vista para uma URL fica)
// - `gaps` é substituído a cada análise
// - `iteration_count` sobe exatamente 1 por passagem pela GapAnalysis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::planner::mark_consumed;
use crate::search::normalize_url;
use crate::types::{
    Constraints, Fragment, Gap, QuestionId, ResearchQuestion, Source, Triplet,
};
use crate::utils::{merge_usage, UsageMap};

/// Fases da máquina de estados.
///
/// Guardada no estado como a PRÓXIMA fase a executar, o que permite retomar
/// de um checkpoint exatamente de onde parou.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Decompose / ExpandGaps / perguntas fornecidas
    #[default]
    Planning,
    /// WebDiscovery ∥ AcademicDiscovery (fan-out/fan-in)
    Discovery,
    /// Fragmentos + entidades para as perguntas pendentes
    KnowledgeStructuring,
    /// Lacunas + incremento de iteração
    GapAnalysis,
    /// continuar ou finalizar
    Decision,
    /// Relatório final
    Synthesis,
    /// Terminal
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Discovery => "discovery",
            Self::KnowledgeStructuring => "knowledge_structuring",
            Self::GapAnalysis => "gap_analysis",
            Self::Decision => "decision",
            Self::Synthesis => "synthesis",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resultado do nó de decisão
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Finish,
}

/// Decide se o loop continua.
///
/// O teto de iterações é checado primeiro e sempre vence.
pub fn should_continue(state: &ResearchState, max_iterations: u32) -> Decision {
    if state.iteration_count >= max_iterations {
        return Decision::Finish;
    }
    if state.pending_questions().next().is_none() {
        return Decision::Finish;
    }
    Decision::Continue
}

/// Estado acumulado de uma sessão de pesquisa
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    /// Chave do checkpoint
    pub session_id: String,
    pub topic: String,
    pub constraints: Constraints,
    /// Append-only
    pub questions: Vec<ResearchQuestion>,
    /// Append-only, união por URL
    pub sources: Vec<Source>,
    /// Append-only
    pub knowledge_fragments: Vec<Fragment>,
    /// Append-only
    pub structured_entities: Vec<Triplet>,
    /// Substituído a cada GapAnalysis
    pub gaps: Vec<Gap>,
    /// +1 por passagem completa
    pub iteration_count: u32,
    /// Uso por `role:model` (aditivo)
    pub token_usage: UsageMap,
    pub final_report: Option<String>,
    pub is_complete: bool,
    /// Próxima fase a executar
    pub phase: Phase,
    /// Linhas de log de cada transição (append-only)
    pub logs: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchState {
    /// Nova sessão a partir de um tópico
    pub fn new(topic: impl Into<String>, constraints: Constraints) -> Self {
        let topic = topic.into();
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            logs: vec![format!("Starting research on: {}", topic)],
            topic,
            constraints,
            questions: Vec::new(),
            sources: Vec::new(),
            knowledge_fragments: Vec::new(),
            structured_entities: Vec::new(),
            gaps: Vec::new(),
            iteration_count: 0,
            token_usage: UsageMap::new(),
            final_report: None,
            is_complete: false,
            phase: Phase::Planning,
            started_at: now,
            updated_at: now,
        }
    }

    /// Nova sessão com perguntas pré-aprovadas (usadas como estão na iteração 0)
    pub fn with_questions(topic: impl Into<String>, questions: Vec<ResearchQuestion>) -> Self {
        let mut state = Self::new(topic, Constraints::new());
        state.questions = questions;
        state
    }

    /// Define o id da sessão
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Perguntas pendentes (qualquer profundidade)
    pub fn pending_questions(&self) -> impl Iterator<Item = &ResearchQuestion> {
        self.questions.iter().filter(|q| q.is_pending())
    }

    /// Perguntas pendentes abaixo da profundidade máxima
    pub fn active_questions(&self, max_depth: u32) -> Vec<ResearchQuestion> {
        self.questions
            .iter()
            .filter(|q| crate::planner::is_active(q, max_depth))
            .cloned()
            .collect()
    }

    pub fn question(&self, id: QuestionId) -> Option<&ResearchQuestion> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// URLs normalizadas já presentes
    pub fn known_urls(&self) -> HashSet<String> {
        self.sources.iter().map(|s| normalize_url(&s.url)).collect()
    }

    /// Total de tokens em todas as chaves
    pub fn total_tokens(&self) -> u64 {
        self.token_usage.values().map(|u| u.total).sum()
    }

    /// Reabre um estado finalizado para continuar com teto maior.
    ///
    /// A próxima fase volta a ser a decisão, que reavalia o novo teto.
    pub fn reopen(&mut self) {
        if self.is_complete {
            self.is_complete = false;
            self.final_report = None;
            self.phase = Phase::Decision;
            self.logs.push(format!("Reopened at iteration {}", self.iteration_count));
        }
    }

    /// Aplica um delta (o único ponto de mutação do estado)
    pub fn apply(&mut self, delta: StateDelta) {
        mark_consumed(&mut self.questions, &delta.consumed);

        let existing_ids: HashSet<QuestionId> = self.questions.iter().map(|q| q.id).collect();
        for q in delta.new_questions {
            if existing_ids.contains(&q.id) {
                log::warn!("⚠️ Pergunta {} já existe, ignorada", q.id);
                continue;
            }
            self.questions.push(q);
        }

        merge_sources(&mut self.sources, delta.sources);

        let known: HashSet<(String, Option<String>)> = self
            .knowledge_fragments
            .iter()
            .map(fragment_key)
            .collect();
        let mut seen = known;
        for f in delta.fragments {
            if seen.insert(fragment_key(&f)) {
                self.knowledge_fragments.push(f);
            }
        }

        for t in delta.entities {
            if !self.structured_entities.contains(&t) {
                self.structured_entities.push(t);
            }
        }

        if let Some(gaps) = delta.gaps {
            self.gaps = gaps;
        }
        if delta.advance_iteration {
            self.iteration_count += 1;
        }
        merge_usage(&mut self.token_usage, &delta.token_usage);

        if let Some(report) = delta.final_report {
            self.final_report = Some(report);
        }
        if delta.complete {
            self.is_complete = true;
        }
        self.logs.extend(delta.logs);
        self.updated_at = Utc::now();
    }
}

fn fragment_key(f: &Fragment) -> (String, Option<String>) {
    (f.text.clone(), f.url().map(str::to_string))
}

/// Contribuição de um nó para o estado
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub new_questions: Vec<ResearchQuestion>,
    /// Perguntas que passam a `analyzed`
    pub consumed: Vec<QuestionId>,
    pub sources: Vec<Source>,
    pub fragments: Vec<Fragment>,
    pub entities: Vec<Triplet>,
    /// `Some` substitui as lacunas
    pub gaps: Option<Vec<Gap>>,
    pub advance_iteration: bool,
    pub token_usage: UsageMap,
    pub final_report: Option<String>,
    pub complete: bool,
    pub logs: Vec<String>,
}

impl StateDelta {
    /// Delta que só registra uma linha de log
    pub fn log(line: impl Into<String>) -> Self {
        Self {
            logs: vec![line.into()],
            ..Default::default()
        }
    }

    /// Combina as saídas de dois ramos concorrentes.
    ///
    /// Fontes: união por URL; demais listas: concatenação.
    pub fn merge(mut self, other: StateDelta) -> StateDelta {
        self.new_questions.extend(other.new_questions);
        for id in other.consumed {
            if !self.consumed.contains(&id) {
                self.consumed.push(id);
            }
        }
        merge_branch_sources(&mut self.sources, other.sources);
        self.fragments.extend(other.fragments);
        self.entities.extend(other.entities);
        if other.gaps.is_some() {
            self.gaps = other.gaps;
        }
        self.advance_iteration |= other.advance_iteration;
        merge_usage(&mut self.token_usage, &other.token_usage);
        if other.final_report.is_some() {
            self.final_report = other.final_report;
        }
        self.complete |= other.complete;
        self.logs.extend(other.logs);
        self
    }
}

/// Acrescenta em `existing` as fontes com URL ainda não vista
pub fn merge_sources(existing: &mut Vec<Source>, incoming: Vec<Source>) {
    let mut seen: HashSet<String> = existing.iter().map(|s| normalize_url(&s.url)).collect();
    for source in incoming {
        if seen.insert(normalize_url(&source.url)) {
            existing.push(source);
        }
    }
}

/// União entre ramos, independente da ordem de chegada.
///
/// Em URL duplicada entre ramos vence o maior score; empate decide pelo tipo
/// de fonte e depois pelo título.
fn merge_branch_sources(target: &mut Vec<Source>, incoming: Vec<Source>) {
    let mut index: HashMap<String, usize> = target
        .iter()
        .enumerate()
        .map(|(i, s)| (normalize_url(&s.url), i))
        .collect();

    for source in incoming {
        let key = normalize_url(&source.url);
        match index.get(&key) {
            Some(&i) => {
                if prefer(&source, &target[i]) {
                    target[i] = source;
                }
            }
            None => {
                index.insert(key, target.len());
                target.push(source);
            }
        }
    }
}

fn prefer(candidate: &Source, current: &Source) -> bool {
    candidate
        .score
        .total_cmp(&current.score)
        .then_with(|| current.source_type.cmp(&candidate.source_type))
        .then_with(|| current.title.cmp(&candidate.title))
        .is_gt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QuestionStatus, SourceType};

    fn source(url: &str, score: f32, source_type: SourceType) -> Source {
        Source {
            url: url.into(),
            title: url.into(),
            snippet: String::new(),
            score,
            source_type,
            question_id: 1,
        }
    }

    fn state_with(questions: Vec<ResearchQuestion>, iteration: u32) -> ResearchState {
        let mut state = ResearchState::with_questions("topic", questions);
        state.iteration_count = iteration;
        state
    }

    #[test]
    fn test_ceiling_dominates_pending() {
        for iteration in [3, 4, 10] {
            let state = state_with(vec![ResearchQuestion::new(1, "q", 1)], iteration);
            assert_eq!(should_continue(&state, 3), Decision::Finish);
        }
    }

    #[test]
    fn test_zero_pending_finishes_at_any_iteration() {
        for iteration in [0, 1, 2] {
            let mut q = ResearchQuestion::new(1, "q", 1);
            q.status = QuestionStatus::Analyzed;
            let state = state_with(vec![q], iteration);
            assert_eq!(should_continue(&state, 5), Decision::Finish);
        }
        assert_eq!(should_continue(&state_with(vec![], 0), 5), Decision::Finish);
    }

    #[test]
    fn test_continue_below_ceiling_with_pending() {
        let state = state_with(vec![ResearchQuestion::new(1, "q", 1)], 1);
        assert_eq!(should_continue(&state, 5), Decision::Continue);
    }

    #[test]
    fn test_branch_merge_is_order_independent() {
        let web = StateDelta {
            sources: vec![
                source("https://a.com", 0.6, SourceType::Web),
                source("https://shared.org/x", 0.5, SourceType::Web),
            ],
            ..Default::default()
        };
        let academic = StateDelta {
            sources: vec![
                source("https://shared.org/x/", 0.9, SourceType::Academic),
                source("https://b.edu", 0.7, SourceType::Academic),
            ],
            ..Default::default()
        };

        let sorted = |delta: StateDelta| {
            let mut s = delta.sources;
            s.sort_by(|a, b| normalize_url(&a.url).cmp(&normalize_url(&b.url)));
            s
        };
        let ab = sorted(web.clone().merge(academic.clone()));
        let ba = sorted(academic.merge(web));

        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 3);
        assert!(ab.iter().any(|s| s.score == 0.9 && s.source_type == SourceType::Academic));
    }

    #[test]
    fn test_apply_keeps_append_only_fields() {
        let mut state = state_with(vec![ResearchQuestion::new(1, "q", 1)], 0);
        state.apply(StateDelta {
            sources: vec![source("https://a.com", 0.5, SourceType::Web)],
            gaps: Some(vec![Gap { related_question_id: 1, description: "g".into() }]),
            ..Default::default()
        });
        state.apply(StateDelta {
            sources: vec![source("https://a.com/", 0.9, SourceType::Academic)],
            gaps: Some(vec![]),
            advance_iteration: true,
            ..Default::default()
        });

        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.sources[0].score, 0.5);
        assert!(state.gaps.is_empty());
        assert_eq!(state.iteration_count, 1);
    }

    #[test]
    fn test_apply_consumes_and_appends_questions() {
        let mut state = state_with(vec![ResearchQuestion::new(1, "q", 1)], 0);
        let parent = state.questions[0].clone();
        state.apply(StateDelta {
            new_questions: vec![
                ResearchQuestion::follow_up(2, "child", 2, &parent),
                ResearchQuestion::new(1, "duplicate id", 1),
            ],
            consumed: vec![1],
            ..Default::default()
        });

        assert_eq!(state.questions.len(), 2);
        assert!(!state.questions[0].is_pending());
        assert_eq!(state.question(2).unwrap().parent_id, Some(1));
    }

    #[test]
    fn test_reopen_only_when_complete() {
        let mut state = state_with(vec![], 3);
        state.reopen();
        assert_eq!(state.phase, Phase::Planning);

        state.is_complete = true;
        state.final_report = Some("r".into());
        state.phase = Phase::Done;
        state.reopen();
        assert!(!state.is_complete);
        assert!(state.final_report.is_none());
        assert_eq!(state.phase, Phase::Decision);
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let state = state_with(vec![ResearchQuestion::new(1, "q", 1)], 2);
        let json = serde_json::to_string(&state).unwrap();
        let back: ResearchState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
