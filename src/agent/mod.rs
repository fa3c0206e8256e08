// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RESEARCH LOOP - MÁQUINA DE ESTADOS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Planning → {WebDiscovery ∥ AcademicDiscovery} → KnowledgeStructuring
//          → GapAnalysis → Decision{continue → Planning, finish → Synthesis}
//          → Done
//
// Após cada transição o driver:
// 1. drena o uso de tokens acumulado no tracker para o delta
// 2. aplica o delta e avança a fase
// 3. grava o checkpoint da sessão
// 4. emite o evento
// 5. checa a flag de parada
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod checkpoint;
mod events;
mod nodes;
mod state;

pub use checkpoint::{CheckpointError, CheckpointStore, InMemoryCheckpointStore, LocalCheckpointStore};
pub use events::{EventCallback, ResearchEvent, RunOutcome, StopHandle, Termination};
pub use state::{merge_sources, should_continue, Decision, Phase, ResearchState, StateDelta};

#[cfg(test)]
pub use checkpoint::MockCheckpointStore;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, ResearchConfig};
use crate::discovery::{AcademicDiscoverer, Discoverer, QueryGenerator, WebDiscoverer};
use crate::gaps::GapAnalyzer;
use crate::knowledge::{index_source, EntityExtractor, InMemoryKnowledgeIndex, KnowledgeIndex};
use crate::llm::{LlmClient, LlmGateway};
use crate::planner::QuestionPlanner;
use crate::rate_limiter::RateLimiter;
use crate::scoring::QualityScorer;
use crate::search::{AcademicClient, SearchClient};
use crate::synthesis::Synthesizer;
use crate::types::{Constraints, ResearchQuestion};
use crate::utils::{ActionTimer, PhaseTimings, TokenTracker};

/// Aviso anexado a relatórios gerados antes do fim do loop
pub const PARTIAL_REPORT_NOTICE: &str =
    "research was interrupted before completion; sections reflect the evidence gathered so far.";

/// Erros do loop (fatais para a execução corrente)
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Research loop is already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

/// Guarda de não-reentrância: libera a flag ao sair de escopo
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orquestrador do loop de pesquisa
pub struct ResearchLoop {
    config: ResearchConfig,
    llm: Arc<LlmGateway>,
    planner: QuestionPlanner,
    web: Arc<dyn Discoverer>,
    academic: Arc<dyn Discoverer>,
    scorer: Arc<QualityScorer>,
    index: Arc<dyn KnowledgeIndex>,
    extractor: EntityExtractor,
    gaps: GapAnalyzer,
    synthesizer: Synthesizer,
    checkpoints: Arc<dyn CheckpointStore>,
    limiter: Arc<RateLimiter>,
    stop: StopHandle,
    running: AtomicBool,
    callback: Option<EventCallback>,
}

impl ResearchLoop {
    pub fn builder(config: ResearchConfig) -> ResearchLoopBuilder {
        ResearchLoopBuilder::new(config)
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn KnowledgeIndex> {
        &self.index
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn token_tracker(&self) -> &Arc<TokenTracker> {
        self.llm.tracker()
    }

    /// Handle de parada clonável (ex: para o handler de Ctrl-C)
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Solicita parada após a transição corrente
    pub fn stop(&self) {
        log::warn!("⏹️ Parada solicitada");
        self.stop.request();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // SUPERFÍCIE DE CONTROLE
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Prévia do plano: só decompõe o tópico, sem tocar em estado
    pub async fn start_planning_only(&self, topic: &str, constraints: &Constraints) -> Vec<ResearchQuestion> {
        self.planner.decompose(topic, constraints).await
    }

    /// Reformulações de uma pergunta do plano
    pub async fn refine_question(&self, question: &str) -> Vec<String> {
        self.planner.refine(question).await
    }

    /// Executa até terminar, parar ou atingir o teto.
    ///
    /// `ceiling` substitui `max_iterations` da configuração.
    pub async fn run_full(&self, state: ResearchState, ceiling: Option<u32>) -> Result<RunOutcome, LoopError> {
        self.run_with_sink(state, ceiling, None).await
    }

    /// Como `run_full`, mas em uma task própria com stream de eventos
    pub fn run_stream(
        self: &Arc<Self>,
        state: ResearchState,
        ceiling: Option<u32>,
    ) -> (
        JoinHandle<Result<RunOutcome, LoopError>>,
        mpsc::UnboundedReceiver<ResearchEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_with_sink(state, ceiling, Some(tx)).await });
        (handle, rx)
    }

    /// Retoma uma sessão a partir do último checkpoint.
    ///
    /// Sessão já completa é reaberta quando o novo teto é maior que a
    /// iteração em que parou.
    pub async fn resume(&self, session_id: &str, ceiling: Option<u32>) -> Result<RunOutcome, LoopError> {
        let mut state = self
            .checkpoints
            .load(session_id)
            .await?
            .ok_or_else(|| LoopError::SessionNotFound(session_id.to_string()))?;

        let max_iterations = ceiling.unwrap_or(self.config.max_iterations);
        if state.is_complete && state.iteration_count < max_iterations {
            log::info!(
                "🔓 Reabrindo sessão {} (iteração {} → teto {})",
                session_id,
                state.iteration_count,
                max_iterations
            );
            state.reopen();
        }
        log::info!("⏯️ Retomando sessão {} na fase {}", session_id, state.phase);
        self.rehydrate_index(&state).await;
        self.run_full(state, ceiling).await
    }

    /// Gera o relatório com o que já foi acumulado, sem mais iterações.
    ///
    /// Estado incompleto produz relatório sinalizado como parcial.
    pub async fn generate_report_now(&self, state: &ResearchState) -> String {
        if state.is_complete {
            if let Some(report) = &state.final_report {
                return report.clone();
            }
        }
        self.rehydrate_index(state).await;
        let notice = (!state.is_complete).then_some(PARTIAL_REPORT_NOTICE);
        log::info!(
            "📝 Gerando relatório agora ({} perguntas, parcial: {})",
            state.questions.len(),
            notice.is_some()
        );
        self.synthesizer
            .synthesize(&state.topic, &state.questions, notice)
            .await
    }

    /// Índice vazio com estado já populado (ex: outro processo): reindexa
    /// as fontes aprovadas do estado
    async fn rehydrate_index(&self, state: &ResearchState) {
        if !self.index.is_empty() || state.sources.is_empty() {
            return;
        }
        let mut indexed = 0;
        for source in state
            .sources
            .iter()
            .filter(|s| s.score >= self.config.quality_threshold)
        {
            if index_source(self.index.as_ref(), source).await {
                indexed += 1;
            }
        }
        log::info!("♻️ Índice reconstruído a partir do estado: {} fontes", indexed);
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // DRIVER
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn emit(&self, event: ResearchEvent, sink: &Option<mpsc::UnboundedSender<ResearchEvent>>) {
        if let Some(cb) = &self.callback {
            cb(&event);
        }
        if let Some(tx) = sink {
            // receptor descartado não interrompe o loop
            let _ = tx.send(event);
        }
    }

    async fn checkpoint(&self, state: &ResearchState) {
        if let Err(e) = self.checkpoints.save(&state.session_id, state).await {
            log::warn!(
                "⚠️ Checkpoint da sessão {} falhou ({}): {}",
                state.session_id,
                self.checkpoints.name(),
                e
            );
        }
    }

    async fn run_with_sink(
        &self,
        state: ResearchState,
        ceiling: Option<u32>,
        sink: Option<mpsc::UnboundedSender<ResearchEvent>>,
    ) -> Result<RunOutcome, LoopError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            log::error!("❌ Loop já em execução");
            self.emit(
                ResearchEvent::Error {
                    message: LoopError::AlreadyRunning.to_string(),
                },
                &sink,
            );
            return Err(LoopError::AlreadyRunning);
        };

        // uso registrado fora de uma sessão (prévia, refine, report-now) não entra nela
        let stale = self.llm.tracker().take_delta();
        if !stale.is_empty() {
            log::debug!("Uso anterior à sessão descartado do delta: {} chaves", stale.len());
        }

        let max_iterations = ceiling.unwrap_or(self.config.max_iterations);
        let outcome = self.drive(state, max_iterations, &sink).await;

        // parada pedida antes do início vale para esta execução; depois dela, não
        self.stop.reset();
        Ok(outcome)
    }

    async fn drive(
        &self,
        mut state: ResearchState,
        max_iterations: u32,
        sink: &Option<mpsc::UnboundedSender<ResearchEvent>>,
    ) -> RunOutcome {
        if state.is_complete || state.phase.is_terminal() {
            log::info!("✔️ Sessão {} já está completa", state.session_id);
            if let Some(report) = &state.final_report {
                self.emit(
                    ResearchEvent::Report {
                        final_report: report.clone(),
                    },
                    sink,
                );
            }
            return RunOutcome {
                state,
                termination: Termination::AlreadyComplete,
            };
        }

        if self.stop.is_requested() {
            log::warn!(
                "⏹️ Parada pendente; sessão {} não inicia (fase {})",
                state.session_id,
                state.phase
            );
            self.emit(
                ResearchEvent::Stopped {
                    iteration: state.iteration_count,
                },
                sink,
            );
            return RunOutcome {
                state,
                termination: Termination::Stopped,
            };
        }

        log::info!(
            "🚀 Sessão {}: '{}' (fase {}, iteração {}/{})",
            state.session_id,
            state.topic,
            state.phase,
            state.iteration_count,
            max_iterations
        );
        let mut timings = PhaseTimings::new();

        while !state.phase.is_terminal() {
            let phase = state.phase;
            let timer = ActionTimer::start(phase.as_str());

            let (mut delta, next) = match phase {
                Phase::Planning => (self.plan_node(&state).await, Phase::Discovery),
                Phase::Discovery => (self.discovery_node(&state).await, Phase::KnowledgeStructuring),
                Phase::KnowledgeStructuring => (self.structuring_node(&state).await, Phase::GapAnalysis),
                Phase::GapAnalysis => (self.gap_node(&state).await, Phase::Decision),
                Phase::Decision => match self.decision_node(&state, max_iterations) {
                    (Decision::Continue, delta) => (delta, Phase::Planning),
                    (Decision::Finish, delta) => (delta, Phase::Synthesis),
                },
                Phase::Synthesis => (self.synthesis_node(&state).await, Phase::Done),
                Phase::Done => break,
            };

            delta.token_usage = self.llm.tracker().take_delta();
            timings.record(phase.as_str(), timer.stop_and_log());

            let iteration = state.iteration_count;
            state.apply(delta.clone());
            state.phase = next;

            self.checkpoint(&state).await;
            self.emit(
                ResearchEvent::Transition {
                    phase,
                    iteration,
                    delta,
                },
                sink,
            );

            if state.phase.is_terminal() {
                break;
            }
            if self.stop.is_requested() {
                log::warn!(
                    "⏹️ Loop parado após {} (iteração {}); estado parcial devolvido",
                    phase,
                    state.iteration_count
                );
                self.emit(
                    ResearchEvent::Stopped {
                        iteration: state.iteration_count,
                    },
                    sink,
                );
                log::debug!("⏱️ {}", timings.summary());
                return RunOutcome {
                    state,
                    termination: Termination::Stopped,
                };
            }
        }

        let termination = if state.iteration_count >= max_iterations {
            Termination::CeilingReached
        } else {
            Termination::Converged
        };

        if let Some(report) = &state.final_report {
            self.emit(
                ResearchEvent::Report {
                    final_report: report.clone(),
                },
                sink,
            );
        }
        log::info!(
            "🏁 Sessão {} concluída ({:?}): {} iterações, {} perguntas, {} fontes, {} tokens",
            state.session_id,
            termination,
            state.iteration_count,
            state.questions.len(),
            state.sources.len(),
            state.total_tokens()
        );
        log::debug!("⏱️ {}", timings.summary());

        RunOutcome { state, termination }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BUILDER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Monta o loop a partir dos clientes externos
pub struct ResearchLoopBuilder {
    config: ResearchConfig,
    llm_client: Option<Arc<dyn LlmClient>>,
    search_client: Option<Arc<dyn SearchClient>>,
    academic_client: Option<Arc<dyn AcademicClient>>,
    web: Option<Arc<dyn Discoverer>>,
    academic: Option<Arc<dyn Discoverer>>,
    index: Option<Arc<dyn KnowledgeIndex>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    stop: Option<StopHandle>,
    callback: Option<EventCallback>,
}

impl ResearchLoopBuilder {
    pub fn new(config: ResearchConfig) -> Self {
        Self {
            config,
            llm_client: None,
            search_client: None,
            academic_client: None,
            web: None,
            academic: None,
            index: None,
            checkpoints: None,
            stop: None,
            callback: None,
        }
    }

    pub fn llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm_client = Some(client);
        self
    }

    pub fn search_client(mut self, client: Arc<dyn SearchClient>) -> Self {
        self.search_client = Some(client);
        self
    }

    pub fn academic_client(mut self, client: Arc<dyn AcademicClient>) -> Self {
        self.academic_client = Some(client);
        self
    }

    /// Substitui o descobridor web (dispensa `search_client`)
    pub fn web_discoverer(mut self, discoverer: Arc<dyn Discoverer>) -> Self {
        self.web = Some(discoverer);
        self
    }

    /// Substitui o descobridor acadêmico (dispensa `academic_client`)
    pub fn academic_discoverer(mut self, discoverer: Arc<dyn Discoverer>) -> Self {
        self.academic = Some(discoverer);
        self
    }

    /// Índice de conhecimento (padrão: em memória)
    pub fn index(mut self, index: Arc<dyn KnowledgeIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Armazenamento de checkpoints (padrão: em memória)
    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Compartilha uma flag de parada criada antes do loop
    pub fn stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Callback chamado a cada evento
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Valida a configuração e monta os componentes
    pub fn build(self) -> Result<ResearchLoop, LoopError> {
        let config = self.config;
        config.validate()?;

        let llm_client = self.llm_client.ok_or(LoopError::MissingComponent("llm_client"))?;
        let llm = Arc::new(LlmGateway::new(llm_client, &config));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_interval));
        let queries = Arc::new(QueryGenerator::new(llm.clone(), config.max_queries_per_question));

        let web: Arc<dyn Discoverer> = match (self.web, self.search_client) {
            (Some(discoverer), _) => discoverer,
            (None, Some(client)) => Arc::new(WebDiscoverer::new(
                client,
                queries.clone(),
                limiter.clone(),
                &config,
            )),
            (None, None) => return Err(LoopError::MissingComponent("search_client")),
        };
        let academic: Arc<dyn Discoverer> = match (self.academic, self.academic_client) {
            (Some(discoverer), _) => discoverer,
            (None, Some(client)) => Arc::new(AcademicDiscoverer::new(
                client,
                queries.clone(),
                limiter.clone(),
                &config,
            )),
            (None, None) => return Err(LoopError::MissingComponent("academic_client")),
        };

        let index = self
            .index
            .unwrap_or_else(|| Arc::new(InMemoryKnowledgeIndex::default()));
        let checkpoints = self
            .checkpoints
            .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new()));

        log::info!(
            "🔧 Loop configurado: teto {}, profundidade {}, descoberta {}, limiar {:.2}, checkpoints {}",
            config.max_iterations,
            config.max_question_depth,
            config.discovery_depth,
            config.quality_threshold,
            checkpoints.name()
        );

        Ok(ResearchLoop {
            planner: QuestionPlanner::new(llm.clone()),
            scorer: Arc::new(QualityScorer::new(llm.clone(), config.max_candidates_per_score)),
            extractor: EntityExtractor::new(llm.clone()),
            gaps: GapAnalyzer::new(llm.clone()),
            synthesizer: Synthesizer::new(llm.clone(), index.clone(), config.fragments_per_query),
            web,
            academic,
            index,
            checkpoints,
            limiter,
            llm,
            stop: self.stop.unwrap_or_default(),
            running: AtomicBool::new(false),
            callback: self.callback,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelRole;
    use crate::llm::MockLlmClient;
    use crate::search::{MockAcademicClient, MockSearchClient};
    use crate::types::QuestionStatus;
    use std::sync::Mutex;
    use std::time::Duration;

    fn config() -> ResearchConfig {
        ResearchConfig::default().with_rate_limit(Duration::from_millis(1))
    }

    fn build(mock: MockLlmClient, config: ResearchConfig) -> ResearchLoop {
        ResearchLoop::builder(config)
            .llm_client(Arc::new(mock))
            .search_client(Arc::new(MockSearchClient::new()))
            .academic_client(Arc::new(MockAcademicClient::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_rejects_invalid_config_and_missing_clients() {
        let bad = ResearchLoop::builder(config().with_max_iterations(0))
            .llm_client(Arc::new(MockLlmClient::new()))
            .build();
        assert!(matches!(bad, Err(LoopError::Configuration(_))));

        let missing = ResearchLoop::builder(config())
            .llm_client(Arc::new(MockLlmClient::new()))
            .build();
        assert!(matches!(missing, Err(LoopError::MissingComponent("search_client"))));
    }

    #[tokio::test]
    async fn test_full_run_indexes_and_tracks_usage() {
        let research = build(MockLlmClient::new(), config().with_max_iterations(2));
        let outcome = research
            .run_full(ResearchState::new("CRDTs", Constraints::new()), None)
            .await
            .unwrap();

        let state = outcome.state;
        assert!(state.is_complete);
        assert_eq!(state.phase, Phase::Done);
        assert!(!state.sources.is_empty());
        assert!(!research.index().is_empty());
        assert!(state.token_usage.keys().any(|k| k.starts_with("planner:")));
        assert!(state.token_usage.keys().any(|k| k.starts_with("writer:")));
        assert!(state.final_report.unwrap().starts_with("# Research Report: CRDTs"));
        assert!(!state.logs.is_empty());
    }

    #[tokio::test]
    async fn test_each_source_scored_once_across_iterations() {
        // sempre uma lacuna para a primeira pergunta listada
        let mock = MockLlmClient::new().with_handler(ModelRole::Analyst, |req| {
            let id = req
                .user
                .split("- [")
                .nth(1)
                .and_then(|rest| rest.split(']').next())
                .unwrap_or("1")
                .to_string();
            Ok(format!(r#"[{{"related_question_id": {}, "description": "more"}}]"#, id))
        });
        let mock = Arc::new(mock);
        let research = ResearchLoop::builder(config().with_max_iterations(3))
            .llm_client(mock.clone())
            .search_client(Arc::new(MockSearchClient::new()))
            .academic_client(Arc::new(MockAcademicClient::new()))
            .build()
            .unwrap();

        let outcome = research
            .run_full(ResearchState::new("topic", Constraints::new()), None)
            .await
            .unwrap();

        // queries idênticas em todas as perguntas: só a primeira rodada traz URLs novas
        let urls: std::collections::HashSet<_> =
            outcome.state.sources.iter().map(|s| s.url.clone()).collect();
        assert_eq!(urls.len(), outcome.state.sources.len());
        assert_eq!(mock.call_count(ModelRole::Scorer), outcome.state.sources.len());
        assert_eq!(outcome.termination, Termination::CeilingReached);
    }

    #[tokio::test]
    async fn test_not_reentrant() {
        let mock = MockLlmClient::new().with_delay(Duration::from_millis(20));
        let research = Arc::new(build(mock, config().with_max_iterations(1)));

        let (first, _rx) = research.run_stream(ResearchState::new("a", Constraints::new()), None);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = research
            .run_full(ResearchState::new("b", Constraints::new()), None)
            .await;

        assert!(matches!(second, Err(LoopError::AlreadyRunning)));
        assert!(first.await.unwrap().is_ok());
        assert!(!research.is_running());
    }

    #[tokio::test]
    async fn test_events_ordered_and_terminal_report() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let research = ResearchLoop::builder(config().with_max_iterations(1))
            .llm_client(Arc::new(MockLlmClient::new()))
            .search_client(Arc::new(MockSearchClient::new()))
            .academic_client(Arc::new(MockAcademicClient::new()))
            .on_event(Arc::new(move |e: &ResearchEvent| {
                sink.lock().unwrap().push(e.name().to_string())
            }))
            .build()
            .unwrap();

        research
            .run_full(ResearchState::new("t", Constraints::new()), None)
            .await
            .unwrap();

        let names = seen.lock().unwrap().clone();
        assert_eq!(
            names,
            vec![
                "planning",
                "discovery",
                "knowledge_structuring",
                "gap_analysis",
                "decision",
                "synthesis",
                "report"
            ]
        );
    }

    #[tokio::test]
    async fn test_checkpoint_saved_after_every_transition() {
        let mut store = MockCheckpointStore::new();
        store.expect_name().return_const("mock");
        store.expect_save().times(6).returning(|_, _| Ok(()));

        let research = ResearchLoop::builder(config().with_max_iterations(1))
            .llm_client(Arc::new(MockLlmClient::new()))
            .search_client(Arc::new(MockSearchClient::new()))
            .academic_client(Arc::new(MockAcademicClient::new()))
            .checkpoints(Arc::new(store))
            .build()
            .unwrap();

        let outcome = research
            .run_full(ResearchState::new("t", Constraints::new()), None)
            .await
            .unwrap();
        assert!(outcome.state.is_complete);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_is_not_fatal() {
        let mut store = MockCheckpointStore::new();
        store.expect_name().return_const("mock");
        store.expect_save().returning(|_, _| {
            Err(CheckpointError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        });

        let research = ResearchLoop::builder(config().with_max_iterations(1))
            .llm_client(Arc::new(MockLlmClient::new()))
            .search_client(Arc::new(MockSearchClient::new()))
            .academic_client(Arc::new(MockAcademicClient::new()))
            .checkpoints(Arc::new(store))
            .build()
            .unwrap();

        let outcome = research
            .run_full(ResearchState::new("t", Constraints::new()), None)
            .await
            .unwrap();
        assert!(outcome.state.is_complete);
    }

    #[tokio::test]
    async fn test_resume_reopens_with_higher_ceiling() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        // uma lacuna por passagem mantém perguntas pendentes
        let mock = MockLlmClient::new().with_handler(ModelRole::Analyst, |_| {
            Ok(r#"[{"related_question_id": 1, "description": "more"}]"#.into())
        });
        let research = ResearchLoop::builder(config().with_max_iterations(1))
            .llm_client(Arc::new(mock))
            .search_client(Arc::new(MockSearchClient::new()))
            .academic_client(Arc::new(MockAcademicClient::new()))
            .checkpoints(store.clone())
            .build()
            .unwrap();

        let first = research
            .run_full(ResearchState::new("t", Constraints::new()), None)
            .await
            .unwrap();
        assert_eq!(first.termination, Termination::CeilingReached);
        let session = first.state.session_id.clone();

        let resumed = research.resume(&session, Some(2)).await.unwrap();
        assert!(resumed.state.is_complete);
        assert_eq!(resumed.state.iteration_count, 2);

        let again = research.resume(&session, Some(2)).await.unwrap();
        assert_eq!(again.termination, Termination::AlreadyComplete);

        assert!(matches!(
            research.resume("missing", None).await,
            Err(LoopError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_usage_outside_session_not_charged_to_it() {
        let research = build(MockLlmClient::new(), config().with_max_iterations(1));
        for _ in 0..5 {
            research.start_planning_only("CRDTs", &Constraints::new()).await;
        }
        research.refine_question("What is a CRDT?").await;
        let before = research.token_tracker().stats().total_tokens;
        assert!(before > 0);

        let state = research
            .run_full(ResearchState::new("CRDTs", Constraints::new()), None)
            .await
            .unwrap()
            .state;
        let after = research.token_tracker().stats().total_tokens;
        assert_eq!(state.total_tokens(), after - before);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_honored_once() {
        let research = build(MockLlmClient::new(), config().with_max_iterations(1));
        research.stop();

        let stopped = research
            .run_full(ResearchState::new("t", Constraints::new()), None)
            .await
            .unwrap();
        assert_eq!(stopped.termination, Termination::Stopped);
        assert!(!stopped.state.is_complete);
        assert_eq!(stopped.state.phase, Phase::Planning);
        assert!(stopped.state.questions.is_empty());

        // a parada foi consumida; a próxima execução vai até o fim
        let next = research.run_full(stopped.state, None).await.unwrap();
        assert!(next.state.is_complete);
    }

    #[tokio::test]
    async fn test_planning_only_and_report_now() {
        let research = build(MockLlmClient::new(), config());
        let questions = research.start_planning_only("CRDTs", &Constraints::new()).await;
        assert_eq!(questions.len(), 2);

        let state = ResearchState::with_questions("CRDTs", questions);
        let report = research.generate_report_now(&state).await;
        assert!(report.contains(PARTIAL_REPORT_NOTICE));
        assert!(state.questions.iter().all(|q| q.status == QuestionStatus::Pending));
    }
}
