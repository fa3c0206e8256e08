//! # Testes de Integração
//!
//! Validam o loop completo com clientes mock:
//! - Terminação: teto, convergência, passagens sem conteúdo
//! - Merge dos ramos independente de ordem
//! - Cenários ponta a ponta A, B e C
//! - RateLimiter e pontuação vazia

use gauntlet::agent::{
    should_continue, Decision, Phase, ResearchEvent, ResearchLoop, ResearchState, StateDelta,
    StopHandle, Termination,
};
use gauntlet::config::{ModelRole, ResearchConfig};
use gauntlet::llm::{LlmGateway, MockLlmClient};
use gauntlet::planner::QuestionPlanner;
use gauntlet::rate_limiter::RateLimiter;
use gauntlet::scoring::{average_score, QualityScorer};
use gauntlet::search::{normalize_url, MockAcademicClient, MockSearchClient, SearchHit};
use gauntlet::synthesis::NO_EVIDENCE_PLACEHOLDER;
use gauntlet::types::{
    Constraints, QuestionStatus, ResearchQuestion, Source, SourceType,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// HELPERS
// ============================================================================

fn fast_config(max_iterations: u32) -> ResearchConfig {
    ResearchConfig::default()
        .with_max_iterations(max_iterations)
        .with_rate_limit(Duration::from_millis(1))
}

fn empty_web() -> Arc<MockSearchClient> {
    Arc::new(MockSearchClient::with_handler(|_, _| Ok(vec![])))
}

fn empty_academic() -> Arc<MockAcademicClient> {
    Arc::new(MockAcademicClient::with_handler(|_, _| Ok(vec![])))
}

/// Analista que sempre aponta uma lacuna na primeira pergunta listada
fn gap_on_first_question() -> MockLlmClient {
    MockLlmClient::new().with_handler(ModelRole::Analyst, |req| {
        let id = req
            .user
            .split("- [")
            .nth(1)
            .and_then(|rest| rest.split(']').next())
            .unwrap_or("1")
            .to_string();
        Ok(format!(
            r#"[{{"related_question_id": {}, "description": "needs more depth"}}]"#,
            id
        ))
    })
}

type EventLog = Arc<Mutex<Vec<ResearchEvent>>>;

fn recorder() -> (EventLog, gauntlet::agent::EventCallback) {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    (log, Arc::new(move |e: &ResearchEvent| sink.lock().unwrap().push(e.clone())))
}

fn transitions(log: &EventLog, wanted: Phase) -> Vec<(u32, StateDelta)> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ResearchEvent::Transition {
                phase,
                iteration,
                delta,
            } if *phase == wanted => Some((*iteration, delta.clone())),
            _ => None,
        })
        .collect()
}

fn source(url: &str, source_type: SourceType, score: f32) -> Source {
    Source {
        url: url.to_string(),
        title: format!("title of {}", url),
        snippet: String::new(),
        score,
        source_type,
        question_id: 1,
    }
}

// ============================================================================
// DECISÃO
// ============================================================================

#[test]
fn test_ceiling_dominates_for_any_pending_set() {
    for ceiling in 1..=4u32 {
        for extra in 0..3u32 {
            let questions = (1..=3).map(|i| ResearchQuestion::new(i, "q", 1)).collect();
            let mut state = ResearchState::with_questions("t", questions);
            state.iteration_count = ceiling + extra;
            assert_eq!(should_continue(&state, ceiling), Decision::Finish);
        }
    }
}

#[test]
fn test_zero_pending_finishes_regardless_of_iteration() {
    for iteration in 0..5u32 {
        let mut q = ResearchQuestion::new(1, "q", 1);
        q.status = QuestionStatus::Analyzed;
        let mut state = ResearchState::with_questions("t", vec![q]);
        state.iteration_count = iteration;
        assert_eq!(should_continue(&state, 10), Decision::Finish);
    }
}

// ============================================================================
// PROGRESSO
// ============================================================================

#[tokio::test]
async fn test_no_content_passes_increment_exactly_once_each() {
    let mut config = fast_config(4);
    config.max_question_depth = 10;
    let (log, callback) = recorder();

    let research = ResearchLoop::builder(config)
        .llm_client(Arc::new(gap_on_first_question()))
        .search_client(empty_web())
        .academic_client(empty_academic())
        .on_event(callback)
        .build()
        .unwrap();

    let outcome = research
        .run_full(ResearchState::new("nothing to find", Constraints::new()), None)
        .await
        .unwrap();

    assert_eq!(outcome.state.iteration_count, 4);
    assert_eq!(outcome.termination, Termination::CeilingReached);
    assert!(outcome.state.is_complete);
    assert!(outcome.state.sources.is_empty());

    let gap_passes: Vec<u32> = transitions(&log, Phase::GapAnalysis)
        .into_iter()
        .map(|(iteration, delta)| {
            assert!(delta.advance_iteration);
            iteration
        })
        .collect();
    assert_eq!(gap_passes, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_converges_when_no_gaps_remain() {
    let research = ResearchLoop::builder(fast_config(5))
        .llm_client(Arc::new(MockLlmClient::new()))
        .search_client(empty_web())
        .academic_client(empty_academic())
        .build()
        .unwrap();

    let outcome = research
        .run_full(ResearchState::new("t", Constraints::new()), None)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Converged);
    assert_eq!(outcome.state.iteration_count, 2);
    assert!(outcome.state.pending_questions().next().is_none());
}

#[tokio::test]
async fn test_closing_pass_issues_no_model_or_search_calls() {
    let mock = Arc::new(MockLlmClient::new());
    let web = Arc::new(MockSearchClient::new());
    let counts: Arc<Mutex<Vec<(Phase, usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));

    let (sink, llm, search) = (counts.clone(), mock.clone(), web.clone());
    let research = ResearchLoop::builder(fast_config(5))
        .llm_client(mock.clone())
        .search_client(web.clone())
        .academic_client(empty_academic())
        .on_event(Arc::new(move |e: &ResearchEvent| {
            if let ResearchEvent::Transition { phase, iteration: 1, .. } = e {
                sink.lock()
                    .unwrap()
                    .push((*phase, llm.calls().len(), search.call_count()));
            }
        }))
        .build()
        .unwrap();

    let outcome = research
        .run_full(ResearchState::new("t", Constraints::new()), None)
        .await
        .unwrap();
    assert_eq!(outcome.termination, Termination::Converged);

    let counts = counts.lock().unwrap().clone();
    let phases: Vec<Phase> = counts.iter().map(|(p, _, _)| *p).collect();
    // Decision da passagem 0 já carrega iteração 1 e serve de linha de base
    assert_eq!(
        phases,
        vec![
            Phase::Decision,
            Phase::Planning,
            Phase::Discovery,
            Phase::KnowledgeStructuring,
            Phase::GapAnalysis
        ]
    );
    let (_, llm_calls, search_calls) = counts[0];
    assert!(counts.iter().all(|(_, l, s)| *l == llm_calls && *s == search_calls));
    assert_eq!(mock.call_count(ModelRole::Analyst), 1);
}

// ============================================================================
// MERGE
// ============================================================================

#[test]
fn test_branch_merge_order_independent() {
    let web = StateDelta {
        sources: vec![
            source("https://blog.example.com/a", SourceType::Web, 0.7),
            source("https://arxiv.org/abs/1", SourceType::Web, 0.4),
        ],
        ..Default::default()
    };
    let academic = StateDelta {
        sources: vec![
            source("https://arxiv.org/abs/1/", SourceType::Academic, 0.9),
            source("https://doi.org/x", SourceType::Academic, 0.8),
        ],
        ..Default::default()
    };

    let final_urls = |first: StateDelta, second: StateDelta| {
        let mut state = ResearchState::new("t", Constraints::new());
        state.apply(first.merge(second));
        state
            .sources
            .iter()
            .map(|s| (normalize_url(&s.url), s.source_type, s.score.to_bits()))
            .collect::<BTreeSet<_>>()
    };

    let ab = final_urls(web.clone(), academic.clone());
    let ba = final_urls(academic, web);
    assert_eq!(ab, ba);
    assert_eq!(ab.len(), 3);
}

// ============================================================================
// PLANEJAMENTO
// ============================================================================

#[tokio::test]
async fn test_expand_empty_gaps_is_noop() {
    let mock = Arc::new(MockLlmClient::new());
    let planner = QuestionPlanner::new(Arc::new(LlmGateway::new(mock.clone(), &ResearchConfig::default())));
    let existing = vec![ResearchQuestion::new(1, "a", 1), ResearchQuestion::new(2, "b", 2)];

    let outcome = planner.expand_gaps(&[], &existing).await;

    assert!(outcome.new_questions.is_empty());
    assert!(outcome.consumed.is_empty());
    assert!(existing.iter().all(|q| q.is_pending()));
    assert_eq!(mock.call_count(ModelRole::Planner), 0);
}

// ============================================================================
// RATE LIMITER E SCORE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rate_limiter_spacing_across_concurrent_callers() {
    let interval = Duration::from_millis(15);
    let limiter = Arc::new(RateLimiter::new(interval));
    let start = tokio::time::Instant::now();

    // 4 chamadores x 3 chamadas
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let mut slots = Vec::new();
                for _ in 0..3 {
                    slots.push(limiter.reserve().await);
                }
                slots
            })
        })
        .collect();

    let mut slots = Vec::new();
    for task in tasks {
        slots.extend(task.await.unwrap());
    }
    let elapsed = start.elapsed();
    slots.sort();

    for pair in slots.windows(2) {
        assert!(pair[1] - pair[0] >= interval);
    }
    assert!(elapsed >= interval * 11);
}

#[tokio::test]
async fn test_average_score_of_nothing_is_zero() {
    assert_eq!(average_score(&[]), 0.0);

    let gw = Arc::new(LlmGateway::new(Arc::new(MockLlmClient::new()), &ResearchConfig::default()));
    let report = QualityScorer::new(gw, 10).score("q", Vec::new()).await;
    assert!(report.scored.is_empty());
    assert_eq!(report.average_score, 0.0);
}

// ============================================================================
// CENÁRIOS PONTA A PONTA
// ============================================================================

/// A: teto 1, descoberta vazia nos dois ramos
#[tokio::test]
async fn test_scenario_a_single_iteration_without_evidence() {
    let research = ResearchLoop::builder(fast_config(1))
        .llm_client(Arc::new(MockLlmClient::new()))
        .search_client(empty_web())
        .academic_client(empty_academic())
        .build()
        .unwrap();

    let outcome = research
        .run_full(ResearchState::new("X", Constraints::new()), None)
        .await
        .unwrap();
    let state = outcome.state;

    assert_eq!(state.iteration_count, 1);
    assert!(state.is_complete);
    let report = state.final_report.unwrap();
    assert_eq!(report.matches(NO_EVIDENCE_PLACEHOLDER).count(), state.questions.len());
    for q in &state.questions {
        assert!(report.contains(&q.text));
    }
}

/// B: lacuna só para a pergunta 2 na iteração 0
#[tokio::test]
async fn test_scenario_b_gap_expands_only_its_question() {
    let mock = MockLlmClient::new();
    mock.push_response(
        ModelRole::Analyst,
        Ok(r#"[{"related_question_id": 2, "description": "no benchmarks cited"}]"#.into()),
    );
    let (log, callback) = recorder();

    let research = ResearchLoop::builder(fast_config(5))
        .llm_client(Arc::new(mock))
        .search_client(Arc::new(MockSearchClient::new()))
        .academic_client(Arc::new(MockAcademicClient::new()))
        .on_event(callback)
        .build()
        .unwrap();

    let questions = vec![
        ResearchQuestion::new(1, "What is X?", 1),
        ResearchQuestion::new(2, "How is X measured?", 2),
        ResearchQuestion::new(3, "Who uses X?", 3),
    ];
    let outcome = research
        .run_full(ResearchState::with_questions("X", questions), None)
        .await
        .unwrap();

    let plans = transitions(&log, Phase::Planning);
    let (_, iteration_one) = plans
        .iter()
        .find(|(iteration, _)| *iteration == 1)
        .expect("planning for iteration 1");
    assert_eq!(iteration_one.new_questions.len(), 1);
    let child = &iteration_one.new_questions[0];
    assert_eq!(child.parent_id, Some(2));
    assert_eq!(child.depth, 1);

    let state = outcome.state;
    for id in [1, 3] {
        assert_eq!(state.question(id).unwrap().status, QuestionStatus::Analyzed);
        assert!(state.questions.iter().all(|q| q.parent_id != Some(id)));
    }
    assert_eq!(state.questions.len(), 4);
}

/// Fonte aprovada chega à seção da pergunta mesmo sem palavras em comum
#[tokio::test]
async fn test_indexed_sources_reach_their_section() {
    let web = MockSearchClient::with_handler(|_, _| {
        Ok(vec![SearchHit {
            url: "https://lamport.example/clocks".into(),
            title: "Lamport clocks".into(),
            snippet: "Logical timestamps order distributed events".into(),
        }])
    });
    let config = fast_config(1);
    let threshold = config.quality_threshold;
    let research = ResearchLoop::builder(config)
        .llm_client(Arc::new(MockLlmClient::new()))
        .search_client(Arc::new(web))
        .academic_client(empty_academic())
        .build()
        .unwrap();

    let questions = vec![ResearchQuestion::new(1, "Why do replicas agree?", 1)];
    let outcome = research
        .run_full(ResearchState::with_questions("consensus", questions), None)
        .await
        .unwrap();
    let state = outcome.state;

    assert_eq!(state.sources.len(), 1);
    assert!(state.sources[0].score >= threshold);
    assert_eq!(research.index().len(), 1);

    let report = state.final_report.unwrap();
    assert!(!report.contains(NO_EVIDENCE_PLACEHOLDER));
    assert!(report.contains("Findings for this question are summarized here."));
    assert!(report.contains("[1]: [Lamport clocks]("));
    assert!(report.contains("lamport.example/clocks"));
}

/// C: Stop() durante a descoberta web da iteração 2
#[tokio::test]
async fn test_scenario_c_stop_during_discovery() {
    let stop = StopHandle::new();
    let current_iteration = Arc::new(AtomicU32::new(0));

    let (log, recorder_cb) = recorder();
    let tracker = current_iteration.clone();
    let callback: gauntlet::agent::EventCallback = Arc::new(move |e: &ResearchEvent| {
        if let ResearchEvent::Transition {
            phase: Phase::Planning,
            iteration,
            ..
        } = e
        {
            tracker.store(*iteration, Ordering::SeqCst);
        }
        recorder_cb(e);
    });

    let web_stop = stop.clone();
    let web_iteration = current_iteration.clone();
    let web = MockSearchClient::with_handler(move |query, _| {
        if web_iteration.load(Ordering::SeqCst) == 2 {
            web_stop.request();
        }
        Ok(MockSearchClient::default_hits(query, 2))
    });

    let mut config = fast_config(5);
    config.max_question_depth = 10;
    let research = ResearchLoop::builder(config)
        .llm_client(Arc::new(gap_on_first_question()))
        .search_client(Arc::new(web))
        .academic_client(Arc::new(MockAcademicClient::new()))
        .stop_handle(stop)
        .on_event(callback)
        .build()
        .unwrap();

    let outcome = research
        .run_full(ResearchState::new("X", Constraints::new()), None)
        .await
        .unwrap();

    assert_eq!(outcome.termination, Termination::Stopped);
    assert!(outcome.is_partial());
    assert_eq!(outcome.state.iteration_count, 2);
    assert!(!outcome.state.is_complete);
    assert_eq!(outcome.state.phase, Phase::KnowledgeStructuring);

    assert!(transitions(&log, Phase::KnowledgeStructuring)
        .iter()
        .all(|(iteration, _)| *iteration < 2));
    assert!(matches!(
        log.lock().unwrap().last(),
        Some(ResearchEvent::Stopped { iteration: 2 })
    ));

    let partial = research.generate_report_now(&outcome.state).await;
    assert!(partial.contains("Partial report"));
}

#[tokio::test]
async fn test_stream_emits_terminal_report_last() {
    let research = Arc::new(
        ResearchLoop::builder(fast_config(1))
            .llm_client(Arc::new(MockLlmClient::new()))
            .search_client(Arc::new(MockSearchClient::new()))
            .academic_client(Arc::new(MockAcademicClient::new()))
            .build()
            .unwrap(),
    );

    let (handle, mut events) = research.run_stream(ResearchState::new("X", Constraints::new()), None);
    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }
    let outcome = handle.await.unwrap().unwrap();

    assert!(matches!(received.last(), Some(ResearchEvent::Report { .. })));
    assert_eq!(received.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(outcome.state.is_complete);
    let streamed_usage: u64 = received
        .iter()
        .filter_map(|e| match e {
            ResearchEvent::Transition { delta, .. } => {
                Some(delta.token_usage.values().map(|u| u.total).sum::<u64>())
            }
            _ => None,
        })
        .sum();
    assert_eq!(streamed_usage, outcome.state.total_tokens());
}
