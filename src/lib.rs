//! # Gauntlet - Motor de Pesquisa Iterativa
//!
//! Dado um tópico, o Gauntlet decompõe o assunto em perguntas, busca fontes
//! web e acadêmicas, pontua a qualidade de cada uma, estrutura o
//! conhecimento, detecta lacunas e itera até que as lacunas fechem ou o teto
//! de iterações seja atingido. No fim, sintetiza um relatório com citações.
//!
//! ## O Loop
//!
//! ```text
//! Planning → {WebDiscovery ∥ AcademicDiscovery} → KnowledgeStructuring
//!          → GapAnalysis → Decision{continue → Planning, finish → Synthesis}
//! ```
//!
//! - Cada fase devolve um delta; o driver aplica, grava checkpoint e emite evento
//! - `iteration_count` sobe exatamente 1 por passagem, mesmo sem conteúdo novo
//! - O teto de iterações sempre vence
//! - Parada cooperativa só entre transições, nunca no meio de uma chamada
//!
//! ## Componentes
//!
//! | Módulo | Papel |
//! |--------|-------|
//! | [`planner`] | Decomposição, follow-ups por lacuna, refinamento |
//! | [`discovery`] | Queries + rodadas de busca web/acadêmica |
//! | [`rate_limiter`] | Espaçamento compartilhado entre buscas |
//! | [`scoring`] | Score de qualidade por fonte |
//! | [`knowledge`] | Índice vetorial + extração de entidades |
//! | [`gaps`] | Detecção de lacunas |
//! | [`synthesis`] | Relatório Markdown com citações |
//! | [`agent`] | Estado, driver, eventos, checkpoints |
//!
//! ## Exemplo de Uso
//!
//! ```rust,ignore
//! use gauntlet::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LoopError> {
//!     let research = ResearchLoop::builder(ResearchConfig::default())
//!         .llm_client(Arc::new(MockLlmClient::new()))
//!         .search_client(Arc::new(MockSearchClient::new()))
//!         .academic_client(Arc::new(MockAcademicClient::new()))
//!         .build()?;
//!
//!     let outcome = research
//!         .run_full(ResearchState::new("CRDTs", Constraints::new()), None)
//!         .await?;
//!     println!("{}", outcome.state.final_report.unwrap_or_default());
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

/// Tipos fundamentais compartilhados pelo loop.
///
/// - [`ResearchQuestion`]: pergunta com status, profundidade e linhagem
/// - [`Source`]: fonte pontuada
/// - [`Gap`]: lacuna ligada a uma pergunta
/// - [`Fragment`] / [`Triplet`]: conhecimento estruturado
pub mod types;

/// Estado da pesquisa, máquina de estados e superfície de controle.
///
/// - `ResearchLoop`: driver + `run_full`, `run_stream`, `resume`, `stop`
/// - `ResearchState` / `StateDelta`: acumulador e contribuições por fase
/// - `CheckpointStore`: snapshot por sessão
pub mod agent;

/// Configuração do loop, credenciais e runtime.
///
/// **Loop:** `GAUNTLET_MAX_ITERATIONS`, `GAUNTLET_MAX_DEPTH`,
/// `GAUNTLET_DISCOVERY_DEPTH`, `GAUNTLET_QUALITY_THRESHOLD`,
/// `GAUNTLET_RATE_LIMIT_MS`, `GAUNTLET_CHECKPOINT_DIR`
///
/// **LLM:** `LLM_MODEL`, `LLM_MODEL_<PAPEL>`, `LLM_TIMEOUT_SECS`,
/// `LLM_API_BASE_URL`, `OPENROUTER_API_KEY`
///
/// **Runtime Tokio:** `TOKIO_THREADS`, `TOKIO_MAX_THREADS`
pub mod config;

/// Descoberta de fontes web e acadêmicas.
pub mod discovery;

/// Análise de lacunas.
pub mod gaps;

/// Índice de conhecimento e extração de entidades.
pub mod knowledge;

/// Clientes de LLM e gateway por papel.
///
/// Define a trait `LlmClient` e implementações para:
/// - APIs compatíveis com OpenAI (OpenRouter por padrão)
/// - Mock para testes
pub mod llm;

/// Planejamento de perguntas.
pub mod planner;

/// Limitador de taxa compartilhado.
pub mod rate_limiter;

/// Pontuação de qualidade.
pub mod scoring;

/// Clientes de busca web e acadêmica.
///
/// - Jina Search (web)
/// - Semantic Scholar (acadêmica)
/// - Mocks para testes
pub mod search;

/// Síntese do relatório final.
pub mod synthesis;

/// Utilitários diversos.
///
/// - Extração de JSON em camadas
/// - Tracking de uso de tokens
/// - Texto e timing
pub mod utils;

// Re-exports principais
pub use agent::{LoopError, ResearchEvent, ResearchLoop, ResearchState, RunOutcome, Termination};
pub use config::{
    create_tokio_runtime, install_panic_hook, load_runtime_config, ConfigError, Credentials,
    ModelRole, ResearchConfig, RuntimeConfig,
};
pub use types::*;

/// Versão da biblioteca.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude com imports comuns para uso rápido.
///
/// ```rust,ignore
/// use gauntlet::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{
        CheckpointStore, InMemoryCheckpointStore, LocalCheckpointStore, LoopError, Phase,
        ResearchEvent, ResearchLoop, ResearchState, RunOutcome, StateDelta, StopHandle,
        Termination,
    };
    pub use crate::config::{ModelRole, ResearchConfig};
    pub use crate::knowledge::{InMemoryKnowledgeIndex, KnowledgeIndex};
    pub use crate::llm::{LlmClient, MockLlmClient};
    pub use crate::search::{AcademicClient, MockAcademicClient, MockSearchClient, SearchClient};
    pub use crate::types::*;
    pub use std::sync::Arc;
}
