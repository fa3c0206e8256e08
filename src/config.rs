// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CONFIGURAÇÃO DO LOOP DE PESQUISA E DO RUNTIME
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Configuração explícita passada na construção do loop (sem estado global).
// Valores podem vir de .env, variáveis de ambiente ou settings.json.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Máximo de retries automáticos para falhas transitórias
pub const MAX_RETRIES_CEILING: u32 = 2;

/// Modelo padrão (OpenRouter)
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

/// Valor placeholder gerado pelo setup inicial do .env
const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

/// Erros de configuração - fatais na inicialização
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Papel de uma chamada ao modelo.
///
/// Cada papel pode usar um modelo e temperatura diferentes; o loop não
/// conhece os detalhes, apenas o papel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelRole {
    /// Decomposição de tópico e expansão de lacunas
    Planner,
    /// Geração de queries de busca
    QueryWriter,
    /// Pontuação de qualidade de fontes
    Scorer,
    /// Análise de lacunas
    Analyst,
    /// Extração de entidades
    Extractor,
    /// Escrita de seções do relatório
    Writer,
}

impl ModelRole {
    /// Todos os papéis
    pub const ALL: [ModelRole; 6] = [
        ModelRole::Planner,
        ModelRole::QueryWriter,
        ModelRole::Scorer,
        ModelRole::Analyst,
        ModelRole::Extractor,
        ModelRole::Writer,
    ];

    /// Nome estável usado em chaves de uso e logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::QueryWriter => "query_writer",
            Self::Scorer => "scorer",
            Self::Analyst => "analyst",
            Self::Extractor => "extractor",
            Self::Writer => "writer",
        }
    }

    /// Temperatura padrão do papel
    pub fn default_temperature(&self) -> f32 {
        match self {
            Self::Planner | Self::Writer => 0.7,
            Self::QueryWriter => 0.5,
            Self::Analyst => 0.2,
            Self::Scorer | Self::Extractor => 0.0,
        }
    }

    /// Converte nome (case-insensitive) em papel
    pub fn from_name(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|r| r.as_str() == value)
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modelo e temperatura usados por um papel
#[derive(Debug, Clone, PartialEq)]
pub struct RoleModel {
    /// ID do modelo (ex: "openai/gpt-4o")
    pub model: String,
    /// Temperatura de amostragem
    pub temperature: f32,
}

/// Configuração completa do loop de pesquisa.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Teto rígido de iterações (sempre vence)
    pub max_iterations: u32,
    /// Perguntas com `depth >= max_question_depth` saem das rodadas de descoberta
    pub max_question_depth: u32,
    /// Profundidade da descoberta recursiva (1..=3)
    pub discovery_depth: u8,
    /// Tamanho de cada rodada de descoberta (rodada 1, 2, 3)
    pub round_sizes: [usize; 3],
    /// Score mínimo para uma fonte entrar no índice
    pub quality_threshold: f32,
    /// Máximo de candidatos pontuados por chamada
    pub max_candidates_per_score: usize,
    /// Máximo de queries geradas por pergunta
    pub max_queries_per_question: usize,
    /// Número de fragmentos recuperados por consulta ao índice
    pub fragments_per_query: usize,
    /// Espaçamento mínimo entre chamadas de descoberta
    pub rate_limit_interval: Duration,
    /// Timeout por chamada ao modelo
    pub llm_timeout: Duration,
    /// Timeout por chamada de busca
    pub search_timeout: Duration,
    /// Retries automáticos para falhas transitórias (<= 2)
    pub max_retries: u32,
    /// Modelo padrão para papéis sem entrada específica
    pub default_model: String,
    /// Modelos por papel
    pub role_models: HashMap<ModelRole, RoleModel>,
    /// Diretório dos checkpoints de sessão
    pub checkpoint_dir: PathBuf,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_question_depth: 3,
            discovery_depth: 1,
            round_sizes: [5, 2, 1],
            quality_threshold: 0.5,
            max_candidates_per_score: 10,
            max_queries_per_question: 3,
            fragments_per_query: 8,
            rate_limit_interval: Duration::from_millis(500),
            llm_timeout: Duration::from_secs(360),
            search_timeout: Duration::from_secs(30),
            max_retries: MAX_RETRIES_CEILING,
            default_model: DEFAULT_MODEL.to_string(),
            role_models: HashMap::new(),
            checkpoint_dir: PathBuf::from("checkpoints"),
        }
    }
}

/// Formato do settings.json
///
/// Todos os campos são opcionais; ausentes mantêm o valor atual.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    /// Timeout das chamadas ao modelo (segundos)
    pub api_timeout: Option<u64>,
    /// Modelo padrão
    pub model_id: Option<String>,
    pub max_iterations: Option<u32>,
    pub max_question_depth: Option<u32>,
    pub discovery_depth: Option<u8>,
    pub quality_threshold: Option<f32>,
    pub rate_limit_ms: Option<u64>,
    pub checkpoint_dir: Option<PathBuf>,
    /// Modelos por papel: `{"writer": "openai/gpt-4o"}`
    #[serde(default)]
    pub role_models: HashMap<String, String>,
}

impl ResearchConfig {
    /// Cria configuração padrão.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define o teto de iterações
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Define o espaçamento do rate limiter
    pub fn with_rate_limit(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = interval;
        self
    }

    /// Define o modelo de um papel (mantém a temperatura padrão do papel)
    pub fn with_role_model(mut self, role: ModelRole, model: &str) -> Self {
        self.role_models.insert(
            role,
            RoleModel {
                model: model.to_string(),
                temperature: role.default_temperature(),
            },
        );
        self
    }

    /// Resolve modelo e temperatura de um papel
    pub fn model_for(&self, role: ModelRole) -> RoleModel {
        self.role_models.get(&role).cloned().unwrap_or_else(|| RoleModel {
            model: self.default_model.clone(),
            temperature: role.default_temperature(),
        })
    }

    /// Carrega configuração a partir das variáveis de ambiente.
    ///
    /// Variáveis suportadas:
    /// - `GAUNTLET_MAX_ITERATIONS`: teto de iterações (padrão: 5)
    /// - `GAUNTLET_MAX_DEPTH`: profundidade máxima de perguntas (padrão: 3)
    /// - `GAUNTLET_DISCOVERY_DEPTH`: 1..=3 (padrão: 1)
    /// - `GAUNTLET_QUALITY_THRESHOLD`: 0.0..=1.0 (padrão: 0.5)
    /// - `GAUNTLET_RATE_LIMIT_MS`: espaçamento entre buscas (padrão: 500)
    /// - `GAUNTLET_MAX_RETRIES`: retries transitórios (padrão: 2)
    /// - `GAUNTLET_CHECKPOINT_DIR`: diretório de checkpoints
    /// - `LLM_MODEL`: modelo padrão
    /// - `LLM_MODEL_<ROLE>`: modelo por papel (ex: `LLM_MODEL_WRITER`)
    /// - `LLM_TIMEOUT_SECS`: timeout do modelo
    /// - `SEARCH_TIMEOUT_SECS`: timeout de busca
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Aplica as variáveis de ambiente sobre os valores atuais
    pub fn with_env_overrides(self) -> Self {
        let mut config = self;

        if let Some(v) = env_parse::<u32>("GAUNTLET_MAX_ITERATIONS") {
            config.max_iterations = v;
            log::info!("📦 GAUNTLET_MAX_ITERATIONS={}", v);
        }
        if let Some(v) = env_parse::<u32>("GAUNTLET_MAX_DEPTH") {
            config.max_question_depth = v;
            log::info!("📦 GAUNTLET_MAX_DEPTH={}", v);
        }
        if let Some(v) = env_parse::<u8>("GAUNTLET_DISCOVERY_DEPTH") {
            config.discovery_depth = v;
            log::info!("📦 GAUNTLET_DISCOVERY_DEPTH={}", v);
        }
        if let Some(v) = env_parse::<f32>("GAUNTLET_QUALITY_THRESHOLD") {
            config.quality_threshold = v;
            log::info!("📦 GAUNTLET_QUALITY_THRESHOLD={}", v);
        }
        if let Some(v) = env_parse::<u64>("GAUNTLET_RATE_LIMIT_MS") {
            config.rate_limit_interval = Duration::from_millis(v);
            log::info!("📦 GAUNTLET_RATE_LIMIT_MS={}", v);
        }
        if let Some(v) = env_parse::<u32>("GAUNTLET_MAX_RETRIES") {
            config.max_retries = v.min(MAX_RETRIES_CEILING);
            log::info!("📦 GAUNTLET_MAX_RETRIES={}", config.max_retries);
        }
        if let Ok(dir) = std::env::var("GAUNTLET_CHECKPOINT_DIR") {
            log::info!("📦 GAUNTLET_CHECKPOINT_DIR={}", dir);
            config.checkpoint_dir = PathBuf::from(dir);
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            if !model.trim().is_empty() {
                log::info!("📦 LLM_MODEL={}", model);
                config.default_model = model;
            }
        }
        for role in ModelRole::ALL {
            let key = format!("LLM_MODEL_{}", role.as_str().to_uppercase());
            if let Ok(model) = std::env::var(&key) {
                log::info!("📦 {}={}", key, model);
                config = config.with_role_model(role, &model);
            }
        }
        if let Some(v) = env_parse::<u64>("LLM_TIMEOUT_SECS") {
            config.llm_timeout = Duration::from_secs(v);
            log::info!("📦 LLM_TIMEOUT_SECS={}", v);
        }
        if let Some(v) = env_parse::<u64>("SEARCH_TIMEOUT_SECS") {
            config.search_timeout = Duration::from_secs(v);
            log::info!("📦 SEARCH_TIMEOUT_SECS={}", v);
        }

        config
    }

    /// Sobrepõe os valores de um settings.json à configuração atual
    pub fn apply_settings(&mut self, settings: SettingsFile) -> Result<(), ConfigError> {
        if let Some(secs) = settings.api_timeout {
            self.llm_timeout = Duration::from_secs(secs);
        }
        if let Some(model) = settings.model_id {
            self.default_model = model;
        }
        if let Some(v) = settings.max_iterations {
            self.max_iterations = v;
        }
        if let Some(v) = settings.max_question_depth {
            self.max_question_depth = v;
        }
        if let Some(v) = settings.discovery_depth {
            self.discovery_depth = v;
        }
        if let Some(v) = settings.quality_threshold {
            self.quality_threshold = v;
        }
        if let Some(ms) = settings.rate_limit_ms {
            self.rate_limit_interval = Duration::from_millis(ms);
        }
        if let Some(dir) = settings.checkpoint_dir {
            self.checkpoint_dir = dir;
        }
        for (name, model) in settings.role_models {
            let role = ModelRole::from_name(&name)
                .ok_or_else(|| ConfigError::invalid("role_models", format!("unknown role '{}'", name)))?;
            *self = std::mem::take(self).with_role_model(role, &model);
        }
        Ok(())
    }

    /// Carrega settings.json sobre os valores padrão (arquivo ausente = padrões)
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if !path.exists() {
            log::debug!("settings file {:?} não encontrado, usando padrões", path);
            return Ok(config);
        }
        let content = std::fs::read_to_string(path)?;
        let settings: SettingsFile = serde_json::from_str(&content)?;
        config.apply_settings(settings)?;
        log::info!("⚙️ Configuração carregada de {:?}", path);
        Ok(config)
    }

    /// Valida a configuração antes de iniciar o loop
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("max_iterations", "must be at least 1"));
        }
        if !(1..=3).contains(&self.discovery_depth) {
            return Err(ConfigError::invalid("discovery_depth", "must be between 1 and 3"));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::invalid("quality_threshold", "must be within [0, 1]"));
        }
        if self.max_retries > MAX_RETRIES_CEILING {
            return Err(ConfigError::invalid(
                "max_retries",
                format!("must be at most {}", MAX_RETRIES_CEILING),
            ));
        }
        if self.round_sizes.iter().any(|&n| n == 0) {
            return Err(ConfigError::invalid("round_sizes", "rounds must return at least 1 result"));
        }
        if self.round_sizes.len() < self.discovery_depth as usize {
            return Err(ConfigError::invalid(
                "round_sizes",
                format!("needs {} rounds for discovery_depth", self.discovery_depth),
            ));
        }
        if self.round_sizes.windows(2).any(|w| w[1] >= w[0]) {
            return Err(ConfigError::invalid("round_sizes", "each round must return fewer results"));
        }
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::invalid("default_model", "must not be empty"));
        }
        Ok(())
    }
}

/// Credenciais dos provedores externos
#[derive(Clone)]
pub struct Credentials {
    /// Chave OpenRouter (obrigatória)
    pub llm_api_key: String,
    /// URL base da API compatível com OpenAI
    pub llm_api_base: Option<String>,
    /// Chave Jina (opcional - busca funciona sem chave com limites menores)
    pub search_api_key: Option<String>,
    /// Chave Semantic Scholar (opcional)
    pub academic_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &"***")
            .field("llm_api_base", &self.llm_api_base)
            .field("search_api_key", &self.search_api_key.as_ref().map(|_| "***"))
            .field("academic_api_key", &self.academic_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    /// Lê credenciais do ambiente.
    ///
    /// `OPENROUTER_API_KEY` ausente (ou com o placeholder) é erro fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm_api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .map(|k| k.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|k| !k.is_empty() && k != API_KEY_PLACEHOLDER)
            .ok_or_else(|| {
                ConfigError::MissingCredential("OPENROUTER_API_KEY is not configured".into())
            })?;

        Ok(Self {
            llm_api_key,
            llm_api_base: non_empty_env("LLM_API_BASE_URL"),
            search_api_key: non_empty_env("JINA_API_KEY"),
            academic_api_key: non_empty_env("SEMANTIC_SCHOLAR_API_KEY"),
        })
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("⚠️ Valor inválido para {}: '{}' (ignorado)", key, raw);
            None
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RUNTIME TOKIO
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuração do runtime Tokio.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Número fixo de worker threads (None = dinâmico)
    pub worker_threads: Option<usize>,
    /// Limite superior para o cálculo dinâmico
    pub max_threads: usize,
    /// Nome das threads
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            max_threads: 8,
            thread_name: "gauntlet".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Calcula número efetivo de worker threads: fixo ou min(cores, max)
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| std::cmp::min(num_cpus::get(), self.max_threads))
            .max(1)
    }
}

/// Carrega configuração do runtime (`TOKIO_THREADS`, `TOKIO_MAX_THREADS`).
pub fn load_runtime_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();

    if let Some(threads) = env_parse::<usize>("TOKIO_THREADS").filter(|t| *t > 0) {
        config.worker_threads = Some(threads);
        log::info!("📦 TOKIO_THREADS={} (fixo)", threads);
    }
    if let Some(max) = env_parse::<usize>("TOKIO_MAX_THREADS").filter(|m| *m > 0) {
        config.max_threads = max;
        log::info!("📦 TOKIO_MAX_THREADS={}", max);
    }

    config
}

/// Instala panic hook que loga via `log::error!` em vez de stderr.
///
/// Panics dentro de tasks de descoberta viram `JoinError` e não derrubam o loop.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        log::error!(
            "[PANIC] Thread {} at {}: {}",
            thread.name().unwrap_or("unnamed"),
            location,
            message
        );
    }));
}

/// Cria o runtime Tokio com a configuração informada.
pub fn create_tokio_runtime(config: &RuntimeConfig) -> std::io::Result<tokio::runtime::Runtime> {
    let worker_threads = config.effective_worker_threads();
    log::info!("🚀 Criando runtime Tokio: {} workers", worker_threads);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .thread_name(&config.thread_name)
        .enable_all()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ResearchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.round_sizes, [5, 2, 1]);
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let config = ResearchConfig::default().with_max_iterations(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "max_iterations"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_depth_and_threshold() {
        let mut config = ResearchConfig::default();
        config.discovery_depth = 4;
        assert!(config.validate().is_err());

        let mut config = ResearchConfig::default();
        config.quality_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_decreasing_rounds() {
        let mut config = ResearchConfig::default();
        config.round_sizes = [1, 5, 9];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "round_sizes"
        ));

        config.round_sizes = [5, 5, 1];
        assert!(config.validate().is_err());

        config.round_sizes = [8, 3, 1];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file_over_defaults() {
        let dir = std::env::temp_dir().join(format!("gauntlet-settings-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        std::fs::write(&path, r#"{"max_iterations": 7, "model_id": "deepseek/deepseek-chat"}"#).unwrap();

        let config = ResearchConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.default_model, "deepseek/deepseek-chat");

        let missing = ResearchConfig::from_json_file(&dir.join("absent.json")).unwrap();
        assert_eq!(missing.max_iterations, ResearchConfig::default().max_iterations);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_model_for_role_falls_back_to_default() {
        let config = ResearchConfig::default().with_role_model(ModelRole::Writer, "openai/gpt-4o");
        assert_eq!(config.model_for(ModelRole::Writer).model, "openai/gpt-4o");
        assert_eq!(config.model_for(ModelRole::Scorer).model, DEFAULT_MODEL);
        assert_eq!(config.model_for(ModelRole::Scorer).temperature, 0.0);
    }

    #[test]
    fn test_apply_settings_overlay() {
        let settings: SettingsFile = serde_json::from_str(
            r#"{"api_timeout": 60, "model_id": "deepseek/deepseek-chat",
                "max_iterations": 2, "role_models": {"analyst": "openai/gpt-4o"}}"#,
        )
        .unwrap();
        let mut config = ResearchConfig::default();
        config.apply_settings(settings).unwrap();

        assert_eq!(config.llm_timeout, Duration::from_secs(60));
        assert_eq!(config.default_model, "deepseek/deepseek-chat");
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.model_for(ModelRole::Analyst).model, "openai/gpt-4o");
    }

    #[test]
    fn test_apply_settings_unknown_role() {
        let settings: SettingsFile =
            serde_json::from_str(r#"{"role_models": {"poet": "x"}}"#).unwrap();
        let mut config = ResearchConfig::default();
        assert!(config.apply_settings(settings).is_err());
    }

    #[test]
    fn test_role_from_name() {
        assert_eq!(ModelRole::from_name("Writer"), Some(ModelRole::Writer));
        assert_eq!(ModelRole::from_name("query_writer"), Some(ModelRole::QueryWriter));
        assert_eq!(ModelRole::from_name("unknown"), None);
    }

    #[test]
    fn test_effective_worker_threads_fixed() {
        let config = RuntimeConfig {
            worker_threads: Some(4),
            ..Default::default()
        };
        assert_eq!(config.effective_worker_threads(), 4);
    }
}
