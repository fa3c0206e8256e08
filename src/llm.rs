// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CLIENTE LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// `LlmClient` é o único ponto de contato com o provedor: recebe um pedido
// de completion e devolve texto + uso. O `LlmGateway` fica na frente dele e
// resolve modelo por papel, aplica timeout, retries para falhas transitórias
// e contabiliza tokens por `role:model`.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{ModelRole, ResearchConfig, RoleModel};
use crate::utils::{estimate_tokens, TokenTracker};

/// URL base padrão (OpenRouter, compatível com OpenAI)
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Erros do cliente LLM
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl LlmError {
    /// Falhas que valem retry automático
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Pedido de completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Papel que originou a chamada
    pub role: ModelRole,
    /// Modelo resolvido para o papel
    pub model: String,
    /// Prompt de sistema
    pub system: String,
    /// Prompt do usuário
    pub user: String,
    /// Temperatura
    pub temperature: f32,
}

/// Resposta do modelo
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Trait principal para clientes LLM
///
/// Permite trocar o provedor (OpenRouter, OpenAI, mock) sem tocar no loop.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Executa uma completion
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GATEWAY (papel → modelo, timeout, retries, uso)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fachada usada por todos os componentes do loop
pub struct LlmGateway {
    client: Arc<dyn LlmClient>,
    models: HashMap<ModelRole, RoleModel>,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    tracker: Arc<TokenTracker>,
}

impl LlmGateway {
    /// Cria gateway com os modelos, timeout e retries da configuração
    pub fn new(client: Arc<dyn LlmClient>, config: &ResearchConfig) -> Self {
        let models = ModelRole::ALL
            .into_iter()
            .map(|role| (role, config.model_for(role)))
            .collect();

        Self {
            client,
            models,
            timeout: config.llm_timeout,
            max_retries: config.max_retries.min(crate::config::MAX_RETRIES_CEILING),
            retry_backoff: Duration::from_millis(250),
            tracker: Arc::new(TokenTracker::new()),
        }
    }

    /// Define o backoff base entre retries (dobra a cada tentativa)
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Tracker de uso de tokens
    pub fn tracker(&self) -> &Arc<TokenTracker> {
        &self.tracker
    }

    /// Modelo resolvido para o papel
    pub fn model_for(&self, role: ModelRole) -> RoleModel {
        self.models.get(&role).cloned().unwrap_or_else(|| RoleModel {
            model: crate::config::DEFAULT_MODEL.to_string(),
            temperature: role.default_temperature(),
        })
    }

    /// `Complete(role, system, user) -> text | ModelError`
    ///
    /// Falhas transitórias são repetidas até `max_retries` vezes; o erro da
    /// última tentativa é devolvido.
    pub async fn complete(&self, role: ModelRole, system: &str, user: &str) -> Result<String, LlmError> {
        let RoleModel { model, temperature } = self.model_for(role);
        let request = CompletionRequest {
            role,
            model,
            system: system.to_string(),
            user: user.to_string(),
            temperature,
        };

        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, self.client.complete(&request)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.timeout)),
            };

            match result {
                Ok(completion) => {
                    self.tracker.record(
                        role.as_str(),
                        &request.model,
                        completion.input_tokens,
                        completion.output_tokens,
                    );
                    return Ok(completion.text);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let wait = self.retry_backoff * 2u32.pow(attempt - 1);
                    log::warn!(
                        "⚠️ [{}] falha transitória ({}), retry {}/{} em {:?}",
                        role,
                        e,
                        attempt,
                        self.max_retries,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    log::warn!("❌ [{}] chamada ao modelo falhou: {}", role, e);
                    return Err(e);
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IMPLEMENTAÇÃO MOCK PARA TESTES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Handler = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// Cliente mock com respostas por papel.
///
/// Ordem de resolução: fila de respostas únicas do papel → handler do papel
/// → resposta padrão do papel.
pub struct MockLlmClient {
    queued: Mutex<HashMap<ModelRole, VecDeque<Result<String, LlmError>>>>,
    handlers: HashMap<ModelRole, Handler>,
    defaults: HashMap<ModelRole, String>,
    calls: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    /// Mock com respostas padrão válidas para cada papel
    pub fn new() -> Self {
        let defaults = [
            (
                ModelRole::Planner,
                r#"```json
[{"id": 1, "question": "What is the background of the topic?", "priority": 1},
 {"id": 2, "question": "What are the open problems?", "priority": 2}]
```"#,
            ),
            (ModelRole::QueryWriter, r#"["primary query", "secondary query"]"#),
            (ModelRole::Scorer, r#"{"score": 0.8, "justification": "relevant and credible"}"#),
            (ModelRole::Analyst, "[]"),
            (
                ModelRole::Extractor,
                r#"[{"subject": "topic", "predicate": "relates_to", "object": "evidence"}]"#,
            ),
            (ModelRole::Writer, "Findings for this question are summarized here."),
        ]
        .into_iter()
        .map(|(role, text)| (role, text.to_string()))
        .collect();

        Self {
            queued: Mutex::new(HashMap::new()),
            handlers: HashMap::new(),
            defaults,
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Substitui a resposta padrão do papel
    pub fn with_response(mut self, role: ModelRole, text: &str) -> Self {
        self.defaults.insert(role, text.to_string());
        self
    }

    /// Define um handler dinâmico para o papel
    pub fn with_handler<F>(mut self, role: ModelRole, handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.handlers.insert(role, Box::new(handler));
        self
    }

    /// Atraso artificial em toda chamada
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Enfileira uma resposta única para o papel
    pub fn push_response(&self, role: ModelRole, response: Result<String, LlmError>) {
        self.queued
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(role)
            .or_default()
            .push_back(response);
    }

    /// Pedidos recebidos até agora
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Número de chamadas de um papel
    pub fn call_count(&self, role: ModelRole) -> usize {
        self.calls().iter().filter(|c| c.role == role).count()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self
            .queued
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get_mut(&request.role)
            .and_then(VecDeque::pop_front);

        let text = match queued {
            Some(response) => response?,
            None => match self.handlers.get(&request.role) {
                Some(handler) => handler(request)?,
                None => self.defaults.get(&request.role).cloned().unwrap_or_default(),
            },
        };

        Ok(Completion {
            input_tokens: estimate_tokens(&request.system) + estimate_tokens(&request.user),
            output_tokens: estimate_tokens(&text),
            text,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IMPLEMENTAÇÃO OPENAI-COMPATÍVEL (OpenRouter)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Cliente para APIs de chat completions compatíveis com OpenAI
pub struct OpenAiClient {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Cliente apontando para o OpenRouter
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            api_base: OPENROUTER_API_BASE.to_string(),
            client: reqwest::Client::builder()
                .user_agent(concat!("gauntlet/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Troca a URL base (ex: https://api.openai.com/v1)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }
}

fn map_reqwest_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(Duration::ZERO)
    } else {
        LlmError::Network(e.to_string())
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".into()))?;

        let (input_tokens, output_tokens) = match chat.usage {
            Some(u) => (u.prompt_tokens, u.completion_tokens),
            None => (
                estimate_tokens(&request.system) + estimate_tokens(&request.user),
                estimate_tokens(&text),
            ),
        };

        Ok(Completion {
            text,
            input_tokens,
            output_tokens,
        })
    }
}
