// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TIPOS COMPARTILHADOS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identificador de pergunta (atribuído de forma monotônica)
pub type QuestionId = u32;

/// Prioridade mínima aceita para uma pergunta
pub const MIN_PRIORITY: u8 = 1;
/// Prioridade máxima aceita para uma pergunta
pub const MAX_PRIORITY: u8 = 5;

/// Status de uma pergunta de pesquisa
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    /// Ainda não consumida por um passo de planejamento
    #[default]
    Pending,
    /// Já consumida (gerou follow-ups ou foi finalizada)
    Analyzed,
}

/// Pergunta de pesquisa
///
/// Nunca é removida do estado: `status` e `depth` registram o histórico
/// para auditoria e para ordenar a síntese por linhagem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchQuestion {
    /// ID único
    pub id: QuestionId,
    /// Texto da pergunta
    pub text: String,
    /// Prioridade (1 = fundacional, 5 = avançada)
    pub priority: u8,
    /// Status atual
    pub status: QuestionStatus,
    /// Nível de aninhamento de follow-ups (0 = pergunta original)
    pub depth: u32,
    /// Pergunta que originou esta (via gap)
    pub parent_id: Option<QuestionId>,
}

impl ResearchQuestion {
    /// Cria uma pergunta de nível 0 (sem pai)
    pub fn new(id: QuestionId, text: impl Into<String>, priority: u8) -> Self {
        Self {
            id,
            text: text.into(),
            priority: clamp_priority(priority),
            status: QuestionStatus::Pending,
            depth: 0,
            parent_id: None,
        }
    }

    /// Cria um follow-up derivado de `parent`
    pub fn follow_up(
        id: QuestionId,
        text: impl Into<String>,
        priority: u8,
        parent: &ResearchQuestion,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            priority: clamp_priority(priority),
            status: QuestionStatus::Pending,
            depth: parent.depth + 1,
            parent_id: Some(parent.id),
        }
    }

    /// Verifica se a pergunta ainda está pendente
    pub fn is_pending(&self) -> bool {
        self.status == QuestionStatus::Pending
    }
}

/// Limita a prioridade ao intervalo 1..=5
pub fn clamp_priority(priority: u8) -> u8 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

/// Origem de uma fonte
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Busca web
    Web,
    /// Busca acadêmica
    Academic,
    /// Feed RSS
    Rss,
}

impl SourceType {
    /// Retorna o tipo como string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Academic => "academic",
            Self::Rss => "rss",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Documento candidato retornado pela descoberta (ainda sem score)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDocument {
    /// URL do documento
    pub url: String,
    /// Título
    pub title: String,
    /// Snippet ou abstract
    pub snippet: String,
    /// Tipo de origem
    pub source_type: SourceType,
    /// Pergunta que originou a busca
    pub question_id: QuestionId,
}

/// Fonte pontuada
///
/// Recebe o score uma única vez (no `QualityScorer`) e é imutável depois.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// URL da fonte
    pub url: String,
    /// Título
    pub title: String,
    /// Snippet
    pub snippet: String,
    /// Score de qualidade (0.0 - 1.0)
    pub score: f32,
    /// Tipo de origem
    pub source_type: SourceType,
    /// Pergunta que originou a busca
    pub question_id: QuestionId,
}

impl Source {
    /// Converte um candidato em fonte com o score informado
    pub fn from_candidate(candidate: CandidateDocument, score: f32) -> Self {
        Self {
            url: candidate.url,
            title: candidate.title,
            snippet: candidate.snippet,
            score: score.clamp(0.0, 1.0),
            source_type: candidate.source_type,
            question_id: candidate.question_id,
        }
    }
}

/// Lacuna detectada entre as perguntas e o conhecimento acumulado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    /// Pergunta à qual a lacuna se refere
    pub related_question_id: QuestionId,
    /// Descrição do que falta
    pub description: String,
}

/// Metadados de um fragmento (ordenados para serialização determinística)
pub type Metadata = BTreeMap<String, String>;

/// Restrições do usuário para a pesquisa (ex: "period" → "2020-2024")
pub type Constraints = BTreeMap<String, String>;

/// Unidade de texto recuperada do índice e usada como evidência
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Texto do fragmento
    pub text: String,
    /// Metadados (url, title, question_id, source_type, score)
    pub metadata: Metadata,
    /// Relevância para a consulta que o recuperou
    pub relevance: f32,
}

impl Fragment {
    /// URL de origem, se registrada
    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").map(String::as_str)
    }

    /// Título de origem, se registrado
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").map(String::as_str)
    }
}

/// Entidade estruturada (sujeito, predicado, objeto)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triplet {
    /// Sujeito
    pub subject: String,
    /// Predicado
    pub predicate: String,
    /// Objeto
    pub object: String,
}

/// Uso de tokens acumulado para uma chave `role:model`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Tokens de entrada
    pub input: u64,
    /// Tokens de saída
    pub output: u64,
    /// Total
    pub total: u64,
}

impl UsageTotals {
    /// Cria totais a partir de entrada e saída
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }

    /// Soma outro registro (merge aditivo)
    pub fn add(&mut self, other: &UsageTotals) {
        self.input += other.input;
        self.output += other.output;
        self.total += other.total;
    }

    /// Verifica se nenhum token foi registrado
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
