// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UTILITÁRIOS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Utilitários compartilhados:
// - Extração de JSON de respostas do modelo
// - Token tracking por role:model
// - Text processing
// - Timing por fase
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cadeia de extração de JSON (fence → brackets → raw) e fallbacks.
pub mod json;
mod text;
mod timing;
mod token_tracker;

pub use json::{extract_json, extract_quoted_phrases, extract_string_list, naive_split};
pub use text::*;
pub use timing::{ActionTimer, PhaseTimings};
pub use token_tracker::{merge_usage, usage_key, TokenTracker, TrackerStats, UsageMap};
