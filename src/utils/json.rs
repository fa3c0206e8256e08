// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EXTRAÇÃO DE JSON DE RESPOSTAS DO MODELO
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Cadeia ordenada, o primeiro sucesso vence:
// 1. bloco cercado (```json ... ```)
// 2. primeiro trecho entre colchetes/chaves (regex gulosa)
// 3. parse do texto bruto
//
// Falsos positivos da regex (trecho parcial que por acaso é JSON válido)
// são aceitos. Quando nada funciona, os consumidores caem para
// `extract_quoted_phrases` e depois `naive_split`.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("static regex"));
static ARRAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("static regex"));
static OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex"));
static QUOTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"\n]{3,})"|“([^”\n]{3,})”"#).expect("static regex"));
static LIST_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]+|\d+[.)]|#+)\s*").expect("static regex"));

/// Tenta extrair um valor `T` da resposta usando a cadeia completa.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    from_fence(text)
        .or_else(|| from_brackets(text))
        .or_else(|| from_raw(text))
}

/// Camada 1: conteúdo de blocos cercados
pub fn from_fence<T: DeserializeOwned>(text: &str) -> Option<T> {
    FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| serde_json::from_str(m.as_str().trim()).ok())
}

/// Camada 2: primeiro trecho `[...]` ou `{...}`
///
/// A regex é gulosa: pega do primeiro delimitador de abertura até o último
/// de fechamento. Tenta array antes de objeto.
pub fn from_brackets<T: DeserializeOwned>(text: &str) -> Option<T> {
    [&*ARRAY_RE, &*OBJECT_RE]
        .iter()
        .filter_map(|re| re.find(text))
        .find_map(|m| serde_json::from_str(m.as_str()).ok())
}

/// Camada 3: o texto inteiro
pub fn from_raw<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_str(text.trim()).ok()
}

/// Frases entre aspas (retas ou tipográficas), em ordem de aparição
pub fn extract_quoted_phrases(text: &str) -> Vec<String> {
    QUOTED_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Último recurso: uma entrada por linha, sem marcadores de lista
pub fn naive_split(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| LIST_MARKER_RE.replace(line, "").trim().trim_matches('"').trim().to_string())
        .filter(|line| line.chars().filter(|c| c.is_alphanumeric()).count() >= 3)
        .filter(|line| !line.starts_with("```"))
        .collect()
}

/// Lista de strings com a cadeia completa de fallback.
///
/// JSON (array de strings ou objeto com o campo `key`) → frases entre aspas
/// → divisão por linha.
pub fn extract_string_list(text: &str, key: &str) -> Vec<String> {
    if let Some(list) = extract_json::<Vec<String>>(text) {
        return clean_list(list);
    }
    if let Some(value) = extract_json::<serde_json::Value>(text) {
        if let Some(items) = value.get(key).and_then(|v| v.as_array()) {
            let list = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            return clean_list(list);
        }
    }

    let quoted = extract_quoted_phrases(text);
    if !quoted.is_empty() {
        return quoted;
    }

    naive_split(text)
}

fn clean_list(list: Vec<String>) -> Vec<String> {
    list.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Rating {
        score: f32,
    }

    #[test]
    fn test_fence_wins() {
        let text = "Here:\n```json\n{\"score\": 0.8}\n```\nand {\"score\": 0.1}";
        let rating: Rating = extract_json(text).unwrap();
        assert_eq!(rating.score, 0.8);
    }

    #[test]
    fn test_bracket_layer() {
        let text = "The answer is [\"a\", \"b\"] as requested.";
        let list: Vec<String> = extract_json(text).unwrap();
        assert_eq!(list, vec!["a", "b"]);
    }

    #[test]
    fn test_object_after_array_attempt() {
        let text = "Result: {\"score\": 0.4} done";
        let rating: Rating = extract_json(text).unwrap();
        assert_eq!(rating.score, 0.4);
    }

    #[test]
    fn test_raw_layer() {
        let rating: Rating = from_raw("  {\"score\": 1.0}  ").unwrap();
        assert_eq!(rating.score, 1.0);
    }

    #[test]
    fn test_nothing_parses() {
        assert!(extract_json::<Rating>("no json here").is_none());
    }

    #[test]
    fn test_quoted_phrases() {
        let text = r#"Try "rust async runtime" and “tokio scheduler”."#;
        assert_eq!(
            extract_quoted_phrases(text),
            vec!["rust async runtime", "tokio scheduler"]
        );
    }

    #[test]
    fn test_naive_split_strips_markers() {
        let text = "1. first query\n- second query\n\n* third";
        assert_eq!(naive_split(text), vec!["first query", "second query", "third"]);
    }

    #[test]
    fn test_string_list_from_object_key() {
        let text = r#"{"queries": ["alpha beta", " gamma "]}"#;
        assert_eq!(extract_string_list(text, "queries"), vec!["alpha beta", "gamma"]);
    }

    #[test]
    fn test_string_list_falls_back_to_split() {
        assert_eq!(extract_string_list("one thing\ntwo things", "queries").len(), 2);
    }
}
