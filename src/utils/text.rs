// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TEXT UTILITIES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Processamento de texto para prompts:
// - Truncamento seguro em UTF-8
// - Limpeza de whitespace
// - Estimativa de tokens (quando o provedor não reporta uso)
// - Keywords para buscas acadêmicas
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Caracteres por token (aproximação)
const CHARS_PER_TOKEN: f32 = 4.0;

/// Estima número de tokens em um texto
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as f32 / CHARS_PER_TOKEN).ceil() as u64
}

/// Trunca em `max_chars` bytes respeitando boundary de caractere
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Trunca e adiciona reticências quando cortou algo
pub fn ellipsize(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}…", cut.trim_end())
    } else {
        cut.to_string()
    }
}

/// Extrai keywords (palavras >= 4 letras, sem stopwords) em ordem de aparição
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| w.chars().count() >= 4)
        .map(|w| w.to_lowercase())
        .filter(|w| !is_stopword(w))
        .filter(|w| seen.insert(w.clone()))
        .take(max_keywords)
        .collect()
}

fn is_stopword(word: &str) -> bool {
    const STOPWORDS: &[&str] = &[
        "about", "also", "been", "both", "does", "each", "from", "have", "into", "just", "more",
        "most", "much", "only", "other", "over", "same", "should", "some", "such", "than", "that",
        "their", "them", "then", "there", "these", "they", "this", "those", "very", "were",
        "what", "when", "where", "which", "while", "whom", "will", "with", "would", "your",
    ];
    STOPWORDS.contains(&word)
}

/// Normaliza query de busca (minúsculas, sem pontuação)
pub fn normalize_query(query: &str) -> String {
    query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
