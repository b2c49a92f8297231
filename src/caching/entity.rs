//! # Entity Extraction
//!
//! Best-effort scan of a GraphQL document for the entity types it reads. This
//! is not a grammar-aware parser: it runs two linear passes and accepts any
//! name whose first character is an uppercase ASCII letter.
//!
//! 1. The token following every `query` or `type` keyword.
//! 2. The word directly in front of every `{`.
//!
//! A missed entity makes a query uncacheable or gives it the default TTL.

/// Characters stripped from both ends of a candidate name
const NAME_PUNCTUATION: &[char] = &['{', '}', '(', ')', ',', ':', '"', '\''];

/// Keywords whose following token names an entity
const ENTITY_KEYWORDS: [&str; 2] = ["query", "type"];

/// Extract the ordered, de-duplicated entity names referenced by `query`.
pub fn extract_entities(query: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut record = |candidate: &str| {
        if let Some(name) = sanitize_entity_name(candidate) {
            if !entities.iter().any(|seen| seen == name) {
                entities.push(name.to_string());
            }
        }
    };

    let words: Vec<&str> = query.split_whitespace().collect();
    for pair in words.windows(2) {
        if ENTITY_KEYWORDS
            .iter()
            .any(|keyword| pair[0].eq_ignore_ascii_case(keyword))
        {
            record(pair[1]);
        }
    }

    for (idx, _) in query.match_indices('{') {
        if idx == 0 {
            continue;
        }

        let preceding = query[..idx].trim();
        if let Some(last_space) = preceding.rfind(' ') {
            record(&preceding[last_space + 1..]);
        }
    }

    entities
}

/// Strip syntax characters and keep the name only if it starts with A-Z.
fn sanitize_entity_name(raw: &str) -> Option<&str> {
    let name = raw.trim().trim_matches(NAME_PUNCTUATION);

    match name.as_bytes().first() {
        Some(first) if first.is_ascii_uppercase() => Some(name),
        _ => None,
    }
}
