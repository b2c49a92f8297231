//! # Query Classifier
//!
//! Decides whether an inbound request is a cacheable GraphQL read or must be
//! forwarded untouched. A request is cacheable only when it is a JSON `POST`
//! carrying a `query` member, the document never mentions `mutation`, and the
//! entity extractor finds at least one entity to derive a TTL from.

use super::entity::extract_entities;
use axum::http::{header, HeaderMap, Method};
use serde_json::Value;
use std::fmt;

/// Why a request bypasses the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    NotPost,
    NotJson,
    NoQueryField,
    Mutation,
    NoEntities,
}

impl fmt::Display for PassThroughReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotPost => "method is not POST",
            Self::NotJson => "content type is not application/json",
            Self::NoQueryField => "body has no query field",
            Self::Mutation => "query contains a mutation",
            Self::NoEntities => "no entities found in query",
        };
        write!(f, "{}", reason)
    }
}

/// Outcome of classifying a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Forward to upstream unmodified
    PassThrough(PassThroughReason),

    /// Register and redirect; carries the entities the query reads
    Cacheable { entities: Vec<String> },
}

impl Classification {
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Cacheable { .. })
    }
}

/// Cheap pre-check that needs no body: only JSON POSTs can be cacheable.
pub fn precheck(method: &Method, headers: &HeaderMap) -> Option<PassThroughReason> {
    if *method != Method::POST {
        return Some(PassThroughReason::NotPost);
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|content_type| content_type.contains("application/json"))
        .unwrap_or(false);

    if !is_json {
        return Some(PassThroughReason::NotJson);
    }

    None
}

/// Classify a fully buffered request.
pub fn classify(method: &Method, headers: &HeaderMap, body: &[u8]) -> Classification {
    if let Some(reason) = precheck(method, headers) {
        return Classification::PassThrough(reason);
    }

    let query = match query_text(body) {
        Some(query) => query,
        None => return Classification::PassThrough(PassThroughReason::NoQueryField),
    };

    if has_mutation(&query) {
        return Classification::PassThrough(PassThroughReason::Mutation);
    }

    let entities = extract_entities(&query);
    if entities.is_empty() {
        return Classification::PassThrough(PassThroughReason::NoEntities);
    }

    Classification::Cacheable { entities }
}

/// Pull the query document out of a GraphQL JSON payload.
///
/// Strings are returned as-is, `null` becomes the empty document, and any
/// other JSON value is rendered back to its JSON text.
pub fn query_text(body: &[u8]) -> Option<String> {
    let payload: Value = serde_json::from_slice(body).ok()?;

    match payload.get("query")? {
        Value::String(query) => Some(query.clone()),
        Value::Null => Some(String::new()),
        other => Some(other.to_string()),
    }
}

/// Any occurrence of `mutation`, in any case, disqualifies a document.
pub fn has_mutation(query: &str) -> bool {
    query.to_lowercase().contains("mutation")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers
    }

    #[test]
    fn test_cacheable_query() {
        let body = br#"{"query":"query { User { id name } }"}"#;
        let classification = classify(&Method::POST, &json_headers(), body);
        assert_eq!(
            classification,
            Classification::Cacheable {
                entities: vec!["User".to_string()]
            }
        );
        assert!(classification.is_cacheable());
    }

    #[test]
    fn test_non_post_passes_through() {
        let body = br#"{"query":"query { User { id } }"}"#;
        assert_eq!(
            classify(&Method::GET, &json_headers(), body),
            Classification::PassThrough(PassThroughReason::NotPost)
        );
    }

    #[test]
    fn test_missing_content_type_passes_through() {
        let body = br#"{"query":"query { User { id } }"}"#;
        assert_eq!(
            classify(&Method::POST, &HeaderMap::new(), body),
            Classification::PassThrough(PassThroughReason::NotJson)
        );
    }

    #[test]
    fn test_mutations_always_pass_through() {
        let bodies: [&[u8]; 3] = [
            br#"{"query":"mutation { createUser(name: \"x\") { id } }"}"#,
            br#"{"query":"MUTATION Update { User { id } }"}"#,
            br#"{"query":"query { User { lastMutationAt } }"}"#,
        ];

        for body in bodies {
            assert_eq!(
                classify(&Method::POST, &json_headers(), body),
                Classification::PassThrough(PassThroughReason::Mutation)
            );
        }
    }

    #[test]
    fn test_missing_query_field_passes_through() {
        let bodies: [&[u8]; 4] = [
            br#"{"operationName":"Users"}"#,
            br#"[{"query":"query { User { id } }"}]"#,
            b"not json at all",
            b"",
        ];

        for body in bodies {
            assert_eq!(
                classify(&Method::POST, &json_headers(), body),
                Classification::PassThrough(PassThroughReason::NoQueryField)
            );
        }
    }

    #[test]
    fn test_query_without_entities_passes_through() {
        let body = br#"{"query":"{ users { id } }"}"#;
        assert_eq!(
            classify(&Method::POST, &json_headers(), body),
            Classification::PassThrough(PassThroughReason::NoEntities)
        );

        let null_query = br#"{"query":null}"#;
        assert_eq!(
            classify(&Method::POST, &json_headers(), null_query),
            Classification::PassThrough(PassThroughReason::NoEntities)
        );
    }

    #[test]
    fn test_query_text_of_non_string_value() {
        assert_eq!(query_text(br#"{"query":42}"#).as_deref(), Some("42"));
        assert_eq!(query_text(br#"{"query":"x"}"#).as_deref(), Some("x"));
        assert_eq!(query_text(br#"{"variables":{}}"#), None);
    }
}
