//! Prompt construction and response parsing for relationship inference.
//!
//! The model sees every entity of a batch as `id | type | name` and answers
//! with a JSON document of `(source, target, type)` triples that reference
//! those ids.

use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use tessera_core::{Error, IngestionEntity, Relationship, Result};

/// System message for relationship inference.
pub const RELATIONSHIP_SYSTEM_PROMPT: &str = "You identify relationships between entities \
extracted from one document. Only relate entities from the provided list, reference them \
by id, and answer with JSON only.";

/// Generates the user prompt listing the batch's entities.
///
/// # Arguments
/// * `entities` - Entities of the batch, in batch order
/// * `known_types` - Ontology relationship names the model should prefer
pub fn relationship_inference_prompt(entities: &[IngestionEntity], known_types: &[String]) -> String {
    let mut listing = String::new();
    for entity in entities {
        listing.push_str(&format!(
            "- {} | {} | {}\n",
            entity.id,
            entity.entity_type,
            entity.name.replace('\n', " ")
        ));
    }

    let vocabulary = if known_types.is_empty() {
        "Use short UPPER_SNAKE_CASE relationship names.".to_string()
    } else {
        format!(
            "Prefer these relationship names when they apply: {}. Otherwise use short \
             UPPER_SNAKE_CASE names.",
            known_types.join(", ")
        )
    };

    format!(
        r#"Entities (id | type | name):
{}
{}

Respond with a JSON object of the form:
{{"relationships": [{{"source": "<id>", "target": "<id>", "type": "<NAME>"}}]}}
Return an empty list when no relationship is supported by the entities.
"#,
        listing, vocabulary
    )
}

#[derive(Deserialize)]
struct RawTriple {
    #[serde(alias = "from", alias = "source_id")]
    source: String,
    #[serde(alias = "to", alias = "target_id")]
    target: String,
    #[serde(rename = "type", alias = "relationship", alias = "rel_type")]
    rel_type: String,
}

/// Strip Markdown code fences some models wrap JSON in.
fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Locate the JSON document inside a response that may carry prose around it.
fn extract_json(response: &str) -> Option<&str> {
    let text = strip_code_fences(response);
    let start = text.find(['{', '['])?;
    let closing = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closing)?;
    (end > start).then(|| &text[start..=end])
}

/// Parses a model response into relationship triples.
///
/// Accepts `{"relationships": [...]}` or a bare array. Items missing a
/// source, target, or type are skipped. Fails only when no JSON document can
/// be found or parsed at all.
pub fn parse_inferred_relationships(response: &str) -> Result<Vec<Relationship>> {
    let json = extract_json(response).ok_or_else(|| {
        Error::Inference("Model response contains no JSON document".to_string())
    })?;
    let value: JsonValue = serde_json::from_str(json)
        .map_err(|e| Error::Inference(format!("Unparsable model response: {}", e)))?;

    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => match map.remove("relationships") {
            Some(JsonValue::Array(items)) => items,
            _ => {
                return Err(Error::Inference(
                    "Model response has no relationships array".to_string(),
                ))
            }
        },
        _ => {
            return Err(Error::Inference(
                "Model response is neither an object nor an array".to_string(),
            ))
        }
    };

    let total = items.len();
    let triples: Vec<Relationship> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawTriple>(item).ok())
        .filter(|t| !t.rel_type.trim().is_empty())
        .map(|t| Relationship::new(t.source, t.target, t.rel_type.trim()))
        .collect();

    if triples.len() < total {
        debug!(
            skipped = total - triples.len(),
            "Skipped malformed relationship items"
        );
    }
    Ok(triples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_entities_and_vocabulary() {
        let entities = vec![
            IngestionEntity::new("a", "Alice", "Person"),
            IngestionEntity::new("b", "Acme", "Organization"),
        ];
        let prompt = relationship_inference_prompt(&entities, &["WORKS_AT".to_string()]);

        assert!(prompt.contains("- a | Person | Alice"));
        assert!(prompt.contains("- b | Organization | Acme"));
        assert!(prompt.contains("WORKS_AT"));
        assert!(prompt.contains(r#"{"relationships": ["#));
    }

    #[test]
    fn test_prompt_without_known_types() {
        let prompt = relationship_inference_prompt(&[], &[]);
        assert!(prompt.contains("UPPER_SNAKE_CASE"));
        assert!(!prompt.contains("Prefer these"));
    }

    #[test]
    fn test_parse_object_form() {
        let response = r#"{"relationships": [{"source": "a", "target": "b", "type": "WORKS_AT"}]}"#;
        let triples = parse_inferred_relationships(response).unwrap();
        assert_eq!(triples, vec![Relationship::new("a", "b", "WORKS_AT")]);
    }

    #[test]
    fn test_parse_bare_array_with_aliases() {
        let response = r#"[{"from": "a", "to": "b", "relationship": "KNOWS"}]"#;
        let triples = parse_inferred_relationships(response).unwrap();
        assert_eq!(triples[0].rel_type, "KNOWS");
        assert_eq!(triples[0].source, "a");
    }

    #[test]
    fn test_parse_code_fenced_response() {
        let response = "```json\n{\"relationships\": [{\"source\": \"a\", \"target\": \"b\", \"type\": \"OWNS\"}]}\n```";
        let triples = parse_inferred_relationships(response).unwrap();
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn test_parse_prose_around_json() {
        let response = "Here you go: {\"relationships\": []} Hope that helps.";
        assert!(parse_inferred_relationships(response).unwrap().is_empty());
    }

    #[test]
    fn test_parse_skips_malformed_items() {
        let response = r#"{"relationships": [
            {"source": "a", "target": "b", "type": "KNOWS"},
            {"source": "a", "type": "MISSING_TARGET"},
            {"source": "a", "target": "b", "type": "  "}
        ]}"#;
        let triples = parse_inferred_relationships(response).unwrap();
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_inferred_relationships("no relationships found"),
            Err(Error::Inference(_))
        ));
        assert!(parse_inferred_relationships(r#"{"edges": []}"#).is_err());
    }
}
