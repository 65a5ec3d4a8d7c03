//! Firestore REST collection reader

use super::{Document, DocumentSource};
use crate::auth::TokenSource;
use crate::error::{SyncError, SyncResult};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use tracing::{debug, info};

const FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

/// Largest page the REST API serves
pub const MAX_PAGE_SIZE: usize = 300;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Pages through one collection of the `(default)` database
pub struct FirestoreSource {
    http: Client,
    project_id: String,
    collection: String,
    tokens: TokenSource,
    log_every: usize,
}

impl FirestoreSource {
    pub fn new(project_id: &str, collection: &str, tokens: TokenSource, log_every: usize) -> Self {
        Self {
            http: Client::new(),
            project_id: project_id.to_string(),
            collection: collection.to_string(),
            tokens,
            log_every: log_every.max(1),
        }
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            FIRESTORE_ENDPOINT, self.project_id, self.collection
        )
    }
}

impl DocumentSource for FirestoreSource {
    fn documents(&mut self, limit: Option<usize>) -> SyncResult<Vec<Document>> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        let url = self.collection_url();
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = limit.map_or(MAX_PAGE_SIZE, |l| l - documents.len());
            let page_size = remaining.min(MAX_PAGE_SIZE).to_string();
            let mut query = vec![("pageSize", page_size)];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(self.tokens.bearer()?)
                .query(&query)
                .send()?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(SyncError::Extract(format!(
                    "Firestore list failed ({}): {}",
                    status, body
                )));
            }
            let page: ListResponse = response.json()?;
            debug!("Firestore page: {} documents", page.documents.len());

            for raw in page.documents {
                let id = raw
                    .name
                    .rsplit('/')
                    .next()
                    .unwrap_or(&raw.name)
                    .to_string();
                documents.push(Document::new(id, decode_fields(raw.fields)));
                if documents.len() % self.log_every == 0 {
                    info!("Read {} documents...", documents.len());
                }
                if limit.is_some_and(|l| documents.len() >= l) {
                    return Ok(documents);
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }

    fn describe(&self) -> String {
        format!("firestore {}/{}", self.project_id, self.collection)
    }
}

/// Decode a `fields` map of typed Firestore values
pub fn decode_fields(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(key, value)| (key, decode_value(value)))
        .collect()
}

/// `{"integerValue": "3"}` → `3`, `{"mapValue": {"fields": {...}}}` → `{...}`
pub fn decode_value(value: Value) -> Value {
    let Value::Object(mut typed) = value else {
        return value;
    };
    if typed.len() != 1 {
        return Value::Object(typed);
    }
    let Some((kind, inner)) = typed.iter_mut().next().map(|(k, v)| (k.clone(), v.take())) else {
        return Value::Null;
    };

    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
            inner
        }
        "integerValue" => match &inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .unwrap_or(inner),
            _ => inner,
        },
        "doubleValue" => match &inner {
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(inner),
            _ => inner,
        },
        "mapValue" => match inner {
            Value::Object(mut map) => match map.remove("fields") {
                Some(Value::Object(fields)) => Value::Object(decode_fields(fields)),
                _ => Value::Object(Map::new()),
            },
            other => other,
        },
        "arrayValue" => match inner {
            Value::Object(mut map) => match map.remove("values") {
                Some(Value::Array(values)) => {
                    Value::Array(values.into_iter().map(decode_value).collect())
                }
                _ => Value::Array(Vec::new()),
            },
            other => other,
        },
        "geoPointValue" => inner,
        _ => {
            let mut original = Map::new();
            original.insert(kind, inner);
            Value::Object(original)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_value(json!({"integerValue": "42"})), json!(42));
        assert_eq!(decode_value(json!({"doubleValue": 3.5})), json!(3.5));
        assert_eq!(decode_value(json!({"booleanValue": true})), json!(true));
        assert_eq!(decode_value(json!({"nullValue": null})), Value::Null);
        assert_eq!(
            decode_value(json!({"timestampValue": "2026-01-20T15:00:00Z"})),
            json!("2026-01-20T15:00:00Z")
        );
    }

    #[test]
    fn test_decode_nested() {
        let typed = json!({
            "mapValue": {"fields": {
                "cam-1": {"mapValue": {"fields": {
                    "status": {"stringValue": "online"},
                    "fps": {"integerValue": "25"}
                }}},
                "tags": {"arrayValue": {"values": [{"stringValue": "a"}]}}
            }}
        });
        assert_eq!(
            decode_value(typed),
            json!({"cam-1": {"status": "online", "fps": 25}, "tags": ["a"]})
        );
    }

    #[test]
    fn test_empty_map_and_array() {
        assert_eq!(decode_value(json!({"mapValue": {}})), json!({}));
        assert_eq!(decode_value(json!({"arrayValue": {}})), json!([]));
    }

    #[test]
    fn test_collection_url() {
        let source = FirestoreSource::new(
            "proj",
            "servers",
            TokenSource::fixed("t"),
            250,
        );
        assert_eq!(
            source.collection_url(),
            "https://firestore.googleapis.com/v1/projects/proj/databases/(default)/documents/servers"
        );
    }
}
