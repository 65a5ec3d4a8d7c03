use super::{Document, DocumentSource};
use crate::error::{SyncError, SyncResult};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Documents from a JSON dump.
///
/// Two shapes are accepted:
/// - an object keyed by document id: `{"srv-01": {...}, ...}`
/// - an array of `{"id": "srv-01", "data": {...}}`
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DocumentSource for JsonFileSource {
    fn documents(&mut self, limit: Option<usize>) -> SyncResult<Vec<Document>> {
        let content = std::fs::read_to_string(&self.path)?;
        let mut documents = parse_dump(&content)?;
        if let Some(limit) = limit {
            documents.truncate(limit);
        }
        Ok(documents)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Parse either dump shape. Object dumps come out ordered by id.
pub fn parse_dump(content: &str) -> SyncResult<Vec<Document>> {
    let root: Value = serde_json::from_str(content)?;
    match root {
        Value::Object(map) => map
            .into_iter()
            .map(|(id, data)| match data {
                Value::Object(fields) => Ok(Document::new(id, fields)),
                _ => Err(SyncError::Extract(format!(
                    "document '{}' is not an object",
                    id
                ))),
            })
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                let id = item
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SyncError::Extract(format!("entry {} has no string 'id'", i)))?
                    .to_string();
                match item.get("data") {
                    Some(Value::Object(fields)) => Ok(Document::new(id, fields.clone())),
                    _ => Err(SyncError::Extract(format!(
                        "entry {} ('{}') has no object 'data'",
                        i, id
                    ))),
                }
            })
            .collect(),
        _ => Err(SyncError::Extract(
            "dump must be an object or an array".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_shape() {
        let docs = parse_dump(r#"{"srv-01": {"status": "online"}, "srv-02": {}}"#).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "srv-01");
        assert_eq!(docs[0].data["status"], "online");
    }

    #[test]
    fn test_array_shape() {
        let docs = parse_dump(r#"[{"id": "a", "data": {"x": 1}}]"#).unwrap();
        assert_eq!(docs[0].id, "a");
        assert_eq!(docs[0].data["x"], 1);
    }

    #[test]
    fn test_bad_shapes() {
        assert!(parse_dump("42").is_err());
        assert!(parse_dump(r#"{"a": 1}"#).is_err());
        assert!(parse_dump(r#"[{"data": {}}]"#).is_err());
    }
}
