//! Google Sheets v4 over HTTPS (blocking `reqwest`)

use super::api::SheetsApi;
use super::model::{CellInput, Reply, Request, SheetMetadata, ValueInputOption};
use crate::auth::TokenSource;
use crate::error::{SyncError, SyncResult};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

const SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

/// Only what cleanup and sheet resolution read back
const METADATA_FIELDS: &str =
    "sheets(properties(sheetId,title,index,gridProperties),conditionalFormats,charts(chartId),merges)";

#[derive(Deserialize)]
struct SpreadsheetEnvelope {
    #[serde(default)]
    sheets: Vec<SheetMetadata>,
}

#[derive(Deserialize)]
struct BatchUpdateEnvelope {
    #[serde(default)]
    replies: Vec<Reply>,
}

#[derive(Deserialize)]
struct ValuesEnvelope {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// HTTP implementation of [`SheetsApi`] for one spreadsheet document
pub struct SheetsClient {
    http: Client,
    spreadsheet_id: String,
    tokens: TokenSource,
}

impl SheetsClient {
    /// Build the client; the first token is fetched up front so bad
    /// credentials fail before any sheet is touched
    pub fn connect(spreadsheet_id: &str, tokens: TokenSource) -> SyncResult<Self> {
        tokens.bearer()?;
        Ok(Self {
            http: Client::builder().build()?,
            spreadsheet_id: spreadsheet_id.to_string(),
            tokens,
        })
    }

    /// `…/spreadsheets/{id}/{segments…}` with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = Url::parse(SHEETS_ENDPOINT)
            .map_err(|e| SyncError::Config(format!("bad endpoint: {}", e)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SyncError::Config("endpoint cannot be a base".to_string()))?;
            path.pop_if_empty();
            path.push(&self.spreadsheet_id);
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        let response = request.bearer_auth(self.tokens.bearer()?).send()?;
        check_status(response)
    }
}

/// Map non-success responses onto [`SyncError`]
fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    Err(classify(status, message))
}

fn classify(status: StatusCode, message: String) -> SyncError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        SyncError::RateLimited(message)
    } else {
        SyncError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Values come back as JSON strings for FORMATTED_VALUE, but be lenient
fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetsApi for SheetsClient {
    fn fetch_metadata(&mut self) -> SyncResult<Vec<SheetMetadata>> {
        let url = self.url(&[])?;
        let response = self
            .send(self.http.get(url).query(&[("fields", METADATA_FIELDS)]))?;
        Ok(response.json::<SpreadsheetEnvelope>()?.sheets)
    }

    fn batch_update(&mut self, requests: &[Request]) -> SyncResult<Vec<Reply>> {
        let url = self.url(&[])?;
        // ":batchUpdate" is a suffix of the id segment, not its own segment
        let url = Url::parse(&format!("{}:batchUpdate", url))
            .map_err(|e| SyncError::Config(format!("bad endpoint: {}", e)))?;
        let body = json!({ "requests": requests });
        let response = self.send(self.http.post(url).json(&body))?;
        Ok(response.json::<BatchUpdateEnvelope>()?.replies)
    }

    fn clear_values(&mut self, range: &str) -> SyncResult<()> {
        let url = self.url(&["values", &format!("{}:clear", range)])?;
        self.send(self.http.post(url).json(&json!({})))?;
        Ok(())
    }

    fn update_values(
        &mut self,
        range: &str,
        rows: &[Vec<CellInput>],
        input: ValueInputOption,
    ) -> SyncResult<()> {
        let url = self.url(&["values", range])?;
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        self.send(
            self.http
                .put(url)
                .query(&[("valueInputOption", input.as_str())])
                .json(&body),
        )?;
        Ok(())
    }

    fn append_values(
        &mut self,
        range: &str,
        rows: &[Vec<CellInput>],
        input: ValueInputOption,
    ) -> SyncResult<()> {
        let url = self.url(&["values", &format!("{}:append", range)])?;
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        self.send(
            self.http
                .post(url)
                .query(&[
                    ("valueInputOption", input.as_str()),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .json(&body),
        )?;
        Ok(())
    }

    fn get_values(&mut self, range: &str) -> SyncResult<Vec<Vec<String>>> {
        let url = self.url(&["values", range])?;
        let response = self.send(self.http.get(url))?;
        let envelope = response.json::<ValuesEnvelope>()?;
        Ok(envelope
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }
}
