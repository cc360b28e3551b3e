//! Google Sheets sink over the Sheets v4 and Drive v3 REST APIs.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde_json::{Value, json};

use papertriage_core::record::is_header_row;
use papertriage_core::{AnalysisRecord, RecordSink, SINK_HEADERS, SinkError};

use crate::auth::{ServiceAccountKey, TokenProvider};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// What to do with row 1 of the worksheet when connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderAction {
    /// Row 1 already holds the header.
    Keep,
    /// The worksheet is empty: write the header into row 1.
    Write,
    /// Row 1 holds something else: insert a header row above it.
    InsertAbove,
}

pub fn header_action(first_row: &[String]) -> HeaderAction {
    if first_row.iter().all(|c| c.trim().is_empty()) {
        HeaderAction::Write
    } else if is_header_row(first_row) {
        HeaderAction::Keep
    } else {
        HeaderAction::InsertAbove
    }
}

/// Drive search query for a spreadsheet with exactly this name.
pub fn drive_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escaped, SPREADSHEET_MIME
    )
}

/// A1 range covering `cells` on the worksheet `title`.
fn a1_range(title: &str, cells: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), cells)
}

/// Cells of the first row in a `values.get` response. Missing means empty.
fn first_row(data: &Value) -> Vec<String> {
    data["values"]
        .as_array()
        .and_then(|rows| rows.first())
        .and_then(|row| row.as_array())
        .map(|cells| {
            cells
                .iter()
                .map(|c| match c {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Appends records to the first worksheet of a spreadsheet, found by name via
/// Drive or created on first use.
pub struct SheetsSink {
    client: reqwest::Client,
    auth: TokenProvider,
    spreadsheet_id: String,
    sheet_id: i64,
    sheet_title: String,
}

impl SheetsSink {
    /// Authenticate, locate or create the spreadsheet named `sheet_name`, and
    /// make sure its first row is the header.
    pub async fn connect(credentials_path: &Path, sheet_name: &str) -> Result<Self, SinkError> {
        let key = ServiceAccountKey::from_file(credentials_path)?;
        let client = reqwest::Client::new();
        let auth = TokenProvider::new(key, client.clone());
        tracing::info!(account = %auth.client_email(), "authenticating with Google Sheets");
        auth.token().await?;

        let spreadsheet_id = match find_spreadsheet(&client, &auth, sheet_name).await? {
            Some(id) => id,
            None => {
                tracing::info!(sheet = %sheet_name, "creating new spreadsheet");
                create_spreadsheet(&client, &auth, sheet_name).await?
            }
        };
        let (sheet_id, sheet_title) = first_worksheet(&client, &auth, &spreadsheet_id).await?;

        let sink = Self {
            client,
            auth,
            spreadsheet_id,
            sheet_id,
            sheet_title,
        };
        sink.ensure_header().await?;
        tracing::info!(url = %sink.location(), "connected to Google Sheet");
        Ok(sink)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            SHEETS_API,
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }

    async fn ensure_header(&self) -> Result<(), SinkError> {
        let header_range = a1_range(&self.sheet_title, "1:1");
        let token = self.auth.token().await?;
        let data = send(
            self.client
                .get(self.values_url(&header_range))
                .bearer_auth(&token),
        )
        .await?;

        match header_action(&first_row(&data)) {
            HeaderAction::Keep => return Ok(()),
            HeaderAction::Write => tracing::info!("adding header row to empty sheet"),
            HeaderAction::InsertAbove => {
                tracing::info!("first row is not the header, inserting header above it");
                send(
                    self.client
                        .post(format!(
                            "{}/{}:batchUpdate",
                            SHEETS_API, self.spreadsheet_id
                        ))
                        .bearer_auth(&token)
                        .json(&json!({
                            "requests": [{
                                "insertDimension": {
                                    "range": {
                                        "sheetId": self.sheet_id,
                                        "dimension": "ROWS",
                                        "startIndex": 0,
                                        "endIndex": 1
                                    },
                                    "inheritFromBefore": false
                                }
                            }]
                        })),
                )
                .await?;
            }
        }

        send(
            self.client
                .put(self.values_url(&a1_range(&self.sheet_title, "A1")))
                .query(&[("valueInputOption", "RAW")])
                .bearer_auth(&token)
                .json(&json!({ "values": [SINK_HEADERS] })),
        )
        .await?;
        Ok(())
    }
}

/// Send a request and decode the JSON body, mapping HTTP failures onto
/// [`SinkError`].
async fn send(request: reqwest::RequestBuilder) -> Result<Value, SinkError> {
    let resp = request
        .send()
        .await
        .map_err(|e| SinkError::Network(e.to_string()))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| SinkError::Network(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(String::from))
            .unwrap_or_else(|| body.chars().take(300).collect());
        return Err(match status.as_u16() {
            401 | 403 => SinkError::Auth(message),
            code => SinkError::Rejected(format!("HTTP {}: {}", code, message)),
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| SinkError::Rejected(format!("malformed response: {}", e)))
}

async fn find_spreadsheet(
    client: &reqwest::Client,
    auth: &TokenProvider,
    name: &str,
) -> Result<Option<String>, SinkError> {
    let token = auth.token().await?;
    let query = drive_query(name);
    let data = send(
        client
            .get(DRIVE_FILES_API)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("pageSize", "1"),
            ])
            .bearer_auth(&token),
    )
    .await?;
    Ok(data["files"]
        .as_array()
        .and_then(|files| files.first())
        .and_then(|f| f["id"].as_str())
        .map(String::from))
}

async fn create_spreadsheet(
    client: &reqwest::Client,
    auth: &TokenProvider,
    name: &str,
) -> Result<String, SinkError> {
    let token = auth.token().await?;
    let data = send(
        client
            .post(SHEETS_API)
            .bearer_auth(&token)
            .json(&json!({ "properties": { "title": name } })),
    )
    .await?;
    data["spreadsheetId"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| SinkError::Rejected("create response has no spreadsheetId".into()))
}

async fn first_worksheet(
    client: &reqwest::Client,
    auth: &TokenProvider,
    spreadsheet_id: &str,
) -> Result<(i64, String), SinkError> {
    let token = auth.token().await?;
    let data = send(
        client
            .get(format!("{}/{}", SHEETS_API, spreadsheet_id))
            .query(&[("fields", "sheets.properties(sheetId,title)")])
            .bearer_auth(&token),
    )
    .await?;
    let props = &data["sheets"][0]["properties"];
    match (props["sheetId"].as_i64(), props["title"].as_str()) {
        (Some(id), Some(title)) => Ok((id, title.to_string())),
        _ => Err(SinkError::Rejected("spreadsheet has no worksheets".into())),
    }
}

impl RecordSink for SheetsSink {
    fn name(&self) -> &str {
        "Google Sheets"
    }

    fn location(&self) -> String {
        format!("https://docs.google.com/spreadsheets/d/{}", self.spreadsheet_id)
    }

    fn append<'a>(
        &'a self,
        record: &'a AnalysisRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let token = self.auth.token().await?;
            let url = format!(
                "{}:append",
                self.values_url(&a1_range(&self.sheet_title, "A1"))
            );
            send(
                self.client
                    .post(url)
                    .query(&[
                        ("valueInputOption", "RAW"),
                        ("insertDataOption", "INSERT_ROWS"),
                    ])
                    .bearer_auth(&token)
                    .json(&json!({ "values": [record.to_row()] })),
            )
            .await?;
            tracing::info!(file = %record.filename, "wrote analysis row to Google Sheets");
            Ok(())
        })
    }
}
