use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::sheets::{CellRange, Grid, SheetBackend, SheetError};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Google Sheets v4 REST client for one spreadsheet.
///
/// Authenticates with a ready-made OAuth bearer token; obtaining and refreshing
/// it is left to the deployment.
pub struct GoogleSheets {
    client: Client,
    spreadsheet_id: String,
    token: String,
    base: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

impl GoogleSheets {
    pub fn new(spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Result<Self, SheetError> {
        let client = Client::builder()
            .user_agent("clinic-backoffice-api")
            .build()
            .map_err(|e| SheetError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
            base: SHEETS_API.to_string(),
        })
    }

    /// `{base}/{spreadsheet}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, SheetError> {
        let mut url = Url::parse(&self.base).map_err(|e| SheetError::Config(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| SheetError::Config(format!("bad base url {}", self.base)))?
            .push(&self.spreadsheet_id)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response, SheetError> {
        let resp = req
            .send()
            .await
            .map_err(|e| SheetError::Backend(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SheetError::Backend(format!("google sheets returned {status}: {body}")))
    }

    async fn sheet_id(&self, sheet: &str) -> Result<i64, SheetError> {
        let url = self.url(&[])?;
        let meta: SpreadsheetMeta = self
            .send(
                self.request(Method::GET, url)
                    .query(&[("fields", "sheets.properties")]),
            )
            .await?
            .json()
            .await
            .map_err(|e| SheetError::Backend(e.to_string()))?;

        meta.sheets
            .into_iter()
            .find(|s| s.properties.title == sheet)
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| SheetError::SheetNotFound(sheet.to_string()))
    }
}

fn cell_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetBackend for GoogleSheets {
    async fn read_range(&self, sheet: &str, range: CellRange) -> Result<Grid, SheetError> {
        let a1 = range.a1(sheet);
        let url = self.url(&["values", a1.as_str()])?;
        let body: ValueRange = self
            .send(self.request(Method::GET, url))
            .await?
            .json()
            .await
            .map_err(|e| SheetError::Backend(e.to_string()))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn write_range(
        &self,
        sheet: &str,
        range: CellRange,
        values: Grid,
    ) -> Result<(), SheetError> {
        let a1 = range.a1(sheet);
        let url = self.url(&["values", a1.as_str()])?;
        self.send(
            self.request(Method::PUT, url)
                .query(&[("valueInputOption", "USER_ENTERED")])
                .json(&json!({ "values": values })),
        )
        .await?;
        Ok(())
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), SheetError> {
        let target = format!("{}:append", CellRange::All.a1(sheet));
        let url = self.url(&["values", target.as_str()])?;
        self.send(
            self.request(Method::POST, url)
                .query(&[
                    ("valueInputOption", "USER_ENTERED"),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .json(&json!({ "values": [row] })),
        )
        .await?;
        Ok(())
    }

    async fn delete_rows(&self, sheet: &str, start: u32, end: u32) -> Result<(), SheetError> {
        let sheet_id = self.sheet_id(sheet).await?;
        let url = self.url(&[])?;
        let url = Url::parse(&format!("{url}:batchUpdate"))
            .map_err(|e| SheetError::Config(e.to_string()))?;
        self.send(self.request(Method::POST, url).json(&json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": start,
                        "endIndex": end,
                    }
                }
            }]
        })))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_urls_encode_sheet_names() {
        let g = GoogleSheets::new("sheet-123", "tok").unwrap();
        let a1 = CellRange::Row(3).a1("Khách hàng");
        let url = g.url(&["values", a1.as_str()]).unwrap();
        let s = url.as_str();
        assert!(s.starts_with("https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/"));
        assert!(s.ends_with("A3:Z3"));
        assert!(!s.contains(' '));
    }

    #[test]
    fn non_string_cells_become_text() {
        assert_eq!(cell_text(json!("a")), "a");
        assert_eq!(cell_text(json!(12)), "12");
        assert_eq!(cell_text(Value::Null), "");
    }

    #[test]
    fn empty_value_range_deserializes() {
        let body: ValueRange = serde_json::from_str(r#"{"range":"'X'!A1:Z1000","majorDimension":"ROWS"}"#).unwrap();
        assert!(body.values.is_empty());
    }
}
