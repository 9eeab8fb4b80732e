/*!
 * BigQuery reader for the Play Store review export.
 *
 * Talks to the REST API directly: `jobs.query` starts the query with named
 * parameters, `jobs.getQueryResults` is polled until the job completes and
 * followed page by page. Cells arrive as strings (timestamps as epoch seconds)
 * and are matched to columns through the returned schema.
 */

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;
use tokio::time::Instant;
use url::Url;

use crate::app_config::WarehouseConfig;
use crate::date_range::DateRange;
use crate::errors::FetchError;
use crate::reviews::RawReviewRow;
use crate::sources::{ReviewSource, missing_columns, row_from_columns};

/// How long one `getQueryResults` call may wait server-side
const POLL_TIMEOUT_MS: u64 = 10_000;

/// Rows requested per page
const PAGE_SIZE: u32 = 10_000;

/// Upper bound on `getQueryResults` calls while a job is running
const MAX_POLLS: u32 = 360;

/// Timeout for `gcloud auth print-access-token`
const GCLOUD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
    total_rows: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Value,
}

/// Warehouse reader using the BigQuery REST API
#[derive(Debug)]
pub struct BigQuerySource {
    client: Client,
    config: WarehouseConfig,
}

impl BigQuerySource {
    pub fn new(config: WarehouseConfig) -> Result<Self, FetchError> {
        Url::parse(&config.endpoint)
            .map_err(|e| FetchError::Unreachable(format!("invalid warehouse endpoint {:?}: {}", config.endpoint, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Fully qualified table name
    pub fn table_id(&self) -> String {
        format!("{}.{}.{}", self.config.project, self.config.dataset, self.config.table)
    }

    /// SQL text; dates and packages are bound as named parameters
    pub fn query_text(&self) -> String {
        format!(
            "SELECT
  Package_Name,
  App_Version_Name,
  Reviewer_Language,
  Device,
  Review_Submit_Date_and_Time,
  Star_Rating,
  Review_Text,
  Review_Link
FROM
  `{}` r
WHERE
  DATE(Review_Submit_Date_and_Time) >= @start_date
  AND DATE(Review_Submit_Date_and_Time) <= @end_date
  AND Review_Text IS NOT NULL
  AND Package_Name IN UNNEST(@packages)
ORDER BY
  Review_Submit_Date_and_Time DESC",
            self.table_id()
        )
    }

    /// Body of the `jobs.query` request
    pub fn query_request(&self, packages: &[String], range: &DateRange) -> Value {
        let package_values: Vec<Value> = packages.iter().map(|p| json!({ "value": p })).collect();
        json!({
            "query": self.query_text(),
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "timeoutMs": POLL_TIMEOUT_MS,
            "maxResults": PAGE_SIZE,
            "queryParameters": [
                {
                    "name": "start_date",
                    "parameterType": { "type": "DATE" },
                    "parameterValue": { "value": range.start_str() }
                },
                {
                    "name": "end_date",
                    "parameterType": { "type": "DATE" },
                    "parameterValue": { "value": range.end_str() }
                },
                {
                    "name": "packages",
                    "parameterType": { "type": "ARRAY", "arrayType": { "type": "STRING" } },
                    "parameterValue": { "arrayValues": package_values }
                }
            ]
        })
    }

    fn project_url(&self) -> String {
        format!(
            "{}/projects/{}/queries",
            self.config.endpoint.trim_end_matches('/'),
            self.config.project
        )
    }

    /// Access token from the configuration (or its env override), else gcloud
    async fn access_token(&self) -> Result<String, FetchError> {
        let configured = self.config.access_token.trim();
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }

        debug!("No warehouse token configured, asking gcloud");
        let output = tokio::select! {
            result = Command::new("gcloud").args(["auth", "print-access-token"]).output() => {
                result.map_err(|e| FetchError::Credentials(format!("failed to run gcloud: {}", e)))?
            },
            _ = tokio::time::sleep(GCLOUD_TIMEOUT) => {
                return Err(FetchError::Credentials("gcloud timed out printing an access token".to_string()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Credentials(format!("gcloud failed: {}", stderr.trim())));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(FetchError::Credentials("gcloud printed an empty access token".to_string()));
        }
        Ok(token)
    }

    async fn send(&self, request: reqwest::RequestBuilder, token: &str) -> Result<QueryResponse, FetchError> {
        let response = request.bearer_auth(token).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                FetchError::Unreachable(e.to_string())
            } else {
                FetchError::QueryFailed {
                    status_code: 0,
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        response
            .json::<QueryResponse>()
            .await
            .map_err(|e| FetchError::Malformed(format!("unexpected jobs.query response: {}", e)))
    }

    async fn get_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
        token: &str,
    ) -> Result<QueryResponse, FetchError> {
        let url = format!("{}/{}", self.project_url(), job.job_id);
        let mut params: Vec<(&str, String)> = vec![
            ("timeoutMs", POLL_TIMEOUT_MS.to_string()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(page) = page_token {
            params.push(("pageToken", page.to_string()));
        }
        self.send(self.client.get(url).query(&params), token).await
    }
}

/// Limits how long a running query job is waited for
#[derive(Debug)]
struct PollBudget {
    deadline: Instant,
    polls: u32,
    max_polls: u32,
}

impl PollBudget {
    fn new(timeout: Duration, max_polls: u32) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            polls: 0,
            max_polls,
        }
    }

    /// Account for one more poll of `job_id`
    fn next_poll(&mut self, job_id: &str) -> Result<(), FetchError> {
        if Instant::now() >= self.deadline || self.polls >= self.max_polls {
            return Err(FetchError::Unreachable(format!(
                "query job {} did not complete after {} polls",
                job_id, self.polls
            )));
        }
        self.polls += 1;
        Ok(())
    }
}

fn map_status_error(status: StatusCode, body: &str) -> FetchError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Credentials(message),
        _ => FetchError::QueryFailed {
            status_code: status.as_u16(),
            message,
        },
    }
}

fn cell_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Turn a page of cells into raw rows, using the schema for column names
fn rows_from_page(columns: &[String], rows: &[TableRow]) -> Vec<RawReviewRow> {
    rows.iter()
        .map(|row| {
            row_from_columns(|name| {
                columns
                    .iter()
                    .position(|c| c == name)
                    .and_then(|i| row.f.get(i))
                    .and_then(|cell| cell_to_string(&cell.v))
            })
        })
        .collect()
}

#[async_trait]
impl ReviewSource for BigQuerySource {
    async fn fetch(&self, packages: &[String], range: &DateRange) -> Result<Vec<RawReviewRow>, FetchError> {
        info!("Fetching reviews from {} for {}", self.table_id(), range);
        let token = self.access_token().await?;

        let request = self.client.post(self.project_url()).json(&self.query_request(packages, range));
        let mut page = self.send(request, &token).await?;

        let job = page
            .job_reference
            .clone()
            .ok_or_else(|| FetchError::Malformed("jobs.query response has no jobReference".to_string()))?;

        let mut budget = PollBudget::new(Duration::from_secs(self.config.timeout_secs), MAX_POLLS);
        while !page.job_complete {
            budget.next_poll(&job.job_id)?;
            debug!("Query job {} still running", job.job_id);
            page = self.get_results(&job, None, &token).await?;
        }

        let columns: Vec<String> = page
            .schema
            .as_ref()
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();
        let missing = missing_columns(columns.iter().map(String::as_str));
        if !missing.is_empty() {
            return Err(FetchError::MissingColumns(missing));
        }

        let mut rows = rows_from_page(&columns, &page.rows);
        while let Some(page_token) = page.page_token.take() {
            debug!("Fetching next result page ({} rows so far)", rows.len());
            page = self.get_results(&job, Some(&page_token), &token).await?;
            rows.extend(rows_from_page(&columns, &page.rows));
        }

        if let Some(total) = page.total_rows.as_deref().and_then(|t| t.parse::<usize>().ok()) {
            if total != rows.len() {
                warn!("Warehouse reported {} rows but {} were read", total, rows.len());
            }
        }
        if rows.is_empty() {
            warn!("No reviews found for date range {}", range);
        }

        info!("Retrieved {} reviews", rows.len());
        Ok(rows)
    }

    fn describe(&self) -> String {
        format!("BigQuery table {}", self.table_id())
    }
}
