//! Client for the paginated court decision search API.
//!
//! The API takes one keyword and a date window per request:
//!
//! ```json
//! POST {base}/search
//! {
//!     "keyword": "unfair dismissal",
//!     "filters": {"dateFrom": "2023-01-01", "dateTo": "2023-01-31", "jurisdictions": ["civil"]},
//!     "page": 1,
//!     "pageSize": 50,
//!     "orderBy": "date"
//! }
//! ```
//!
//! and answers `{"items": [...], "hasMore": true}`. Every item carries an `id`;
//! the remaining fields are optional.

use chrono::NaiveDate;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use themis_core::{
    AppError, HarvestedDocument, HttpConfig, SearchClient, SearchPage, SearchQuery,
};
use tracing::warn;

use crate::http::{ThrottlePolicy, build_client, parse_base_url, send_with_retry};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    keyword: &'a str,
    filters: SearchFilters<'a>,
    page: u32,
    page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_by: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    justice_kind: Option<&'a str>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchFilters<'a> {
    date_from: NaiveDate,
    date_to: NaiveDate,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    jurisdictions: &'a [String],
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    has_more: Option<bool>,
}

/// Upstream identifiers come as strings or as numbers.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// One search hit as returned by the API.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    id: RawId,
    title: Option<String>,
    date: Option<String>,
    court: Option<String>,
    case_number: Option<String>,
    full_text: Option<String>,
    /// Every other field, kept as document metadata.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Parses `YYYY-MM-DD`, also accepting a trailing time part.
fn parse_decision_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SearchItem {
    fn into_document(self, category: &str) -> HarvestedDocument {
        let mut doc = HarvestedDocument::new(self.id.into_string(), category);
        doc.title = non_empty(self.title);
        doc.decision_date = self.date.as_deref().and_then(parse_decision_date);
        doc.court = non_empty(self.court);
        doc.case_number = non_empty(self.case_number);
        doc.full_text = non_empty(self.full_text);
        if !self.extra.is_empty() {
            doc.metadata = Value::Object(self.extra);
        }
        doc
    }
}

/// HTTP client for the court decision search API.
///
/// # Examples
///
/// ```no_run
/// use themis_client::SearchApiClient;
///
/// # fn example() -> Result<(), themis_core::AppError> {
/// let client = SearchApiClient::new("https://search.example.org/api")?
///     .with_api_key("secret");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SearchApiClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    http: HttpConfig,
}

impl SearchApiClient {
    /// Creates a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the URL is malformed.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        Self::with_http_config(base_url, HttpConfig::default())
    }

    pub fn with_http_config(base_url: &str, http: HttpConfig) -> Result<Self, AppError> {
        let endpoint = parse_base_url(base_url)?
            .join("search")
            .map_err(|_| AppError::InvalidUrl(base_url.to_string()))?;
        let client = build_client(&http)?;
        Ok(Self {
            client,
            endpoint,
            api_key: None,
            http,
        })
    }

    /// Sends `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl SearchClient for SearchApiClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, AppError> {
        let body = SearchRequest {
            keyword: &query.keyword,
            filters: SearchFilters {
                date_from: query.date_from,
                date_to: query.date_to,
                jurisdictions: &query.jurisdictions,
            },
            page: query.page,
            page_size: query.page_size,
            order_by: query.order_by.as_deref(),
            justice_kind: query.justice_kind.as_deref(),
        };

        let resp = send_with_retry(&self.http, ThrottlePolicy::Retry, &self.endpoint, || {
            let request = self.client.post(self.endpoint.clone()).json(&body);
            match &self.api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            }
        })
        .await?;

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(format!("Invalid search response: {}", e)))?;

        let raw_count = parsed.items.len();
        let has_more = parsed.has_more.unwrap_or(raw_count >= query.page_size);

        let mut items = Vec::with_capacity(raw_count);
        for item in parsed.items {
            let doc = item.into_document(&query.category);
            if doc.identity.is_empty() {
                warn!(keyword = %query.keyword, page = query.page, "Search hit without id, skipping");
                continue;
            }
            items.push(doc);
        }

        Ok(SearchPage { items, has_more })
    }
}
