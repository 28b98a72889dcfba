//! Full-text fetcher: structured API lookup with a public page fallback.
//!
//! The direct lookup calls `GET {direct_base}/documents/{id}` and expects
//! `{"title", "caseNumber", "fullText", "fullTextHtml"}`. A `404` or an empty
//! `fullText` means the API cannot help and the caller falls back to
//! [`DocumentPageClient::fetch_page`], which downloads the public decision
//! page and parses it with [`parse_decision_page`].

use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use themis_core::{AppError, DocumentFetcher, DocumentIdentity, FetchedDocument, HttpConfig};
use tracing::debug;

use crate::http::{ThrottlePolicy, build_client, parse_base_url, send_with_retry};

/// Placeholder substituted with the document identity in page URL templates.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Containers that usually hold the decision body, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    ".decision-text",
    ".document-content",
    "#document",
    "article",
    "main",
    "[role='main']",
    "body",
];

/// Block elements read as paragraphs, headings included so that section
/// markers survive.
const BLOCK_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li, pre";

static LABELLED_CASE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:case|file|docket|reference)\s*(?:no\b\.?|number\b|nr\b\.?|#)\s*[:.]?\s*([A-Z0-9][A-Z0-9./\-]*[A-Z0-9])")
        .expect("hardcoded regex pattern is valid")
});

static BARE_CASE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,6}/\d{4}(?:[-/][A-Za-z0-9]+)?)\b")
        .expect("hardcoded regex pattern is valid")
});

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DirectDocument {
    title: Option<String>,
    case_number: Option<String>,
    full_text: Option<String>,
    full_text_html: Option<String>,
}

/// Fetches full text for single documents.
#[derive(Clone, Debug)]
pub struct DocumentPageClient {
    client: Client,
    page_url_template: String,
    direct_base: Option<Url>,
    api_key: Option<String>,
    http: HttpConfig,
}

impl DocumentPageClient {
    /// Creates a page-only fetcher.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the template has no `{id}`
    /// placeholder and `AppError::InvalidUrl` if it does not form a URL.
    pub fn new(page_url_template: &str) -> Result<Self, AppError> {
        Self::with_http_config(page_url_template, HttpConfig::default())
    }

    pub fn with_http_config(page_url_template: &str, http: HttpConfig) -> Result<Self, AppError> {
        if !page_url_template.contains(ID_PLACEHOLDER) {
            return Err(AppError::ConfigError(format!(
                "page URL template '{}' has no {} placeholder",
                page_url_template, ID_PLACEHOLDER
            )));
        }
        let sample = page_url_template.replace(ID_PLACEHOLDER, "sample");
        Url::parse(&sample).map_err(|_| AppError::InvalidUrl(page_url_template.to_string()))?;

        Ok(Self {
            client: build_client(&http)?,
            page_url_template: page_url_template.to_string(),
            direct_base: None,
            api_key: None,
            http,
        })
    }

    /// Enables the structured full-text API rooted at `base_url`.
    pub fn with_direct_base(mut self, base_url: &str) -> Result<Self, AppError> {
        self.direct_base = Some(parse_base_url(base_url)?);
        Ok(self)
    }

    /// Bearer key for the structured API; never sent to public pages.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn has_direct_lookup(&self) -> bool {
        self.direct_base.is_some()
    }

    /// Public page URL of a document.
    pub fn page_url(&self, id: &DocumentIdentity) -> Result<Url, AppError> {
        let encoded: String = url::form_urlencoded::byte_serialize(id.as_str().as_bytes()).collect();
        let raw = self.page_url_template.replace(ID_PLACEHOLDER, &encoded);
        Url::parse(&raw).map_err(|_| AppError::InvalidUrl(raw))
    }

    fn direct_url(&self, base: &Url, id: &DocumentIdentity) -> Result<Url, AppError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::InvalidUrl(base.to_string()))?
            .pop_if_empty()
            .push("documents")
            .push(id.as_str());
        Ok(url)
    }
}

impl DocumentFetcher for DocumentPageClient {
    async fn fetch_direct(
        &self,
        id: &DocumentIdentity,
    ) -> Result<Option<FetchedDocument>, AppError> {
        let Some(base) = &self.direct_base else {
            return Ok(None);
        };
        let url = self.direct_url(base, id)?;

        let resp = match send_with_retry(&self.http, ThrottlePolicy::Retry, &url, || {
            let request = self.client.get(url.clone());
            match &self.api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            }
        })
        .await
        {
            Ok(resp) => resp,
            Err(AppError::DocumentNotFound(_)) => {
                debug!(doc_id = %id, "Direct lookup has no such document");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let direct: DirectDocument = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(format!("Invalid document response: {}", e)))?;

        let paragraphs = split_paragraphs(direct.full_text.as_deref().unwrap_or_default());
        if paragraphs.is_empty() {
            debug!(doc_id = %id, "Direct lookup returned no text");
            return Ok(None);
        }

        Ok(Some(FetchedDocument {
            title: direct.title.filter(|t| !t.trim().is_empty()),
            case_number: direct
                .case_number
                .filter(|c| !c.trim().is_empty())
                .or_else(|| find_case_number(&paragraphs.join("\n"))),
            paragraphs,
            html: direct.full_text_html,
            source_url: Some(url.to_string()),
        }))
    }

    async fn fetch_page(&self, id: &DocumentIdentity) -> Result<FetchedDocument, AppError> {
        let url = self.page_url(id)?;
        let resp = send_with_retry(&self.http, ThrottlePolicy::Retry, &url, || {
            self.client.get(url.clone())
        })
        .await?;

        let body = resp
            .text()
            .await
            .map_err(|e| AppError::ClientError(format!("Failed to read page body: {}", e)))?;

        parse_decision_page(&body, url.as_str())
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    text.lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::ParseError(format!("invalid selector '{}': {:?}", css, e)))
}

fn element_text(element: &ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Finds a case number in free text, preferring labelled occurrences.
pub fn find_case_number(text: &str) -> Option<String> {
    LABELLED_CASE_NUMBER
        .captures(text)
        .or_else(|| BARE_CASE_NUMBER.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parses a public decision page into paragraphs, title, case number and the
/// raw HTML of its content container.
///
/// # Errors
///
/// Returns `AppError::ParseError` when the page holds no readable text.
pub fn parse_decision_page(html: &str, source_url: &str) -> Result<FetchedDocument, AppError> {
    let document = Html::parse_document(html);

    let mut container = None;
    for css in CONTENT_SELECTORS {
        let sel = selector(css)?;
        if let Some(found) = document.select(&sel).find(|el| !element_text(el).is_empty()) {
            container = Some(found);
            break;
        }
    }
    let container = container
        .ok_or_else(|| AppError::ParseError(format!("no content found on {}", source_url)))?;

    let blocks = selector(BLOCK_SELECTOR)?;
    let mut paragraphs: Vec<String> = container
        .select(&blocks)
        // Skip blocks nested in another block (e.g. <p> inside <li>).
        .filter(|el| {
            !el.ancestors()
                .filter_map(ElementRef::wrap)
                .take_while(|a| a.id() != container.id())
                .any(|a| blocks.matches(&a))
        })
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .collect();

    if paragraphs.is_empty() {
        paragraphs = container
            .text()
            .flat_map(str::lines)
            .map(normalize_whitespace)
            .filter(|t| !t.is_empty())
            .collect();
    }
    if paragraphs.is_empty() {
        return Err(AppError::ParseError(format!(
            "no text found on {}",
            source_url
        )));
    }

    let title = selector("h1")
        .ok()
        .and_then(|sel| document.select(&sel).next().map(|el| element_text(&el)))
        .filter(|t| !t.is_empty())
        .or_else(|| {
            selector("title")
                .ok()
                .and_then(|sel| document.select(&sel).next().map(|el| element_text(&el)))
                .filter(|t| !t.is_empty())
        });

    let case_number = find_case_number(&paragraphs.join("\n"));

    Ok(FetchedDocument {
        title,
        case_number,
        paragraphs,
        html: Some(container.html()),
        source_url: Some(source_url.to_string()),
    })
}
