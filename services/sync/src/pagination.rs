use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use serde_json::Value;

/// Upper bound on pages per listing; providers are trusted to terminate but
/// a buggy cursor must not spin forever.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// One fetched page: the decoded body and the raw `Link` header, if any.
#[derive(Debug, Clone)]
pub struct Page {
    pub body: Value,
    pub link: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PaginationError {
    #[error("page fetch failed: {0}")]
    Fetch(String),

    #[error("unexpected page body: expected a JSON array or object, got {0}")]
    UnexpectedBody(&'static str),

    #[error("provider repeated next link {0}")]
    RepeatedLink(String),

    #[error("page limit of {0} exceeded")]
    PageLimit(usize),
}

/// Anything that can GET a page by absolute URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<Page, PaginationError>;
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .map(|rels| {
                    rels.trim_matches('"')
                        .split_whitespace()
                        .any(|rel| rel.eq_ignore_ascii_case("next"))
                })
                .unwrap_or(false)
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')?
            .strip_suffix('>')
            .map(str::to_owned)
    })
}

fn page_records(body: Value) -> Result<Vec<Value>, PaginationError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![body]),
        Value::Null => Err(PaginationError::UnexpectedBody("null")),
        Value::Bool(_) => Err(PaginationError::UnexpectedBody("a boolean")),
        Value::Number(_) => Err(PaginationError::UnexpectedBody("a number")),
        Value::String(_) => Err(PaginationError::UnexpectedBody("a string")),
    }
}

/// Forward-only walk over a `Link`-paginated listing.
///
/// Pages are fetched on demand. Once the listing ends or fails, the
/// paginator stays exhausted; start a new one to list again.
pub struct Paginator<'a> {
    source: &'a dyn PageSource,
    next_url: Option<String>,
    seen: HashSet<String>,
    buffered: VecDeque<Value>,
    pages_fetched: usize,
    max_pages: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(source: &'a dyn PageSource, start_url: impl Into<String>) -> Self {
        Self {
            source,
            next_url: Some(start_url.into()),
            seen: HashSet::new(),
            buffered: VecDeque::new(),
            pages_fetched: 0,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    #[cfg(test)]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page of records, or `None` once the listing is done.
    pub async fn next_page(&mut self) -> Option<Result<Vec<Value>, PaginationError>> {
        let url = self.next_url.take()?;

        if self.pages_fetched >= self.max_pages {
            return Some(Err(PaginationError::PageLimit(self.max_pages)));
        }
        if !self.seen.insert(url.clone()) {
            return Some(Err(PaginationError::RepeatedLink(url)));
        }

        let page = match self.source.fetch_page(&url).await {
            Ok(page) => page,
            Err(e) => return Some(Err(e)),
        };
        self.pages_fetched += 1;
        self.next_url = page.link.as_deref().and_then(parse_next_link);

        tracing::debug!(
            url = %url,
            page = self.pages_fetched,
            has_next = self.next_url.is_some(),
            "fetched page"
        );

        match page_records(page.body) {
            Ok(records) => Some(Ok(records)),
            Err(e) => {
                self.next_url = None;
                Some(Err(e))
            }
        }
    }

    /// Next raw record across page boundaries.
    pub async fn next_record(&mut self) -> Option<Result<Value, PaginationError>> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Some(Ok(record));
            }
            match self.next_page().await? {
                Ok(records) => self.buffered.extend(records),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
