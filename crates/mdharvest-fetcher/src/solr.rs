//! Solr-backed fetchers.
//!
//! Three variants over a Solr-compatible query endpoint:
//! [`SolrFetcher`] pages with a classic `start` offset against
//! `numFound`, [`SolrCursorFetcher`] uses the cursorMark API, and
//! [`SolrQueryFetcher`] takes a raw query string that may embed
//! `header=name:value` pairs to be sent as real request headers.

use std::collections::VecDeque;
use std::sync::Arc;

use mdharvest_core::{FetchError, Record, Transport, get_with_retry};
use serde_json::Value;

use crate::Fetcher;

const DEFAULT_ROWS: usize = 100;
const DEFAULT_QUERY_ROWS: usize = 1000;

/// Initial cursorMark for a fresh cursor traversal.
const CURSOR_START: &str = "*";

struct SolrPage {
    docs: Vec<Record>,
    num_found: u64,
    next_cursor: Option<String>,
}

fn parse_response(body: &str) -> Result<SolrPage, FetchError> {
    let resp: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Decode(format!("Solr response: {e}")))?;
    let response = resp
        .get("response")
        .ok_or_else(|| FetchError::Protocol("Solr response missing response block".to_string()))?;
    let num_found = response
        .get("numFound")
        .and_then(Value::as_u64)
        .ok_or_else(|| FetchError::Protocol("Solr response missing numFound".to_string()))?;
    let docs = response
        .get("docs")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Protocol("Solr response missing docs".to_string()))?
        .iter()
        .map(|doc| match doc {
            Value::Object(map) => Ok(map.clone()),
            other => Err(FetchError::Protocol(format!(
                "Solr doc is not an object: {other}"
            ))),
        })
        .collect::<Result<Vec<Record>, FetchError>>()?;
    let next_cursor = resp
        .get("nextCursorMark")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(SolrPage {
        docs,
        num_found,
        next_cursor,
    })
}

/// Classic offset-paged Solr fetcher.
pub struct SolrFetcher {
    transport: Arc<dyn Transport>,
    url: String,
    query: String,
    rows: usize,
    num_found: u64,
    fetched: u64,
    buf: VecDeque<Record>,
    done: bool,
}

impl SolrFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        url_harvest: &str,
        extra_data: &str,
        page_size: Option<usize>,
    ) -> Result<Self, FetchError> {
        let rows = page_size.unwrap_or(DEFAULT_ROWS);
        let url = url_harvest.trim_end_matches('/').to_string();
        let query = extra_data.to_string();
        let first = format!("{url}/select?q={query}&wt=json&rows={rows}&start=0");
        let body = get_with_retry(transport.as_ref(), &first, &[])?;
        let page = parse_response(&body)?;
        let fetched = page.docs.len() as u64;
        Ok(Self {
            transport,
            url,
            query,
            rows,
            num_found: page.num_found,
            fetched,
            buf: page.docs.into(),
            done: false,
        })
    }

    fn refill(&mut self) -> Result<(), FetchError> {
        while self.buf.is_empty() && !self.done {
            if self.fetched >= self.num_found {
                self.done = true;
                return Ok(());
            }
            let url = format!(
                "{}/select?q={}&wt=json&rows={}&start={}",
                self.url, self.query, self.rows, self.fetched
            );
            let body = get_with_retry(self.transport.as_ref(), &url, &[])?;
            let page = parse_response(&body)?;
            if page.docs.is_empty() {
                return Err(FetchError::Protocol(format!(
                    "empty Solr page at start {}",
                    self.fetched
                )));
            }
            self.fetched += page.docs.len() as u64;
            self.buf.extend(page.docs);
        }
        Ok(())
    }
}

impl Fetcher for SolrFetcher {
    fn next_record(&mut self) -> Result<Option<Record>, FetchError> {
        self.refill()?;
        Ok(self.buf.pop_front())
    }

    fn next_objset(&mut self) -> Result<Option<Vec<Record>>, FetchError> {
        self.refill()?;
        if self.buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.buf.drain(..).collect()))
    }
}

/// CursorMark-paged Solr fetcher. A page fetch only happens when the
/// buffer is drained; exhaustion is detected when the response's
/// `nextCursorMark` equals the cursorMark that was sent.
pub struct SolrCursorFetcher {
    transport: Arc<dyn Transport>,
    url: String,
    query: String,
    rows: usize,
    cursor: String,
    buf: VecDeque<Record>,
    done: bool,
}

impl SolrCursorFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        url_harvest: &str,
        extra_data: &str,
        page_size: Option<usize>,
    ) -> Self {
        Self {
            transport,
            url: url_harvest.trim_end_matches('/').to_string(),
            query: extra_data.to_string(),
            rows: page_size.unwrap_or(DEFAULT_ROWS),
            cursor: CURSOR_START.to_string(),
            buf: VecDeque::new(),
            done: false,
        }
    }

    fn refill(&mut self) -> Result<(), FetchError> {
        while self.buf.is_empty() && !self.done {
            // cursoring is only well-defined over a unique-key sort
            let url = format!(
                "{}/query?q={}&sort=id asc&cursorMark={}&wt=json&rows={}",
                self.url, self.query, self.cursor, self.rows
            );
            let body = get_with_retry(self.transport.as_ref(), &url, &[])?;
            let page = parse_response(&body)?;
            let next = page.next_cursor.ok_or_else(|| {
                FetchError::Protocol("Solr cursor response missing nextCursorMark".to_string())
            })?;
            if next == self.cursor || page.docs.is_empty() {
                self.done = true;
            }
            self.cursor = next;
            self.buf.extend(page.docs);
        }
        Ok(())
    }
}

impl Fetcher for SolrCursorFetcher {
    fn next_record(&mut self) -> Result<Option<Record>, FetchError> {
        self.refill()?;
        Ok(self.buf.pop_front())
    }

    fn next_objset(&mut self) -> Result<Option<Vec<Record>>, FetchError> {
        self.refill()?;
        if self.buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.buf.drain(..).collect()))
    }
}

/// Cursor-paged fetcher configured by a raw query string.
///
/// `header=name:value` pairs embedded in the query string are pulled
/// out and sent as request headers; `sort` and `wt` defaults are only
/// appended when the query string does not supply its own.
pub struct SolrQueryFetcher {
    transport: Arc<dyn Transport>,
    url: String,
    query_params: String,
    headers: Vec<(String, String)>,
    has_sort: bool,
    has_wt: bool,
    rows: usize,
    cursor: String,
    buf: VecDeque<Record>,
    done: bool,
}

impl std::fmt::Debug for SolrQueryFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolrQueryFetcher").finish_non_exhaustive()
    }
}

impl SolrQueryFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        url_harvest: &str,
        extra_data: &str,
        page_size: Option<usize>,
    ) -> Result<Self, FetchError> {
        if extra_data.trim().is_empty() {
            return Err(FetchError::Config(
                "Solr query fetcher needs a query string".to_string(),
            ));
        }
        let mut headers = Vec::new();
        let mut params = Vec::new();
        let mut has_sort = false;
        let mut has_wt = false;
        for pair in extra_data.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == "header" {
                let (name, header_value) = value.split_once(':').ok_or_else(|| {
                    FetchError::Config(format!("malformed header parameter {pair:?}"))
                })?;
                headers.push((name.to_string(), header_value.to_string()));
            } else {
                has_sort = has_sort || key == "sort";
                has_wt = has_wt || key == "wt";
                params.push(pair.to_string());
            }
        }
        Ok(Self {
            transport,
            url: url_harvest.to_string(),
            query_params: params.join("&"),
            headers,
            has_sort,
            has_wt,
            rows: page_size.unwrap_or(DEFAULT_QUERY_ROWS),
            cursor: CURSOR_START.to_string(),
            buf: VecDeque::new(),
            done: false,
        })
    }

    /// Request URL for the current cursor position, parameters in
    /// canonical order.
    fn url_request(&self) -> String {
        let mut url = format!(
            "{}?rows={}&cursorMark={}&{}",
            self.url, self.rows, self.cursor, self.query_params
        );
        if !self.has_sort {
            url.push_str("&sort=id asc");
        }
        if !self.has_wt {
            url.push_str("&wt=json");
        }
        url
    }

    fn refill(&mut self) -> Result<(), FetchError> {
        while self.buf.is_empty() && !self.done {
            let url = self.url_request();
            let body = get_with_retry(self.transport.as_ref(), &url, &self.headers)?;
            let page = parse_response(&body)?;
            let next = page.next_cursor.ok_or_else(|| {
                FetchError::Protocol("Solr cursor response missing nextCursorMark".to_string())
            })?;
            if next == self.cursor || page.docs.is_empty() {
                self.done = true;
            }
            self.cursor = next;
            self.buf.extend(page.docs);
        }
        Ok(())
    }
}

impl Fetcher for SolrQueryFetcher {
    fn next_record(&mut self) -> Result<Option<Record>, FetchError> {
        self.refill()?;
        Ok(self.buf.pop_front())
    }

    fn next_objset(&mut self) -> Result<Option<Vec<Record>>, FetchError> {
        self.refill()?;
        if self.buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.buf.drain(..).collect()))
    }
}
