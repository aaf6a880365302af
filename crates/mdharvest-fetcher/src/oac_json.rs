//! OAC JSON search-API fetcher.
//!
//! Derives the findaid ARK from the harvest URL, queries the search
//! endpoint in JSON mode, and pages with `startDoc = objset_end + 1`
//! until `objset_end` reaches `objset_total`.

use std::collections::VecDeque;
use std::sync::Arc;

use mdharvest_core::{FetchError, Record, Transport, get_with_retry};
use serde_json::Value;

use crate::Fetcher;

const OAC_JSON_SEARCH_BASE: &str = "http://dsc.cdlib.org/search?rmode=json&facet=type-tab&style=cui&relation=";

pub struct OacJsonFetcher {
    transport: Arc<dyn Transport>,
    url_start: String,
    buf: VecDeque<Record>,
    end: u64,
    total: u64,
    started: bool,
    done: bool,
}

impl OacJsonFetcher {
    pub fn new(transport: Arc<dyn Transport>, url_harvest: &str) -> Result<Self, FetchError> {
        let url_start = if url_harvest.contains("relation=") {
            url_harvest.to_string()
        } else {
            let ark = parse_findaid_ark(url_harvest)?;
            format!("{OAC_JSON_SEARCH_BASE}{ark}")
        };
        Ok(Self {
            transport,
            url_start,
            buf: VecDeque::new(),
            end: 0,
            total: 0,
            started: false,
            done: false,
        })
    }

    fn fetch_page(&mut self) -> Result<(), FetchError> {
        let url = if self.started {
            format!("{}&startDoc={}", self.url_start, self.end + 1)
        } else {
            self.url_start.clone()
        };
        let headers = [("content-type".to_string(), "application/json".to_string())];
        let body = get_with_retry(self.transport.as_ref(), &url, &headers)?;
        let resp: Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Decode(format!("OAC JSON response: {e}")))?;

        if !self.started {
            self.total = field_u64(&resp, "objset_total")?;
            self.started = true;
        }
        self.end = field_u64(&resp, "objset_end")?;

        let objset = resp
            .get("objset")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::Protocol("OAC JSON response missing objset".to_string()))?;
        for entry in objset {
            // the record proper lives under the qdc key when present
            let rec = entry.get("qdc").unwrap_or(entry);
            match rec {
                Value::Object(map) => self.buf.push_back(map.clone()),
                other => {
                    return Err(FetchError::Protocol(format!(
                        "OAC JSON objset entry is not an object: {other}"
                    )));
                }
            }
        }
        // an empty page with records still owed would loop on the same
        // startDoc forever
        if objset.is_empty() && self.end < self.total {
            return Err(FetchError::Protocol(format!(
                "OAC JSON returned an empty objset at {} of {}",
                self.end, self.total
            )));
        }
        Ok(())
    }

    fn refill(&mut self) -> Result<(), FetchError> {
        while self.buf.is_empty() && !self.done {
            if self.started && self.end >= self.total {
                self.done = true;
                return Ok(());
            }
            self.fetch_page()?;
        }
        Ok(())
    }
}

impl Fetcher for OacJsonFetcher {
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

/// Extract the findaid ARK from a finding-aid URL and re-prefix it.
fn parse_findaid_ark(url_harvest: &str) -> Result<String, FetchError> {
    match url_harvest.split_once("findaid/ark:") {
        Some((_, tail)) => Ok(format!("ark:{tail}")),
        None => Err(FetchError::Config(format!(
            "no findaid ARK in harvest URL {url_harvest}"
        ))),
    }
}

fn field_u64(resp: &Value, key: &str) -> Result<u64, FetchError> {
    resp.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| FetchError::Protocol(format!("OAC JSON response missing {key}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::testutil::SeqTransport;

    fn page(start: u64, end: u64, total: u64) -> String {
        let objset: Vec<Value> = (start..=end)
            .map(|i| json!({"qdc": {"title": format!("item {i}"), "identifier": [format!("ark:/13030/item{i}")]}}))
            .collect();
        json!({
            "objset_total": total,
            "objset_start": start,
            "objset_end": end,
            "objset": objset,
        })
        .to_string()
    }

    #[test]
    fn parses_findaid_ark() {
        assert_eq!(
            parse_findaid_ark("http://www.oac.cdlib.org/findaid/ark:/13030/tf2v19n928").unwrap(),
            "ark:/13030/tf2v19n928"
        );
        assert!(matches!(
            parse_findaid_ark("http://www.oac.cdlib.org/nothing-here"),
            Err(FetchError::Config(_))
        ));
    }

    #[test]
    fn findaid_url_becomes_search_url() {
        let transport = Arc::new(SeqTransport::new(&[&page(1, 2, 2)]));
        let mut fetcher = OacJsonFetcher::new(
            transport.clone(),
            "http://www.oac.cdlib.org/findaid/ark:/13030/tf2v19n928",
        )
        .unwrap();
        fetcher.next_record().unwrap().unwrap();
        assert_eq!(
            transport.requests.borrow()[0],
            "http://dsc.cdlib.org/search?rmode=json&facet=type-tab&style=cui&relation=ark:/13030/tf2v19n928"
        );
    }

    #[test]
    fn pages_with_start_doc_until_total() {
        let transport = Arc::new(SeqTransport::new(&[&page(1, 25, 28), &page(26, 28, 28)]));
        let mut fetcher = OacJsonFetcher::new(
            transport.clone(),
            "http://www.oac.cdlib.org/findaid/ark:/13030/hb5d5nb7dj",
        )
        .unwrap();

        let mut count = 0;
        while let Some(rec) = fetcher.next_record().unwrap() {
            assert!(rec.contains_key("title"));
            count += 1;
        }
        assert_eq!(count, 28);
        assert_eq!(transport.request_count(), 2);
        assert!(transport.requests.borrow()[1].ends_with("&startDoc=26"));
        // fused after exhaustion, no extra requests
        assert!(fetcher.next_record().unwrap().is_none());
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn records_come_in_source_order() {
        let transport = Arc::new(SeqTransport::new(&[&page(1, 3, 3)]));
        let mut fetcher = OacJsonFetcher::new(
            transport,
            "http://www.oac.cdlib.org/findaid/ark:/13030/hb5d5nb7dj",
        )
        .unwrap();
        let first = fetcher.next_record().unwrap().unwrap();
        assert_eq!(first["title"], "item 1");
        let second = fetcher.next_record().unwrap().unwrap();
        assert_eq!(second["title"], "item 2");
    }

    #[test]
    fn next_objset_yields_full_pages() {
        let transport = Arc::new(SeqTransport::new(&[&page(1, 25, 28), &page(26, 28, 28)]));
        let mut fetcher = OacJsonFetcher::new(
            transport,
            "http://www.oac.cdlib.org/findaid/ark:/13030/hb5d5nb7dj",
        )
        .unwrap();
        assert_eq!(fetcher.next_objset().unwrap().unwrap().len(), 25);
        assert_eq!(fetcher.next_objset().unwrap().unwrap().len(), 3);
        assert!(fetcher.next_objset().unwrap().is_none());
    }

    #[test]
    fn empty_page_with_records_remaining_is_protocol_error() {
        let body = json!({
            "objset_total": 10,
            "objset_start": 1,
            "objset_end": 0,
            "objset": [],
        })
        .to_string();
        let transport = Arc::new(SeqTransport::new(&[&body]));
        let mut fetcher = OacJsonFetcher::new(
            transport.clone(),
            "http://www.oac.cdlib.org/findaid/ark:/13030/hb5d5nb7dj",
        )
        .unwrap();
        assert!(matches!(
            fetcher.next_record(),
            Err(FetchError::Protocol(_))
        ));
        // the bad page was requested once, not retried
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn search_url_used_verbatim() {
        let url = "http://dsc.cdlib.org/search?rmode=json&facet=type-tab&style=cui&relation=ark:/13030/hb5d5nb7dj";
        let transport = Arc::new(SeqTransport::new(&[&page(1, 1, 1)]));
        let mut fetcher = OacJsonFetcher::new(transport.clone(), url).unwrap();
        fetcher.next_record().unwrap().unwrap();
        assert_eq!(transport.requests.borrow()[0], url);
    }
}
