//! OAC XML search-API fetcher.
//!
//! The search endpoint partitions results into independently paginated
//! groups (image, text). The initial response supplies per-group
//! totals; each page request then targets one not-yet-exhausted group
//! with `startDoc=<group.end + 1>&group=<name>`, image group first.
//! The harvest is exhausted once every group's end counter reaches its
//! total.

use std::collections::VecDeque;
use std::sync::Arc;

use mdharvest_core::{FetchError, Record, Transport, attrib_text, get_with_retry, push_field};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Value, json};

use crate::Fetcher;
use crate::xml::{attr, attr_map, local_name, read_text_content, skip_element, xml_err};

const DEFAULT_DOCS_PER_PAGE: usize = 100;

/// Per-group pagination counters. A group is exhausted when
/// `end == total`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct GroupState {
    name: String,
    total: u64,
    start: u64,
    end: u64,
}

pub struct OacXmlFetcher {
    transport: Arc<dyn Transport>,
    url_base: String,
    docs_per_page: usize,
    total_docs: u64,
    groups: Vec<GroupState>,
    buf: VecDeque<Record>,
    done: bool,
}

impl std::fmt::Debug for OacXmlFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OacXmlFetcher").finish_non_exhaustive()
    }
}

impl OacXmlFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        url_harvest: &str,
        page_size: Option<usize>,
    ) -> Result<Self, FetchError> {
        let docs_per_page = page_size.unwrap_or(DEFAULT_DOCS_PER_PAGE);
        let url_initial = format!("{url_harvest}&docsPerPage={docs_per_page}");
        let body = get_with_retry(transport.as_ref(), &url_initial, &[])?;
        let (total_docs, mut groups) = parse_initial(&body)?;
        // image results page out before text results
        groups.sort_by_key(|g| match g.name.as_str() {
            "image" => 0,
            "text" => 1,
            _ => 2,
        });
        log::debug!(
            "OAC XML fetcher: {total_docs} docs across {} groups",
            groups.len()
        );
        Ok(Self {
            transport,
            url_base: url_harvest.to_string(),
            docs_per_page,
            total_docs,
            groups,
            buf: VecDeque::new(),
            done: false,
        })
    }

    /// Total document count reported by the initial search response.
    pub fn total_docs(&self) -> u64 {
        self.total_docs
    }

    /// Request the next page of the first unexhausted group.
    fn fetch_page(&mut self) -> Result<(), FetchError> {
        let Some(idx) = self.groups.iter().position(|g| g.end < g.total) else {
            self.done = true;
            return Ok(());
        };
        let name = self.groups[idx].name.clone();
        let start_doc = self.groups[idx].end + 1;
        let url = format!(
            "{}&docsPerPage={}&startDoc={}&group={}",
            self.url_base, self.docs_per_page, start_doc, name
        );
        let body = get_with_retry(self.transport.as_ref(), &url, &[])?;
        let page = parse_page(&body)?;

        let group = &mut self.groups[idx];
        group.start = start_doc;
        group.end = match page.end_doc {
            Some(end) => end.min(group.total),
            None => (group.end + page.records.len() as u64).min(group.total),
        };
        if page.records.is_empty() && group.end < group.total {
            return Err(FetchError::Protocol(format!(
                "empty page for group {name} at startDoc {start_doc}"
            )));
        }
        self.buf.extend(page.records);
        Ok(())
    }

    fn refill(&mut self) -> Result<(), FetchError> {
        while self.buf.is_empty() && !self.done {
            self.fetch_page()?;
        }
        Ok(())
    }
}

impl Fetcher for OacXmlFetcher {
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

/// Totals from the initial search response: overall document count and
/// one counter set per result group.
fn parse_initial(body: &str) -> Result<(u64, Vec<GroupState>), FetchError> {
    let mut reader = Reader::from_str(body);
    let mut buf = Vec::new();
    let mut total_docs = None;
    let mut groups = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) => match local_name(e.name().as_ref()) {
                b"crossQueryResult" => {
                    total_docs = attr(&e, b"totalDocs").and_then(|v| v.parse::<u64>().ok());
                }
                b"group" => {
                    let name = attr(&e, b"value").ok_or_else(|| {
                        FetchError::Protocol("group element without value attribute".to_string())
                    })?;
                    let total = attr(&e, b"totalDocs")
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0);
                    let start = attr(&e, b"startDoc")
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0);
                    groups.push(GroupState {
                        name,
                        total,
                        start,
                        end: 0,
                    });
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    match total_docs {
        Some(total) => Ok((total, groups)),
        None => Err(FetchError::Config(
            "harvest URL did not return an OAC search result".to_string(),
        )),
    }
}

struct GroupPage {
    records: Vec<Record>,
    end_doc: Option<u64>,
}

fn parse_page(body: &str) -> Result<GroupPage, FetchError> {
    let mut reader = Reader::from_str(body);
    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut end_doc = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"group" => {
                    if end_doc.is_none() {
                        end_doc = attr(&e, b"endDoc").and_then(|v| v.parse::<u64>().ok());
                    }
                }
                b"docHit" => records.push(parse_doc_hit(&mut reader)?),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(GroupPage { records, end_doc })
}

fn parse_doc_hit(reader: &mut Reader<&[u8]>) -> Result<Record, FetchError> {
    let mut buf = Vec::new();
    let mut record = Record::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"meta" => {
                parse_meta(reader, &mut record)?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"docHit" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(record)
}

/// Map one `<meta>` block to record fields: each tag becomes an
/// `{attrib, text}` entry, empty-text tags are dropped, and the image
/// pointer tags keep their dimension attributes as integers.
fn parse_meta(reader: &mut Reader<&[u8]>, record: &mut Record) -> Result<(), FetchError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(f) => {
                let name = String::from_utf8_lossy(local_name(f.name().as_ref())).into_owned();
                match name.as_str() {
                    "reference-image" => {
                        let value = image_value(&f);
                        skip_element(reader, b"reference-image")?;
                        push_field(record, "reference-image", value);
                    }
                    "thumbnail" => {
                        let value = image_value(&f);
                        skip_element(reader, b"thumbnail")?;
                        record.insert("thumbnail".to_string(), value);
                    }
                    "google_analytics_tracking_code" => {
                        skip_element(reader, b"google_analytics_tracking_code")?;
                    }
                    _ => {
                        let attrib = attr_map(&f);
                        let text = read_text_content(reader, name.as_bytes())?;
                        if !text.trim().is_empty() {
                            push_field(record, &name, attrib_text(attrib, &text));
                        }
                    }
                }
            }
            Event::Empty(f) => {
                let name = String::from_utf8_lossy(local_name(f.name().as_ref())).into_owned();
                match name.as_str() {
                    "reference-image" => push_field(record, "reference-image", image_value(&f)),
                    "thumbnail" => {
                        record.insert("thumbnail".to_string(), image_value(&f));
                    }
                    // self-closing metadata tags carry no text, drop them
                    _ => {}
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"meta" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

/// Image pointer with integer dimensions. Non-numeric or blank X/Y
/// values become 0.
fn image_value(e: &BytesStart) -> Value {
    let x = attr(e, b"X")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0);
    let y = attr(e, b"Y")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0);
    let src = attr(e, b"src").unwrap_or_default();
    json!({ "X": x, "Y": y, "src": src })
}
