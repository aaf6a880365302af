//! OAI-PMH ListRecords fetcher.
//!
//! Issues `verb=ListRecords&metadataPrefix=oai_dc` with a set selector,
//! then follows `resumptionToken` paging until the token runs out.
//! Records flagged `status="deleted"` in their header are skipped
//! without surfacing to the caller.

use std::collections::VecDeque;
use std::sync::Arc;

use mdharvest_core::{FetchError, Record, Transport, get_with_retry, push_field};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::Value;

use crate::Fetcher;
use crate::xml::{attr, local_name, read_text_content, skip_element, xml_err};

pub struct OaiFetcher {
    transport: Arc<dyn Transport>,
    url: String,
    set_spec: String,
    buf: VecDeque<Record>,
    resumption: Option<String>,
    started: bool,
    done: bool,
}

impl OaiFetcher {
    pub fn new(transport: Arc<dyn Transport>, url_harvest: &str, extra_data: &str) -> Self {
        Self {
            transport,
            url: url_harvest.to_string(),
            set_spec: extra_data.to_string(),
            buf: VecDeque::new(),
            resumption: None,
            started: false,
            done: false,
        }
    }

    /// Fetch pages until the buffer holds at least one non-deleted
    /// record or the feed is exhausted.
    fn refill(&mut self) -> Result<(), FetchError> {
        while self.buf.is_empty() && !self.done {
            let url = if !self.started {
                format!(
                    "{}?verb=ListRecords&metadataPrefix=oai_dc&set={}",
                    self.url, self.set_spec
                )
            } else if let Some(token) = self.resumption.take() {
                format!("{}?verb=ListRecords&resumptionToken={}", self.url, token)
            } else {
                self.done = true;
                return Ok(());
            };
            self.started = true;

            let body = get_with_retry(self.transport.as_ref(), &url, &[])?;
            let page = parse_list_records(&body)?;
            self.resumption = page.resumption_token.filter(|t| !t.is_empty());
            self.buf.extend(page.records);

            if self.resumption.is_none() && self.buf.is_empty() {
                self.done = true;
            }
        }
        Ok(())
    }
}

impl Fetcher for OaiFetcher {
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

struct ListRecordsPage {
    records: Vec<Record>,
    resumption_token: Option<String>,
}

/// Parse one ListRecords response. Deleted records are dropped here so
/// the buffer only ever holds live records.
fn parse_list_records(body: &str) -> Result<ListRecordsPage, FetchError> {
    let mut reader = Reader::from_str(body);
    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut resumption_token = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"record" => {
                    if let Some(rec) = parse_record(&mut reader)? {
                        records.push(rec);
                    }
                }
                b"resumptionToken" => {
                    resumption_token = Some(read_text_content(&mut reader, b"resumptionToken")?);
                }
                b"error" => {
                    let code = attr(&e, b"code").unwrap_or_default();
                    let message = read_text_content(&mut reader, b"error")?;
                    // noRecordsMatch is an empty result set, not a failure
                    if code != "noRecordsMatch" {
                        return Err(FetchError::Protocol(format!(
                            "OAI error {code}: {message}"
                        )));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(ListRecordsPage {
        records,
        resumption_token,
    })
}

/// Parse one `<record>`: header identifier/datestamp plus the Dublin
/// Core fields under `<metadata>`. Returns `None` for deleted records.
fn parse_record(reader: &mut Reader<&[u8]>) -> Result<Option<Record>, FetchError> {
    let mut buf = Vec::new();
    let mut record = Record::new();
    let mut deleted = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"header" => {
                    if attr(&e, b"status").as_deref() == Some("deleted") {
                        deleted = true;
                    }
                    parse_header(reader, &mut record)?;
                }
                b"metadata" => parse_metadata(reader, &mut record)?,
                other => {
                    let end = other.to_vec();
                    skip_element(reader, &end)?;
                }
            },
            Event::End(e) if local_name(e.name().as_ref()) == b"record" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if deleted {
        return Ok(None);
    }
    Ok(Some(record))
}

fn parse_header(reader: &mut Reader<&[u8]>, record: &mut Record) -> Result<(), FetchError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"identifier" => {
                    let ident = read_text_content(reader, b"identifier")?;
                    // strip the repository prefix, keep the local id
                    let id = ident.rsplit_once("ark:/").map_or(ident.as_str(), |(_, id)| id);
                    record.insert("id".to_string(), Value::String(id.to_string()));
                }
                b"datestamp" => {
                    let stamp = read_text_content(reader, b"datestamp")?;
                    record.insert("datestamp".to_string(), Value::String(stamp));
                }
                other => {
                    let end = other.to_vec();
                    skip_element(reader, &end)?;
                }
            },
            Event::End(e) if local_name(e.name().as_ref()) == b"header" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

/// Fields live one level down, inside the `oai_dc:dc` container.
fn parse_metadata(reader: &mut Reader<&[u8]>, record: &mut Record) -> Result<(), FetchError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(container) => {
                let container_name = local_name(container.name().as_ref()).to_vec();
                let mut inner = Vec::new();
                loop {
                    match reader.read_event_into(&mut inner).map_err(xml_err)? {
                        Event::Start(f) => {
                            let field = String::from_utf8_lossy(local_name(f.name().as_ref()))
                                .into_owned();
                            let text = read_text_content(reader, field.as_bytes())?;
                            if !text.trim().is_empty() {
                                push_field(record, &field, Value::String(text));
                            }
                        }
                        Event::End(e) if local_name(e.name().as_ref()) == container_name => break,
                        Event::Eof => break,
                        _ => {}
                    }
                    inner.clear();
                }
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"metadata" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}
