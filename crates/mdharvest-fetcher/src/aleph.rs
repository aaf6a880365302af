//! Aleph SRU MARCXML fetcher.
//!
//! Numeric offset pagination: each page request appends
//! `maximumRecords`/`startRecord` to the harvest URL. The first
//! response reports the total record count; subsequent requests step
//! `startRecord` by the page size until the total is covered.

use std::collections::VecDeque;
use std::sync::Arc;

use mdharvest_core::{FetchError, Record, Transport, get_with_retry};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Value, json};

use crate::Fetcher;
use crate::xml::{attr, local_name, read_text_content, xml_err};

const DEFAULT_PAGE_SIZE: usize = 500;

pub struct AlephMarcXmlFetcher {
    transport: Arc<dyn Transport>,
    url_base: String,
    page_size: usize,
    total: u64,
    next_start: u64,
    buf: VecDeque<Record>,
    done: bool,
}

impl AlephMarcXmlFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        url_harvest: &str,
        page_size: Option<usize>,
    ) -> Result<Self, FetchError> {
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let url = page_url(url_harvest, page_size, 1);
        let body = get_with_retry(transport.as_ref(), &url, &[])?;
        let page = parse_sru(&body)?;
        let total = page.total.ok_or_else(|| {
            FetchError::Protocol("SRU response missing numberOfRecords".to_string())
        })?;
        Ok(Self {
            transport,
            url_base: url_harvest.to_string(),
            page_size,
            total,
            next_start: 1 + page_size as u64,
            buf: page.records.into(),
            done: false,
        })
    }

    /// Record count reported by the endpoint.
    pub fn total_records(&self) -> u64 {
        self.total
    }

    fn refill(&mut self) -> Result<(), FetchError> {
        while self.buf.is_empty() && !self.done {
            if self.next_start > self.total {
                self.done = true;
                return Ok(());
            }
            let url = page_url(&self.url_base, self.page_size, self.next_start);
            let body = get_with_retry(self.transport.as_ref(), &url, &[])?;
            let page = parse_sru(&body)?;
            if page.records.is_empty() {
                return Err(FetchError::Protocol(format!(
                    "empty SRU page at startRecord {}",
                    self.next_start
                )));
            }
            self.next_start += self.page_size as u64;
            self.buf.extend(page.records);
        }
        Ok(())
    }
}

impl Fetcher for AlephMarcXmlFetcher {
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

fn page_url(base: &str, page_size: usize, start: u64) -> String {
    format!("{base}&maximumRecords={page_size}&startRecord={start}")
}

struct SruPage {
    total: Option<u64>,
    records: Vec<Record>,
}

/// Parse an SRU searchRetrieve response. MARC records live inside
/// `recordData` wrappers; the outer `zs:record` elements share the same
/// local name, so only `record` starts seen inside `recordData` are
/// parsed as MARC.
fn parse_sru(body: &str) -> Result<SruPage, FetchError> {
    let mut reader = Reader::from_str(body);
    let mut buf = Vec::new();
    let mut total = None;
    let mut records = Vec::new();
    let mut in_record_data = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"numberOfRecords" => {
                    let text = read_text_content(&mut reader, b"numberOfRecords")?;
                    total = text.trim().parse::<u64>().ok();
                }
                b"recordData" => in_record_data = true,
                b"record" if in_record_data => {
                    records.push(parse_marc_record(&mut reader)?);
                }
                _ => {}
            },
            Event::End(e) if local_name(e.name().as_ref()) == b"recordData" => {
                in_record_data = false;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(SruPage { total, records })
}

/// Map one MARCXML `<record>` into the normalized `{leader, fields}`
/// shape: control fields as `{tag: value}`, data fields as
/// `{tag: {ind1, ind2, subfields}}`.
fn parse_marc_record(reader: &mut Reader<&[u8]>) -> Result<Record, FetchError> {
    let mut buf = Vec::new();
    let mut leader = String::new();
    let mut fields = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"leader" => leader = read_text_content(reader, b"leader")?,
                b"controlfield" => {
                    let tag = attr(&e, b"tag").unwrap_or_default();
                    let value = read_text_content(reader, b"controlfield")?;
                    fields.push(json!({ tag: value }));
                }
                b"datafield" => {
                    let tag = attr(&e, b"tag").unwrap_or_default();
                    let ind1 = attr(&e, b"ind1").unwrap_or_default();
                    let ind2 = attr(&e, b"ind2").unwrap_or_default();
                    let subfields = parse_subfields(reader)?;
                    fields.push(json!({
                        tag: { "ind1": ind1, "ind2": ind2, "subfields": subfields }
                    }));
                }
                _ => {}
            },
            Event::End(e) if local_name(e.name().as_ref()) == b"record" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut record = Record::new();
    record.insert("leader".to_string(), Value::String(leader));
    record.insert("fields".to_string(), Value::Array(fields));
    Ok(record)
}

fn parse_subfields(reader: &mut Reader<&[u8]>) -> Result<Vec<Value>, FetchError> {
    let mut buf = Vec::new();
    let mut subfields = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"subfield" => {
                let code = attr(&e, b"code").unwrap_or_default();
                let value = read_text_content(reader, b"subfield")?;
                subfields.push(json!({ code: value }));
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"datafield" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(subfields)
}
