//! Harvest loop.
//!
//! Drives one fetcher to exhaustion: validates each record, attaches
//! collection context, synthesizes a unique id, and hands objsets of
//! valid records to the sink. Record-level failures are logged and
//! skipped; only fetcher and configuration errors abort the run.

use std::sync::Arc;

use anyhow::{Context, bail};
use mdharvest_core::{Record, Transport, first_text};
use serde_json::{Value, json};

use crate::registry::Collection;
use crate::sink::RecordSink;
use crate::{Fetcher, FetcherOptions, build_fetcher};

const VALID_CAMPUSES: [&str; 11] = [
    "UCB", "UCD", "UCI", "UCLA", "UCM", "UCR", "UCSB", "UCSC", "UCSD", "UCSF", "UCDL",
];

/// Progress log throttle: fires every `interval` records, and the
/// interval grows tenfold once the count outpaces it, up to 1000.
struct ProgressLog {
    count: u64,
    interval: u64,
}

impl ProgressLog {
    fn new() -> Self {
        Self {
            count: 0,
            interval: 100,
        }
    }

    /// Count one record; true when a progress line is due.
    fn record(&mut self) -> bool {
        self.count += 1;
        if self.count % self.interval != 0 {
            return false;
        }
        if self.count < 10_000 && self.count >= 10 * self.interval {
            self.interval *= 10;
        }
        true
    }
}

pub struct HarvestController {
    collection: Collection,
    fetcher: Box<dyn Fetcher>,
    sink: Box<dyn RecordSink>,
    id_prefix: String,
}

impl std::fmt::Debug for HarvestController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvestController").finish_non_exhaustive()
    }
}

impl HarvestController {
    pub fn new(
        collection: Collection,
        transport: Arc<dyn Transport>,
        sink: Box<dyn RecordSink>,
        options: &FetcherOptions,
    ) -> anyhow::Result<Self> {
        for campus in collection.campus_slugs() {
            if !VALID_CAMPUSES.contains(&campus) {
                bail!(
                    "campus {campus} is not one of {}",
                    VALID_CAMPUSES.join(", ")
                );
            }
        }
        let harvest_type = collection
            .harvest_type()
            .with_context(|| format!("unknown harvest type {:?}", collection.harvest_type))?;
        let fetcher = build_fetcher(
            harvest_type,
            transport,
            &collection.url_harvest,
            &collection.extra_data,
            options,
        )
        .with_context(|| format!("building {harvest_type} fetcher for {}", collection.url_harvest))?;
        let id_prefix = format!(
            "{}-{}-{}",
            collection.campus_slugs().join("-"),
            collection.repository_names().join("-"),
            collection.name
        );
        Ok(Self {
            collection,
            fetcher,
            sink,
            id_prefix,
        })
    }

    /// Run the harvest to exhaustion. Returns the count of records that
    /// validated and reached the sink.
    pub fn harvest(&mut self) -> anyhow::Result<u64> {
        log::info!(
            "starting harvest for collection {} ({})",
            self.collection.name,
            self.collection.id()
        );
        let mut progress = ProgressLog::new();
        while let Some(objset) = self.fetcher.next_objset()? {
            let mut valid = Vec::with_capacity(objset.len());
            for mut rec in objset {
                match self.prepare_record(&mut rec) {
                    Ok(()) => valid.push(rec),
                    Err(reason) => log::error!("record skipped: {reason}"),
                }
            }
            if valid.is_empty() {
                continue;
            }
            if let Err(e) = self.sink.save_objset(&valid) {
                log::error!("failed to save objset of {} records: {e}", valid.len());
                continue;
            }
            for _ in &valid {
                if progress.record() {
                    log::info!("{} records harvested", progress.count);
                }
            }
        }
        log::info!("{} records harvested", progress.count);
        Ok(progress.count)
    }

    /// Validate one record and attach the collection context. The
    /// error string is the reason the record gets skipped.
    fn prepare_record(&self, rec: &mut Record) -> Result<(), String> {
        let title_ok = record_title(rec).is_some_and(|t| !t.trim().is_empty());
        if !title_ok {
            return Err(format!("record has no title: {}", summarize(rec)));
        }
        let source_id = source_id(rec)
            .ok_or_else(|| format!("record has no identifier: {}", summarize(rec)))?;

        rec.insert(
            "id".to_string(),
            Value::String(format!("{}-{}", self.id_prefix, source_id)),
        );
        rec.insert(
            "collection".to_string(),
            json!([self.collection.context_entry()]),
        );
        rec.insert(
            "collection_name".to_string(),
            Value::String(self.collection.name.clone()),
        );
        rec.insert(
            "campus".to_string(),
            json!(self.collection.campus_slugs()),
        );
        rec.insert(
            "repository".to_string(),
            json!(self.collection.repository_names()),
        );
        Ok(())
    }
}

/// Display title: the title field, or 245$a for MARC-shaped
/// `{leader, fields}` records.
fn record_title(rec: &Record) -> Option<&str> {
    if rec.contains_key("leader") {
        return marc_subfield(rec, "245", "a");
    }
    first_text(rec, "title")
}

/// Source-local identifier: the identifier field, the OAI header id, a
/// Nuxeo uid, or control field 001 for MARC-shaped records.
fn source_id(rec: &Record) -> Option<String> {
    if rec.contains_key("leader") {
        return marc_control_field(rec, "001")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
    }
    if let Some(ident) = first_text(rec, "identifier") {
        return Some(ident.to_string());
    }
    for key in ["id", "uid"] {
        if let Some(Value::String(s)) = rec.get(key) {
            return Some(s.clone());
        }
    }
    None
}

fn marc_subfield<'a>(rec: &'a Record, tag: &str, code: &str) -> Option<&'a str> {
    for field in rec.get("fields")?.as_array()? {
        let Some(Value::Object(data)) = field.get(tag) else {
            continue;
        };
        let Some(Value::Array(subfields)) = data.get("subfields") else {
            continue;
        };
        for subfield in subfields {
            if let Some(Value::String(text)) = subfield.get(code) {
                return Some(text);
            }
        }
    }
    None
}

fn marc_control_field<'a>(rec: &'a Record, tag: &str) -> Option<&'a str> {
    for field in rec.get("fields")?.as_array()? {
        if let Some(Value::String(text)) = field.get(tag) {
            return Some(text);
        }
    }
    None
}

fn summarize(rec: &Record) -> String {
    let keys: Vec<&str> = rec.keys().map(String::as_str).collect();
    format!("fields [{}]", keys.join(", "))
}
