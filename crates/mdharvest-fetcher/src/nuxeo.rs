//! Nuxeo document-repository fetcher.
//!
//! Walks a folder tree depth-first via the REST `@children` listing.
//! Folderish children are descended into, never yielded; leaf documents
//! are fetched individually by uid so the response carries the full
//! property set requested through the `X-NXDocumentProperties` header.

use std::collections::VecDeque;
use std::sync::Arc;

use mdharvest_core::{FetchError, Record, Transport, get_with_retry};
use serde_json::Value;

use crate::Fetcher;

/// Property schemas requested for every document fetch.
pub const DEFAULT_DOCUMENT_PROPERTIES: &str = "dublincore,ucldc_schema,picture";

/// Schemas the UCLDC variant refuses to run without.
const REQUIRED_SCHEMAS: [&str; 3] = ["dublincore", "ucldc_schema", "picture"];

const OBJSET_SIZE: usize = 100;

pub struct NuxeoFetcher {
    transport: Arc<dyn Transport>,
    api_base: String,
    headers: Vec<(String, String)>,
    /// DFS stack of folder paths still to list.
    folders: Vec<String>,
    /// Uids of leaf documents listed but not yet fetched.
    pending_docs: VecDeque<String>,
    done: bool,
}

impl NuxeoFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        url_harvest: &str,
        path: &str,
        properties: &str,
    ) -> Self {
        let api_base = format!("{}/", url_harvest.trim_end_matches('/'));
        let headers = vec![
            ("X-NXDocumentProperties".to_string(), properties.to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ];
        Self {
            transport,
            api_base,
            headers,
            folders: vec![path.trim_matches('/').to_string()],
            pending_docs: VecDeque::new(),
            done: false,
        }
    }

    /// List every page of a folder's children, queueing leaf documents
    /// and pushing subfolders for descent.
    fn list_folder(&mut self, path: &str) -> Result<(), FetchError> {
        let url_children = format!("{}path/{}/@children", self.api_base, path);
        let mut page = 0u64;
        loop {
            let url = if page == 0 {
                url_children.clone()
            } else {
                format!("{url_children}?currentPageIndex={page}")
            };
            let body = get_with_retry(self.transport.as_ref(), &url, &self.headers)?;
            let listing: Value = serde_json::from_str(&body)
                .map_err(|e| FetchError::Decode(format!("Nuxeo children listing: {e}")))?;

            let entries = listing
                .get("entries")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    FetchError::Protocol(format!("Nuxeo listing for {path} has no entries"))
                })?;
            for entry in entries {
                if is_folderish(entry) {
                    if let Some(child_path) = entry.get("path").and_then(Value::as_str) {
                        self.folders.push(child_path.trim_matches('/').to_string());
                    }
                } else if let Some(uid) = entry.get("uid").and_then(Value::as_str) {
                    self.pending_docs.push_back(uid.to_string());
                }
            }

            if listing
                .get("isNextPageAvailable")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                page += 1;
            } else {
                return Ok(());
            }
        }
    }

    fn fetch_doc(&self, uid: &str) -> Result<Record, FetchError> {
        let url = format!("{}id/{}", self.api_base, uid);
        let body = get_with_retry(self.transport.as_ref(), &url, &self.headers)?;
        let doc: Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Decode(format!("Nuxeo document {uid}: {e}")))?;
        match doc {
            Value::Object(map) => Ok(map),
            other => Err(FetchError::Protocol(format!(
                "Nuxeo document {uid} is not an object: {other}"
            ))),
        }
    }
}

impl Fetcher for NuxeoFetcher {
    fn next_record(&mut self) -> Result<Option<Record>, FetchError> {
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(uid) = self.pending_docs.pop_front() {
                return Ok(Some(self.fetch_doc(&uid)?));
            }
            match self.folders.pop() {
                Some(path) => self.list_folder(&path)?,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }

    fn next_objset(&mut self) -> Result<Option<Vec<Record>>, FetchError> {
        let mut objset = Vec::new();
        while objset.len() < OBJSET_SIZE {
            match self.next_record()? {
                Some(rec) => objset.push(rec),
                None => break,
            }
        }
        if objset.is_empty() {
            return Ok(None);
        }
        Ok(Some(objset))
    }
}

/// Nuxeo variant that refuses to start unless the property header
/// requests every schema the downstream mapping depends on.
pub struct UcldcNuxeoFetcher {
    inner: NuxeoFetcher,
}

impl std::fmt::Debug for UcldcNuxeoFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UcldcNuxeoFetcher").finish_non_exhaustive()
    }
}

impl UcldcNuxeoFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        url_harvest: &str,
        path: &str,
        properties: &str,
    ) -> Result<Self, FetchError> {
        let requested: Vec<&str> = properties.split(',').map(str::trim).collect();
        for schema in REQUIRED_SCHEMAS {
            if !requested.contains(&schema) {
                return Err(FetchError::Config(format!(
                    "X-NXDocumentProperties must include {schema} (got {properties:?})"
                )));
            }
        }
        Ok(Self {
            inner: NuxeoFetcher::new(transport, url_harvest, path, properties),
        })
    }
}

impl Fetcher for UcldcNuxeoFetcher {
    fn next_record(&mut self) -> Result<Option<Record>, FetchError> {
        self.inner.next_record()
    }

    fn next_objset(&mut self) -> Result<Option<Vec<Record>>, FetchError> {
        self.inner.next_objset()
    }
}

fn is_folderish(entry: &Value) -> bool {
    if let Some(facets) = entry.get("facets").and_then(Value::as_array) {
        if facets.iter().any(|f| f == "Folderish") {
            return true;
        }
    }
    entry.get("type").and_then(Value::as_str) == Some("Folder")
}
