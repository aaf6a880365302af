//! mdharvest Fetcher - Paginated record fetchers for heterogeneous
//! cultural-heritage repositories.
//!
//! Each remote protocol (OAI-PMH, OAC XML/JSON search, Nuxeo, Aleph
//! MARCXML, flat MARC files, Solr) hides its pagination/cursor quirks
//! behind the uniform [`Fetcher`] contract, which the
//! [`controller::HarvestController`] consumes record-by-record.

use std::sync::Arc;

use anyhow::Context;
use mdharvest_core::{FetchError, Record, Transport};

pub mod aleph;
pub mod controller;
pub mod marc;
pub mod nuxeo;
pub mod oac_json;
pub mod oac_xml;
pub mod oai;
pub mod registry;
pub mod sink;
pub mod solr;
mod xml;

#[cfg(test)]
mod testutil;

pub use controller::HarvestController;
pub use registry::Collection;
pub use sink::{ObjsetDirSink, RecordSink, SinkError};

/// Uniform pull contract over one remote source.
///
/// A fetcher is a forward-only, single-pass, stateful sequence: created
/// once per harvest job, not reusable after exhaustion. Both operations
/// signal exhaustion with `Ok(None)`, after which the fetcher stays
/// exhausted (fused).
pub trait Fetcher {
    /// Next normalized record, fetching a new page internally when the
    /// current page buffer is empty.
    fn next_record(&mut self) -> Result<Option<Record>, FetchError>;

    /// Next non-empty page (objset) of records, in source order. Callers
    /// that persist whole pages atomically use this instead of
    /// [`Fetcher::next_record`].
    fn next_objset(&mut self) -> Result<Option<Vec<Record>>, FetchError>;
}

/// Registry harvest-type codes, one per fetcher implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarvestType {
    /// OAI-PMH ListRecords
    Oai,
    /// OAC XML search API (dual image/text groups)
    OacXml,
    /// OAC JSON search API
    OacJson,
    /// Nuxeo document repository
    Nuxeo,
    /// Aleph SRU MARCXML endpoint
    Aleph,
    /// Local MARC21 binary file
    MarcFile,
    /// Solr, classic offset paging
    Solr,
    /// Solr, cursorMark paging
    SolrCursor,
    /// Solr, raw query string with embedded headers
    SolrQuery,
}

impl HarvestType {
    /// Parse a registry harvest-type code.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "OAI" => Some(Self::Oai),
            "OAC" => Some(Self::OacXml),
            "OAJ" => Some(Self::OacJson),
            "NUX" => Some(Self::Nuxeo),
            "ALX" => Some(Self::Aleph),
            "MRC" => Some(Self::MarcFile),
            "SLR" => Some(Self::Solr),
            "SLC" => Some(Self::SolrCursor),
            "SLQ" => Some(Self::SolrQuery),
            _ => None,
        }
    }
}

impl std::fmt::Display for HarvestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Oai => "OAI",
            Self::OacXml => "OAC",
            Self::OacJson => "OAJ",
            Self::Nuxeo => "NUX",
            Self::Aleph => "ALX",
            Self::MarcFile => "MRC",
            Self::Solr => "SLR",
            Self::SolrCursor => "SLC",
            Self::SolrQuery => "SLQ",
        };
        f.write_str(name)
    }
}

/// Construction-time knobs shared across fetchers.
#[derive(Clone, Debug, Default)]
pub struct FetcherOptions {
    /// Page size (rows / docsPerPage / maximumRecords). Each fetcher has
    /// its own default when unset.
    pub page_size: Option<usize>,
    /// Nuxeo `X-NXDocumentProperties` header value.
    pub nuxeo_properties: Option<String>,
}

/// Build the fetcher for a harvest type. Dispatch is a plain lookup:
/// every variant maps to one constructor call.
pub fn build_fetcher(
    harvest_type: HarvestType,
    transport: Arc<dyn Transport>,
    url_harvest: &str,
    extra_data: &str,
    options: &FetcherOptions,
) -> anyhow::Result<Box<dyn Fetcher>> {
    let fetcher: Box<dyn Fetcher> = match harvest_type {
        HarvestType::Oai => Box::new(oai::OaiFetcher::new(transport, url_harvest, extra_data)),
        HarvestType::OacXml => Box::new(
            oac_xml::OacXmlFetcher::new(transport, url_harvest, options.page_size)
                .context("OAC XML fetcher init")?,
        ),
        HarvestType::OacJson => Box::new(
            oac_json::OacJsonFetcher::new(transport, url_harvest)
                .context("OAC JSON fetcher init")?,
        ),
        HarvestType::Nuxeo => {
            let props = options
                .nuxeo_properties
                .as_deref()
                .unwrap_or(nuxeo::DEFAULT_DOCUMENT_PROPERTIES);
            Box::new(
                nuxeo::UcldcNuxeoFetcher::new(transport, url_harvest, extra_data, props)
                    .context("Nuxeo fetcher init")?,
            )
        }
        HarvestType::Aleph => Box::new(
            aleph::AlephMarcXmlFetcher::new(transport, url_harvest, options.page_size)
                .context("Aleph fetcher init")?,
        ),
        HarvestType::MarcFile => {
            Box::new(marc::MarcFileFetcher::new(url_harvest).context("MARC fetcher init")?)
        }
        HarvestType::Solr => Box::new(
            solr::SolrFetcher::new(transport, url_harvest, extra_data, options.page_size)
                .context("Solr fetcher init")?,
        ),
        HarvestType::SolrCursor => Box::new(solr::SolrCursorFetcher::new(
            transport,
            url_harvest,
            extra_data,
            options.page_size,
        )),
        HarvestType::SolrQuery => Box::new(
            solr::SolrQueryFetcher::new(transport, url_harvest, extra_data, options.page_size)
                .context("Solr query fetcher init")?,
        ),
    };
    Ok(fetcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_valid() {
        assert_eq!(HarvestType::from_name("OAI"), Some(HarvestType::Oai));
        assert_eq!(HarvestType::from_name("OAC"), Some(HarvestType::OacXml));
        assert_eq!(HarvestType::from_name("OAJ"), Some(HarvestType::OacJson));
        assert_eq!(HarvestType::from_name("NUX"), Some(HarvestType::Nuxeo));
        assert_eq!(HarvestType::from_name("ALX"), Some(HarvestType::Aleph));
        assert_eq!(HarvestType::from_name("MRC"), Some(HarvestType::MarcFile));
        assert_eq!(HarvestType::from_name("SLR"), Some(HarvestType::Solr));
        assert_eq!(HarvestType::from_name("SLC"), Some(HarvestType::SolrCursor));
        assert_eq!(HarvestType::from_name("SLQ"), Some(HarvestType::SolrQuery));
    }

    #[test]
    fn from_name_invalid() {
        assert_eq!(HarvestType::from_name("oai"), None);
        assert_eq!(HarvestType::from_name("unknown"), None);
        assert_eq!(HarvestType::from_name(""), None);
    }

    #[test]
    fn display_roundtrip() {
        for ht in [
            HarvestType::Oai,
            HarvestType::OacXml,
            HarvestType::OacJson,
            HarvestType::Nuxeo,
            HarvestType::Aleph,
            HarvestType::MarcFile,
            HarvestType::Solr,
            HarvestType::SolrCursor,
            HarvestType::SolrQuery,
        ] {
            assert_eq!(HarvestType::from_name(&ht.to_string()), Some(ht));
        }
    }
}
