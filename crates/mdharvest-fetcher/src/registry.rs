//! Collection registry client.
//!
//! The registry supplies, per collection, the harvest endpoint and the
//! campus/repository/rights context attached to every record. Only a
//! thin read path lives here: fetch one collection's JSON and expose
//! the fields the harvest needs.

use std::sync::Arc;

use mdharvest_core::{FetchError, Transport, get_with_retry};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::HarvestType;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CampusRef {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RepositoryRef {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

/// One registry collection entry.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Collection {
    #[serde(skip)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    pub harvest_type: String,
    pub url_harvest: String,
    #[serde(default, alias = "harvest_extra_data")]
    pub extra_data: String,
    #[serde(default)]
    pub campus: Vec<CampusRef>,
    #[serde(default)]
    pub repository: Vec<RepositoryRef>,
    #[serde(default)]
    pub rights_statement: Option<String>,
    #[serde(default)]
    pub rights_status: Option<String>,
    #[serde(default)]
    pub dcmi_type: Option<String>,
}

impl Collection {
    /// Fetch and parse a collection from its registry URL.
    pub fn fetch(transport: &Arc<dyn Transport>, url: &str) -> Result<Self, FetchError> {
        let body = get_with_retry(transport.as_ref(), url, &[])?;
        Self::from_json(url, &body)
    }

    pub fn from_json(url: &str, body: &str) -> Result<Self, FetchError> {
        let mut collection: Collection = serde_json::from_str(body)
            .map_err(|e| FetchError::Decode(format!("registry collection {url}: {e}")))?;
        collection.url = url.to_string();
        Ok(collection)
    }

    /// Numeric registry id, the trailing path segment of the URL.
    pub fn id(&self) -> &str {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
    }

    pub fn harvest_type(&self) -> Option<HarvestType> {
        HarvestType::from_name(&self.harvest_type)
    }

    /// Collection context object attached to each harvested record.
    pub fn context_entry(&self) -> Value {
        json!({
            "@id": self.url,
            "id": self.id(),
            "name": self.name,
            "title": self.name,
            "dcmi_type": self.dcmi_type,
            "rights_statement": self.rights_statement,
            "rights_status": self.rights_status,
        })
    }

    pub fn campus_slugs(&self) -> Vec<&str> {
        self.campus
            .iter()
            .map(|c| if c.slug.is_empty() { c.name.as_str() } else { c.slug.as_str() })
            .collect()
    }

    pub fn repository_names(&self) -> Vec<&str> {
        self.repository.iter().map(|r| r.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION_URL: &str = "https://registry.cdlib.org/api/v1/collection/178/";

    fn collection_body() -> String {
        json!({
            "name": "Calisphere - Santa Clara University: Digital Objects",
            "harvest_type": "OAJ",
            "url_harvest": "http://www.oac.cdlib.org/findaid/ark:/13030/tf2v19n928",
            "extra_data": "",
            "campus": [
                {"@id": "https://registry.cdlib.org/api/v1/campus/6/", "name": "UC Santa Barbara", "slug": "UCSB"}
            ],
            "repository": [
                {"@id": "https://registry.cdlib.org/api/v1/repository/22/", "name": "Special Collections", "slug": "special"}
            ],
            "rights_statement": "a sample rights statement",
            "rights_status": "PD",
            "dcmi_type": "I",
        })
        .to_string()
    }

    #[test]
    fn parses_registry_json() {
        let collection = Collection::from_json(COLLECTION_URL, &collection_body()).unwrap();
        assert_eq!(collection.id(), "178");
        assert_eq!(collection.harvest_type(), Some(HarvestType::OacJson));
        assert_eq!(collection.campus_slugs(), vec!["UCSB"]);
        assert_eq!(collection.repository_names(), vec!["Special Collections"]);
        assert_eq!(
            collection.url_harvest,
            "http://www.oac.cdlib.org/findaid/ark:/13030/tf2v19n928"
        );
    }

    #[test]
    fn context_entry_carries_rights_and_ids() {
        let collection = Collection::from_json(COLLECTION_URL, &collection_body()).unwrap();
        let entry = collection.context_entry();
        assert_eq!(entry["@id"], COLLECTION_URL);
        assert_eq!(entry["id"], "178");
        assert_eq!(entry["rights_statement"], "a sample rights statement");
        assert_eq!(entry["rights_status"], "PD");
        assert_eq!(entry["dcmi_type"], "I");
        assert_eq!(entry["title"], entry["name"]);
    }

    #[test]
    fn missing_harvest_fields_fail_to_parse() {
        let err = Collection::from_json(COLLECTION_URL, r#"{"name": "incomplete"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn unknown_harvest_type_maps_to_none() {
        let body = json!({
            "name": "x",
            "harvest_type": "XXX",
            "url_harvest": "http://example.edu/",
        })
        .to_string();
        let collection = Collection::from_json(COLLECTION_URL, &body).unwrap();
        assert!(collection.harvest_type().is_none());
    }
}
