//! The `Entry` record: one OA resource tracked across the three persistent
//! maps (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The OA location sub-object Unpaywall/PMC entries carry. Only
/// `url_for_pdf` is interpreted by the harvester; any other keys present in
/// the source catalog are preserved in `Entry::extra` rather than here,
/// since they live inside the flattened top-level object in practice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OaLocation {
    pub url_for_pdf: Option<String>,
}

/// A record representing one OA resource, as described in spec §3.
///
/// `extra` captures every catalog field this harvester doesn't interpret,
/// preserved verbatim so a dumped `Entry` round-trips back into a valid
/// synthetic Unpaywall catalog line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Fresh 128-bit UUID assigned at enqueue time, canonical lowercase
    /// dashed string form.
    pub id: String,

    /// Primary external key: the publication DOI (Unpaywall) or the PMCID
    /// reused as the DOI key (PMC).
    pub doi: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,

    pub best_oa_location: OaLocation,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entry {
    /// Build a fresh Entry for an Unpaywall catalog line.
    ///
    /// `raw` is the parsed JSON object for the line; known keys are pulled
    /// out and everything else becomes `extra`.
    pub fn from_unpaywall_object(id: String, doi: String, url_for_pdf: String, mut raw: Map<String, Value>) -> Self {
        raw.remove("doi");
        raw.remove("best_oa_location");
        raw.remove("id");
        raw.remove("pmcid");
        raw.remove("pmid");
        Self {
            id,
            doi,
            pmcid: None,
            pmid: None,
            best_oa_location: OaLocation {
                url_for_pdf: Some(url_for_pdf),
            },
            extra: raw,
        }
    }

    /// Build a fresh Entry for a synthesized PMC catalog line.
    pub fn from_pmc(id: String, pmcid: String, pmid: Option<String>, tar_url: String) -> Self {
        Self {
            id,
            doi: pmcid.clone(),
            pmcid: Some(pmcid),
            pmid,
            best_oa_location: OaLocation {
                url_for_pdf: Some(tar_url),
            },
            extra: Map::new(),
        }
    }

    pub fn url_for_pdf(&self) -> Option<&str> {
        self.best_oa_location.url_for_pdf.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpaywall_entry_preserves_extra_fields() {
        let mut raw = Map::new();
        raw.insert("doi".into(), Value::String("10.1/x".into()));
        raw.insert("title".into(), Value::String("A Paper".into()));
        raw.insert(
            "best_oa_location".into(),
            serde_json::json!({"url_for_pdf": "http://ok/x.pdf"}),
        );

        let entry = Entry::from_unpaywall_object(
            "abc-123".into(),
            "10.1/x".into(),
            "http://ok/x.pdf".into(),
            raw,
        );

        assert_eq!(entry.doi, "10.1/x");
        assert_eq!(entry.url_for_pdf(), Some("http://ok/x.pdf"));
        assert_eq!(
            entry.extra.get("title").and_then(|v| v.as_str()),
            Some("A Paper")
        );
        assert!(!entry.extra.contains_key("doi"));
        assert!(!entry.extra.contains_key("best_oa_location"));
    }

    #[test]
    fn pmc_entry_reuses_pmcid_as_doi() {
        let entry = Entry::from_pmc(
            "abc-123".into(),
            "PMC123".into(),
            Some("456".into()),
            "http://pmc/oa_package/a/b/foo.tar.gz".into(),
        );
        assert_eq!(entry.doi, "PMC123");
        assert_eq!(entry.pmcid.as_deref(), Some("PMC123"));
        assert_eq!(entry.pmid.as_deref(), Some("456"));
    }

    #[test]
    fn round_trips_through_json() {
        let entry = Entry::from_pmc(
            "abc-123".into(),
            "PMC123".into(),
            None,
            "http://pmc/x.tar.gz".into(),
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, entry.id);
        assert_eq!(back.doi, entry.doi);
        assert_eq!(back.url_for_pdf(), entry.url_for_pdf());
    }
}
