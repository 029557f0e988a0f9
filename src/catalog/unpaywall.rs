//! Unpaywall catalog source: gzip-compressed, one JSON object per line
//! (spec §4.1 "Unpaywall mode").

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use serde_json::Value;
use uuid::Uuid;

use super::sampling::{count_lines, Sampler};
use super::{CatalogError, CatalogSource, FetchItem};
use crate::models::Entry;
use crate::store::PersistentStore;

pub struct UnpaywallSource {
    lines: std::io::Lines<BufReader<GzDecoder<File>>>,
    sampler: Option<Sampler>,
    line_index: usize,
}

impl UnpaywallSource {
    pub fn open(path: &Path, sample: Option<usize>) -> Result<Self, CatalogError> {
        let sampler = match sample {
            Some(k) => {
                let count_file = File::open(path)?;
                let total = count_lines(GzDecoder::new(count_file))?;
                Some(Sampler::new(total, k))
            }
            None => None,
        };

        let file = File::open(path)?;
        let reader = BufReader::new(GzDecoder::new(file));
        Ok(Self {
            lines: reader.lines(),
            sampler,
            line_index: 0,
        })
    }
}

impl CatalogSource for UnpaywallSource {
    fn next_item(&mut self, store: &PersistentStore) -> Result<Option<FetchItem>, CatalogError> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line?,
                None => return Ok(None),
            };

            let idx = self.line_index;
            self.line_index += 1;

            if let Some(sampler) = &self.sampler {
                if !sampler.wants(idx) {
                    continue;
                }
            }

            if line.trim().is_empty() {
                continue;
            }

            let raw: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(line = idx, "skipping malformed Unpaywall line");
                    continue;
                }
            };

            let obj = match raw {
                Value::Object(o) => o,
                _ => continue,
            };

            let doi = match obj.get("doi").and_then(|v| v.as_str()) {
                Some(d) => d.to_string(),
                None => continue,
            };

            if store.get_id_by_doi(&doi)?.is_some() {
                continue;
            }

            let url_for_pdf = match obj.get("best_oa_location") {
                Some(Value::Object(loc)) => loc
                    .get("url_for_pdf")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                _ => None,
            };
            let url_for_pdf = match url_for_pdf {
                Some(u) => u,
                None => continue,
            };

            let id = Uuid::new_v4().to_string();
            let destination = store.data_path().join(format!("{id}.pdf"));
            let entry = Entry::from_unpaywall_object(id, doi, url_for_pdf.clone(), obj);

            return Ok(Some(FetchItem {
                url: url_for_pdf,
                destination,
                entry,
            }));
        }
    }
}
