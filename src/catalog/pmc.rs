//! PMC catalog source: tab-separated file list with a date-banner header
//! line (spec §4.1 "PMC mode").

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use uuid::Uuid;

use super::sampling::{count_lines, Sampler};
use super::{CatalogError, CatalogSource, FetchItem};
use crate::models::Entry;
use crate::store::PersistentStore;

pub struct PmcSource {
    lines: std::io::Lines<BufReader<File>>,
    sampler: Option<Sampler>,
    line_index: usize,
    pmc_base: String,
}

impl PmcSource {
    pub fn open(path: &Path, pmc_base: String, sample: Option<usize>) -> Result<Self, CatalogError> {
        let sampler = match sample {
            Some(k) => {
                let count_file = File::open(path)?;
                let total = count_lines(count_file)?;
                Some(Sampler::new(total, k))
            }
            None => None,
        };

        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            sampler,
            line_index: 0,
            pmc_base,
        })
    }
}

impl CatalogSource for PmcSource {
    fn next_item(&mut self, store: &PersistentStore) -> Result<Option<FetchItem>, CatalogError> {
        loop {
            let line = match self.lines.next() {
                Some(line) => line?,
                None => return Ok(None),
            };

            let idx = self.line_index;
            self.line_index += 1;

            // Sampling filter is applied first, the header-skip rule after
            // (spec §4.1's documented edge case: a sampled header line is
            // simply lost, not substituted).
            if let Some(sampler) = &self.sampler {
                if !sampler.wants(idx) {
                    continue;
                }
            }

            if idx == 0 {
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 4 {
                tracing::warn!(line = idx, "skipping malformed PMC line");
                continue;
            }

            let subpath = fields[0];
            let pmcid = fields[2];
            let mut pmid = fields[3];
            if let Some(pos) = pmid.find(':') {
                pmid = &pmid[pos + 1..];
            }

            if pmcid.is_empty() {
                continue;
            }

            if store.get_id_by_doi(pmcid)?.is_some() {
                continue;
            }

            let tar_url = format!("{}{}", self.pmc_base, subpath);
            let id = Uuid::new_v4().to_string();
            let destination = store.data_path().join(format!("{id}.tar.gz"));
            let pmid_opt = if pmid.is_empty() { None } else { Some(pmid.to_string()) };
            let entry = Entry::from_pmc(id, pmcid.to_string(), pmid_opt, tar_url.clone());

            return Ok(Some(FetchItem {
                url: tar_url,
                destination,
                entry,
            }));
        }
    }
}
