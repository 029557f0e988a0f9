//! Archive extraction for PMC packages: pull the first PDF and every NXML
//! member out of a `.tar.gz`, then delete the archive (spec §4.2 point 3).
//!
//! Members are extracted into a per-entry temp directory first and only
//! then renamed into the data directory, avoiding the basename collisions
//! the original script's direct-rename approach is prone to when an
//! archive holds same-named members in different subdirectories (spec
//! §9's "archive member name conflicts" note).

use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default)]
pub struct ExtractedMembers {
    pub pdf_found: bool,
    pub nxml_found: bool,
}

/// Extracts `<id>.pdf` (first matching member) and `<id>.nxml` (all
/// matching members, last one wins) from `archive_path` into `data_dir`,
/// then removes the archive. A missing PDF is not an error; the caller
/// treats it as a warning-only condition (spec §4.2 point 3).
pub fn extract_archive(
    archive_path: &Path,
    id: &str,
    data_dir: &Path,
) -> Result<ExtractedMembers, ExtractError> {
    let work_dir = tempfile::Builder::new()
        .prefix(&format!("{id}-extract-"))
        .tempdir_in(data_dir)?;

    let mut result = ExtractedMembers::default();

    {
        let file = File::open(archive_path)?;
        let mut archive = Archive::new(GzDecoder::new(file));

        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path()?.to_string_lossy().to_lowercase();

            if !result.pdf_found && name.ends_with(".pdf") {
                let basename = format!("{id}-src.pdf");
                let out_path = work_dir.path().join(&basename);
                entry.unpack(&out_path)?;
                std::fs::rename(&out_path, data_dir.join(format!("{id}.pdf")))?;
                result.pdf_found = true;
                continue;
            }

            if name.ends_with(".nxml") {
                let basename = format!("{id}-src.nxml");
                let out_path = work_dir.path().join(&basename);
                entry.unpack(&out_path)?;
                std::fs::rename(&out_path, data_dir.join(format!("{id}.nxml")))?;
                result.nxml_found = true;
            }
        }
    }

    std::fs::remove_file(archive_path)?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn build_archive(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn extracts_pdf_and_nxml_and_deletes_archive() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("pkg.tar.gz");
        build_archive(
            &archive_path,
            &[
                ("foo/bar.PDF", b"%PDF-fake"),
                ("foo/bar.nxml", b"<article/>"),
            ],
        );

        let result = extract_archive(&archive_path, "abc123", dir.path()).unwrap();
        assert!(result.pdf_found);
        assert!(result.nxml_found);
        assert!(dir.path().join("abc123.pdf").exists());
        assert!(dir.path().join("abc123.nxml").exists());
        assert!(!archive_path.exists());
    }

    #[test]
    fn missing_pdf_is_not_an_error() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("pkg.tar.gz");
        build_archive(&archive_path, &[("foo/bar.nxml", b"<article/>")]);

        let result = extract_archive(&archive_path, "abc456", dir.path()).unwrap();
        assert!(!result.pdf_found);
        assert!(result.nxml_found);
        assert!(!dir.path().join("abc456.pdf").exists());
    }
}
