//! Uniform sampling of a predetermined line subset (spec §4.1, §9).
//!
//! The source implementation draws `k` indices *with replacement*, which
//! means duplicate draws quietly reduce the effective sample below `k`
//! (spec §9's documented quirk). We instead sample without replacement as
//! spec §9 recommends when strict source-parity isn't required (see
//! DESIGN.md for the Open Question record); every distinct draw lands on
//! a distinct line, so `k` requested lines means `min(k, n)` harvested
//! lines.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Precomputed set of line indices to keep; all other lines are skipped
/// without even being parsed.
pub struct Sampler {
    wanted: HashSet<usize>,
}

impl Sampler {
    /// `total_lines` is the number of lines in the source file (including
    /// any header line, matching the original's raw line count).
    pub fn new(total_lines: usize, k: usize) -> Self {
        if total_lines == 0 || k == 0 {
            return Self {
                wanted: HashSet::new(),
            };
        }
        let k = k.min(total_lines);
        let mut rng = StdRng::from_entropy();
        let indices = rand::seq::index::sample(&mut rng, total_lines, k);
        Self {
            wanted: indices.into_iter().collect(),
        }
    }

    pub fn wants(&self, line_index: usize) -> bool {
        self.wanted.contains(&line_index)
    }

    pub fn len(&self) -> usize {
        self.wanted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wanted.is_empty()
    }
}

/// Count newline bytes by streaming fixed-size chunks through `reader`,
/// mirroring the original's `gz.read(8192*1024)` counting loop instead of
/// buffering the whole decompressed stream in memory.
pub fn count_lines<R: std::io::Read>(mut reader: R) -> std::io::Result<usize> {
    let mut buffer = vec![0u8; 1 << 20];
    let mut count = 0usize;
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        count += bytecount(&buffer[..n]);
    }
    Ok(count)
}

fn bytecount(buf: &[u8]) -> usize {
    buf.iter().filter(|&&b| b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn counts_lines_across_chunk_boundaries() {
        let data = "a\nb\nc\nd\n".repeat(10_000);
        let n = count_lines(Cursor::new(data.as_bytes())).unwrap();
        assert_eq!(n, 40_000);
    }

    #[test]
    fn sampler_respects_k_and_bounds() {
        let sampler = Sampler::new(1000, 5);
        assert_eq!(sampler.len(), 5);
        for idx in sampler.wanted.iter() {
            assert!(*idx < 1000);
        }
    }

    #[test]
    fn sampler_clamps_k_to_total_lines() {
        let sampler = Sampler::new(3, 10);
        assert_eq!(sampler.len(), 3);
    }

    #[test]
    fn sampler_handles_empty_input() {
        let sampler = Sampler::new(0, 5);
        assert!(sampler.is_empty());
    }
}
