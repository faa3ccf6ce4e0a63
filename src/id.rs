//! Deterministic identifier generation.
//!
//! Records without an explicit identifier are named `"{seed}-{n}"`, where the
//! seed is derived from the container path and the split's start offset and
//! `n` counts records within the split. Two splits of one container differ in
//! their start offset; two containers differ in their path. Either way the
//! seeds differ, so generated identifiers never collide within a job.

use sha2::{Digest, Sha256};

/// Per-split sequence of identifiers.
#[derive(Clone, Debug)]
pub struct IdGenerator {
    seed: String,
    next: u64,
}

impl IdGenerator {
    pub fn new(path: &str, split_start: u64) -> Self {
        Self {
            seed: seed_for(path, split_start),
            next: 0,
        }
    }

    /// Generator for one entry inside a zip container.
    pub fn for_entry(path: &str, entry: &str, split_start: u64) -> Self {
        Self::new(&format!("{path}/{entry}"), split_start)
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.seed, self.next);
        self.next += 1;
        id
    }

    /// Number of identifiers handed out so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

fn seed_for(path: &str, split_start: u64) -> String {
    let digest = Sha256::digest(format!("{path}-{split_start}").as_bytes());
    hex::encode(&digest[..8])
}
