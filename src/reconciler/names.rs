// src/reconciler/names.rs

//! Generated child names: `<base>-<5 random chars>`, at most 63 characters.

use std::sync::atomic::{AtomicU64, Ordering};

pub const MAX_NAME_LENGTH: usize = 63;
const RANDOM_LENGTH: usize = 5;
const ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

pub trait NameGenerator: Send + Sync {
    /// Five characters from the suffix alphabet.
    fn suffix(&self) -> String;

    fn restrict_length_with_random_suffix(&self, base: &str) -> String {
        let budget = MAX_NAME_LENGTH - RANDOM_LENGTH - 1;
        let cut = base
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|end| *end <= budget)
            .last()
            .unwrap_or(0);
        format!("{}-{}", &base[..cut], self.suffix())
    }
}

/// Suffixes drawn from v4 UUID bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNameGenerator;

impl NameGenerator for RandomNameGenerator {
    fn suffix(&self) -> String {
        let id = uuid::Uuid::new_v4();
        id.as_bytes()
            .iter()
            .take(RANDOM_LENGTH)
            .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
            .collect()
    }
}

/// Deterministic suffixes `bbbbb`, `bbbbc`, ... for reproducible passes.
#[derive(Debug, Default)]
pub struct SequentialNameGenerator {
    next: AtomicU64,
}

impl SequentialNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameGenerator for SequentialNameGenerator {
    fn suffix(&self) -> String {
        let mut n = self.next.fetch_add(1, Ordering::SeqCst);
        let base = ALPHABET.len() as u64;
        let mut out = [ALPHABET[0]; RANDOM_LENGTH];
        for slot in out.iter_mut().rev() {
            *slot = ALPHABET[(n % base) as usize];
            n /= base;
        }
        out.iter().map(|b| *b as char).collect()
    }
}
