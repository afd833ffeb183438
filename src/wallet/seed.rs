//! Seed phrase validation and entry
//!
//! SECURITY: The phrase and the BIP39 seed bytes live in `Zeroizing`
//! buffers and are wiped on drop. Nothing here touches the disk.

use bip39::Mnemonic;
use std::fmt;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

use crate::error::{ShieldError, ShieldResult};
use crate::{log_info, log_warn};

/// Number of failed entries tolerated before the session aborts
pub const MAX_SEED_ATTEMPTS: u32 = 3;

/// Word counts the entry boundary accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedLength {
    Twelve,
    TwentyFour,
}

impl SeedLength {
    pub fn words(&self) -> usize {
        match self {
            SeedLength::Twelve => 12,
            SeedLength::TwentyFour => 24,
        }
    }

    pub fn from_word_count(count: usize) -> Option<Self> {
        match count {
            12 => Some(SeedLength::Twelve),
            24 => Some(SeedLength::TwentyFour),
            _ => None,
        }
    }
}

/// NFKD-normalize, lowercase and collapse whitespace
pub fn normalize_phrase(phrase: &str) -> Zeroizing<String> {
    let normalized: String = phrase.nfkd().collect::<String>().to_lowercase();
    let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    Zeroizing::new(collapsed)
}

/// Check word-list membership and checksum. No side effects.
///
/// Word-count policy (12 or 24) is enforced by the entry boundary,
/// not here.
pub fn validate_seed(phrase: &str) -> bool {
    let normalized = normalize_phrase(phrase);
    Mnemonic::parse_normalized(normalized.as_str()).is_ok()
}

/// A validated seed phrase held in memory for the session
pub struct Seed {
    phrase: Zeroizing<String>,
    seed_bytes: Zeroizing<[u8; 64]>,
}

impl Seed {
    /// Parse and validate a phrase, computing the BIP39 seed (empty passphrase)
    pub fn parse(phrase: &str) -> ShieldResult<Self> {
        let normalized = normalize_phrase(phrase);
        let mnemonic = Mnemonic::parse_normalized(normalized.as_str())?;
        let seed_bytes = Zeroizing::new(mnemonic.to_seed_normalized(""));

        Ok(Self {
            phrase: normalized,
            seed_bytes,
        })
    }

    /// The normalized phrase, for handing to the Shielding Engine
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn seed_bytes(&self) -> &[u8; 64] {
        &self.seed_bytes
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split(' ').count()
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("words", &self.word_count())
            .field("phrase", &"[REDACTED]")
            .finish()
    }
}

/// Where seed phrases come from (hidden prompt, stdin, tests)
pub trait SeedSource {
    /// Read one candidate phrase. `attempt` starts at 1.
    fn read_seed(&mut self, length: SeedLength, attempt: u32) -> ShieldResult<Zeroizing<String>>;

    /// Called after a rejected entry
    fn report_invalid(&mut self, _attempt: u32, _remaining: u32) {}
}

/// Prompt until a valid seed of the declared length is entered.
///
/// A wrong word count and a failed checksum both consume an attempt.
/// After `max_attempts` failures the session aborts with `InvalidSeed`.
pub fn read_valid_seed<S: SeedSource + ?Sized>(
    source: &mut S,
    length: SeedLength,
    max_attempts: u32,
) -> ShieldResult<Seed> {
    for attempt in 1..=max_attempts {
        let candidate = source.read_seed(length, attempt)?;
        let normalized = normalize_phrase(&candidate);
        let words = normalized.split_whitespace().count();

        if words == length.words() {
            if let Ok(seed) = Seed::parse(&normalized) {
                log_info!("seed", "Valid seed entered", attempt = attempt);
                return Ok(seed);
            }
        }

        let remaining = max_attempts - attempt;
        log_warn!("seed", "Invalid seed entered", attempt = attempt, remaining = remaining);
        source.report_invalid(attempt, remaining);
    }

    Err(ShieldError::invalid_seed(format!(
        "Too many failed attempts ({})",
        max_attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const TEST_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    struct ScriptedSource {
        entries: VecDeque<&'static str>,
        reads: u32,
        rejected: Vec<u32>,
    }

    impl ScriptedSource {
        fn new(entries: &[&'static str]) -> Self {
            Self {
                entries: entries.iter().copied().collect(),
                reads: 0,
                rejected: Vec::new(),
            }
        }
    }

    impl SeedSource for ScriptedSource {
        fn read_seed(
            &mut self,
            _length: SeedLength,
            _attempt: u32,
        ) -> ShieldResult<Zeroizing<String>> {
            self.reads += 1;
            self.entries
                .pop_front()
                .map(|s| Zeroizing::new(s.to_string()))
                .ok_or_else(|| ShieldError::internal("script exhausted"))
        }

        fn report_invalid(&mut self, attempt: u32, _remaining: u32) {
            self.rejected.push(attempt);
        }
    }

    #[test]
    fn test_validate_seed() {
        assert!(validate_seed(TEST_PHRASE));
        assert!(validate_seed(&format!("  {}  ", TEST_PHRASE.replace(' ', "   "))));
        assert!(validate_seed(&TEST_PHRASE.to_uppercase()));
        assert!(!validate_seed("abandon abandon abandon"));
        // Wrong checksum word
        assert!(!validate_seed(&TEST_PHRASE.replace("about", "abandon")));
        assert!(!validate_seed("not a real mnemonic phrase at all here nope nope nope nope"));
    }

    #[test]
    fn test_seed_parse_is_normalized() {
        let seed = Seed::parse(&format!("\t{}\n", TEST_PHRASE)).unwrap();
        assert_eq!(seed.phrase(), TEST_PHRASE);
        assert_eq!(seed.word_count(), 12);
        assert!(!format!("{:?}", seed).contains("abandon"));
    }

    #[test]
    fn test_seed_bytes_match_bip39_vector() {
        let seed = Seed::parse(TEST_PHRASE).unwrap();
        assert_eq!(
            hex::encode(&seed.seed_bytes()[..8]),
            "5eb00bbddcf069b3"
        );
    }

    #[test]
    fn test_read_valid_seed_recovers_after_typo() {
        let mut source = ScriptedSource::new(&["abandon typo", TEST_PHRASE]);
        let seed = read_valid_seed(&mut source, SeedLength::Twelve, MAX_SEED_ATTEMPTS).unwrap();
        assert_eq!(seed.word_count(), 12);
        assert_eq!(source.reads, 2);
        assert_eq!(source.rejected, vec![1]);
    }

    #[test]
    fn test_read_valid_seed_aborts_after_three_failures() {
        let mut source = ScriptedSource::new(&["bad", "worse", "nope", TEST_PHRASE]);
        let err = read_valid_seed(&mut source, SeedLength::Twelve, MAX_SEED_ATTEMPTS).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidSeed);
        assert_eq!(source.reads, 3);
    }

    #[test]
    fn test_word_count_mismatch_counts_as_attempt() {
        let mut source = ScriptedSource::new(&[TEST_PHRASE, TEST_PHRASE, TEST_PHRASE]);
        let err =
            read_valid_seed(&mut source, SeedLength::TwentyFour, MAX_SEED_ATTEMPTS).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidSeed);
        assert_eq!(source.rejected, vec![1, 2, 3]);
    }
}
