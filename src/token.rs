/// Gated-access token table (C7) — spec.md §4.7.
///
/// Issues short, random, one-shot tokens that map to a single file path on
/// disk; a token is consumed the first time it is redeemed via `take`, and
/// expires after `TOKEN_TTL` if never redeemed. No background sweep is
/// required (spec.md §4.7's explicit note) — expiry is checked lazily on
/// `take`. Ported from `original_source/tools/tools.go`'s `RandomString`
/// plus the ephemeral-token map used by `api/apiserv.go`.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

const TOKEN_LEN: usize = 8;
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub struct TokenEntry {
    path: PathBuf,
    issued_at: Instant,
}

#[derive(Default)]
pub struct TokenTable {
    tokens: Mutex<HashMap<String, TokenEntry>>,
    ttl: Duration,
}

impl TokenTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn random_token() -> String {
        let mut rng = rand::thread_rng();
        (0..TOKEN_LEN)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect()
    }

    /// Mints a fresh token bound to `path`, retrying on the vanishingly
    /// unlikely collision with a still-live token.
    pub fn issue(&self, path: PathBuf) -> String {
        let mut tokens = self.tokens.lock().unwrap();
        loop {
            let token = Self::random_token();
            if !tokens.contains_key(&token) {
                tokens.insert(
                    token.clone(),
                    TokenEntry {
                        path,
                        issued_at: Instant::now(),
                    },
                );
                return token;
            }
        }
    }

    /// Consumes `token`, returning its bound path if it exists and has not
    /// expired. Either way the entry is removed — tokens are one-shot.
    pub fn take(&self, token: &str) -> Option<PathBuf> {
        let mut tokens = self.tokens.lock().unwrap();
        let entry = tokens.remove(token)?;
        if entry.issued_at.elapsed() > self.ttl {
            None
        } else {
            Some(entry.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_redeemable_exactly_once() {
        let table = TokenTable::new(Duration::from_secs(60));
        let token = table.issue(PathBuf::from("/tmp/shard.0"));
        assert_eq!(table.take(&token), Some(PathBuf::from("/tmp/shard.0")));
        assert_eq!(table.take(&token), None);
    }

    #[test]
    fn expired_token_is_rejected() {
        let table = TokenTable::new(Duration::from_millis(10));
        let token = table.issue(PathBuf::from("/tmp/shard.1"));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(table.take(&token), None);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let table = TokenTable::new(Duration::from_secs(60));
        assert_eq!(table.take("doesnotexist"), None);
    }

    #[test]
    fn issued_tokens_have_expected_length() {
        let table = TokenTable::new(Duration::from_secs(60));
        let token = table.issue(PathBuf::from("/tmp/shard.2"));
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
