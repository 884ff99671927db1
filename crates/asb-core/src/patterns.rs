//! Compiled detectors for wallet addresses/keys and link domains.

use std::sync::OnceLock;

use regex::Regex;

/// Final labels treated as file extensions rather than TLDs, so `image.png`
/// passes while `evil.com` does not.
pub const FILE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "mp4", "pdf"];

/// Block-explorer links embed address-shaped substrings.
const EXPLORER_MARKER: &str = "etherscan.io/";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CryptoKind {
    EthKey,
    EthAddress,
    BtcAddress,
}

pub struct PatternMatchers {
    eth_key: Regex,
    eth_address: Regex,
    btc_address: Regex,
    url: Regex,
}

impl PatternMatchers {
    pub fn new() -> Self {
        Self {
            eth_key: Regex::new(r"[0-9a-fA-F]{64}").expect("valid regex"),
            eth_address: Regex::new(r"(?:0x)?[0-9a-fA-F]{40}").expect("valid regex"),
            btc_address: Regex::new(r"[13][a-km-zA-HJ-NP-Z1-9]{25,34}").expect("valid regex"),
            // No `:` or `@` in the host classes: a user id contributes only
            // its server name.
            url: Regex::new(
                r"(?:[-a-zA-Z0-9%_+~.#=]{2,256}\.)?([-a-zA-Z0-9%_+~#=]*\.[a-z]{2,12})\b(?:[-a-zA-Z0-9%_+.~#?&/=]*)",
            )
            .expect("valid regex"),
        }
    }

    /// Process-wide compiled instance.
    pub fn shared() -> &'static PatternMatchers {
        static MATCHERS: OnceLock<PatternMatchers> = OnceLock::new();
        MATCHERS.get_or_init(PatternMatchers::new)
    }

    /// First matching wallet pattern, private keys before addresses.
    pub fn detect_crypto_address(&self, text: &str) -> Option<CryptoKind> {
        if text.contains(EXPLORER_MARKER) {
            return None;
        }
        if self.eth_key.is_match(text) {
            return Some(CryptoKind::EthKey);
        }
        if self.eth_address.is_match(text) {
            return Some(CryptoKind::EthAddress);
        }
        if self.btc_address.is_match(text) {
            return Some(CryptoKind::BtcAddress);
        }
        None
    }

    /// Candidate link domains in `text`, in order, original case.
    ///
    /// Candidates whose final label is a known file extension are dropped.
    pub fn extract_url_domains<'t>(&'t self, text: &'t str) -> impl Iterator<Item = &'t str> + 't {
        self.url
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|domain| !is_file_name(domain))
    }
}

impl Default for PatternMatchers {
    fn default() -> Self {
        Self::new()
    }
}

fn is_file_name(candidate: &str) -> bool {
    let Some((_, last)) = candidate.rsplit_once('.') else {
        return false;
    };
    FILE_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(last))
}
