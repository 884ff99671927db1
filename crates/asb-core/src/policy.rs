//! Spam/scam classification of room messages.

use crate::{
    domain::Event,
    patterns::{CryptoKind, PatternMatchers},
    settings::Settings,
};

pub const WALLET_REASON: &str = "Wallet addresses are not permitted";
pub const DOMAIN_REASON_PREFIX: &str = "Message contains links to prohibited domains: ";

/// Outcome of evaluating one event. Produced fresh per event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub blocked: bool,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn allowed() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
        }
    }
}

/// Stateless rule engine. First blocking rule wins.
#[derive(Clone, Copy)]
pub struct SpamPolicy {
    matchers: &'static PatternMatchers,
}

impl Default for SpamPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SpamPolicy {
    pub fn new() -> Self {
        Self {
            matchers: PatternMatchers::shared(),
        }
    }

    pub fn evaluate(&self, event: &Event, settings: &Settings) -> Verdict {
        let Some(body) = event.message_body() else {
            return Verdict::allowed();
        };

        if settings.is_trusted(&event.sender) {
            return Verdict::allowed();
        }

        if settings.check_wallet_address {
            if let Some(kind) = self.matchers.detect_crypto_address(body) {
                tracing::debug!(
                    event_id = %event.id,
                    kind = kind_label(kind),
                    "wallet pattern detected"
                );
                return Verdict::blocked(WALLET_REASON);
            }
        }

        let bad: Vec<&str> = self
            .matchers
            .extract_url_domains(body)
            .inspect(|d| tracing::debug!(event_id = %event.id, domain = %d, "link detected"))
            .filter(|d| !settings.is_whitelisted(d))
            .collect();

        if bad.is_empty() {
            return Verdict::allowed();
        }
        Verdict::blocked(format!("{DOMAIN_REASON_PREFIX}{}", bad.join(",")))
    }
}

fn kind_label(kind: CryptoKind) -> &'static str {
    match kind {
        CryptoKind::EthKey => "eth_key",
        CryptoKind::EthAddress => "eth_address",
        CryptoKind::BtcAddress => "btc_address",
    }
}
