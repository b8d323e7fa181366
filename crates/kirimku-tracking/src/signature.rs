// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HMAC-SHA256 webhook signature verification.
//!
//! The digest is computed over the exact request bytes and compared in
//! constant time. An empty secret disables verification and yields
//! [`SignatureVerdict::Skipped`], which callers may accept in test mode.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::update::Carrier;

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureVerdict {
    /// The signature matches the payload.
    Valid,
    /// The signature is missing, malformed, or does not match.
    Invalid,
    /// No secret is configured; nothing was verified.
    Skipped,
}

impl SignatureVerdict {
    /// Whether ingestion may proceed.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, SignatureVerdict::Invalid)
    }
}

/// Strip the `<carrier>-signature=` and `sha256=` prefixes some carriers add.
fn strip_prefixes(header: &str) -> &str {
    let mut value = header.trim();
    for carrier in Carrier::ALL {
        let prefix = format!("{}-signature=", carrier.code());
        if let Some(rest) = strip_prefix_ignore_case(value, &prefix) {
            value = rest;
            break;
        }
    }
    strip_prefix_ignore_case(value, "sha256=")
        .unwrap_or(value)
        .trim()
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

/// Verify `header_signature` against `raw_payload`.
pub fn verify(raw_payload: &[u8], header_signature: &str, secret: &str) -> SignatureVerdict {
    if secret.is_empty() {
        return SignatureVerdict::Skipped;
    }

    let Ok(expected) = hex::decode(strip_prefixes(header_signature)) else {
        return SignatureVerdict::Invalid;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return SignatureVerdict::Invalid;
    };
    mac.update(raw_payload);

    // verify_slice rejects wrong lengths and compares in constant time
    match mac.verify_slice(&expected) {
        Ok(()) => SignatureVerdict::Valid,
        Err(_) => SignatureVerdict::Invalid,
    }
}

/// Hex-encoded HMAC-SHA256 of `payload`, as a carrier would send it.
pub fn sign(payload: &[u8], secret: &str) -> String {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        // HMAC accepts keys of any length
        Err(_) => String::new(),
    }
}
