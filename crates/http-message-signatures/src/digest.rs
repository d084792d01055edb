// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! `Content-Digest` and `Want-Content-Digest` handling: hash a message body
//! and carry the result as a structured dictionary keyed by algorithm.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256, Sha512};

use crate::SignatureError;
use crate::structured::{Decimal, Dictionary, Item, Key, ListEntry, Parser, SerializeValue};

/// Digest algorithms this crate computes, named by their IANA tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn token(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha-256",
            DigestAlgorithm::Sha512 => "sha-512",
        }
    }

    fn digest(self, body: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(body).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(body).to_vec(),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha-256" => Ok(DigestAlgorithm::Sha256),
            "sha-512" => Ok(DigestAlgorithm::Sha512),
            other => Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Hash `body` and produce the `Content-Digest` field value.
pub fn calculate(body: &[u8], algorithm: DigestAlgorithm) -> String {
    let mut dict = Dictionary::new();
    dict.insert(
        Key::constant(algorithm.token()),
        ListEntry::Item(Item::new(algorithm.digest(body))),
    );
    dict.serialize_value()
}

/// Hash `body` with the preferred supported algorithm named by a
/// `Want-Content-Digest` value: highest weight wins, ties go to the first
/// occurrence, and zero-weight entries are declined.
pub fn calculate_preferred(body: &[u8], want_header: &str) -> Result<String, SignatureError> {
    let dict = Parser::new(want_header).parse_dictionary()?;
    let mut best: Option<(DigestAlgorithm, i64)> = None;
    for (key, member) in &dict {
        let Ok(algorithm) = key.as_str().parse::<DigestAlgorithm>() else {
            continue;
        };
        let ListEntry::Item(item) = member else {
            return Err(SignatureError::structured(
                "digest preference must be an item",
            ));
        };
        // Weights are decimals in [0, 1]; bare integers 0 and 1 also occur.
        let weight = match (item.bare_item.as_decimal(), item.bare_item.as_integer()) {
            (Some(decimal), _) => decimal.thousandths(),
            (None, Some(integer)) => integer * 1000,
            (None, None) => {
                return Err(SignatureError::structured(
                    "digest preference weight must be numeric",
                ));
            }
        };
        if !(0..=1000).contains(&weight) {
            return Err(SignatureError::structured(
                "digest preference weight must lie in [0, 1]",
            ));
        }
        if weight == 0 {
            continue;
        }
        if best.is_none_or(|(_, current)| weight > current) {
            best = Some((algorithm, weight));
        }
    }
    let (algorithm, _) = best.ok_or_else(|| {
        SignatureError::UnsupportedAlgorithm("no supported digest algorithm requested".to_string())
    })?;
    Ok(calculate(body, algorithm))
}

/// Check every supported entry of a `Content-Digest` value against `body`.
/// Unsupported entries are ignored as long as at least one entry is
/// supported.
pub fn verify(header: &str, body: &[u8]) -> Result<(), SignatureError> {
    let dict = Parser::new(header).parse_dictionary()?;
    let mut checked = false;
    for (key, member) in &dict {
        let Ok(algorithm) = key.as_str().parse::<DigestAlgorithm>() else {
            continue;
        };
        let digest = match member {
            ListEntry::Item(item) => item.bare_item.as_byte_sequence().ok_or_else(|| {
                SignatureError::structured("digest value must be a byte sequence")
            })?,
            ListEntry::InnerList(_) => {
                return Err(SignatureError::structured(
                    "digest value must be a byte sequence",
                ));
            }
        };
        if algorithm.digest(body) != digest {
            return Err(SignatureError::Mismatch(algorithm.token().to_string()));
        }
        checked = true;
    }
    if !checked {
        return Err(SignatureError::UnsupportedAlgorithm(
            "no supported entry in content digest".to_string(),
        ));
    }
    Ok(())
}

/// Serialize digest preferences into a `Want-Content-Digest` value.
pub fn preferred(preferences: &[(DigestAlgorithm, Decimal)]) -> String {
    let mut dict = Dictionary::new();
    for (algorithm, weight) in preferences {
        dict.insert(
            Key::constant(algorithm.token()),
            ListEntry::Item(Item::new(*weight)),
        );
    }
    dict.serialize_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"hello": "world"}"#;

    #[test]
    fn calculate_produces_a_dictionary_entry() {
        let value = calculate(BODY, DigestAlgorithm::Sha256);
        assert_eq!(
            value,
            "sha-256=:X48E9qOokqqrvdts8nOJRJN3OWDUoyWxBf7kbu9DBPE=:"
        );
        assert!(verify(&value, BODY).is_ok());
    }

    #[test]
    fn sha512_round_trips() {
        let value = calculate(BODY, DigestAlgorithm::Sha512);
        assert!(value.starts_with("sha-512=:"));
        assert!(verify(&value, BODY).is_ok());
    }

    #[test]
    fn verify_rejects_a_tampered_body() {
        let value = calculate(BODY, DigestAlgorithm::Sha256);
        let error = verify(&value, br#"{"id":5}"#).unwrap_err();
        assert!(matches!(error, SignatureError::Mismatch(_)));
    }

    #[test]
    fn verify_ignores_unsupported_entries_beside_a_supported_one() {
        let supported = calculate(BODY, DigestAlgorithm::Sha256);
        let value = format!("unixsum=:MTIzNA==:, {supported}");
        assert!(verify(&value, BODY).is_ok());
        assert!(matches!(
            verify("unixsum=:MTIzNA==:", BODY),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn verify_rejects_malformed_headers() {
        assert!(matches!(
            verify("sha-256=not-bytes, (", BODY),
            Err(SignatureError::InvalidStructuredHeader { .. })
        ));
        assert!(matches!(
            verify("sha-256=1", BODY),
            Err(SignatureError::InvalidStructuredHeader { .. })
        ));
    }

    #[test]
    fn preference_picks_highest_weight_ties_first() {
        let value = calculate_preferred(BODY, "sha-512=0.5, sha-256=1.0").unwrap();
        assert!(value.starts_with("sha-256=:"));
        let tie = calculate_preferred(BODY, "sha-512=1.0, sha-256=1.0").unwrap();
        assert!(tie.starts_with("sha-512=:"));
    }

    #[test]
    fn preference_declines_zero_weights_and_unknowns() {
        assert!(matches!(
            calculate_preferred(BODY, "sha-256=0.0"),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            calculate_preferred(BODY, "unixsum=1.0"),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
        let value = calculate_preferred(BODY, "sha-256=0, sha-512=1").unwrap();
        assert!(value.starts_with("sha-512=:"));
    }

    #[test]
    fn preference_rejects_out_of_range_weights() {
        assert!(calculate_preferred(BODY, "sha-256=1.5").is_err());
        assert!(calculate_preferred(BODY, "sha-256=-0.1").is_err());
        assert!(calculate_preferred(BODY, "sha-256=abc").is_err());
    }

    #[test]
    fn preferences_serialize_as_weights() {
        let value = preferred(&[
            (DigestAlgorithm::Sha512, Decimal::from_f64(1.0).unwrap()),
            (DigestAlgorithm::Sha256, Decimal::from_f64(0.5).unwrap()),
        ]);
        assert_eq!(value, "sha-512=1.0, sha-256=0.5");
    }
}
