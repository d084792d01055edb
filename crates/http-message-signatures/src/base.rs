// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! Signature base assembly: the ordered canonical component lines plus the
//! `"@signature-params"` trailer that together form the signed byte string.

use std::fmt::Write as _;

use tracing::debug;

use crate::components::SignatureComponent;
use crate::context::SignatureContext;
use crate::crypto::SignatureAlgorithm;
use crate::resolver;
use crate::structured::{
    BareItem, InnerList, Integer, Item, Key, Parameters, SerializeValue, SfString, Token,
};
use crate::SignatureError;

/// The six defined signature parameters, for required/forbidden policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureParameter {
    Created,
    Expires,
    Nonce,
    Alg,
    KeyId,
    Tag,
}

impl SignatureParameter {
    pub fn key(self) -> &'static str {
        match self {
            SignatureParameter::Created => "created",
            SignatureParameter::Expires => "expires",
            SignatureParameter::Nonce => "nonce",
            SignatureParameter::Alg => "alg",
            SignatureParameter::KeyId => "keyid",
            SignatureParameter::Tag => "tag",
        }
    }
}

/// Signature parameters in two forms: the raw ordered parameter map, which
/// is authoritative for serialization, and decoded fields for policy. The
/// raw form survives a parse byte-for-byte so a rebuilt base matches what
/// was signed.
#[derive(Debug, Clone, Default)]
pub struct SignatureParameters {
    raw: Parameters,
    created: Option<i64>,
    expires: Option<i64>,
    nonce: Option<String>,
    alg: Option<String>,
    keyid: Option<String>,
    tag: Option<String>,
}

impl SignatureParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation time in seconds since the Unix epoch.
    pub fn with_created(mut self, seconds: i64) -> Result<Self, SignatureError> {
        let value = Integer::new(seconds)?;
        self.raw.insert(Key::constant("created"), BareItem::Integer(value));
        self.created = Some(seconds);
        Ok(self)
    }

    /// Expiry time in seconds since the Unix epoch.
    pub fn with_expires(mut self, seconds: i64) -> Result<Self, SignatureError> {
        let value = Integer::new(seconds)?;
        self.raw.insert(Key::constant("expires"), BareItem::Integer(value));
        self.expires = Some(seconds);
        Ok(self)
    }

    pub fn with_nonce(mut self, nonce: &str) -> Result<Self, SignatureError> {
        let value = SfString::new(nonce)?;
        self.raw.insert(Key::constant("nonce"), BareItem::String(value));
        self.nonce = Some(nonce.to_string());
        Ok(self)
    }

    pub fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.raw.insert(
            Key::constant("alg"),
            BareItem::Token(Token::constant(algorithm.token())),
        );
        self.alg = Some(algorithm.token().to_string());
        self
    }

    pub fn with_key_id(mut self, keyid: &str) -> Result<Self, SignatureError> {
        let value = SfString::new(keyid)?;
        self.raw.insert(Key::constant("keyid"), BareItem::String(value));
        self.keyid = Some(keyid.to_string());
        Ok(self)
    }

    pub fn with_tag(mut self, tag: &str) -> Result<Self, SignatureError> {
        let value = SfString::new(tag)?;
        self.raw.insert(Key::constant("tag"), BareItem::String(value));
        self.tag = Some(tag.to_string());
        Ok(self)
    }

    /// Lenient decode of parsed inner-list parameters. Unknown or
    /// wrong-typed members stay in the raw map untouched and decode to
    /// nothing, so rebuilding the base still reproduces the original bytes.
    pub(crate) fn from_parameters(params: &Parameters) -> Self {
        let mut decoded = Self {
            raw: params.clone(),
            ..Self::default()
        };
        for (key, value) in params {
            match key.as_str() {
                "created" => decoded.created = value.as_integer(),
                "expires" => decoded.expires = value.as_integer(),
                "nonce" => decoded.nonce = value.as_string().map(str::to_string),
                "alg" => {
                    // Emitted as a token; a quoted string is accepted too.
                    decoded.alg = value
                        .as_token()
                        .or_else(|| value.as_string())
                        .map(str::to_string);
                }
                "keyid" => decoded.keyid = value.as_string().map(str::to_string),
                "tag" => decoded.tag = value.as_string().map(str::to_string),
                _ => {}
            }
        }
        decoded
    }

    pub fn created(&self) -> Option<i64> {
        self.created
    }

    pub fn expires(&self) -> Option<i64> {
        self.expires
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    /// The algorithm token carried by the `alg` parameter, if any.
    pub fn algorithm(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    pub fn key_id(&self) -> Option<&str> {
        self.keyid.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Presence check against the raw map, so even members that failed to
    /// decode count as present.
    pub fn is_set(&self, parameter: SignatureParameter) -> bool {
        self.raw.contains_key(parameter.key())
    }

    pub(crate) fn raw(&self) -> &Parameters {
        &self.raw
    }
}

/// One entry of the covered-component list: the decoded component for
/// resolution and the identifier item whose exact serialization appears in
/// the base.
pub(crate) struct BaseEntry {
    pub identifier: Item,
    pub component: SignatureComponent,
    pub used_if_present: bool,
}

/// The assembled base and the `@signature-params` value, which must appear
/// verbatim as the `Signature-Input` entry value.
pub(crate) struct SignatureBase {
    pub base: String,
    pub params_value: String,
}

pub(crate) fn build_base(
    entries: &[BaseEntry],
    parameters: &SignatureParameters,
    context: &SignatureContext,
) -> Result<SignatureBase, SignatureError> {
    for (index, entry) in entries.iter().enumerate() {
        if entries[..index]
            .iter()
            .any(|prior| prior.component.same_selector(&entry.component))
        {
            return Err(SignatureError::DuplicateComponent(
                entry.identifier.serialize_value(),
            ));
        }
    }

    let mut output = String::new();
    let mut covered: Vec<Item> = Vec::with_capacity(entries.len());

    for entry in entries {
        match resolver::resolve(&entry.component, context) {
            Ok(Some(values)) => {
                let identifier = entry.identifier.serialize_value();
                for value in values {
                    let _ = writeln!(output, "{identifier}: {value}");
                }
                covered.push(entry.identifier.clone());
            }
            Ok(None) | Err(SignatureError::MissingComponent(_)) if entry.used_if_present => {}
            Ok(None) => {
                return Err(SignatureError::MissingComponent(
                    entry.identifier.serialize_value(),
                ));
            }
            Err(error) => return Err(error),
        }
    }

    let params_value =
        InnerList::with_params(covered, parameters.raw().clone()).serialize_value();
    let _ = write!(output, "\"@signature-params\": {params_value}");

    if !output.is_ascii() {
        return Err(SignatureError::structured(
            "signature base contains non-ascii content",
        ));
    }

    debug!(
        components = entries.len(),
        bytes = output.len(),
        "assembled signature base"
    );

    Ok(SignatureBase {
        base: output,
        params_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{DerivedComponent, FieldComponent};
    use url::Url;

    fn entry(component: SignatureComponent, used_if_present: bool) -> BaseEntry {
        BaseEntry {
            identifier: Item::try_from(&component).unwrap(),
            component,
            used_if_present,
        }
    }

    fn context() -> SignatureContext {
        SignatureContext::builder()
            .method("post")
            .target_uri(Url::parse("https://example.com/").unwrap())
            .header("Content-Length", "18")
            .build()
    }

    fn params() -> SignatureParameters {
        SignatureParameters::new()
            .with_key_id("test")
            .unwrap()
            .with_created(1_618_884_473)
            .unwrap()
    }

    #[test]
    fn base_has_expected_representation() {
        let entries = [
            entry(
                SignatureComponent::Derived(DerivedComponent::Method { req: false }),
                false,
            ),
            entry(
                SignatureComponent::Derived(DerivedComponent::Authority { req: false }),
                false,
            ),
            entry(
                SignatureComponent::Field(FieldComponent::new("content-length")),
                false,
            ),
        ];
        let expected = "\"@method\": POST\n\"@authority\": example.com\n\"content-length\": 18\n\"@signature-params\": (\"@method\" \"@authority\" \"content-length\");keyid=\"test\";created=1618884473";
        let base = build_base(&entries, &params(), &context()).unwrap();
        assert_eq!(base.base, expected);
        assert_eq!(
            base.params_value,
            "(\"@method\" \"@authority\" \"content-length\");keyid=\"test\";created=1618884473"
        );
    }

    #[test]
    fn building_twice_is_byte_identical() {
        let entries = [
            entry(
                SignatureComponent::Derived(DerivedComponent::Method { req: false }),
                false,
            ),
            entry(
                SignatureComponent::Field(FieldComponent::new("content-length")),
                false,
            ),
        ];
        let first = build_base(&entries, &params(), &context()).unwrap();
        let second = build_base(&entries, &params(), &context()).unwrap();
        assert_eq!(first.base, second.base);
    }

    #[test]
    fn duplicate_components_are_rejected() {
        let entries = [
            entry(
                SignatureComponent::Derived(DerivedComponent::Method { req: false }),
                false,
            ),
            entry(
                SignatureComponent::Derived(DerivedComponent::Method { req: false }),
                false,
            ),
        ];
        assert!(matches!(
            build_base(&entries, &params(), &context()),
            Err(SignatureError::DuplicateComponent(_))
        ));
    }

    #[test]
    fn missing_component_fails_unless_used_if_present() {
        let absent = SignatureComponent::Field(FieldComponent::new("authorization"));
        assert!(matches!(
            build_base(&[entry(absent.clone(), false)], &params(), &context()),
            Err(SignatureError::MissingComponent(_))
        ));

        let entries = [
            entry(
                SignatureComponent::Derived(DerivedComponent::Method { req: false }),
                false,
            ),
            entry(absent, true),
        ];
        let base = build_base(&entries, &params(), &context()).unwrap();
        // The skipped component appears neither as a line nor in the
        // trailer.
        assert!(!base.base.contains("authorization"));
        assert!(base.params_value.starts_with("(\"@method\")"));
    }

    #[test]
    fn repeated_query_params_emit_one_line_each() {
        let context = SignatureContext::builder()
            .target_uri(Url::parse("https://example.com/?id=1&id=2").unwrap())
            .build();
        let entries = [entry(
            SignatureComponent::Derived(DerivedComponent::QueryParam {
                name: "id".into(),
                req: false,
            }),
            false,
        )];
        let base = build_base(&entries, &SignatureParameters::new(), &context).unwrap();
        assert_eq!(
            base.base,
            "\"@query-param\";name=\"id\": 1\n\"@query-param\";name=\"id\": 2\n\"@signature-params\": (\"@query-param\";name=\"id\")"
        );
    }

    #[test]
    fn parameter_details_survive_a_parse_round_trip() {
        let params = SignatureParameters::new()
            .with_created(1_658_319_872)
            .unwrap()
            .with_nonce("bcf52bbd67af4d4b95e806d2c2c63481")
            .unwrap()
            .with_key_id("test-key-ed25519")
            .unwrap();
        let reparsed = SignatureParameters::from_parameters(params.raw());
        assert_eq!(reparsed.created(), Some(1_658_319_872));
        assert_eq!(reparsed.nonce(), Some("bcf52bbd67af4d4b95e806d2c2c63481"));
        assert_eq!(reparsed.key_id(), Some("test-key-ed25519"));
        assert!(reparsed.is_set(SignatureParameter::Created));
        assert!(!reparsed.is_set(SignatureParameter::Expires));
    }
}
