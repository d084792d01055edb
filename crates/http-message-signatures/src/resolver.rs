// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! Canonical value extraction: maps one component identifier to the string
//! value(s) that go after `": "` on its signature base line.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, percent_encode};

use crate::SignatureError;
use crate::components::{DerivedComponent, FieldComponent, SignatureComponent};
use crate::context::{FieldMap, SignatureContext};
use crate::structured::{Parser, SerializeValue};

/// Everything except RFC 3986 unreserved characters gets percent-encoded
/// when a query parameter value is re-encoded.
const QUERY_PARAM_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Resolve a component against a context. `Ok(None)` means the underlying
/// value is absent; `@query-param` may yield several values, one line per
/// occurrence in query order.
pub(crate) fn resolve(
    component: &SignatureComponent,
    context: &SignatureContext,
) -> Result<Option<Vec<String>>, SignatureError> {
    match component {
        SignatureComponent::Field(field) => resolve_field(field, context),
        SignatureComponent::Derived(derived) => resolve_derived(derived, context),
    }
}

/// Whether the underlying message content a component selects exists in the
/// context. Used for present-only policy; no canonicalization happens here.
pub(crate) fn is_present(component: &SignatureComponent, context: &SignatureContext) -> bool {
    match component {
        SignatureComponent::Field(field) => {
            let Some(context) = redirect(context, field.flags.has_req()) else {
                return false;
            };
            let map = namespace(context, field.flags.has_tr());
            match map.combined(&field.name) {
                None => false,
                Some(joined) => match field.flags.key() {
                    None => true,
                    Some(member) => Parser::new(&joined)
                        .parse_dictionary()
                        .is_ok_and(|dict| dict.contains_key(member)),
                },
            }
        }
        SignatureComponent::Derived(derived) => {
            let Some(context) = redirect(context, derived.req()) else {
                return false;
            };
            match derived {
                DerivedComponent::Method { .. } => context.method().is_some(),
                DerivedComponent::TargetUri { .. }
                | DerivedComponent::Authority { .. }
                | DerivedComponent::Scheme { .. }
                | DerivedComponent::RequestTarget { .. }
                | DerivedComponent::Path { .. }
                | DerivedComponent::Query { .. } => context.target().is_some(),
                DerivedComponent::QueryParam { name, .. } => context
                    .target()
                    .and_then(|url| url.query())
                    .is_some_and(|query| !query_param_values(query, name).is_empty()),
                DerivedComponent::Status { .. } => context.status().is_some(),
            }
        }
    }
}

fn redirect(context: &SignatureContext, req: bool) -> Option<&SignatureContext> {
    if req { context.related_request() } else { Some(context) }
}

fn namespace(context: &SignatureContext, tr: bool) -> &FieldMap {
    if tr { context.trailers() } else { context.headers() }
}

fn resolve_field(
    field: &FieldComponent,
    context: &SignatureContext,
) -> Result<Option<Vec<String>>, SignatureError> {
    let context = match redirect(context, field.flags.has_req()) {
        Some(context) => context,
        None => {
            return Err(SignatureError::MissingComponent(format!(
                "`{}`;req without a related request",
                field.name
            )));
        }
    };
    let map = namespace(context, field.flags.has_tr());

    if field.flags.has_bs() {
        let Some(lines) = map.get(&field.name) else {
            return Ok(None);
        };
        let wrapped: Vec<String> = lines
            .iter()
            .map(|line| format!(":{}:", STANDARD.encode(line.trim_matches([' ', '\t']))))
            .collect();
        return Ok(Some(vec![wrapped.join(", ")]));
    }

    let Some(joined) = map.combined(&field.name) else {
        return Ok(None);
    };

    if let Some(member) = field.flags.key() {
        let dict = Parser::new(&joined).parse_dictionary()?;
        let entry = dict.get(member).ok_or_else(|| {
            SignatureError::MissingComponent(format!(
                "`{}` has no dictionary member `{member}`",
                field.name
            ))
        })?;
        return Ok(Some(vec![entry.serialize_value()]));
    }

    if field.flags.has_sf() {
        return Ok(Some(vec![canonicalize_structured(&joined)?]));
    }

    Ok(Some(vec![joined]))
}

/// Without a registry of field types, resolve the shape by trial parse:
/// dictionary, then list, then item.
fn canonicalize_structured(value: &str) -> Result<String, SignatureError> {
    if let Ok(dict) = Parser::new(value).parse_dictionary() {
        return Ok(dict.serialize_value());
    }
    if let Ok(list) = Parser::new(value).parse_list() {
        return Ok(list.serialize_value());
    }
    Parser::new(value)
        .parse_item()
        .map(|item| item.serialize_value())
}

fn resolve_derived(
    derived: &DerivedComponent,
    context: &SignatureContext,
) -> Result<Option<Vec<String>>, SignatureError> {
    let context = match redirect(context, derived.req()) {
        Some(context) => context,
        None => {
            return Err(SignatureError::MissingComponent(format!(
                "`{}`;req without a related request",
                derived.name()
            )));
        }
    };

    let single = |value: Option<String>| Ok(value.map(|v| vec![v]));

    match derived {
        DerivedComponent::Method { .. } => {
            single(context.method().map(str::to_ascii_uppercase))
        }
        DerivedComponent::TargetUri { .. } => {
            single(context.target().map(|url| url.as_str().to_string()))
        }
        DerivedComponent::Authority { .. } => single(context.target().and_then(|url| {
            let host = url.host_str()?.to_ascii_lowercase();
            Some(match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            })
        })),
        DerivedComponent::Scheme { .. } => {
            single(context.target().map(|url| url.scheme().to_string()))
        }
        DerivedComponent::RequestTarget { .. } => single(context.target().map(|url| {
            match url.query() {
                Some(query) => format!("{}?{query}", url.path()),
                None => url.path().to_string(),
            }
        })),
        DerivedComponent::Path { .. } => single(context.target().map(|url| {
            let path = url.path();
            if path.is_empty() {
                "/".to_string()
            } else {
                path.to_string()
            }
        })),
        DerivedComponent::Query { .. } => single(
            context
                .target()
                .map(|url| format!("?{}", url.query().unwrap_or(""))),
        ),
        DerivedComponent::QueryParam { name, .. } => {
            let Some(query) = context.target().and_then(|url| url.query()) else {
                return Ok(None);
            };
            let values = query_param_values(query, name);
            if values.is_empty() {
                Ok(None)
            } else {
                Ok(Some(values))
            }
        }
        DerivedComponent::Status { .. } => single(context.status().map(|s| s.to_string())),
    }
}

/// Re-encoded values of the named query parameter, in query order. Pairs
/// are percent-decoded only: a literal `+` stays a plus sign, this is not
/// form decoding, and comes back out as `%2B`.
fn query_param_values(query: &str, name: &str) -> Vec<String> {
    let mut values = Vec::new();
    for pair in query.split('&') {
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        if percent_decode_str(raw_name).decode_utf8_lossy() != name {
            continue;
        }
        let decoded: Vec<u8> = percent_decode_str(raw_value).collect();
        values.push(percent_encode(&decoded, QUERY_PARAM_ENCODE).to_string());
    }
    values
}
