// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

//! Component identifiers: the quoted names plus flag parameters that select
//! which part of a message gets canonicalized into each signature base line.

use crate::SignatureError;
use crate::structured::{BareItem, Item, Key, Parameters, SfString};

/// Flags that can accompany an HTTP field component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldFlag {
    /// Re-serialize the field as a structured value before covering it.
    Sf,
    /// Cover the named member of a dictionary-typed field.
    Key(String),
    /// Wrap each field line as a byte sequence. Used when values cannot be
    /// safely concatenated; exclusive with `Sf`.
    Bs,
    /// Read the field from the trailer section.
    Tr,
    /// Read the field from the related request while signing a response.
    Req,
}

/// Ordered flag set for a field component. Order is preserved as given,
/// though rendering an identifier always emits the fixed flag order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldFlagSet(pub Vec<FieldFlag>);

impl FieldFlagSet {
    pub fn has_sf(&self) -> bool {
        self.0.iter().any(|f| matches!(f, FieldFlag::Sf))
    }

    pub fn has_bs(&self) -> bool {
        self.0.iter().any(|f| matches!(f, FieldFlag::Bs))
    }

    pub fn has_tr(&self) -> bool {
        self.0.iter().any(|f| matches!(f, FieldFlag::Tr))
    }

    pub fn has_req(&self) -> bool {
        self.0.iter().any(|f| matches!(f, FieldFlag::Req))
    }

    pub fn key(&self) -> Option<&str> {
        self.0.iter().find_map(|f| match f {
            FieldFlag::Key(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// An HTTP field component, identified by its lowercase name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldComponent {
    pub name: String,
    pub flags: FieldFlagSet,
}

impl FieldComponent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            flags: FieldFlagSet::default(),
        }
    }

    pub fn with_flags(name: &str, flags: Vec<FieldFlag>) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            flags: FieldFlagSet(flags),
        }
    }
}

/// A component whose value is computed from message metadata rather than
/// read from a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedComponent {
    /// `@method`: the request method, uppercased.
    Method { req: bool },
    /// `@target-uri`: the absolute target URI.
    TargetUri { req: bool },
    /// `@authority`: lowercase host with any non-default port.
    Authority { req: bool },
    /// `@scheme`: the lowercase URI scheme.
    Scheme { req: bool },
    /// `@request-target`: path and query as they appear on the request line.
    RequestTarget { req: bool },
    /// `@path`: the URI path, `/` when empty.
    Path { req: bool },
    /// `@query`: `?` followed by the raw query.
    Query { req: bool },
    /// `@query-param`: one line per occurrence of the named parameter.
    QueryParam { name: String, req: bool },
    /// `@status`: the response status code.
    Status { req: bool },
}

impl DerivedComponent {
    pub fn name(&self) -> &'static str {
        match self {
            DerivedComponent::Method { .. } => "@method",
            DerivedComponent::TargetUri { .. } => "@target-uri",
            DerivedComponent::Authority { .. } => "@authority",
            DerivedComponent::Scheme { .. } => "@scheme",
            DerivedComponent::RequestTarget { .. } => "@request-target",
            DerivedComponent::Path { .. } => "@path",
            DerivedComponent::Query { .. } => "@query",
            DerivedComponent::QueryParam { .. } => "@query-param",
            DerivedComponent::Status { .. } => "@status",
        }
    }

    pub(crate) fn req(&self) -> bool {
        match self {
            DerivedComponent::Method { req }
            | DerivedComponent::TargetUri { req }
            | DerivedComponent::Authority { req }
            | DerivedComponent::Scheme { req }
            | DerivedComponent::RequestTarget { req }
            | DerivedComponent::Path { req }
            | DerivedComponent::Query { req }
            | DerivedComponent::QueryParam { req, .. }
            | DerivedComponent::Status { req } => *req,
        }
    }
}

/// A single covered component: either an HTTP field or a derived value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureComponent {
    Field(FieldComponent),
    Derived(DerivedComponent),
}

impl SignatureComponent {
    /// The component name as it appears, quoted, in the signature base.
    pub fn name(&self) -> &str {
        match self {
            SignatureComponent::Field(field) => &field.name,
            SignatureComponent::Derived(derived) => derived.name(),
        }
    }

    /// Whether two components select the same message content. Flag order
    /// is irrelevant for matching.
    pub fn same_selector(&self, other: &Self) -> bool {
        match (self, other) {
            (SignatureComponent::Field(a), SignatureComponent::Field(b)) => {
                a.name == b.name
                    && a.flags.has_sf() == b.flags.has_sf()
                    && a.flags.has_bs() == b.flags.has_bs()
                    && a.flags.has_tr() == b.flags.has_tr()
                    && a.flags.has_req() == b.flags.has_req()
                    && a.flags.key() == b.flags.key()
            }
            (SignatureComponent::Derived(a), SignatureComponent::Derived(b)) => a == b,
            _ => false,
        }
    }
}

fn expect_boolean_flag(name: &str, key: &str, value: &BareItem) -> Result<bool, SignatureError> {
    value.as_boolean().ok_or_else(|| {
        SignatureError::structured(format!(
            "`{key}` parameter on `{name}` must be a boolean"
        ))
    })
}

impl TryFrom<Item> for SignatureComponent {
    type Error = SignatureError;

    fn try_from(value: Item) -> Result<Self, Self::Error> {
        let Some(name) = value.bare_item.as_string() else {
            return Err(SignatureError::structured(
                "component identifier must be a quoted string",
            ));
        };

        fn only_req(name: &str, params: &Parameters) -> Result<bool, SignatureError> {
            let mut req = false;
            for (key, val) in params {
                match key.as_str() {
                    "req" => req = expect_boolean_flag(name, "req", val)?,
                    other => {
                        return Err(SignatureError::structured(format!(
                            "unexpected parameter `{other}` on `{name}`, only `req` allowed"
                        )));
                    }
                }
            }
            Ok(req)
        }

        let component = match name {
            "@method" => DerivedComponent::Method {
                req: only_req(name, &value.params)?,
            },
            "@target-uri" => DerivedComponent::TargetUri {
                req: only_req(name, &value.params)?,
            },
            "@authority" => DerivedComponent::Authority {
                req: only_req(name, &value.params)?,
            },
            "@scheme" => DerivedComponent::Scheme {
                req: only_req(name, &value.params)?,
            },
            "@request-target" => DerivedComponent::RequestTarget {
                req: only_req(name, &value.params)?,
            },
            "@path" => DerivedComponent::Path {
                req: only_req(name, &value.params)?,
            },
            "@query" => DerivedComponent::Query {
                req: only_req(name, &value.params)?,
            },
            "@status" => DerivedComponent::Status {
                req: only_req(name, &value.params)?,
            },
            "@query-param" => {
                let mut param_name = None;
                let mut req = false;
                for (key, val) in &value.params {
                    match key.as_str() {
                        "req" => req = expect_boolean_flag(name, "req", val)?,
                        "name" => {
                            param_name = Some(
                                val.as_string()
                                    .ok_or_else(|| {
                                        SignatureError::structured(
                                            "`name` parameter on `@query-param` must be a string",
                                        )
                                    })?
                                    .to_string(),
                            );
                        }
                        other => {
                            return Err(SignatureError::structured(format!(
                                "unexpected parameter `{other}` on `@query-param`"
                            )));
                        }
                    }
                }
                let name = param_name.ok_or_else(|| {
                    SignatureError::structured("`@query-param` requires a `name` parameter")
                })?;
                DerivedComponent::QueryParam { name, req }
            }
            derived if derived.starts_with('@') => {
                return Err(SignatureError::structured(format!(
                    "unknown derived component `{derived}`"
                )));
            }
            field => {
                let mut flags = Vec::new();
                for (key, val) in &value.params {
                    match key.as_str() {
                        "sf" => {
                            if expect_boolean_flag(field, "sf", val)? {
                                flags.push(FieldFlag::Sf);
                            }
                        }
                        "bs" => {
                            if expect_boolean_flag(field, "bs", val)? {
                                flags.push(FieldFlag::Bs);
                            }
                        }
                        "tr" => {
                            if expect_boolean_flag(field, "tr", val)? {
                                flags.push(FieldFlag::Tr);
                            }
                        }
                        "req" => {
                            if expect_boolean_flag(field, "req", val)? {
                                flags.push(FieldFlag::Req);
                            }
                        }
                        "key" => {
                            let member = val.as_string().ok_or_else(|| {
                                SignatureError::structured(format!(
                                    "`key` parameter on `{field}` must be a string"
                                ))
                            })?;
                            flags.push(FieldFlag::Key(member.to_string()));
                        }
                        other => {
                            return Err(SignatureError::structured(format!(
                                "unexpected parameter `{other}` on `{field}`, only sf / key / bs / req / tr allowed"
                            )));
                        }
                    }
                }
                let flags = FieldFlagSet(flags);
                if flags.has_sf() && flags.has_bs() {
                    return Err(SignatureError::structured(format!(
                        "`sf` and `bs` are mutually exclusive on `{field}`"
                    )));
                }
                return Ok(SignatureComponent::Field(FieldComponent {
                    name: field.to_ascii_lowercase(),
                    flags,
                }));
            }
        };

        Ok(SignatureComponent::Derived(component))
    }
}

impl TryFrom<&SignatureComponent> for Item {
    type Error = SignatureError;

    /// Render the identifier item. Flags are emitted in the fixed order
    /// `sf`, `key`, `bs`, `req`, `tr`, `name` regardless of construction
    /// order.
    fn try_from(value: &SignatureComponent) -> Result<Self, Self::Error> {
        let mut params = Parameters::new();
        let name = match value {
            SignatureComponent::Field(field) => {
                if field.flags.has_sf() && field.flags.has_bs() {
                    return Err(SignatureError::structured(format!(
                        "`sf` and `bs` are mutually exclusive on `{}`",
                        field.name
                    )));
                }
                if field.flags.has_sf() {
                    params.insert(Key::constant("sf"), BareItem::Boolean(true));
                }
                if let Some(member) = field.flags.key() {
                    params.insert(Key::constant("key"), BareItem::String(SfString::new(member)?));
                }
                if field.flags.has_bs() {
                    params.insert(Key::constant("bs"), BareItem::Boolean(true));
                }
                if field.flags.has_req() {
                    params.insert(Key::constant("req"), BareItem::Boolean(true));
                }
                if field.flags.has_tr() {
                    params.insert(Key::constant("tr"), BareItem::Boolean(true));
                }
                SfString::new(field.name.clone())?
            }
            SignatureComponent::Derived(derived) => {
                if derived.req() {
                    params.insert(Key::constant("req"), BareItem::Boolean(true));
                }
                if let DerivedComponent::QueryParam { name, .. } = derived {
                    params.insert(Key::constant("name"), BareItem::String(SfString::new(name.clone())?));
                }
                SfString::constant(derived.name())
            }
        };
        Ok(Item::with_params(name, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured::{Parser, SerializeValue};

    fn parse_identifier(input: &str) -> Result<SignatureComponent, SignatureError> {
        SignatureComponent::try_from(Parser::new(input).parse_item().unwrap())
    }

    #[test]
    fn derived_identifiers_parse() {
        assert_eq!(
            parse_identifier(r#""@method""#).unwrap(),
            SignatureComponent::Derived(DerivedComponent::Method { req: false })
        );
        assert_eq!(
            parse_identifier(r#""@authority";req"#).unwrap(),
            SignatureComponent::Derived(DerivedComponent::Authority { req: true })
        );
        assert_eq!(
            parse_identifier(r#""@query-param";name="id""#).unwrap(),
            SignatureComponent::Derived(DerivedComponent::QueryParam {
                name: "id".into(),
                req: false
            })
        );
    }

    #[test]
    fn field_identifiers_lowercase_and_keep_flags() {
        let component = parse_identifier(r#""Content-Type";sf"#).unwrap();
        let SignatureComponent::Field(field) = &component else {
            panic!("expected field component");
        };
        assert_eq!(field.name, "content-type");
        assert!(field.flags.has_sf());
    }

    #[test]
    fn unknown_derived_and_parameters_fail() {
        assert!(parse_identifier(r#""@bogus""#).is_err());
        assert!(parse_identifier(r#""@method";sf"#).is_err());
        assert!(parse_identifier(r#""date";frobnicate"#).is_err());
        assert!(parse_identifier(r#"tok"#).is_err());
    }

    #[test]
    fn query_param_requires_name() {
        assert!(parse_identifier(r#""@query-param""#).is_err());
    }

    #[test]
    fn sf_and_bs_are_mutually_exclusive() {
        assert!(parse_identifier(r#""example";sf;bs"#).is_err());
        let component = SignatureComponent::Field(FieldComponent::with_flags(
            "example",
            vec![FieldFlag::Bs, FieldFlag::Sf],
        ));
        assert!(Item::try_from(&component).is_err());
    }

    #[test]
    fn rendering_uses_fixed_flag_order() {
        let component = SignatureComponent::Field(FieldComponent::with_flags(
            "example-dict",
            vec![FieldFlag::Req, FieldFlag::Key("member".into()), FieldFlag::Sf],
        ));
        let item = Item::try_from(&component).unwrap();
        assert_eq!(item.serialize_value(), r#""example-dict";sf;key="member";req"#);
    }

    #[test]
    fn selector_matching_ignores_flag_order() {
        let parsed = parse_identifier(r#""x";req;sf"#).unwrap();
        let built = SignatureComponent::Field(FieldComponent::with_flags(
            "x",
            vec![FieldFlag::Sf, FieldFlag::Req],
        ));
        assert!(parsed.same_selector(&built));
        let other = SignatureComponent::Field(FieldComponent::new("x"));
        assert!(!parsed.same_selector(&other));
    }
}
