// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the Apache 2.0 license found in the LICENSE file or at:
//     https://opensource.org/licenses/Apache-2.0

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{BareItem, Dictionary, InnerList, Item, List, ListEntry, Parameters};

/// Deterministic textual form of a structured value. Construction already
/// range-checked everything, so serialization cannot fail; empty lists and
/// dictionaries become the empty string.
pub trait SerializeValue {
    fn serialize_value(&self) -> String;
}

impl SerializeValue for BareItem {
    fn serialize_value(&self) -> String {
        match self {
            BareItem::Integer(value) => value.get().to_string(),
            BareItem::Decimal(value) => {
                let thousandths = value.thousandths();
                let sign = if thousandths < 0 { "-" } else { "" };
                let integral = (thousandths / 1000).abs();
                let frac = (thousandths % 1000).abs();
                if frac == 0 {
                    format!("{sign}{integral}.0")
                } else {
                    let frac = format!("{frac:03}");
                    format!("{sign}{integral}.{}", frac.trim_end_matches('0'))
                }
            }
            BareItem::String(value) => {
                let mut out = String::with_capacity(value.as_str().len() + 2);
                out.push('"');
                for c in value.as_str().chars() {
                    if c == '\\' || c == '"' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
                out
            }
            BareItem::Token(value) => value.as_str().to_string(),
            BareItem::ByteSequence(bytes) => format!(":{}:", STANDARD.encode(bytes)),
            BareItem::Boolean(true) => "?1".to_string(),
            BareItem::Boolean(false) => "?0".to_string(),
        }
    }
}

impl SerializeValue for Parameters {
    fn serialize_value(&self) -> String {
        let mut out = String::new();
        for (key, value) in self {
            out.push(';');
            out.push_str(key.as_str());
            // Boolean true is the implicit parameter value.
            if *value != BareItem::Boolean(true) {
                out.push('=');
                out.push_str(&value.serialize_value());
            }
        }
        out
    }
}

impl SerializeValue for Item {
    fn serialize_value(&self) -> String {
        format!(
            "{}{}",
            self.bare_item.serialize_value(),
            self.params.serialize_value()
        )
    }
}

impl SerializeValue for InnerList {
    fn serialize_value(&self) -> String {
        let items: Vec<String> = self.items.iter().map(Item::serialize_value).collect();
        format!("({}){}", items.join(" "), self.params.serialize_value())
    }
}

impl SerializeValue for ListEntry {
    fn serialize_value(&self) -> String {
        match self {
            ListEntry::Item(item) => item.serialize_value(),
            ListEntry::InnerList(inner) => inner.serialize_value(),
        }
    }
}

impl SerializeValue for List {
    fn serialize_value(&self) -> String {
        let entries: Vec<String> = self.iter().map(ListEntry::serialize_value).collect();
        entries.join(", ")
    }
}

impl SerializeValue for Dictionary {
    fn serialize_value(&self) -> String {
        let mut entries = Vec::with_capacity(self.len());
        for (key, member) in self {
            let serialized = match member {
                // A boolean-true item collapses to the bare key with its
                // parameters.
                ListEntry::Item(item) if item.bare_item == BareItem::Boolean(true) => {
                    format!("{}{}", key.as_str(), item.params.serialize_value())
                }
                member => format!("{}={}", key.as_str(), member.serialize_value()),
            };
            entries.push(serialized);
        }
        entries.join(", ")
    }
}
