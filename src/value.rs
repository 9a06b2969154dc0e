//
// Copyright (c) 2025 rmarshal-core contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! The language-neutral value tree produced by the object-graph decoder.

use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;

/// The opaque carrier kind for the six "complex object" shapes of format 4.8.
///
/// The decoder never needs virtual dispatch over these — downstream code
/// pattern-matches on `kind` rather than walking a class hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperKind {
    /// `o` — a user-defined object: class tag plus attribute pairs.
    Object,
    /// `u` — a user-def object: class tag plus an opaque byte payload exposed as text.
    UserDef,
    /// `U` — a user-marshal object: class tag plus one recursively-decoded inner value.
    UserMarshal,
    /// `@` — an object back-reference. The decoder does not resolve it.
    Link,
    /// `e` — an extended-module marker, paired with a following object by convention.
    Extended,
}

/// A decoded value from format 4.8.
///
/// `Sym` holds the symbol's surface text (including its leading colon,
/// e.g. `":foo"`) in an `Rc<str>` rather than a `String`: every symbol
/// back-reference clones the same `Rc`, so two `Value::Sym` that
/// originated from the same source symbol are not just value-equal but
/// also identity-equal via [`Value::ptr_eq`] — the property the format's
/// symbol table is actually for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Fits in a signed 64-bit integer.
    Int(i64),
    /// Magnitude exceeds 63 bits (produced only by the bignum tag).
    BigInt(BigInt),
    Str(String),
    Sym(Rc<str>),
    Seq(Vec<Value>),
    /// Source-ordered key/value pairs; not deduplicated by the decoder.
    Map(Vec<(Value, Value)>),
    Wrapper {
        kind: WrapperKind,
        /// Class-tag symbol for `Object`/`UserDef`/`UserMarshal`; the link
        /// target index (as `Int`) for `Link`; `Nil` for `Extended`.
        tag: Box<Value>,
        children: Vec<Value>,
    },
}

impl Value {
    /// Build a new symbol value from its bare name (without the leading colon).
    pub(crate) fn new_symbol(name: &str) -> Value {
        Value::Sym(Rc::from(format!(":{name}")))
    }

    /// True if `self` and `other` are the same symbol allocation — i.e. one
    /// was produced by cloning the `Rc` the other holds, as happens when a
    /// symbol back-reference resolves to a previously-materialized symbol.
    ///
    /// Always `false` for non-`Sym` variants, even if they are value-equal.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Sym(a), Value::Sym(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// True if this value is `Value::Map` (a decoded mapping, source or
    /// produced by a user-def wrapper that happens to carry one).
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Project a top-level `Value::Map` into an order-preserving keyed
    /// container, with later duplicate keys overwriting earlier ones (the
    /// decoder itself never deduplicates; this is the "downstream may
    /// project" step described by the data model).
    ///
    /// Returns `None` if `self` is not a `Map`.
    pub fn into_indexmap(self) -> Option<IndexMap<Value, Value>> {
        match self {
            Value::Map(pairs) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (k, v) in pairs {
                    map.insert(k, v);
                }
                Some(map)
            }
            _ => None,
        }
    }

    /// Convenience accessor for a string-keyed lookup into a `Map`, without
    /// first converting the whole value to an `IndexMap`. Used internally
    /// when reading the `_rails` envelope fields out of decoded JSON-adjacent
    /// structures is not applicable (JSON is handled separately); kept here
    /// because downstream callers commonly want "the value for string key X"
    /// without paying for a full map conversion.
    pub fn get_str_key(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().rev().find_map(|(k, v)| match k {
                Value::Str(s) if s == key => Some(v),
                _ => None,
            }),
            _ => None,
        }
    }
}
