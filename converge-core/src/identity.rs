//! Composite identifier resolution.
//!
//! External identifiers may encode more than one logical attribute, joined
//! by a kind-specific separator (`bucket1_public-read`,
//! `rtb-123/subnet-456`). Resolution decomposes a raw identifier into a
//! canonical primary id plus derived attributes, applying documented
//! defaults when the optional parts are absent. Resolution is pure; the
//! remote system is never contacted here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::ResourceRecord;

/// Identity resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Identifier is empty")]
    EmptyId,

    #[error("Malformed {kind} identifier '{raw}': {reason}")]
    MalformedIdentity {
        kind: String,
        raw: String,
        reason: String,
    },

    #[error("Unknown resource kind: {0}")]
    KindNotFound(String),
}

/// A derived attribute encoded in a composite identifier.
#[derive(Debug)]
pub struct DerivedAttr {
    pub name: &'static str,
    /// Default used when the identifier carries only the primary part.
    /// `None` means the part is mandatory.
    pub default: Option<&'static str>,
}

/// Per-kind identifier rules: the separator, the derived attributes the
/// composite form encodes, and the attributes that can never be derived
/// from a remote read.
#[derive(Debug)]
pub struct KindSpec {
    pub kind: &'static str,
    pub separator: char,
    pub derived: &'static [DerivedAttr],
    /// Attributes unconditionally forced to a safe value on import. These
    /// are mutable-but-unknowable (e.g. a destructive-operation guard) and
    /// must not be silently inherited from prior local state.
    pub pinned: &'static [(&'static str, &'static str)],
}

/// A raw identifier classified by arity before any attribute assignment.
enum RawForm<'a> {
    Simple(&'a str),
    Composite(&'a str, Vec<&'a str>),
}

/// A resolved identifier: primary id plus derived attributes.
///
/// `primary_id` is never empty after resolution. Re-serializing with
/// [`KindSpec::serialize`] and resolving again yields an identical value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub primary_id: String,
    pub derived: BTreeMap<String, String>,
}

impl KindSpec {
    /// Resolve a raw external identifier into a [`ResourceIdentity`].
    ///
    /// Kinds without derived attributes never split: the whole raw string
    /// is the primary id even when it contains separator characters. For
    /// composite kinds, only two arities are accepted: primary-only (every
    /// derived attribute takes its documented default) and full arity.
    /// Anything else is rejected rather than silently defaulted.
    pub fn resolve(&self, raw: &str) -> Result<ResourceIdentity, IdentityError> {
        if raw.is_empty() {
            return Err(IdentityError::EmptyId);
        }

        let mut derived = BTreeMap::new();
        match self.classify(raw)? {
            RawForm::Simple(primary) => {
                for attr in self.derived {
                    match attr.default {
                        Some(value) => {
                            derived.insert(attr.name.to_string(), value.to_string());
                        }
                        None => {
                            return Err(self.malformed(
                                raw,
                                format!("missing mandatory '{}' part", attr.name),
                            ));
                        }
                    }
                }
                Ok(ResourceIdentity {
                    primary_id: primary.to_string(),
                    derived,
                })
            }
            RawForm::Composite(primary, parts) => {
                for (attr, part) in self.derived.iter().zip(parts) {
                    if part.is_empty() {
                        return Err(
                            self.malformed(raw, format!("empty '{}' part", attr.name))
                        );
                    }
                    derived.insert(attr.name.to_string(), part.to_string());
                }
                Ok(ResourceIdentity {
                    primary_id: primary.to_string(),
                    derived,
                })
            }
        }
    }

    /// Split a raw identifier and decide its form by arity.
    fn classify<'a>(&self, raw: &'a str) -> Result<RawForm<'a>, IdentityError> {
        if self.derived.is_empty() {
            return Ok(RawForm::Simple(raw));
        }

        let full_arity = 1 + self.derived.len();
        let mut parts = raw.split(self.separator);
        let primary = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();

        if primary.is_empty() {
            return Err(self.malformed(raw, "empty primary part".to_string()));
        }
        match rest.len() {
            0 => Ok(RawForm::Simple(primary)),
            n if n == full_arity - 1 => Ok(RawForm::Composite(primary, rest)),
            n => Err(self.malformed(
                raw,
                format!(
                    "expected 1 or {} '{}'-separated parts, got {}",
                    full_arity,
                    self.separator,
                    n + 1
                ),
            )),
        }
    }

    /// Re-serialize an identity at full arity using the kind separator.
    ///
    /// Inverse of [`resolve`](Self::resolve) for well-formed identities:
    /// resolving the serialized form reproduces the identity exactly.
    pub fn serialize(&self, identity: &ResourceIdentity) -> String {
        let mut out = identity.primary_id.clone();
        for attr in self.derived {
            out.push(self.separator);
            out.push_str(
                identity
                    .derived
                    .get(attr.name)
                    .map(String::as_str)
                    .unwrap_or_default(),
            );
        }
        out
    }

    /// Remote lookup key for a resolved identity.
    ///
    /// Kinds whose derived parts are mandatory have no standalone remote
    /// id of their own and are addressed by the full composite form;
    /// everything else is addressed by the primary id alone.
    pub fn lookup_key(&self, identity: &ResourceIdentity) -> String {
        if self.derived.iter().any(|a| a.default.is_none()) {
            self.serialize(identity)
        } else {
            identity.primary_id.clone()
        }
    }

    /// Force pinned attributes to their safe defaults.
    pub fn apply_defaults(&self, record: &mut ResourceRecord) {
        for (name, value) in self.pinned {
            record
                .attrs
                .insert((*name).to_string(), (*value).to_string());
        }
    }

    fn malformed(&self, raw: &str, reason: String) -> IdentityError {
        IdentityError::MalformedIdentity {
            kind: self.kind.to_string(),
            raw: raw.to_string(),
            reason,
        }
    }
}
