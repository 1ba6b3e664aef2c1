//! Built-in resource kinds and their identifier rules.
//!
//! The separator and derived-attribute set per kind are part of the
//! durable import contract: changing them breaks existing composite
//! identifiers.

use crate::identity::{DerivedAttr, IdentityError, KindSpec};

/// Object store bucket: `<name>` or `<name>_<acl>`.
pub const BUCKET: KindSpec = KindSpec {
    kind: "bucket",
    separator: '_',
    derived: &[DerivedAttr {
        name: "acl",
        default: Some("private"),
    }],
    pinned: &[("force_destroy", "false")],
};

/// Route table: plain opaque id, which may itself contain separator
/// characters.
pub const ROUTE_TABLE: KindSpec = KindSpec {
    kind: "route_table",
    separator: '_',
    derived: &[],
    pinned: &[],
};

/// Subnet: plain opaque id.
pub const SUBNET: KindSpec = KindSpec {
    kind: "subnet",
    separator: '_',
    derived: &[],
    pinned: &[],
};

/// Route table association: `<route_table_id>/<subnet_id>`. The subnet
/// part is mandatory; an association has no meaningful primary-only form.
pub const ROUTE_TABLE_ASSOCIATION: KindSpec = KindSpec {
    kind: "route_table_association",
    separator: '/',
    derived: &[DerivedAttr {
        name: "subnet_id",
        default: None,
    }],
    pinned: &[],
};

/// All built-in kinds.
pub const KINDS: &[&KindSpec] = &[&BUCKET, &ROUTE_TABLE, &SUBNET, &ROUTE_TABLE_ASSOCIATION];

/// Look up a kind spec by name.
pub fn lookup(kind: &str) -> Result<&'static KindSpec, IdentityError> {
    KINDS
        .iter()
        .copied()
        .find(|spec| spec.kind == kind)
        .ok_or_else(|| IdentityError::KindNotFound(kind.to_string()))
}
