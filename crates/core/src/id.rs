//! Strongly-typed identifiers used across the platform.
//!
//! Hierarchy and permission rows come out of the content store as string
//! columns (blank-able, sometimes referencing nodes outside the fetched
//! scope), so these are string-keyed newtypes rather than uuids.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a node in the content hierarchy (project, case, document,
/// picture, library container, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

/// Identifier of a user or group that can hold a role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorityId(String);

/// Reference to a content instance whose permissions are being mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceRef(String);

macro_rules! impl_str_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create an identifier from a raw string value.
            ///
            /// Blank values are rejected; the stores treat blank columns as
            /// "absent", which is modeled as `Option<Self>` at the row layer.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(DomainError::invalid_id(concat!($name, ": blank value")));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

impl_str_newtype!(TargetId, "TargetId");
impl_str_newtype!(AuthorityId, "AuthorityId");
impl_str_newtype!(InstanceRef, "InstanceRef");

impl From<TargetId> for InstanceRef {
    fn from(value: TargetId) -> Self {
        Self(value.0)
    }
}

impl From<InstanceRef> for TargetId {
    fn from(value: InstanceRef) -> Self {
        Self(value.0)
    }
}
