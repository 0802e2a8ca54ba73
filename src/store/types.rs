// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Identifiers and binding results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a stored object.
///
/// Ids are allocated monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a registered class descriptor. Valid ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Returns true if this id could have been allocated.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 >= 1
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a backend binding primitive.
///
/// `next_name` is the next bound name after the one queried, where the
/// primitive needs to report it. `None` there means the end of the
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingValue {
    /// The name was bound to `oid`.
    Bound {
        oid: ObjectId,
        next_name: Option<String>,
    },
    /// The name was not bound.
    Unbound { next_name: Option<String> },
}

impl BindingValue {
    pub fn is_bound(&self) -> bool {
        matches!(self, BindingValue::Bound { .. })
    }

    pub fn oid(&self) -> Option<ObjectId> {
        match self {
            BindingValue::Bound { oid, .. } => Some(*oid),
            BindingValue::Unbound { .. } => None,
        }
    }

    pub fn next_name(&self) -> Option<&str> {
        match self {
            BindingValue::Bound { next_name, .. } | BindingValue::Unbound { next_name } => {
                next_name.as_deref()
            }
        }
    }
}

impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Bound { oid, next_name } => {
                write!(f, "BindingValue[oid:{oid}, nextName:{next_name:?}]")
            }
            BindingValue::Unbound { next_name } => {
                write!(f, "BindingValue[unbound, nextName:{next_name:?}]")
            }
        }
    }
}
