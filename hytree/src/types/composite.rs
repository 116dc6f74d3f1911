//! Composite types
//!
//! Types built from other `Typeref`s stored in the central `TypeRegistry`:
//! - `ClassType`: a named user type with an optional base class.
//! - `CallableType`: the shape of a delegate (parameter types and output).
//! - `TreeType`: the type of a code tree object itself, used for quoting.
//!
//! Each type carries an `internal_fmt` helper that resolves referenced
//! types through the registry storage for display purposes.
use std::{collections::BTreeMap, ops::Deref};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;
use uuid::Uuid;

use crate::types::{AnyType, Typeref};

/// A user-declared class or struct.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassType {
    pub name: String,
    /// Direct ancestor. Reference classes without a base derive from `object`.
    pub base: Option<Typeref>,
    /// Value classes are never reference-assignable to anything but themselves.
    pub is_value: bool,
}

/// Delegate type: something a lambda evaluates to and `Invoke` calls.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CallableType {
    pub params: Vec<Typeref>,
    pub output: Typeref,
}

/// Type of a code tree object (as opposed to the type of the value it computes).
///
/// The hierarchy is `Any <- Lambda <- TypedLambda(delegate)`.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TreeType {
    Any,
    Lambda,
    TypedLambda(Typeref),
}

pub(super) fn fmt_ref<U>(ref_object: &U, typeref: Typeref, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
where
    U: Deref<Target = BTreeMap<Uuid, AnyType>>,
{
    match ref_object.get(&typeref.0) {
        Some(ty) => write!(f, "{}", ty.internal_fmt(ref_object)),
        None => write!(f, "<unknown type {}>", typeref.0),
    }
}

impl CallableType {
    pub(super) fn internal_fmt<'a, U>(&'a self, ref_object: &'a U) -> impl std::fmt::Display + 'a
    where
        U: Deref<Target = BTreeMap<Uuid, AnyType>>,
    {
        struct CallableTypeFmt<'a, U> {
            ty: &'a CallableType,
            ref_object: &'a U,
        }

        impl<U: Deref<Target = BTreeMap<Uuid, AnyType>>> std::fmt::Display for CallableTypeFmt<'_, U> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "fn(")?;
                for (i, param) in self.ty.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    fmt_ref(self.ref_object, *param, f)?;
                }
                write!(f, ") -> ")?;
                fmt_ref(self.ref_object, self.ty.output, f)
            }
        }

        CallableTypeFmt {
            ty: self,
            ref_object,
        }
    }
}

impl TreeType {
    pub(super) fn internal_fmt<'a, U>(&'a self, ref_object: &'a U) -> impl std::fmt::Display + 'a
    where
        U: Deref<Target = BTreeMap<Uuid, AnyType>>,
    {
        struct TreeTypeFmt<'a, U> {
            ty: &'a TreeType,
            ref_object: &'a U,
        }

        impl<U: Deref<Target = BTreeMap<Uuid, AnyType>>> std::fmt::Display for TreeTypeFmt<'_, U> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.ty {
                    TreeType::Any => write!(f, "tree"),
                    TreeType::Lambda => write!(f, "tree<lambda>"),
                    TreeType::TypedLambda(delegate) => {
                        write!(f, "tree<")?;
                        fmt_ref(self.ref_object, *delegate, f)?;
                        write!(f, ">")
                    }
                }
            }
        }

        TreeTypeFmt {
            ty: self,
            ref_object,
        }
    }
}
