//! Callable targets of call, construction, invocation and dynamic nodes.
//!
//! A [`Callable`] is a method, constructor, operator or dynamic binder
//! descriptor. Its ordered [`Param`] list is the signature a call site is
//! validated against. [`Member`] and [`Indexer`] describe the property-like
//! targets of member-access and index nodes.
use std::{fmt::Debug, sync::Arc};

use bitflags::bitflags;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{node::NodeKind, types::Typeref, value::Value};

/// Failure raised by a native body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct NativeError(pub String);

/// Host implementation of a callable. Receives the evaluated receiver (if
/// any) followed by the evaluated arguments.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, NativeError> + Send + Sync>;

pub type CallableRef = Arc<Callable>;
pub type MemberRef = Arc<Member>;
pub type IndexerRef = Arc<Indexer>;

bitflags! {
    /// Properties of a callable that matter to validation and operator lookup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CallableFlags: u32 {
        /// Compiler-recognized name such as `op_True` or `op_BitwiseAnd`.
        const SPECIAL_NAME = 1 << 0;
        /// Contains unbound generic parameters and cannot be called as is.
        const GENERIC = 1 << 1;
        /// Only `New` nodes may target it.
        const CONSTRUCTOR = 1 << 2;
        /// Takes a leading call-site context parameter that call sites never supply.
        const DYNAMIC_BINDER = 1 << 3;
    }
}

/// One parameter of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Param {
    pub ty: Typeref,
    pub by_ref: bool,
}

impl Param {
    #[inline]
    pub fn new(ty: Typeref) -> Self {
        Self { ty, by_ref: false }
    }

    /// A by-reference parameter. `ty` is the by-reference type (see
    /// [`TypeRegistry::by_ref`](crate::types::TypeRegistry::by_ref)).
    #[inline]
    pub fn by_ref(ty: Typeref) -> Self {
        Self { ty, by_ref: true }
    }
}

/// Ordered parameter shape of a call target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub params: SmallVec<[Param; 4]>,
}

impl Signature {
    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }
}

impl FromIterator<Param> for Signature {
    fn from_iter<T: IntoIterator<Item = Param>>(iter: T) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Method, constructor, operator or dynamic binder.
#[derive(Clone)]
pub struct Callable {
    pub name: String,
    pub declaring_type: Option<Typeref>,
    pub params: Vec<Param>,
    pub output: Typeref,
    pub flags: CallableFlags,
    pub body: Option<NativeFn>,
}

impl Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("declaring_type", &self.declaring_type)
            .field("params", &self.params)
            .field("output", &self.output)
            .field("flags", &self.flags)
            .field("native", &self.body.is_some())
            .finish()
    }
}

impl Callable {
    /// A static method without a body.
    pub fn function(name: impl Into<String>, params: Vec<Param>, output: Typeref) -> Self {
        Self {
            name: name.into(),
            declaring_type: None,
            params,
            output,
            flags: CallableFlags::empty(),
            body: None,
        }
    }

    /// A user-defined operator declared on `declaring_type`.
    pub fn operator(
        name: impl Into<String>,
        declaring_type: Typeref,
        params: Vec<Param>,
        output: Typeref,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type: Some(declaring_type),
            params,
            output,
            flags: CallableFlags::SPECIAL_NAME,
            body: None,
        }
    }

    /// A constructor of `ty`.
    pub fn constructor(ty: Typeref, params: Vec<Param>) -> Self {
        Self {
            name: ".ctor".into(),
            declaring_type: Some(ty),
            params,
            output: ty,
            flags: CallableFlags::CONSTRUCTOR | CallableFlags::SPECIAL_NAME,
            body: None,
        }
    }

    /// A dynamic binder. `params` must start with the call-site context parameter.
    pub fn binder(name: impl Into<String>, params: Vec<Param>, output: Typeref) -> Self {
        Self {
            name: name.into(),
            declaring_type: None,
            params,
            output,
            flags: CallableFlags::DYNAMIC_BINDER,
            body: None,
        }
    }

    /// Attach a native body.
    pub fn with_body(
        mut self,
        body: impl Fn(&[Value]) -> Result<Value, NativeError> + Send + Sync + 'static,
    ) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    #[inline]
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(CallableFlags::CONSTRUCTOR)
    }

    #[inline]
    pub fn is_dynamic_binder(&self) -> bool {
        self.flags.contains(CallableFlags::DYNAMIC_BINDER)
    }
}

/// A field or property.
#[derive(Clone)]
pub struct Member {
    pub name: String,
    pub ty: Typeref,
    /// `false` for write-only properties.
    pub readable: bool,
    pub getter: Option<NativeFn>,
}

impl Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("readable", &self.readable)
            .finish_non_exhaustive()
    }
}

impl Member {
    pub fn new(name: impl Into<String>, ty: Typeref) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            getter: None,
        }
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }

    pub fn with_getter(
        mut self,
        getter: impl Fn(&[Value]) -> Result<Value, NativeError> + Send + Sync + 'static,
    ) -> Self {
        self.getter = Some(Arc::new(getter));
        self
    }
}

/// An indexed property.
#[derive(Clone)]
pub struct Indexer {
    pub name: String,
    pub ty: Typeref,
    pub params: Vec<Param>,
    /// `false` for write-only indexers.
    pub readable: bool,
    pub getter: Option<NativeFn>,
}

impl Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("params", &self.params)
            .field("readable", &self.readable)
            .finish_non_exhaustive()
    }
}

impl Indexer {
    pub fn new(name: impl Into<String>, ty: Typeref, params: Vec<Param>) -> Self {
        Self {
            name: name.into(),
            ty,
            params,
            readable: true,
            getter: None,
        }
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }

    pub fn with_getter(
        mut self,
        getter: impl Fn(&[Value]) -> Result<Value, NativeError> + Send + Sync + 'static,
    ) -> Self {
        self.getter = Some(Arc::new(getter));
        self
    }
}

/// What a call-site node targets.
#[derive(Debug, Clone)]
pub enum Callee {
    /// Method, constructor or binder with a declared parameter list.
    Declared(CallableRef),
    /// An invocation target, identified by its (delegate or typed lambda) type.
    Delegate(Typeref),
}

/// Supplies the signature a call-site node must be validated against.
///
/// For dynamic nodes the returned signature excludes the leading call-site
/// context parameter of the binder. A callee that the node kind cannot
/// target has no signature.
pub trait SignatureOracle {
    fn signature_for(&self, callee: &Callee, kind: NodeKind) -> Option<Signature>;
}

/// [`SignatureOracle`] reading declared parameter lists, resolving delegate
/// shapes through the type registry.
pub struct DeclaredSignatures<'a> {
    pub types: &'a crate::types::TypeRegistry,
}

impl SignatureOracle for DeclaredSignatures<'_> {
    fn signature_for(&self, callee: &Callee, kind: NodeKind) -> Option<Signature> {
        match callee {
            Callee::Declared(callable) => {
                if (kind == NodeKind::New) != callable.is_constructor()
                    || (kind == NodeKind::Dynamic) != callable.is_dynamic_binder()
                {
                    return None;
                }
                let skip = usize::from(callable.is_dynamic_binder());
                if callable.params.len() < skip {
                    return None;
                }
                Some(callable.params.iter().skip(skip).copied().collect())
            }
            Callee::Delegate(ty) => {
                let shape = self.types.delegate_shape(*ty)?;
                Some(shape.params.into_iter().map(Param::new).collect())
            }
        }
    }
}
