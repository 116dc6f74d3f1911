//! Types module
//!
//! This module contains the canonical representation of the semantic types
//! attached to every node of a code tree:
//!
//! - Primary types: unit, bool, int, float, string and the `object` root (see `primary.rs`).
//! - Composite types: classes, delegate shapes and code-tree types (see `composite.rs`).
//! - Wrappers: nullable value types and by-reference parameter types.
//! - A registry-backed [`AnyType`] wrapper and [`TypeRegistry`] which deduplicates
//!   types and provides stable [`Typeref`] identifiers (UUID-based).
//!
//! The registry doubles as the type oracle ([`TypeOracle`]) consulted during
//! argument validation and as the declared-operator lookup ([`OperatorLookup`])
//! consulted when lowering lifted logical operators.
use std::{
    collections::BTreeMap,
    hash::{DefaultHasher, Hash, Hasher},
    ops::Deref,
};

use log::{debug, info};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use strum::{EnumIs, EnumTryAs};
use uuid::{Timestamp, Uuid};

use crate::{
    callable::{CallableFlags, CallableRef},
    types::{
        composite::{CallableType, ClassType, TreeType, fmt_ref},
        primary::PrimaryType,
    },
};
pub mod composite;
pub mod primary;

/// A stable reference to a type stored inside a `TypeRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Typeref(Uuid);

impl Typeref {
    /// The underlying registry identifier.
    #[inline]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

/// A sum-type representing any type that can be stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIs, EnumTryAs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AnyType {
    /// Built-in scalar types and the `object` root.
    Primary(PrimaryType),

    /// Lifted form of a value type. `null` is a valid value of any nullable type.
    Nullable(Typeref),

    /// User-declared class or struct.
    Class(ClassType),

    /// Delegate type.
    Callable(CallableType),

    /// Type of a code tree object.
    Tree(TreeType),

    /// By-reference parameter type. Only ever appears in signatures.
    ByRef(Typeref),
}

impl From<PrimaryType> for AnyType {
    fn from(value: PrimaryType) -> Self {
        AnyType::Primary(value)
    }
}

impl From<ClassType> for AnyType {
    fn from(value: ClassType) -> Self {
        AnyType::Class(value)
    }
}

impl From<CallableType> for AnyType {
    fn from(value: CallableType) -> Self {
        AnyType::Callable(value)
    }
}

impl From<TreeType> for AnyType {
    fn from(value: TreeType) -> Self {
        AnyType::Tree(value)
    }
}

impl AnyType {
    /// Whether values of this type are copied rather than referenced.
    pub fn is_value(&self) -> bool {
        match self {
            AnyType::Primary(primary) => primary.is_value(),
            AnyType::Nullable(_) => true,
            AnyType::Class(class) => class.is_value,
            AnyType::Callable(_) | AnyType::Tree(_) | AnyType::ByRef(_) => false,
        }
    }

    pub(crate) fn internal_fmt<'a, U>(&'a self, ref_object: &'a U) -> impl std::fmt::Display + 'a
    where
        U: Deref<Target = BTreeMap<Uuid, AnyType>>,
    {
        struct AnyTypeFmt<'a, U> {
            ty: &'a AnyType,
            ref_object: &'a U,
        }

        impl<U: Deref<Target = BTreeMap<Uuid, AnyType>>> std::fmt::Display for AnyTypeFmt<'_, U> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.ty {
                    AnyType::Primary(primary) => write!(f, "{}", primary),
                    AnyType::Nullable(inner) => {
                        fmt_ref(self.ref_object, *inner, f)?;
                        write!(f, "?")
                    }
                    AnyType::Class(class) => write!(f, "{}", class.name),
                    AnyType::Callable(callable) => {
                        write!(f, "{}", callable.internal_fmt(self.ref_object))
                    }
                    AnyType::Tree(tree) => write!(f, "{}", tree.internal_fmt(self.ref_object)),
                    AnyType::ByRef(inner) => {
                        write!(f, "&")?;
                        fmt_ref(self.ref_object, *inner, f)
                    }
                }
            }
        }

        AnyTypeFmt {
            ty: self,
            ref_object,
        }
    }
}

/// Type relationships needed to check a call site against a signature.
///
/// Implementations never allocate new types; they only answer questions about
/// types that already exist.
pub trait TypeOracle {
    /// `true` if `ty` is copied by value (primaries except `str`/`object`,
    /// nullables, value classes).
    fn is_value_type(&self, ty: Typeref) -> bool;

    /// `true` if `ty` is the lifted (`T?`) form of a value type.
    fn is_nullable(&self, ty: Typeref) -> bool;

    /// `T` for `T?`, otherwise `ty` itself.
    fn non_nullable_form(&self, ty: Typeref) -> Typeref;

    /// `T` for a by-reference `&T`, otherwise `ty` itself.
    fn element_type(&self, ty: Typeref) -> Typeref;

    /// The direct ancestor of `ty`, if any.
    fn base_type(&self, ty: Typeref) -> Option<Typeref>;

    /// `true` if `ty` is `base` or one of its descendants.
    fn is_same_or_subclass(&self, base: Typeref, ty: Typeref) -> bool {
        let mut current = Some(ty);
        while let Some(candidate) = current {
            if candidate == base {
                return true;
            }
            current = self.base_type(candidate);
        }
        false
    }

    /// `true` if a value of type `src` can be stored in a slot of type `dest`.
    fn is_assignable_from(&self, dest: Typeref, src: Typeref) -> bool {
        self.is_same_or_subclass(dest, src)
    }

    /// Identity, or an upcast between two reference types.
    fn is_reference_assignable(&self, dest: Typeref, src: Typeref) -> bool {
        dest == src
            || (!self.is_value_type(dest)
                && !self.is_value_type(src)
                && self.is_assignable_from(dest, src))
    }

    /// Human readable rendering used in diagnostics.
    fn display(&self, ty: Typeref) -> String;
}

/// Finds a declared operator on a type or one of its ancestors.
pub trait OperatorLookup {
    fn find_declared_operator(&self, ty: Typeref, name: &str) -> Option<CallableRef>;
}

/// A central registry that stores and deduplicates `AnyType` values.
///
/// The registry provides fast lookup by `Typeref` and ensures identical type
/// descriptions map to the same stable identifier. It also records the
/// operators declared on class types.
///
/// Example:
///
/// ```rust
/// # use hytree::types::{TypeRegistry, primary::PrimaryType};
/// let reg = TypeRegistry::new([0u8; 6]);
/// let typeref = reg.search_or_insert(PrimaryType::Int.into());
/// assert_eq!(reg.search_or_insert(PrimaryType::Int.into()), typeref);
/// assert_eq!(reg.get(typeref).as_deref(), Some(&PrimaryType::Int.into()));
/// ```
pub struct TypeRegistry {
    array: RwLock<BTreeMap<Uuid, AnyType>>,
    inverse_lookup: RwLock<BTreeMap<u64, SmallVec<[Uuid; 1]>>>,
    operators: RwLock<BTreeMap<Typeref, SmallVec<[CallableRef; 2]>>>,
    context: uuid::timestamp::context::ContextV1,
    node_id: [u8; 6],
}

impl TypeRegistry {
    fn hash_ty(ty: &AnyType) -> u64 {
        let mut hasher = DefaultHasher::new();
        ty.hash(&mut hasher);
        hasher.finish()
    }

    fn next_uuid(&self) -> Uuid {
        let ts = Timestamp::now(&self.context);
        Uuid::new_v6(ts, &self.node_id)
    }

    /// Create a new [`TypeRegistry`] instance.
    ///
    /// `node_id` is used when allocating UUIDs for newly inserted types.
    pub fn new(node_id: [u8; 6]) -> Self {
        Self {
            array: Default::default(),
            inverse_lookup: Default::default(), // INFO: Always lock array before inverse_lookup to avoid deadlock
            operators: Default::default(),
            context: uuid::timestamp::context::ContextV1::new(0),
            node_id,
        }
    }

    /// Retrieve a borrowed [`AnyType`] for the given `typeref`. Returns
    /// [`None`] if the given `typeref` is not present in the registry.
    ///
    /// # A note on concurrency
    /// The returned guard keeps a read lock on the type storage. Do not hold
    /// it while calling [`Self::search_or_insert`], which may need to upgrade
    /// to a write lock.
    pub fn get(&self, typeref: Typeref) -> Option<MappedRwLockReadGuard<'_, AnyType>> {
        let array_lock = self.array.read_recursive();
        RwLockReadGuard::try_map(array_lock, |map| map.get(&typeref.0)).ok()
    }

    /// Find the [`Typeref`] of an already registered type without inserting it.
    pub fn find(&self, ty: &AnyType) -> Option<Typeref> {
        let h = Self::hash_ty(ty);
        let array_lock = self.array.read_recursive();
        let inverse_lookup_lock = self.inverse_lookup.read_recursive();

        inverse_lookup_lock
            .get(&h)?
            .iter()
            .find(|uuid| array_lock.get(uuid) == Some(ty))
            .map(|uuid| Typeref(*uuid))
    }

    /// Insert `ty` into the registry if an equivalent type doesn't already
    /// exist and return the [`Typeref`] for it.
    ///
    /// # A note on concurrency
    /// This method acquires upgradable reads on the storage and upgrades them
    /// only when a new type must be inserted. Writes are assumed to be rare
    /// compared to reads. You **MUST NOT** hold a guard returned by
    /// [`Self::get`] while calling this method.
    pub fn search_or_insert(&self, ty: AnyType) -> Typeref {
        let h = Self::hash_ty(&ty);

        // Order is critical: always lock the type storage first
        let mut array_lock = self.array.upgradable_read();
        let mut inverse_lookup_lock = self.inverse_lookup.upgradable_read();

        if let Some(typerefs) = inverse_lookup_lock.get(&h) {
            for typeref in typerefs {
                if array_lock[typeref] == ty {
                    return Typeref(*typeref);
                }
            }
        }

        array_lock.with_upgraded(|array_lock| {
            inverse_lookup_lock.with_upgraded(|inverse_lookup_lock| {
                let new_typeref = self.next_uuid();

                if let Some(list) = inverse_lookup_lock.get_mut(&h) {
                    info!(
                        "Detected an hash collision on hash 0x{:016x} while registering {}",
                        h,
                        ty.internal_fmt(&&*array_lock),
                    );
                    list.push(new_typeref);
                } else {
                    debug!(
                        "New type encountered {}. Registered with UUID {}.",
                        ty.internal_fmt(&&*array_lock),
                        new_typeref
                    );
                    inverse_lookup_lock.insert(h, smallvec![new_typeref]);
                }

                array_lock.insert(new_typeref, ty);
                Typeref(new_typeref)
            })
        })
    }

    #[inline]
    pub fn primary(&self, primary: PrimaryType) -> Typeref {
        self.search_or_insert(primary.into())
    }

    /// `T?`. Nullable types never nest: `nullable(T?)` is `T?`.
    pub fn nullable(&self, inner: Typeref) -> Typeref {
        if self.is_nullable(inner) {
            return inner;
        }
        self.search_or_insert(AnyType::Nullable(inner))
    }

    #[inline]
    pub fn by_ref(&self, inner: Typeref) -> Typeref {
        self.search_or_insert(AnyType::ByRef(inner))
    }

    /// Register a class. Reference classes without an explicit base derive from `object`.
    pub fn class(&self, name: impl Into<String>, base: Option<Typeref>, is_value: bool) -> Typeref {
        let base = match (base, is_value) {
            (None, false) => Some(self.primary(PrimaryType::Object)),
            (base, _) => base,
        };
        self.search_or_insert(
            ClassType {
                name: name.into(),
                base,
                is_value,
            }
            .into(),
        )
    }

    #[inline]
    pub fn callable(&self, params: Vec<Typeref>, output: Typeref) -> Typeref {
        self.search_or_insert(CallableType { params, output }.into())
    }

    /// Register a tree type along with its tree ancestors, so that base-type
    /// walks starting from it never stop early.
    pub fn tree(&self, tree: TreeType) -> Typeref {
        match tree {
            TreeType::TypedLambda(_) => {
                self.tree(TreeType::Lambda);
            }
            TreeType::Lambda => {
                self.tree(TreeType::Any);
            }
            TreeType::Any => {}
        }
        self.search_or_insert(tree.into())
    }

    /// Parameter types and output of a delegate type, looking through typed
    /// lambda trees.
    pub fn delegate_shape(&self, ty: Typeref) -> Option<CallableType> {
        let delegate = match &*self.get(ty)? {
            AnyType::Callable(callable) => return Some(callable.clone()),
            AnyType::Tree(TreeType::TypedLambda(delegate)) => *delegate,
            _ => return None,
        };
        self.delegate_shape(delegate)
    }

    /// Record `operator` on its declaring type so that [`OperatorLookup`] can find it.
    ///
    /// Operators without a declaring type cannot be found and are ignored.
    pub fn declare_operator(&self, operator: CallableRef) {
        let Some(owner) = operator.declaring_type else {
            debug!("Ignoring operator `{}` without declaring type", operator.name);
            return;
        };

        debug!(
            "Declaring operator `{}` on {}",
            operator.name,
            self.display(owner)
        );
        self.operators
            .write()
            .entry(owner)
            .or_default()
            .push(operator);
    }

    /// Format a given `Typeref` using this registry.
    pub fn fmt(&self, typeref: Typeref) -> impl std::fmt::Display + '_ {
        struct Fmt<'a> {
            registry: &'a TypeRegistry,
            typeref: Typeref,
        }

        impl std::fmt::Display for Fmt<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let array_lock = self.registry.array.read_recursive();
                fmt_ref(&array_lock, self.typeref, f)
            }
        }

        Fmt {
            registry: self,
            typeref,
        }
    }
}

impl TypeOracle for TypeRegistry {
    fn is_value_type(&self, ty: Typeref) -> bool {
        self.get(ty).is_some_and(|ty| ty.is_value())
    }

    fn is_nullable(&self, ty: Typeref) -> bool {
        self.get(ty).is_some_and(|ty| ty.is_nullable())
    }

    fn non_nullable_form(&self, ty: Typeref) -> Typeref {
        match self.get(ty).as_deref() {
            Some(AnyType::Nullable(inner)) => *inner,
            _ => ty,
        }
    }

    fn element_type(&self, ty: Typeref) -> Typeref {
        match self.get(ty).as_deref() {
            Some(AnyType::ByRef(inner)) => *inner,
            _ => ty,
        }
    }

    fn base_type(&self, ty: Typeref) -> Option<Typeref> {
        let parent = match self.get(ty)?.deref() {
            AnyType::Class(class) => return class.base,
            AnyType::Tree(TreeType::TypedLambda(_)) => AnyType::Tree(TreeType::Lambda),
            AnyType::Tree(TreeType::Lambda) => AnyType::Tree(TreeType::Any),
            AnyType::Primary(PrimaryType::Object) => return None,
            AnyType::Tree(TreeType::Any)
            | AnyType::Callable(_)
            | AnyType::Primary(PrimaryType::Str) => AnyType::Primary(PrimaryType::Object),
            AnyType::Primary(_) | AnyType::Nullable(_) | AnyType::ByRef(_) => return None,
        };

        // Ancestors that were never registered cannot be the target of any slot.
        self.find(&parent)
    }

    fn display(&self, ty: Typeref) -> String {
        self.fmt(ty).to_string()
    }
}

impl OperatorLookup for TypeRegistry {
    fn find_declared_operator(&self, ty: Typeref, name: &str) -> Option<CallableRef> {
        let operators = self.operators.read();
        let mut current = Some(ty);

        while let Some(owner) = current {
            let found = operators.get(&owner).and_then(|candidates| {
                candidates.iter().find(|op| {
                    op.name == name
                        && op.flags.contains(CallableFlags::SPECIAL_NAME)
                        && !op.flags.contains(CallableFlags::GENERIC)
                        && op.params.len() == 1
                        && self.is_reference_assignable(op.params[0].ty, owner)
                })
            });

            if let Some(op) = found {
                return Some(op.clone());
            }
            current = self.base_type(owner);
        }

        None
    }
}
