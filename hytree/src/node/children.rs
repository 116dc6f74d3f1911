//! Lazily materialized child sequences.
//!
//! Most call sites carry a single argument. A [`ChildCache`] keeps that first
//! child inline and only allocates the shared [`Children`] sequence the first
//! time somebody asks for it. The transition is a single compare-and-publish
//! on an epoch-managed atomic slot:
//!
//! ```text
//!   Inline(first) --(first reader wins the CAS)--> Materialized(children)
//! ```
//!
//! Readers racing on the same node may each build a candidate sequence; only
//! one is published, the others are dropped, and every reader returns the
//! published instance. The slot is never written again after that.
use std::{ops::Deref, sync::Arc, sync::atomic::Ordering};

use crossbeam::epoch::{self, Atomic, Owned};
use either::Either;
use log::trace;
use smallvec::SmallVec;

use crate::node::Node;

/// Immutable, cheaply clonable ordered view over child nodes.
#[derive(Clone)]
pub struct Children(Arc<[Node]>);

impl Children {
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// `true` if both views are the very same published sequence.
    #[inline]
    pub fn same_instance(&self, other: &Children) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for Children {
    type Target = [Node];

    #[inline]
    fn deref(&self) -> &[Node] {
        &self.0
    }
}

impl From<Vec<Node>> for Children {
    fn from(value: Vec<Node>) -> Self {
        Self(value.into())
    }
}

impl FromIterator<Node> for Children {
    fn from_iter<T: IntoIterator<Item = Node>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Debug for Children {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Element-wise identity: both views hold the same nodes in the same order.
impl PartialEq for Children {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

enum Slot {
    Inline(Node),
    Materialized(Children),
}

impl Slot {
    fn as_either(&self) -> Either<&Node, &[Node]> {
        match self {
            Slot::Inline(node) => Either::Left(node),
            Slot::Materialized(children) => Either::Right(children),
        }
    }
}

/// Returns the primary child of a slot: the inline value if present, otherwise
/// the first element of the materialized sequence.
#[inline]
pub fn first_or_only<'a, T>(slot: Either<&'a T, &'a [T]>) -> Option<&'a T> {
    slot.either(Some, <[T]>::first)
}

/// Child storage owned by exactly one node.
pub struct ChildCache {
    // Never null: empty caches start out materialized.
    head: Atomic<Slot>,
    tail: SmallVec<[Node; 2]>,
}

impl ChildCache {
    /// Store `children` compactly; the sequence is built on first [`Self::view`].
    pub fn new(children: Vec<Node>) -> Self {
        let mut children = children.into_iter();
        match children.next() {
            Some(first) => Self {
                head: Atomic::new(Slot::Inline(first)),
                tail: children.collect(),
            },
            None => Self::materialized(Children::empty()),
        }
    }

    /// Adopt an existing sequence as is. Views return this very instance.
    pub fn materialized(children: Children) -> Self {
        Self {
            head: Atomic::new(Slot::Materialized(children)),
            tail: SmallVec::new(),
        }
    }

    /// Immutable view over the children, materializing it at most once.
    pub fn view(&self) -> Children {
        let guard = epoch::pin();

        loop {
            let current = self.head.load(Ordering::Acquire, &guard);
            // SAFETY: `head` is never null, and a replaced slot is only
            // destroyed once every thread pinned at the time has unpinned.
            let slot = unsafe { current.deref() };

            let first = match slot {
                Slot::Materialized(children) => return children.clone(),
                Slot::Inline(first) => first,
            };

            let mut nodes = Vec::with_capacity(1 + self.tail.len());
            nodes.push(first.clone());
            nodes.extend(self.tail.iter().cloned());
            let candidate = Owned::new(Slot::Materialized(nodes.into()));

            match self.head.compare_exchange(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => {
                    trace!("Published child sequence of {} node(s)", 1 + self.tail.len());
                    // SAFETY: the inline slot is unlinked and no new reader can reach it.
                    unsafe { guard.defer_destroy(current) };
                }
                Err(lost) => {
                    trace!("Lost child publication race, adopting the winner's sequence");
                    drop(lost.new);
                }
            }
        }
    }

    /// The first child without forcing materialization.
    pub fn first(&self) -> Option<Node> {
        let guard = epoch::pin();
        let current = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: see `view`.
        let slot = unsafe { current.deref() };
        first_or_only(slot.as_either()).cloned()
    }

    /// Copy of the children without forcing materialization.
    pub fn to_vec(&self) -> Vec<Node> {
        let guard = epoch::pin();
        let current = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: see `view`.
        match unsafe { current.deref() } {
            Slot::Materialized(children) => children.to_vec(),
            Slot::Inline(first) => std::iter::once(first.clone())
                .chain(self.tail.iter().cloned())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let current = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: see `view`.
        match unsafe { current.deref() } {
            Slot::Materialized(children) => children.len(),
            Slot::Inline(_) => 1 + self.tail.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a sequence has been published.
    pub fn is_materialized(&self) -> bool {
        let guard = epoch::pin();
        let current = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: see `view`.
        matches!(unsafe { current.deref() }, Slot::Materialized(_))
    }
}

impl Drop for ChildCache {
    fn drop(&mut self) {
        // SAFETY: `&mut self` guarantees no concurrent reader holds the slot.
        unsafe {
            let guard = epoch::unprotected();
            let head = self.head.load(Ordering::Relaxed, guard);
            if !head.is_null() {
                drop(head.into_owned());
            }
        }
    }
}

impl std::fmt::Debug for ChildCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}
