//! Runtime-checked non-owning references.
//!
//! A [`Ref`] points at a value owned by somebody else without borrowing it, which means it can be
//! stored in structures, sent to other threads, and outlive any lexical scope. Unlike a raw
//! pointer, though, every `Ref` registers itself with its owner. If the owner is destroyed while
//! `Ref`s to it are still alive, the process-wide [handler](set_handler) is told about it.
//!
//! ```
//! use refptr::{Ref, Referable};
//!
//! // A primitive boxed in a referable.
//! let r = Referable::<i32>::new(1);
//! let rp: Ref<i32> = r.make_ref();
//! assert_eq!(*rp, *r);
//!
//! // References are counted in checked builds.
//! let rp2 = rp.clone();
//! assert_eq!(*rp2, 1);
//! ```
//!
//! # Owners
//!
//! There are two kinds of owners:
//!
//! - [`Referable<T>`] boxes a value of type `T` together with its bookkeeping. It can be moved
//!   around freely while references to it are alive.
//! - Any type embedding an [`Anchor`] and implementing [`RefFromThis`] (see [`ref_from_this!`])
//!   can mint references to itself once it has been pinned.
//!
//! Both kinds of owner can also hand out references to *part* of the owned value, and existing
//! references can be projected further with [`Ref::project`] and [`Ref::map`]. These references
//! all share the original owner's bookkeeping:
//!
//! ```
//! use refptr::{Ref, Referable};
//!
//! struct Pair {
//!     i: i32,
//!     d: f64,
//! }
//!
//! let owner = Referable::<Pair>::new(Pair { i: 3, d: 5.0 });
//! let whole: Ref<Pair> = owner.make_ref();
//! let i: Ref<i32> = owner.project(|p| &p.i);
//! let d: Ref<f64> = whole.project(|p| &p.d);
//!
//! assert_eq!((*i, *d), (3, 5.0));
//! ```
//!
//! # Backends
//!
//! How much checking is done is decided by the [`Backend`] an owner is created with:
//!
//! | Backend       | Cost per reference           | Detects violations | Reports reference sites |
//! |---------------|------------------------------|--------------------|-------------------------|
//! | [`Uncounted`] | none                         | no                 | no                      |
//! | [`Counted`]   | one atomic increment         | yes                | no                      |
//! | [`Tracked`]   | one lock and arena insertion | yes                | yes                     |
//!
//! The [`DefaultBackend`] used by `Referable<T>`, `Anchor` and `Ref<T>` is chosen when the crate is
//! built. Enable exactly one of the `uncounted`, `counted`, or `tracked` cargo features to pick
//! it. Without any of them, debug builds use [`Tracked`] and release builds use [`Counted`]. If
//! several are enabled, the most thorough one wins. [`ACTIVE_MODE`] reports the outcome.
//!
//! # Violations
//!
//! Dropping an owner while references to it are alive produces a [`ReferableAfterFree`]. By
//! default, it is logged through `tracing` and raised as a panic payload. Install a different
//! handler with [`set_handler`] or [`with_handler`] to log-and-continue, abort, or collect
//! violations instead.

mod anchor;
pub use self::anchor::*;

mod backend;
pub use self::backend::*;

mod error;
pub use self::error::*;

mod handler;
pub use self::handler::*;

mod ptr;
pub use self::ptr::*;

mod referable;
pub use self::referable::*;

#[cfg(test)]
mod test_util;
