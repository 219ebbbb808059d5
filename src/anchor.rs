use std::{
    fmt, hash,
    marker::PhantomPinned,
    panic::Location,
    pin::Pin,
    ptr::NonNull,
};

use crate::{Backend, DefaultBackend, Ref, handler};

// === Anchor === //

/// Reference bookkeeping embedded directly in a value, letting that value mint [`Ref`]s to itself
/// through [`RefFromThis`].
///
/// An anchor is tied to the identity of the value embedding it: cloning yields a fresh anchor with
/// no references and [`Clone::clone_from`] leaves the destination's anchor alone. Anchors compare
/// equal and hash to nothing so they don't interfere with derived comparisons on their container.
///
/// Anchors are `!Unpin`, so the value embedding one has to be pinned before it can mint
/// references.
///
/// An anchor cannot keep the value embedding it alive. If it is dropped with outstanding
/// references and the [handler](crate::set_handler) returns instead of unwinding, the process is
/// aborted.
pub struct Anchor<B: Backend = DefaultBackend> {
    // The backend gets its own allocation so that references outliving a violation can still
    // unregister.
    backend: NonNull<B>,
    _pinned: PhantomPinned,
}

// SAFETY: backends are `Send + Sync` and the anchor owns its backend uniquely.
unsafe impl<B: Backend> Send for Anchor<B> {}

unsafe impl<B: Backend> Sync for Anchor<B> {}

impl<B: Backend> Anchor<B> {
    #[track_caller]
    pub fn new() -> Self {
        let backend = Box::new(B::new(Location::caller()));

        Self {
            backend: NonNull::from(Box::leak(backend)),
            _pinned: PhantomPinned,
        }
    }

    pub fn backend(&self) -> &B {
        // SAFETY: the backend is only released by `drop`.
        unsafe { self.backend.as_ref() }
    }

    /// The number of live references to the value embedding this anchor.
    pub fn ref_count(&self) -> usize {
        self.backend().outstanding()
    }
}

impl<B: Backend> Drop for Anchor<B> {
    fn drop(&mut self) {
        if let Some(violation) = self.backend().audit() {
            // Unwinding leaks the backend so the outstanding references can still unregister.
            handler::notify(violation);

            // The enclosing value is freed right after us and the references would dangle.
            tracing::error!("violation handler returned while a self-referencing value was dropped");
            std::process::abort();
        }

        // SAFETY: the backend is released exactly once and nothing is registered with it.
        drop(unsafe { Box::from_raw(self.backend.as_ptr()) });
    }
}

impl<B: Backend> Default for Anchor<B> {
    #[track_caller]
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Clone for Anchor<B> {
    #[track_caller]
    fn clone(&self) -> Self {
        Self::new()
    }

    fn clone_from(&mut self, _source: &Self) {}
}

impl<B: Backend> fmt::Debug for Anchor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anchor")
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl<B: Backend> Eq for Anchor<B> {}

impl<B: Backend> PartialEq for Anchor<B> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<B: Backend> hash::Hash for Anchor<B> {
    fn hash<H: hash::Hasher>(&self, _state: &mut H) {}
}

// === RefFromThis === //

/// Lets a value mint [`Ref`]s to itself using the [`Anchor`] it embeds.
///
/// Implement this trait with the [`ref_from_this!`](crate::ref_from_this) macro.
///
/// ```
/// use std::pin::pin;
/// use refptr::{Anchor, Ref, RefFromThis, ref_from_this};
///
/// struct Widget {
///     anchor: Anchor,
///     d: f64,
///     s: String,
/// }
///
/// ref_from_this!(Widget => anchor);
///
/// let widget = pin!(Widget { anchor: Anchor::new(), d: 3.0, s: "Hello".to_string() });
///
/// let p: Ref<Widget> = widget.as_ref().ref_from_this();
/// assert_eq!(p.d, 3.0);
///
/// let s: Ref<str> = widget.as_ref().project_from_this(|w| w.s.as_str());
/// assert_eq!(&*s, "Hello");
/// assert_eq!(widget.anchor.ref_count(), 2);
/// ```
///
/// ## Safety
///
/// `anchor` must return an [`Anchor`] stored inline in `self` (so that it is dropped exactly when
/// `self` is) and `Self` must not implement [`Unpin`].
///
pub unsafe trait RefFromThis<B: Backend = DefaultBackend> {
    fn anchor(&self) -> &Anchor<B>;

    /// Creates a reference to this value.
    #[track_caller]
    fn ref_from_this(self: Pin<&Self>) -> Ref<Self, B> {
        self.project_from_this(|this| this)
    }

    /// Creates a reference to part of this value, tracked by this value's anchor.
    #[track_caller]
    fn project_from_this<U: ?Sized>(
        self: Pin<&Self>,
        lens: impl for<'a> FnOnce(&'a Self) -> &'a U,
    ) -> Ref<U, B> {
        let this = self.get_ref();
        let value = NonNull::from(lens(this));
        let link = this.anchor().backend().register(Location::caller());

        // SAFETY: `self` is pinned and cannot be `Unpin`, so it stays at this address until it is
        // dropped, at which point its anchor audits every registration including `link`.
        unsafe { Ref::from_raw_parts(value, link) }
    }
}

impl<T: ?Sized + RefFromThis<B>, B: Backend> From<Pin<&T>> for Ref<T, B> {
    #[track_caller]
    fn from(value: Pin<&T>) -> Self {
        value.ref_from_this()
    }
}

#[doc(hidden)]
pub mod ref_from_this_internals {
    pub use {
        crate::{Anchor, RefFromThis},
        std::marker::Unpin,
    };
}

/// Implements [`RefFromThis`] for a type using one of its [`Anchor`] fields.
///
/// ```ignore
/// ref_from_this!(MyType => anchor_field);
/// ref_from_this!(MyType => anchor_field in refptr::Counted);
/// ```
#[macro_export]
macro_rules! ref_from_this {
    ($ty:ty => $field:ident) => {
        $crate::ref_from_this!($ty => $field in $crate::DefaultBackend);
    };
    ($ty:ty => $field:ident in $backend:ty) => {
        // Fails to resolve `assert_not_unpin` if `$ty: Unpin`.
        const _: fn() = || {
            trait AmbiguousIfUnpin<A> {
                fn assert_not_unpin() {}
            }

            impl<T: ?Sized> AmbiguousIfUnpin<()> for T {}

            impl<T: ?Sized + $crate::ref_from_this_internals::Unpin> AmbiguousIfUnpin<u8> for T {}

            let _ = <$ty as AmbiguousIfUnpin<_>>::assert_not_unpin;
        };

        // SAFETY: the anchor is a field of `$ty`, which we just checked is not `Unpin`.
        unsafe impl $crate::ref_from_this_internals::RefFromThis<$backend> for $ty {
            fn anchor(&self) -> &$crate::ref_from_this_internals::Anchor<$backend> {
                &self.$field
            }
        }
    };
}
