use std::{fmt, mem, ops::Deref, panic::Location, ptr::NonNull};

use derive_where::derive_where;

use crate::{Backend, DefaultBackend, Referable};

// === Ref === //

/// A non-owning, runtime-checked reference to a value owned by a [`Referable`] or by a type
/// carrying an [`Anchor`](crate::Anchor).
///
/// A `Ref` never keeps its target alive. Instead, it registers itself with its owner's backend
/// and the owner reports a [`ReferableAfterFree`](crate::ReferableAfterFree) if it is destroyed
/// while any `Ref`s to it remain. A `Ref` can point at the whole owned value or at any part of it
/// (see [`Ref::project`]) while sharing the owner's bookkeeping.
///
/// `Ref`s only hand out shared access to their target. Mutation goes through interior mutability
/// in the target type.
#[derive_where(Default)]
pub struct Ref<T: ?Sized, B: Backend = DefaultBackend> {
    binding: Option<Binding<T, B>>,
}

struct Binding<T: ?Sized, B: Backend> {
    value: NonNull<T>,
    link: B::Link,
}

// SAFETY: a `Ref` behaves like a `&T` with respect to its target and its link is thread-safe.
unsafe impl<T: ?Sized + Sync, B: Backend> Send for Ref<T, B> {}

unsafe impl<T: ?Sized + Sync, B: Backend> Sync for Ref<T, B> {}

impl<T: ?Sized, B: Backend> Ref<T, B> {
    /// Creates an empty reference.
    pub const fn new() -> Self {
        Self { binding: None }
    }

    /// ## Safety
    ///
    /// `link` must be registered with the backend of the owner `value` points into.
    ///
    pub(crate) unsafe fn from_raw_parts(value: NonNull<T>, link: B::Link) -> Self {
        Self {
            binding: Some(Binding { value, link }),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.binding.as_ref().map(|binding| {
            // SAFETY: a bound reference is registered with its owner, which must outlive it.
            unsafe { binding.value.as_ref() }
        })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.binding.as_ref().map(|binding| binding.value)
    }

    /// Returns `true` if both references point at the same place.
    pub fn ptr_eq<U: ?Sized>(&self, other: &Ref<U, B>) -> bool {
        match (self.as_ptr(), other.as_ptr()) {
            (Some(lhs), Some(rhs)) => std::ptr::addr_eq(lhs.as_ptr(), rhs.as_ptr()),
            (None, None) => true,
            _ => false,
        }
    }

    /// The number of references bound to the same owner as this one, including this one. Returns
    /// zero for an empty reference or when the owner's backend does not count.
    pub fn ref_count(&self) -> usize {
        self.binding.as_ref().map_or(0, |binding| {
            // SAFETY: the owner outlives every bound reference to it.
            unsafe { B::outstanding_via(&binding.link) }
        })
    }

    /// Unregisters this reference from its owner, leaving it empty. Does nothing if the reference
    /// is already empty.
    pub fn reset(&mut self) {
        if let Some(binding) = self.binding.take() {
            // SAFETY: the owner outlives every bound reference to it.
            unsafe { B::unregister(binding.link) };
        }
    }

    /// Moves the binding out of this reference, leaving it empty.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Creates a new reference to part of this reference's target. The new reference registers
    /// with the original owner.
    ///
    /// Projecting an empty reference yields an empty reference without calling `lens`.
    #[track_caller]
    pub fn project<U: ?Sized>(&self, lens: impl for<'a> FnOnce(&'a T) -> &'a U) -> Ref<U, B> {
        let Some(binding) = &self.binding else {
            return Ref::new();
        };

        // SAFETY: the owner outlives every bound reference to it.
        let value = NonNull::from(lens(unsafe { binding.value.as_ref() }));
        let link = unsafe { B::fork(&binding.link, Location::caller()) };

        Ref {
            binding: Some(Binding { value, link }),
        }
    }

    /// Converts this reference into a reference to part of its target, reusing its registration.
    ///
    /// This is also how references are converted to trait objects, by casting inside the lens:
    ///
    /// ```
    /// use std::fmt::Debug;
    /// use refptr::{Ref, Referable};
    ///
    /// let owner = Referable::<u32>::new(4);
    /// let as_dyn: Ref<dyn Debug> = owner.make_ref().map(|v| v as &dyn Debug);
    ///
    /// assert_eq!(format!("{:?}", &*as_dyn), "4");
    /// ```
    pub fn map<U: ?Sized>(mut self, lens: impl for<'a> FnOnce(&'a T) -> &'a U) -> Ref<U, B> {
        let Some(binding) = self.binding.take() else {
            return Ref::new();
        };

        // SAFETY: the owner outlives every bound reference to it.
        let value = NonNull::from(lens(unsafe { binding.value.as_ref() }));

        Ref {
            binding: Some(Binding {
                value,
                link: binding.link,
            }),
        }
    }

    /// Converts a reference to a value into a reference to the value it embeds as its base.
    pub fn upcast<U: ?Sized>(self) -> Ref<U, B>
    where
        T: AsRef<U>,
    {
        self.map(|value| value.as_ref())
    }
}

impl<T: ?Sized, B: Backend> Clone for Ref<T, B> {
    #[track_caller]
    fn clone(&self) -> Self {
        self.project(|value| value)
    }

    /// Rebinds this reference to `source`'s target. The old binding is released before the new
    /// one is registered.
    #[track_caller]
    fn clone_from(&mut self, source: &Self) {
        self.reset();
        *self = source.clone();
    }
}

impl<T: ?Sized, B: Backend> Drop for Ref<T, B> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized, B: Backend> Deref for Ref<T, B> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(value) => value,
            None => panic!("attempted to dereference an empty `Ref`"),
        }
    }
}

impl<T: ?Sized + fmt::Debug, B: Backend> fmt::Debug for Ref<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Ref").field(&value).finish(),
            None => f.write_str("Ref(<empty>)"),
        }
    }
}

impl<T, B: Backend> From<&Referable<T, B>> for Ref<T, B> {
    #[track_caller]
    fn from(owner: &Referable<T, B>) -> Self {
        owner.make_ref()
    }
}
