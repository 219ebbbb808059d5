use std::{
    fmt,
    marker::PhantomData,
    mem::{self, ManuallyDrop},
    ops::Deref,
    panic::Location,
    ptr::NonNull,
};

use crate::{Backend, Counting, DefaultBackend, Ref, handler};

// === Referable === //

/// An owned value which [`Ref`]s can safely point into.
///
/// The value and its bookkeeping live in a separate allocation so the `Referable` itself can be
/// moved freely while references to it are alive. When a `Referable` is dropped while references
/// to it remain, the current [handler](crate::set_handler) is notified. Should the handler return,
/// the allocation is kept alive forever so that the remaining references stay readable.
///
/// ```
/// use refptr::{Ref, Referable};
///
/// struct Test {
///     a: i32,
///     b: f32,
/// }
///
/// let t = Referable::<Test>::new(Test { a: 2, b: 5.0 });
/// assert_eq!(t.a, 2);
///
/// let tp: Ref<Test> = t.make_ref();
/// assert_eq!(tp.b, 5.0);
///
/// let tp_a: Ref<i32> = t.project(|t| &t.a);
/// assert_eq!(*tp_a, 2);
/// ```
pub struct Referable<T, B: Backend = DefaultBackend> {
    slot: NonNull<Slot<T, B>>,
    _ty: PhantomData<Slot<T, B>>,
}

struct Slot<T, B> {
    backend: B,
    value: T,
}

// SAFETY: references to the value may be used from other threads, much like an `Arc<T>`.
unsafe impl<T: Send + Sync, B: Backend> Send for Referable<T, B> {}

unsafe impl<T: Sync, B: Backend> Sync for Referable<T, B> {}

impl<T, B: Backend> Referable<T, B> {
    #[track_caller]
    pub fn new(value: T) -> Self {
        let slot = Box::new(Slot {
            backend: B::new(Location::caller()),
            value,
        });

        Self {
            slot: NonNull::from(Box::leak(slot)),
            _ty: PhantomData,
        }
    }

    fn slot(&self) -> &Slot<T, B> {
        // SAFETY: the slot is only released by `drop` and `into_inner`.
        unsafe { self.slot.as_ref() }
    }

    pub fn backend(&self) -> &B {
        &self.slot().backend
    }

    /// The number of live references to this value. Always zero for uncounted backends.
    pub fn ref_count(&self) -> usize {
        self.backend().outstanding()
    }

    /// Creates a reference to the whole value.
    #[track_caller]
    pub fn make_ref(&self) -> Ref<T, B> {
        self.project(|value| value)
    }

    /// Creates a reference to part of the value. The reference is tracked by this `Referable`.
    #[track_caller]
    pub fn project<U: ?Sized>(&self, lens: impl for<'a> FnOnce(&'a T) -> &'a U) -> Ref<U, B> {
        let slot = self.slot();
        let value = NonNull::from(lens(&slot.value));
        let link = slot.backend.register(Location::caller());

        // SAFETY: `link` was registered with the backend owning `value`.
        unsafe { Ref::from_raw_parts(value, link) }
    }

    /// Builds a new `Referable` holding a value derived from this one. The result has its own
    /// bookkeeping and starts out with no references.
    ///
    /// ```
    /// use refptr::Referable;
    ///
    /// let small = Referable::<u8>::new(7);
    /// let wide: Referable<u64> = small.map_value(|&v| u64::from(v));
    ///
    /// assert_eq!(*wide, 7);
    /// ```
    #[track_caller]
    pub fn map_value<U>(&self, f: impl FnOnce(&T) -> U) -> Referable<U, B> {
        Referable::new(f(&self.slot().value))
    }
}

impl<T, B: Counting> Referable<T, B> {
    /// Borrows the value mutably, provided no references to it are alive.
    ///
    /// Only counting backends offer exclusive access:
    ///
    /// ```compile_fail
    /// use refptr::{Referable, Uncounted};
    ///
    /// let mut owner = Referable::<i32, Uncounted>::new(1);
    /// let _ = owner.get_mut();
    /// ```
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.ref_count() != 0 {
            return None;
        }

        // SAFETY: no references are reading the value and, because we're borrowed mutably, none
        // can be created while the borrow lasts.
        Some(&mut unsafe { self.slot.as_mut() }.value)
    }

    /// Replaces the value, leaving the bookkeeping untouched. Fails, handing `value` back, if
    /// references to the current value are alive.
    pub fn replace(&mut self, value: T) -> Result<T, T> {
        match self.get_mut() {
            Some(slot) => Ok(mem::replace(slot, value)),
            None => Err(value),
        }
    }

    /// Takes the value out of the `Referable`. Fails, handing the `Referable` back, if references
    /// to it are alive.
    pub fn into_inner(self) -> Result<T, Self> {
        if self.ref_count() != 0 {
            return Err(self);
        }

        let me = ManuallyDrop::new(self);

        // SAFETY: `me` is never dropped so the slot is released exactly once.
        let slot = unsafe { Box::from_raw(me.slot.as_ptr()) };

        Ok(slot.value)
    }
}

impl<T, B: Backend> Drop for Referable<T, B> {
    fn drop(&mut self) {
        if let Some(violation) = self.backend().audit() {
            // Outstanding references still point into the slot so it is never released.
            handler::notify(violation);
            return;
        }

        // SAFETY: the slot is released exactly once and nothing refers to it anymore.
        drop(unsafe { Box::from_raw(self.slot.as_ptr()) });
    }
}

impl<T, B: Backend> Deref for Referable<T, B> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.slot().value
    }
}

impl<T, B: Backend> AsRef<T> for Referable<T, B> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: Clone, B: Backend> Clone for Referable<T, B> {
    /// Clones the value into a new `Referable`. The clone starts out with no references.
    #[track_caller]
    fn clone(&self) -> Self {
        Self::new((**self).clone())
    }
}

impl<T: Default, B: Backend> Default for Referable<T, B> {
    #[track_caller]
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, B: Backend> From<T> for Referable<T, B> {
    #[track_caller]
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug, B: Backend> fmt::Debug for Referable<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Referable")
            .field("value", &**self)
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Counted, Referable, Tracked, Uncounted, test_util::capture_violations};

    #[test]
    fn clone_starts_fresh() {
        let original = Referable::<String, Tracked>::new("abc".to_string());
        let _rp = original.make_ref();

        let copy = original.clone();
        assert_eq!(*copy, "abc");
        assert_eq!(original.ref_count(), 1);
        assert_eq!(copy.ref_count(), 0);
    }

    #[test]
    fn exclusive_access_needs_no_references() {
        let mut owner = Referable::<i32, Counted>::new(1);

        let rp = owner.make_ref();
        assert!(owner.get_mut().is_none());
        assert_eq!(owner.replace(2), Err(2));

        drop(rp);
        *owner.get_mut().unwrap() += 1;
        assert_eq!(owner.replace(10), Ok(2));
        assert_eq!(*owner, 10);
    }

    #[test]
    fn mapped_value_starts_fresh() {
        let small = Referable::<u8, Tracked>::new(200);
        let _rp = small.make_ref();

        let wide = small.map_value(|&v| u32::from(v) * 2);
        assert_eq!(*wide, 400);
        assert_eq!(small.ref_count(), 1);
        assert_eq!(wide.ref_count(), 0);

        let uncounted = Referable::<u8, Uncounted>::new(1);
        let mapped: Referable<String, Uncounted> = uncounted.map_value(|v| v.to_string());
        assert_eq!(*mapped, "1");
    }

    #[test]
    fn into_inner_refuses_while_referenced() {
        let owner = Referable::<Vec<i32>, Tracked>::new(vec![1, 2, 3]);
        let rp = owner.make_ref();

        let owner = owner.into_inner().unwrap_err();
        assert_eq!(rp.len(), 3);

        drop(rp);
        assert_eq!(owner.into_inner().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn moving_the_owner_keeps_references_valid() {
        let owner = Referable::<i32, Counted>::new(5);
        let rp = owner.make_ref();

        let moved = vec![owner];
        assert_eq!(*rp, 5);
        assert_eq!(moved[0].ref_count(), 1);

        drop(rp);
        assert_eq!(moved[0].ref_count(), 0);
    }

    #[test]
    fn leaked_slot_stays_readable() {
        let (rp, violations) = capture_violations(|| {
            let owner = Referable::<String, Tracked>::new("still here".to_string());
            owner.make_ref()
        });

        assert_eq!(violations.len(), 1);
        assert_eq!(*rp, "still here");
        assert_eq!(rp.ref_count(), 1);
    }

    #[test]
    fn debug_shows_count() {
        let owner = Referable::<u8, Counted>::new(3);
        let _rp = owner.make_ref();

        assert_eq!(format!("{owner:?}"), "Referable { value: 3, refs: 1 }");
    }
}
