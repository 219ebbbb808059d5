use std::{
    fmt,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering::*},
};

use crate::{Backend, Counting, Mode, ReferableAfterFree, Site};

use super::sealed;

/// Registrations past this count are treated as a runaway leak.
const MAX_REFS: usize = isize::MAX as usize;

// === Counted === //

/// A backend which keeps a single atomic reference count per owner.
///
/// Destroying an owner with a non-zero count is reported, but nothing is known about where the
/// outstanding references came from.
#[derive(Debug, Default)]
pub struct Counted {
    refs: AtomicUsize,
}

impl sealed::Sealed for Counted {}

impl Counting for Counted {}

impl Backend for Counted {
    const MODE: Mode = Mode::Counted;

    type Link = CountedLink;

    fn new(_owner: Site) -> Self {
        Self::default()
    }

    fn register(&self, _site: Site) -> Self::Link {
        // The caller already holds a path to the owner so no ordering is needed here.
        let old = self.refs.fetch_add(1, Relaxed);

        if old >= MAX_REFS {
            std::process::abort();
        }

        CountedLink(NonNull::from(self))
    }

    unsafe fn fork(link: &Self::Link, site: Site) -> Self::Link {
        unsafe { link.0.as_ref() }.register(site)
    }

    unsafe fn unregister(link: Self::Link) {
        let old = unsafe { link.0.as_ref() }.refs.fetch_sub(1, Release);
        debug_assert_ne!(old, 0);
    }

    unsafe fn outstanding_via(link: &Self::Link) -> usize {
        unsafe { link.0.as_ref() }.outstanding()
    }

    fn outstanding(&self) -> usize {
        // Pairs with the `Release` decrement so that reads made through a dropped reference
        // happen-before whatever the owner does next.
        self.refs.load(Acquire)
    }

    fn audit(&self) -> Option<ReferableAfterFree> {
        let outstanding = self.outstanding();

        (outstanding != 0).then_some(ReferableAfterFree::Counted { outstanding })
    }
}

// === CountedLink === //

pub struct CountedLink(NonNull<Counted>);

// SAFETY: the link only ever touches the atomic counter it points to.
unsafe impl Send for CountedLink {}

unsafe impl Sync for CountedLink {}

impl fmt::Debug for CountedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CountedLink").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::Location;

    use crate::{Backend, Counted, ReferableAfterFree};

    #[test]
    fn counts_registrations() {
        let backend = Counted::new(Location::caller());

        let a = backend.register(Location::caller());
        let b = unsafe { Counted::fork(&a, Location::caller()) };
        assert_eq!(backend.outstanding(), 2);
        assert_eq!(unsafe { Counted::outstanding_via(&b) }, 2);

        unsafe { Counted::unregister(a) };
        assert_eq!(backend.outstanding(), 1);

        assert_eq!(
            backend.audit(),
            Some(ReferableAfterFree::Counted { outstanding: 1 })
        );

        unsafe { Counted::unregister(b) };
        assert_eq!(backend.outstanding(), 0);
        assert!(backend.audit().is_none());
    }
}
