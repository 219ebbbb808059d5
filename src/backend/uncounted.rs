use crate::{Backend, Mode, ReferableAfterFree, Site};

use super::sealed;

/// A backend which keeps no state whatsoever.
///
/// References cost exactly as much as a nullable pointer but destroying an owner while references
/// to it are still alive goes unnoticed and leaves those references dangling. Only select this
/// backend for programs whose reference discipline has already been validated with a checking
/// backend.
#[derive(Debug, Default, Copy, Clone)]
pub struct Uncounted;

impl sealed::Sealed for Uncounted {}

impl Backend for Uncounted {
    const MODE: Mode = Mode::Uncounted;

    type Link = ();

    fn new(_owner: Site) -> Self {
        Self
    }

    fn register(&self, _site: Site) -> Self::Link {}

    unsafe fn fork(_link: &Self::Link, _site: Site) -> Self::Link {}

    unsafe fn unregister(_link: Self::Link) {}

    unsafe fn outstanding_via(_link: &Self::Link) -> usize {
        0
    }

    fn outstanding(&self) -> usize {
        0
    }

    fn audit(&self) -> Option<ReferableAfterFree> {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::{mem::size_of, panic::Location, ptr::NonNull};

    use crate::{Backend, Ref, Uncounted};

    #[test]
    fn never_reports() {
        let backend = Uncounted::new(Location::caller());
        let link = backend.register(Location::caller());

        assert_eq!(backend.outstanding(), 0);
        assert!(backend.audit().is_none());

        unsafe { Uncounted::unregister(link) };
    }

    #[test]
    fn references_are_pointer_sized() {
        assert_eq!(size_of::<Ref<u32, Uncounted>>(), size_of::<Option<NonNull<u32>>>());
    }
}
