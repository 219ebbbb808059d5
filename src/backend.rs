use std::panic::Location;

use crate::ReferableAfterFree;

mod counted;
pub use self::counted::*;

mod tracked;
pub use self::tracked::*;

mod uncounted;
pub use self::uncounted::*;

// === Site === //

/// The source location at which an owner or a reference was created.
pub type Site = &'static Location<'static>;

// === Mode === //

/// How much reference bookkeeping a [`Backend`] performs.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum Mode {
    /// No bookkeeping at all. Violations go undetected.
    Uncounted,

    /// One atomic counter per owner. Violations are detected but not attributed.
    Counted,

    /// A list of live references per owner, each tagged with its creation site.
    Tracked,
}

cfg_if::cfg_if! {
    if #[cfg(feature = "tracked")] {
        pub type DefaultBackend = Tracked;
    } else if #[cfg(feature = "counted")] {
        pub type DefaultBackend = Counted;
    } else if #[cfg(feature = "uncounted")] {
        pub type DefaultBackend = Uncounted;
    } else if #[cfg(debug_assertions)] {
        pub type DefaultBackend = Tracked;
    } else {
        pub type DefaultBackend = Counted;
    }
}

/// The bookkeeping mode selected for this build.
pub const ACTIVE_MODE: Mode = <DefaultBackend as Backend>::MODE;

// === Backend === //

mod sealed {
    pub trait Sealed {}
}

/// A reference bookkeeping strategy.
///
/// A backend value lives inside its owner (a [`Referable`](crate::Referable) or an
/// [`Anchor`](crate::Anchor)) at a stable address. Every live [`Ref`](crate::Ref) holds one
/// [`Backend::Link`] back into it.
///
/// This trait is sealed: the only implementors are [`Uncounted`], [`Counted`] and [`Tracked`].
pub trait Backend: 'static + Sized + Send + Sync + sealed::Sealed {
    const MODE: Mode;

    /// A registration held by a single reference.
    type Link: Send + Sync;

    fn new(owner: Site) -> Self;

    /// Records a new reference created at `site`.
    fn register(&self, site: Site) -> Self::Link;

    /// Records another reference, created at `site`, to the backend `link` is registered with.
    ///
    /// ## Safety
    ///
    /// The backend `link` was registered with must still be alive.
    ///
    unsafe fn fork(link: &Self::Link, site: Site) -> Self::Link;

    /// Removes the registration `link` stands for.
    ///
    /// ## Safety
    ///
    /// The backend `link` was registered with must still be alive.
    ///
    unsafe fn unregister(link: Self::Link);

    /// Reads the outstanding count of the backend `link` is registered with.
    ///
    /// ## Safety
    ///
    /// The backend `link` was registered with must still be alive.
    ///
    unsafe fn outstanding_via(link: &Self::Link) -> usize;

    /// The number of live references. Always zero for [`Uncounted`].
    fn outstanding(&self) -> usize;

    /// Checks the backend as its owner begins destruction, producing a diagnostic if any
    /// references are still outstanding.
    fn audit(&self) -> Option<ReferableAfterFree>;
}

/// A [`Backend`] which knows exactly how many references are alive.
///
/// Operations handing out exclusive access to an owned value are only offered for counting
/// backends, since an [`Uncounted`] owner cannot tell whether a reference still reads it.
pub trait Counting: Backend {}
