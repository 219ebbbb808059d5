use std::{fmt, iter, ptr::NonNull};

use parking_lot::Mutex;
use thunderdome::{Arena, Index};

use crate::{Backend, Counting, Mode, ReferableAfterFree, Site};

use super::sealed;

// === RefList === //

/// An intrusive-style doubly linked list of live references.
///
/// Nodes are stored in an arena and linked by index so that references may be moved freely in
/// memory without invalidating their neighbors. New nodes are pushed at the front, which makes
/// iteration order most-recent-first.
struct RefList {
    nodes: Arena<RefNode>,
    head: Option<Index>,
}

struct RefNode {
    site: Site,
    prev: Option<Index>,
    next: Option<Index>,
}

impl RefList {
    fn new() -> Self {
        Self {
            nodes: Arena::new(),
            head: None,
        }
    }

    fn push_front(&mut self, site: Site) -> Index {
        let node = self.nodes.insert(RefNode {
            site,
            prev: None,
            next: self.head,
        });

        if let Some(old_head) = self.head
            && let Some(old_head) = self.nodes.get_mut(old_head)
        {
            old_head.prev = Some(node);
        }

        self.head = Some(node);
        node
    }

    fn unlink(&mut self, node: Index) {
        let Some(RefNode { prev, next, .. }) = self.nodes.remove(node) else {
            debug_assert!(false, "unlinked a reference node twice");
            return;
        };

        match prev.and_then(|prev| self.nodes.get_mut(prev)) {
            Some(prev) => prev.next = next,
            None => self.head = next,
        }

        if let Some(next) = next.and_then(|next| self.nodes.get_mut(next)) {
            next.prev = prev;
        }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn sites(&self) -> impl Iterator<Item = Site> + '_ {
        let node = |index: Option<Index>| index.and_then(|index| self.nodes.get(index));

        iter::successors(node(self.head), move |current| node(current.next)).map(|node| node.site)
    }
}

// === Tracked === //

/// A backend which records the creation site of every live reference.
///
/// Every registration takes the owner's lock, which makes this the most expensive backend. In
/// exchange, a violation report lists exactly which references outlived their owner.
pub struct Tracked {
    owner: Site,
    refs: Mutex<RefList>,
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let refs = self.refs.lock();

        f.debug_struct("Tracked")
            .field("owner", &format_args!("{}", self.owner))
            .field("refs", &refs.sites().map(|site| site.to_string()).collect::<Vec<_>>())
            .finish()
    }
}

impl Tracked {
    /// The site at which the owner of this backend was created.
    pub fn owner(&self) -> Site {
        self.owner
    }

    /// The creation sites of every live reference, most recent first.
    pub fn sites(&self) -> Vec<Site> {
        self.refs.lock().sites().collect()
    }
}

impl sealed::Sealed for Tracked {}

impl Counting for Tracked {}

impl Backend for Tracked {
    const MODE: Mode = Mode::Tracked;

    type Link = TrackedLink;

    fn new(owner: Site) -> Self {
        Self {
            owner,
            refs: Mutex::new(RefList::new()),
        }
    }

    fn register(&self, site: Site) -> Self::Link {
        let node = self.refs.lock().push_front(site);

        tracing::trace!(owner = %self.owner, %site, "reference registered");

        TrackedLink {
            backend: NonNull::from(self),
            node,
        }
    }

    unsafe fn fork(link: &Self::Link, site: Site) -> Self::Link {
        unsafe { link.backend.as_ref() }.register(site)
    }

    unsafe fn unregister(link: Self::Link) {
        let backend = unsafe { link.backend.as_ref() };
        backend.refs.lock().unlink(link.node);

        tracing::trace!(owner = %backend.owner, "reference unregistered");
    }

    unsafe fn outstanding_via(link: &Self::Link) -> usize {
        unsafe { link.backend.as_ref() }.outstanding()
    }

    fn outstanding(&self) -> usize {
        self.refs.lock().len()
    }

    fn audit(&self) -> Option<ReferableAfterFree> {
        let refs = self.refs.lock();

        if refs.len() == 0 {
            return None;
        }

        Some(ReferableAfterFree::Tracked {
            owner: self.owner,
            outstanding: refs.len(),
            references: refs.sites().collect(),
        })
    }
}

// === TrackedLink === //

pub struct TrackedLink {
    backend: NonNull<Tracked>,
    node: Index,
}

// SAFETY: the link only ever touches the list through the backend's mutex.
unsafe impl Send for TrackedLink {}

unsafe impl Sync for TrackedLink {}

impl fmt::Debug for TrackedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedLink")
            .field("backend", &self.backend)
            .field("node", &self.node)
            .finish()
    }
}
