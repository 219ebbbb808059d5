//! The process-wide callback invoked when an owner is destroyed with outstanding references.
//!
//! Violations are never returned to the code that dropped the owner. Instead, the current handler
//! decides what happens next: the default [`handlers::raise`] logs the violation and panics with
//! the [`ReferableAfterFree`] as payload, [`handlers::log`] logs and carries on, and
//! [`handlers::abort`] logs and aborts the process. Any `Fn(&ReferableAfterFree)` can be installed
//! with [`set_handler`].
//!
//! When a handler returns normally, a [`Referable`](crate::Referable) keeps the memory its
//! outstanding references point into alive forever so that those references can still be read
//! and dropped. An [`Anchor`](crate::Anchor) cannot do the same for the value embedding it and
//! aborts the process instead. When a handler unwinds, the bookkeeping is leaked so that the
//! outstanding references can still be dropped.

use std::sync::Arc;

use parking_lot::{Mutex, const_mutex};

use crate::ReferableAfterFree;

pub type Handler = Arc<dyn Fn(&ReferableAfterFree) + Send + Sync>;

/// The installed handler, or `None` for the default one.
static HANDLER: Mutex<Option<Handler>> = const_mutex(None);

/// Installs `handler` as the process-wide violation handler.
pub fn set_handler(handler: impl Fn(&ReferableAfterFree) + Send + Sync + 'static) {
    replace_handler(Arc::new(handler));
}

/// Installs `handler` and returns the handler it replaced.
pub fn replace_handler(handler: Handler) -> Handler {
    let prev = HANDLER.lock().replace(handler);
    tracing::debug!("referable-after-free handler replaced");

    prev.unwrap_or_else(default_handler)
}

/// Returns the currently installed handler.
pub fn get_handler() -> Handler {
    HANDLER.lock().clone().unwrap_or_else(default_handler)
}

/// Reinstalls the default handler.
pub fn reset_handler() {
    *HANDLER.lock() = None;
}

/// Runs `f` with `handler` installed, restoring the previous handler afterwards even if `f`
/// unwinds.
pub fn with_handler<R>(
    handler: impl Fn(&ReferableAfterFree) + Send + Sync + 'static,
    f: impl FnOnce() -> R,
) -> R {
    let prev = HANDLER.lock().replace(Arc::new(handler));
    let _restore = scopeguard::guard(prev, |prev| {
        *HANDLER.lock() = prev;
    });

    f()
}

pub(crate) fn notify(violation: ReferableAfterFree) {
    // The lock is released before the handler runs so that handlers may replace themselves.
    let handler = get_handler();

    handler(&violation);
}

fn default_handler() -> Handler {
    Arc::new(handlers::raise)
}

pub mod handlers {
    use crate::ReferableAfterFree;

    /// Logs the violation and panics with it as the payload. This is the default handler.
    ///
    /// Panicking inside a destructor which is itself running because of a panic aborts the
    /// process.
    pub fn raise(violation: &ReferableAfterFree) {
        tracing::error!(%violation, "referable destroyed while still referenced");
        std::panic::panic_any(violation.clone());
    }

    /// Logs the violation and continues.
    pub fn log(violation: &ReferableAfterFree) {
        tracing::warn!(%violation, "referable destroyed while still referenced");
    }

    /// Logs the violation and aborts the process.
    pub fn abort(violation: &ReferableAfterFree) {
        tracing::error!(%violation, "referable destroyed while still referenced; aborting");
        std::process::abort();
    }
}
