use std::{
    mem,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread,
};

use parking_lot::{Mutex, const_mutex};

use crate::{ReferableAfterFree, handlers, with_handler};

/// Serializes tests which install process-wide handlers.
pub static HANDLER_LOCK: Mutex<()> = const_mutex(());

/// Runs `f` with a handler which records violations instead of raising them.
pub fn capture_violations<R>(f: impl FnOnce() -> R) -> (R, Vec<ReferableAfterFree>) {
    capture_with(false, f)
}

/// Runs `f` with a handler which records violations and then raises them like the default one,
/// catching the resulting panic.
pub fn capture_raised<R>(f: impl FnOnce() -> R) -> (thread::Result<R>, Vec<ReferableAfterFree>) {
    capture_with(true, || catch_unwind(AssertUnwindSafe(f)))
}

fn capture_with<R>(raise: bool, f: impl FnOnce() -> R) -> (R, Vec<ReferableAfterFree>) {
    let _guard = HANDLER_LOCK.lock();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let result = with_handler(
        {
            let seen = seen.clone();
            move |violation: &ReferableAfterFree| {
                seen.lock().push(violation.clone());

                if raise {
                    handlers::raise(violation);
                }
            }
        },
        f,
    );

    let seen = mem::take(&mut *seen.lock());
    (result, seen)
}
