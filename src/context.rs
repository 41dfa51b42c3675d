//! Per-thread stack of open indicators, used to infer parent/child nesting.
//!
//! An indicator created while another one is open on the same thread becomes its
//! child. The stack only holds weak references, so it never keeps an indicator
//! alive, and it is never shared between threads.

use std::{
    cell::RefCell,
    sync::{Arc, Weak},
};

use crate::progress::Shared;

thread_local! {
    static OPEN: RefCell<Vec<Weak<Shared>>> = const { RefCell::new(Vec::new()) };
}

/// Marks `shared` as the innermost open indicator of this thread.
pub(crate) fn push(shared: &Arc<Shared>) {
    OPEN.with_borrow_mut(|open| open.push(Arc::downgrade(shared)));
}

/// Forgets `shared`, along with any entries whose indicator is gone.
///
/// Disposing from a thread other than the creating one is a no-op here; the
/// creator's stack skips the stale entry on its next lookup.
pub(crate) fn remove(shared: &Arc<Shared>) {
    let target = Arc::downgrade(shared);
    OPEN.with_borrow_mut(|open| {
        if let Some(idx) = open.iter().rposition(|w| Weak::ptr_eq(w, &target)) {
            open.remove(idx);
        }
        open.retain(|w| w.strong_count() > 0);
    });
}

/// The innermost live indicator of this thread, if any.
pub(crate) fn current() -> Weak<Shared> {
    OPEN.with_borrow(|open| {
        open.iter()
            .rev()
            .find(|w| w.upgrade().is_some_and(|s| !s.is_disposed()))
            .cloned()
            .unwrap_or_default()
    })
}
