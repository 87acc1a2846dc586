//! Screen controllers.
//!
//! A screen owns its views and subscriptions. Mounting subscribes first
//! and then fetches, so changes that race the fetch are replayed on top of
//! the snapshot. Unmounting closes every subscription before returning.

use std::sync::{Mutex, MutexGuard};

pub mod lobby;
pub mod status;
pub mod thread;

pub use lobby::ChatListScreen;
pub use status::UserStatus;
pub use thread::{ThreadScreen, ThreadStatus};

/// Views are only ever locked for one synchronous update, so a poisoned
/// lock still holds a consistent view.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
