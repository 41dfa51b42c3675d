//! Interrupt and termination handling.
//!
//! While a scheduler has indicators on screen it is *armed*. On Ctrl-C, or when
//! the process is asked to terminate (`SIGTERM` and `SIGHUP` on Unix, console
//! close and shutdown events on Windows), each armed scheduler resets its scroll
//! region, shows the cursor and clears the current line before the process exits.
//! The process-wide handler is installed once, the first time anything is armed,
//! and stays installed; disarmed schedulers are simply skipped.

use std::{
    process,
    sync::{
        Once, Weak,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Exit status of a process killed by `SIGINT`, used for every handled signal.
const INTERRUPTED: i32 = 130;

/// Something that can put the terminal back the way it found it.
pub(crate) trait Restore: Send + Sync {
    fn restore(&self);
}

static ARMED: Mutex<Vec<(usize, Weak<dyn Restore>)>> = Mutex::new(Vec::new());
static INSTALL: Once = Once::new();
static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Identifies one scheduler in the armed set.
pub(crate) fn next_id() -> usize {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Adds `target` to the set restored on interrupt.
pub(crate) fn arm(id: usize, target: Weak<dyn Restore>) {
    INSTALL.call_once(|| {
        match ctrlc::set_handler(on_interrupt) {
            Ok(()) => debug!("interrupt handler installed"),
            Err(err) => warn!(%err, "could not install interrupt handler"),
        }
    });

    let mut armed = ARMED.lock();
    armed.retain(|(other, _)| *other != id);
    armed.push((id, target));
}

pub(crate) fn disarm(id: usize) {
    ARMED.lock().retain(|(other, _)| *other != id);
}

/// Restores and forgets every armed target that is still alive.
fn restore_armed() {
    let targets: Vec<_> = ARMED.lock().drain(..).collect();
    for (_, target) in targets {
        if let Some(target) = target.upgrade() {
            target.restore();
        }
    }
}

fn on_interrupt() {
    restore_armed();
    process::exit(INTERRUPTED);
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
    };

    use parking_lot::Mutex;

    use super::{ARMED, Restore, disarm, next_id, restore_armed};

    /// Both tests touch the process-wide armed set.
    static SERIAL: Mutex<()> = Mutex::new(());

    struct Counter(AtomicUsize);

    impl Restore for Counter {
        fn restore(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Arm/Disarm Bookkeeping
    /// Registering directly so the test never installs a real signal handler.
    #[test]
    fn test_disarm_removes_only_its_entry() {
        let _serial = SERIAL.lock();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        let (ia, ib) = (next_id(), next_id());
        let wa: Weak<dyn Restore> = Arc::downgrade(&a) as Weak<dyn Restore>;
        let wb: Weak<dyn Restore> = Arc::downgrade(&b) as Weak<dyn Restore>;
        ARMED.lock().push((ia, wa));
        ARMED.lock().push((ib, wb));

        disarm(ia);
        let remaining: Vec<usize> = ARMED
            .lock()
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| *id == ia || *id == ib)
            .collect();
        assert_eq!(remaining, vec![ib]);

        for (id, target) in ARMED.lock().iter() {
            if *id == ib {
                target.upgrade().unwrap().restore();
            }
        }
        assert_eq!(b.0.load(Ordering::Relaxed), 1);
        disarm(ib);
    }

    /// Signal Restore
    /// Live targets are restored once and the armed set is emptied; dropped ones are skipped.
    #[test]
    fn test_restore_armed_drains_live_targets() {
        let _serial = SERIAL.lock();
        let live = Arc::new(Counter(AtomicUsize::new(0)));
        let gone = Arc::new(Counter(AtomicUsize::new(0)));
        let (il, ig) = (next_id(), next_id());
        ARMED.lock().push((il, Arc::downgrade(&live) as Weak<dyn Restore>));
        ARMED.lock().push((ig, Arc::downgrade(&gone) as Weak<dyn Restore>));
        drop(gone);

        restore_armed();
        assert_eq!(live.0.load(Ordering::Relaxed), 1);
        assert!(ARMED.lock().iter().all(|(id, _)| *id != il && *id != ig));

        restore_armed();
        assert_eq!(live.0.load(Ordering::Relaxed), 1, "a drained target is not restored twice");
    }
}
