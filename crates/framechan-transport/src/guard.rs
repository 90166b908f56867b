use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use tracing::trace;

/// Sentinel stored in place of a descriptor once the guard has been released.
const CLOSED: RawFd = -1;

/// Owns a file descriptor that several threads may use while another thread
/// tears it down.
///
/// Every I/O call takes a [`Pin`] first. [`FdGuard::release`] marks the
/// descriptor closed, shuts the socket down so parked `poll`/`recv` calls
/// return, waits for all pins to be dropped, and only then closes the
/// descriptor. A thread that loaded the descriptor before the swap therefore
/// never acts on a closed (or reused) descriptor number.
///
/// Both sides follow a store-then-load pattern (pin: increment then load fd;
/// release: swap fd then load pins), so every access is `SeqCst`.
#[derive(Debug)]
pub struct FdGuard {
    fd: AtomicI32,
    pins: AtomicUsize,
}

impl FdGuard {
    /// Take ownership of `fd`.
    pub fn new(fd: OwnedFd) -> Self {
        Self {
            fd: AtomicI32::new(fd.into_raw_fd()),
            pins: AtomicUsize::new(0),
        }
    }

    /// Pin the descriptor for the duration of one I/O call.
    ///
    /// Returns `None` once the guard has been released.
    pub fn pin(&self) -> Option<Pin<'_>> {
        self.pins.fetch_add(1, Ordering::SeqCst);
        let fd = self.fd.load(Ordering::SeqCst);
        if fd == CLOSED {
            self.pins.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Pin { guard: self, fd })
    }

    /// Close the descriptor once no pin references it.
    ///
    /// Safe to call from any thread, any number of times. Returns `true` only
    /// for the call that actually released the descriptor.
    pub fn release(&self) -> bool {
        let fd = self.fd.swap(CLOSED, Ordering::SeqCst);
        if fd == CLOSED {
            return false;
        }

        // SAFETY: `fd` was owned by this guard and is still open; only the caller
        // that won the swap reaches this point.
        unsafe {
            libc::shutdown(fd, libc::SHUT_RDWR);
        }

        let mut spins = 0u64;
        while self.pins.load(Ordering::SeqCst) != 0 {
            spins += 1;
            std::thread::yield_now();
        }
        if spins > 0 {
            trace!(fd, spins, "drained pinned users before close");
        }

        // SAFETY: no pin remains, and the swap above guarantees no new pin can
        // observe `fd`, so this is the sole owner.
        drop(unsafe { OwnedFd::from_raw_fd(fd) });
        true
    }

    /// Whether [`FdGuard::release`] has been called.
    pub fn is_closed(&self) -> bool {
        self.fd.load(Ordering::SeqCst) == CLOSED
    }

    /// Number of I/O calls currently holding a pin.
    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }
}

impl Drop for FdGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// A live reference to the guarded descriptor. Unpins on drop.
#[derive(Debug)]
pub struct Pin<'a> {
    guard: &'a FdGuard,
    fd: RawFd,
}

impl Pin<'_> {
    /// The pinned descriptor. Valid until this pin is dropped.
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        self.guard.pins.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    use super::*;

    fn guarded_pair() -> (FdGuard, UnixStream) {
        let (left, right) = UnixStream::pair().unwrap();
        (FdGuard::new(OwnedFd::from(left)), right)
    }

    #[test]
    fn pin_counts_and_unpins_on_drop() {
        let (guard, _peer) = guarded_pair();

        let first = guard.pin().unwrap();
        let second = guard.pin().unwrap();
        assert_eq!(guard.pin_count(), 2);
        assert_eq!(first.fd(), second.fd());

        drop(first);
        assert_eq!(guard.pin_count(), 1);
        drop(second);
        assert_eq!(guard.pin_count(), 0);
    }

    #[test]
    fn pin_fails_after_release() {
        let (guard, _peer) = guarded_pair();
        assert!(guard.release());

        assert!(guard.is_closed());
        assert!(guard.pin().is_none());
        assert_eq!(guard.pin_count(), 0);
    }

    #[test]
    fn release_is_idempotent() {
        let (guard, _peer) = guarded_pair();
        assert!(guard.release());
        assert!(!guard.release());
        assert!(!guard.release());
    }

    #[test]
    fn concurrent_release_closes_exactly_once() {
        let (guard, _peer) = guarded_pair();
        let guard = Arc::new(guard);
        let barrier = Arc::new(Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    guard.release()
                })
            })
            .collect();

        let released = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(released, 1);
        assert!(guard.is_closed());
    }

    #[test]
    fn release_waits_for_pinned_user() {
        let (guard, mut peer) = guarded_pair();
        let guard = Arc::new(guard);
        let finished = Arc::new(AtomicBool::new(false));

        let pin = guard.pin().unwrap();
        let fd = pin.fd();

        let releaser = {
            let guard = Arc::clone(&guard);
            let finished = Arc::clone(&finished);
            std::thread::spawn(move || {
                let won = guard.release();
                finished.store(true, Ordering::SeqCst);
                won
            })
        };

        // Shutdown happens before the drain, so the peer sees EOF right away.
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);

        std::thread::sleep(Duration::from_millis(50));
        assert!(guard.is_closed());
        assert!(!finished.load(Ordering::SeqCst));
        // SAFETY: F_GETFD only inspects descriptor flags.
        assert_ne!(unsafe { libc::fcntl(fd, libc::F_GETFD) }, -1);

        drop(pin);
        assert!(releaser.join().unwrap());
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(guard.pin_count(), 0);
    }
}
