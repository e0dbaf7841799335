//! `dev6!`: key-classification traces from the mappers.
//!
//! Lines go to the `nexus_map::dev6` log target at trace level. A test can also capture them on its
//! own thread with [`enable_thread_sink`] and check them with [`captured`], no global logger needed.

use std::cell::RefCell;

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Capture stays on for this thread until the guard is dropped.
#[must_use]
pub struct SinkGuard(());

impl Drop for SinkGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| c.borrow_mut().take());
    }
}

pub fn enable_thread_sink() -> SinkGuard {
    CAPTURE.with(|c| *c.borrow_mut() = Some(Vec::new()));
    SinkGuard(())
}

#[doc(hidden)]
pub fn record(line: String) {
    CAPTURE.with(|c| {
        if let Some(lines) = c.borrow_mut().as_mut() {
            lines.push(line);
        }
    });
}

/// Whether a captured line on this thread contains `needle`.
pub fn captured(needle: &str) -> bool {
    CAPTURE.with(|c| c.borrow().iter().flatten().any(|line| line.contains(needle)))
}

#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let line = format!($($arg)*);
        log::trace!(target: "nexus_map::dev6", "{line}");
        $crate::utils::devlog::record(line);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_is_scoped_to_guard() {
        crate::dev6!("before enabling");
        {
            let _sink = enable_thread_sink();
            crate::dev6!("key {} -> {}", "field", "foo");
            assert!(captured("key field -> foo"));
            assert!(!captured("before enabling"));
        }
        assert!(!captured("key field -> foo"));
    }

    #[test]
    fn other_threads_are_not_captured() {
        let _sink = enable_thread_sink();
        let worker = std::thread::spawn(|| {
            crate::dev6!("worker line");
            captured("worker line")
        });
        assert!(!worker.join().unwrap());
        assert!(!captured("worker line"));
    }
}
