//! Utilities for handling time.

use std::time::Instant;

/// Blocking, don't use with async.
pub fn sleep_until(target: Instant) {
    loop {
        let now = Instant::now();
        if let Some(d) = target.checked_duration_since(now) {
            std::thread::sleep(d);
        } else {
            break
        }
    }
}
