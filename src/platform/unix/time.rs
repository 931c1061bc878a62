#![allow(unsafe_code)]

use crate::error::fatal;

/// `CLOCK_REALTIME` is read in nanoseconds.
pub(crate) const CALENDAR_FREQUENCY: u64 = 1_000_000_000;

fn read_clock(id: libc::clockid_t) -> Option<u64> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out-pointer for the duration of the call.
    if unsafe { libc::clock_gettime(id, &mut ts) } != 0 {
        return None;
    }
    Some(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
}

/// Tick frequency of the monotonic counter, or `None` if the host lacks one.
pub(crate) fn monotonic_frequency() -> Option<u64> {
    read_clock(libc::CLOCK_MONOTONIC).map(|_| 1_000_000_000)
}

pub(crate) fn monotonic_counter() -> u64 {
    // The clock answered once when the frequency was queried; a later
    // failure means the host broke its own contract.
    read_clock(libc::CLOCK_MONOTONIC).unwrap_or_else(|| fatal("clock_gettime(CLOCK_MONOTONIC)"))
}

/// Nanoseconds since the Unix epoch.
pub(crate) fn calendar_counter() -> u64 {
    read_clock(libc::CLOCK_REALTIME).unwrap_or_else(|| fatal("clock_gettime(CLOCK_REALTIME)"))
}

pub(crate) fn sleep_ms(ms: u64) {
    let mut req = libc::timespec {
        tv_sec: (ms / 1000) as libc::time_t,
        tv_nsec: ((ms % 1000) * 1_000_000) as libc::c_long,
    };
    let mut rem = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // Restart with the remainder when a signal interrupts the sleep.
    // SAFETY: both pointers are valid for each call.
    while unsafe { libc::nanosleep(&req, &mut rem) } != 0 {
        if super::errno() != libc::EINTR {
            break;
        }
        req = rem;
    }
}
