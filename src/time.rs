// ── Time source ───────────────────────────────────────────────────────────────
//
// One fine-grained tick count, read once per call, scaled to seconds,
// milliseconds or microseconds with integer arithmetic, so the three units
// never drift against each other.  The monotonic counter is preferred; its
// frequency is queried once and cached.  Hosts without one fall back to the
// calendar clock, which always exists but jumps with wall-clock adjustments.

use crate::config::{ClockPreference, HostConfig};
use crate::once::InitCell;
use crate::platform::sys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Monotonic,
    /// Wall-clock time since the Unix epoch.
    Calendar,
}

/// A tick source plus its frequency (ticks per second).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    source: ClockSource,
    frequency: u64,
}

impl Clock {
    /// Pick a source: the monotonic counter unless the preference says
    /// otherwise or the host has none.
    pub fn detect(preference: ClockPreference) -> Self {
        if preference != ClockPreference::Calendar {
            if let Some(frequency) = sys::time::monotonic_frequency().filter(|&f| f > 0) {
                return Self {
                    source: ClockSource::Monotonic,
                    frequency,
                };
            }
        }
        Self::calendar()
    }

    pub fn calendar() -> Self {
        Self {
            source: ClockSource::Calendar,
            frequency: sys::time::CALENDAR_FREQUENCY,
        }
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn ticks(&self) -> u64 {
        match self.source {
            ClockSource::Monotonic => sys::time::monotonic_counter(),
            ClockSource::Calendar => sys::time::calendar_counter(),
        }
    }

    fn scaled(&self, per_second: u64) -> i64 {
        scale(self.ticks(), self.frequency, per_second)
    }

    pub fn seconds(&self) -> i64 {
        self.scaled(1)
    }

    pub fn millis(&self) -> i64 {
        self.scaled(1_000)
    }

    pub fn micros(&self) -> i64 {
        self.scaled(1_000_000)
    }
}

/// `ticks * per_second / frequency` without intermediate overflow.
fn scale(ticks: u64, frequency: u64, per_second: u64) -> i64 {
    let v = ticks as u128 * per_second as u128 / frequency as u128;
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// The process-wide clock, selected once.
pub fn clock() -> &'static Clock {
    static CLOCK: InitCell<Clock> = InitCell::new();

    CLOCK.get_or_init(|| {
        let clock = Clock::detect(HostConfig::global().clock);
        tracing::debug!(
            source = ?clock.source,
            frequency = clock.frequency,
            "keel: clock selected"
        );
        clock
    })
}

pub fn now_seconds() -> i64 {
    clock().seconds()
}

pub fn now_millis() -> i64 {
    clock().millis()
}

pub fn now_micros() -> i64 {
    clock().micros()
}

/// Sleep for `ms` milliseconds; negative durations sleep for zero.
pub fn sleep(ms: i64) {
    sys::time::sleep_ms(ms.max(0) as u64);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_are_non_decreasing_on_monotonic_clock() {
        let clock = Clock::detect(ClockPreference::Monotonic);
        if clock.source() != ClockSource::Monotonic {
            return; // host has no high-resolution counter
        }

        let mut last = clock.micros();
        for _ in 0..10_000 {
            let now = clock.micros();
            assert!(now >= last, "{now} < {last}");
            last = now;
        }
    }

    #[test]
    fn units_agree_with_each_other() {
        let s = now_seconds();
        let ms = now_millis();
        let us = now_micros();
        assert!(ms / 1_000 >= s);
        assert!(us / 1_000 >= ms);
        // Three back-to-back reads land within a second of each other.
        assert!(ms / 1_000 - s <= 1);
    }

    #[test]
    fn calendar_clock_tracks_unix_epoch() {
        let clock = Clock::calendar();
        assert_eq!(clock.source(), ClockSource::Calendar);

        let std_secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("after epoch")
            .as_secs() as i64;
        assert!((clock.seconds() - std_secs).abs() <= 2);
    }

    #[test]
    fn calendar_preference_forces_fallback() {
        assert_eq!(
            Clock::detect(ClockPreference::Calendar).source(),
            ClockSource::Calendar
        );
    }

    #[test]
    fn sleep_waits_and_clamps_negative() {
        let start = now_millis();
        sleep(20);
        assert!(now_millis() - start >= 19);

        let start = now_millis();
        sleep(-5_000);
        assert!(now_millis() - start < 1_000);
    }

    #[test]
    fn scale_handles_large_tick_counts() {
        // 10 MHz counter after ~58 years of uptime: ticks * 1e6 overflows u64.
        let ticks = 18_446_744_073_709_551u64;
        assert_eq!(scale(ticks, 10_000_000, 1_000_000), 1_844_674_407_370_955);
        assert_eq!(scale(ticks, 10_000_000, 1), 1_844_674_407);
    }
}
