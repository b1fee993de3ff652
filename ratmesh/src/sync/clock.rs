// Ratmesh: Slot-Synchronized Mesh Scheduling and Routing
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module containing the monotonic clock abstraction driving the slot discipline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Source of monotonic time for the scheduler. The production implementation is
/// [`MonotonicClock`]; tests substitute a [`ManualClock`] to drive rounds
/// deterministically.
pub trait Clock: Send + Sync {
    /// Current monotonic time in microseconds.
    fn now_us(&self) -> u64;

    /// Current monotonic time in milliseconds.
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }
}

fn process_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// Monotonic wall clock, microseconds since process start.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        process_origin().elapsed().as_micros() as u64
    }
}

/// Current monotonic time in microseconds.
pub fn monotonic_us() -> u64 {
    MonotonicClock.now_us()
}

/// Current monotonic time in milliseconds.
pub fn monotonic_ms() -> u64 {
    MonotonicClock.now_ms()
}

/// Hand-driven clock. Cloned handles share the same time value.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// A manual clock starting at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the absolute time in microseconds.
    pub fn set_us(&self, us: u64) {
        self.now_us.store(us, Ordering::SeqCst);
    }

    /// Advance the clock by the given number of microseconds.
    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock;
        let a = clock.now_us();
        let b = clock.now_us();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_handles_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.set_us(500);
        other.advance_us(250);
        assert_eq!(clock.now_us(), 750);
        assert_eq!(clock.now_ms(), 0);
        clock.advance_us(999_250);
        assert_eq!(other.now_ms(), 1000);
    }
}
