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

//! # Slot Synchronization
//!
//! This module contains the RA-TDMAs+ core: the [`SlotScheduler`] that owns the round
//! clock and the per-node slot boundaries, the arrival-delay buffers it aggregates, and
//! the [`Clock`] abstraction that lets tests drive the round deterministically.

mod clock;
mod delay;
mod scheduler;

pub use clock::{monotonic_ms, monotonic_us, Clock, ManualClock, MonotonicClock};
pub use delay::{DelayBuffer, DelaySample};
pub use scheduler::{SlotBoundary, SlotScheduler, MAX_SLOT_SHIFT_MS, ROUND_PERIOD_MS};
