//! Core type definitions for the kernel.
//!
//! This module defines the fundamental types shared by the scheduler, the
//! entity registry and the coupling layer.

use std::fmt;

/// Simulation time in nanoseconds.
///
/// Every event, interaction and time-advance grant uses the same `SimTime`
/// representation, so the kernel and all paired federates share one timeline.
pub type SimTime = u64;

/// Unique string identifier of a simulation unit (e.g. `veh_0`, `rsu_3`).
///
/// Identifiers live in one flat namespace across all unit kinds.
pub type UnitId = String;

/// Identifier of a V2X message.
pub type MessageId = i32;

pub const NANOSECOND: SimTime = 1;
pub const MICROSECOND: SimTime = 1_000 * NANOSECOND;
pub const MILLISECOND: SimTime = 1_000 * MICROSECOND;
pub const SECOND: SimTime = 1_000 * MILLISECOND;
pub const MINUTE: SimTime = 60 * SECOND;
pub const HOUR: SimTime = 60 * MINUTE;

/// Formats a [`SimTime`] as seconds with a nanosecond fraction for log output.
///
/// ```
/// use cosim_kernel::types::{TimeDisplay, SECOND};
///
/// assert_eq!(TimeDisplay(5 * SECOND + 250).to_string(), "5.000000250 s");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeDisplay(pub SimTime);

impl From<&SimTime> for TimeDisplay {
    fn from(time: &SimTime) -> Self {
        TimeDisplay(*time)
    }
}

impl fmt::Display for TimeDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09} s", self.0 / SECOND, self.0 % SECOND)
    }
}
