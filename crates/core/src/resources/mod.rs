//! Live system resource probing.
//!
//! Sizes worker pools from CPU count and free memory, and refuses to
//! start work that would push the machine into swapping.

mod probe;
mod types;

pub use probe::{ResourceProbe, SysinfoProbe, SystemProbe};
pub use types::{Availability, SystemSnapshot, TaskClass};
