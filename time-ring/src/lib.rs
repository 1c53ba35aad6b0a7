//! Time-indexed circular storage.
//!
//! [`RingStore`] is the general mechanism: a fixed-capacity circular array
//! addressed by monotonically increasing logical positions, with automatic
//! reuse of the oldest slot as the head advances. [`TimeWindow`] wraps a
//! RingStore and maps wall-clock timestamps onto slots through a fixed
//! element time, giving an associative, time-ordered, auto-evicting
//! container.

pub mod error;
pub mod ring;
pub mod window;

pub use error::{RingError, TimeWindowError};
pub use ring::RingStore;
pub use window::TimeWindow;
