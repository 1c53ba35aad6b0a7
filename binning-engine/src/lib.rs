// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Incremental binning engine: per-source downsampled bins over a sliding
//! time window, with multi-source dispatch and non-blocking subscriber
//! fan-out.

pub mod binner;
pub mod bins;
pub mod dispatcher;
pub mod error;
pub mod subscription;

pub use binner::{Binner, BinnerCounters};
pub use bins::{AddOutcome, Bin};
pub use dispatcher::{BinDispatcher, BinnerHandle, BinnerKey};
pub use error::BinningError;
pub use subscription::{SubscriberSet, Subscription};
