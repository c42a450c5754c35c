//! Client-side core of the electoral analytics console.
//!
//! Nothing here talks to the network: the backend is reached through the
//! [`wizard::AnalysisBackend`] and [`aggregator::LiveFeed`] traits.

mod model;

pub mod aggregator;
pub mod counter;
pub mod normalize;
pub mod progress;
pub mod ticker;
pub mod wizard;

pub use crate::model::*;
