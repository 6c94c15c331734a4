//! Delivery strategies for rendered audio: paced chunk streaming and
//! whole-signal batch collection.

pub mod batch;
pub mod pacer;

pub use batch::{BatchCollector, BatchOutput};
pub use pacer::{Pacer, PacerConfig, PlaybackState};
