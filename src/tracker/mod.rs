//! Lineage trackers
//!
//! [`Tracker`] records through an [`Adapter`](crate::adapter::Adapter);
//! [`TrackerHub`] streams to a visualization service. Both implement
//! [`LineageTracker`].

mod attrs;
mod basic;
mod hub;
mod stream;
mod traits;

pub use attrs::EdgeAttrs;
pub use basic::{Tracked, Tracker};
pub use hub::{HubConfig, HubEntry, TrackerHub};
pub use stream::{
    GephiConfig, GephiTransport, RecordingTransport, StreamEvent, StreamTransport,
};
pub use traits::LineageTracker;
