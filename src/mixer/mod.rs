//! Routing and dispatch of notes to outputs.
//!
//! The mixer owns the routing table, the per-(output, channel) control cache
//! and the registry of sounding notes. It guarantees at most one sounding
//! instance per (output, channel, note) no matter which thread asks.

mod router;
mod routing;
mod state;

pub use router::MixerRouter;
pub use routing::{
    pan_to_cc, transform, Dispatch, MasterSettings, OutputTarget, RoutingEntry, RoutingTable,
    TrackRef,
};
pub use state::{ChannelControlState, PlayingKey, PlayingNoteRecord, StopScope};
