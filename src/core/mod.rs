pub mod codec;
pub mod forwarder;
pub mod runner;
pub mod snapshot;
pub mod stage;
pub mod stats;
pub mod tags;
pub mod transmitter;

pub use crate::domain::model::{
    Landmark, LandmarkList, Packet, PortSpec, SendPolicy, Snapshot, StageContract, StageSetup,
    StageVariant, TaggedEntry, Tick, Timestamp,
};
pub use crate::domain::ports::{ConfigProvider, OutputStreams, Stage, TickSource, Transport};
pub use crate::utils::error::Result;
