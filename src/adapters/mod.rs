// Adapters layer: concrete host-side implementations (output streams, tick sources).

pub mod outputs;
pub mod replay;

pub use outputs::CollectedOutputs;
pub use replay::{JsonLinesTickSource, MemoryTickSource};
