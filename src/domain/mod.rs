// Domain layer: landmark / snapshot model and the seams (ports) the stage is built against.

pub mod model;
pub mod ports;
