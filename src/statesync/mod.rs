pub mod statesync;
pub mod wire;

pub use statesync::StateSync;
