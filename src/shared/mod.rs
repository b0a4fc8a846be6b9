pub mod macros;
pub mod structs;
pub mod udp;

pub use structs::empty_requests;
pub use structs::Behaviour;
pub use structs::Button;
pub use structs::ButtonEvent;
pub use structs::CarState;
pub use structs::Direction;
pub use structs::Fault;
pub use structs::RequestMatrix;
