//! Load lifecycle: state machine, registry, board index, and events.

pub mod board;
pub mod events;
pub mod registry;
pub mod transitions;

pub use board::{BoardColumn, BoardIndex, BoardLane, BoardView, LoadCard};
pub use events::{EventBus, LoadEvent};
pub use registry::{LoadRegistry, TransitionRequest};
