//! Shallow-water state and dynamics simulator.

mod dynamics;
mod state;

pub use dynamics::SweModel;
pub use state::SweState;
