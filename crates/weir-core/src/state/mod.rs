//! Keyed state store and typed facades.

mod engine_state;
mod store;

pub use engine_state::EngineState;
pub use store::{MemoryStateStore, StateStore};
