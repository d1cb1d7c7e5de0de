//! Runtime primitives: depth-isolated pools, interruption, id dispatch.

mod ids;
mod interrupt;
mod pools;

pub use ids::IdDispatcher;
pub use interrupt::InterruptionRegistry;
pub use pools::LevelPools;
