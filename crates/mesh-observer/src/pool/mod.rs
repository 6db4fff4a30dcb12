//! Recyclable slot pool.
//!
//! - [`SlotPool`]: lock-guarded free list with replenishment and async wake-ups
//! - [`MeshSlot`]: the pooled container, reset by [`MeshSlot::recycle`] before release

mod free_list;
mod slot;

pub use free_list::SlotPool;
pub use slot::{MeshSlot, SlotView};
