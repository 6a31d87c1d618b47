//! List Module
//!
//! Index-addressed sequences over an object container.
//!
//! - `StreamMappedList`: dense list; `remove_at` and `insert` shift later items
//! - `RecyclableList`: stable indices; `remove_at` leaves a hole that the next
//!   `push` reuses (most recent hole first)

mod mapped;
mod recyclable;

pub use mapped::StreamMappedList;
pub use recyclable::RecyclableList;
