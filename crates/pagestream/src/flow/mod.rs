//! The pull-based signal protocol shared by every publisher in this crate.
mod demand;
mod interface;

pub use demand::*;
pub use interface::*;
