//! Domain models for the Transfer Manager

mod audit;
mod consignment;
mod item;
mod state;
mod transfer;

pub use audit::*;
pub use consignment::*;
pub use item::*;
pub use state::*;
pub use transfer::*;
