//! Business logic services for the Transfer Manager

pub mod audit;
pub mod consignment;
pub mod csrf;
pub mod diagnostics;
pub mod mirror;
pub mod sync;
pub mod transfer;
pub mod workflow;

pub use audit::OutboxRelay;
pub use consignment::ConsignmentSync;
pub use csrf::CsrfTokens;
pub use diagnostics::Diagnostics;
pub use mirror::MirrorService;
pub use sync::SyncFlag;
pub use transfer::TransferService;
pub use workflow::TransferWorkflow;
