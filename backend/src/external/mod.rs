//! External API integrations

pub mod lightspeed;

pub use lightspeed::{ConsignmentGateway, GatewayResponse, LightspeedClient};
