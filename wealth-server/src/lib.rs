// Library entry point for wealth-server
// Exposes core modules for testing and external use

pub mod clock;
pub mod config;
pub mod deploy;
pub mod devnet;
pub mod network;
pub mod registry;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use services::controller::{BalanceController, Outcome};
pub use state::AppState;
