//! Application State
//!
//! Shared state for the wealth server, accessible from all route handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::devnet::Devnet;
use crate::services::controller::{BalanceController, Providers};
use crate::types::Address;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Balance controller for the connected wallet
    controller: Arc<BalanceController>,
    /// Chain the wallet connects through
    devnet: Devnet,
    /// Server start time
    start_time: Instant,
}

impl AppState {
    /// Create a new application state
    pub fn new(controller: Arc<BalanceController>, devnet: Devnet) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                controller,
                devnet,
                start_time: Instant::now(),
            }),
        }
    }

    pub fn controller(&self) -> &Arc<BalanceController> {
        &self.inner.controller
    }

    pub fn devnet(&self) -> &Devnet {
        &self.inner.devnet
    }

    /// Wallet providers for a dev account, if the account exists
    pub fn providers_for(&self, account: &Address) -> Option<Providers> {
        self.inner.devnet.providers_for(account)
    }

    /// Get server uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }
}
