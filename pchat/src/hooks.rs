//! Exchange lifecycle hooks.
//!
//! ```rust
//! use pchat::{ExchangeHooks, NoopExchangeHooks};
//!
//! fn assert_hooks_trait(_hooks: &dyn ExchangeHooks) {}
//!
//! assert_hooks_trait(&NoopExchangeHooks);
//! ```

use std::time::Duration;

use pcommon::UserId;

use crate::{ChatError, ExchangeReport};

/// Which recovery step rewrote the history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    Repair,
    Strip,
}

impl RepairMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Repair => "repair",
            Self::Strip => "strip",
        }
    }
}

pub trait ExchangeHooks: Send + Sync {
    fn on_exchange_start(&self, _user_id: &UserId) {}

    fn on_round_complete(&self, _user_id: &UserId, _round: u32, _tool_calls: usize) {}

    fn on_history_repaired(&self, _user_id: &UserId, _removed: usize, _mode: RepairMode) {}

    fn on_storage_failure(&self, _user_id: &UserId, _error: &ChatError) {}

    fn on_exchange_complete(&self, _user_id: &UserId, _report: &ExchangeReport, _elapsed: Duration) {
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExchangeHooks;

impl ExchangeHooks for NoopExchangeHooks {}
