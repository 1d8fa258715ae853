// 🚨 Budget Threshold Notifier - Push over-budget warnings to a household
//
// Every over-budget evaluation broadcasts again; there is no crossing-edge
// state. Callers that want one warning per crossing must de-duplicate.
//
// Broadcast failures are logged and swallowed so that a missed notification
// never fails the budget change that triggered it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::channel::Broadcaster;
use crate::events::{BudgetStatus, ServerEvent};

/// What a `notify` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Status was within budget; nothing sent.
    Skipped,
    /// Warning handed to this many connections.
    Broadcast { delivered: usize },
    /// Broadcast failed; the error was logged.
    Failed,
}

#[derive(Clone)]
pub struct BudgetNotifier {
    channels: Arc<dyn Broadcaster>,
}

impl BudgetNotifier {
    pub fn new(channels: Arc<dyn Broadcaster>) -> Self {
        BudgetNotifier { channels }
    }

    pub fn notify(&self, household_id: &str, status: &BudgetStatus) -> NotifyOutcome {
        self.notify_at(household_id, status, Utc::now())
    }

    /// Same as `notify` with an explicit timestamp.
    pub fn notify_at(&self, household_id: &str, status: &BudgetStatus, now: DateTime<Utc>) -> NotifyOutcome {
        if !status.over_budget {
            return NotifyOutcome::Skipped;
        }

        let event = ServerEvent::BudgetWarning(status.clone().into_event(household_id, now));
        match self.channels.broadcast(household_id, event) {
            Ok(delivered) => {
                debug!(
                    household_id,
                    delivered,
                    percentage_used = status.percentage_used,
                    "Budget warning broadcast"
                );
                NotifyOutcome::Broadcast { delivered }
            }
            Err(e) => {
                warn!(household_id, error = %e, "Budget warning not delivered");
                NotifyOutcome::Failed
            }
        }
    }
}
