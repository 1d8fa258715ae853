// 📡 Realtime Events - Fixed-schema payloads pushed to household members
//
// Frames on the wire are adjacently tagged: {"event": "<name>", "data": ...}.
// Consumers ignore unknown fields, so new fields can be added freely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Event name for over-budget notifications.
pub const BUDGET_WARNING: &str = "budget-warning";

// ============================================================================
// BUDGET STATUS
// ============================================================================

/// Budget status for one household and month, as computed by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub total_spent_this_month: f64,
    pub budget_limit: f64,
    pub remaining: f64,
    pub over_budget: bool,
    pub percentage_used: f64,
}

impl BudgetStatus {
    /// Derive a status from spend and limit.
    ///
    /// `percentage_used` is 0 when no positive limit is set.
    pub fn compute(total_spent_this_month: f64, budget_limit: f64) -> Self {
        let percentage_used = if budget_limit > 0.0 {
            total_spent_this_month / budget_limit * 100.0
        } else {
            0.0
        };

        BudgetStatus {
            total_spent_this_month,
            budget_limit,
            remaining: budget_limit - total_spent_this_month,
            over_budget: total_spent_this_month > budget_limit,
            percentage_used,
        }
    }

    /// Stamp this status for a household at `timestamp`.
    pub fn into_event(self, household_id: &str, timestamp: DateTime<Utc>) -> BudgetStatusEvent {
        BudgetStatusEvent {
            household_id: household_id.to_string(),
            total_spent_this_month: self.total_spent_this_month,
            budget_limit: self.budget_limit,
            remaining: self.remaining,
            over_budget: self.over_budget,
            percentage_used: self.percentage_used,
            timestamp,
        }
    }
}

/// Transient event produced per evaluation. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatusEvent {
    pub household_id: String,
    pub total_spent_this_month: f64,
    pub budget_limit: f64,
    pub remaining: f64,
    pub over_budget: bool,
    pub percentage_used: f64,
    /// Serialized as RFC 3339 (ISO-8601).
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// SERVER → CLIENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    BudgetWarning(BudgetStatusEvent),

    /// Ack for `join-household`
    JoinedHousehold(String),

    /// Ack for `leave-household`
    LeftHousehold(String),

    Error { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::BudgetWarning(_) => BUDGET_WARNING,
            ServerEvent::JoinedHousehold(_) => "joined-household",
            ServerEvent::LeftHousehold(_) => "left-household",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Check that the event may be broadcast to the group for `household_id`.
    pub fn validate_for_group(&self, household_id: &str) -> Result<(), ChannelError> {
        if household_id.trim().is_empty() {
            return Err(ChannelError::InvalidEvent("empty household id".to_string()));
        }

        match self {
            ServerEvent::BudgetWarning(status) => {
                if status.household_id != household_id {
                    return Err(ChannelError::InvalidEvent(format!(
                        "budget-warning for {} sent to group {}",
                        status.household_id, household_id
                    )));
                }
                if !status.total_spent_this_month.is_finite()
                    || !status.budget_limit.is_finite()
                    || !status.remaining.is_finite()
                    || !status.percentage_used.is_finite()
                {
                    return Err(ChannelError::InvalidEvent(
                        "budget-warning amounts must be finite".to_string(),
                    ));
                }
                Ok(())
            }
            ServerEvent::JoinedHousehold(_) | ServerEvent::LeftHousehold(_) | ServerEvent::Error { .. } => {
                Err(ChannelError::InvalidEvent(format!(
                    "{} is a direct reply, not a group event",
                    self.name()
                )))
            }
        }
    }

    pub fn to_json(&self) -> String {
        // Only plain data types here; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

// ============================================================================
// CLIENT → SERVER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinHousehold(String),
    LeaveHousehold(String),
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
