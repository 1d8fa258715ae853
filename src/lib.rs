// Household Budget - Core Library
// Role-guarded household access and realtime budget warnings.
// Exposes all modules for use in the admin CLI, API server, and tests

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod household;
pub mod notifier;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use channel::{Broadcaster, ChannelManager, Connection, ConnectionId};
pub use config::ServerConfig;
pub use error::{AccessError, ChannelError, ConfigError};
pub use events::{BudgetStatus, BudgetStatusEvent, ClientMessage, ServerEvent, BUDGET_WARNING};
pub use guard::{authorize_ownership, check_role, HouseholdAccess, RoleGuard};
pub use household::{
    is_valid_budget_limit, Household, HouseholdRole, Member, MembershipError, Principal, RequiredRole,
};
pub use notifier::{BudgetNotifier, NotifyOutcome};
pub use store::{
    setup_database, Alert, Expense, HouseholdStore, InMemoryHouseholdStore, SqliteHouseholdStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
