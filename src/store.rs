// 🗄️ Household Membership Store - Durable households, members, and spend
//
// The guard only needs `find_by_id`. The rest (create, invite join,
// budget limit, expense ledger, per-user alerts) backs the thin HTTP glue
// and the admin CLI.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, SecondsFormat, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use crate::events::BudgetStatus;
use crate::household::{Household, HouseholdRole, Member};

// ============================================================================
// EXPENSE
// ============================================================================

/// One spend entry against a household budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub household_id: String,
    pub user_id: String,
    pub amount: f64,
    pub description: String,
    pub spent_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        household_id: &str,
        user_id: &str,
        amount: f64,
        description: impl Into<String>,
        spent_at: DateTime<Utc>,
    ) -> Self {
        Expense {
            id: uuid::Uuid::new_v4().to_string(),
            household_id: household_id.to_string(),
            user_id: user_id.to_string(),
            amount,
            description: description.into(),
            spent_at,
        }
    }
}

// ============================================================================
// ALERT
// ============================================================================

/// Persisted over-budget notice for one member. Unlike the websocket push,
/// it survives until the member marks it read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub household_id: String,
    pub user_id: String,
    pub message: String,
    pub percentage_used: f64,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn budget_exceeded(
        household: &Household,
        user_id: &str,
        status: &BudgetStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Alert {
            id: uuid::Uuid::new_v4().to_string(),
            household_id: household.id.clone(),
            user_id: user_id.trim().to_string(),
            message: format!(
                "{} is over budget: {:.2} spent of {:.2} ({:.1}%)",
                household.name, status.total_spent_this_month, status.budget_limit, status.percentage_used
            ),
            percentage_used: status.percentage_used,
            read: false,
            created_at,
        }
    }

    /// One unread alert per member of the household.
    pub fn for_members(household: &Household, status: &BudgetStatus, created_at: DateTime<Utc>) -> Vec<Alert> {
        household
            .members
            .iter()
            .map(|m| Alert::budget_exceeded(household, &m.user_id, status, created_at))
            .collect()
    }
}

/// `[start, end)` of the calendar month (UTC) containing `at`.
pub fn month_bounds(at: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (year, month) = (at.year(), at.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };

    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow!("invalid month start {}-{}", year, month))?;
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow!("invalid month start {}-{}", next_year, next_month))?;

    Ok((start, end))
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Durable record of households and their members.
#[async_trait]
pub trait HouseholdStore: Send + Sync {
    /// Lookup by id. `Ok(None)` when the household does not exist.
    async fn find_by_id(&self, household_id: &str) -> Result<Option<Household>>;

    async fn find_by_invite_code(&self, invite_code: &str) -> Result<Option<Household>>;

    /// Households the user belongs to, in any role.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Household>>;

    async fn insert_household(&self, household: &Household) -> Result<()>;

    /// Persist a member entry. Callers check the one-entry-per-user
    /// invariant on the `Household` first; stores also reject duplicates.
    async fn insert_member(&self, household_id: &str, member: &Member) -> Result<()>;

    /// Returns false when the household does not exist.
    async fn set_budget_limit(&self, household_id: &str, budget_limit: f64) -> Result<bool>;

    async fn record_expense(&self, expense: &Expense) -> Result<()>;

    /// Sum of expenses in the calendar month containing `at`.
    async fn spent_in_month(&self, household_id: &str, at: DateTime<Utc>) -> Result<f64>;

    async fn record_alerts(&self, alerts: &[Alert]) -> Result<()>;

    async fn find_alert(&self, alert_id: &str) -> Result<Option<Alert>>;

    /// Newest first.
    async fn list_alerts_for_user(&self, user_id: &str) -> Result<Vec<Alert>>;

    /// Returns false when the alert does not exist.
    async fn mark_alert_read(&self, alert_id: &str) -> Result<bool>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Process-local store, used by tests and demo runs.
#[derive(Clone, Default)]
pub struct InMemoryHouseholdStore {
    households: Arc<RwLock<HashMap<String, Household>>>,
    expenses: Arc<RwLock<Vec<Expense>>>,
    alerts: Arc<RwLock<Vec<Alert>>>,
}

impl InMemoryHouseholdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a household directly, bypassing creation rules.
    pub fn with_household(self, household: Household) -> Self {
        if let Ok(mut households) = self.households.write() {
            households.insert(household.id.clone(), household);
        }
        self
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("household store lock poisoned")
}

#[async_trait]
impl HouseholdStore for InMemoryHouseholdStore {
    async fn find_by_id(&self, household_id: &str) -> Result<Option<Household>> {
        let households = self.households.read().map_err(poisoned)?;
        Ok(households.get(household_id).cloned())
    }

    async fn find_by_invite_code(&self, invite_code: &str) -> Result<Option<Household>> {
        let households = self.households.read().map_err(poisoned)?;
        Ok(households
            .values()
            .find(|h| h.invite_code.eq_ignore_ascii_case(invite_code.trim()))
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Household>> {
        let households = self.households.read().map_err(poisoned)?;
        let mut found: Vec<Household> = households
            .values()
            .filter(|h| h.is_member(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn insert_household(&self, household: &Household) -> Result<()> {
        let mut households = self.households.write().map_err(poisoned)?;
        if households.contains_key(&household.id) {
            return Err(anyhow!("household {} already exists", household.id));
        }
        households.insert(household.id.clone(), household.clone());
        Ok(())
    }

    async fn insert_member(&self, household_id: &str, member: &Member) -> Result<()> {
        let mut households = self.households.write().map_err(poisoned)?;
        let household = households
            .get_mut(household_id)
            .ok_or_else(|| anyhow!("household {} not found", household_id))?;

        household
            .add_member(&member.user_id, member.role.clone())
            .map(|_| ())
            .map_err(anyhow::Error::from)
    }

    async fn set_budget_limit(&self, household_id: &str, budget_limit: f64) -> Result<bool> {
        let mut households = self.households.write().map_err(poisoned)?;
        match households.get_mut(household_id) {
            Some(household) => {
                household.budget_limit = budget_limit;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_expense(&self, expense: &Expense) -> Result<()> {
        self.expenses.write().map_err(poisoned)?.push(expense.clone());
        Ok(())
    }

    async fn spent_in_month(&self, household_id: &str, at: DateTime<Utc>) -> Result<f64> {
        let (start, end) = month_bounds(at)?;
        let expenses = self.expenses.read().map_err(poisoned)?;
        Ok(expenses
            .iter()
            .filter(|e| e.household_id == household_id && e.spent_at >= start && e.spent_at < end)
            .map(|e| e.amount)
            .sum())
    }

    async fn record_alerts(&self, alerts: &[Alert]) -> Result<()> {
        self.alerts.write().map_err(poisoned)?.extend_from_slice(alerts);
        Ok(())
    }

    async fn find_alert(&self, alert_id: &str) -> Result<Option<Alert>> {
        let alerts = self.alerts.read().map_err(poisoned)?;
        Ok(alerts.iter().find(|a| a.id == alert_id).cloned())
    }

    async fn list_alerts_for_user(&self, user_id: &str) -> Result<Vec<Alert>> {
        let alerts = self.alerts.read().map_err(poisoned)?;
        let mut found: Vec<Alert> = alerts
            .iter()
            .filter(|a| a.user_id == user_id.trim())
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn mark_alert_read(&self, alert_id: &str) -> Result<bool> {
        let mut alerts = self.alerts.write().map_err(poisoned)?;
        match alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery (in-memory databases report "memory")
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS households (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            invite_code TEXT UNIQUE NOT NULL,
            budget_limit REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS household_members (
            household_id TEXT NOT NULL REFERENCES households(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            PRIMARY KEY (household_id, user_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            household_id TEXT NOT NULL REFERENCES households(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            amount REAL NOT NULL,
            description TEXT NOT NULL,
            spent_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            household_id TEXT NOT NULL REFERENCES households(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            message TEXT NOT NULL,
            percentage_used REAL NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_members_user ON household_members(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_household_time ON expenses(household_id, spent_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alerts_user ON alerts(user_id, created_at)",
        [],
    )?;

    Ok(())
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteHouseholdStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHouseholdStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to set up household schema")?;
        Ok(SqliteHouseholdStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(poisoned)
    }
}

fn alert_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    let created_at: String = row.get(6)?;
    Ok(Alert {
        id: row.get(0)?,
        household_id: row.get(1)?,
        user_id: row.get(2)?,
        message: row.get(3)?,
        percentage_used: row.get(4)?,
        read: row.get(5)?,
        created_at: parse_time(&created_at)?,
    })
}

fn load_household(conn: &Connection, household_id: &str) -> Result<Option<Household>> {
    let row = conn
        .query_row(
            "SELECT id, name, invite_code, budget_limit, created_at
             FROM households WHERE id = ?1",
            params![household_id],
            |row| {
                let created_at: String = row.get(4)?;
                Ok(Household {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    invite_code: row.get(2)?,
                    budget_limit: row.get(3)?,
                    members: Vec::new(),
                    created_at: parse_time(&created_at)?,
                })
            },
        )
        .optional()?;

    let Some(mut household) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id, role, joined_at FROM household_members
         WHERE household_id = ?1
         ORDER BY joined_at, user_id",
    )?;
    household.members = stmt
        .query_map(params![household_id], |row| {
            let role: String = row.get(1)?;
            let joined_at: String = row.get(2)?;
            Ok(Member {
                user_id: row.get(0)?,
                role: HouseholdRole::parse(&role),
                joined_at: parse_time(&joined_at)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(household))
}

#[async_trait]
impl HouseholdStore for SqliteHouseholdStore {
    async fn find_by_id(&self, household_id: &str) -> Result<Option<Household>> {
        let conn = self.lock()?;
        load_household(&conn, household_id)
    }

    async fn find_by_invite_code(&self, invite_code: &str) -> Result<Option<Household>> {
        let conn = self.lock()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM households WHERE invite_code = ?1 COLLATE NOCASE",
                params![invite_code.trim()],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            Some(id) => load_household(&conn, &id),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Household>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT h.id FROM households h
             JOIN household_members m ON m.household_id = h.id
             WHERE m.user_id = ?1
             ORDER BY h.created_at",
        )?;
        let ids = stmt
            .query_map(params![user_id.trim()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut households = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(household) = load_household(&conn, &id)? {
                households.push(household);
            }
        }
        Ok(households)
    }

    async fn insert_household(&self, household: &Household) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO households (id, name, invite_code, budget_limit, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                household.id,
                household.name,
                household.invite_code,
                household.budget_limit,
                format_time(&household.created_at),
            ],
        )
        .with_context(|| format!("Failed to insert household {}", household.id))?;

        for member in &household.members {
            tx.execute(
                "INSERT INTO household_members (household_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    household.id,
                    member.user_id.trim(),
                    member.role.as_str(),
                    format_time(&member.joined_at),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn insert_member(&self, household_id: &str, member: &Member) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO household_members (household_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                household_id,
                member.user_id.trim(),
                member.role.as_str(),
                format_time(&member.joined_at),
            ],
        )
        .with_context(|| format!("Failed to add {} to household {}", member.user_id, household_id))?;
        Ok(())
    }

    async fn set_budget_limit(&self, household_id: &str, budget_limit: f64) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE households SET budget_limit = ?1 WHERE id = ?2",
            params![budget_limit, household_id],
        )?;
        Ok(updated > 0)
    }

    async fn record_expense(&self, expense: &Expense) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO expenses (id, household_id, user_id, amount, description, spent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                expense.id,
                expense.household_id,
                expense.user_id,
                expense.amount,
                expense.description,
                format_time(&expense.spent_at),
            ],
        )?;
        Ok(())
    }

    async fn spent_in_month(&self, household_id: &str, at: DateTime<Utc>) -> Result<f64> {
        let (start, end) = month_bounds(at)?;
        let conn = self.lock()?;
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0.0) FROM expenses
             WHERE household_id = ?1 AND spent_at >= ?2 AND spent_at < ?3",
            params![household_id, format_time(&start), format_time(&end)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    async fn record_alerts(&self, alerts: &[Alert]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for alert in alerts {
            tx.execute(
                "INSERT INTO alerts (id, household_id, user_id, message, percentage_used, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    alert.id,
                    alert.household_id,
                    alert.user_id,
                    alert.message,
                    alert.percentage_used,
                    alert.read,
                    format_time(&alert.created_at),
                ],
            )
            .with_context(|| format!("Failed to record alert for {}", alert.user_id))?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn find_alert(&self, alert_id: &str) -> Result<Option<Alert>> {
        let conn = self.lock()?;
        let alert = conn
            .query_row(
                "SELECT id, household_id, user_id, message, percentage_used, is_read, created_at
                 FROM alerts WHERE id = ?1",
                params![alert_id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    async fn list_alerts_for_user(&self, user_id: &str) -> Result<Vec<Alert>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, household_id, user_id, message, percentage_used, is_read, created_at
             FROM alerts WHERE user_id = ?1
             ORDER BY created_at DESC, id",
        )?;
        let alerts = stmt
            .query_map(params![user_id.trim()], alert_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    async fn mark_alert_read(&self, alert_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let updated = conn.execute("UPDATE alerts SET is_read = 1 WHERE id = ?1", params![alert_id])?;
        Ok(updated > 0)
    }
}
