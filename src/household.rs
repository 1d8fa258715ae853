// 🏠 Household Model - Shared budgets with role-based membership
//
// A household is a group of users sharing one monthly budget.
// Every member carries exactly one role; roles form a total order
// OWNER > MEMBER > VIEWER used for minimum-privilege checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// PRINCIPAL
// ============================================================================

/// Authenticated user identity, produced upstream by the auth layer.
///
/// Immutable for the duration of a request; the core only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Principal {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }

    /// Identity as used for membership comparison (trimmed).
    pub fn normalized_id(&self) -> &str {
        self.id.trim()
    }
}

// ============================================================================
// ROLES
// ============================================================================

/// Role held by a member inside a household.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HouseholdRole {
    Owner,
    Member,
    Viewer,

    /// Anything the store returns that we don't recognise. Ranks below VIEWER.
    #[serde(other)]
    Unrecognized,
}

impl HouseholdRole {
    /// Numeric rank (higher = more authority). Unrecognized roles rank 0.
    pub const fn rank(&self) -> u8 {
        match self {
            HouseholdRole::Owner => 3,
            HouseholdRole::Member => 2,
            HouseholdRole::Viewer => 1,
            HouseholdRole::Unrecognized => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HouseholdRole::Owner => "OWNER",
            HouseholdRole::Member => "MEMBER",
            HouseholdRole::Viewer => "VIEWER",
            HouseholdRole::Unrecognized => "UNRECOGNIZED",
        }
    }

    /// Parse a stored role string. Case-insensitive; unknown values map to
    /// `Unrecognized` instead of failing.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "OWNER" => HouseholdRole::Owner,
            "MEMBER" => HouseholdRole::Member,
            "VIEWER" => HouseholdRole::Viewer,
            _ => HouseholdRole::Unrecognized,
        }
    }
}

impl fmt::Display for HouseholdRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum role an operation requires.
///
/// Ordered: `Owner > Member > Viewer`. A threshold, not an exact match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum RequiredRole {
    Viewer = 1,
    Member = 2,
    Owner = 3,
}

impl RequiredRole {
    pub const fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredRole::Owner => "OWNER",
            RequiredRole::Member => "MEMBER",
            RequiredRole::Viewer => "VIEWER",
        }
    }

    /// Whether a member holding `role` satisfies this threshold.
    pub fn is_satisfied_by(self, role: &HouseholdRole) -> bool {
        role.rank() >= self.rank()
    }
}

impl PartialOrd for RequiredRole {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RequiredRole {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for RequiredRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MEMBER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: String,
    pub role: HouseholdRole,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn new(user_id: impl Into<String>, role: HouseholdRole) -> Self {
        Member {
            user_id: user_id.into(),
            role,
            joined_at: Utc::now(),
        }
    }

    /// String-normalized identity comparison.
    pub fn is_user(&self, user_id: &str) -> bool {
        self.user_id.trim() == user_id.trim()
    }
}

// ============================================================================
// HOUSEHOLD
// ============================================================================

/// Error raised when a membership change would break a household invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MembershipError {
    #[error("user {0} is already a member of this household")]
    AlreadyMember(String),

    #[error("user id must not be empty")]
    EmptyUserId,
}

/// Household with its member list.
///
/// Invariants:
/// - at most one `Member` entry per user id
/// - created with exactly one OWNER (the creator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub id: String,
    pub name: String,
    pub invite_code: String,
    pub budget_limit: f64,
    pub members: Vec<Member>,
    pub created_at: DateTime<Utc>,
}

impl Household {
    /// Create a household owned by `owner_id`.
    pub fn create(
        name: impl Into<String>,
        owner_id: impl Into<String>,
        budget_limit: f64,
    ) -> Result<Self, MembershipError> {
        let owner_id = owner_id.into();
        if owner_id.trim().is_empty() {
            return Err(MembershipError::EmptyUserId);
        }

        Ok(Household {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            invite_code: generate_invite_code(),
            budget_limit,
            members: vec![Member::new(owner_id.trim(), HouseholdRole::Owner)],
            created_at: Utc::now(),
        })
    }

    pub fn find_member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.is_user(user_id))
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.find_member(user_id).is_some()
    }

    /// Add a member, rejecting duplicates.
    pub fn add_member(&mut self, user_id: &str, role: HouseholdRole) -> Result<&Member, MembershipError> {
        if user_id.trim().is_empty() {
            return Err(MembershipError::EmptyUserId);
        }
        if self.is_member(user_id) {
            return Err(MembershipError::AlreadyMember(user_id.to_string()));
        }

        self.members.push(Member::new(user_id.trim(), role));
        Ok(&self.members[self.members.len() - 1])
    }

    pub fn owners(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.role == HouseholdRole::Owner)
    }
}

/// A budget limit is a finite amount, zero or more.
pub fn is_valid_budget_limit(limit: f64) -> bool {
    limit.is_finite() && limit >= 0.0
}

/// Short, human-shareable invite code (8 uppercase hex chars).
pub fn generate_invite_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ranks() {
        assert_eq!(HouseholdRole::Owner.rank(), 3);
        assert_eq!(HouseholdRole::Member.rank(), 2);
        assert_eq!(HouseholdRole::Viewer.rank(), 1);
        assert_eq!(HouseholdRole::Unrecognized.rank(), 0);

        assert!(RequiredRole::Owner > RequiredRole::Member);
        assert!(RequiredRole::Member > RequiredRole::Viewer);
    }

    #[test]
    fn test_role_parse_is_lenient() {
        assert_eq!(HouseholdRole::parse("owner"), HouseholdRole::Owner);
        assert_eq!(HouseholdRole::parse(" MEMBER "), HouseholdRole::Member);
        assert_eq!(HouseholdRole::parse("ADMIN"), HouseholdRole::Unrecognized);
    }

    #[test]
    fn test_unknown_role_deserializes() {
        let member: Member = serde_json::from_value(serde_json::json!({
            "userId": "u9",
            "role": "SUPERUSER",
            "joinedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(member.role, HouseholdRole::Unrecognized);
        assert!(!RequiredRole::Viewer.is_satisfied_by(&member.role));
    }

    #[test]
    fn test_household_created_with_single_owner() {
        let household = Household::create("Flat 4B", "u1", 1000.0).unwrap();

        assert_eq!(household.members.len(), 1);
        assert_eq!(household.owners().count(), 1);
        assert_eq!(household.invite_code.len(), 8);
        assert!(household.is_member("u1"));
    }

    #[test]
    fn test_add_member_rejects_duplicates() {
        let mut household = Household::create("Flat 4B", "u1", 1000.0).unwrap();
        household.add_member("u2", HouseholdRole::Viewer).unwrap();

        let err = household.add_member(" u2", HouseholdRole::Member).unwrap_err();
        assert_eq!(err, MembershipError::AlreadyMember(" u2".to_string()));
        assert_eq!(household.members.len(), 2);
    }

    #[test]
    fn test_create_trims_owner_id() {
        let household = Household::create("Cabin", " u1 ", 300.0).unwrap();

        assert_eq!(household.members[0].user_id, "u1");
        assert!(household.is_member("u1"));
    }

    #[test]
    fn test_budget_limit_validation() {
        assert!(is_valid_budget_limit(0.0));
        assert!(is_valid_budget_limit(1000.0));
        assert!(!is_valid_budget_limit(-5.0));
        assert!(!is_valid_budget_limit(f64::NAN));
        assert!(!is_valid_budget_limit(f64::INFINITY));
    }

    #[test]
    fn test_create_requires_owner_id() {
        assert_eq!(
            Household::create("Empty", "  ", 0.0).unwrap_err(),
            MembershipError::EmptyUserId
        );
    }
}
