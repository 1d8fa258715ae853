// 🛡️ Role Authorization Guard - Minimum-role checks for household resources
//
// authorize(principal, household_id, required) resolves the caller's member
// entry and compares ranks (OWNER=3 > MEMBER=2 > VIEWER=1, unknown=0).
//
// An unknown household answers Unauthenticated, not NotFound, so that
// non-members cannot probe which household ids exist.

use std::sync::Arc;
use tracing::debug;

use crate::error::AccessError;
use crate::household::{Household, HouseholdRole, Member, Principal, RequiredRole};
use crate::store::HouseholdStore;

// ============================================================================
// AUTHORIZATION RESULT
// ============================================================================

/// Proof that a principal passed the guard for one household.
///
/// Handed to the next stage so it does not have to look the household up
/// again.
#[derive(Debug, Clone)]
pub struct HouseholdAccess {
    pub principal: Principal,
    pub household: Household,
    pub member: Member,
}

impl HouseholdAccess {
    pub fn household_id(&self) -> &str {
        &self.household.id
    }

    pub fn role(&self) -> &HouseholdRole {
        &self.member.role
    }
}

// ============================================================================
// PURE DECISIONS
// ============================================================================

fn require_principal(principal: Option<&Principal>) -> Result<&Principal, AccessError> {
    match principal {
        Some(p) if !p.normalized_id().is_empty() => Ok(p),
        _ => Err(AccessError::missing_principal()),
    }
}

/// Decide whether `principal` holds at least `required` in `household`.
///
/// Returns the matching member entry on success.
pub fn check_role(
    principal: &Principal,
    household: &Household,
    required: RequiredRole,
) -> Result<Member, AccessError> {
    let member = household
        .find_member(principal.normalized_id())
        .ok_or_else(AccessError::not_a_member)?;

    if member.role.rank() < required.rank() {
        return Err(AccessError::insufficient_role(required));
    }

    Ok(member.clone())
}

/// Allow only the owner of a resource not scoped by household role.
pub fn authorize_ownership(principal: Option<&Principal>, resource_owner_id: &str) -> Result<(), AccessError> {
    let principal = require_principal(principal)?;

    if principal.normalized_id() != resource_owner_id.trim() {
        debug!(user_id = %principal.id, "Resource ownership denied");
        return Err(AccessError::not_resource_owner());
    }
    Ok(())
}

// ============================================================================
// GUARD
// ============================================================================

#[derive(Clone)]
pub struct RoleGuard {
    store: Arc<dyn HouseholdStore>,
}

impl RoleGuard {
    pub fn new(store: Arc<dyn HouseholdStore>) -> Self {
        RoleGuard { store }
    }

    pub fn store(&self) -> &Arc<dyn HouseholdStore> {
        &self.store
    }

    /// Resolve and check access. Read-only against the store.
    pub async fn authorize(
        &self,
        principal: Option<&Principal>,
        household_id: &str,
        required: RequiredRole,
    ) -> Result<HouseholdAccess, AccessError> {
        let principal = require_principal(principal)?;

        let household_id = household_id.trim();
        if household_id.is_empty() {
            return Err(AccessError::missing_household_id());
        }

        let household = self
            .store
            .find_by_id(household_id)
            .await
            .map_err(AccessError::Store)?
            .ok_or_else(AccessError::household_not_found)?;

        let member = check_role(principal, &household, required).map_err(|e| {
            debug!(
                user_id = %principal.id,
                household_id,
                required = %required,
                reason = %e,
                "Household access denied"
            );
            e
        })?;

        Ok(HouseholdAccess {
            principal: principal.clone(),
            household,
            member,
        })
    }
}
