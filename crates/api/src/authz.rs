//! API-side authorization guards.
//!
//! Permission checks run at the command boundary (before anything is created
//! or read), keeping the domain and infra crates auth-agnostic.

use minerep_auth::{AuthzError, CommandAuthorization, Principal, authorize};
use minerep_reporting::ReportJob;

use crate::context::PrincipalContext;

fn resolve(principal: &PrincipalContext) -> Principal {
    Principal::from_roles(principal.principal_id().clone(), principal.roles().to_vec())
}

/// Check every permission the command requires.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = resolve(principal);
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// A job is visible to its requester and to holders of the wildcard permission.
pub fn can_view_job(principal: &PrincipalContext, job: &ReportJob) -> bool {
    job.requested_by() == principal.principal_id().as_str() || resolve(principal).has_wildcard()
}
