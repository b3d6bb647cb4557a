use tracing::warn;
use uuid::Uuid;

use crate::repo::AccessDirectory;

/// Decides whether `user_id` may see data for an organization and/or agent.
///
/// Checks run in order and the first positive one grants access: no scope
/// requested, super-admin role, organization membership, an organization of
/// the user referencing `agent_ref`. A failing lookup is logged and counts as
/// a negative for that check only.
pub fn has_access<D>(
    directory: &mut D,
    user_id: Uuid,
    organization_id: Option<Uuid>,
    agent_ref: Option<&str>,
) -> bool
where
    D: AccessDirectory + ?Sized,
{
    let agent_ref = agent_ref.map(str::trim).filter(|value| !value.is_empty());
    if organization_id.is_none() && agent_ref.is_none() {
        return true;
    }

    match directory.is_super_admin(user_id) {
        Ok(true) => return true,
        Ok(false) => {}
        Err(err) => warn!(%user_id, error = %err, "role lookup failed during access check"),
    }

    if let Some(organization_id) = organization_id {
        match directory.is_member(user_id, organization_id) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => warn!(
                %user_id,
                %organization_id,
                error = %err,
                "membership lookup failed during access check"
            ),
        }
    }

    if let Some(agent_ref) = agent_ref {
        match directory.organizations_for_user(user_id) {
            Ok(organizations) => {
                if organizations.iter().any(|org| org.agent_id == agent_ref) {
                    return true;
                }
            }
            Err(err) => warn!(
                %user_id,
                agent_ref,
                error = %err,
                "organization lookup failed during access check"
            ),
        }
    }

    false
}
