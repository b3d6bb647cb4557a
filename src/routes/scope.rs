//! Which calls a user may see for a request.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::access::has_access;
use crate::error::{AppError, AppResult};
use crate::models::Organization;
use crate::repo::{AccessDirectory, AgentDirectory};
use crate::resolver::{resolve_agent, AgentResolution};
use crate::schema::organizations;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallScope {
    Everything,
    Agents(Vec<Uuid>),
    Nothing,
}

impl CallScope {
    pub fn is_empty(&self) -> bool {
        match self {
            CallScope::Nothing => true,
            CallScope::Agents(ids) => ids.is_empty(),
            CallScope::Everything => false,
        }
    }

    pub fn allows(&self, agent_id: Uuid) -> bool {
        match self {
            CallScope::Everything => true,
            CallScope::Agents(ids) => ids.contains(&agent_id),
            CallScope::Nothing => false,
        }
    }
}

/// Scope for an explicit agent reference. Unknown references see nothing;
/// known ones must pass the access check. A reference that matches no agent
/// row only widens to every call for super admins.
pub fn scope_for_agent(
    conn: &mut PgConnection,
    user_id: Uuid,
    agent_ref: &str,
) -> AppResult<CallScope> {
    let agent_ref = agent_ref.trim();
    if agent_ref.is_empty() {
        return Err(AppError::invalid_field("agentId", "agentId must not be empty"));
    }

    let resolution = resolve_agent(conn, agent_ref)?;
    if resolution == AgentResolution::NotFound {
        debug!(%user_id, agent_ref, "agent reference unknown, empty scope");
        return Ok(CallScope::Nothing);
    }
    if !agent_access(conn, user_id, agent_ref, resolution.agent_id())? {
        return Err(AppError::forbidden());
    }

    Ok(match resolution {
        AgentResolution::Found(id) => CallScope::Agents(vec![id]),
        AgentResolution::FoundNoFilter if conn.is_super_admin(user_id)? => CallScope::Everything,
        AgentResolution::FoundNoFilter => {
            debug!(%user_id, agent_ref, "agent reference has no agent row, empty scope");
            CallScope::Nothing
        }
        AgentResolution::NotFound => CallScope::Nothing,
    })
}

/// Scope for an organization, optionally narrowed to one of its agents.
pub fn scope_for_organization(
    conn: &mut PgConnection,
    user_id: Uuid,
    organization_id: Uuid,
    agent_ref: Option<&str>,
) -> AppResult<CallScope> {
    if !has_access(conn, user_id, Some(organization_id), None) {
        return Err(AppError::forbidden());
    }
    let organization: Organization = organizations::table
        .find(organization_id)
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;

    let agent_ref = agent_ref
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(organization.agent_id.as_str());
    scope_for_agent(conn, user_id, agent_ref)
}

/// Scope when the request names neither an organization nor an agent.
pub fn default_scope(conn: &mut PgConnection, user_id: Uuid) -> AppResult<CallScope> {
    if conn.is_super_admin(user_id)? {
        return Ok(CallScope::Everything);
    }

    let mut agent_ids = Vec::new();
    for organization in conn.organizations_for_user(user_id)? {
        // Organizations without an agent row would widen the scope to
        // everything, so only concrete agents count here.
        if let AgentResolution::Found(id) = resolve_agent(conn, &organization.agent_id)? {
            if !agent_ids.contains(&id) {
                agent_ids.push(id);
            }
        }
    }

    Ok(if agent_ids.is_empty() {
        CallScope::Nothing
    } else {
        CallScope::Agents(agent_ids)
    })
}

/// Access by the reference as given, then by the resolved agent's id and
/// external id, since organizations may store either.
pub fn agent_access(
    conn: &mut PgConnection,
    user_id: Uuid,
    agent_ref: &str,
    agent_id: Option<Uuid>,
) -> AppResult<bool> {
    if has_access(conn, user_id, None, Some(agent_ref)) {
        return Ok(true);
    }
    let Some(agent_id) = agent_id else {
        return Ok(false);
    };
    let Some(agent) = conn.agent_by_id(agent_id)? else {
        return Ok(false);
    };

    let alternates = [Some(agent.id.to_string()), agent.external_id];
    Ok(alternates
        .iter()
        .flatten()
        .filter(|candidate| candidate.as_str() != agent_ref)
        .any(|candidate| has_access(conn, user_id, None, Some(candidate.as_str()))))
}
