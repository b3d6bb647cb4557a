use diesel::QueryResult;
use tracing::debug;
use uuid::Uuid;

use crate::repo::AgentDirectory;

/// Outcome of mapping a caller-supplied agent identifier to an agent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentResolution {
    Found(Uuid),
    /// An organization references the identifier, but no agent row matches it.
    /// Callers apply no agent filter.
    FoundNoFilter,
    NotFound,
}

impl AgentResolution {
    pub fn agent_id(&self) -> Option<Uuid> {
        match self {
            AgentResolution::Found(id) => Some(*id),
            AgentResolution::FoundNoFilter | AgentResolution::NotFound => None,
        }
    }
}

/// Tries, in order: agent id, agent external id, agent name, organization
/// agent reference. The first hit wins.
pub fn resolve_agent<D>(directory: &mut D, external_id: &str) -> QueryResult<AgentResolution>
where
    D: AgentDirectory + ?Sized,
{
    let candidate = external_id.trim();
    if candidate.is_empty() {
        return Ok(AgentResolution::NotFound);
    }

    if let Ok(id) = Uuid::parse_str(candidate) {
        if let Some(agent) = directory.agent_by_id(id)? {
            debug!(agent_ref = candidate, agent_id = %agent.id, "agent resolved by id");
            return Ok(AgentResolution::Found(agent.id));
        }
    }

    if let Some(agent) = directory.agent_by_external_id(candidate)? {
        debug!(agent_ref = candidate, agent_id = %agent.id, "agent resolved by external id");
        return Ok(AgentResolution::Found(agent.id));
    }

    if let Some(agent) = directory.agent_by_name(candidate)? {
        debug!(agent_ref = candidate, agent_id = %agent.id, "agent resolved by name");
        return Ok(AgentResolution::Found(agent.id));
    }

    if let Some(organization) = directory.organization_by_agent_ref(candidate)? {
        debug!(
            agent_ref = candidate,
            organization_id = %organization.id,
            "agent reference belongs to an organization without an agent row"
        );
        return Ok(AgentResolution::FoundNoFilter);
    }

    debug!(agent_ref = candidate, "agent reference did not resolve");
    Ok(AgentResolution::NotFound)
}
