//! Lookups the resolver, access checks and sync orchestrator depend on,
//! implemented for a live Postgres connection.

use chrono::Utc;
use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::select;
use uuid::Uuid;

use crate::config::CustomerMatchStrategy;
use crate::models::{
    Agent, Call, CallSyncChangeset, Customer, NewAgent, NewCall, NewCustomer, Organization,
};
use crate::schema::{agents, calls, customers, organizations, user_organizations, user_roles};

pub const SUPER_ADMIN_ROLE: &str = "super_admin";

pub trait AgentDirectory {
    fn agent_by_id(&mut self, id: Uuid) -> QueryResult<Option<Agent>>;
    fn agent_by_external_id(&mut self, external_id: &str) -> QueryResult<Option<Agent>>;
    fn agent_by_name(&mut self, name: &str) -> QueryResult<Option<Agent>>;
    fn organization_by_agent_ref(&mut self, agent_ref: &str) -> QueryResult<Option<Organization>>;
}

pub trait AccessDirectory {
    fn is_super_admin(&mut self, user_id: Uuid) -> QueryResult<bool>;
    fn is_member(&mut self, user_id: Uuid, organization_id: Uuid) -> QueryResult<bool>;
    fn organizations_for_user(&mut self, user_id: Uuid) -> QueryResult<Vec<Organization>>;
}

pub trait SyncStore: AgentDirectory {
    fn create_agent(&mut self, agent: NewAgent) -> QueryResult<Agent>;
    fn find_customer(
        &mut self,
        name: &str,
        strategy: CustomerMatchStrategy,
    ) -> QueryResult<Option<Customer>>;
    fn create_customer(&mut self, customer: NewCustomer) -> QueryResult<Customer>;
    fn find_call(&mut self, id: &str) -> QueryResult<Option<Call>>;
    /// Insert, or on id conflict overwrite the supplied fields, in one statement.
    fn upsert_call(&mut self, call: &NewCall) -> QueryResult<()>;
}

impl AgentDirectory for PgConnection {
    fn agent_by_id(&mut self, id: Uuid) -> QueryResult<Option<Agent>> {
        agents::table.find(id).first(self).optional()
    }

    fn agent_by_external_id(&mut self, external_id: &str) -> QueryResult<Option<Agent>> {
        agents::table
            .filter(agents::external_id.eq(external_id))
            .order(agents::created_at.asc())
            .first(self)
            .optional()
    }

    fn agent_by_name(&mut self, name: &str) -> QueryResult<Option<Agent>> {
        agents::table
            .filter(agents::name.eq(name))
            .order(agents::created_at.asc())
            .first(self)
            .optional()
    }

    fn organization_by_agent_ref(&mut self, agent_ref: &str) -> QueryResult<Option<Organization>> {
        organizations::table
            .filter(organizations::agent_id.eq(agent_ref))
            .order(organizations::created_at.asc())
            .first(self)
            .optional()
    }
}

impl AccessDirectory for PgConnection {
    fn is_super_admin(&mut self, user_id: Uuid) -> QueryResult<bool> {
        select(exists(
            user_roles::table
                .filter(user_roles::user_id.eq(user_id))
                .filter(user_roles::role.eq(SUPER_ADMIN_ROLE)),
        ))
        .get_result(self)
    }

    fn is_member(&mut self, user_id: Uuid, organization_id: Uuid) -> QueryResult<bool> {
        select(exists(
            user_organizations::table
                .filter(user_organizations::user_id.eq(user_id))
                .filter(user_organizations::organization_id.eq(organization_id)),
        ))
        .get_result(self)
    }

    fn organizations_for_user(&mut self, user_id: Uuid) -> QueryResult<Vec<Organization>> {
        organizations::table
            .filter(
                organizations::id.eq_any(
                    user_organizations::table
                        .filter(user_organizations::user_id.eq(user_id))
                        .select(user_organizations::organization_id),
                ),
            )
            .order(organizations::name.asc())
            .load(self)
    }
}

impl SyncStore for PgConnection {
    fn create_agent(&mut self, agent: NewAgent) -> QueryResult<Agent> {
        diesel::insert_into(agents::table)
            .values(&agent)
            .get_result(self)
    }

    fn find_customer(
        &mut self,
        name: &str,
        strategy: CustomerMatchStrategy,
    ) -> QueryResult<Option<Customer>> {
        let query = customers::table.order(customers::created_at.asc()).into_boxed();
        let query = match strategy {
            CustomerMatchStrategy::ExactName => query.filter(customers::name.eq(name.to_string())),
            CustomerMatchStrategy::CaseInsensitiveName => {
                query.filter(customers::name.ilike(escape_like(name)))
            }
        };
        query.first(self).optional()
    }

    fn create_customer(&mut self, customer: NewCustomer) -> QueryResult<Customer> {
        diesel::insert_into(customers::table)
            .values(&customer)
            .get_result(self)
    }

    fn find_call(&mut self, id: &str) -> QueryResult<Option<Call>> {
        calls::table.find(id.to_string()).first(self).optional()
    }

    fn upsert_call(&mut self, call: &NewCall) -> QueryResult<()> {
        let changes = CallSyncChangeset::from_new_call(call, Utc::now().naive_utc());
        diesel::insert_into(calls::table)
            .values(call)
            .on_conflict(calls::id)
            .do_update()
            .set(&changes)
            .execute(self)?;
        Ok(())
    }
}

/// Escapes `%`, `_` and `\` so user text matches literally in LIKE patterns.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
