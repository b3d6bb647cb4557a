use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_roles)]
pub struct NewUserRole {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = agents)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub role: String,
    pub status: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = agents)]
pub struct NewAgent {
    pub id: Uuid,
    pub name: String,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub role: String,
    pub status: Option<String>,
}

/// `agent_id` holds either an agent UUID or the provider's external agent id.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = organizations)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub agent_id: String,
    pub slug: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = organizations)]
pub struct NewOrganization {
    pub id: Uuid,
    pub name: String,
    pub agent_id: String,
    pub slug: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_organizations)]
pub struct NewUserOrganization {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub is_org_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = customers)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = customers)]
pub struct NewCustomer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Associations)]
#[diesel(table_name = calls)]
#[diesel(belongs_to(Agent))]
#[diesel(belongs_to(Customer))]
pub struct Call {
    pub id: String,
    pub agent_id: Uuid,
    pub customer_id: Uuid,
    pub date: NaiveDateTime,
    pub duration: i32,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub satisfaction_score: Option<f64>,
    pub tags: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = calls)]
pub struct NewCall {
    pub id: String,
    pub agent_id: Uuid,
    pub customer_id: Uuid,
    pub date: NaiveDateTime,
    pub duration: i32,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub satisfaction_score: Option<f64>,
    pub tags: serde_json::Value,
}

/// Fields a re-sync may overwrite. `None` leaves the stored value untouched.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = calls)]
pub struct CallSyncChangeset {
    pub date: NaiveDateTime,
    pub duration: i32,
    pub audio_url: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub satisfaction_score: Option<f64>,
    pub tags: serde_json::Value,
    pub updated_at: NaiveDateTime,
}

impl CallSyncChangeset {
    pub fn from_new_call(call: &NewCall, now: NaiveDateTime) -> Self {
        Self {
            date: call.date,
            duration: call.duration,
            audio_url: call.audio_url.clone(),
            transcript: call.transcript.clone(),
            summary: call.summary.clone(),
            satisfaction_score: call.satisfaction_score,
            tags: call.tags.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = sync_status, primary_key(provider))]
pub struct SyncStatusRow {
    pub provider: String,
    pub status: String,
    pub last_sync_date: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sync_status)]
pub struct NewSyncStatus<'a> {
    pub provider: &'a str,
    pub status: &'a str,
    pub last_sync_date: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = sync_status)]
pub struct SyncStatusChangeset<'a> {
    pub status: &'a str,
    pub last_sync_date: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}
