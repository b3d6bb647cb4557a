use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use callboard::auth::jwt::JwtService;
use callboard::auth::password::hash_password;
use callboard::config::{AppConfig, CustomerMatchStrategy};
use callboard::db::{self, PgPool, MIGRATIONS};
use callboard::elevenlabs::{HttpTransport, RetryPolicy, TransportError};
use callboard::models::{
    NewAgent, NewCall, NewCustomer, NewOrganization, NewUser, NewUserOrganization, NewUserRole,
};
use callboard::repo::SUPER_ADMIN_ROLE;
use callboard::routes;
use callboard::schema;
use callboard::state::AppState;
use chrono::NaiveDateTime;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const VOICE_BASE_URL: &str = "https://voice.test";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Answers voice API requests by URL path, or by path and `agent_id` query
/// parameter when scripted per agent; unknown paths get a 404.
#[derive(Default)]
pub struct FakeVoiceApi {
    routes: StdMutex<HashMap<String, (u16, String)>>,
    requests: StdMutex<Vec<String>>,
    watched_pool: StdMutex<Option<PgPool>>,
    checked_out: StdMutex<Vec<u32>>,
}

impl FakeVoiceApi {
    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(path.to_string(), (status, body.to_string()));
    }

    /// Scripts `path` for requests filtered by `agent_id` only.
    #[allow(dead_code)]
    pub fn respond_for_agent(&self, path: &str, agent_id: &str, status: u16, body: Value) {
        self.respond(&agent_route(path, agent_id), status, body);
    }

    /// Records how many of `pool`'s connections are checked out whenever a
    /// request arrives.
    #[allow(dead_code)]
    pub fn watch_pool(&self, pool: PgPool) {
        *self.watched_pool.lock().expect("pool lock") = Some(pool);
    }

    #[allow(dead_code)]
    pub fn checked_out_during_requests(&self) -> Vec<u32> {
        self.checked_out.lock().expect("checked out lock").clone()
    }

    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Conversation listing URLs sent for `agent_id`, oldest first.
    #[allow(dead_code)]
    pub fn listings_for(&self, agent_id: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|url| reqwest::Url::parse(&url).ok())
            .filter(|url| url.path() == "/v1/convai/conversations")
            .filter(|url| {
                url.query_pairs()
                    .any(|(name, value)| name == "agent_id" && value == agent_id)
            })
            .map(String::from)
            .collect()
    }
}

fn agent_route(path: &str, agent_id: &str) -> String {
    format!("{path}?agent_id={agent_id}")
}

#[async_trait]
impl HttpTransport for FakeVoiceApi {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        let path = request.url().path().to_string();
        let agent_id = request
            .url()
            .query_pairs()
            .find(|(name, _)| name == "agent_id")
            .map(|(_, value)| value.into_owned());
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.url().to_string());
        if let Some(pool) = self.watched_pool.lock().expect("pool lock").as_ref() {
            let state = pool.state();
            self.checked_out
                .lock()
                .expect("checked out lock")
                .push(state.connections - state.idle_connections);
        }
        let (status, body) = {
            let routes = self.routes.lock().expect("routes lock");
            agent_id
                .and_then(|agent_id| routes.get(&agent_route(&path, &agent_id)))
                .or_else(|| routes.get(&path))
                .cloned()
                .unwrap_or_else(|| (404, r#"{"detail":"not found"}"#.to_string()))
        };
        let response = axum::http::Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(body)
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(reqwest::Response::from(response))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub voice: Arc<FakeVoiceApi>,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_api_key(Some("test-key")).await
    }

    pub async fn with_api_key(api_key: Option<&str>) -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            elevenlabs_api_key: api_key.map(str::to_string),
            elevenlabs_base_url: VOICE_BASE_URL.to_string(),
            elevenlabs_timeout: Duration::from_secs(5),
            elevenlabs_retry: RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            stats_cache_ttl: Duration::from_secs(60),
            stats_cache_max_entries: 16,
            customer_match_strategy: CustomerMatchStrategy::ExactName,
            sync_agent_ids: Vec::new(),
            sync_interval: Duration::from_secs(60),
            sync_max_pages: 5,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let voice = Arc::new(FakeVoiceApi::default());
        let transport: Arc<dyn HttpTransport> = voice.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, jwt, transport);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            voice,
            router,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    pub async fn insert_user(&self, username: &str, password: &str) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                username,
                password_hash: hash_password(&password)?,
            };
            diesel::insert_into(schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn grant_super_admin(&self, user_id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(schema::user_roles::table)
                .values(&NewUserRole {
                    user_id,
                    role: SUPER_ADMIN_ROLE.to_string(),
                })
                .execute(conn)
                .context("failed to grant role")?;
            Ok(())
        })
        .await
    }

    /// Creates an organization referencing `agent_ref` with `user_id` as a member.
    #[allow(dead_code)]
    pub async fn insert_organization(
        &self,
        name: &str,
        agent_ref: &str,
        member: Option<Uuid>,
    ) -> Result<Uuid> {
        let organization = NewOrganization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            agent_id: agent_ref.to_string(),
            slug: None,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(schema::organizations::table)
                .values(&organization)
                .execute(conn)
                .context("failed to insert organization")?;
            if let Some(user_id) = member {
                diesel::insert_into(schema::user_organizations::table)
                    .values(&NewUserOrganization {
                        user_id,
                        organization_id: organization.id,
                        is_org_admin: false,
                    })
                    .execute(conn)
                    .context("failed to insert membership")?;
            }
            Ok(organization.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn insert_agent(&self, name: &str, external_id: Option<&str>) -> Result<Uuid> {
        let agent = NewAgent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            external_id: external_id.map(str::to_string),
            provider: Some("elevenlabs".to_string()),
            role: "assistant".to_string(),
            status: Some("active".to_string()),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(schema::agents::table)
                .values(&agent)
                .execute(conn)
                .context("failed to insert agent")?;
            Ok(agent.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn insert_customer(&self, name: &str) -> Result<Uuid> {
        let customer = NewCustomer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: None,
            phone: None,
            company: None,
        };
        self.with_conn(move |conn| {
            diesel::insert_into(schema::customers::table)
                .values(&customer)
                .execute(conn)
                .context("failed to insert customer")?;
            Ok(customer.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn insert_call(
        &self,
        id: &str,
        agent_id: Uuid,
        customer_id: Uuid,
        date: &str,
        duration: i32,
        satisfaction_score: Option<f64>,
    ) -> Result<()> {
        let call = NewCall {
            id: id.to_string(),
            agent_id,
            customer_id,
            date: NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S")
                .context("call date must be YYYY-MM-DD HH:MM:SS")?,
            duration,
            audio_url: None,
            transcript: None,
            summary: Some(format!("summary of {id}")),
            satisfaction_score,
            tags: Value::Array(Vec::new()),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(schema::calls::table)
                .values(&call)
                .execute(conn)
                .context("failed to insert call")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn count_calls(&self) -> Result<i64> {
        self.with_conn(|conn| {
            schema::calls::table
                .count()
                .get_result(conn)
                .context("failed to count calls")
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        anyhow::ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_json(response.into_body()).await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response lacks access_token"))
    }

    /// A user with a token, optionally a super admin.
    #[allow(dead_code)]
    pub async fn user_with_token(&self, username: &str, super_admin: bool) -> Result<(Uuid, String)> {
        let user_id = self.insert_user(username, "password123").await?;
        if super_admin {
            self.grant_super_admin(user_id).await?;
        }
        let token = self.login_token(username, "password123").await?;
        Ok((user_id, token))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_to_json(body: Body) -> Result<Value> {
    let bytes = body_to_vec(body).await?;
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE calls, customers, user_organizations, organizations, user_roles, agents, sync_status, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
