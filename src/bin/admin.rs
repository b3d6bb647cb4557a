use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use uuid::Uuid;

use callboard::{
    auth::password::hash_password,
    config::AppConfig,
    db,
    models::{NewOrganization, NewUser, NewUserOrganization, NewUserRole},
    repo::SUPER_ADMIN_ROLE,
    schema::{organizations, user_organizations, user_roles, users},
};

const USAGE: &str = "Usage:
  callboard-admin create-user <username> <password> [--super-admin]
  callboard-admin create-organization <name> <agent-ref> [slug]
  callboard-admin add-member <username> <organization-id> [--org-admin]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "admin",
        database_url = %config.redacted_database_url(),
        "loaded callboard configuration"
    );
    let pool = db::init_pool(&config.database_url)?;
    db::run_migrations(&pool)?;

    let command = command.clone();
    let rest = rest.to_vec();
    let output = tokio::task::spawn_blocking(move || -> Result<String> {
        let mut conn = pool.get().context("failed to acquire connection")?;
        match command.as_str() {
            "create-user" => create_user(&mut conn, &rest),
            "create-organization" => create_organization(&mut conn, &rest),
            "add-member" => add_member(&mut conn, &rest),
            other => bail!("unknown command: {other}\n{USAGE}"),
        }
    })
    .await
    .context("admin task panicked")??;

    println!("{output}");
    Ok(())
}

fn create_user(conn: &mut PgConnection, args: &[String]) -> Result<String> {
    let (username, password) = match args {
        [username, password, ..] => (username.trim(), password.as_str()),
        _ => bail!("create-user needs a username and a password\n{USAGE}"),
    };
    let super_admin = args.iter().skip(2).any(|arg| arg == "--super-admin");

    let user = NewUser {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: hash_password(password)?,
    };
    conn.transaction(|conn| -> Result<()> {
        diesel::insert_into(users::table)
            .values(&user)
            .execute(conn)
            .context("failed to insert user")?;
        if super_admin {
            diesel::insert_into(user_roles::table)
                .values(&NewUserRole {
                    user_id: user.id,
                    role: SUPER_ADMIN_ROLE.to_string(),
                })
                .execute(conn)
                .context("failed to grant super admin role")?;
        }
        Ok(())
    })?;

    Ok(format!("created user {} ({})", user.username, user.id))
}

fn create_organization(conn: &mut PgConnection, args: &[String]) -> Result<String> {
    let (name, agent_ref) = match args {
        [name, agent_ref, ..] => (name.trim(), agent_ref.trim()),
        _ => bail!("create-organization needs a name and an agent reference\n{USAGE}"),
    };
    if agent_ref.is_empty() {
        bail!("agent reference must not be empty");
    }

    let organization = NewOrganization {
        id: Uuid::new_v4(),
        name: name.to_string(),
        agent_id: agent_ref.to_string(),
        slug: args.get(2).map(|slug| slug.trim().to_string()),
    };
    diesel::insert_into(organizations::table)
        .values(&organization)
        .execute(conn)
        .context("failed to insert organization")?;

    Ok(format!(
        "created organization {} ({})",
        organization.name, organization.id
    ))
}

fn add_member(conn: &mut PgConnection, args: &[String]) -> Result<String> {
    let (username, organization_id) = match args {
        [username, organization_id, ..] => (
            username.trim(),
            Uuid::parse_str(organization_id.trim()).context("organization id must be a UUID")?,
        ),
        _ => bail!("add-member needs a username and an organization id\n{USAGE}"),
    };
    let is_org_admin = args.iter().skip(2).any(|arg| arg == "--org-admin");

    let user_id: Uuid = users::table
        .filter(users::username.eq(username))
        .select(users::id)
        .first(conn)
        .optional()?
        .with_context(|| format!("no user named {username}"))?;

    diesel::insert_into(user_organizations::table)
        .values(&NewUserOrganization {
            user_id,
            organization_id,
            is_org_admin,
        })
        .on_conflict_do_nothing()
        .execute(conn)
        .context("failed to add membership")?;

    Ok(format!("{username} is a member of {organization_id}"))
}
