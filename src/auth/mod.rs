//! Role and zone-grant authorization.
//!
//! Identity arrives from the transport as a username; this module resolves
//! it to an [`Actor`] and decides whether that actor may read, write a
//! specific zone, or write global catalogs.
//!
//! | Role                        | Zone write                         |
//! |-----------------------------|------------------------------------|
//! | GOD, CODER, HEAD_BUILDER    | always                             |
//! | BUILDER                     | unexpired WRITE/ADMIN grant needed |
//! | IMMORTAL                    | never (read only)                  |
//! | PLAYER                      | never                              |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cms::errors::CmsError;
use crate::cms::keys::ZoneId;
use crate::cms::storage::CmsStore;
use crate::cms::types::{Role, UserRecord, ZoneGrantRecord, ZonePermission, USER_SCHEMA_VERSION};
use crate::logutil::escape_log;
use crate::validation::validate_username;

macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}

/// Resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }
}

/// The zone a mutation touches. Every zone-scoped write derives one from its
/// typed input before the guard runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneScope(pub ZoneId);

impl From<ZoneId> for ZoneScope {
    fn from(zone_id: ZoneId) -> Self {
        ZoneScope(zone_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

/// Pure zone-write rule; `grant` is the actor's grant for the zone, if any.
pub fn zone_write_decision(role: Role, grant: Option<&ZoneGrantRecord>, now: DateTime<Utc>) -> Decision {
    match role {
        Role::God | Role::Coder | Role::HeadBuilder => Decision::Allow,
        Role::Immortal => Decision::Deny("immortals are read-only"),
        Role::Builder => match grant {
            Some(g) if !g.is_active_at(now) => Decision::Deny("zone grant expired"),
            Some(g) if g.permission.allows_write() => Decision::Allow,
            Some(_) => Decision::Deny("zone grant is read-only"),
            None => Decision::Deny("no grant for zone"),
        },
        Role::Player => Decision::Deny("players cannot edit content"),
    }
}

/// Look up the caller. A missing or unknown name is `Unauthorized`.
pub fn resolve_actor(store: &CmsStore, username: Option<&str>) -> Result<Actor, CmsError> {
    let name = match username.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_ascii_lowercase(),
        _ => return Err(CmsError::Unauthorized("request carries no actor".to_string())),
    };
    match store.find_user(&name)? {
        Some(user) => Ok(Actor::new(user.username, user.role)),
        None => {
            sec_log!("Unknown actor '{}' rejected", escape_log(&name));
            Err(CmsError::Unauthorized(format!("unknown user '{}'", name)))
        }
    }
}

/// Any resolved actor may read.
pub fn authorize_read(_actor: &Actor) -> Result<(), CmsError> {
    Ok(())
}

pub fn authorize_zone_write(store: &CmsStore, actor: &Actor, scope: ZoneScope) -> Result<(), CmsError> {
    let grant = if actor.role == Role::Builder {
        store.find_grant(&actor.username, scope.0)?
    } else {
        None
    };
    match zone_write_decision(actor.role, grant.as_ref(), Utc::now()) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            crate::metrics::inc_auth_denials();
            sec_log!(
                "Denied zone {} write for {} ({:?}): {}",
                scope.0,
                actor.username,
                actor.role,
                reason
            );
            Err(CmsError::Forbidden(format!(
                "{} may not modify zone {}: {}",
                actor.username, scope.0, reason
            )))
        }
    }
}

/// Global catalogs (abilities, socials), zones themselves and staff
/// management need an elevated role.
pub fn authorize_global_write(actor: &Actor) -> Result<(), CmsError> {
    if actor.role.is_elevated() {
        return Ok(());
    }
    crate::metrics::inc_auth_denials();
    sec_log!("Denied global write for {} ({:?})", actor.username, actor.role);
    Err(CmsError::Forbidden(format!(
        "{} may not modify global content",
        actor.username
    )))
}

// ============================================================================
// Users and grants
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantInput {
    pub username: String,
    pub zone_id: ZoneId,
    pub permission: ZonePermission,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrantDto {
    pub username: String,
    pub zone_id: ZoneId,
    pub permission: ZonePermission,
    pub granted_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<ZoneGrantRecord> for GrantDto {
    fn from(g: ZoneGrantRecord) -> Self {
        Self {
            username: g.username,
            zone_id: g.zone_id,
            permission: g.permission,
            granted_by: g.granted_by,
            expires_at: g.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserDto {
    fn from(u: UserRecord) -> Self {
        Self {
            username: u.username,
            role: u.role,
            created_at: u.created_at,
        }
    }
}

pub fn grant_zone(store: &CmsStore, granted_by: &Actor, input: GrantInput) -> Result<GrantDto, CmsError> {
    let grant = ZoneGrantRecord {
        username: input.username.to_ascii_lowercase(),
        zone_id: input.zone_id,
        permission: input.permission,
        granted_by: granted_by.username.clone(),
        expires_at: input.expires_at,
        schema_version: USER_SCHEMA_VERSION,
    };
    let grant = store.put_grant(grant)?;
    log::info!(
        "{} granted {:?} on zone {} to {}",
        granted_by.username,
        grant.permission,
        grant.zone_id,
        grant.username
    );
    Ok(grant.into())
}

pub fn revoke_zone(store: &CmsStore, revoked_by: &Actor, username: &str, zone_id: ZoneId) -> Result<(), CmsError> {
    store.remove_grant(&username.to_ascii_lowercase(), zone_id)?;
    log::info!("{} revoked zone {} from {}", revoked_by.username, zone_id, username);
    Ok(())
}

pub fn list_grants(store: &CmsStore, username: &str) -> Result<Vec<GrantDto>, CmsError> {
    Ok(store
        .grants_for_user(username)?
        .into_iter()
        .map(GrantDto::from)
        .collect())
}

/// Staff may only hand out roles up to their own, and may only change
/// accounts that do not outrank them.
fn authorize_role_change(actor: &Actor, current: Option<Role>, requested: Role) -> Result<(), CmsError> {
    let ceiling = actor.role;
    if requested <= ceiling && current.map_or(true, |c| c <= ceiling) {
        return Ok(());
    }
    crate::metrics::inc_auth_denials();
    sec_log!(
        "Denied role change by {} ({:?}): {:?} -> {:?}",
        actor.username,
        actor.role,
        current,
        requested
    );
    Err(CmsError::Forbidden(format!(
        "{} may not assign or change roles above {:?}",
        actor.username, actor.role
    )))
}

pub fn create_user(store: &CmsStore, created_by: &Actor, username: &str, role: Role) -> Result<UserDto, CmsError> {
    let name = validate_username(username, false)?;
    authorize_role_change(created_by, None, role)?;
    store.create_user(UserRecord::new(&name, role)).map(UserDto::from)
}

pub fn set_role(store: &CmsStore, changed_by: &Actor, username: &str, role: Role) -> Result<UserDto, CmsError> {
    let mut user = store.get_user(&username.to_ascii_lowercase())?;
    authorize_role_change(changed_by, Some(user.role), role)?;
    if user.username == changed_by.username && !role.is_elevated() {
        return Err(CmsError::Validation("cannot demote yourself".to_string()));
    }
    let previous = user.role;
    user.role = role;
    store.put_user(user.clone())?;
    log::info!(
        "{} changed role of {} from {:?} to {:?}",
        changed_by.username,
        user.username,
        previous,
        role
    );
    Ok(user.into())
}

pub fn list_users(store: &CmsStore) -> Result<Vec<UserDto>, CmsError> {
    Ok(store.list_users()?.into_iter().map(UserDto::from).collect())
}
