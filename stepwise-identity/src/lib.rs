#![deny(missing_docs)]
//! Cross-surface identity linking (§3, §4.3).
//!
//! Maintains `users.json` — one [`UnifiedUser`] record per unified
//! identity — plus an in-memory reverse index
//! `(surfaceId, surfaceUserId) -> userId` rebuilt from it at load time. A
//! separate, optional `manual-links.json` of admin overrides is consulted
//! before a brand-new user is created for an unrecognized
//! `(surfaceId, surfaceUserId)` pair. Link codes are never persisted —
//! they live only in this service's in-memory map and are reaped by a
//! periodic GC.

use rand::Rng;
use serde::{Deserialize, Serialize};
use stepwise_core::{now_millis, LinkCode, SurfaceId, SurfaceUserId, UnifiedUser, UserId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from identity operations. Per §7, these are returned as typed
/// errors to admin callers and never surfaced directly to end users.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The issuer already has the maximum number of unclaimed link codes.
    #[error("issuer already has {0} unclaimed link codes")]
    MaxCodesError(usize),

    /// The link code does not exist or has expired.
    #[error("link code has expired or does not exist")]
    LinkCodeExpiredError,

    /// The link code has already been claimed.
    #[error("link code has already been claimed")]
    LinkCodeClaimedError,

    /// The claimer is the same surface identity that issued the code.
    #[error("a link code cannot be claimed by its own issuer")]
    SameSurfaceError,

    /// The surface is not linked to the given user.
    #[error("surface {surface} is not linked to user {user}")]
    SurfaceNotLinkedError {
        /// The user the surface was expected to be linked to.
        user: UserId,
        /// The surface that was not found among the user's links.
        surface: SurfaceId,
    },

    /// Unlinking would leave the user with zero linked surfaces.
    #[error("cannot unlink the only remaining surface for user {0}")]
    LastSurfaceError(UserId),

    /// The underlying storage medium failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManualLinks(HashMap<UserId, HashMap<SurfaceId, SurfaceUserId>>);

/// Identity service backed by `users.json` plus an optional
/// `manual-links.json` of admin overrides.
pub struct IdentityService {
    data_dir: PathBuf,
    users: RwLock<HashMap<UserId, UnifiedUser>>,
    reverse_index: RwLock<HashMap<(SurfaceId, SurfaceUserId), UserId>>,
    manual_links: RwLock<HashMap<(SurfaceId, SurfaceUserId), UserId>>,
    link_codes: RwLock<HashMap<String, LinkCode>>,
}

fn users_path(data_dir: &Path) -> PathBuf {
    data_dir.join("users.json")
}

fn manual_links_path(data_dir: &Path) -> PathBuf {
    data_dir.join("manual-links.json")
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), IdentityError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| IdentityError::Storage(e.to_string()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| IdentityError::Storage(e.to_string()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| IdentityError::Storage(e.to_string()))?;
    Ok(())
}

fn iso_now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..stepwise_core::identity::LINK_CODE_LENGTH)
        .map(|_| {
            let alphabet = stepwise_core::identity::LINK_CODE_ALPHABET.as_bytes();
            alphabet[rng.gen_range(0..alphabet.len())] as char
        })
        .collect()
}

impl IdentityService {
    /// Construct a service rooted at `data_dir`, with nothing loaded yet.
    /// Call [`IdentityService::load`] before use.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            users: RwLock::new(HashMap::new()),
            reverse_index: RwLock::new(HashMap::new()),
            manual_links: RwLock::new(HashMap::new()),
            link_codes: RwLock::new(HashMap::new()),
        }
    }

    /// Load `users.json` and `manual-links.json` from disk, rebuilding
    /// the in-memory reverse index. Absent files are treated as empty.
    pub async fn load(&self) -> Result<(), IdentityError> {
        let users: HashMap<UserId, UnifiedUser> =
            match tokio::fs::read_to_string(users_path(&self.data_dir)).await {
                Ok(contents) => {
                    serde_json::from_str(&contents).map_err(|e| IdentityError::Storage(e.to_string()))?
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
                Err(e) => return Err(IdentityError::Storage(e.to_string())),
            };

        let manual: ManualLinks =
            match tokio::fs::read_to_string(manual_links_path(&self.data_dir)).await {
                Ok(contents) => {
                    serde_json::from_str(&contents).map_err(|e| IdentityError::Storage(e.to_string()))?
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => ManualLinks::default(),
                Err(e) => return Err(IdentityError::Storage(e.to_string())),
            };

        let mut reverse = HashMap::new();
        for user in users.values() {
            for (surface, surface_user_id) in &user.linked_surfaces {
                reverse.insert((surface.clone(), surface_user_id.clone()), user.id.clone());
            }
        }

        let mut manual_reverse = HashMap::new();
        for (user_id, surfaces) in &manual.0 {
            for (surface, surface_user_id) in surfaces {
                manual_reverse.insert((surface.clone(), surface_user_id.clone()), user_id.clone());
            }
        }

        *self.users.write().await = users;
        *self.reverse_index.write().await = reverse;
        *self.manual_links.write().await = manual_reverse;
        Ok(())
    }

    async fn persist_users(&self, users: &HashMap<UserId, UnifiedUser>) -> Result<(), IdentityError> {
        let contents =
            serde_json::to_string_pretty(users).map_err(|e| IdentityError::Storage(e.to_string()))?;
        write_atomic(&users_path(&self.data_dir), &contents).await
    }

    /// Resolve a surface identity to its unified user, creating one if
    /// this is the first time this `(surfaceId, surfaceUserId)` has been
    /// seen and no manual override names an existing user for it.
    pub async fn resolve_user(
        &self,
        surface: SurfaceId,
        surface_user_id: SurfaceUserId,
    ) -> Result<UnifiedUser, IdentityError> {
        let key = (surface.clone(), surface_user_id.clone());
        if let Some(user_id) = self.reverse_index.read().await.get(&key).cloned() {
            return Ok(self.users.read().await[&user_id].clone());
        }

        let mut users = self.users.write().await;
        if let Some(user_id) = self.manual_links.read().await.get(&key).cloned() {
            if let Some(user) = users.get_mut(&user_id) {
                user.linked_surfaces
                    .insert(surface.clone(), surface_user_id.clone());
                user.linked_at.insert(surface.clone(), iso_now());
                self.reverse_index.write().await.insert(key, user_id);
                self.persist_users(&users).await?;
                return Ok(user.clone());
            }
        }

        let user_id = UserId::new(uuid_like());
        let user = UnifiedUser::new_single_surface(
            user_id.clone(),
            surface.clone(),
            surface_user_id.clone(),
            iso_now(),
        );
        users.insert(user_id.clone(), user.clone());
        self.reverse_index.write().await.insert(key, user_id);
        self.persist_users(&users).await?;
        Ok(user)
    }

    /// Issue a fresh 6-character link code for `user_id`, as the issuing
    /// `surface`. Fails with [`IdentityError::MaxCodesError`] if the
    /// issuer already has
    /// [`stepwise_core::identity::LINK_CODE_MAX_ACTIVE`] unclaimed codes.
    pub async fn generate_link_code(
        &self,
        surface: SurfaceId,
        user_id: UserId,
    ) -> Result<LinkCode, IdentityError> {
        let issued_by = format!("{surface}:{user_id}");
        let now = now_millis();
        let mut codes = self.link_codes.write().await;
        let active_count = codes
            .values()
            .filter(|c| c.issued_by == issued_by && c.is_claimable(now))
            .count();
        if active_count >= stepwise_core::identity::LINK_CODE_MAX_ACTIVE {
            return Err(IdentityError::MaxCodesError(active_count));
        }

        let code_str = loop {
            let candidate = generate_code();
            if !codes.contains_key(&candidate) {
                break candidate;
            }
        };
        let code = LinkCode {
            code: code_str.clone(),
            issued_by,
            issued_at: now,
            expires_at: now + stepwise_core::identity::LINK_CODE_TTL_MILLIS,
            claimed: false,
        };
        codes.insert(code_str, code.clone());
        Ok(code)
    }

    /// Claim a link code as `(surface, surface_user_id)`. Refuses a claim
    /// from the same surface that issued the code. If the claimer is
    /// already a known, distinct user, merges: every surface linked to
    /// the claimer moves onto the issuer's user record, and the claimer's
    /// record is deleted.
    pub async fn claim_link_code(
        &self,
        code: &str,
        surface: SurfaceId,
        surface_user_id: SurfaceUserId,
    ) -> Result<UnifiedUser, IdentityError> {
        let now = now_millis();
        let mut codes = self.link_codes.write().await;
        let entry = codes.get(code).ok_or(IdentityError::LinkCodeExpiredError)?;
        if entry.claimed {
            return Err(IdentityError::LinkCodeClaimedError);
        }
        if !entry.is_claimable(now) {
            return Err(IdentityError::LinkCodeExpiredError);
        }
        let issuer_surface_prefix = format!("{surface}:");
        if entry.issued_by.starts_with(&issuer_surface_prefix) {
            return Err(IdentityError::SameSurfaceError);
        }
        let issuer_user_id = UserId::new(
            entry
                .issued_by
                .splitn(2, ':')
                .nth(1)
                .unwrap_or_default()
                .to_string(),
        );

        let mut users = self.users.write().await;
        let claimer_key = (surface.clone(), surface_user_id.clone());
        let claimer_user_id = self.reverse_index.read().await.get(&claimer_key).cloned();

        if let Some(claimer_user_id) = claimer_user_id {
            if claimer_user_id != issuer_user_id {
                let claimer = users
                    .remove(&claimer_user_id)
                    .expect("reverse index points to a live user record");
                let mut reverse = self.reverse_index.write().await;
                for (claimer_surface, claimer_surface_user_id) in claimer.linked_surfaces {
                    reverse.insert(
                        (claimer_surface.clone(), claimer_surface_user_id.clone()),
                        issuer_user_id.clone(),
                    );
                    if let Some(issuer) = users.get_mut(&issuer_user_id) {
                        issuer
                            .linked_surfaces
                            .insert(claimer_surface.clone(), claimer_surface_user_id);
                        issuer.linked_at.insert(claimer_surface, iso_now());
                    }
                }
            }
        } else if let Some(issuer) = users.get_mut(&issuer_user_id) {
            issuer
                .linked_surfaces
                .insert(surface.clone(), surface_user_id.clone());
            issuer.linked_at.insert(surface.clone(), iso_now());
            self.reverse_index
                .write()
                .await
                .insert(claimer_key, issuer_user_id.clone());
        }

        if let Some(entry) = codes.get_mut(code) {
            entry.claimed = true;
        }

        self.persist_users(&users).await?;
        Ok(users[&issuer_user_id].clone())
    }

    /// Admin operation: link a surface identity to an existing user
    /// without going through a link code.
    pub async fn link_manual(
        &self,
        user_id: UserId,
        surface: SurfaceId,
        surface_user_id: SurfaceUserId,
    ) -> Result<(), IdentityError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| IdentityError::SurfaceNotLinkedError {
                user: user_id.clone(),
                surface: surface.clone(),
            })?;
        user.linked_surfaces
            .insert(surface.clone(), surface_user_id.clone());
        user.linked_at.insert(surface.clone(), iso_now());
        self.reverse_index
            .write()
            .await
            .insert((surface, surface_user_id), user_id);
        self.persist_users(&users).await
    }

    /// Admin operation: change a user's default (proactive-message)
    /// surface.
    pub async fn set_default_surface(
        &self,
        user_id: UserId,
        surface: SurfaceId,
    ) -> Result<(), IdentityError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| IdentityError::SurfaceNotLinkedError {
                user: user_id.clone(),
                surface: surface.clone(),
            })?;
        if !user.linked_surfaces.contains_key(&surface) {
            return Err(IdentityError::SurfaceNotLinkedError {
                user: user_id,
                surface,
            });
        }
        user.default_surface = surface;
        self.persist_users(&users).await
    }

    /// Admin operation: remove a surface from a user's linked surfaces.
    /// Fails with [`IdentityError::LastSurfaceError`] if it is the user's
    /// only remaining surface.
    pub async fn unlink_surface(
        &self,
        user_id: UserId,
        surface: SurfaceId,
    ) -> Result<(), IdentityError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| IdentityError::SurfaceNotLinkedError {
                user: user_id.clone(),
                surface: surface.clone(),
            })?;
        if user.linked_surfaces.len() <= 1 {
            return Err(IdentityError::LastSurfaceError(user_id));
        }
        let Some(surface_user_id) = user.linked_surfaces.remove(&surface) else {
            return Err(IdentityError::SurfaceNotLinkedError { user: user_id, surface });
        };
        user.linked_at.remove(&surface);
        if user.default_surface == surface {
            user.default_surface = user
                .linked_surfaces
                .keys()
                .next()
                .cloned()
                .expect("at least one surface remains");
        }
        self.reverse_index
            .write()
            .await
            .remove(&(surface, surface_user_id));
        self.persist_users(&users).await
    }

    /// Reap expired link codes. Intended to run on a periodic GC timer
    /// (every minute, per §5). Returns how many were reaped.
    pub async fn gc_expired_link_codes(&self) -> usize {
        let now = now_millis();
        let mut codes = self.link_codes.write().await;
        let before = codes.len();
        codes.retain(|_, code| code.is_claimable(now) || code.claimed && now < code.expires_at);
        before - codes.len()
    }
}

fn uuid_like() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> (IdentityService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let service = IdentityService::new(dir.path());
        service.load().await.unwrap();
        (service, dir)
    }

    #[tokio::test]
    async fn resolve_user_creates_a_new_user_on_first_sighting() {
        let (service, _dir) = service().await;
        let user = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        assert_eq!(user.default_surface, SurfaceId::new("telegram"));
    }

    #[tokio::test]
    async fn resolve_user_is_stable_across_calls() {
        let (service, _dir) = service().await;
        let first = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        let second = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn generate_link_code_then_claim_links_two_surfaces() {
        let (service, _dir) = service().await;
        let user = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        let code = service
            .generate_link_code(SurfaceId::new("telegram"), user.id.clone())
            .await
            .unwrap();
        let claimed = service
            .claim_link_code(&code.code, SurfaceId::new("slack"), SurfaceUserId::new("s1"))
            .await
            .unwrap();
        assert_eq!(claimed.id, user.id);
        assert!(claimed.linked_surfaces.contains_key(&SurfaceId::new("slack")));
    }

    #[tokio::test]
    async fn claim_link_code_merges_a_distinct_existing_user() {
        let (service, _dir) = service().await;
        let issuer = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        let claimer = service
            .resolve_user(SurfaceId::new("slack"), SurfaceUserId::new("s1"))
            .await
            .unwrap();
        assert_ne!(issuer.id, claimer.id);

        let code = service
            .generate_link_code(SurfaceId::new("telegram"), issuer.id.clone())
            .await
            .unwrap();
        let merged = service
            .claim_link_code(&code.code, SurfaceId::new("slack"), SurfaceUserId::new("s1"))
            .await
            .unwrap();
        assert_eq!(merged.id, issuer.id);
        assert!(merged.linked_surfaces.contains_key(&SurfaceId::new("slack")));
        assert!(merged.linked_surfaces.contains_key(&SurfaceId::new("telegram")));
    }

    #[tokio::test]
    async fn claim_link_code_rejects_same_surface_claim() {
        let (service, _dir) = service().await;
        let user = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        let code = service
            .generate_link_code(SurfaceId::new("telegram"), user.id)
            .await
            .unwrap();
        let err = service
            .claim_link_code(&code.code, SurfaceId::new("telegram"), SurfaceUserId::new("t2"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::SameSurfaceError));
    }

    #[tokio::test]
    async fn claim_link_code_rejects_already_claimed() {
        let (service, _dir) = service().await;
        let user = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        let code = service
            .generate_link_code(SurfaceId::new("telegram"), user.id)
            .await
            .unwrap();
        service
            .claim_link_code(&code.code, SurfaceId::new("slack"), SurfaceUserId::new("s1"))
            .await
            .unwrap();
        let err = service
            .claim_link_code(&code.code, SurfaceId::new("sms"), SurfaceUserId::new("m1"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::LinkCodeClaimedError));
    }

    #[tokio::test]
    async fn generate_link_code_enforces_max_active_per_issuer() {
        let (service, _dir) = service().await;
        let user = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        for _ in 0..stepwise_core::identity::LINK_CODE_MAX_ACTIVE {
            service
                .generate_link_code(SurfaceId::new("telegram"), user.id.clone())
                .await
                .unwrap();
        }
        let err = service
            .generate_link_code(SurfaceId::new("telegram"), user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MaxCodesError(_)));
    }

    #[tokio::test]
    async fn unlink_surface_rejects_removing_the_last_surface() {
        let (service, _dir) = service().await;
        let user = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        let err = service
            .unlink_surface(user.id, SurfaceId::new("telegram"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::LastSurfaceError(_)));
    }

    #[tokio::test]
    async fn unlink_surface_succeeds_when_another_remains() {
        let (service, _dir) = service().await;
        let user = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        service
            .link_manual(user.id.clone(), SurfaceId::new("slack"), SurfaceUserId::new("s1"))
            .await
            .unwrap();
        service
            .unlink_surface(user.id.clone(), SurfaceId::new("telegram"))
            .await
            .unwrap();
        let resolved = service
            .resolve_user(SurfaceId::new("slack"), SurfaceUserId::new("s1"))
            .await
            .unwrap();
        assert!(!resolved.linked_surfaces.contains_key(&SurfaceId::new("telegram")));
    }

    #[tokio::test]
    async fn identity_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let service = IdentityService::new(dir.path());
        service.load().await.unwrap();
        let user = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();

        let reloaded = IdentityService::new(dir.path());
        reloaded.load().await.unwrap();
        let resolved = reloaded
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn gc_expired_link_codes_reaps_only_expired() {
        let (service, _dir) = service().await;
        let user = service
            .resolve_user(SurfaceId::new("telegram"), SurfaceUserId::new("t1"))
            .await
            .unwrap();
        let code = service
            .generate_link_code(SurfaceId::new("telegram"), user.id)
            .await
            .unwrap();
        {
            let mut codes = service.link_codes.write().await;
            codes.get_mut(&code.code).unwrap().expires_at = 1;
        }
        let reaped = service.gc_expired_link_codes().await;
        assert_eq!(reaped, 1);
    }
}
