//! Cross-surface identity types (§3, §4.3).

use crate::id::{SurfaceId, SurfaceUserId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ambiguity-free alphabet used for link codes: no `0/O`, `1/I`, etc.
pub const LINK_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a generated link code.
pub const LINK_CODE_LENGTH: usize = 6;

/// How long an unclaimed link code stays valid, in milliseconds.
pub const LINK_CODE_TTL_MILLIS: u64 = 10 * 60 * 1000;

/// Maximum unclaimed codes a single issuer may hold at once.
pub const LINK_CODE_MAX_ACTIVE: usize = 3;

/// One logical identity, potentially linked to several surface identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedUser {
    /// Stable id for this user, independent of any surface.
    pub id: UserId,
    /// Surface -> that surface's id for this user.
    pub linked_surfaces: HashMap<SurfaceId, SurfaceUserId>,
    /// The surface proactive messages go to absent other context.
    pub default_surface: SurfaceId,
    /// Surface -> when it was linked, ISO 8601.
    pub linked_at: HashMap<SurfaceId, String>,
    /// When this user record was created, ISO 8601.
    pub created_at: String,
}

impl UnifiedUser {
    /// Create a brand-new user linked to exactly one surface.
    pub fn new_single_surface(
        id: UserId,
        surface: SurfaceId,
        surface_user_id: SurfaceUserId,
        now_iso: impl Into<String>,
    ) -> Self {
        let now = now_iso.into();
        let mut linked_surfaces = HashMap::new();
        linked_surfaces.insert(surface.clone(), surface_user_id);
        let mut linked_at = HashMap::new();
        linked_at.insert(surface.clone(), now.clone());
        Self {
            id,
            linked_surfaces,
            default_surface: surface,
            linked_at,
            created_at: now,
        }
    }
}

/// A short-lived, one-time credential quoted on one surface to attach it
/// to an identity established on another. Never persisted — lives only in
/// the identity service's in-memory map (§3 Lifecycle).
#[derive(Debug, Clone, PartialEq)]
pub struct LinkCode {
    /// The 6-character code itself.
    pub code: String,
    /// `"<surfaceId>:<userId>"` of the user who generated the code.
    pub issued_by: String,
    /// When the code was issued, in epoch milliseconds.
    pub issued_at: u64,
    /// When the code stops being claimable, in epoch milliseconds.
    pub expires_at: u64,
    /// Whether the code has already been claimed.
    pub claimed: bool,
}

impl LinkCode {
    /// Whether the code is still usable as of `now_millis`.
    pub fn is_claimable(&self, now_millis: u64) -> bool {
        !self.claimed && now_millis < self.expires_at
    }
}
