use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::models::IdentityId;

/// Display names handed out when the user leaves the field blank.
pub const GHOST_NAMES: &[&str] = &[
    "HollowSignal",
    "StaticWisp",
    "NightRelay",
    "VoidLantern",
    "MistCircuit",
    "PaleFrequency",
    "EchoDrifter",
    "GlassSpecter",
];

/// Avatar colour tags. Rendering maps them to actual palettes.
pub const AVATAR_COLORS: &[&str] = &["rose", "violet", "cyan", "emerald", "orange", "fuchsia"];

/// Client-held identity profile. Persisted locally, never synchronized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: IdentityId,
    pub name: String,
    pub color: String,
}

impl Profile {
    /// Build a profile, filling a blank name or colour at random.
    pub fn new<R: Rng + ?Sized>(id: IdentityId, name: &str, color: &str, rng: &mut R) -> Self {
        let name = match name.trim() {
            "" => GHOST_NAMES.choose(rng).copied().unwrap_or("Ghost").to_string(),
            n => n.to_string(),
        };
        let color = match color.trim() {
            "" => AVATAR_COLORS.choose(rng).copied().unwrap_or("violet").to_string(),
            c => c.to_string(),
        };
        Self { id, name, color }
    }

    /// Case-insensitive display-name match, as used by kick votes.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}
