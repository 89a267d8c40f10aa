//! Zone-scoped composite identities.
//!
//! Room, mob, object, shop and quest ids are only unique inside their zone, so
//! mob 22 in zone 5 and mob 22 in zone 9 are different entities. Every
//! reference therefore carries an [`EntityKey`] rather than a bare id. Quest
//! sub-entities extend the parent key chain.
//!
//! Keys render to fixed-width byte strings so that sled prefix scans return
//! all children of a parent in id order.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ZoneId = u32;

/// Width used when rendering ids into storage keys.
const ID_WIDTH: usize = 10;

fn push_id(buf: &mut String, id: u32) {
    use std::fmt::Write;
    let _ = write!(buf, "{:0width$}:", id, width = ID_WIDTH);
}

/// `(zone_id, id)` identity of a zone-scoped entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct EntityKey {
    pub zone_id: ZoneId,
    pub id: u32,
}

impl EntityKey {
    pub const fn new(zone_id: ZoneId, id: u32) -> Self {
        Self { zone_id, id }
    }

    /// Prefix shared by every key in one zone.
    pub fn zone_prefix(zone_id: ZoneId) -> Vec<u8> {
        let mut s = String::with_capacity(ID_WIDTH + 1);
        push_id(&mut s, zone_id);
        s.into_bytes()
    }

    /// Storage key; doubles as the prefix of child rows.
    pub fn storage_key(&self) -> Vec<u8> {
        self.render().into_bytes()
    }

    fn render(&self) -> String {
        let mut s = String::with_capacity(2 * (ID_WIDTH + 1));
        push_id(&mut s, self.zone_id);
        push_id(&mut s, self.id);
        s
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.zone_id, self.id)
    }
}

/// `(quest, id)` identity of a quest phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PhaseKey {
    pub quest: EntityKey,
    pub id: u32,
}

impl PhaseKey {
    pub const fn new(quest: EntityKey, id: u32) -> Self {
        Self { quest, id }
    }

    pub fn storage_key(&self) -> Vec<u8> {
        self.render().into_bytes()
    }

    fn render(&self) -> String {
        let mut s = self.quest.render();
        push_id(&mut s, self.id);
        s
    }
}

impl fmt::Display for PhaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/phase {}", self.quest, self.id)
    }
}

/// `(phase, id)` identity of a quest objective.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveKey {
    pub phase: PhaseKey,
    pub id: u32,
}

impl ObjectiveKey {
    pub const fn new(phase: PhaseKey, id: u32) -> Self {
        Self { phase, id }
    }

    pub fn storage_key(&self) -> Vec<u8> {
        let mut s = self.phase.render();
        push_id(&mut s, self.id);
        s.into_bytes()
    }
}

impl fmt::Display for ObjectiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/objective {}", self.phase, self.id)
    }
}

/// `(quest, id)` identity of a quest reward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct RewardKey {
    pub quest: EntityKey,
    pub id: u32,
}

impl RewardKey {
    pub const fn new(quest: EntityKey, id: u32) -> Self {
        Self { quest, id }
    }

    pub fn storage_key(&self) -> Vec<u8> {
        let mut s = self.quest.render();
        push_id(&mut s, self.id);
        s.into_bytes()
    }
}

impl fmt::Display for RewardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/reward {}", self.quest, self.id)
    }
}

/// Directed edge: `quest` cannot be started before `requires` is completed.
/// The edge is its own identity, so a duplicate edge is a duplicate key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteKey {
    pub quest: EntityKey,
    pub requires: EntityKey,
}

impl PrerequisiteKey {
    pub const fn new(quest: EntityKey, requires: EntityKey) -> Self {
        Self { quest, requires }
    }

    pub fn is_self_reference(&self) -> bool {
        self.quest == self.requires
    }

    pub fn storage_key(&self) -> Vec<u8> {
        let mut s = self.quest.render();
        s.push_str(&self.requires.render());
        s.into_bytes()
    }
}

impl fmt::Display for PrerequisiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {}", self.quest, self.requires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_scoped_ids_are_distinct() {
        let a = EntityKey::new(5, 22);
        let b = EntityKey::new(9, 22);
        assert_ne!(a, b);
        assert_ne!(a.storage_key(), b.storage_key());
    }

    #[test]
    fn child_keys_share_parent_prefix() {
        let quest = EntityKey::new(30, 7);
        let phase = PhaseKey::new(quest, 2);
        let objective = ObjectiveKey::new(phase, 11);
        assert!(phase.storage_key().starts_with(&quest.storage_key()));
        assert!(objective.storage_key().starts_with(&phase.storage_key()));
        assert!(RewardKey::new(quest, 1)
            .storage_key()
            .starts_with(&quest.storage_key()));
    }

    #[test]
    fn sibling_prefix_does_not_leak() {
        // quest 1 must not match quest 10..19 via prefix scans
        let q1 = EntityKey::new(3, 1).storage_key();
        let q10 = PhaseKey::new(EntityKey::new(3, 10), 1).storage_key();
        assert!(!q10.starts_with(&q1));
    }

    #[test]
    fn prerequisite_self_reference() {
        let q = EntityKey::new(1, 1);
        assert!(PrerequisiteKey::new(q, q).is_self_reference());
        assert!(!PrerequisiteKey::new(q, EntityKey::new(2, 1)).is_self_reference());
    }
}
