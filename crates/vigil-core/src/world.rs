//! World query capability.
//!
//! The stealth engine never holds references to other actors. It keeps an
//! [`ActorId`] and asks an [`ActorQuery`] about it each time it needs a
//! location, a liveness check or a tag. An actor that no longer exists
//! simply has no location.
//!
//! [`ActorRegistry`] is the in-memory implementation used by the engine
//! binary and the tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use tracing::debug;
use vigil_types::{ActorId, Vec3};

/// Read-only view of the world as seen by a guard.
pub trait ActorQuery: Send + Sync {
    /// Current location of `actor`, or `None` if it no longer exists.
    fn location(&self, actor: ActorId) -> Option<Vec3>;

    /// Whether `actor` exists and is dead.
    fn is_dead(&self, actor: ActorId) -> bool;

    /// Whether `actor` carries `tag` or any tag beneath it.
    ///
    /// Matching is hierarchical: an actor tagged `State.Movement.Crouching`
    /// has `State.Movement` as well.
    fn has_tag(&self, actor: ActorId, tag: &str) -> bool;
}

/// Whether `owned` equals `query` or is a child of it in the dotted tag
/// hierarchy.
pub fn tag_matches(owned: &str, query: &str) -> bool {
    owned
        .strip_prefix(query)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

#[derive(Debug, Clone, Default)]
struct ActorRecord {
    location: Vec3,
    dead: bool,
    tags: BTreeSet<String>,
}

/// In-memory actor table.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: RwLock<BTreeMap<ActorId, ActorRecord>>,
}

impl ActorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new live actor at `location` and return its id.
    pub fn spawn(&self, location: Vec3) -> ActorId {
        let id = ActorId::new();
        self.write().insert(
            id,
            ActorRecord {
                location,
                ..ActorRecord::default()
            },
        );
        debug!(actor = %id, ?location, "Actor spawned");
        id
    }

    /// Remove an actor. Returns `false` if it was not present.
    pub fn despawn(&self, actor: ActorId) -> bool {
        let removed = self.write().remove(&actor).is_some();
        if removed {
            debug!(actor = %actor, "Actor despawned");
        }
        removed
    }

    /// Move an actor. Returns `false` if it does not exist.
    pub fn move_to(&self, actor: ActorId, location: Vec3) -> bool {
        self.write()
            .get_mut(&actor)
            .map(|record| record.location = location)
            .is_some()
    }

    /// Mark an actor dead (or alive again).
    pub fn set_dead(&self, actor: ActorId, dead: bool) -> bool {
        self.write()
            .get_mut(&actor)
            .map(|record| record.dead = dead)
            .is_some()
    }

    /// Give an actor a tag.
    pub fn add_tag(&self, actor: ActorId, tag: &str) -> bool {
        self.write()
            .get_mut(&actor)
            .map(|record| record.tags.insert(tag.to_owned()))
            .is_some()
    }

    /// Take a tag away from an actor.
    pub fn remove_tag(&self, actor: ActorId, tag: &str) -> bool {
        self.write()
            .get_mut(&actor)
            .is_some_and(|record| record.tags.remove(tag))
    }

    /// Number of actors currently in the world.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the world holds no actors.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<ActorId, ActorRecord>> {
        self.actors.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<ActorId, ActorRecord>> {
        self.actors.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActorQuery for ActorRegistry {
    fn location(&self, actor: ActorId) -> Option<Vec3> {
        self.read().get(&actor).map(|record| record.location)
    }

    fn is_dead(&self, actor: ActorId) -> bool {
        self.read().get(&actor).is_some_and(|record| record.dead)
    }

    fn has_tag(&self, actor: ActorId, tag: &str) -> bool {
        self.read()
            .get(&actor)
            .is_some_and(|record| record.tags.iter().any(|owned| tag_matches(owned, tag)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchical_tags() {
        assert!(tag_matches("State.Movement.Crouching", "State.Movement"));
        assert!(tag_matches("State.Movement", "State.Movement"));
        assert!(!tag_matches("State.MovementFast", "State.Movement"));
        assert!(!tag_matches("State", "State.Movement"));
    }

    #[test]
    fn registry_tracks_actors() {
        let world = ActorRegistry::new();
        let id = world.spawn(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(world.location(id), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert!(world.move_to(id, Vec3::ZERO));
        assert_eq!(world.location(id), Some(Vec3::ZERO));
        assert!(!world.is_dead(id));
        assert!(world.set_dead(id, true));
        assert!(world.is_dead(id));
        assert!(world.despawn(id));
        assert_eq!(world.location(id), None);
        assert!(!world.move_to(id, Vec3::ZERO));
        assert!(world.is_empty());
    }

    #[test]
    fn registry_tags() {
        let world = ActorRegistry::new();
        let id = world.spawn(Vec3::ZERO);
        assert!(world.add_tag(id, "State.Movement.Crouching"));
        assert!(world.has_tag(id, "State.Movement"));
        assert!(world.has_tag(id, "State.Movement.Crouching"));
        assert!(!world.has_tag(id, "State.Visibility"));
        assert!(world.remove_tag(id, "State.Movement.Crouching"));
        assert!(!world.has_tag(id, "State.Movement"));
        assert!(!world.has_tag(ActorId::new(), "State"));
    }
}
