//! Squad membership and alarm fan-out.
//!
//! The [`SquadDirectory`] maps a [`SquadId`] to the guards in it. It holds
//! weak references only; a guard that has been dropped is skipped and
//! pruned on the next registration.
//!
//! Broadcasting collects the live members under the read lock, releases
//! it, and then delivers to each member in turn. Members lock themselves,
//! so a member that reacts by broadcasting again never deadlocks.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, info, trace};
use vigil_types::{ActorId, MAX_ALERT_VALUE, SquadId, SquadMessage, Vec3};

use crate::world::ActorQuery;

/// The part of a member's tuning the directory needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquadTuning {
    /// Alert added when the sender is outside `instant_radius`.
    pub alert_add: f32,
    /// Members this close to the sender are fully alerted.
    pub instant_radius: f32,
}

/// A guard that can receive squad alarms.
pub trait SquadMember: Send + Sync {
    /// The guard's actor id.
    fn member_id(&self) -> ActorId;

    /// Current alert value.
    fn alert_value(&self) -> f32;

    /// Squad tuning, or `None` while the guard is not initialised.
    fn squad_tuning(&self) -> Option<SquadTuning>;

    /// Raise the guard's alert by `amount` because of `target` seen at
    /// `location`.
    fn handle_squad_stimulus(&self, target: Option<ActorId>, location: Vec3, amount: f32);
}

type Members = BTreeMap<ActorId, Weak<dyn SquadMember>>;

/// Registry of squads and their members.
pub struct SquadDirectory {
    world: Arc<dyn ActorQuery>,
    squads: RwLock<BTreeMap<SquadId, Members>>,
}

impl SquadDirectory {
    /// Create an empty directory. `world` resolves member locations for
    /// the instant-alert radius.
    pub fn new(world: Arc<dyn ActorQuery>) -> Self {
        Self {
            world,
            squads: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add `member` to `squad`. Returns `false` if it was already there.
    pub fn register_member<M>(&self, squad: SquadId, member: &Arc<M>) -> bool
    where
        M: SquadMember + 'static,
    {
        let id = member.member_id();
        let weak: Weak<dyn SquadMember> = Arc::downgrade(member) as Weak<M>;

        let mut squads = self.write();
        let members = squads.entry(squad).or_default();
        members.retain(|_, existing| existing.strong_count() > 0);
        if members.contains_key(&id) {
            trace!(squad = %squad, member = %id, "Member already registered");
            return false;
        }
        members.insert(id, weak);
        info!(squad = %squad, member = %id, size = members.len(), "Squad member registered");
        true
    }

    /// Remove `member` from `squad`, deleting the squad once empty.
    /// Returns `false` if the member was not registered there.
    pub fn unregister_member(&self, squad: SquadId, member: ActorId) -> bool {
        let mut squads = self.write();
        let Some(members) = squads.get_mut(&squad) else {
            debug!(squad = %squad, member = %member, "Unregister from unknown squad");
            return false;
        };
        let removed = members.remove(&member).is_some();
        if members.is_empty() {
            squads.remove(&squad);
            debug!(squad = %squad, "Squad disbanded");
        }
        if removed {
            info!(squad = %squad, member = %member, "Squad member unregistered");
        }
        removed
    }

    /// Deliver `message` to every member of `squad` except its sender.
    ///
    /// Members already at the maximum are skipped. A member within its
    /// instant-alert radius of the sender is raised to the maximum; anyone
    /// further away receives its `alert_add`. Returns the number of
    /// members notified.
    pub fn broadcast_message(&self, squad: SquadId, message: &SquadMessage) -> usize {
        let recipients: Vec<Arc<dyn SquadMember>> = {
            let squads = self.read();
            let Some(members) = squads.get(&squad) else {
                debug!(squad = %squad, sender = %message.sender, "Broadcast to unknown squad");
                return 0;
            };
            members
                .iter()
                .filter(|(id, _)| **id != message.sender)
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };

        let sender_location = self.world.location(message.sender);
        let mut delivered = 0_usize;
        for member in recipients {
            let id = member.member_id();
            if member.alert_value() >= MAX_ALERT_VALUE {
                trace!(squad = %squad, member = %id, "Member already at max alert");
                continue;
            }
            let Some(tuning) = member.squad_tuning() else {
                trace!(squad = %squad, member = %id, "Member not initialised");
                continue;
            };

            let radius = tuning.instant_radius;
            let within_radius = sender_location
                .zip(self.world.location(id))
                .is_some_and(|(from, to)| from.distance_squared(to) <= radius * radius);
            let amount = if within_radius {
                MAX_ALERT_VALUE
            } else {
                tuning.alert_add
            };

            member.handle_squad_stimulus(message.target_actor, message.target_location, amount);
            delivered = delivered.saturating_add(1);
        }

        info!(
            squad = %squad,
            sender = %message.sender,
            tag = %message.tag,
            urgency = ?message.urgency,
            delivered,
            "Squad broadcast"
        );
        delivered
    }

    /// Number of live members of `squad`.
    pub fn member_count(&self, squad: SquadId) -> usize {
        self.members(squad).len()
    }

    /// Ids of the live members of `squad`. Guards that were dropped without
    /// leaving are not reported.
    pub fn members(&self, squad: SquadId) -> Vec<ActorId> {
        let squads = self.read();
        let Some(members) = squads.get(&squad) else {
            debug!(squad = %squad, "Query for unknown squad");
            return Vec::new();
        };
        members
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether `squad` has at least one live member.
    pub fn squad_exists(&self, squad: SquadId) -> bool {
        !self.members(squad).is_empty()
    }

    /// Every squad with at least one member.
    pub fn squad_ids(&self) -> Vec<SquadId> {
        self.read().keys().copied().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<SquadId, Members>> {
        self.squads.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<SquadId, Members>> {
        self.squads.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SquadDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquadDirectory")
            .field("squads", &self.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::world::ActorRegistry;

    /// Records every squad stimulus it receives.
    struct Recorder {
        id: ActorId,
        alert: Mutex<f32>,
        received: Mutex<Vec<f32>>,
    }

    impl Recorder {
        fn new(id: ActorId, alert: f32) -> Arc<Self> {
            Arc::new(Self {
                id,
                alert: Mutex::new(alert),
                received: Mutex::new(Vec::new()),
            })
        }

        fn received(&self) -> Vec<f32> {
            self.received.lock().unwrap().clone()
        }
    }

    impl SquadMember for Recorder {
        fn member_id(&self) -> ActorId {
            self.id
        }

        fn alert_value(&self) -> f32 {
            *self.alert.lock().unwrap()
        }

        fn squad_tuning(&self) -> Option<SquadTuning> {
            Some(SquadTuning {
                alert_add: 50.0,
                instant_radius: 500.0,
            })
        }

        fn handle_squad_stimulus(&self, _target: Option<ActorId>, _location: Vec3, amount: f32) {
            self.received.lock().unwrap().push(amount);
            let mut alert = self.alert.lock().unwrap();
            *alert = (*alert + amount).min(MAX_ALERT_VALUE);
        }
    }

    const SQUAD: SquadId = SquadId(7);

    fn setup() -> (Arc<ActorRegistry>, SquadDirectory) {
        let world = Arc::new(ActorRegistry::new());
        let directory = SquadDirectory::new(world.clone());
        (world, directory)
    }

    #[test]
    fn register_is_idempotent() {
        let (world, directory) = setup();
        let member = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        assert!(directory.register_member(SQUAD, &member));
        assert!(!directory.register_member(SQUAD, &member));
        assert_eq!(directory.member_count(SQUAD), 1);
        assert_eq!(directory.members(SQUAD), vec![member.id]);
    }

    #[test]
    fn unregister_deletes_empty_squad() {
        let (world, directory) = setup();
        let member = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        directory.register_member(SQUAD, &member);
        assert!(directory.squad_exists(SQUAD));
        assert!(directory.unregister_member(SQUAD, member.id));
        assert!(!directory.squad_exists(SQUAD));
        assert!(!directory.unregister_member(SQUAD, member.id));
    }

    #[test]
    fn broadcast_scales_with_distance() {
        let (world, directory) = setup();
        let sender = Recorder::new(world.spawn(Vec3::ZERO), MAX_ALERT_VALUE);
        let near = Recorder::new(world.spawn(Vec3::new(400.0, 0.0, 0.0)), 0.0);
        let far = Recorder::new(world.spawn(Vec3::new(1000.0, 0.0, 0.0)), 0.0);
        let edge = Recorder::new(world.spawn(Vec3::new(500.0, 0.0, 0.0)), 0.0);
        for member in [&sender, &near, &far, &edge] {
            directory.register_member(SQUAD, member);
        }

        let message = SquadMessage::enemy_spotted(sender.id, None, Vec3::ZERO);
        assert_eq!(directory.broadcast_message(SQUAD, &message), 3);

        assert!(sender.received().is_empty());
        assert_eq!(near.received(), vec![MAX_ALERT_VALUE]);
        assert_eq!(edge.received(), vec![MAX_ALERT_VALUE]);
        assert_eq!(far.received(), vec![50.0]);
    }

    #[test]
    fn sender_is_never_notified() {
        let (world, directory) = setup();
        // Sender below max so only the identity check keeps it out.
        let sender = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        directory.register_member(SQUAD, &sender);
        let message = SquadMessage::enemy_spotted(sender.id, None, Vec3::ZERO);
        assert_eq!(directory.broadcast_message(SQUAD, &message), 0);
        assert!(sender.received().is_empty());
    }

    #[test]
    fn maxed_members_are_skipped() {
        let (world, directory) = setup();
        let sender = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        let busy = Recorder::new(world.spawn(Vec3::new(10.0, 0.0, 0.0)), MAX_ALERT_VALUE);
        directory.register_member(SQUAD, &sender);
        directory.register_member(SQUAD, &busy);
        let message = SquadMessage::enemy_spotted(sender.id, None, Vec3::ZERO);
        assert_eq!(directory.broadcast_message(SQUAD, &message), 0);
        assert!(busy.received().is_empty());
    }

    #[test]
    fn dropped_members_are_skipped_and_pruned() {
        let (world, directory) = setup();
        let sender = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        let gone = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        directory.register_member(SQUAD, &sender);
        directory.register_member(SQUAD, &gone);
        drop(gone);

        let message = SquadMessage::enemy_spotted(sender.id, None, Vec3::ZERO);
        assert_eq!(directory.broadcast_message(SQUAD, &message), 0);

        let late = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        directory.register_member(SQUAD, &late);
        assert_eq!(directory.member_count(SQUAD), 2);
    }

    #[test]
    fn queries_ignore_dropped_members() {
        let (world, directory) = setup();
        let stays = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        let gone = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        directory.register_member(SQUAD, &stays);
        directory.register_member(SQUAD, &gone);
        assert_eq!(directory.member_count(SQUAD), 2);

        drop(gone);
        assert_eq!(directory.member_count(SQUAD), 1);
        assert_eq!(directory.members(SQUAD), vec![stays.id]);

        drop(stays);
        assert!(!directory.squad_exists(SQUAD));
    }

    #[test]
    fn registers_members_as_trait_objects() {
        let (world, directory) = setup();
        let member: Arc<Recorder> = Recorder::new(world.spawn(Vec3::ZERO), 0.0);
        assert!(directory.register_member(SquadId(-1), &member));
        assert!(directory.squad_exists(SquadId(-1)));
        assert_eq!(Arc::strong_count(&member), 1);
    }

    #[test]
    fn unknown_squad_is_a_no_op() {
        let (_, directory) = setup();
        let message = SquadMessage::enemy_spotted(ActorId::new(), None, Vec3::ZERO);
        assert_eq!(directory.broadcast_message(SquadId(99), &message), 0);
        assert_eq!(directory.member_count(SquadId(99)), 0);
        assert!(directory.members(SquadId(99)).is_empty());
        assert!(!directory.squad_exists(SquadId(99)));
    }
}
