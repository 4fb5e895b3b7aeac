//! Test fixtures and helpers.
//!
//! A scripted in-memory host world and fixed spawn pools, so director tests
//! can run without a combat simulation. Everything iterates in sorted id
//! order; the same calls always produce the same replies.

use std::collections::{BTreeMap, BTreeSet};

use director_core::capabilities::BuffKind;
use director_core::host::{
    DamageFlags, ObjectiveView, PlayerId, PlayerView, PoolCategory, SpawnOptions, SpawnPoolProvider, Team, UnitId,
    UnitTemplate, World,
};
use director_core::math::Vec2;
use director_core::roles::Role;

/// A spawn pool with fixed contents per category.
#[derive(Debug, Clone, Default)]
pub struct FixedPool {
    recon: Vec<UnitTemplate>,
    assault: Vec<UnitTemplate>,
    heavy: Vec<UnitTemplate>,
    commander: Vec<UnitTemplate>,
    unsupported: BTreeSet<BuffKind>,
}

impl FixedPool {
    /// One or two cheap templates in every category.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            recon: vec![UnitTemplate::new("scout").with_cost(0.5)],
            assault: vec![
                UnitTemplate::new("trooper").with_cost(1.0),
                UnitTemplate::new("raider").with_cost(1.0),
            ],
            heavy: vec![UnitTemplate::new("juggernaut").with_cost(3.0)],
            commander: vec![UnitTemplate::new("warden").with_cost(0.0)],
            unsupported: BTreeSet::new(),
        }
    }

    /// Every category empty.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace one category.
    #[must_use]
    pub fn with_category(mut self, category: PoolCategory, templates: Vec<UnitTemplate>) -> Self {
        *self.slot(category) = templates;
        self
    }

    /// Report these buff kinds as unsupported.
    #[must_use]
    pub fn without_buffs(mut self, kinds: impl IntoIterator<Item = BuffKind>) -> Self {
        self.unsupported.extend(kinds);
        self
    }

    fn slot(&mut self, category: PoolCategory) -> &mut Vec<UnitTemplate> {
        match category {
            PoolCategory::Recon => &mut self.recon,
            PoolCategory::Assault => &mut self.assault,
            PoolCategory::Heavy => &mut self.heavy,
            PoolCategory::Commander => &mut self.commander,
        }
    }
}

impl SpawnPoolProvider for FixedPool {
    fn pool(&self, category: PoolCategory) -> &[UnitTemplate] {
        match category {
            PoolCategory::Recon => &self.recon,
            PoolCategory::Assault => &self.assault,
            PoolCategory::Heavy => &self.heavy,
            PoolCategory::Commander => &self.commander,
        }
    }

    fn supports_buff(&self, kind: BuffKind) -> bool {
        !self.unsupported.contains(&kind)
    }
}

/// A unit living in the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct ArenaUnit {
    /// Template it was spawned from.
    pub template: String,
    /// Current position.
    pub position: Vec2,
    /// Facing in radians.
    pub facing: f32,
    /// Health in `[0, 1]`.
    pub health: f32,
    /// Side.
    pub team: Team,
    /// Role tag from spawn options.
    pub role: Role,
    /// Spawned as a commander.
    pub elite: bool,
    /// Last desired velocity set by the director.
    pub desired_velocity: Vec2,
}

/// A recorded director-to-host call.
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaCall {
    /// A spawn was accepted.
    Spawn {
        /// New unit.
        unit: UnitId,
        /// Template id.
        template: String,
        /// Role tag.
        role: Role,
    },
    /// A spawn was refused.
    SpawnRefused,
    /// A timed buff was applied.
    Buff {
        /// Target.
        unit: UnitId,
        /// Effect.
        kind: BuffKind,
        /// Seconds.
        duration: f32,
    },
    /// Damage was applied.
    Damage {
        /// Target.
        unit: UnitId,
        /// Amount.
        amount: f32,
        /// Flags.
        flags: DamageFlags,
    },
    /// A heal was applied.
    Heal {
        /// Target.
        unit: UnitId,
        /// Fraction restored.
        fraction: f32,
    },
    /// A unit was teleported.
    Teleport {
        /// Target.
        unit: UnitId,
        /// Destination.
        position: Vec2,
    },
    /// The charge hold changed.
    ChargeHold(bool),
    /// Currency was granted.
    Currency {
        /// Recipient.
        player: PlayerId,
        /// Amount.
        amount: u32,
    },
    /// A reward container dropped.
    Container(Vec2),
}

/// Scripted host world.
///
/// Damage is lethal at or below zero health. Units only move when
/// [`ScriptedArena::step`] integrates their desired velocities.
#[derive(Debug, Clone, Default)]
pub struct ScriptedArena {
    next_unit: u64,
    units: BTreeMap<UnitId, ArenaUnit>,
    players: Vec<PlayerView>,
    objective: Option<ObjectiveView>,
    boss_alive: bool,
    charge_held: bool,
    refuse_spawns: bool,
    calls: Vec<ArenaCall>,
}

impl ScriptedArena {
    /// Empty arena: no players, no objective.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` healthy players spread around the origin.
    #[must_use]
    pub fn with_players(mut self, count: u32) -> Self {
        for i in 0..count {
            let angle = i as f32 * std::f32::consts::TAU / count.max(1) as f32;
            self.players.push(PlayerView {
                id: PlayerId(i + 1),
                position: Vec2::from_angle(angle).scale(4.0),
                health_fraction: 1.0,
                alive: true,
            });
        }
        self
    }

    /// Add an objective at `position`.
    #[must_use]
    pub fn with_objective(mut self, position: Vec2, radius: f32) -> Self {
        self.objective = Some(ObjectiveView {
            position,
            radius,
            charge_fraction: 0.0,
            zone_valid: true,
        });
        self
    }

    /// Start with a boss alive.
    #[must_use]
    pub fn with_boss(mut self) -> Self {
        self.boss_alive = true;
        self
    }

    /// Refuse every spawn call.
    pub fn set_refuse_spawns(&mut self, refuse: bool) {
        self.refuse_spawns = refuse;
    }

    /// Set the boss flag.
    pub fn set_boss_alive(&mut self, alive: bool) {
        self.boss_alive = alive;
    }

    /// Set objective charge, clamped to `[0, 1]`.
    pub fn set_charge(&mut self, fraction: f32) {
        if let Some(objective) = self.objective.as_mut() {
            objective.charge_fraction = fraction.clamp(0.0, 1.0);
        }
    }

    /// Current objective charge.
    #[must_use]
    pub fn charge(&self) -> f32 {
        self.objective.map_or(0.0, |o| o.charge_fraction)
    }

    /// Mark the objective zone valid or invalid.
    pub fn set_zone_valid(&mut self, valid: bool) {
        if let Some(objective) = self.objective.as_mut() {
            objective.zone_valid = valid;
        }
    }

    /// Remove the objective entirely.
    pub fn remove_objective(&mut self) {
        self.objective = None;
    }

    /// Replace a player's view.
    pub fn set_player(&mut self, view: PlayerView) {
        match self.players.iter_mut().find(|p| p.id == view.id) {
            Some(slot) => *slot = view,
            None => self.players.push(view),
        }
    }

    /// Kill a player.
    pub fn kill_player(&mut self, player: PlayerId) {
        if let Some(p) = self.players.iter_mut().find(|p| p.id == player) {
            p.alive = false;
            p.health_fraction = 0.0;
        }
    }

    /// Remove a unit as if it died.
    pub fn kill(&mut self, unit: UnitId) {
        self.units.remove(&unit);
    }

    /// Remove every enemy unit.
    pub fn kill_all_enemies(&mut self) {
        self.units.retain(|_, u| u.team != Team::Enemy);
    }

    /// Set a unit's health.
    pub fn set_health(&mut self, unit: UnitId, health: f32) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.health = health.clamp(0.0, 1.0);
        }
    }

    /// Move a unit.
    pub fn place(&mut self, unit: UnitId, position: Vec2) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.position = position;
        }
    }

    /// A living unit.
    #[must_use]
    pub fn unit(&self, unit: UnitId) -> Option<&ArenaUnit> {
        self.units.get(&unit)
    }

    /// Living enemy units in id order.
    pub fn enemies(&self) -> impl Iterator<Item = (UnitId, &ArenaUnit)> {
        self.units.iter().filter(|(_, u)| u.team == Team::Enemy).map(|(id, u)| (*id, u))
    }

    /// Number of living enemy units.
    #[must_use]
    pub fn enemy_count(&self) -> usize {
        self.enemies().count()
    }

    /// Living elite units.
    #[must_use]
    pub fn elites(&self) -> Vec<UnitId> {
        self.enemies().filter(|(_, u)| u.elite).map(|(id, _)| id).collect()
    }

    /// Whether the charge is currently held.
    #[must_use]
    pub fn charge_held(&self) -> bool {
        self.charge_held
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> &[ArenaCall] {
        &self.calls
    }

    /// Drop recorded calls.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Accepted spawns recorded so far.
    #[must_use]
    pub fn spawn_count(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, ArenaCall::Spawn { .. })).count()
    }

    /// Currency granted to one player so far.
    #[must_use]
    pub fn currency(&self, player: PlayerId) -> u32 {
        self.calls
            .iter()
            .filter_map(|c| match c {
                ArenaCall::Currency { player: p, amount } if *p == player => Some(*amount),
                _ => None,
            })
            .sum()
    }

    /// Reward containers dropped so far.
    #[must_use]
    pub fn containers(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, ArenaCall::Container(_))).count()
    }

    /// Integrate desired velocities for `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        for unit in self.units.values_mut() {
            unit.position = unit.position + unit.desired_velocity.scale(dt);
        }
    }
}

impl World for ScriptedArena {
    fn spawn(
        &mut self,
        template: &UnitTemplate,
        position: Vec2,
        facing: f32,
        team: Team,
        options: SpawnOptions,
    ) -> Option<UnitId> {
        if self.refuse_spawns {
            self.calls.push(ArenaCall::SpawnRefused);
            return None;
        }
        self.next_unit += 1;
        let id = UnitId(self.next_unit);
        self.units.insert(
            id,
            ArenaUnit {
                template: template.id.clone(),
                position,
                facing,
                health: 1.0,
                team,
                role: options.role,
                elite: options.elite,
                desired_velocity: Vec2::ZERO,
            },
        );
        self.calls.push(ArenaCall::Spawn {
            unit: id,
            template: template.id.clone(),
            role: options.role,
        });
        Some(id)
    }

    fn is_alive(&self, unit: UnitId) -> bool {
        self.units.get(&unit).is_some_and(|u| u.health > 0.0)
    }

    fn position_of(&self, unit: UnitId) -> Option<Vec2> {
        self.units.get(&unit).map(|u| u.position)
    }

    fn facing_of(&self, unit: UnitId) -> Option<f32> {
        self.units.get(&unit).map(|u| u.facing)
    }

    fn health_fraction_of(&self, unit: UnitId) -> Option<f32> {
        self.units.get(&unit).map(|u| u.health)
    }

    fn apply_timed_buff(&mut self, unit: UnitId, kind: BuffKind, duration: f32) {
        self.calls.push(ArenaCall::Buff { unit, kind, duration });
    }

    fn apply_damage(&mut self, unit: UnitId, amount: f32, flags: DamageFlags) {
        self.calls.push(ArenaCall::Damage { unit, amount, flags });
        let dead = match self.units.get_mut(&unit) {
            Some(u) => {
                u.health -= amount / 100.0;
                u.health <= 0.0
            }
            None => false,
        };
        if dead {
            self.units.remove(&unit);
        }
    }

    fn heal_fraction(&mut self, unit: UnitId, fraction: f32) {
        self.calls.push(ArenaCall::Heal { unit, fraction });
        if let Some(u) = self.units.get_mut(&unit) {
            u.health = (u.health + fraction).min(1.0);
        }
    }

    fn set_desired_velocity(&mut self, unit: UnitId, velocity: Vec2) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.desired_velocity = velocity;
        }
    }

    fn teleport(&mut self, unit: UnitId, position: Vec2) {
        self.calls.push(ArenaCall::Teleport { unit, position });
        if let Some(u) = self.units.get_mut(&unit) {
            u.position = position;
        }
    }

    fn players(&self) -> Vec<PlayerView> {
        self.players.clone()
    }

    fn enemies_within(&self, center: Vec2, radius: f32) -> Vec<UnitId> {
        let radius_sq = radius * radius;
        self.enemies()
            .filter(|(_, u)| u.position.distance_squared(center) <= radius_sq)
            .map(|(id, _)| id)
            .collect()
    }

    fn objective(&self) -> Option<ObjectiveView> {
        self.objective
    }

    fn boss_alive(&self) -> bool {
        self.boss_alive
    }

    fn set_charge_hold(&mut self, held: bool) {
        self.charge_held = held;
        self.calls.push(ArenaCall::ChargeHold(held));
    }

    fn grant_currency(&mut self, player: PlayerId, amount: u32) {
        self.calls.push(ArenaCall::Currency { player, amount });
    }

    fn spawn_reward_container(&mut self, position: Vec2) {
        self.calls.push(ArenaCall::Container(position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_kill() {
        let mut arena = ScriptedArena::new().with_players(2);
        let template = UnitTemplate::new("grunt");
        let unit = arena
            .spawn(&template, Vec2::new(1.0, 1.0), 0.0, Team::Enemy, SpawnOptions::default())
            .unwrap();
        assert!(arena.is_alive(unit));
        assert_eq!(arena.enemy_count(), 1);
        arena.kill(unit);
        assert!(!arena.is_alive(unit));
        assert_eq!(arena.position_of(unit), None);
    }

    #[test]
    fn test_refused_spawns_are_recorded() {
        let mut arena = ScriptedArena::new();
        arena.set_refuse_spawns(true);
        let template = UnitTemplate::new("grunt");
        assert!(arena
            .spawn(&template, Vec2::ZERO, 0.0, Team::Enemy, SpawnOptions::default())
            .is_none());
        assert_eq!(arena.calls(), &[ArenaCall::SpawnRefused]);
    }

    #[test]
    fn test_heavy_damage_kills() {
        let mut arena = ScriptedArena::new();
        let template = UnitTemplate::new("grunt");
        let unit = arena
            .spawn(&template, Vec2::ZERO, 0.0, Team::Enemy, SpawnOptions::default())
            .unwrap();
        arena.apply_damage(unit, 1.0e6, DamageFlags::default());
        assert!(!arena.is_alive(unit));
    }

    #[test]
    fn test_empty_pool() {
        let pool = FixedPool::empty();
        assert!(pool.pool(PoolCategory::Assault).is_empty());
        assert!(!FixedPool::standard().pool(PoolCategory::Heavy).is_empty());
    }
}
