//! Simulated arena the director is driven against.
//!
//! A deliberately crude combat model: enemies walk along the velocities the
//! director sets, bite players they touch, and die to player fire within
//! range. Players hold near the objective with a little seeded jitter, and
//! one of them wanders off now and then to exercise lone-wolf pressure.
//! Combat side effects come back to the runner as [`Hook`]s.

use std::collections::BTreeMap;

use director_core::capabilities::BuffKind;
use director_core::hooks::Hook;
use director_core::host::{
    DamageFlags, ObjectiveView, PlayerId, PlayerView, PoolCategory, SpawnOptions, SpawnPoolProvider, Team, UnitId,
    UnitTemplate, World,
};
use director_core::math::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Player reach for killing enemies.
const PLAYER_RANGE: f32 = 14.0;
/// Damage per second one player deals.
const PLAYER_DPS: f32 = 30.0;
/// Enemy melee reach.
const ENEMY_REACH: f32 = 2.5;
/// Player health lost per second per enemy in reach.
const ENEMY_DPS: f32 = 0.04;
/// Seconds before a dead player respawns.
const RESPAWN_SECONDS: f32 = 20.0;
/// Objective charge per second with a player on the zone.
const CHARGE_PER_SECOND: f32 = 1.0 / 60.0;
/// Boss health in player-damage units.
const BOSS_HEALTH: f32 = 900.0;
/// Health granted per unit of template cost.
const HEALTH_PER_COST: f32 = 40.0;
/// Player health regenerated per second while out of combat.
const REGEN_PER_SECOND: f32 = 0.01;

/// Content set the arena spawns from.
#[derive(Debug, Clone)]
pub struct ArenaPool {
    recon: Vec<UnitTemplate>,
    assault: Vec<UnitTemplate>,
    heavy: Vec<UnitTemplate>,
    commander: Vec<UnitTemplate>,
}

impl ArenaPool {
    /// The arena's fixed roster.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            recon: vec![
                UnitTemplate::new("skitter").with_cost(0.5),
                UnitTemplate::new("spotter").with_cost(0.75),
            ],
            assault: vec![
                UnitTemplate::new("trooper"),
                UnitTemplate::new("raider"),
                UnitTemplate::new("gunner").with_cost(1.25),
            ],
            heavy: vec![
                UnitTemplate::new("brute").with_cost(3.0),
                UnitTemplate::new("mortar").with_cost(2.5),
            ],
            commander: vec![UnitTemplate::new("warden").with_cost(0.0)],
        }
    }
}

impl SpawnPoolProvider for ArenaPool {
    fn pool(&self, category: PoolCategory) -> &[UnitTemplate] {
        match category {
            PoolCategory::Recon => &self.recon,
            PoolCategory::Assault => &self.assault,
            PoolCategory::Heavy => &self.heavy,
            PoolCategory::Commander => &self.commander,
        }
    }

    fn supports_buff(&self, kind: BuffKind) -> bool {
        !matches!(kind, BuffKind::Enrage)
    }
}

#[derive(Debug, Clone)]
struct SimUnit {
    position: Vec2,
    facing: f32,
    health: f32,
    max_health: f32,
    velocity: Vec2,
    elite: bool,
}

#[derive(Debug, Clone)]
struct SimPlayer {
    view: PlayerView,
    home: Vec2,
    respawn: f32,
}

/// Crude world used by the runner.
#[derive(Debug, Clone)]
pub struct SimArena {
    rng: ChaCha8Rng,
    next_unit: u64,
    units: BTreeMap<UnitId, SimUnit>,
    players: Vec<SimPlayer>,
    objective: ObjectiveView,
    charge_held: bool,
    charging: bool,
    boss_health: f32,
    wanderer: Option<usize>,
    wander_timer: f32,
    currency: u64,
    containers: u32,
}

impl SimArena {
    /// Arena with `players` players around an objective at the origin.
    #[must_use]
    pub fn new(seed: u64, players: u32) -> Self {
        let players = (0..players.max(1))
            .map(|i| {
                let angle = i as f32 * std::f32::consts::TAU / players.max(1) as f32;
                let home = Vec2::from_angle(angle).scale(5.0);
                SimPlayer {
                    view: PlayerView {
                        id: PlayerId(i + 1),
                        position: home,
                        health_fraction: 1.0,
                        alive: true,
                    },
                    home,
                    respawn: 0.0,
                }
            })
            .collect();
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed ^ 0xA5A5_5A5A),
            next_unit: 0,
            units: BTreeMap::new(),
            players,
            objective: ObjectiveView {
                position: Vec2::ZERO,
                radius: 12.0,
                charge_fraction: 0.0,
                zone_valid: true,
            },
            charge_held: false,
            charging: false,
            boss_health: 0.0,
            wanderer: None,
            wander_timer: 30.0,
            currency: 0,
            containers: 0,
        }
    }

    /// Reset per-stage state; optionally put a boss on the field.
    pub fn begin_stage(&mut self, boss: bool) {
        self.units.clear();
        self.objective.charge_fraction = 0.0;
        self.charge_held = false;
        self.charging = false;
        self.boss_health = if boss { BOSS_HEALTH } else { 0.0 };
        for p in &mut self.players {
            p.view.position = p.home;
            p.view.health_fraction = 1.0;
            p.view.alive = true;
            p.respawn = 0.0;
        }
    }

    /// Start charging the objective.
    pub fn begin_charge(&mut self) {
        self.charging = true;
    }

    /// Whether the objective is full.
    #[must_use]
    pub fn charged(&self) -> bool {
        self.objective.charge_fraction >= 1.0
    }

    /// Stop charging.
    pub fn end_charge(&mut self) {
        self.charging = false;
    }

    /// Living enemy units.
    #[must_use]
    pub fn enemy_count(&self) -> usize {
        self.units.len()
    }

    /// Living elite units.
    #[must_use]
    pub fn elite_count(&self) -> usize {
        self.units.values().filter(|u| u.elite).count()
    }

    /// Currency granted so far, summed over players.
    #[must_use]
    pub fn currency(&self) -> u64 {
        self.currency
    }

    /// Reward containers dropped so far.
    #[must_use]
    pub fn containers(&self) -> u32 {
        self.containers
    }

    /// Advance the crude simulation and report combat as hooks.
    pub fn step(&mut self, dt: f32) -> Vec<Hook> {
        let mut hooks = Vec::new();
        self.move_players(dt);
        self.move_units(dt);
        self.enemy_attacks(dt, &mut hooks);
        self.player_attacks(dt, &mut hooks);
        self.respawn_players(dt);
        if self.charging && !self.charge_held {
            let on_zone = self
                .players
                .iter()
                .any(|p| p.view.alive && p.view.position.distance(self.objective.position) <= self.objective.radius);
            if on_zone {
                self.objective.charge_fraction = (self.objective.charge_fraction + CHARGE_PER_SECOND * dt).min(1.0);
            }
        }
        hooks
    }

    fn move_players(&mut self, dt: f32) {
        self.wander_timer -= dt;
        if self.wander_timer <= 0.0 {
            self.wander_timer = self.rng.gen_range(20.0..45.0);
            self.wanderer = if self.players.len() > 1 && self.rng.gen_bool(0.5) {
                Some(self.rng.gen_range(0..self.players.len()))
            } else {
                None
            };
        }
        for (i, p) in self.players.iter_mut().enumerate() {
            if !p.view.alive {
                continue;
            }
            let goal = if self.wanderer == Some(i) { p.home.scale(8.0) } else { p.home };
            let jitter = Vec2::new(self.rng.gen_range(-1.0..1.0), self.rng.gen_range(-1.0..1.0));
            let step = (goal - p.view.position).clamp_length(6.0 * dt) + jitter.scale(dt);
            p.view.position = p.view.position + step;
        }
    }

    fn move_units(&mut self, dt: f32) {
        for unit in self.units.values_mut() {
            unit.position = unit.position + unit.velocity.scale(dt);
            if unit.velocity.length() > f32::EPSILON {
                unit.facing = unit.velocity.y.atan2(unit.velocity.x);
            }
        }
    }

    fn enemy_attacks(&mut self, dt: f32, hooks: &mut Vec<Hook>) {
        let reach_sq = ENEMY_REACH * ENEMY_REACH;
        for p in &mut self.players {
            if !p.view.alive {
                continue;
            }
            let mut attackers = self
                .units
                .iter()
                .filter(|(_, u)| u.position.distance_squared(p.view.position) <= reach_sq)
                .map(|(id, _)| *id)
                .peekable();
            let Some(first) = attackers.peek().copied() else {
                let before = p.view.health_fraction;
                p.view.health_fraction = (before + REGEN_PER_SECOND * dt).min(1.0);
                if p.view.health_fraction > before {
                    hooks.push(Hook::UnitHealed {
                        player: Some(p.view.id),
                        amount: (p.view.health_fraction - before) * 100.0,
                    });
                }
                continue;
            };
            let count = attackers.count() as f32;
            let damage = ENEMY_DPS * count * dt;
            p.view.health_fraction -= damage;
            hooks.push(Hook::DamageDealt {
                attacker: Some(first),
                victim: Some(p.view.id),
                amount: damage * 100.0,
            });
            if p.view.health_fraction <= 0.0 {
                p.view.health_fraction = 0.0;
                p.view.alive = false;
                p.respawn = RESPAWN_SECONDS;
                hooks.push(Hook::PlayerDeath { player: p.view.id });
            }
        }
    }

    fn player_attacks(&mut self, dt: f32, hooks: &mut Vec<Hook>) {
        let range_sq = PLAYER_RANGE * PLAYER_RANGE;
        for p in self.players.iter().filter(|p| p.view.alive) {
            let target = self
                .units
                .iter()
                .filter(|(_, u)| u.position.distance_squared(p.view.position) <= range_sq)
                .min_by(|a, b| {
                    a.1.position
                        .distance_squared(p.view.position)
                        .total_cmp(&b.1.position.distance_squared(p.view.position))
                })
                .map(|(id, _)| *id);
            match target {
                Some(id) => {
                    if let Some(unit) = self.units.get_mut(&id) {
                        unit.health -= PLAYER_DPS * dt;
                        hooks.push(Hook::DamageDealt {
                            attacker: None,
                            victim: None,
                            amount: PLAYER_DPS * dt,
                        });
                    }
                }
                None if self.boss_health > 0.0 => {
                    self.boss_health -= PLAYER_DPS * dt;
                }
                None => {}
            }
        }
        self.units.retain(|_, u| u.health > 0.0);
    }

    fn respawn_players(&mut self, dt: f32) {
        for p in self.players.iter_mut().filter(|p| !p.view.alive) {
            p.respawn -= dt;
            if p.respawn <= 0.0 {
                p.view.alive = true;
                p.view.health_fraction = 1.0;
                p.view.position = p.home;
            }
        }
    }
}

impl World for SimArena {
    fn spawn(
        &mut self,
        template: &UnitTemplate,
        position: Vec2,
        facing: f32,
        team: Team,
        options: SpawnOptions,
    ) -> Option<UnitId> {
        if team != Team::Enemy || !position.is_finite() {
            return None;
        }
        self.next_unit += 1;
        let id = UnitId(self.next_unit);
        let max_health = HEALTH_PER_COST * template.cost.max(0.5) * if options.elite { 6.0 } else { 1.0 };
        self.units.insert(
            id,
            SimUnit {
                position,
                facing,
                health: max_health,
                max_health,
                velocity: Vec2::ZERO,
                elite: options.elite,
            },
        );
        Some(id)
    }

    fn is_alive(&self, unit: UnitId) -> bool {
        self.units.contains_key(&unit)
    }

    fn position_of(&self, unit: UnitId) -> Option<Vec2> {
        self.units.get(&unit).map(|u| u.position)
    }

    fn facing_of(&self, unit: UnitId) -> Option<f32> {
        self.units.get(&unit).map(|u| u.facing)
    }

    fn health_fraction_of(&self, unit: UnitId) -> Option<f32> {
        self.units.get(&unit).map(|u| u.health / u.max_health)
    }

    fn apply_timed_buff(&mut self, unit: UnitId, kind: BuffKind, duration: f32) {
        if let Some(u) = self.units.get_mut(&unit) {
            if kind == BuffKind::Armor {
                u.health = (u.health + u.max_health * 0.01 * duration).min(u.max_health * 1.5);
            }
        }
    }

    fn apply_damage(&mut self, unit: UnitId, amount: f32, _flags: DamageFlags) {
        let dead = self.units.get_mut(&unit).is_some_and(|u| {
            u.health -= amount;
            u.health <= 0.0
        });
        if dead {
            self.units.remove(&unit);
        }
    }

    fn heal_fraction(&mut self, unit: UnitId, fraction: f32) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.health = (u.health + u.max_health * fraction).min(u.max_health);
        }
    }

    fn set_desired_velocity(&mut self, unit: UnitId, velocity: Vec2) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.velocity = velocity;
        }
    }

    fn teleport(&mut self, unit: UnitId, position: Vec2) {
        if let Some(u) = self.units.get_mut(&unit) {
            u.position = position;
        }
    }

    fn players(&self) -> Vec<PlayerView> {
        self.players.iter().map(|p| p.view).collect()
    }

    fn enemies_within(&self, center: Vec2, radius: f32) -> Vec<UnitId> {
        let radius_sq = radius * radius;
        self.units
            .iter()
            .filter(|(_, u)| u.position.distance_squared(center) <= radius_sq)
            .map(|(id, _)| *id)
            .collect()
    }

    fn objective(&self) -> Option<ObjectiveView> {
        Some(self.objective)
    }

    fn boss_alive(&self) -> bool {
        self.boss_health > 0.0
    }

    fn set_charge_hold(&mut self, held: bool) {
        self.charge_held = held;
        if held {
            self.objective.charge_fraction = 0.0;
        }
    }

    fn grant_currency(&mut self, _player: PlayerId, amount: u32) {
        self.currency += u64::from(amount);
    }

    fn spawn_reward_container(&mut self, _position: Vec2) {
        self.containers += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enemies_die_to_player_fire() {
        let mut arena = SimArena::new(1, 2);
        arena.begin_stage(false);
        let template = UnitTemplate::new("trooper").with_cost(1.0);
        let unit = arena
            .spawn(&template, Vec2::new(6.0, 0.0), 0.0, Team::Enemy, SpawnOptions::default())
            .unwrap();
        for _ in 0..200 {
            arena.step(0.05);
        }
        assert!(!arena.is_alive(unit));
    }

    #[test]
    fn test_charge_needs_player_on_zone_and_no_hold() {
        let mut arena = SimArena::new(1, 2);
        arena.begin_stage(false);
        arena.begin_charge();
        arena.step(1.0);
        assert!(arena.objective().unwrap().charge_fraction > 0.0);
        arena.set_charge_hold(true);
        arena.step(1.0);
        assert_eq!(arena.objective().unwrap().charge_fraction, 0.0);
    }

    #[test]
    fn test_boss_falls_to_idle_players() {
        let mut arena = SimArena::new(1, 3);
        arena.begin_stage(true);
        assert!(arena.boss_alive());
        for _ in 0..400 {
            arena.step(0.05);
        }
        assert!(!arena.boss_alive());
    }
}
