//! Boundary between the director and the game that hosts it.
//!
//! The director never owns units, players or the objective. It consumes a
//! [`SpawnPoolProvider`] injected at construction and talks to the running
//! match through the [`World`] trait passed into every tick. Every query may
//! come back empty: units die between ticks, objectives get torn down, pools
//! can be empty for a given content set.

use serde::{Deserialize, Serialize};

use crate::capabilities::BuffKind;
use crate::math::Vec2;
use crate::roles::Role;

/// Opaque handle to a unit owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u64);

/// Opaque handle to a connected player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

/// Spawn pool categories supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolCategory {
    /// Light, fast scouting units.
    Recon,
    /// Standard line units.
    Assault,
    /// Slow, durable units.
    Heavy,
    /// Elite units wrapped by commander nodes.
    Commander,
}

/// A spawnable unit template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTemplate {
    /// Host-side template identifier.
    pub id: String,
    /// Spawn credit consumed per unit.
    #[serde(default = "default_template_cost")]
    pub cost: f32,
}

const fn default_template_cost() -> f32 {
    1.0
}

impl UnitTemplate {
    /// Create a template with the default cost of one credit.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cost: default_template_cost(),
        }
    }

    /// Override the credit cost.
    #[must_use]
    pub fn with_cost(mut self, cost: f32) -> Self {
        self.cost = cost;
        self
    }
}

/// Which side a unit fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    /// The players' side.
    Player,
    /// The director's side.
    Enemy,
}

/// Extra information passed along with a spawn call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpawnOptions {
    /// Role the unit will be steered by.
    pub role: Role,
    /// Whether the unit is an elite commander.
    pub elite: bool,
}

/// Flags accompanying a damage request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageFlags {
    /// Suppress death effects and rewards.
    pub silent: bool,
    /// Ignore armor and resistances.
    pub bypass_armor: bool,
}

/// Read-only view of one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerView {
    /// Player handle.
    pub id: PlayerId,
    /// Position of the player's body.
    pub position: Vec2,
    /// Combined health and shield as a fraction of maximum.
    pub health_fraction: f32,
    /// Whether the player currently has a living body.
    pub alive: bool,
}

/// Read-only view of the objective and its charge zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveView {
    /// Objective position.
    pub position: Vec2,
    /// Radius of the charge zone.
    pub radius: f32,
    /// Charge progress in `[0, 1]`.
    pub charge_fraction: f32,
    /// Whether the zone controller is still valid.
    pub zone_valid: bool,
}

/// Categorised spawn templates, injected at construction.
pub trait SpawnPoolProvider {
    /// Ordered templates for a category; empty means "nothing to spawn".
    fn pool(&self, category: PoolCategory) -> &[UnitTemplate];

    /// Whether the content set defines a timed effect.
    fn supports_buff(&self, _kind: BuffKind) -> bool {
        true
    }
}

/// Operations the director performs on the running match.
///
/// All mutating calls are fire-and-forget. Implementations must tolerate
/// handles that became invalid since the last tick.
pub trait World {
    /// Spawn a unit. `None` means the host refused; callers skip silently.
    fn spawn(
        &mut self,
        template: &UnitTemplate,
        position: Vec2,
        facing: f32,
        team: Team,
        options: SpawnOptions,
    ) -> Option<UnitId>;

    /// Whether the unit exists and is alive.
    fn is_alive(&self, unit: UnitId) -> bool;

    /// Current position of a unit.
    fn position_of(&self, unit: UnitId) -> Option<Vec2>;

    /// Facing angle of a unit in radians.
    fn facing_of(&self, unit: UnitId) -> Option<f32>;

    /// Combined health fraction of a unit.
    fn health_fraction_of(&self, unit: UnitId) -> Option<f32>;

    /// Apply a timed effect.
    fn apply_timed_buff(&mut self, unit: UnitId, kind: BuffKind, duration: f32);

    /// Deal damage.
    fn apply_damage(&mut self, unit: UnitId, amount: f32, flags: DamageFlags);

    /// Heal a fraction of maximum health.
    fn heal_fraction(&mut self, unit: UnitId, fraction: f32);

    /// Desired planar velocity for the unit's movement controller.
    fn set_desired_velocity(&mut self, unit: UnitId, velocity: Vec2);

    /// Move the unit instantly.
    fn teleport(&mut self, unit: UnitId, position: Vec2);

    /// All players, alive or not.
    fn players(&self) -> Vec<PlayerView>;

    /// Living enemy-side units within `radius` of `center`.
    fn enemies_within(&self, center: Vec2, radius: f32) -> Vec<UnitId>;

    /// The current objective, if one exists.
    fn objective(&self) -> Option<ObjectiveView>;

    /// Whether a boss-class unit is alive.
    fn boss_alive(&self) -> bool;

    /// Freeze or release objective charge progress.
    fn set_charge_hold(&mut self, held: bool);

    /// Grant currency to one player.
    fn grant_currency(&mut self, player: PlayerId, amount: u32);

    /// Drop a reward container.
    fn spawn_reward_container(&mut self, position: Vec2);
}

/// How strongly the enemy side contests the objective right now.
///
/// Feeds the contest-seconds telemetry. The shipped implementation is
/// [`NoContest`]; the hook stays pluggable so a host can supply a real
/// measure without touching the cadence machine.
pub trait ContestWeight {
    /// Contest weight in `[0, 1]`.
    fn contest_weight(&self, objective: &ObjectiveView, players: &[PlayerView]) -> f32;
}

/// Contest hook that always reports zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContest;

impl ContestWeight for NoContest {
    fn contest_weight(&self, _objective: &ObjectiveView, _players: &[PlayerView]) -> f32 {
        0.0
    }
}

/// Living players only.
pub fn alive_players(players: &[PlayerView]) -> impl Iterator<Item = &PlayerView> {
    players.iter().filter(|p| p.alive)
}

/// Mean health fraction of living players, 0 when nobody is alive.
#[must_use]
pub fn team_health(players: &[PlayerView]) -> f32 {
    let (sum, count) = alive_players(players).fold((0.0_f32, 0_u32), |(s, c), p| {
        (s + p.health_fraction, c + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Centroid of living players.
#[must_use]
pub fn player_centroid(players: &[PlayerView]) -> Option<Vec2> {
    Vec2::centroid(alive_players(players).map(|p| p.position))
}

/// The living player whose nearest living teammate is farthest away.
///
/// Needs at least two living players; a lone survivor is not "isolated" in
/// any useful sense and callers fall back to other selectors.
#[must_use]
pub fn most_isolated_player(players: &[PlayerView]) -> Option<PlayerView> {
    let alive: Vec<&PlayerView> = alive_players(players).collect();
    if alive.len() < 2 {
        return None;
    }
    let mut best: Option<(f32, PlayerView)> = None;
    for p in &alive {
        let nearest = alive
            .iter()
            .filter(|q| q.id != p.id)
            .map(|q| p.position.distance_squared(q.position))
            .fold(f32::INFINITY, f32::min);
        if best.map_or(true, |(d, _)| nearest > d) {
            best = Some((nearest, **p));
        }
    }
    best.map(|(_, p)| p)
}

/// The living player with the lowest health fraction.
#[must_use]
pub fn weakest_player(players: &[PlayerView]) -> Option<PlayerView> {
    alive_players(players)
        .copied()
        .min_by(|a, b| a.health_fraction.total_cmp(&b.health_fraction))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: u32, x: f32, y: f32, hp: f32) -> PlayerView {
        PlayerView {
            id: PlayerId(id),
            position: Vec2::new(x, y),
            health_fraction: hp,
            alive: true,
        }
    }

    #[test]
    fn test_most_isolated_needs_two_players() {
        assert_eq!(most_isolated_player(&[player(1, 0.0, 0.0, 1.0)]), None);
    }

    #[test]
    fn test_most_isolated_picks_straggler() {
        let players = [
            player(1, 0.0, 0.0, 1.0),
            player(2, 2.0, 0.0, 1.0),
            player(3, 40.0, 0.0, 1.0),
        ];
        assert_eq!(most_isolated_player(&players).map(|p| p.id), Some(PlayerId(3)));
    }

    #[test]
    fn test_dead_players_are_ignored() {
        let mut dead = player(3, 0.0, 0.0, 0.05);
        dead.alive = false;
        let players = [player(1, 0.0, 0.0, 0.8), player(2, 1.0, 0.0, 0.4), dead];
        assert_eq!(weakest_player(&players).map(|p| p.id), Some(PlayerId(2)));
        assert!((team_health(&players) - 0.6).abs() < 1e-5);
        assert_eq!(player_centroid(&players), Some(Vec2::new(0.5, 0.0)));
    }

    #[test]
    fn test_no_contest_is_zero() {
        let objective = ObjectiveView {
            position: Vec2::ZERO,
            radius: 10.0,
            charge_fraction: 0.5,
            zone_valid: true,
        };
        assert_eq!(NoContest.contest_weight(&objective, &[]), 0.0);
    }
}
