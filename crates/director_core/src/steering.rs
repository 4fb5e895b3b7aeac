//! Role steering.
//!
//! Each director-spawned unit gets a [`SteeringAgent`] that turns its role
//! into a desired velocity. Agents think at a reduced rate; between thinks the
//! host keeps the last velocity. The integrator is deliberately simple:
//! accelerate toward the desired direction, clamp to max speed, brake when
//! there is nowhere to go.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::SteeringTuning;
use crate::host::{alive_players, most_isolated_player, player_centroid, weakest_player, PlayerId, PlayerView, UnitId, World};
use crate::math::Vec2;
use crate::roles::Role;

/// Hold radius used when no objective exists and units gather on the players.
const FALLBACK_HOLD_RADIUS: f32 = 8.0;
/// Wounded contesters stop this close to the zone edge.
const EDGE_TOLERANCE: f32 = 1.0;

/// Where the fight is centred this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Battlefield {
    /// Objective position, or the player centroid when it is missing.
    pub anchor: Vec2,
    /// Objective radius, or a fallback hold radius.
    pub radius: f32,
    /// Centroid of director-spawned units.
    pub enemy_mass: Option<Vec2>,
}

/// Steering state for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SteeringAgent {
    unit: UnitId,
    role: Role,
    velocity: Vec2,
    think_timer: f32,
    strafe_sign: f32,
    flank_point: Option<Vec2>,
    flank_reached: bool,
    hold_point: Option<Vec2>,
}

impl SteeringAgent {
    /// Fresh agent. The first think happens on the next tick.
    #[must_use]
    pub fn new(unit: UnitId, role: Role, strafe_sign: f32) -> Self {
        Self {
            unit,
            role,
            velocity: Vec2::ZERO,
            think_timer: 0.0,
            strafe_sign: if strafe_sign < 0.0 { -1.0 } else { 1.0 },
            flank_point: None,
            flank_reached: false,
            hold_point: None,
        }
    }

    /// Steered unit.
    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Assigned role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Last commanded velocity.
    #[must_use]
    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    /// Desired direction (unit length or zero) for the current role.
    fn desired_direction<W: World + ?Sized, R: Rng + ?Sized>(
        &mut self,
        position: Vec2,
        world: &W,
        field: &Battlefield,
        players: &[PlayerView],
        squad_target: Option<&PlayerView>,
        tuning: &SteeringTuning,
        rng: &mut R,
    ) -> Vec2 {
        match self.role {
            Role::Contester => {
                let health = world.health_fraction_of(self.unit).unwrap_or(1.0);
                contest(position, field, health < tuning.contester_wounded)
            }
            Role::Artillery => {
                let offset = position - field.anchor;
                let distance = offset.length();
                let outward = offset.normalize();
                if distance < tuning.artillery_band.min {
                    outward
                } else if distance > tuning.artillery_band.max {
                    outward.scale(-1.0)
                } else {
                    outward.perp().scale(self.strafe_sign * tuning.strafe_fraction)
                }
            }
            Role::Flanker => {
                if self.flank_reached {
                    return contest(position, field, false);
                }
                let point = *self.flank_point.get_or_insert_with(|| flank_point(field, tuning, rng));
                if position.distance(point) <= tuning.flank_arrival {
                    self.flank_reached = true;
                    contest(position, field, false)
                } else {
                    (point - position).normalize()
                }
            }
            Role::Peeler => match weakest_player(players) {
                Some(target) if target.health_fraction < tuning.peeler_wound_threshold => {
                    (target.position - position).normalize()
                }
                _ => {
                    let health = world.health_fraction_of(self.unit).unwrap_or(1.0);
                    contest(position, field, health < tuning.contester_wounded)
                }
            },
            Role::Hunter => match squad_target {
                Some(target) => (target.position - position).normalize(),
                None => contest(position, field, false),
            },
            Role::Anchor => {
                let hold = *self.hold_point.get_or_insert_with(|| {
                    let facing = world.facing_of(self.unit).unwrap_or_else(|| {
                        let away = position - field.anchor;
                        away.y.atan2(away.x)
                    });
                    field.anchor + Vec2::from_angle(facing).scale(tuning.anchor_offset)
                });
                if position.distance(hold) > tuning.anchor_drift {
                    (hold - position).normalize()
                } else {
                    (field.anchor - hold)
                        .normalize()
                        .perp()
                        .scale(self.strafe_sign * tuning.strafe_fraction)
                }
            }
            Role::None => contest(position, field, false),
        }
    }

    fn integrate(&mut self, direction: Vec2, dt: f32, tuning: &SteeringTuning) {
        if direction.length() <= f32::EPSILON {
            let speed = (self.velocity.length() - tuning.acceleration * dt).max(0.0);
            self.velocity = self.velocity.clamp_length(speed);
        } else {
            self.velocity = (self.velocity + direction.scale(tuning.acceleration * dt)).clamp_length(tuning.max_speed);
        }
    }
}

/// Generic hold-objective rule: close inside the radius, or hold at its edge
/// when `edge` is set.
fn contest(position: Vec2, field: &Battlefield, edge: bool) -> Vec2 {
    let offset = position - field.anchor;
    let distance = offset.length();
    if edge {
        let target = field.anchor + offset.normalize().scale(field.radius);
        if position.distance(target) <= EDGE_TOLERANCE {
            Vec2::ZERO
        } else {
            (target - position).normalize()
        }
    } else if distance > field.radius {
        offset.normalize().scale(-1.0)
    } else {
        Vec2::ZERO
    }
}

/// Point on the far side of the objective from the enemy mass, jittered.
fn flank_point<R: Rng + ?Sized>(field: &Battlefield, tuning: &SteeringTuning, rng: &mut R) -> Vec2 {
    let away = field
        .enemy_mass
        .map(|mass| field.anchor - mass)
        .filter(|v| v.length() > f32::EPSILON)
        .map_or_else(|| Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU)), Vec2::normalize);
    let jitter = tuning.flank_jitter_degrees.to_radians();
    let angle = if jitter > 0.0 { rng.gen_range(-jitter..=jitter) } else { 0.0 };
    field.anchor + away.rotate(angle).scale(tuning.flank_distance)
}

/// All steering agents plus the shared squad target.
#[derive(Debug, Clone)]
pub struct SteeringController {
    tuning: SteeringTuning,
    agents: Vec<SteeringAgent>,
    squad_target: Option<PlayerId>,
    squad_timer: f32,
}

impl SteeringController {
    /// Empty controller.
    #[must_use]
    pub fn new(tuning: SteeringTuning) -> Self {
        Self {
            tuning,
            agents: Vec::new(),
            squad_target: None,
            squad_timer: 0.0,
        }
    }

    /// Start steering a unit.
    pub fn register<R: Rng + ?Sized>(&mut self, unit: UnitId, role: Role, rng: &mut R) {
        let sign = if rng.gen::<bool>() { 1.0 } else { -1.0 };
        self.agents.push(SteeringAgent::new(unit, role, sign));
    }

    /// Living agents.
    #[must_use]
    pub fn agents(&self) -> &[SteeringAgent] {
        &self.agents
    }

    /// Number of agents tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agents are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Current hunter target.
    #[must_use]
    pub fn squad_target(&self) -> Option<PlayerId> {
        self.squad_target
    }

    /// Drop every agent.
    pub fn clear(&mut self) {
        self.agents.clear();
        self.squad_target = None;
        self.squad_timer = 0.0;
    }

    /// Forget one unit, e.g. after a cull.
    pub fn remove(&mut self, unit: UnitId) {
        self.agents.retain(|a| a.unit != unit);
    }

    /// Prune dead units, reselect the squad target and steer.
    pub fn tick<W: World + ?Sized, R: Rng + ?Sized>(
        &mut self,
        dt: f32,
        world: &mut W,
        players: &[PlayerView],
        rng: &mut R,
    ) {
        self.agents.retain(|a| world.is_alive(a.unit));
        self.update_squad_target(dt, players, rng);
        if self.agents.is_empty() {
            return;
        }

        let objective = world.objective().filter(|o| o.zone_valid);
        let anchor = objective.map(|o| o.position).or_else(|| player_centroid(players));
        let Some(anchor) = anchor else {
            return;
        };
        let radius = objective.map_or(FALLBACK_HOLD_RADIUS, |o| o.radius);
        let positions: Vec<Option<Vec2>> = self.agents.iter().map(|a| world.position_of(a.unit)).collect();
        let field = Battlefield {
            anchor,
            radius,
            enemy_mass: Vec2::centroid(positions.iter().flatten().copied()),
        };
        let squad_target = self
            .squad_target
            .and_then(|id| players.iter().find(|p| p.id == id && p.alive))
            .copied();

        let think_dt = 1.0 / self.tuning.think_rate_hz.max(f32::EPSILON);
        for (agent, position) in self.agents.iter_mut().zip(positions) {
            agent.think_timer -= dt;
            if agent.think_timer > 0.0 {
                continue;
            }
            agent.think_timer += think_dt;
            let Some(position) = position else {
                continue;
            };
            let direction = agent.desired_direction(
                position,
                &*world,
                &field,
                players,
                squad_target.as_ref(),
                &self.tuning,
                rng,
            );
            agent.integrate(direction, think_dt, &self.tuning);
            world.set_desired_velocity(agent.unit, agent.velocity);
        }
    }

    fn update_squad_target<R: Rng + ?Sized>(&mut self, dt: f32, players: &[PlayerView], rng: &mut R) {
        self.squad_timer -= dt;
        let target_alive = self
            .squad_target
            .is_some_and(|id| alive_players(players).any(|p| p.id == id));
        if target_alive && self.squad_timer > 0.0 {
            return;
        }
        self.squad_timer = self.tuning.squad_retarget_interval;
        let alive: Vec<&PlayerView> = alive_players(players).collect();
        self.squad_target = most_isolated_player(players)
            .or_else(|| weakest_player(players))
            .or_else(|| alive.choose(rng).map(|p| **p))
            .map(|p| p.id);
        tracing::debug!(target = ?self.squad_target, "Squad target reselected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> Battlefield {
        Battlefield {
            anchor: Vec2::ZERO,
            radius: 10.0,
            enemy_mass: Some(Vec2::new(-20.0, 0.0)),
        }
    }

    #[test]
    fn test_contest_closes_then_holds() {
        let f = field();
        let dir = contest(Vec2::new(30.0, 0.0), &f, false);
        assert!((dir.x + 1.0).abs() < 1e-5);
        assert_eq!(contest(Vec2::new(3.0, 0.0), &f, false), Vec2::ZERO);
    }

    #[test]
    fn test_wounded_contester_backs_to_edge() {
        let f = field();
        let dir = contest(Vec2::new(2.0, 0.0), &f, true);
        assert!(dir.x > 0.99);
        assert_eq!(contest(Vec2::new(10.0, 0.0), &f, true), Vec2::ZERO);
    }

    #[test]
    fn test_flank_point_is_opposite_enemy_mass() {
        use rand::SeedableRng;
        let mut tuning = SteeringTuning::default();
        tuning.flank_jitter_degrees = 0.0;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        let p = flank_point(&field(), &tuning, &mut rng);
        assert!((p.x - tuning.flank_distance).abs() < 1e-4);
        assert!(p.y.abs() < 1e-4);
    }

    #[test]
    fn test_integrator_clamps_and_brakes() {
        let tuning = SteeringTuning::default();
        let mut agent = SteeringAgent::new(UnitId(1), Role::Contester, 1.0);
        for _ in 0..50 {
            agent.integrate(Vec2::new(1.0, 0.0), 0.2, &tuning);
        }
        assert!((agent.velocity().length() - tuning.max_speed).abs() < 1e-4);
        for _ in 0..50 {
            agent.integrate(Vec2::ZERO, 0.2, &tuning);
        }
        assert_eq!(agent.velocity(), Vec2::ZERO);
    }
}
