//! Spawn layer: turns batch requests into host spawn calls.
//!
//! A request names a batch kind, an anchor, a role and a size. The layer
//! resolves the anchor (falling back to the player centroid), scatters units
//! on a ring around it, picks templates from the injected pool and pays for
//! them out of the banked spawn credit. Every failure mode here is local:
//! empty pools are logged and skipped, refused spawns are ignored.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::capabilities::{BuffCapabilities, BuffKind};
use crate::config::SpawnTuning;
use crate::host::{
    most_isolated_player, player_centroid, PlayerView, PoolCategory, SpawnOptions, SpawnPoolProvider, Team,
    UnitId, UnitTemplate, World,
};
use crate::math::Vec2;
use crate::roles::Role;

/// Duration of buffs attached at spawn time; long enough to outlive any unit.
pub const SPAWN_BUFF_DURATION: f32 = 600.0;

/// Commanders appear within this distance of their command zone.
const COMMANDER_SCATTER: f32 = 2.0;

/// Why a batch was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchKind {
    /// Low-volume pulse before the charge event.
    ReconPulse,
    /// Assault pulse.
    AssaultPulse,
    /// Breach deployment.
    BreachDeployment,
    /// Forced pulse during a post-boss wave.
    PostBossWave,
    /// Commander-defeat retaliation micro-wave.
    CommanderRetaliation,
    /// Commander-defeat heavy deployment.
    HeavyDeployment,
    /// Commander-defeat burst that spends banked credit.
    CreditDump,
    /// Elite units wrapped by commander nodes.
    CommanderBatch,
}

impl BatchKind {
    /// Pool drawn from when the heavy roll fails.
    #[must_use]
    pub const fn primary_pool(self) -> PoolCategory {
        match self {
            Self::ReconPulse => PoolCategory::Recon,
            Self::HeavyDeployment => PoolCategory::Heavy,
            Self::CommanderBatch => PoolCategory::Commander,
            Self::AssaultPulse
            | Self::BreachDeployment
            | Self::PostBossWave
            | Self::CommanderRetaliation
            | Self::CreditDump => PoolCategory::Assault,
        }
    }

    /// Whether each unit is paid for out of spawn credit.
    #[must_use]
    pub const fn spends_credit(self) -> bool {
        matches!(self, Self::ReconPulse | Self::AssaultPulse | Self::PostBossWave | Self::CreditDump)
    }
}

/// Where a batch is centred.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpawnAnchor {
    /// The objective, if its zone is valid.
    Objective,
    /// The most isolated living player.
    IsolatedPlayer,
    /// A fixed point.
    Point(Vec2),
}

/// A batch to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Why this batch exists.
    pub kind: BatchKind,
    /// Where it is centred.
    pub anchor: SpawnAnchor,
    /// Role for every unit in the batch.
    pub role: Role,
    /// Units requested.
    pub count: u32,
    /// Chance per unit of drawing from the heavy pool.
    pub heavy_chance: f32,
}

impl SpawnRequest {
    /// Create a request with no heavy chance.
    #[must_use]
    pub fn new(kind: BatchKind, anchor: SpawnAnchor, role: Role, count: u32) -> Self {
        Self {
            kind,
            anchor,
            role,
            count,
            heavy_chance: 0.0,
        }
    }

    /// Set the heavy chance.
    #[must_use]
    pub fn with_heavy_chance(mut self, chance: f32) -> Self {
        self.heavy_chance = chance;
        self
    }
}

/// One unit the host accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnedUnit {
    /// Host handle.
    pub unit: UnitId,
    /// Role it was spawned with.
    pub role: Role,
    /// Position it was spawned at.
    pub position: Vec2,
    /// Whether it came from the commander pool.
    pub elite: bool,
}

/// Banked spawn credit.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpawnCredit {
    banked: f32,
}

impl SpawnCredit {
    /// Start with `amount` banked.
    #[must_use]
    pub fn new(amount: f32) -> Self {
        Self {
            banked: amount.max(0.0),
        }
    }

    /// Credit currently banked.
    #[must_use]
    pub fn banked(&self) -> f32 {
        self.banked
    }

    /// Earn credit for `dt` seconds at the given phase scale.
    pub fn accrue(&mut self, dt: f32, scale: f32, tuning: &SpawnTuning) {
        self.banked = (self.banked + tuning.credit_per_second * scale.max(0.0) * dt).min(tuning.credit_cap);
    }

    /// Whether `cost` is covered by the bank.
    #[must_use]
    pub fn can_afford(&self, cost: f32) -> bool {
        self.banked + f32::EPSILON >= cost.max(0.0)
    }

    /// Spend `cost` if it is available.
    pub fn try_spend(&mut self, cost: f32) -> bool {
        let cost = cost.max(0.0);
        if self.can_afford(cost) {
            self.banked = (self.banked - cost).max(0.0);
            true
        } else {
            false
        }
    }
}

/// Turns requests into spawn calls.
#[derive(Debug, Clone)]
pub struct SpawnLayer {
    tuning: SpawnTuning,
    credit: SpawnCredit,
}

impl SpawnLayer {
    /// Layer with the configured starting credit.
    #[must_use]
    pub fn new(tuning: SpawnTuning) -> Self {
        let credit = SpawnCredit::new(tuning.starting_credit);
        Self { tuning, credit }
    }

    /// Banked credit.
    #[must_use]
    pub fn credit(&self) -> SpawnCredit {
        self.credit
    }

    /// Tuning in use.
    #[must_use]
    pub fn tuning(&self) -> &SpawnTuning {
        &self.tuning
    }

    /// Earn credit for one tick.
    pub fn accrue(&mut self, dt: f32, scale: f32) {
        self.credit.accrue(dt, scale, &self.tuning);
    }

    /// Units a credit dump can afford right now.
    #[must_use]
    pub fn credit_dump_size(&self, cap: u32) -> u32 {
        (self.credit.banked().floor().max(0.0) as u32).min(cap)
    }

    /// Resolve an anchor to a point; `None` when there is nothing to anchor on.
    pub fn resolve_anchor<W: World + ?Sized>(
        &self,
        anchor: SpawnAnchor,
        world: &W,
        players: &[PlayerView],
    ) -> Option<Vec2> {
        let resolved = match anchor {
            SpawnAnchor::Objective => world.objective().filter(|o| o.zone_valid).map(|o| o.position),
            SpawnAnchor::IsolatedPlayer => most_isolated_player(players).map(|p| p.position),
            SpawnAnchor::Point(p) => p.is_finite().then_some(p),
        };
        resolved.or_else(|| player_centroid(players))
    }

    /// Execute one request.
    ///
    /// `alive_enemies` is the number of director-spawned units still alive;
    /// the batch is truncated at the configured cap.
    pub fn execute<P, W, R>(
        &mut self,
        request: &SpawnRequest,
        pool: &P,
        world: &mut W,
        players: &[PlayerView],
        alive_enemies: usize,
        buffs: &[BuffKind],
        capabilities: &BuffCapabilities,
        rng: &mut R,
    ) -> Vec<SpawnedUnit>
    where
        P: SpawnPoolProvider + ?Sized,
        W: World + ?Sized,
        R: Rng + ?Sized,
    {
        let mut spawned = Vec::new();
        if request.count == 0 {
            return spawned;
        }

        let primary = pool.pool(request.kind.primary_pool());
        if primary.is_empty() {
            tracing::warn!(kind = ?request.kind, pool = ?request.kind.primary_pool(), "Spawn pool empty, skipping batch");
            return spawned;
        }
        let Some(center) = self.resolve_anchor(request.anchor, world, players) else {
            tracing::warn!(kind = ?request.kind, "No spawn anchor available, skipping batch");
            return spawned;
        };
        let heavy = pool.pool(PoolCategory::Heavy);
        let elite = request.kind == BatchKind::CommanderBatch;
        let cap = self.tuning.max_alive_enemies as usize;

        for _ in 0..request.count {
            if alive_enemies + spawned.len() >= cap {
                tracing::debug!(kind = ?request.kind, cap, "Alive enemy cap reached");
                break;
            }
            let Some(template) = pick_template(primary, heavy, request.heavy_chance, rng) else {
                break;
            };
            let spends = request.kind.spends_credit();
            if spends && !self.credit.can_afford(template.cost) {
                tracing::debug!(kind = ?request.kind, banked = self.credit.banked(), "Out of spawn credit");
                break;
            }

            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let distance = if elite {
                rng.gen_range(0.0..=COMMANDER_SCATTER)
            } else {
                self.tuning.spawn_ring.sample(rng)
            };
            let position = center + Vec2::from_angle(angle).scale(distance);
            let to_center = center - position;
            let facing = if to_center.length() > f32::EPSILON {
                to_center.y.atan2(to_center.x)
            } else {
                angle
            };

            let options = SpawnOptions {
                role: request.role,
                elite,
            };
            let Some(unit) = world.spawn(template, position, facing, Team::Enemy, options) else {
                tracing::debug!(template = %template.id, "Host refused spawn");
                continue;
            };
            // Credit is only charged for units the host actually created.
            if spends {
                self.credit.try_spend(template.cost);
            }
            for kind in buffs.iter().filter_map(|b| capabilities.get(*b)) {
                world.apply_timed_buff(unit, kind, SPAWN_BUFF_DURATION);
            }
            spawned.push(SpawnedUnit {
                unit,
                role: request.role,
                position,
                elite,
            });
        }

        tracing::debug!(
            kind = ?request.kind,
            role = request.role.name(),
            requested = request.count,
            spawned = spawned.len(),
            "Batch executed"
        );
        spawned
    }
}

fn pick_template<'a, R: Rng + ?Sized>(
    primary: &'a [UnitTemplate],
    heavy: &'a [UnitTemplate],
    heavy_chance: f32,
    rng: &mut R,
) -> Option<&'a UnitTemplate> {
    if !heavy.is_empty() && heavy_chance > 0.0 && rng.gen::<f32>() < heavy_chance {
        heavy.choose(rng)
    } else {
        primary.choose(rng)
    }
}
