//! Commander nodes: elite units anchored to a command zone.
//!
//! A node wraps one spawned elite. While the unit lives the node keeps it
//! tethered to its anchor, pulses an aura over nearby enemy-side units and
//! enrages it when players refuse to engage. The first tick that finds the
//! unit dead or missing reports a [`CommanderDefeat`] and latches the node as
//! consumed, so a defeat is never reported twice.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::capabilities::{BuffCapabilities, BuffKind};
use crate::config::CommanderTuning;
use crate::host::{alive_players, PlayerView, UnitId, World};
use crate::math::Vec2;
use crate::operation::DoctrineProfile;
use crate::selector::weighted_pick;

/// Number of commander archetypes.
pub const COMMANDER_KIND_COUNT: usize = 4;

/// Commander archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommanderKind {
    /// Damage aura.
    Warlord,
    /// Armor aura.
    Bastion,
    /// Healing aura.
    Mender,
    /// Haste aura.
    Tactician,
}

/// What an aura pulse does to each unit in range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuraEffect {
    /// Timed buff.
    Buff(BuffKind),
    /// Heal a fraction of maximum health.
    Heal(f32),
}

impl CommanderKind {
    /// Every kind, in table order.
    pub const ALL: [CommanderKind; COMMANDER_KIND_COUNT] = [
        CommanderKind::Warlord,
        CommanderKind::Bastion,
        CommanderKind::Mender,
        CommanderKind::Tactician,
    ];

    /// Index into per-kind tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Warlord => 0,
            Self::Bastion => 1,
            Self::Mender => 2,
            Self::Tactician => 3,
        }
    }

    /// Bit in the snapshot's commander mask.
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << self.index()
    }

    /// Aura applied every pulse.
    #[must_use]
    pub fn aura(self, tuning: &CommanderTuning) -> AuraEffect {
        match self {
            Self::Warlord => AuraEffect::Buff(BuffKind::Damage),
            Self::Bastion => AuraEffect::Buff(BuffKind::Armor),
            Self::Mender => AuraEffect::Heal(tuning.mender_heal_fraction),
            Self::Tactician => AuraEffect::Buff(BuffKind::Haste),
        }
    }

    /// Doctrine a pivot swings toward when this kind falls.
    #[must_use]
    pub const fn pivot_doctrine(self) -> DoctrineProfile {
        match self {
            Self::Warlord => DoctrineProfile::Blitz,
            Self::Bastion => DoctrineProfile::SiegeLine,
            Self::Mender => DoctrineProfile::HunterKiller,
            Self::Tactician => DoctrineProfile::Encirclement,
        }
    }

    /// Base currency reward before scaling.
    #[must_use]
    pub fn base_reward(self, tuning: &CommanderTuning) -> f32 {
        tuning.base_reward[self.index()]
    }

    /// Pick a kind, doubling the weight of the one the doctrine leans toward.
    pub fn pick<R: Rng + ?Sized>(doctrine: DoctrineProfile, rng: &mut R) -> Self {
        let weights: Vec<(CommanderKind, f32)> = Self::ALL
            .iter()
            .map(|k| (*k, if k.pivot_doctrine() == doctrine { 2.0 } else { 1.0 }))
            .collect();
        weighted_pick(&weights, rng).unwrap_or(Self::Warlord)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Warlord => "warlord",
            Self::Bastion => "bastion",
            Self::Mender => "mender",
            Self::Tactician => "tactician",
        }
    }
}

/// Reported once when a node's unit is gone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommanderDefeat {
    /// The wrapped unit.
    pub unit: UnitId,
    /// Its archetype.
    pub kind: CommanderKind,
    /// Where it was anchored.
    pub anchor: Vec2,
}

/// A persistent elite anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct CommanderNode {
    unit: UnitId,
    kind: CommanderKind,
    anchor: Vec2,
    effect_radius: f32,
    tether_distance: f32,
    consumed: bool,
    aura_timer: f32,
    idle_timer: f32,
}

impl CommanderNode {
    /// Wrap a freshly spawned elite.
    #[must_use]
    pub fn new(unit: UnitId, kind: CommanderKind, anchor: Vec2, tuning: &CommanderTuning) -> Self {
        Self {
            unit,
            kind,
            anchor,
            effect_radius: tuning.effect_radius,
            tether_distance: tuning.tether_distance,
            consumed: false,
            aura_timer: tuning.aura_interval,
            idle_timer: 0.0,
        }
    }

    /// Wrapped unit.
    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Archetype.
    #[must_use]
    pub fn kind(&self) -> CommanderKind {
        self.kind
    }

    /// Command zone position.
    #[must_use]
    pub fn anchor(&self) -> Vec2 {
        self.anchor
    }

    /// Aura radius.
    #[must_use]
    pub fn effect_radius(&self) -> f32 {
        self.effect_radius
    }

    /// Soft tether distance.
    #[must_use]
    pub fn tether_distance(&self) -> f32 {
        self.tether_distance
    }

    /// Whether the defeat has been reported.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Seconds since a player last came within anti-kite range.
    #[must_use]
    pub fn idle_timer(&self) -> f32 {
        self.idle_timer
    }

    /// Advance one tick. Returns the defeat the first time the unit is gone.
    pub fn tick<W: World + ?Sized>(
        &mut self,
        dt: f32,
        world: &mut W,
        players: &[PlayerView],
        tuning: &CommanderTuning,
        capabilities: &BuffCapabilities,
    ) -> Option<CommanderDefeat> {
        if self.consumed {
            return None;
        }
        let position = if world.is_alive(self.unit) {
            world.position_of(self.unit)
        } else {
            None
        };
        let Some(position) = position else {
            self.consumed = true;
            return Some(CommanderDefeat {
                unit: self.unit,
                kind: self.kind,
                anchor: self.anchor,
            });
        };

        self.apply_tether(position, world, tuning);
        self.pulse_aura(dt, position, world, tuning, capabilities);
        self.check_anti_kite(dt, position, world, players, tuning, capabilities);
        None
    }

    fn apply_tether<W: World + ?Sized>(&self, position: Vec2, world: &mut W, tuning: &CommanderTuning) {
        let distance = position.distance(self.anchor);
        if distance > self.tether_distance * tuning.hard_tether_factor {
            tracing::debug!(unit = self.unit.0, distance, "Commander hard-tethered home");
            world.teleport(self.unit, self.anchor);
            world.set_desired_velocity(self.unit, Vec2::ZERO);
        } else if distance > self.tether_distance {
            let pull = (self.anchor - position).normalize().scale(tuning.tether_pull_speed);
            world.set_desired_velocity(self.unit, pull);
        }
    }

    fn pulse_aura<W: World + ?Sized>(
        &mut self,
        dt: f32,
        position: Vec2,
        world: &mut W,
        tuning: &CommanderTuning,
        capabilities: &BuffCapabilities,
    ) {
        self.aura_timer -= dt;
        if self.aura_timer > 0.0 {
            return;
        }
        self.aura_timer += tuning.aura_interval.max(dt);
        let effect = self.kind.aura(tuning);
        for unit in world.enemies_within(position, self.effect_radius) {
            match effect {
                AuraEffect::Buff(kind) => {
                    if let Some(applied) = capabilities.get(kind) {
                        world.apply_timed_buff(unit, applied, tuning.aura_duration);
                    }
                }
                AuraEffect::Heal(fraction) => world.heal_fraction(unit, fraction),
            }
        }
    }

    fn check_anti_kite<W: World + ?Sized>(
        &mut self,
        dt: f32,
        position: Vec2,
        world: &mut W,
        players: &[PlayerView],
        tuning: &CommanderTuning,
        capabilities: &BuffCapabilities,
    ) {
        let radius_sq = tuning.anti_kite_radius * tuning.anti_kite_radius;
        let engaged = alive_players(players).any(|p| p.position.distance_squared(position) <= radius_sq);
        if engaged {
            self.idle_timer = 0.0;
            return;
        }
        self.idle_timer += dt;
        if self.idle_timer >= tuning.anti_kite_seconds {
            if let Some(kind) = capabilities.get(BuffKind::Enrage) {
                world.apply_timed_buff(self.unit, kind, tuning.anti_kite_duration);
            }
            tracing::debug!(unit = self.unit.0, kind = self.kind.name(), "Commander enraged by kiting");
            self.idle_timer = 0.0;
        }
    }
}

/// Outcome rolled when a commander falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommanderResponse {
    /// Immediate micro-wave at the fallen anchor.
    RetaliationWave,
    /// Swing the doctrine toward the kind's preferred profile.
    DoctrinePivot,
    /// Breach-style heavy deployment.
    HeavyDeployment,
    /// Spend banked credit in one capped burst.
    CreditDump,
}

impl CommanderResponse {
    /// Every response, equally likely.
    pub const ALL: [CommanderResponse; 4] = [
        CommanderResponse::RetaliationWave,
        CommanderResponse::DoctrinePivot,
        CommanderResponse::HeavyDeployment,
        CommanderResponse::CreditDump,
    ];

    /// Uniform roll.
    pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RetaliationWave => "retaliation_wave",
            Self::DoctrinePivot => "doctrine_pivot",
            Self::HeavyDeployment => "heavy_deployment",
            Self::CreditDump => "credit_dump",
        }
    }
}

/// Commanders to field for a stage.
#[must_use]
pub fn commander_quota(stage_index: u32, alive_players: u32, bonus: u32, tuning: &CommanderTuning) -> u32 {
    let by_stage = stage_index / tuning.stages_per_extra.max(1);
    let by_players = alive_players.saturating_sub(1) / tuning.players_per_extra.max(1);
    (tuning.base_quota + by_stage + by_players + bonus).min(tuning.max_active)
}

/// Currency granted to every player for a defeat.
#[must_use]
pub fn commander_reward(
    kind: CommanderKind,
    stage_index: u32,
    difficulty: f32,
    player_count: u32,
    tuning: &CommanderTuning,
) -> u32 {
    let stage_scale = 1.0 + stage_index as f32 * tuning.reward_stage_scale;
    let player_scale = 1.0 + player_count.saturating_sub(1) as f32 * tuning.reward_player_scale;
    let reward = kind.base_reward(tuning) * stage_scale * difficulty.max(0.0) * player_scale;
    if reward.is_finite() {
        reward.round().max(0.0) as u32
    } else {
        0
    }
}

/// One reward container, sometimes two.
pub fn reward_container_count<R: Rng + ?Sized>(tuning: &CommanderTuning, rng: &mut R) -> u32 {
    1 + u32::from(rng.gen::<f32>() < tuning.second_container_chance)
}

/// Bitmask of the kinds among live nodes.
#[must_use]
pub fn kind_mask<'a>(nodes: impl IntoIterator<Item = &'a CommanderNode>) -> u8 {
    nodes
        .into_iter()
        .filter(|n| !n.is_consumed())
        .fold(0, |mask, n| mask | n.kind().bit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_quota_grows_and_caps() {
        let tuning = CommanderTuning::default();
        assert_eq!(commander_quota(0, 1, 0, &tuning), 1);
        assert_eq!(commander_quota(3, 1, 0, &tuning), 2);
        assert_eq!(commander_quota(3, 3, 0, &tuning), 3);
        assert_eq!(commander_quota(3, 3, 1, &tuning), 4);
        assert_eq!(commander_quota(30, 8, 1, &tuning), tuning.max_active);
    }

    #[test]
    fn test_reward_scaling() {
        let tuning = CommanderTuning::default();
        // 40 * (1 + 2 * 0.25) * 1.0 * (1 + 1 * 0.15) = 69
        assert_eq!(commander_reward(CommanderKind::Warlord, 2, 1.0, 2, &tuning), 69);
        assert_eq!(commander_reward(CommanderKind::Warlord, 0, 0.0, 4, &tuning), 0);
    }

    #[test]
    fn test_mask_bits() {
        let tuning = CommanderTuning::default();
        let a = CommanderNode::new(UnitId(1), CommanderKind::Bastion, Vec2::ZERO, &tuning);
        let mut b = CommanderNode::new(UnitId(2), CommanderKind::Tactician, Vec2::ZERO, &tuning);
        assert_eq!(kind_mask([&a, &b]), 0b1010);
        b.consumed = true;
        assert_eq!(kind_mask([&a, &b]), 0b0010);
    }

    #[test]
    fn test_response_roll_covers_all() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut seen = [false; 4];
        for _ in 0..200 {
            let r = CommanderResponse::roll(&mut rng);
            let i = CommanderResponse::ALL.iter().position(|x| *x == r).unwrap();
            seen[i] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_container_count_bounds() {
        let tuning = CommanderTuning::default();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        for _ in 0..100 {
            let n = reward_container_count(&tuning, &mut rng);
            assert!((1..=2).contains(&n));
        }
    }
}
