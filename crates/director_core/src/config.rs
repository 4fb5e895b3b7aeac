//! Director tuning.
//!
//! Every timer range, tier table and threshold the director uses lives here.
//! The defaults are the shipped tuning; a RON file can override any subset
//! because every struct is `#[serde(default)]`.
//!
//! # Example RON
//!
//! ```ron
//! DirectorConfig(
//!     siege: (escalation: 0.5),
//!     cadence: (breather: (min: 12.0, max: 18.0)),
//! )
//! ```

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DirectorError, Result};

/// Number of siege tiers.
pub const SIEGE_TIERS: usize = 4;

/// Inclusive range of seconds (or any scalar) sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SecondsRange {
    /// Lower bound.
    pub min: f32,
    /// Upper bound.
    pub max: f32,
}

impl SecondsRange {
    /// Create a range.
    #[must_use]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Uniform sample; degenerate ranges return `min`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.max <= self.min {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }

    fn check(&self, name: &str, issues: &mut Vec<String>) {
        if !(self.min.is_finite() && self.max.is_finite()) {
            issues.push(format!("{name}: bounds must be finite"));
        } else if self.min < 0.0 {
            issues.push(format!("{name}: min must be >= 0 (got {})", self.min));
        } else if self.min > self.max {
            issues.push(format!("{name}: min {} exceeds max {}", self.min, self.max));
        }
    }
}

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    /// Lower bound.
    pub min: u32,
    /// Upper bound.
    pub max: u32,
}

impl CountRange {
    /// Create a range.
    #[must_use]
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Uniform sample; degenerate ranges return `min`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        if self.max <= self.min {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

/// Complete director configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// Simulation ticks per second the host runs the director at.
    pub tick_rate: u32,
    /// Seconds between pushed snapshots.
    pub snapshot_interval: f32,
    /// Phase timers and pulse schedule.
    pub cadence: CadenceTuning,
    /// Siege tier tables.
    pub siege: SiegeTuning,
    /// Breach trigger and pacing.
    pub breach: BreachTuning,
    /// Weighted selection bounds and penalties.
    pub selector: SelectorTuning,
    /// Run-level learning rates and normalisers.
    pub adaptation: AdaptationTuning,
    /// Mercy and lone-wolf tuning.
    pub fairness: FairnessTuning,
    /// Commander node tuning.
    pub commander: CommanderTuning,
    /// Role steering tuning.
    pub steering: SteeringTuning,
    /// Spawn layer tuning.
    pub spawn: SpawnTuning,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            snapshot_interval: 1.0,
            cadence: CadenceTuning::default(),
            siege: SiegeTuning::default(),
            breach: BreachTuning::default(),
            selector: SelectorTuning::default(),
            adaptation: AdaptationTuning::default(),
            fairness: FairnessTuning::default(),
            commander: CommanderTuning::default(),
            steering: SteeringTuning::default(),
            spawn: SpawnTuning::default(),
        }
    }
}

impl DirectorConfig {
    /// Load a configuration from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| DirectorError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&contents)
    }

    /// Parse a configuration from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: DirectorConfig = ron::from_str(ron)?;
        Ok(config)
    }

    /// Seconds per tick at the configured tick rate.
    #[must_use]
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Check every range, bound and probability, reporting all issues at once.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        if self.tick_rate == 0 {
            issues.push("tick_rate must be > 0".to_string());
        }
        if !(self.snapshot_interval > 0.0) {
            issues.push("snapshot_interval must be > 0".to_string());
        }

        let c = &self.cadence;
        c.breather.check("cadence.breather", &mut issues);
        c.false_lull.check("cadence.false_lull", &mut issues);
        c.assault.check("cadence.assault", &mut issues);
        c.assault_pulse.check("cadence.assault_pulse", &mut issues);
        c.post_boss_respite.check("cadence.post_boss_respite", &mut issues);
        c.post_boss_wave.check("cadence.post_boss_wave", &mut issues);
        if !(c.recon_pulse_interval > 0.0) {
            issues.push("cadence.recon_pulse_interval must be > 0".to_string());
        }
        if !(c.pulse_floor > 0.0) {
            issues.push("cadence.pulse_floor must be > 0".to_string());
        }
        check_probability("cadence.rotation_advance_chance", c.rotation_advance_chance, &mut issues);
        check_probability("cadence.reactive_pivot_chance", c.reactive_pivot_chance, &mut issues);

        let s = &self.siege;
        if !(0.0..=1.0).contains(&s.escalation) {
            issues.push(format!("siege.escalation must be in [0, 1] (got {})", s.escalation));
        }
        if s.breather_scale.iter().chain(&s.pulse_interval_scale).any(|v| *v <= 0.0) {
            issues.push("siege scale tables must be > 0".to_string());
        }
        for (name, table) in [
            ("siege.breather_scale", &s.breather_scale),
            ("siege.pulse_interval_scale", &s.pulse_interval_scale),
        ] {
            if table.windows(2).any(|w| w[1] > w[0]) {
                issues.push(format!("{name} must not increase with tier"));
            }
        }
        if s.heavy_chance.windows(2).any(|w| w[1] < w[0]) {
            issues.push("siege.heavy_chance must not decrease with tier".to_string());
        }
        for chance in s.heavy_chance {
            check_probability("siege.heavy_chance", chance, &mut issues);
        }

        let b = &self.breach;
        b.duration.check("breach.duration", &mut issues);
        b.pulse.check("breach.pulse", &mut issues);
        b.cooldown.check("breach.cooldown", &mut issues);
        if usize::from(b.min_tier) >= SIEGE_TIERS {
            issues.push(format!("breach.min_tier must be < {SIEGE_TIERS}"));
        }

        let sel = &self.selector;
        if !(sel.weight_min > 0.0 && sel.weight_min <= sel.weight_max) {
            issues.push(format!(
                "selector weight bounds must satisfy 0 < min <= max (got {}..{})",
                sel.weight_min, sel.weight_max
            ));
        }
        check_probability("selector.repeat_penalty", sel.repeat_penalty, &mut issues);
        check_probability("selector.streak_penalty", sel.streak_penalty, &mut issues);

        let a = &self.adaptation;
        for (name, sig) in [
            ("damage", a.damage),
            ("contest", a.contest),
            ("solo", a.solo),
            ("breach", a.breach),
            ("role", a.role),
        ] {
            check_probability(&format!("adaptation.{name}.decay"), sig.decay, &mut issues);
            check_probability(&format!("adaptation.{name}.blend"), sig.blend, &mut issues);
        }

        let f = &self.fairness;
        f.mercy_duration.check("fairness.mercy_duration", &mut issues);
        if !(f.mercy_duration.min > 0.0) {
            issues.push("fairness.mercy_duration.min must be > 0".to_string());
        }
        f.mercy_cooldown_extra.check("fairness.mercy_cooldown_extra", &mut issues);
        if f.mercy_cooldown_extra.min < 2.0 {
            issues.push("fairness.mercy_cooldown_extra.min must be >= 2".to_string());
        }

        let cm = &self.commander;
        if cm.hard_tether_factor < 1.0 {
            issues.push("commander.hard_tether_factor must be >= 1".to_string());
        }
        if !(cm.aura_interval > 0.0) {
            issues.push("commander.aura_interval must be > 0".to_string());
        }
        check_probability("commander.second_container_chance", cm.second_container_chance, &mut issues);

        let st = &self.steering;
        if !(st.think_rate_hz > 0.0) {
            issues.push("steering.think_rate_hz must be > 0".to_string());
        }
        st.artillery_band.check("steering.artillery_band", &mut issues);

        let sp = &self.spawn;
        sp.spawn_ring.check("spawn.spawn_ring", &mut issues);
        if sp.credit_cap < 0.0 || sp.credit_per_second < 0.0 {
            issues.push("spawn credit values must be >= 0".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(DirectorError::InvalidConfig(issues))
        }
    }
}

fn check_probability(name: &str, value: f32, issues: &mut Vec<String>) {
    if !(0.0..=1.0).contains(&value) {
        issues.push(format!("{name} must be in [0, 1] (got {value})"));
    }
}

/// Phase timers and the assault pulse schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceTuning {
    /// Seconds between recon pulses before the charge event.
    pub recon_pulse_interval: f32,
    /// Base breather duration.
    pub breather: SecondsRange,
    /// Shortest breather after modifiers.
    pub breather_floor: f32,
    /// Forced first breather under the false-lull anomaly.
    pub false_lull: SecondsRange,
    /// Base assault duration.
    pub assault: SecondsRange,
    /// Shortest assault after modifiers.
    pub assault_floor: f32,
    /// Base interval between assault pulses.
    pub assault_pulse: SecondsRange,
    /// Shortest pulse interval after modifiers.
    pub pulse_floor: f32,
    /// How long pulse two keeps Contester dominant before rotating.
    pub contester_hold: f32,
    /// Chance per pulse (from the fourth on) to advance the role rotation.
    pub rotation_advance_chance: f32,
    /// Pause between post-boss waves.
    pub post_boss_respite: SecondsRange,
    /// Team health above which respites shorten.
    pub healthy_team_threshold: f32,
    /// Respite multiplier for a healthy team.
    pub healthy_respite_scale: f32,
    /// Length of a post-boss wave.
    pub post_boss_wave: SecondsRange,
    /// Pulse interval multiplier during post-boss waves.
    pub post_boss_pulse_scale: f32,
    /// Pulse interval multiplier while mercy is active.
    pub mercy_pulse_scale: f32,
    /// Seconds between charge-progress samples for reactive escalation.
    pub reactive_sample_window: f32,
    /// Charge gain per window that counts as "too easy".
    pub reactive_charge_delta: f32,
    /// Team health required for a fast charge to trigger escalation.
    pub reactive_min_team_health: f32,
    /// Seconds the reactive escalation flag stays raised.
    pub reactive_duration: f32,
    /// Chance that raising reactive escalation pivots the doctrine.
    pub reactive_pivot_chance: f32,
    /// Per-second easing rate of intensity toward its target.
    pub intensity_response: f32,
}

impl Default for CadenceTuning {
    fn default() -> Self {
        Self {
            recon_pulse_interval: 14.0,
            breather: SecondsRange::new(10.0, 20.0),
            breather_floor: 4.0,
            false_lull: SecondsRange::new(30.0, 36.0),
            assault: SecondsRange::new(25.0, 45.0),
            assault_floor: 10.0,
            assault_pulse: SecondsRange::new(5.0, 7.5),
            pulse_floor: 2.0,
            contester_hold: 1.5,
            rotation_advance_chance: 0.35,
            post_boss_respite: SecondsRange::new(3.5, 7.0),
            healthy_team_threshold: 0.7,
            healthy_respite_scale: 0.6,
            post_boss_wave: SecondsRange::new(8.0, 16.0),
            post_boss_pulse_scale: 0.5,
            mercy_pulse_scale: 1.5,
            reactive_sample_window: 5.0,
            reactive_charge_delta: 0.12,
            reactive_min_team_health: 0.75,
            reactive_duration: 12.0,
            reactive_pivot_chance: 0.3,
            intensity_response: 0.5,
        }
    }
}

/// Per-tier tables, blended against tier 0 by `escalation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiegeTuning {
    /// Breather duration multiplier per tier.
    pub breather_scale: [f32; SIEGE_TIERS],
    /// Assault duration multiplier per tier.
    pub assault_scale: [f32; SIEGE_TIERS],
    /// Pulse interval multiplier per tier.
    pub pulse_interval_scale: [f32; SIEGE_TIERS],
    /// Extra units per batch per tier.
    pub count_bonus: [f32; SIEGE_TIERS],
    /// Chance that a unit is drawn from the heavy pool, per tier.
    pub heavy_chance: [f32; SIEGE_TIERS],
    /// 1.0 applies the full tier effect, 0.5 half of it, 0.0 none.
    pub escalation: f32,
}

impl Default for SiegeTuning {
    fn default() -> Self {
        Self {
            breather_scale: [1.0, 0.9, 0.78, 0.62],
            assault_scale: [1.0, 1.05, 1.12, 1.2],
            pulse_interval_scale: [1.0, 0.92, 0.82, 0.7],
            count_bonus: [0.0, 1.0, 1.0, 2.0],
            heavy_chance: [0.04, 0.1, 0.18, 0.28],
            escalation: 1.0,
        }
    }
}

impl SiegeTuning {
    /// Siege tier for a charge fraction: quarters 0..=3.
    #[must_use]
    pub fn tier_for(charge_fraction: f32) -> u8 {
        let clamped = crate::math::clamp01(charge_fraction);
        ((clamped * SIEGE_TIERS as f32).floor() as usize).min(SIEGE_TIERS - 1) as u8
    }

    fn blend(&self, table: &[f32; SIEGE_TIERS], tier: u8) -> f32 {
        let t = usize::from(tier).min(SIEGE_TIERS - 1);
        crate::math::lerp(table[0], table[t], self.escalation)
    }

    /// Breather duration multiplier.
    #[must_use]
    pub fn breather_multiplier(&self, tier: u8) -> f32 {
        self.blend(&self.breather_scale, tier)
    }

    /// Assault duration multiplier.
    #[must_use]
    pub fn assault_multiplier(&self, tier: u8) -> f32 {
        self.blend(&self.assault_scale, tier)
    }

    /// Pulse interval multiplier.
    #[must_use]
    pub fn pulse_multiplier(&self, tier: u8) -> f32 {
        self.blend(&self.pulse_interval_scale, tier)
    }

    /// Extra units per batch.
    #[must_use]
    pub fn count_bonus(&self, tier: u8) -> u32 {
        self.blend(&self.count_bonus, tier).round().max(0.0) as u32
    }

    /// Heavy unit chance.
    #[must_use]
    pub fn heavy_chance(&self, tier: u8) -> f32 {
        crate::math::clamp01(self.blend(&self.heavy_chance, tier))
    }
}

/// Breach trigger and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreachTuning {
    /// Lowest siege tier at which a breach can trigger.
    pub min_tier: u8,
    /// Base trigger rate per second.
    pub base_rate: f32,
    /// Additional rate multiplier per tier (added to 1).
    pub tier_rate_bonus: [f32; SIEGE_TIERS],
    /// Rate bonus at full lone-wolf pressure (added to 1).
    pub lone_wolf_rate_bonus: f32,
    /// Rate multiplier while reactive escalation is raised.
    pub reactive_rate_mult: f32,
    /// Breach duration.
    pub duration: SecondsRange,
    /// Seconds between breach deployments.
    pub pulse: SecondsRange,
    /// Lockout after a breach ends.
    pub cooldown: SecondsRange,
    /// Heavy units per deployment.
    pub heavy_per_pulse: u32,
    /// Assault units per deployment.
    pub assault_per_pulse: u32,
}

impl Default for BreachTuning {
    fn default() -> Self {
        Self {
            min_tier: 2,
            base_rate: 0.012,
            tier_rate_bonus: [0.0, 0.0, 0.5, 1.2],
            lone_wolf_rate_bonus: 1.5,
            reactive_rate_mult: 2.0,
            duration: SecondsRange::new(12.0, 18.0),
            pulse: SecondsRange::new(3.5, 5.5),
            cooldown: SecondsRange::new(35.0, 55.0),
            heavy_per_pulse: 1,
            assault_per_pulse: 2,
        }
    }
}

/// Weighted selection bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorTuning {
    /// Smallest weight a candidate can carry.
    pub weight_min: f32,
    /// Largest weight a candidate can carry.
    pub weight_max: f32,
    /// Doctrine weight multiplier after one repeat.
    pub repeat_penalty: f32,
    /// Doctrine weight multiplier after two or more consecutive repeats.
    pub streak_penalty: f32,
}

impl Default for SelectorTuning {
    fn default() -> Self {
        Self {
            weight_min: 0.35,
            weight_max: 3.0,
            repeat_penalty: 0.62,
            streak_penalty: 0.4,
        }
    }
}

/// Decay and blend factor for one learned signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalTuning {
    /// Subtracted from the old value before blending.
    pub decay: f32,
    /// Weight of the incoming sample.
    pub blend: f32,
}

/// Run-level learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationTuning {
    /// Damage-pressure signal.
    pub damage: SignalTuning,
    /// Contest-pressure signal.
    pub contest: SignalTuning,
    /// Solo-play (lone-wolf) signal.
    pub solo: SignalTuning,
    /// Breach-frequency signal.
    pub breach: SignalTuning,
    /// Per-role threat signals.
    pub role: SignalTuning,
    /// Damage per second (at difficulty 1) that saturates the damage sample.
    pub damage_per_second: f32,
    /// Fraction of the stage spent contested that saturates the contest sample.
    pub contest_fraction: f32,
    /// Fraction of the stage under full lone-wolf pressure that saturates.
    pub lone_wolf_fraction: f32,
    /// Breaches per minute that saturate the breach sample.
    pub breaches_per_minute: f32,
    /// Stage durations shorter than this are normalised as if this long.
    pub min_stage_seconds: f32,
    /// Role contribution per unit spawned.
    pub role_spawn_weight: f32,
    /// Role contribution per point of damage dealt to players.
    pub role_damage_weight: f32,
}

impl Default for AdaptationTuning {
    fn default() -> Self {
        Self {
            damage: SignalTuning { decay: 0.07, blend: 0.4 },
            contest: SignalTuning { decay: 0.06, blend: 0.35 },
            solo: SignalTuning { decay: 0.08, blend: 0.38 },
            breach: SignalTuning { decay: 0.09, blend: 0.42 },
            role: SignalTuning { decay: 0.07, blend: 0.38 },
            damage_per_second: 4.0,
            contest_fraction: 0.5,
            lone_wolf_fraction: 0.5,
            breaches_per_minute: 0.6,
            min_stage_seconds: 30.0,
            role_spawn_weight: 1.0,
            role_damage_weight: 0.05,
        }
    }
}

/// Mercy windows and lone-wolf smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessTuning {
    /// Mercy window length.
    pub mercy_duration: SecondsRange,
    /// Cooldown beyond the mercy window before mercy can trigger again.
    pub mercy_cooldown_extra: SecondsRange,
    /// Time constant of the lone-wolf smoothing.
    pub lone_wolf_smoothing: f32,
    /// Players within `objective radius * scale` count as defenders.
    pub defend_radius_scale: f32,
    /// Units removed from each batch while mercy is active.
    pub mercy_count_penalty: u32,
}

impl Default for FairnessTuning {
    fn default() -> Self {
        Self {
            mercy_duration: SecondsRange::new(6.0, 10.0),
            mercy_cooldown_extra: SecondsRange::new(2.0, 8.0),
            lone_wolf_smoothing: 4.0,
            defend_radius_scale: 1.5,
            mercy_count_penalty: 1,
        }
    }
}

/// Commander nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommanderTuning {
    /// Aura radius.
    pub effect_radius: f32,
    /// Distance from the anchor before the inward nudge applies.
    pub tether_distance: f32,
    /// Multiple of tether distance past which the unit is teleported home.
    pub hard_tether_factor: f32,
    /// Speed of the inward nudge.
    pub tether_pull_speed: f32,
    /// Seconds between aura pulses.
    pub aura_interval: f32,
    /// Duration of aura buffs.
    pub aura_duration: f32,
    /// Heal fraction per Mender aura pulse.
    pub mender_heal_fraction: f32,
    /// Radius within which a player counts as engaging.
    pub anti_kite_radius: f32,
    /// Unengaged seconds before the anti-kite buff.
    pub anti_kite_seconds: f32,
    /// Anti-kite buff duration.
    pub anti_kite_duration: f32,
    /// Commanders at stage 0 with one player.
    pub base_quota: u32,
    /// Stages per additional commander.
    pub stages_per_extra: u32,
    /// Additional living players per additional commander.
    pub players_per_extra: u32,
    /// Hard cap on live commanders.
    pub max_active: u32,
    /// First stage index at which the charge event adds a commander.
    pub event_entry_min_stage: u32,
    /// Base currency reward per kind (Warlord, Bastion, Mender, Tactician).
    pub base_reward: [f32; 4],
    /// Reward growth per stage.
    pub reward_stage_scale: f32,
    /// Reward growth per additional player.
    pub reward_player_scale: f32,
    /// Chance of a second reward container.
    pub second_container_chance: f32,
    /// Scatter radius of reward containers.
    pub container_scatter: f32,
    /// Units in a retaliation micro-wave.
    pub retaliation_count: u32,
    /// Heavy units in a heavy deployment.
    pub heavy_deployment_count: u32,
    /// Upper bound on units in a credit dump.
    pub credit_dump_cap: u32,
}

impl Default for CommanderTuning {
    fn default() -> Self {
        Self {
            effect_radius: 18.0,
            tether_distance: 14.0,
            hard_tether_factor: 1.45,
            tether_pull_speed: 6.0,
            aura_interval: 0.9,
            aura_duration: 1.5,
            mender_heal_fraction: 0.04,
            anti_kite_radius: 38.0,
            anti_kite_seconds: 7.0,
            anti_kite_duration: 5.0,
            base_quota: 1,
            stages_per_extra: 3,
            players_per_extra: 2,
            max_active: 4,
            event_entry_min_stage: 2,
            base_reward: [40.0, 35.0, 30.0, 45.0],
            reward_stage_scale: 0.25,
            reward_player_scale: 0.15,
            second_container_chance: 0.35,
            container_scatter: 3.0,
            retaliation_count: 3,
            heavy_deployment_count: 3,
            credit_dump_cap: 8,
        }
    }
}

/// Role steering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringTuning {
    /// Steering decisions per second.
    pub think_rate_hz: f32,
    /// Top desired speed.
    pub max_speed: f32,
    /// Acceleration toward the desired direction.
    pub acceleration: f32,
    /// Distance band artillery keeps from the objective.
    pub artillery_band: SecondsRange,
    /// Distance of the flank point from the objective.
    pub flank_distance: f32,
    /// Random angular offset applied to flank points.
    pub flank_jitter_degrees: f32,
    /// Distance at which a flanker counts as having reached its flank point.
    pub flank_arrival: f32,
    /// Distance of an anchor's hold point from the objective.
    pub anchor_offset: f32,
    /// Drift beyond which an anchor walks back.
    pub anchor_drift: f32,
    /// Player health below which peelers commit.
    pub peeler_wound_threshold: f32,
    /// Own health below which contesters back off to the zone edge.
    pub contester_wounded: f32,
    /// Seconds between squad target reselection.
    pub squad_retarget_interval: f32,
    /// Strafe speed as a fraction of max speed.
    pub strafe_fraction: f32,
}

impl Default for SteeringTuning {
    fn default() -> Self {
        Self {
            think_rate_hz: 5.0,
            max_speed: 7.0,
            acceleration: 20.0,
            artillery_band: SecondsRange::new(18.0, 32.0),
            flank_distance: 16.0,
            flank_jitter_degrees: 35.0,
            flank_arrival: 4.0,
            anchor_offset: 6.0,
            anchor_drift: 3.5,
            peeler_wound_threshold: 0.65,
            contester_wounded: 0.35,
            squad_retarget_interval: 6.0,
            strafe_fraction: 0.45,
        }
    }
}

/// Spawn placement, batch sizes and credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnTuning {
    /// Distance band from the anchor at which units appear.
    pub spawn_ring: SecondsRange,
    /// Units per recon pulse.
    pub recon_count: CountRange,
    /// Units per assault pulse before bonuses.
    pub assault_count: CountRange,
    /// Units per post-boss wave pulse before bonuses.
    pub post_boss_count: CountRange,
    /// Additional living players per extra unit in a batch.
    pub players_per_extra: u32,
    /// Credit earned per second at phase scale 1.
    pub credit_per_second: f32,
    /// Maximum banked credit.
    pub credit_cap: f32,
    /// Credit at stage start.
    pub starting_credit: f32,
    /// Hard cap on tracked living enemies.
    pub max_alive_enemies: u32,
    /// Units farther than this from every player and the objective are culled in cooldown.
    pub straggler_radius: f32,
}

impl Default for SpawnTuning {
    fn default() -> Self {
        Self {
            spawn_ring: SecondsRange::new(20.0, 30.0),
            recon_count: CountRange::new(1, 2),
            assault_count: CountRange::new(2, 3),
            post_boss_count: CountRange::new(2, 4),
            players_per_extra: 2,
            credit_per_second: 1.5,
            credit_cap: 24.0,
            starting_credit: 6.0,
            max_alive_enemies: 40,
            straggler_radius: 90.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        DirectorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_siege_tier_buckets() {
        assert_eq!(SiegeTuning::tier_for(0.0), 0);
        assert_eq!(SiegeTuning::tier_for(0.24), 0);
        assert_eq!(SiegeTuning::tier_for(0.25), 1);
        assert_eq!(SiegeTuning::tier_for(0.5), 2);
        assert_eq!(SiegeTuning::tier_for(0.75), 3);
        assert_eq!(SiegeTuning::tier_for(1.0), 3);
        assert_eq!(SiegeTuning::tier_for(-3.0), 0);
    }

    #[test]
    fn test_escalation_blends_against_baseline() {
        let mut siege = SiegeTuning::default();
        assert!((siege.breather_multiplier(3) - 0.62).abs() < 1e-6);
        siege.escalation = 0.5;
        assert!((siege.breather_multiplier(3) - 0.81).abs() < 1e-6);
        siege.escalation = 0.0;
        assert!((siege.pulse_multiplier(3) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_ron_override() {
        let config = DirectorConfig::from_ron_str(
            "(siege: (escalation: 0.5), cadence: (breather: (min: 12.0, max: 18.0)))",
        )
        .unwrap();
        assert_eq!(config.siege.escalation, 0.5);
        assert_eq!(config.cadence.breather, SecondsRange::new(12.0, 18.0));
        assert_eq!(config.cadence.assault, CadenceTuning::default().assault);
    }

    #[test]
    fn test_validate_collects_all_issues() {
        let mut config = DirectorConfig::default();
        config.selector.weight_min = 0.0;
        config.cadence.breather = SecondsRange::new(20.0, 10.0);
        config.fairness.mercy_cooldown_extra = SecondsRange::new(1.0, 3.0);
        match config.validate() {
            Err(DirectorError::InvalidConfig(issues)) => assert_eq!(issues.len(), 3),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_empty_mercy_window() {
        let mut config = DirectorConfig::default();
        config.fairness.mercy_duration = SecondsRange::new(0.0, 0.0);
        match config.validate() {
            Err(DirectorError::InvalidConfig(issues)) => {
                assert_eq!(issues.len(), 1);
                assert!(issues[0].contains("fairness.mercy_duration"));
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_degenerate_range_sample() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
        assert_eq!(SecondsRange::new(3.0, 3.0).sample(&mut rng), 3.0);
        assert_eq!(CountRange::new(4, 2).sample(&mut rng), 4);
    }
}
