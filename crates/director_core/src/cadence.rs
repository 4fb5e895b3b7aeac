//! Cadence state machine.
//!
//! Decides every tick whether to hold, escalate or relax pressure, and emits
//! [`SpawnRequest`]s for the spawn layer. Exactly one [`CadencePhase`] is
//! active at a time; the phase is a plain enum field so two phases can never
//! be active together.
//!
//! ```text
//!   Recon ──charge begin──▶ Breather ◀──────────────┐
//!                              │  ▲                 │
//!                     timer    ▼  │ timer           │
//!                            Assault ──breach roll──▶ Breach
//!
//!   boss alive at charge begin: Breather is held until the boss dies, then
//!   PostBossRespite ⇄ PostBossWave until the event ends.
//!
//!   any ──charge end──▶ Cooldown
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::adaptation::RunAdaptationState;
use crate::config::{BreachTuning, CadenceTuning, CountRange, DirectorConfig, SiegeTuning, SpawnTuning, SIEGE_TIERS};
use crate::error::{DirectorError, Result};
use crate::host::{team_health, ObjectiveView, PlayerView};
use crate::operation::{CadenceModifiers, OperationRoll};
use crate::roles::Role;
use crate::selector::OperationSelector;
use crate::spawn::{BatchKind, SpawnAnchor, SpawnRequest};

/// Number of cadence phases.
pub const PHASE_COUNT: usize = 7;

/// Stage-level pacing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CadencePhase {
    /// Before the charge event; periodic recon pulses.
    #[default]
    Recon,
    /// Quiet window between assaults.
    Breather,
    /// Pulsed spawn pressure.
    Assault,
    /// Heavy deployments near the objective and the most isolated player.
    Breach,
    /// Pause between post-boss waves.
    PostBossRespite,
    /// Fast forced pulses after a boss kill.
    PostBossWave,
    /// The charge event is over.
    Cooldown,
}

impl CadencePhase {
    /// Every phase, in wire order.
    pub const ALL: [CadencePhase; PHASE_COUNT] = [
        CadencePhase::Recon,
        CadencePhase::Breather,
        CadencePhase::Assault,
        CadencePhase::Breach,
        CadencePhase::PostBossRespite,
        CadencePhase::PostBossWave,
        CadencePhase::Cooldown,
    ];

    /// Compact wire id.
    #[must_use]
    pub const fn wire_id(self) -> u8 {
        match self {
            Self::Recon => 0,
            Self::Breather => 1,
            Self::Assault => 2,
            Self::Breach => 3,
            Self::PostBossRespite => 4,
            Self::PostBossWave => 5,
            Self::Cooldown => 6,
        }
    }

    /// Inverse of [`Self::wire_id`].
    #[must_use]
    pub fn from_wire_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    /// Spawn-credit earn rate multiplier.
    #[must_use]
    pub const fn credit_scale(self) -> f32 {
        match self {
            Self::Recon => 0.4,
            Self::Breather => 0.6,
            Self::Assault | Self::Breach => 1.0,
            Self::PostBossRespite => 0.5,
            Self::PostBossWave => 1.2,
            Self::Cooldown => 0.05,
        }
    }

    /// Intensity the session eases toward.
    #[must_use]
    pub const fn intensity_target(self) -> f32 {
        match self {
            Self::Recon => 15.0,
            Self::Breather => 30.0,
            Self::Assault => 65.0,
            Self::Breach => 85.0,
            Self::PostBossRespite => 40.0,
            Self::PostBossWave => 80.0,
            Self::Cooldown => 5.0,
        }
    }

    /// Whether this phase belongs to a running charge event.
    #[must_use]
    pub const fn is_event_phase(self) -> bool {
        !matches!(self, Self::Recon | Self::Cooldown)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Recon => "recon",
            Self::Breather => "breather",
            Self::Assault => "assault",
            Self::Breach => "breach",
            Self::PostBossRespite => "post_boss_respite",
            Self::PostBossWave => "post_boss_wave",
            Self::Cooldown => "cooldown",
        }
    }
}

/// A phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    /// Phase left.
    pub from: CadencePhase,
    /// Phase entered.
    pub to: CadencePhase,
}

/// Everything the machine reads in one tick.
#[derive(Debug, Clone, Copy)]
pub struct CadenceContext<'a> {
    /// Fixed tick delta in seconds.
    pub dt: f32,
    /// Objective, if one exists.
    pub objective: Option<ObjectiveView>,
    /// Player views.
    pub players: &'a [PlayerView],
    /// Whether a boss-class unit is alive.
    pub boss_alive: bool,
    /// Whether a mercy window is open.
    pub mercy_active: bool,
    /// Smoothed lone-wolf pressure.
    pub lone_wolf_pressure: f32,
    /// Active operation.
    pub roll: &'a OperationRoll,
    /// Selector used for support-role picks.
    pub selector: &'a OperationSelector,
    /// Run-level learned signals.
    pub run: &'a RunAdaptationState,
}

impl CadenceContext<'_> {
    fn charge_fraction(&self) -> f32 {
        self.objective.map_or(0.0, |o| o.charge_fraction)
    }

    fn alive_players(&self) -> u32 {
        self.players.iter().filter(|p| p.alive).count() as u32
    }
}

/// What the machine decided this tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CadenceOutput {
    /// Batches to spawn, in order.
    pub requests: Vec<SpawnRequest>,
    /// Phase changes, in order.
    pub transitions: Vec<PhaseTransition>,
    /// A breach rolled this tick.
    pub breach_triggered: bool,
    /// Reactive escalation was raised this tick.
    pub reactive_raised: bool,
    /// Reactive escalation asks for a doctrine pivot.
    pub pivot_requested: bool,
    /// New charge-hold state for the host, when it changes.
    pub charge_hold: Option<bool>,
}

/// The stage-level pacing engine.
#[derive(Debug, Clone)]
pub struct CadenceMachine {
    cadence: CadenceTuning,
    siege: SiegeTuning,
    breach: BreachTuning,
    spawn: SpawnTuning,
    mercy_count_penalty: u32,
    phase: CadencePhase,
    phase_timer: f32,
    pulse_timer: f32,
    pulse_index: u32,
    rotation_index: usize,
    dominant_role: Role,
    pending_switch: Option<f32>,
    event_active: bool,
    first_breather: bool,
    boss_gate: bool,
    breach_cooldown: f32,
    tier: u8,
    reactive_timer: f32,
    reactive_sample_timer: f32,
    reactive_last_charge: f32,
}

impl CadenceMachine {
    /// Machine in Recon with the given tuning.
    #[must_use]
    pub fn new(config: &DirectorConfig) -> Self {
        Self {
            cadence: config.cadence.clone(),
            siege: config.siege.clone(),
            breach: config.breach.clone(),
            spawn: config.spawn.clone(),
            mercy_count_penalty: config.fairness.mercy_count_penalty,
            phase: CadencePhase::Recon,
            phase_timer: 0.0,
            pulse_timer: config.cadence.recon_pulse_interval,
            pulse_index: 0,
            rotation_index: 0,
            dominant_role: Role::None,
            pending_switch: None,
            event_active: false,
            first_breather: false,
            boss_gate: false,
            breach_cooldown: 0.0,
            tier: 0,
            reactive_timer: 0.0,
            reactive_sample_timer: config.cadence.reactive_sample_window,
            reactive_last_charge: 0.0,
        }
    }

    /// Active phase.
    #[must_use]
    pub fn phase(&self) -> CadencePhase {
        self.phase
    }

    /// Role currently driving assault pulses.
    #[must_use]
    pub fn dominant_role(&self) -> Role {
        self.dominant_role
    }

    /// Siege tier from the last tick.
    #[must_use]
    pub fn tier(&self) -> u8 {
        self.tier
    }

    /// Whether a charge event is running.
    #[must_use]
    pub fn event_active(&self) -> bool {
        self.event_active
    }

    /// Whether charge is held behind a living boss.
    #[must_use]
    pub fn boss_gate(&self) -> bool {
        self.boss_gate
    }

    /// Seconds left in the current timed phase.
    #[must_use]
    pub fn window_remaining(&self) -> f32 {
        match self.phase {
            CadencePhase::Recon | CadencePhase::Cooldown => 0.0,
            CadencePhase::Breather if self.boss_gate => 0.0,
            _ => self.phase_timer.max(0.0),
        }
    }

    /// Lockout before the next breach may roll.
    #[must_use]
    pub fn breach_cooldown(&self) -> f32 {
        self.breach_cooldown
    }

    /// Whether reactive escalation is raised.
    #[must_use]
    pub fn reactive_active(&self) -> bool {
        self.reactive_timer > 0.0
    }

    /// Pulses emitted in the current assault or wave.
    #[must_use]
    pub fn pulse_index(&self) -> u32 {
        self.pulse_index
    }

    /// Seconds until the next pulse.
    #[must_use]
    pub fn pulse_timer(&self) -> f32 {
        self.pulse_timer
    }

    /// Back to Recon, clearing every timer.
    pub fn reset(&mut self) {
        self.phase = CadencePhase::Recon;
        self.phase_timer = 0.0;
        self.pulse_timer = self.cadence.recon_pulse_interval;
        self.pulse_index = 0;
        self.rotation_index = 0;
        self.dominant_role = Role::None;
        self.pending_switch = None;
        self.event_active = false;
        self.first_breather = false;
        self.boss_gate = false;
        self.breach_cooldown = 0.0;
        self.tier = 0;
        self.reactive_timer = 0.0;
        self.reactive_sample_timer = self.cadence.reactive_sample_window;
        self.reactive_last_charge = 0.0;
    }

    /// Start the charge event. Only valid from Recon.
    pub fn begin_event<R: Rng + ?Sized>(
        &mut self,
        boss_alive: bool,
        modifiers: &CadenceModifiers,
        rng: &mut R,
    ) -> Option<CadenceOutput> {
        if self.phase != CadencePhase::Recon {
            return None;
        }
        let mut out = CadenceOutput::default();
        self.event_active = true;
        self.first_breather = true;
        self.breach_cooldown = 0.0;
        self.reactive_last_charge = 0.0;
        self.reactive_sample_timer = self.cadence.reactive_sample_window;
        if boss_alive {
            self.boss_gate = true;
            self.phase_timer = 0.0;
            out.charge_hold = Some(true);
            self.enter(CadencePhase::Breather, &mut out);
            tracing::info!("Charge event started behind a boss gate");
        } else {
            self.start_breather(modifiers, rng, &mut out);
            tracing::info!(breather = self.phase_timer, "Charge event started");
        }
        Some(out)
    }

    /// End the charge event. Valid from any event phase.
    pub fn end_event(&mut self) -> Option<CadenceOutput> {
        if !self.event_active {
            return None;
        }
        let mut out = CadenceOutput::default();
        if self.boss_gate {
            out.charge_hold = Some(false);
        }
        self.event_active = false;
        self.boss_gate = false;
        self.pending_switch = None;
        self.reactive_timer = 0.0;
        self.phase_timer = 0.0;
        self.enter(CadencePhase::Cooldown, &mut out);
        Some(out)
    }

    /// Apply a new operation mid-stage: restart the rotation and pull the next
    /// pulse in if the new modifiers are faster.
    pub fn on_operation_changed<R: Rng + ?Sized>(
        &mut self,
        roll: &OperationRoll,
        mercy_active: bool,
        rng: &mut R,
    ) {
        self.rotation_index = 0;
        if matches!(self.phase, CadencePhase::Assault) && self.pulse_index >= 3 {
            self.dominant_role = roll.doctrine().rotation().first().copied().unwrap_or(Role::Contester);
        }
        if matches!(self.phase, CadencePhase::Assault | CadencePhase::PostBossWave) {
            let interval = self.pulse_interval(&roll.modifiers(), mercy_active, rng);
            self.pulse_timer = self.pulse_timer.min(interval);
        }
    }

    /// Advance one tick.
    pub fn tick<R: Rng + ?Sized>(&mut self, ctx: &CadenceContext<'_>, rng: &mut R) -> CadenceOutput {
        let mut out = CadenceOutput::default();
        let dt = ctx.dt;
        let modifiers = ctx.roll.modifiers();

        self.tier = if self.event_active {
            SiegeTuning::tier_for(ctx.charge_fraction())
        } else {
            0
        };
        self.breach_cooldown = (self.breach_cooldown - dt).max(0.0);
        self.update_reactive(ctx, rng, &mut out);

        match self.phase {
            CadencePhase::Recon => {
                self.pulse_timer -= dt;
                if self.pulse_timer <= 0.0 {
                    self.pulse_timer += self.cadence.recon_pulse_interval;
                    let count = self.spawn.recon_count.sample(rng).max(1);
                    out.requests.push(SpawnRequest::new(
                        BatchKind::ReconPulse,
                        SpawnAnchor::Objective,
                        Role::Flanker,
                        count,
                    ));
                }
            }
            CadencePhase::Breather => {
                if self.boss_gate {
                    if !ctx.boss_alive {
                        self.boss_gate = false;
                        out.charge_hold = Some(false);
                        tracing::info!("Boss defeated, charge released");
                        self.start_respite(ctx, rng, &mut out);
                    }
                } else {
                    self.phase_timer -= dt;
                    if self.phase_timer <= 0.0 {
                        self.start_assault(&modifiers, ctx.mercy_active, rng, &mut out);
                    }
                }
            }
            CadencePhase::Assault => {
                self.phase_timer -= dt;
                if let Some(hold) = self.pending_switch.as_mut() {
                    *hold -= dt;
                    if *hold <= 0.0 {
                        self.pending_switch = None;
                        self.advance_rotation(ctx.roll);
                        let role = self.dominant_role;
                        out.requests.push(self.pulse_request(
                            BatchKind::AssaultPulse,
                            self.spawn.assault_count,
                            role,
                            ctx,
                            &modifiers,
                            rng,
                        ));
                    }
                }
                self.pulse_timer -= dt;
                if self.pulse_timer <= 0.0 {
                    self.pulse_timer += self.pulse_interval(&modifiers, ctx.mercy_active, rng);
                    self.assault_pulse(ctx, &modifiers, rng, &mut out);
                }
                if self.phase_timer <= 0.0 {
                    self.start_breather(&modifiers, rng, &mut out);
                }
            }
            CadencePhase::Breach => {
                self.phase_timer -= dt;
                self.pulse_timer -= dt;
                if self.pulse_timer <= 0.0 {
                    self.pulse_timer += self.breach.pulse.sample(rng).max(self.cadence.pulse_floor);
                    self.breach_pulse(ctx, &modifiers, &mut out);
                }
                if self.phase_timer <= 0.0 {
                    self.breach_cooldown = self.breach.cooldown.sample(rng);
                    self.start_breather(&modifiers, rng, &mut out);
                }
            }
            CadencePhase::PostBossRespite => {
                self.phase_timer -= dt;
                if self.phase_timer <= 0.0 {
                    self.start_wave(rng, &mut out);
                }
            }
            CadencePhase::PostBossWave => {
                self.phase_timer -= dt;
                self.pulse_timer -= dt;
                if self.pulse_timer <= 0.0 {
                    self.pulse_timer +=
                        self.pulse_interval(&modifiers, ctx.mercy_active, rng) * self.cadence.post_boss_pulse_scale;
                    self.pulse_index += 1;
                    let role = self.rotation_role(ctx.roll);
                    self.dominant_role = role;
                    out.requests.push(self.pulse_request(
                        BatchKind::PostBossWave,
                        self.spawn.post_boss_count,
                        role,
                        ctx,
                        &modifiers,
                        rng,
                    ));
                }
                if self.phase_timer <= 0.0 {
                    self.start_respite(ctx, rng, &mut out);
                }
            }
            CadencePhase::Cooldown => {}
        }

        self.roll_breach(ctx, &modifiers, rng, &mut out);
        out
    }

    /// Per-second breach rate for the given state.
    #[must_use]
    pub fn breach_rate(&self, tier: u8, lone_wolf_pressure: f32, modifiers: &CadenceModifiers, reactive: bool) -> f32 {
        let t = usize::from(tier).min(SIEGE_TIERS - 1);
        let mut rate = self.breach.base_rate
            * (1.0 + self.breach.tier_rate_bonus[t])
            * (1.0 + self.breach.lone_wolf_rate_bonus * crate::math::clamp01(lone_wolf_pressure))
            * modifiers.breach_mult.max(0.0);
        if reactive {
            rate *= self.breach.reactive_rate_mult;
        }
        rate
    }

    /// Fail if the phase fields contradict each other.
    pub fn check_invariants(&self) -> Result<()> {
        let violation = if self.event_active && !self.phase.is_event_phase() {
            Some(format!("event active but phase is {}", self.phase.name()))
        } else if !self.event_active && self.phase.is_event_phase() {
            Some(format!("no event but phase is {}", self.phase.name()))
        } else if self.boss_gate && self.phase != CadencePhase::Breather {
            Some(format!("boss gate held during {}", self.phase.name()))
        } else if !(self.phase_timer.is_finite() && self.pulse_timer.is_finite() && self.breach_cooldown.is_finite()) {
            Some("non-finite cadence timer".to_string())
        } else {
            None
        };
        match violation {
            Some(message) => Err(DirectorError::InvariantViolation(message)),
            None => Ok(()),
        }
    }

    fn enter(&mut self, next: CadencePhase, out: &mut CadenceOutput) {
        let from = self.phase;
        self.phase = next;
        out.transitions.push(PhaseTransition { from, to: next });
        tracing::debug!(from = from.name(), to = next.name(), timer = self.phase_timer, "Cadence transition");
    }

    fn start_breather<R: Rng + ?Sized>(&mut self, modifiers: &CadenceModifiers, rng: &mut R, out: &mut CadenceOutput) {
        let false_lull = self.first_breather && rng.gen::<f32>() < modifiers.false_lull_chance;
        self.first_breather = false;
        self.pending_switch = None;
        self.phase_timer = if false_lull {
            tracing::debug!("False lull");
            self.cadence.false_lull.sample(rng)
        } else {
            self.breather_duration(modifiers, rng)
        };
        self.enter(CadencePhase::Breather, out);
    }

    fn start_assault<R: Rng + ?Sized>(
        &mut self,
        modifiers: &CadenceModifiers,
        mercy_active: bool,
        rng: &mut R,
        out: &mut CadenceOutput,
    ) {
        let base = (self.cadence.assault.sample(rng) + modifiers.assault_add).max(self.cadence.assault_floor);
        self.phase_timer = base * self.siege.assault_multiplier(self.tier);
        self.pulse_index = 0;
        self.pending_switch = None;
        // The first pulse lands a fraction of an interval in.
        self.pulse_timer = self.pulse_interval(modifiers, mercy_active, rng) * 0.25;
        self.enter(CadencePhase::Assault, out);
    }

    fn start_breach<R: Rng + ?Sized>(&mut self, rng: &mut R, out: &mut CadenceOutput) {
        self.phase_timer = self.breach.duration.sample(rng);
        self.pulse_timer = 0.0;
        self.pending_switch = None;
        self.enter(CadencePhase::Breach, out);
    }

    fn start_respite<R: Rng + ?Sized>(&mut self, ctx: &CadenceContext<'_>, rng: &mut R, out: &mut CadenceOutput) {
        let mut respite = self.cadence.post_boss_respite.sample(rng);
        if team_health(ctx.players) > self.cadence.healthy_team_threshold {
            respite *= self.cadence.healthy_respite_scale;
        }
        self.phase_timer = respite;
        self.enter(CadencePhase::PostBossRespite, out);
    }

    fn start_wave<R: Rng + ?Sized>(&mut self, rng: &mut R, out: &mut CadenceOutput) {
        self.phase_timer = self.cadence.post_boss_wave.sample(rng);
        self.pulse_index = 0;
        self.pulse_timer = 0.0;
        self.enter(CadencePhase::PostBossWave, out);
    }

    fn breather_duration<R: Rng + ?Sized>(&self, modifiers: &CadenceModifiers, rng: &mut R) -> f32 {
        let base = (self.cadence.breather.sample(rng) + modifiers.breather_add).max(self.cadence.breather_floor);
        base * self.siege.breather_multiplier(self.tier)
    }

    fn pulse_interval<R: Rng + ?Sized>(&self, modifiers: &CadenceModifiers, mercy_active: bool, rng: &mut R) -> f32 {
        let base = (self.cadence.assault_pulse.sample(rng) + modifiers.pulse_add).max(self.cadence.pulse_floor);
        let interval = base * self.siege.pulse_multiplier(self.tier);
        if mercy_active {
            interval * self.cadence.mercy_pulse_scale
        } else {
            interval
        }
    }

    fn rotation_role(&self, roll: &OperationRoll) -> Role {
        let rotation = roll.doctrine().rotation();
        rotation
            .get(self.rotation_index % rotation.len().max(1))
            .copied()
            .unwrap_or(Role::Contester)
    }

    fn advance_rotation(&mut self, roll: &OperationRoll) {
        self.rotation_index = self.rotation_index.wrapping_add(1);
        self.dominant_role = self.rotation_role(roll);
    }

    fn assault_pulse<R: Rng + ?Sized>(
        &mut self,
        ctx: &CadenceContext<'_>,
        modifiers: &CadenceModifiers,
        rng: &mut R,
        out: &mut CadenceOutput,
    ) {
        self.pulse_index += 1;
        let role = match self.pulse_index {
            1 => Some(Role::Contester),
            2 => {
                // Contester keeps the lead briefly before the rotation takes over.
                self.pending_switch = Some(self.cadence.contester_hold);
                None
            }
            3 => Some(ctx.selector.support_role(ctx.roll, ctx.run, rng)),
            _ => {
                if rng.gen::<f32>() < self.cadence.rotation_advance_chance {
                    self.rotation_index = self.rotation_index.wrapping_add(1);
                }
                Some(self.rotation_role(ctx.roll))
            }
        };
        match role {
            Some(role) => {
                self.dominant_role = role;
                out.requests.push(self.pulse_request(
                    BatchKind::AssaultPulse,
                    self.spawn.assault_count,
                    role,
                    ctx,
                    modifiers,
                    rng,
                ));
            }
            None => self.dominant_role = Role::Contester,
        }
        tracing::debug!(pulse = self.pulse_index, role = self.dominant_role.name(), "Assault pulse");
    }

    fn breach_pulse(&self, ctx: &CadenceContext<'_>, modifiers: &CadenceModifiers, out: &mut CadenceOutput) {
        let penalty = if ctx.mercy_active { self.mercy_count_penalty } else { 0 };
        let assault = self.breach.assault_per_pulse.saturating_sub(penalty).max(1);
        let heavy = self.breach.heavy_per_pulse.max(1);
        let heavy_chance = crate::math::clamp01(self.siege.heavy_chance(self.tier) + modifiers.heavy_add);
        out.requests.push(
            SpawnRequest::new(BatchKind::BreachDeployment, SpawnAnchor::Objective, Role::Contester, assault)
                .with_heavy_chance(heavy_chance),
        );
        out.requests.push(
            SpawnRequest::new(BatchKind::BreachDeployment, SpawnAnchor::IsolatedPlayer, Role::Hunter, heavy)
                .with_heavy_chance(1.0),
        );
    }

    fn pulse_request<R: Rng + ?Sized>(
        &self,
        kind: BatchKind,
        base: CountRange,
        role: Role,
        ctx: &CadenceContext<'_>,
        modifiers: &CadenceModifiers,
        rng: &mut R,
    ) -> SpawnRequest {
        let extra_players = ctx.alive_players().saturating_sub(1) / self.spawn.players_per_extra.max(1);
        let mut count = i64::from(base.sample(rng))
            + i64::from(self.siege.count_bonus(self.tier))
            + i64::from(modifiers.count_bonus)
            + i64::from(extra_players);
        if ctx.mercy_active {
            count -= i64::from(self.mercy_count_penalty);
        }
        let anchor = if role == Role::Hunter {
            SpawnAnchor::IsolatedPlayer
        } else {
            SpawnAnchor::Objective
        };
        let heavy_chance = crate::math::clamp01(self.siege.heavy_chance(self.tier) + modifiers.heavy_add);
        SpawnRequest::new(kind, anchor, role, count.max(1) as u32).with_heavy_chance(heavy_chance)
    }

    fn update_reactive<R: Rng + ?Sized>(&mut self, ctx: &CadenceContext<'_>, rng: &mut R, out: &mut CadenceOutput) {
        self.reactive_timer = (self.reactive_timer - ctx.dt).max(0.0);
        if !self.event_active || self.boss_gate {
            return;
        }
        self.reactive_sample_timer -= ctx.dt;
        if self.reactive_sample_timer > 0.0 {
            return;
        }
        self.reactive_sample_timer += self.cadence.reactive_sample_window.max(ctx.dt);
        let charge = ctx.charge_fraction();
        let gained = charge - self.reactive_last_charge;
        self.reactive_last_charge = charge;
        if gained >= self.cadence.reactive_charge_delta
            && team_health(ctx.players) >= self.cadence.reactive_min_team_health
            && !self.reactive_active()
        {
            self.reactive_timer = self.cadence.reactive_duration;
            out.reactive_raised = true;
            out.pivot_requested = rng.gen::<f32>() < self.cadence.reactive_pivot_chance;
            tracing::info!(gained, pivot = out.pivot_requested, "Reactive escalation raised");
        }
    }

    fn roll_breach<R: Rng + ?Sized>(
        &mut self,
        ctx: &CadenceContext<'_>,
        modifiers: &CadenceModifiers,
        rng: &mut R,
        out: &mut CadenceOutput,
    ) {
        let eligible = self.event_active
            && !self.boss_gate
            && !ctx.mercy_active
            && matches!(self.phase, CadencePhase::Breather | CadencePhase::Assault)
            && self.tier >= self.breach.min_tier
            && self.breach_cooldown <= 0.0;
        if !eligible {
            return;
        }
        let p = self.breach_rate(self.tier, ctx.lone_wolf_pressure, modifiers, self.reactive_active()) * ctx.dt;
        if rng.gen::<f32>() < p {
            out.breach_triggered = true;
            tracing::info!(tier = self.tier, "Breach triggered");
            self.start_breach(rng, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PlayerId;
    use crate::math::Vec2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Fixture {
        players: Vec<PlayerView>,
        roll: OperationRoll,
        selector: OperationSelector,
        run: RunAdaptationState,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                players: vec![PlayerView {
                    id: PlayerId(1),
                    position: Vec2::new(3.0, 0.0),
                    health_fraction: 1.0,
                    alive: true,
                }],
                roll: OperationRoll::baseline(),
                selector: OperationSelector::default(),
                run: RunAdaptationState::new(),
            }
        }

        fn ctx(&self, charge: f32, boss_alive: bool) -> CadenceContext<'_> {
            CadenceContext {
                dt: 0.05,
                objective: Some(ObjectiveView {
                    position: Vec2::ZERO,
                    radius: 10.0,
                    charge_fraction: charge,
                    zone_valid: true,
                }),
                players: &self.players,
                boss_alive,
                mercy_active: false,
                lone_wolf_pressure: 0.0,
                roll: &self.roll,
                selector: &self.selector,
                run: &self.run,
            }
        }
    }

    #[test]
    fn test_recon_pulses_periodically() {
        let f = Fixture::new();
        let mut machine = CadenceMachine::new(&DirectorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut pulses = 0;
        // 30 seconds at 20 Hz: pulses at 14s and 28s
        for _ in 0..600 {
            let out = machine.tick(&f.ctx(0.0, false), &mut rng);
            pulses += out.requests.iter().filter(|r| r.kind == BatchKind::ReconPulse).count();
        }
        assert_eq!(pulses, 2);
        assert_eq!(machine.phase(), CadencePhase::Recon);
    }

    #[test]
    fn test_event_cycles_breather_and_assault() {
        let f = Fixture::new();
        let mut machine = CadenceMachine::new(&DirectorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        machine.begin_event(false, &f.roll.modifiers(), &mut rng).unwrap();
        assert_eq!(machine.phase(), CadencePhase::Breather);

        let mut saw_assault = false;
        let mut roles = Vec::new();
        for _ in 0..(20 * 90) {
            let out = machine.tick(&f.ctx(0.1, false), &mut rng);
            if machine.phase() == CadencePhase::Assault {
                saw_assault = true;
            }
            roles.extend(out.requests.iter().filter(|r| r.kind == BatchKind::AssaultPulse).map(|r| r.role));
            machine.check_invariants().unwrap();
        }
        assert!(saw_assault);
        // First assault batch is always a contester batch
        assert_eq!(roles.first(), Some(&Role::Contester));
        // Third batch (second pulse is delayed by the contester hold) is support
        assert!(roles.len() >= 3);
    }

    #[test]
    fn test_begin_event_outside_recon_is_ignored() {
        let f = Fixture::new();
        let mut machine = CadenceMachine::new(&DirectorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(machine.begin_event(false, &f.roll.modifiers(), &mut rng).is_some());
        assert!(machine.begin_event(false, &f.roll.modifiers(), &mut rng).is_none());
        assert!(machine.end_event().is_some());
        assert!(machine.end_event().is_none());
        assert_eq!(machine.phase(), CadencePhase::Cooldown);
        assert!(machine.begin_event(false, &f.roll.modifiers(), &mut rng).is_none());
    }

    #[test]
    fn test_boss_gate_holds_then_post_boss_sequence() {
        let f = Fixture::new();
        let mut machine = CadenceMachine::new(&DirectorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let out = machine.begin_event(true, &f.roll.modifiers(), &mut rng).unwrap();
        assert_eq!(out.charge_hold, Some(true));

        for _ in 0..(20 * 60) {
            let out = machine.tick(&f.ctx(0.0, true), &mut rng);
            assert!(out.requests.is_empty());
            assert_eq!(machine.phase(), CadencePhase::Breather);
        }

        let out = machine.tick(&f.ctx(0.0, false), &mut rng);
        assert_eq!(out.charge_hold, Some(false));
        assert_eq!(machine.phase(), CadencePhase::PostBossRespite);

        let mut waves = 0;
        let mut wave_batches = 0;
        for _ in 0..(20 * 60) {
            let out = machine.tick(&f.ctx(0.3, false), &mut rng);
            waves += out
                .transitions
                .iter()
                .filter(|t| t.to == CadencePhase::PostBossWave)
                .count();
            wave_batches += out.requests.iter().filter(|r| r.kind == BatchKind::PostBossWave).count();
        }
        assert!(waves >= 2);
        assert!(wave_batches > waves);
    }

    #[test]
    fn test_tier_three_scales_breather_and_pulse() {
        let config = DirectorConfig::default();
        let mut machine = CadenceMachine::new(&config);
        machine.tier = 3;
        let modifiers = CadenceModifiers::NEUTRAL;

        // Degenerate ranges make the draw deterministic
        machine.cadence.breather = crate::config::SecondsRange::new(10.0, 10.0);
        machine.cadence.assault_pulse = crate::config::SecondsRange::new(6.0, 6.0);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let breather = machine.breather_duration(&modifiers, &mut rng);
        assert!((breather - 10.0 * config.siege.breather_scale[3]).abs() < 1e-4);
        let pulse = machine.pulse_interval(&modifiers, false, &mut rng);
        assert!((pulse - 6.0 * config.siege.pulse_interval_scale[3]).abs() < 1e-4);

        machine.siege.escalation = 0.5;
        let breather = machine.breather_duration(&modifiers, &mut rng);
        let expected = 10.0 * crate::math::lerp(1.0, config.siege.breather_scale[3], 0.5);
        assert!((breather - expected).abs() < 1e-4);
    }

    #[test]
    fn test_breach_needs_tier() {
        let machine = CadenceMachine::new(&DirectorConfig::default());
        let neutral = CadenceModifiers::NEUTRAL;
        assert!(machine.breach_rate(3, 0.0, &neutral, false) > machine.breach_rate(2, 0.0, &neutral, false));
        assert!(machine.breach_rate(3, 1.0, &neutral, false) > machine.breach_rate(3, 0.0, &neutral, false));
        assert!(machine.breach_rate(3, 0.0, &neutral, true) > machine.breach_rate(3, 0.0, &neutral, false));
    }

    #[test]
    fn test_breach_runs_then_cools_down() {
        let f = Fixture::new();
        let mut config = DirectorConfig::default();
        config.breach.base_rate = 1000.0;
        let mut machine = CadenceMachine::new(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        machine.begin_event(false, &f.roll.modifiers(), &mut rng).unwrap();

        let out = machine.tick(&f.ctx(0.8, false), &mut rng);
        assert!(out.breach_triggered);
        assert_eq!(machine.phase(), CadencePhase::Breach);

        let mut breach_batches = 0;
        while machine.phase() == CadencePhase::Breach {
            let out = machine.tick(&f.ctx(0.8, false), &mut rng);
            breach_batches += out.requests.iter().filter(|r| r.kind == BatchKind::BreachDeployment).count();
        }
        assert!(breach_batches >= 4);
        assert_eq!(machine.phase(), CadencePhase::Breather);
        assert!(machine.breach_cooldown() >= config.breach.cooldown.min - 0.1);

        // Cooldown blocks an immediate re-trigger
        let out = machine.tick(&f.ctx(0.8, false), &mut rng);
        assert!(!out.breach_triggered);
    }

    #[test]
    fn test_reactive_escalation_on_fast_charge() {
        let f = Fixture::new();
        let mut machine = CadenceMachine::new(&DirectorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        machine.begin_event(false, &f.roll.modifiers(), &mut rng).unwrap();
        let mut raised = false;
        let mut charge = 0.0;
        for _ in 0..200 {
            charge += 0.002;
            let out = machine.tick(&f.ctx(charge, false), &mut rng);
            raised |= out.reactive_raised;
        }
        assert!(raised);
    }

    #[test]
    fn test_phase_wire_ids() {
        for phase in CadencePhase::ALL {
            assert_eq!(CadencePhase::from_wire_id(phase.wire_id()), Some(phase));
        }
        assert_eq!(CadencePhase::from_wire_id(PHASE_COUNT as u8), None);
    }
}
