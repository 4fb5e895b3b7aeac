//! The orchestrator.
//!
//! [`Director`] owns every piece of director state and advances it once per
//! fixed simulation tick. The host drives it with two calls:
//!
//! - [`Director::tick`] every fixed step, with mutable access to the world.
//! - [`Director::handle_hook`] for each lifecycle event as it happens.
//!
//! # Tick order
//!
//! 1. Invariant check (every tick in debug builds, else with each snapshot)
//! 2. Fairness timers and lone-wolf smoothing
//! 3. Stage telemetry
//! 4. Cadence machine, then its spawn requests
//! 5. Spawn credit
//! 6. Commander nodes and defeat handling
//! 7. Role steering
//! 8. Straggler cull (cooldown only)
//! 9. Intensity easing
//! 10. Snapshot push

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crossbeam_channel::Receiver;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::adaptation::RunAdaptationState;
use crate::cadence::{CadenceContext, CadenceOutput, CadencePhase, PhaseTransition};
use crate::capabilities::{BuffCapabilities, BuffKind};
use crate::commander::{
    commander_quota, commander_reward, reward_container_count, CommanderDefeat, CommanderKind, CommanderNode,
    CommanderResponse,
};
use crate::config::DirectorConfig;
use crate::error::Result;
use crate::hooks::{Hook, StageInfo};
use crate::host::{
    alive_players, player_centroid, ContestWeight, DamageFlags, NoContest, PlayerView, SpawnPoolProvider, UnitId,
    World,
};
use crate::math::Vec2;
use crate::operation::{DoctrineProfile, OperationRoll};
use crate::roles::Role;
use crate::selector::{DoctrineHistory, OperationSelector};
use crate::session::StageSession;
use crate::snapshot::{DirectorSnapshot, SnapshotHub, SnapshotState, DEFAULT_OBSERVER_CAPACITY};
use crate::spawn::{BatchKind, SpawnAnchor, SpawnRequest, SpawnedUnit};

/// Damage dealt to cull a straggler; large enough to kill anything.
const STRAGGLER_DAMAGE: f32 = 1.0e6;

/// Check invariants every tick rather than once per snapshot.
const VALIDATE_EVERY_TICK: bool = cfg!(any(debug_assertions, feature = "debug-validation"));

/// What happened when a commander fell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefeatReport {
    /// Kind that fell.
    pub kind: CommanderKind,
    /// Its command zone.
    pub anchor: Vec2,
    /// The one response rolled.
    pub response: CommanderResponse,
    /// Currency granted to each player.
    pub reward: u32,
    /// Reward containers dropped.
    pub containers: u32,
    /// New doctrine, if the response was a pivot.
    pub pivoted_to: Option<DoctrineProfile>,
}

/// Events generated by one tick or hook.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Units spawned.
    pub spawned: Vec<SpawnedUnit>,
    /// Phase changes.
    pub transitions: Vec<PhaseTransition>,
    /// Commanders that fell.
    pub commander_defeats: Vec<DefeatReport>,
    /// New operation, when one was rolled or pivoted.
    pub operation_changed: Option<OperationRoll>,
    /// A breach triggered.
    pub breach_triggered: bool,
    /// A mercy window opened.
    pub mercy_opened: bool,
    /// Stage telemetry was committed into the run state.
    pub committed: bool,
    /// The stage session was reset after an invariant violation.
    pub session_reset: bool,
    /// Snapshot pushed to observers.
    pub snapshot: Option<DirectorSnapshot>,
}

/// The adaptive encounter director.
///
/// Generic over the spawn pool so tests can inject a fixed catalog. All
/// randomness comes from one seeded `ChaCha8Rng`; the same seed, config,
/// hooks and world replies produce the same decisions.
pub struct Director<P: SpawnPoolProvider> {
    config: DirectorConfig,
    pool: P,
    capabilities: BuffCapabilities,
    contest: Box<dyn ContestWeight>,
    selector: OperationSelector,
    rng: ChaCha8Rng,
    seed: u64,
    tick: u64,
    run_active: bool,
    run: RunAdaptationState,
    history: DoctrineHistory,
    session: Option<StageSession>,
    snapshot_timer: f32,
    hub: SnapshotHub,
}

impl<P: SpawnPoolProvider> std::fmt::Debug for Director<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Director")
            .field("seed", &self.seed)
            .field("tick", &self.tick)
            .field("run_active", &self.run_active)
            .field("session", &self.session.as_ref().map(|s| s.phase()))
            .finish_non_exhaustive()
    }
}

impl<P: SpawnPoolProvider> Director<P> {
    /// Create a director. Fails if the config does not validate.
    ///
    /// The buff capability table is resolved here, once.
    pub fn new(config: DirectorConfig, pool: P) -> Result<Self> {
        config.validate()?;
        let capabilities = BuffCapabilities::resolve(|kind| pool.supports_buff(kind));
        let selector = OperationSelector::new(config.selector.clone());
        Ok(Self {
            config,
            pool,
            capabilities,
            contest: Box::new(NoContest),
            selector,
            rng: ChaCha8Rng::seed_from_u64(0),
            seed: 0,
            tick: 0,
            run_active: false,
            run: RunAdaptationState::new(),
            history: DoctrineHistory::default(),
            session: None,
            snapshot_timer: 0.0,
            hub: SnapshotHub::new(DEFAULT_OBSERVER_CAPACITY),
        })
    }

    /// Replace the contest-weight hook.
    #[must_use]
    pub fn with_contest_weight(mut self, contest: Box<dyn ContestWeight>) -> Self {
        self.contest = contest;
        self
    }

    /// Active config.
    #[must_use]
    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    /// Injected spawn pool.
    #[must_use]
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Resolved buff capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &BuffCapabilities {
        &self.capabilities
    }

    /// Seed of the current run.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Ticks advanced in the current run.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_run_active(&self) -> bool {
        self.run_active
    }

    /// Learned run-level signals.
    #[must_use]
    pub fn run_state(&self) -> &RunAdaptationState {
        &self.run
    }

    /// Doctrine history for repeat penalties.
    #[must_use]
    pub fn history(&self) -> DoctrineHistory {
        self.history
    }

    /// Current stage session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&StageSession> {
        self.session.as_ref()
    }

    /// Register a snapshot observer. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<DirectorSnapshot> {
        self.hub.subscribe()
    }

    /// Live observer count.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    /// Read-only snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> DirectorSnapshot {
        DirectorSnapshot::quantize(&self.snapshot_state())
    }

    /// Unquantised view behind [`Self::snapshot`].
    #[must_use]
    pub fn snapshot_state(&self) -> SnapshotState {
        let Some(s) = self.session.as_ref() else {
            return SnapshotState::default();
        };
        let phase = s.phase();
        SnapshotState {
            active: true,
            phase,
            dominant_role: s.cadence.dominant_role(),
            doctrine: s.roll.doctrine(),
            warnings: s.roll.warnings(),
            anomaly: s.roll.anomaly(),
            intensity: s.intensity,
            charge_fraction: s.charge_fraction,
            assault: matches!(phase, CadencePhase::Assault | CadencePhase::PostBossWave),
            breach: phase == CadencePhase::Breach,
            mercy: s.fairness.mercy_active(),
            boss_gate: s.cadence.boss_gate(),
            reactive: s.cadence.reactive_active(),
            lone_wolf_pressure: s.fairness.lone_wolf_pressure(),
            window_remaining: s.cadence.window_remaining(),
            commander_count: s.commanders.len().min(usize::from(u8::MAX)) as u8,
            commander_mask: s.commander_mask(),
            siege_tier: s.cadence.tier(),
        }
    }

    /// Hash of all decision-relevant state.
    ///
    /// Used to verify determinism: two directors fed the same hooks and world
    /// replies from the same seed must agree on this every tick.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.seed.hash(&mut hasher);
        self.run_active.hash(&mut hasher);
        self.rng.get_word_pos().hash(&mut hasher);

        for signal in self.run.signals() {
            signal.to_bits().hash(&mut hasher);
        }
        for role in Role::TAGGED {
            self.run.role_threat(role).to_bits().hash(&mut hasher);
        }
        self.history.last().map(DoctrineProfile::wire_id).hash(&mut hasher);
        self.history.streak().hash(&mut hasher);
        self.snapshot().hash(&mut hasher);

        if let Some(s) = &self.session {
            s.info.stage_index.hash(&mut hasher);
            s.elapsed.to_bits().hash(&mut hasher);
            s.intensity.to_bits().hash(&mut hasher);
            s.cadence.window_remaining().to_bits().hash(&mut hasher);
            s.cadence.pulse_timer().to_bits().hash(&mut hasher);
            s.cadence.pulse_index().hash(&mut hasher);
            s.cadence.breach_cooldown().to_bits().hash(&mut hasher);
            s.spawn.credit().banked().to_bits().hash(&mut hasher);
            s.fairness.mercy_timer().to_bits().hash(&mut hasher);
            s.fairness.mercy_cooldown().to_bits().hash(&mut hasher);
            s.steering.len().hash(&mut hasher);
            for agent in s.steering.agents() {
                agent.unit().hash(&mut hasher);
                agent.velocity().x.to_bits().hash(&mut hasher);
                agent.velocity().y.to_bits().hash(&mut hasher);
            }
            for node in &s.commanders {
                node.unit().hash(&mut hasher);
                node.idle_timer().to_bits().hash(&mut hasher);
            }
        }

        hasher.finish()
    }

    /// Advance one fixed tick.
    pub fn tick<W: World + ?Sized>(&mut self, world: &mut W) -> TickEvents {
        let mut events = TickEvents::default();
        if !self.run_active {
            return events;
        }
        self.tick += 1;
        let dt = self.config.tick_seconds();

        self.snapshot_timer -= dt;
        let snapshot_due = self.snapshot_timer <= 0.0;
        if VALIDATE_EVERY_TICK || snapshot_due {
            self.validate_session(world, &mut events);
        }

        if let Some(mut session) = self.session.take() {
            self.advance_session(&mut session, world, dt, &mut events);
            self.session = Some(session);
        }

        if snapshot_due {
            self.snapshot_timer += self.config.snapshot_interval.max(dt);
            let snapshot = self.snapshot();
            self.hub.publish(snapshot);
            events.snapshot = Some(snapshot);
        }
        events
    }

    /// React to a lifecycle event. Out-of-phase hooks are ignored.
    pub fn handle_hook<W: World + ?Sized>(&mut self, world: &mut W, hook: Hook) -> TickEvents {
        let mut events = TickEvents::default();
        tracing::trace!(hook = hook.name(), "Hook received");
        match hook {
            Hook::RunStart { seed } => self.start_run(world, seed, &mut events),
            Hook::RunEnd => self.end_run(world, &mut events),
            Hook::StageStart(info) => self.start_stage(world, info, &mut events),
            Hook::ChargeBegin => self.charge_begin(world, &mut events),
            Hook::ChargeCharged | Hook::ChargeFinish => {
                let Some(mut session) = self.session.take() else {
                    tracing::debug!(hook = hook.name(), "No stage session, hook ignored");
                    return events;
                };
                if let Some(output) = session.cadence.end_event() {
                    let players = world.players();
                    self.apply_cadence_output(&mut session, world, &players, output, &mut events);
                    tracing::info!(stage = session.info.stage_index, hook = hook.name(), "Charge event ended");
                }
                events.committed = self.commit(&mut session);
                self.session = Some(session);
            }
            Hook::DamageDealt {
                attacker,
                victim,
                amount,
            } => {
                let weight = self.config.adaptation.role_damage_weight;
                if let Some(session) = self.session.as_mut() {
                    let role = attacker.and_then(|unit| session.role_of(unit));
                    if let Some(telemetry) = session.ledger.telemetry_mut() {
                        if victim.is_some() && amount.is_finite() && amount > 0.0 {
                            telemetry.damage_taken += amount;
                            if let Some(role) = role {
                                telemetry.record_role(role, amount * weight);
                            }
                        }
                    }
                }
            }
            Hook::UnitHealed { player, amount } => {
                if let Some(telemetry) = self.session.as_mut().and_then(|s| s.ledger.telemetry_mut()) {
                    if player.is_some() && amount.is_finite() && amount > 0.0 {
                        telemetry.healing_received += amount;
                    }
                }
            }
            Hook::PlayerDeath { player } => {
                if let Some(session) = self.session.as_mut() {
                    events.mercy_opened = session.fairness.on_player_death(&self.config.fairness, &mut self.rng);
                    tracing::debug!(player = player.0, mercy = events.mercy_opened, "Player died");
                }
            }
        }
        events
    }

    fn start_run<W: World + ?Sized>(&mut self, world: &mut W, seed: u64, events: &mut TickEvents) {
        if self.run_active {
            tracing::warn!(seed = self.seed, "Run started while another was active; ending it first");
            self.end_run(world, events);
        }
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.tick = 0;
        self.run.reset();
        self.history = DoctrineHistory::default();
        self.session = None;
        self.snapshot_timer = 0.0;
        self.run_active = true;
        tracing::info!(seed, "Run started");
    }

    fn end_run<W: World + ?Sized>(&mut self, world: &mut W, events: &mut TickEvents) {
        if !self.run_active {
            tracing::debug!("Run end without an active run, ignored");
            return;
        }
        if let Some(mut session) = self.session.take() {
            events.committed = self.commit(&mut session);
            self.release_session(world, &session);
        }
        tracing::info!(
            seed = self.seed,
            stages = self.run.stages_committed(),
            ticks = self.tick,
            "Run ended"
        );
        self.run.reset();
        self.history = DoctrineHistory::default();
        self.hub.clear();
        self.run_active = false;
    }

    fn start_stage<W: World + ?Sized>(&mut self, world: &mut W, info: StageInfo, events: &mut TickEvents) {
        if !self.run_active {
            tracing::warn!(stage = info.stage_index, "Stage started outside a run; starting one");
            self.run_active = true;
            self.snapshot_timer = 0.0;
        }
        if let Some(mut previous) = self.session.take() {
            events.committed = self.commit(&mut previous);
            self.release_session(world, &previous);
        }

        let roll = self.selector.roll(info.stage_index, &self.run, &self.history, &mut self.rng);
        self.history.record(roll.doctrine());
        tracing::info!(
            stage = info.stage_index,
            difficulty = info.difficulty,
            doctrine = roll.doctrine().name(),
            warning_a = ?roll.warning_a(),
            warning_b = ?roll.warning_b(),
            anomaly = ?roll.anomaly(),
            "Stage started"
        );
        events.operation_changed = Some(roll);

        let mut session = StageSession::new(info, roll, &self.config);
        let players = world.players();
        let zones = session.info.command_zones.clone();
        if zones.is_empty() {
            tracing::debug!(stage = session.info.stage_index, "No command zones; no commanders at stage entry");
        } else {
            let quota = commander_quota(
                session.info.stage_index,
                alive_players(&players).count() as u32,
                roll.modifiers().commander_bonus,
                &self.config.commander,
            );
            self.field_commanders(&mut session, world, &players, quota, &zones, events);
        }
        self.session = Some(session);
    }

    fn charge_begin<W: World + ?Sized>(&mut self, world: &mut W, events: &mut TickEvents) {
        let Some(mut session) = self.session.take() else {
            tracing::debug!("Charge begin without a stage session, ignored");
            return;
        };
        let modifiers = session.roll.modifiers();
        match session.cadence.begin_event(world.boss_alive(), &modifiers, &mut self.rng) {
            Some(output) => {
                let players = world.players();
                self.apply_cadence_output(&mut session, world, &players, output, events);
                if session.info.stage_index >= self.config.commander.event_entry_min_stage {
                    let quota = commander_quota(
                        session.info.stage_index,
                        alive_players(&players).count() as u32,
                        modifiers.commander_bonus,
                        &self.config.commander,
                    );
                    let missing = quota.saturating_sub(session.commanders.len() as u32);
                    let anchor = world
                        .objective()
                        .filter(|o| o.zone_valid)
                        .map(|o| o.position)
                        .or_else(|| player_centroid(&players));
                    if let Some(anchor) = anchor {
                        self.field_commanders(&mut session, world, &players, missing, &[anchor], events);
                    }
                }
            }
            None => tracing::warn!(phase = session.phase().name(), "Charge begin outside recon, ignored"),
        }
        self.session = Some(session);
    }

    fn advance_session<W: World + ?Sized>(
        &mut self,
        session: &mut StageSession,
        world: &mut W,
        dt: f32,
        events: &mut TickEvents,
    ) {
        let players = world.players();
        let objective = world.objective();
        let zone = objective.filter(|o| o.zone_valid);
        session.elapsed += dt;
        session.charge_fraction = objective.map_or(0.0, |o| o.charge_fraction);

        session.fairness.tick(dt, &self.config.fairness, &players, zone.as_ref());
        let lone_wolf = session.fairness.lone_wolf_pressure();
        let contest = zone.map_or(0.0, |o| self.contest.contest_weight(&o, &players));
        if let Some(telemetry) = session.ledger.telemetry_mut() {
            telemetry.advance(dt, contest, lone_wolf);
        }

        let ctx = CadenceContext {
            dt,
            objective,
            players: &players,
            boss_alive: world.boss_alive(),
            mercy_active: session.fairness.mercy_active(),
            lone_wolf_pressure: lone_wolf,
            roll: &session.roll,
            selector: &self.selector,
            run: &self.run,
        };
        let output = session.cadence.tick(&ctx, &mut self.rng);
        if output.breach_triggered {
            events.breach_triggered = true;
            if let Some(telemetry) = session.ledger.telemetry_mut() {
                telemetry.breach_triggers += 1;
            }
        }
        if output.pivot_requested {
            self.pivot(session, None, events);
        }
        self.apply_cadence_output(session, world, &players, output, events);

        session.spawn.accrue(dt, session.phase().credit_scale());

        let mut defeats: Vec<CommanderDefeat> = Vec::new();
        for node in &mut session.commanders {
            if let Some(defeat) = node.tick(dt, world, &players, &self.config.commander, &self.capabilities) {
                defeats.push(defeat);
            }
        }
        session.commanders.retain(|n| !n.is_consumed());
        for defeat in defeats {
            self.on_commander_defeat(session, world, &players, defeat, events);
        }

        session.steering.tick(dt, world, &players, &mut self.rng);
        if session.phase() == CadencePhase::Cooldown {
            self.cull_stragglers(session, world, &players);
        }
        session.ease_intensity(dt, self.config.cadence.intensity_response);
    }

    fn apply_cadence_output<W: World + ?Sized>(
        &mut self,
        session: &mut StageSession,
        world: &mut W,
        players: &[PlayerView],
        output: CadenceOutput,
        events: &mut TickEvents,
    ) {
        if let Some(held) = output.charge_hold {
            world.set_charge_hold(held);
        }
        events.transitions.extend(output.transitions);
        for request in &output.requests {
            self.spawn_batch(session, world, players, request, events);
        }
    }

    fn spawn_batch<W: World + ?Sized>(
        &mut self,
        session: &mut StageSession,
        world: &mut W,
        players: &[PlayerView],
        request: &SpawnRequest,
        events: &mut TickEvents,
    ) {
        let buffs: Vec<BuffKind> = session.roll.spawn_buffs().collect();
        let alive = session.alive_enemies();
        let spawned = session.spawn.execute(
            request,
            &self.pool,
            world,
            players,
            alive,
            &buffs,
            &self.capabilities,
            &mut self.rng,
        );
        for unit in &spawned {
            session.steering.register(unit.unit, unit.role, &mut self.rng);
        }
        if !spawned.is_empty() {
            let amount = spawned.len() as f32 * self.config.adaptation.role_spawn_weight;
            if let Some(telemetry) = session.ledger.telemetry_mut() {
                telemetry.record_role(request.role, amount);
            }
        }
        events.spawned.extend(spawned);
    }

    fn field_commanders<W: World + ?Sized>(
        &mut self,
        session: &mut StageSession,
        world: &mut W,
        players: &[PlayerView],
        count: u32,
        anchors: &[Vec2],
        events: &mut TickEvents,
    ) {
        if anchors.is_empty() {
            return;
        }
        let buffs: Vec<BuffKind> = session.roll.commander_buffs().collect();
        for i in 0..count as usize {
            let anchor = anchors[i % anchors.len()];
            let kind = CommanderKind::pick(session.roll.doctrine(), &mut self.rng);
            let request = SpawnRequest::new(BatchKind::CommanderBatch, SpawnAnchor::Point(anchor), Role::Anchor, 1);
            let alive = session.alive_enemies();
            let spawned = session.spawn.execute(
                &request,
                &self.pool,
                world,
                players,
                alive,
                &buffs,
                &self.capabilities,
                &mut self.rng,
            );
            for unit in spawned {
                session
                    .commanders
                    .push(CommanderNode::new(unit.unit, kind, anchor, &self.config.commander));
                tracing::info!(unit = unit.unit.0, kind = kind.name(), x = anchor.x, y = anchor.y, "Commander fielded");
                events.spawned.push(unit);
            }
        }
    }

    fn on_commander_defeat<W: World + ?Sized>(
        &mut self,
        session: &mut StageSession,
        world: &mut W,
        players: &[PlayerView],
        defeat: CommanderDefeat,
        events: &mut TickEvents,
    ) {
        let tuning = self.config.commander.clone();
        let reward = commander_reward(
            defeat.kind,
            session.info.stage_index,
            session.info.difficulty,
            players.len() as u32,
            &tuning,
        );
        for player in players {
            world.grant_currency(player.id, reward);
        }
        let containers = reward_container_count(&tuning, &mut self.rng);
        for _ in 0..containers {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let distance = self.rng.gen_range(0.0..=tuning.container_scatter.max(0.0));
            world.spawn_reward_container(defeat.anchor + Vec2::from_angle(angle).scale(distance));
        }

        let response = CommanderResponse::roll(&mut self.rng);
        let role = match session.cadence.dominant_role() {
            Role::None => Role::Contester,
            role => role,
        };
        let mut pivoted_to = None;
        match response {
            CommanderResponse::RetaliationWave => {
                let request = SpawnRequest::new(
                    BatchKind::CommanderRetaliation,
                    SpawnAnchor::Point(defeat.anchor),
                    role,
                    tuning.retaliation_count,
                );
                self.spawn_batch(session, world, players, &request, events);
            }
            CommanderResponse::DoctrinePivot => {
                pivoted_to = Some(self.pivot(session, Some(defeat.kind.pivot_doctrine()), events));
            }
            CommanderResponse::HeavyDeployment => {
                let request = SpawnRequest::new(
                    BatchKind::HeavyDeployment,
                    SpawnAnchor::IsolatedPlayer,
                    Role::Hunter,
                    tuning.heavy_deployment_count,
                )
                .with_heavy_chance(1.0);
                self.spawn_batch(session, world, players, &request, events);
            }
            CommanderResponse::CreditDump => {
                let count = session.spawn.credit_dump_size(tuning.credit_dump_cap);
                if count > 0 {
                    let request =
                        SpawnRequest::new(BatchKind::CreditDump, SpawnAnchor::Point(defeat.anchor), role, count);
                    self.spawn_batch(session, world, players, &request, events);
                }
            }
        }

        tracing::info!(
            unit = defeat.unit.0,
            kind = defeat.kind.name(),
            reward,
            containers,
            response = response.name(),
            "Commander defeated"
        );
        events.commander_defeats.push(DefeatReport {
            kind: defeat.kind,
            anchor: defeat.anchor,
            response,
            reward,
            containers,
            pivoted_to,
        });
    }

    fn pivot(
        &mut self,
        session: &mut StageSession,
        preferred: Option<DoctrineProfile>,
        events: &mut TickEvents,
    ) -> DoctrineProfile {
        let from = session.roll.doctrine();
        let roll = self.selector.pivot(&session.roll, preferred, &self.run, &mut self.rng);
        session.roll = roll;
        self.history.amend(roll.doctrine());
        session
            .cadence
            .on_operation_changed(&roll, session.fairness.mercy_active(), &mut self.rng);
        tracing::info!(from = from.name(), to = roll.doctrine().name(), "Doctrine pivot");
        events.operation_changed = Some(roll);
        roll.doctrine()
    }

    fn cull_stragglers<W: World + ?Sized>(&mut self, session: &mut StageSession, world: &mut W, players: &[PlayerView]) {
        if alive_players(players).next().is_none() {
            return;
        }
        let radius = self.config.spawn.straggler_radius;
        let radius_sq = radius * radius;
        let objective = world.objective().filter(|o| o.zone_valid).map(|o| o.position);
        let culled: Vec<UnitId> = session
            .steering
            .agents()
            .iter()
            .filter_map(|agent| {
                let position = world.position_of(agent.unit())?;
                let near_player = alive_players(players).any(|p| p.position.distance_squared(position) <= radius_sq);
                let near_objective = objective.is_some_and(|o| o.distance_squared(position) <= radius_sq);
                (!near_player && !near_objective).then_some(agent.unit())
            })
            .collect();
        for unit in culled {
            world.apply_damage(
                unit,
                STRAGGLER_DAMAGE,
                DamageFlags {
                    silent: true,
                    bypass_armor: true,
                },
            );
            session.steering.remove(unit);
            tracing::debug!(unit = unit.0, "Straggler culled");
        }
    }

    fn commit(&mut self, session: &mut StageSession) -> bool {
        session
            .ledger
            .commit(&mut self.run, &self.config.adaptation, session.info.difficulty)
    }

    fn release_session<W: World + ?Sized>(&self, world: &mut W, session: &StageSession) {
        if session.cadence.boss_gate() {
            world.set_charge_hold(false);
        }
        tracing::debug!(
            stage = session.info.stage_index,
            commanders = session.commanders.len(),
            agents = session.steering.len(),
            "Stage session released"
        );
    }

    fn validate_session<W: World + ?Sized>(&mut self, world: &mut W, events: &mut TickEvents) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if let Err(err) = session.check_invariants() {
            tracing::error!(error = %err, stage = session.info.stage_index, "Stage session reset");
            world.set_charge_hold(false);
            let mut fresh = StageSession::new(session.info.clone(), session.roll, &self.config);
            fresh.ledger = session.ledger.clone();
            self.session = Some(fresh);
            events.session_reset = true;
        }
    }

    #[cfg(test)]
    pub(crate) fn session_mut(&mut self) -> Option<&mut StageSession> {
        self.session.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ObjectiveView, PlayerId, PoolCategory, SpawnOptions, Team, UnitTemplate};
    use std::collections::HashMap;

    struct Pool {
        units: Vec<UnitTemplate>,
    }

    impl SpawnPoolProvider for Pool {
        fn pool(&self, _category: PoolCategory) -> &[UnitTemplate] {
            &self.units
        }
    }

    fn pool() -> Pool {
        Pool {
            units: vec![UnitTemplate::new("grunt").with_cost(0.0)],
        }
    }

    #[derive(Default)]
    struct Arena {
        next: u64,
        units: HashMap<UnitId, Vec2>,
        held: bool,
        boss: bool,
        granted: u32,
        containers: u32,
    }

    impl World for Arena {
        fn spawn(&mut self, _t: &UnitTemplate, p: Vec2, _f: f32, _team: Team, _o: SpawnOptions) -> Option<UnitId> {
            self.next += 1;
            let id = UnitId(self.next);
            self.units.insert(id, p);
            Some(id)
        }
        fn is_alive(&self, unit: UnitId) -> bool {
            self.units.contains_key(&unit)
        }
        fn position_of(&self, unit: UnitId) -> Option<Vec2> {
            self.units.get(&unit).copied()
        }
        fn facing_of(&self, _unit: UnitId) -> Option<f32> {
            Some(0.0)
        }
        fn health_fraction_of(&self, unit: UnitId) -> Option<f32> {
            self.units.contains_key(&unit).then_some(1.0)
        }
        fn apply_timed_buff(&mut self, _unit: UnitId, _kind: BuffKind, _duration: f32) {}
        fn apply_damage(&mut self, unit: UnitId, _amount: f32, _flags: DamageFlags) {
            self.units.remove(&unit);
        }
        fn heal_fraction(&mut self, _unit: UnitId, _fraction: f32) {}
        fn set_desired_velocity(&mut self, _unit: UnitId, _velocity: Vec2) {}
        fn teleport(&mut self, unit: UnitId, position: Vec2) {
            self.units.insert(unit, position);
        }
        fn players(&self) -> Vec<PlayerView> {
            vec![PlayerView {
                id: PlayerId(1),
                position: Vec2::new(0.0, 0.0),
                health_fraction: 1.0,
                alive: true,
            }]
        }
        fn enemies_within(&self, _center: Vec2, _radius: f32) -> Vec<UnitId> {
            Vec::new()
        }
        fn objective(&self) -> Option<ObjectiveView> {
            Some(ObjectiveView {
                position: Vec2::ZERO,
                radius: 10.0,
                charge_fraction: 0.0,
                zone_valid: true,
            })
        }
        fn boss_alive(&self) -> bool {
            self.boss
        }
        fn set_charge_hold(&mut self, held: bool) {
            self.held = held;
        }
        fn grant_currency(&mut self, _player: PlayerId, amount: u32) {
            self.granted += amount;
        }
        fn spawn_reward_container(&mut self, _position: Vec2) {
            self.containers += 1;
        }
    }

    fn director() -> Director<Pool> {
        Director::new(DirectorConfig::default(), pool()).unwrap()
    }

    #[test]
    fn test_ticks_are_inert_before_run_start() {
        let mut d = director();
        let mut arena = Arena::default();
        let events = d.tick(&mut arena);
        assert!(events.snapshot.is_none());
        assert_eq!(d.tick_count(), 0);
    }

    #[test]
    fn test_first_stage_is_balanced() {
        let mut d = director();
        let mut arena = Arena::default();
        d.handle_hook(&mut arena, Hook::RunStart { seed: 99 });
        let events = d.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(0, 1.0)));
        assert_eq!(events.operation_changed.map(|r| r.doctrine()), Some(DoctrineProfile::Balanced));
        assert_eq!(d.history().last(), Some(DoctrineProfile::Balanced));
    }

    #[test]
    fn test_commanders_fielded_at_zones() {
        let mut d = director();
        let mut arena = Arena::default();
        d.handle_hook(&mut arena, Hook::RunStart { seed: 1 });
        let info = StageInfo::new(0, 1.0).with_command_zones([Vec2::new(30.0, 0.0)]);
        d.handle_hook(&mut arena, Hook::StageStart(info));
        let session = d.session().unwrap();
        assert_eq!(session.commanders().len(), 1);
        assert_ne!(session.commander_mask(), 0);
    }

    #[test]
    fn test_commander_defeat_rolls_one_response() {
        let mut d = director();
        let mut arena = Arena::default();
        d.handle_hook(&mut arena, Hook::RunStart { seed: 5 });
        let info = StageInfo::new(0, 1.0).with_command_zones([Vec2::new(30.0, 0.0)]);
        d.handle_hook(&mut arena, Hook::StageStart(info));
        let unit = d.session().unwrap().commanders()[0].unit();
        arena.units.remove(&unit);

        let first = d.tick(&mut arena);
        let second = d.tick(&mut arena);
        assert_eq!(first.commander_defeats.len(), 1);
        assert!(second.commander_defeats.is_empty());
        assert!(arena.granted > 0);
        assert!(arena.containers >= 1);
        let report = first.commander_defeats[0];
        assert_eq!(report.pivoted_to.is_some(), report.response == CommanderResponse::DoctrinePivot);
    }

    #[test]
    fn test_pivot_is_what_the_history_remembers() {
        let mut pivoted = None;
        for seed in 0..200 {
            let mut d = director();
            let mut arena = Arena::default();
            d.handle_hook(&mut arena, Hook::RunStart { seed });
            let info = StageInfo::new(0, 1.0).with_command_zones([Vec2::new(30.0, 0.0)]);
            d.handle_hook(&mut arena, Hook::StageStart(info));
            let unit = d.session().unwrap().commanders()[0].unit();
            arena.units.remove(&unit);
            let events = d.tick(&mut arena);
            if let Some(to) = events.commander_defeats[0].pivoted_to {
                assert_eq!(d.history().last(), Some(to));
                assert_eq!(d.history().streak(), 1);
                assert_eq!(d.session().unwrap().roll().doctrine(), to);
                pivoted = Some(to);
                break;
            }
        }
        assert!(pivoted.is_some(), "no seed rolled a doctrine pivot");
    }

    #[test]
    fn test_boss_gate_holds_charge_until_release() {
        let mut d = director();
        let mut arena = Arena {
            boss: true,
            ..Arena::default()
        };
        d.handle_hook(&mut arena, Hook::RunStart { seed: 3 });
        d.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(1, 1.0)));
        d.handle_hook(&mut arena, Hook::ChargeBegin);
        assert!(arena.held);
        arena.boss = false;
        d.tick(&mut arena);
        assert!(!arena.held);
        assert_eq!(d.session().unwrap().phase(), CadencePhase::PostBossRespite);
    }

    #[test]
    fn test_telemetry_commits_once() {
        let mut d = director();
        let mut arena = Arena::default();
        d.handle_hook(&mut arena, Hook::RunStart { seed: 3 });
        d.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(0, 1.0)));
        d.handle_hook(&mut arena, Hook::ChargeBegin);
        let charged = d.handle_hook(&mut arena, Hook::ChargeCharged);
        let finished = d.handle_hook(&mut arena, Hook::ChargeFinish);
        assert!(charged.committed);
        assert!(!finished.committed);
        assert_eq!(d.run_state().stages_committed(), 1);
        let next = d.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(1, 1.0)));
        assert!(!next.committed);
    }

    #[test]
    fn test_out_of_phase_hooks_are_ignored() {
        let mut d = director();
        let mut arena = Arena::default();
        d.handle_hook(&mut arena, Hook::ChargeBegin);
        d.handle_hook(&mut arena, Hook::ChargeFinish);
        d.handle_hook(&mut arena, Hook::RunEnd);
        d.handle_hook(&mut arena, Hook::PlayerDeath { player: PlayerId(1) });
        assert!(d.session().is_none());
        assert!(!d.is_run_active());
    }

    #[test]
    fn test_invariant_violation_resets_session() {
        let mut d = director();
        let mut arena = Arena::default();
        d.handle_hook(&mut arena, Hook::RunStart { seed: 3 });
        d.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(0, 1.0)));
        if let Some(session) = d.session_mut() {
            session.intensity = 500.0;
        }
        let events = d.tick(&mut arena);
        assert!(events.session_reset);
        assert!(d.session().unwrap().check_invariants().is_ok());
    }

    #[test]
    fn test_run_end_closes_observers() {
        let mut d = director();
        let mut arena = Arena::default();
        let rx = d.subscribe();
        d.handle_hook(&mut arena, Hook::RunStart { seed: 3 });
        d.handle_hook(&mut arena, Hook::StageStart(StageInfo::new(0, 1.0)));
        let events = d.tick(&mut arena);
        assert!(events.snapshot.is_some());
        assert!(rx.try_recv().is_ok());
        d.handle_hook(&mut arena, Hook::RunEnd);
        assert_eq!(d.observer_count(), 0);
        assert!(rx.recv().is_err());
    }
}
