//! Read-only director snapshots and their fan-out to observers.
//!
//! [`SnapshotState`] is the typed view. [`DirectorSnapshot`] is the wire
//! record: small integer ids, one flags byte and fixed-point fractions, so
//! every encoded snapshot has the same length ([`SNAPSHOT_WIRE_SIZE`]).
//! Observers never touch director state; they receive copies through a
//! [`SnapshotHub`] subscription.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use fixed::types::{U1F15, U8F8};
use serde::{Deserialize, Serialize};

use crate::cadence::CadencePhase;
use crate::error::{DirectorError, Result};
use crate::math::clamp01;
use crate::operation::{Anomaly, DoctrineProfile, Warning};
use crate::roles::Role;

/// Encoded length of every snapshot in bytes.
pub const SNAPSHOT_WIRE_SIZE: usize = 18;

/// Default number of snapshots buffered per observer.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 8;

const FLAG_ACTIVE: u8 = 1 << 0;
const FLAG_ASSAULT: u8 = 1 << 1;
const FLAG_BREACH: u8 = 1 << 2;
const FLAG_MERCY: u8 = 1 << 3;
const FLAG_BOSS_GATE: u8 = 1 << 4;
const FLAG_REACTIVE: u8 = 1 << 5;

/// Typed, lossless view of the director for one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotState {
    /// A stage session exists.
    pub active: bool,
    /// Active phase.
    pub phase: CadencePhase,
    /// Role currently driving pulses.
    pub dominant_role: Role,
    /// Active doctrine.
    pub doctrine: DoctrineProfile,
    /// Active warnings.
    pub warnings: [Warning; 2],
    /// Active anomaly.
    pub anomaly: Anomaly,
    /// Intensity in `[0, 100]`.
    pub intensity: f32,
    /// Objective charge fraction.
    pub charge_fraction: f32,
    /// Assault phase flag.
    pub assault: bool,
    /// Breach phase flag.
    pub breach: bool,
    /// Mercy window flag.
    pub mercy: bool,
    /// Boss gate flag.
    pub boss_gate: bool,
    /// Reactive escalation flag.
    pub reactive: bool,
    /// Smoothed lone-wolf pressure.
    pub lone_wolf_pressure: f32,
    /// Seconds left in the current window.
    pub window_remaining: f32,
    /// Live commanders.
    pub commander_count: u8,
    /// Bitmask of live commander kinds.
    pub commander_mask: u8,
    /// Siege tier.
    pub siege_tier: u8,
}

impl Default for SnapshotState {
    fn default() -> Self {
        Self {
            active: false,
            phase: CadencePhase::Recon,
            dominant_role: Role::None,
            doctrine: DoctrineProfile::Balanced,
            warnings: [Warning::SuppressionVolleys, Warning::MedicCorps],
            anomaly: Anomaly::Stillness,
            intensity: 0.0,
            charge_fraction: 0.0,
            assault: false,
            breach: false,
            mercy: false,
            boss_gate: false,
            reactive: false,
            lone_wolf_pressure: 0.0,
            window_remaining: 0.0,
            commander_count: 0,
            commander_mask: 0,
            siege_tier: 0,
        }
    }
}

/// Compact wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectorSnapshot {
    flags: u8,
    phase: u8,
    dominant_role: u8,
    doctrine: u8,
    warning_a: u8,
    warning_b: u8,
    anomaly: u8,
    commander_count: u8,
    commander_mask: u8,
    siege_tier: u8,
    #[serde(with = "u8f8_bits")]
    intensity: U8F8,
    #[serde(with = "u8f8_bits")]
    window_remaining: U8F8,
    #[serde(with = "u1f15_bits")]
    charge_fraction: U1F15,
    #[serde(with = "u1f15_bits")]
    lone_wolf_pressure: U1F15,
}

fn to_u8f8(value: f32) -> U8F8 {
    if value.is_finite() {
        U8F8::saturating_from_num(value.max(0.0))
    } else {
        U8F8::ZERO
    }
}

fn to_fraction(value: f32) -> U1F15 {
    U1F15::saturating_from_num(clamp01(value))
}

impl DirectorSnapshot {
    /// Quantise a typed view.
    #[must_use]
    pub fn quantize(state: &SnapshotState) -> Self {
        let mut flags = 0;
        for (set, bit) in [
            (state.active, FLAG_ACTIVE),
            (state.assault, FLAG_ASSAULT),
            (state.breach, FLAG_BREACH),
            (state.mercy, FLAG_MERCY),
            (state.boss_gate, FLAG_BOSS_GATE),
            (state.reactive, FLAG_REACTIVE),
        ] {
            if set {
                flags |= bit;
            }
        }
        Self {
            flags,
            phase: state.phase.wire_id(),
            dominant_role: state.dominant_role.wire_id(),
            doctrine: state.doctrine.wire_id(),
            warning_a: state.warnings[0].wire_id(),
            warning_b: state.warnings[1].wire_id(),
            anomaly: state.anomaly.wire_id(),
            commander_count: state.commander_count,
            commander_mask: state.commander_mask,
            siege_tier: state.siege_tier,
            intensity: to_u8f8(state.intensity.min(100.0)),
            window_remaining: to_u8f8(state.window_remaining),
            charge_fraction: to_fraction(state.charge_fraction),
            lone_wolf_pressure: to_fraction(state.lone_wolf_pressure),
        }
    }

    /// Snapshot of a director with no stage session.
    #[must_use]
    pub fn inactive() -> Self {
        Self::quantize(&SnapshotState::default())
    }

    /// Expand back into a typed view. Fractions come back quantised.
    pub fn state(&self) -> Result<SnapshotState> {
        let bad = |what: &str, id: u8| DirectorError::SnapshotCodec(format!("unknown {what} id {id}"));
        Ok(SnapshotState {
            active: self.flags & FLAG_ACTIVE != 0,
            phase: CadencePhase::from_wire_id(self.phase).ok_or_else(|| bad("phase", self.phase))?,
            dominant_role: Role::from_wire_id(self.dominant_role),
            doctrine: DoctrineProfile::from_wire_id(self.doctrine).ok_or_else(|| bad("doctrine", self.doctrine))?,
            warnings: [
                Warning::from_wire_id(self.warning_a).ok_or_else(|| bad("warning", self.warning_a))?,
                Warning::from_wire_id(self.warning_b).ok_or_else(|| bad("warning", self.warning_b))?,
            ],
            anomaly: Anomaly::from_wire_id(self.anomaly).ok_or_else(|| bad("anomaly", self.anomaly))?,
            intensity: self.intensity.to_num(),
            charge_fraction: self.charge_fraction.to_num(),
            assault: self.flags & FLAG_ASSAULT != 0,
            breach: self.flags & FLAG_BREACH != 0,
            mercy: self.flags & FLAG_MERCY != 0,
            boss_gate: self.flags & FLAG_BOSS_GATE != 0,
            reactive: self.flags & FLAG_REACTIVE != 0,
            lone_wolf_pressure: self.lone_wolf_pressure.to_num(),
            window_remaining: self.window_remaining.to_num(),
            commander_count: self.commander_count,
            commander_mask: self.commander_mask,
            siege_tier: self.siege_tier,
        })
    }

    /// Phase id on the wire.
    #[must_use]
    pub fn phase_id(&self) -> u8 {
        self.phase
    }

    /// Intensity, quantised.
    #[must_use]
    pub fn intensity(&self) -> f32 {
        self.intensity.to_num()
    }

    /// Whether a stage session existed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.flags & FLAG_ACTIVE != 0
    }

    /// Encode to the fixed-size binary record.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| DirectorError::SnapshotCodec(format!("Failed to encode snapshot: {e}")))
    }

    /// Decode a record produced by [`Self::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SNAPSHOT_WIRE_SIZE {
            return Err(DirectorError::SnapshotCodec(format!(
                "Snapshot must be {SNAPSHOT_WIRE_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        bincode::deserialize(bytes).map_err(|e| DirectorError::SnapshotCodec(format!("Failed to decode snapshot: {e}")))
    }
}

impl Default for DirectorSnapshot {
    fn default() -> Self {
        Self::inactive()
    }
}

/// Serde support for `U8F8` as its raw bits.
mod u8f8_bits {
    use fixed::types::U8F8;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &U8F8, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_bits().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U8F8, D::Error> {
        Ok(U8F8::from_bits(u16::deserialize(deserializer)?))
    }
}

/// Serde support for `U1F15` as its raw bits.
mod u1f15_bits {
    use fixed::types::U1F15;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &U1F15, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_bits().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U1F15, D::Error> {
        Ok(U1F15::from_bits(u16::deserialize(deserializer)?))
    }
}

/// Fan-out of snapshots to observers.
///
/// Each subscription is a bounded channel. A slow observer loses frames
/// rather than stalling the tick; a dropped receiver is pruned on the next
/// publish. [`SnapshotHub::clear`] drops every sender, ending all
/// subscriptions at once.
#[derive(Debug)]
pub struct SnapshotHub {
    senders: Vec<Sender<DirectorSnapshot>>,
    capacity: usize,
}

impl SnapshotHub {
    /// Hub with the given per-observer buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register an observer. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<DirectorSnapshot> {
        let (sender, receiver) = bounded(self.capacity);
        self.senders.push(sender);
        receiver
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }

    /// Push a snapshot to every observer; returns how many received it.
    pub fn publish(&mut self, snapshot: DirectorSnapshot) -> usize {
        let mut delivered = 0;
        self.senders.retain(|sender| match sender.try_send(snapshot) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Snapshot observer disconnected");
                false
            }
        });
        delivered
    }

    /// End every subscription.
    pub fn clear(&mut self) {
        self.senders.clear();
    }
}

impl Default for SnapshotHub {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy_state() -> SnapshotState {
        SnapshotState {
            active: true,
            phase: CadencePhase::Breach,
            dominant_role: Role::Hunter,
            doctrine: DoctrineProfile::SiegeLine,
            warnings: [Warning::RangedEmphasis, Warning::ReinforcedBreach],
            anomaly: Anomaly::BreachStorm,
            intensity: 87.25,
            charge_fraction: 0.8,
            breach: true,
            reactive: true,
            lone_wolf_pressure: 0.5,
            window_remaining: 11.5,
            commander_count: 2,
            commander_mask: 0b0101,
            siege_tier: 3,
            ..SnapshotState::default()
        }
    }

    #[test]
    fn test_encoded_size_is_constant() {
        let a = DirectorSnapshot::inactive().encode().unwrap();
        let b = DirectorSnapshot::quantize(&busy_state()).encode().unwrap();
        assert_eq!(a.len(), SNAPSHOT_WIRE_SIZE);
        assert_eq!(b.len(), SNAPSHOT_WIRE_SIZE);
    }

    #[test]
    fn test_decode_restores_state() {
        let state = busy_state();
        let bytes = DirectorSnapshot::quantize(&state).encode().unwrap();
        let decoded = DirectorSnapshot::decode(&bytes).unwrap().state().unwrap();
        assert_eq!(decoded.phase, CadencePhase::Breach);
        assert_eq!(decoded.doctrine, DoctrineProfile::SiegeLine);
        assert_eq!(decoded.warnings, state.warnings);
        assert!(decoded.breach && decoded.reactive && decoded.active);
        assert!(!decoded.assault && !decoded.mercy);
        assert!((decoded.intensity - 87.25).abs() < 1.0 / 256.0);
        assert!((decoded.charge_fraction - 0.8).abs() < 1e-4);
        assert_eq!(decoded.commander_mask, 0b0101);
    }

    #[test]
    fn test_intensity_is_clamped() {
        let state = SnapshotState {
            intensity: 900.0,
            window_remaining: f32::NAN,
            ..SnapshotState::default()
        };
        let snap = DirectorSnapshot::quantize(&state);
        assert_eq!(snap.intensity(), 100.0);
        assert_eq!(snap.state().unwrap().window_remaining, 0.0);
    }

    #[test]
    fn test_decode_rejects_wrong_length_and_ids() {
        assert!(DirectorSnapshot::decode(&[0; 4]).is_err());
        let mut bytes = DirectorSnapshot::inactive().encode().unwrap();
        bytes[1] = 200;
        let snap = DirectorSnapshot::decode(&bytes).unwrap();
        assert!(snap.state().is_err());
    }

    #[test]
    fn test_hub_prunes_dropped_observers() {
        let mut hub = SnapshotHub::new(2);
        let keep = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone);
        assert_eq!(hub.publish(DirectorSnapshot::inactive()), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(keep.try_recv().ok(), Some(DirectorSnapshot::inactive()));
    }

    #[test]
    fn test_hub_drops_frames_for_slow_observer() {
        let mut hub = SnapshotHub::new(1);
        let rx = hub.subscribe();
        assert_eq!(hub.publish(DirectorSnapshot::inactive()), 1);
        assert_eq!(hub.publish(DirectorSnapshot::inactive()), 0);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_clear_disconnects_observers() {
        let mut hub = SnapshotHub::default();
        let rx = hub.subscribe();
        hub.clear();
        assert!(rx.recv().is_err());
    }
}
