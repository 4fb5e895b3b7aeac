//! Inbound lifecycle events.
//!
//! The host forwards these to [`crate::Director::handle_hook`]. They may
//! arrive in any order; a hook that makes no sense in the current phase is
//! logged and ignored.

use serde::{Deserialize, Serialize};

use crate::host::{PlayerId, UnitId};
use crate::math::Vec2;

/// Parameters of a new stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageInfo {
    /// Zero-based stage number within the run.
    pub stage_index: u32,
    /// Difficulty coefficient; 1.0 is baseline.
    pub difficulty: f32,
    /// Positions commanders are anchored to.
    pub command_zones: Vec<Vec2>,
}

impl StageInfo {
    /// Stage with no command zones.
    #[must_use]
    pub fn new(stage_index: u32, difficulty: f32) -> Self {
        Self {
            stage_index,
            difficulty,
            command_zones: Vec::new(),
        }
    }

    /// Add command zones.
    #[must_use]
    pub fn with_command_zones(mut self, zones: impl IntoIterator<Item = Vec2>) -> Self {
        self.command_zones.extend(zones);
        self
    }
}

/// Lifecycle events the director reacts to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hook {
    /// A new run begins; reseeds the director.
    RunStart {
        /// Seed for every random decision in the run.
        seed: u64,
    },
    /// The run is over.
    RunEnd,
    /// A new stage begins.
    StageStart(StageInfo),
    /// The objective charge event started.
    ChargeBegin,
    /// The objective finished charging.
    ChargeCharged,
    /// The charge event ended, successfully or not.
    ChargeFinish,
    /// Damage landed somewhere.
    DamageDealt {
        /// Unit that dealt it, if known.
        attacker: Option<UnitId>,
        /// Player who took it, if a player did.
        victim: Option<PlayerId>,
        /// Damage amount.
        amount: f32,
    },
    /// Something was healed.
    UnitHealed {
        /// Player healed, if a player was.
        player: Option<PlayerId>,
        /// Amount restored.
        amount: f32,
    },
    /// A player died.
    PlayerDeath {
        /// Who died.
        player: PlayerId,
    },
}

impl Hook {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunStart { .. } => "run_start",
            Self::RunEnd => "run_end",
            Self::StageStart(_) => "stage_start",
            Self::ChargeBegin => "charge_begin",
            Self::ChargeCharged => "charge_charged",
            Self::ChargeFinish => "charge_finish",
            Self::DamageDealt { .. } => "damage_dealt",
            Self::UnitHealed { .. } => "unit_healed",
            Self::PlayerDeath { .. } => "player_death",
        }
    }
}
