//! # Director Core
//!
//! Adaptive encounter director: paces procedurally generated combat
//! encounters from a server-authoritative fixed-tick loop.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No IO (config loading aside)
//! - No wall clock
//! - No system randomness (one seeded `ChaCha8Rng` per run)
//!
//! The host owns the combat simulation and talks to the director through the
//! [`host::World`] and [`host::SpawnPoolProvider`] traits, plus lifecycle
//! [`hooks::Hook`]s. Observers receive compact [`snapshot::DirectorSnapshot`]s.
//!
//! ## Crate Structure
//!
//! - [`director`] - Orchestrator and tick loop
//! - [`cadence`] - Stage pacing state machine
//! - [`selector`] / [`operation`] - Doctrine and modifier rolls
//! - [`adaptation`] - Run-level learned signals
//! - [`commander`] - Persistent elite anchors
//! - [`steering`] - Per-role desired velocity
//! - [`fairness`] - Mercy windows and lone-wolf pressure
//! - [`spawn`] - Batch execution and spawn credit
//! - [`snapshot`] - Observer records and fan-out

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod adaptation;
pub mod cadence;
pub mod capabilities;
pub mod commander;
pub mod config;
pub mod director;
pub mod error;
pub mod fairness;
pub mod hooks;
pub mod host;
pub mod math;
pub mod operation;
pub mod roles;
pub mod selector;
pub mod session;
pub mod snapshot;
pub mod spawn;
pub mod steering;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adaptation::{RunAdaptationState, Signal, StageTelemetry};
    pub use crate::cadence::CadencePhase;
    pub use crate::capabilities::{BuffCapabilities, BuffKind};
    pub use crate::commander::{CommanderKind, CommanderResponse};
    pub use crate::config::DirectorConfig;
    pub use crate::director::{DefeatReport, Director, TickEvents};
    pub use crate::error::{DirectorError, Result};
    pub use crate::hooks::{Hook, StageInfo};
    pub use crate::host::{
        ContestWeight, DamageFlags, NoContest, ObjectiveView, PlayerId, PlayerView, PoolCategory, SpawnOptions,
        SpawnPoolProvider, Team, UnitId, UnitTemplate, World,
    };
    pub use crate::math::Vec2;
    pub use crate::operation::{Anomaly, DoctrineProfile, OperationRoll, Warning};
    pub use crate::roles::Role;
    pub use crate::snapshot::{DirectorSnapshot, SnapshotState};
}
