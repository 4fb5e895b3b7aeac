//! Timed-effect capability table.
//!
//! Content sets differ in which timed effects exist. Rather than probing the
//! host every time an aura fires, the director resolves one table when it is
//! constructed: each requested [`BuffKind`] maps to the kind actually applied,
//! following a fixed fallback chain, or to nothing.

use serde::{Deserialize, Serialize};

/// Number of [`BuffKind`] variants.
pub const BUFF_KIND_COUNT: usize = 6;

/// Timed effects the director can request on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BuffKind {
    /// Movement and attack speed.
    Haste,
    /// Damage reduction.
    Armor,
    /// Outgoing damage.
    Damage,
    /// Strong short-lived offensive buff.
    Enrage,
    /// Attacks slow their targets.
    SlowingRounds,
    /// Regeneration over time.
    Regeneration,
}

impl BuffKind {
    /// Every kind, in table order.
    pub const ALL: [BuffKind; BUFF_KIND_COUNT] = [
        BuffKind::Haste,
        BuffKind::Armor,
        BuffKind::Damage,
        BuffKind::Enrage,
        BuffKind::SlowingRounds,
        BuffKind::Regeneration,
    ];

    const fn index(self) -> usize {
        match self {
            BuffKind::Haste => 0,
            BuffKind::Armor => 1,
            BuffKind::Damage => 2,
            BuffKind::Enrage => 3,
            BuffKind::SlowingRounds => 4,
            BuffKind::Regeneration => 5,
        }
    }

    /// Substitute to try when this kind is unavailable.
    #[must_use]
    pub const fn fallback(self) -> Option<BuffKind> {
        match self {
            BuffKind::Enrage => Some(BuffKind::Damage),
            BuffKind::Regeneration => Some(BuffKind::Armor),
            BuffKind::Haste | BuffKind::Armor | BuffKind::Damage | BuffKind::SlowingRounds => None,
        }
    }
}

/// Resolved mapping from requested effect to applied effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuffCapabilities {
    resolved: [Option<BuffKind>; BUFF_KIND_COUNT],
}

impl BuffCapabilities {
    /// Resolve the table from a support predicate, walking fallback chains.
    pub fn resolve<F>(supported: F) -> Self
    where
        F: Fn(BuffKind) -> bool,
    {
        let mut resolved = [None; BUFF_KIND_COUNT];
        for kind in BuffKind::ALL {
            let mut candidate = Some(kind);
            while let Some(c) = candidate {
                if supported(c) {
                    break;
                }
                candidate = c.fallback();
            }
            resolved[kind.index()] = candidate;
            if candidate != Some(kind) {
                tracing::debug!(requested = ?kind, applied = ?candidate, "Buff capability substituted");
            }
        }
        Self { resolved }
    }

    /// A table where every kind is supported as-is.
    #[must_use]
    pub fn all() -> Self {
        Self::resolve(|_| true)
    }

    /// The kind to apply for a request, if any.
    #[must_use]
    pub fn get(&self, requested: BuffKind) -> Option<BuffKind> {
        self.resolved[requested.index()]
    }
}

impl Default for BuffCapabilities {
    fn default() -> Self {
        Self::all()
    }
}
