//! Doctrines, warnings and anomalies.
//!
//! An [`OperationRoll`] is the stage's strategic posture: one doctrine, two
//! distinct warnings and one anomaly. Each piece contributes to a set of
//! [`CadenceModifiers`] and carries the affinity and adaptation coefficient
//! tables the selector weighs candidates with.
//!
//! The numbers are tuning, not derived values. What matters is their relative
//! size: a +0.8 affinity makes an item roughly twice as likely as a neutral one
//! before the selector clamps.

use serde::{Deserialize, Serialize};

use crate::capabilities::BuffKind;
use crate::roles::Role;

/// Number of doctrine profiles.
pub const DOCTRINE_COUNT: usize = 6;
/// Number of warnings.
pub const WARNING_COUNT: usize = 12;
/// Number of anomalies.
pub const ANOMALY_COUNT: usize = 8;

/// Linear coefficients on the four run-level signals
/// (damage, contest, solo, breach).
pub type SignalCoefficients = [f32; 4];

/// Strategic bias applied for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DoctrineProfile {
    /// Even mix; always used on the first stage.
    #[default]
    Balanced,
    /// Fast, frequent pushes.
    Blitz,
    /// Ranged pressure and heavy breaches.
    SiegeLine,
    /// Surround the objective from the far side.
    Encirclement,
    /// Long assaults that grind players down.
    Attrition,
    /// Pick off isolated players.
    HunterKiller,
}

impl DoctrineProfile {
    /// Every doctrine, in table order.
    pub const ALL: [DoctrineProfile; DOCTRINE_COUNT] = [
        DoctrineProfile::Balanced,
        DoctrineProfile::Blitz,
        DoctrineProfile::SiegeLine,
        DoctrineProfile::Encirclement,
        DoctrineProfile::Attrition,
        DoctrineProfile::HunterKiller,
    ];

    /// Compact wire id.
    #[must_use]
    pub fn wire_id(self) -> u8 {
        Self::ALL.iter().position(|d| *d == self).unwrap_or(0) as u8
    }

    /// Inverse of [`Self::wire_id`].
    #[must_use]
    pub fn from_wire_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Dominant-role rotation used during assaults.
    #[must_use]
    pub const fn rotation(self) -> &'static [Role] {
        match self {
            Self::Balanced => &[Role::Contester, Role::Flanker, Role::Artillery, Role::Peeler],
            Self::Blitz => &[Role::Contester, Role::Hunter, Role::Flanker],
            Self::SiegeLine => &[Role::Artillery, Role::Anchor, Role::Contester],
            Self::Encirclement => &[Role::Flanker, Role::Contester, Role::Hunter],
            Self::Attrition => &[Role::Artillery, Role::Peeler, Role::Anchor],
            Self::HunterKiller => &[Role::Hunter, Role::Flanker, Role::Peeler],
        }
    }

    /// Cadence contribution.
    #[must_use]
    pub fn modifiers(self) -> CadenceModifiers {
        let base = CadenceModifiers::NEUTRAL;
        match self {
            Self::Balanced => base,
            Self::Blitz => CadenceModifiers {
                breather_add: -3.0,
                pulse_add: -0.8,
                count_bonus: 1,
                heavy_add: -0.03,
                breach_mult: 1.1,
                ..base
            },
            Self::SiegeLine => CadenceModifiers {
                breather_add: 2.0,
                assault_add: 5.0,
                pulse_add: 0.5,
                heavy_add: 0.08,
                breach_mult: 1.35,
                ..base
            },
            Self::Encirclement => CadenceModifiers {
                pulse_add: -0.3,
                count_bonus: 1,
                ..base
            },
            Self::Attrition => CadenceModifiers {
                breather_add: -1.0,
                assault_add: 8.0,
                pulse_add: 0.6,
                heavy_add: 0.04,
                breach_mult: 0.8,
                ..base
            },
            Self::HunterKiller => CadenceModifiers {
                breather_add: 1.0,
                pulse_add: -0.5,
                breach_mult: 1.15,
                ..base
            },
        }
    }

    /// Adaptation coefficients on (damage, contest, solo, breach).
    ///
    /// Balanced gains weight when players are getting hurt; Blitz and
    /// HunterKiller gain weight when players are comfortable or spread out.
    #[must_use]
    pub const fn signal_coefficients(self) -> SignalCoefficients {
        match self {
            Self::Balanced => [0.6, 0.0, 0.0, -0.2],
            Self::Blitz => [-0.5, 0.3, 0.0, 0.2],
            Self::SiegeLine => [-0.2, 0.6, 0.0, -0.3],
            Self::Encirclement => [-0.2, 0.2, 0.4, 0.0],
            Self::Attrition => [0.2, 0.4, -0.2, 0.3],
            Self::HunterKiller => [-0.3, 0.0, 0.8, 0.0],
        }
    }

    /// Affinity bonus for a warning under this doctrine.
    #[must_use]
    pub const fn warning_affinity(self, warning: Warning) -> f32 {
        use Warning as W;
        match (self, warning) {
            (Self::Balanced, W::SuppressionVolleys | W::MedicCorps) => 0.4,
            (Self::Blitz, W::RapidDeployment | W::PincerTiming) => 0.8,
            (Self::Blitz, W::AttritionRounds) => -0.4,
            (Self::SiegeLine, W::RangedEmphasis | W::ArmoredVanguard) => 0.8,
            (Self::SiegeLine, W::ReinforcedBreach) => 0.5,
            (Self::SiegeLine, W::RapidDeployment) => -0.4,
            (Self::Encirclement, W::FlankingScreens | W::PincerTiming) => 0.8,
            (Self::Encirclement, W::ArmoredVanguard) => -0.4,
            (Self::Attrition, W::AttritionRounds | W::SlowingFire) => 0.8,
            (Self::Attrition, W::MedicCorps) => 0.4,
            (Self::Attrition, W::RapidDeployment) => -0.4,
            (Self::HunterKiller, W::HunterPacks | W::FlankingScreens) => 0.8,
            (Self::HunterKiller, W::ShieldedCommanders) => -0.4,
            _ => 0.0,
        }
    }

    /// Affinity bonus for an anomaly under this doctrine.
    #[must_use]
    pub const fn anomaly_affinity(self, anomaly: Anomaly) -> f32 {
        use Anomaly as A;
        match (self, anomaly) {
            (Self::Balanced, A::Stillness) => 0.5,
            (Self::Blitz, A::Surge) => 0.8,
            (Self::Blitz, A::LongDusk) => -0.4,
            (Self::SiegeLine, A::BreachStorm | A::Veterans) => 0.6,
            (Self::Encirclement, A::FalseLull) => 0.6,
            (Self::Attrition, A::LongDusk | A::Scarcity) => 0.5,
            (Self::HunterKiller, A::CommandSurplus) => 0.6,
            _ => 0.0,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Blitz => "blitz",
            Self::SiegeLine => "siege_line",
            Self::Encirclement => "encirclement",
            Self::Attrition => "attrition",
            Self::HunterKiller => "hunter_killer",
        }
    }
}

/// Secondary modifier; two distinct warnings are active per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Warning {
    /// More heavies up front.
    ArmoredVanguard,
    /// Artillery-heavy support pulses.
    RangedEmphasis,
    /// Flankers favoured.
    FlankingScreens,
    /// Hunters favoured.
    HunterPacks,
    /// Spawned units slow their targets.
    SlowingFire,
    /// Shorter pulse intervals.
    RapidDeployment,
    /// Breaches trigger more often.
    ReinforcedBreach,
    /// Commanders spawn armored.
    ShieldedCommanders,
    /// Longer assaults.
    AttritionRounds,
    /// Shorter breathers.
    PincerTiming,
    /// Larger batches.
    SuppressionVolleys,
    /// Peelers favoured; units spawn regenerating.
    MedicCorps,
}

impl Warning {
    /// Every warning, in table order.
    pub const ALL: [Warning; WARNING_COUNT] = [
        Warning::ArmoredVanguard,
        Warning::RangedEmphasis,
        Warning::FlankingScreens,
        Warning::HunterPacks,
        Warning::SlowingFire,
        Warning::RapidDeployment,
        Warning::ReinforcedBreach,
        Warning::ShieldedCommanders,
        Warning::AttritionRounds,
        Warning::PincerTiming,
        Warning::SuppressionVolleys,
        Warning::MedicCorps,
    ];

    /// Compact wire id.
    #[must_use]
    pub fn wire_id(self) -> u8 {
        Self::ALL.iter().position(|w| *w == self).unwrap_or(0) as u8
    }

    /// Inverse of [`Self::wire_id`].
    #[must_use]
    pub fn from_wire_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Cadence contribution.
    #[must_use]
    pub fn modifiers(self) -> CadenceModifiers {
        let base = CadenceModifiers::NEUTRAL;
        match self {
            Self::ArmoredVanguard => CadenceModifiers { heavy_add: 0.08, ..base },
            Self::RapidDeployment => CadenceModifiers { pulse_add: -0.7, ..base },
            Self::ReinforcedBreach => CadenceModifiers { breach_mult: 1.4, ..base },
            Self::AttritionRounds => CadenceModifiers { assault_add: 6.0, ..base },
            Self::PincerTiming => CadenceModifiers { breather_add: -2.0, ..base },
            Self::SuppressionVolleys => CadenceModifiers { count_bonus: 1, ..base },
            Self::RangedEmphasis
            | Self::FlankingScreens
            | Self::HunterPacks
            | Self::SlowingFire
            | Self::ShieldedCommanders
            | Self::MedicCorps => base,
        }
    }

    /// Role this warning pushes support pulses toward.
    #[must_use]
    pub const fn favored_role(self) -> Option<Role> {
        match self {
            Self::ArmoredVanguard => Some(Role::Contester),
            Self::RangedEmphasis => Some(Role::Artillery),
            Self::FlankingScreens => Some(Role::Flanker),
            Self::HunterPacks => Some(Role::Hunter),
            Self::MedicCorps => Some(Role::Peeler),
            _ => None,
        }
    }

    /// Timed effect attached to every unit spawned while this warning is active.
    #[must_use]
    pub const fn spawn_buff(self) -> Option<BuffKind> {
        match self {
            Self::SlowingFire => Some(BuffKind::SlowingRounds),
            Self::MedicCorps => Some(BuffKind::Regeneration),
            _ => None,
        }
    }

    /// Timed effect attached to commanders while this warning is active.
    #[must_use]
    pub const fn commander_buff(self) -> Option<BuffKind> {
        match self {
            Self::ShieldedCommanders => Some(BuffKind::Armor),
            _ => None,
        }
    }

    /// Adaptation coefficients on (damage, contest, solo, breach).
    #[must_use]
    pub const fn signal_coefficients(self) -> SignalCoefficients {
        match self {
            Self::ArmoredVanguard => [-0.3, 0.5, 0.0, 0.0],
            Self::RangedEmphasis => [-0.2, 0.3, 0.0, 0.0],
            Self::FlankingScreens => [0.0, 0.2, 0.4, 0.0],
            Self::HunterPacks => [-0.2, 0.0, 0.7, 0.0],
            Self::SlowingFire => [-0.4, 0.0, 0.3, 0.0],
            Self::RapidDeployment => [-0.5, 0.0, 0.0, 0.2],
            Self::ReinforcedBreach => [-0.2, 0.0, 0.0, -0.6],
            Self::ShieldedCommanders => [-0.3, 0.0, 0.0, 0.0],
            Self::AttritionRounds => [-0.4, 0.3, 0.0, 0.0],
            Self::PincerTiming => [-0.3, 0.0, 0.2, 0.0],
            Self::SuppressionVolleys => [-0.2, 0.2, 0.0, 0.2],
            Self::MedicCorps => [0.4, 0.0, 0.0, 0.0],
        }
    }
}

/// Rare stage-wide twist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anomaly {
    /// The first breather of the charge event may become a long false lull.
    FalseLull,
    /// Faster pulses and bigger batches.
    Surge,
    /// Longer breathers.
    LongDusk,
    /// More heavies.
    Veterans,
    /// One more commander at stage start.
    CommandSurplus,
    /// Smaller batches.
    Scarcity,
    /// Breaches trigger far more often.
    BreachStorm,
    /// No effect.
    Stillness,
}

impl Anomaly {
    /// Every anomaly, in table order.
    pub const ALL: [Anomaly; ANOMALY_COUNT] = [
        Anomaly::FalseLull,
        Anomaly::Surge,
        Anomaly::LongDusk,
        Anomaly::Veterans,
        Anomaly::CommandSurplus,
        Anomaly::Scarcity,
        Anomaly::BreachStorm,
        Anomaly::Stillness,
    ];

    /// Compact wire id.
    #[must_use]
    pub fn wire_id(self) -> u8 {
        Self::ALL.iter().position(|a| *a == self).unwrap_or(0) as u8
    }

    /// Inverse of [`Self::wire_id`].
    #[must_use]
    pub fn from_wire_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Cadence contribution.
    #[must_use]
    pub fn modifiers(self) -> CadenceModifiers {
        let base = CadenceModifiers::NEUTRAL;
        match self {
            Self::FalseLull => CadenceModifiers { false_lull_chance: 0.5, ..base },
            Self::Surge => CadenceModifiers {
                pulse_add: -1.0,
                count_bonus: 1,
                ..base
            },
            Self::LongDusk => CadenceModifiers { breather_add: 4.0, ..base },
            Self::Veterans => CadenceModifiers { heavy_add: 0.12, ..base },
            Self::CommandSurplus => CadenceModifiers { commander_bonus: 1, ..base },
            Self::Scarcity => CadenceModifiers { count_bonus: -1, ..base },
            Self::BreachStorm => CadenceModifiers { breach_mult: 1.6, ..base },
            Self::Stillness => base,
        }
    }

    /// Adaptation coefficients on (damage, contest, solo, breach).
    #[must_use]
    pub const fn signal_coefficients(self) -> SignalCoefficients {
        match self {
            Self::FalseLull => [0.0, 0.0, 0.3, 0.0],
            Self::Surge => [-0.5, 0.2, 0.0, 0.0],
            Self::LongDusk => [0.5, 0.0, 0.0, 0.0],
            Self::Veterans => [-0.3, 0.3, 0.0, 0.0],
            Self::CommandSurplus => [-0.2, 0.0, 0.2, 0.0],
            Self::Scarcity => [0.6, 0.0, 0.0, 0.0],
            Self::BreachStorm => [-0.3, 0.0, 0.0, -0.5],
            Self::Stillness => [0.3, 0.0, 0.0, 0.0],
        }
    }
}

/// Combined effect of an operation roll on pacing.
///
/// Additive terms sum across contributors; multiplicative terms multiply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CadenceModifiers {
    /// Seconds added to breather duration.
    pub breather_add: f32,
    /// Seconds added to assault duration.
    pub assault_add: f32,
    /// Seconds added to pulse interval.
    pub pulse_add: f32,
    /// Units added to each batch (may be negative).
    pub count_bonus: i32,
    /// Added to heavy chance.
    pub heavy_add: f32,
    /// Breach rate multiplier.
    pub breach_mult: f32,
    /// Chance that the first breather of an event becomes a false lull.
    pub false_lull_chance: f32,
    /// Extra commanders at stage start.
    pub commander_bonus: u32,
}

impl CadenceModifiers {
    /// No effect.
    pub const NEUTRAL: Self = Self {
        breather_add: 0.0,
        assault_add: 0.0,
        pulse_add: 0.0,
        count_bonus: 0,
        heavy_add: 0.0,
        breach_mult: 1.0,
        false_lull_chance: 0.0,
        commander_bonus: 0,
    };

    /// Stack another contributor on top of this one.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        Self {
            breather_add: self.breather_add + other.breather_add,
            assault_add: self.assault_add + other.assault_add,
            pulse_add: self.pulse_add + other.pulse_add,
            count_bonus: self.count_bonus + other.count_bonus,
            heavy_add: self.heavy_add + other.heavy_add,
            breach_mult: self.breach_mult * other.breach_mult,
            false_lull_chance: 1.0 - (1.0 - self.false_lull_chance) * (1.0 - other.false_lull_chance),
            commander_bonus: self.commander_bonus + other.commander_bonus,
        }
    }
}

impl Default for CadenceModifiers {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// The stage's strategic posture. `warning_a != warning_b` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationRoll {
    doctrine: DoctrineProfile,
    warning_a: Warning,
    warning_b: Warning,
    anomaly: Anomaly,
}

impl OperationRoll {
    /// Build a roll; `None` if the two warnings are equal.
    #[must_use]
    pub fn new(
        doctrine: DoctrineProfile,
        warning_a: Warning,
        warning_b: Warning,
        anomaly: Anomaly,
    ) -> Option<Self> {
        (warning_a != warning_b).then_some(Self {
            doctrine,
            warning_a,
            warning_b,
            anomaly,
        })
    }

    /// The posture used before any roll has happened.
    #[must_use]
    pub const fn baseline() -> Self {
        Self {
            doctrine: DoctrineProfile::Balanced,
            warning_a: Warning::SuppressionVolleys,
            warning_b: Warning::MedicCorps,
            anomaly: Anomaly::Stillness,
        }
    }

    /// Doctrine.
    #[must_use]
    pub const fn doctrine(&self) -> DoctrineProfile {
        self.doctrine
    }

    /// First warning.
    #[must_use]
    pub const fn warning_a(&self) -> Warning {
        self.warning_a
    }

    /// Second warning.
    #[must_use]
    pub const fn warning_b(&self) -> Warning {
        self.warning_b
    }

    /// Both warnings.
    #[must_use]
    pub const fn warnings(&self) -> [Warning; 2] {
        [self.warning_a, self.warning_b]
    }

    /// Anomaly.
    #[must_use]
    pub const fn anomaly(&self) -> Anomaly {
        self.anomaly
    }

    /// Whether either warning is `warning`.
    #[must_use]
    pub fn has_warning(&self, warning: Warning) -> bool {
        self.warning_a == warning || self.warning_b == warning
    }

    /// Combined cadence modifiers of all four parts.
    #[must_use]
    pub fn modifiers(&self) -> CadenceModifiers {
        self.doctrine
            .modifiers()
            .combine(self.warning_a.modifiers())
            .combine(self.warning_b.modifiers())
            .combine(self.anomaly.modifiers())
    }

    /// Timed effects to attach to each newly spawned unit.
    pub fn spawn_buffs(&self) -> impl Iterator<Item = BuffKind> {
        self.warnings().into_iter().filter_map(Warning::spawn_buff)
    }

    /// Timed effects to attach to each newly spawned commander.
    pub fn commander_buffs(&self) -> impl Iterator<Item = BuffKind> {
        self.warnings().into_iter().filter_map(Warning::commander_buff)
    }
}

impl Default for OperationRoll {
    fn default() -> Self {
        Self::baseline()
    }
}
