//! Mercy windows and lone-wolf pressure.

use rand::Rng;

use crate::config::FairnessTuning;
use crate::host::{alive_players, ObjectiveView, PlayerView};
use crate::math::clamp01;

/// Pressure-relief state for one stage.
///
/// The mercy cooldown survives phase changes; only a stage reset clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FairnessState {
    mercy_timer: f32,
    mercy_cooldown: f32,
    lone_wolf_pressure: f32,
}

impl FairnessState {
    /// Fresh state: no mercy, no cooldown, no pressure.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a mercy window is open.
    #[must_use]
    pub fn mercy_active(&self) -> bool {
        self.mercy_timer > 0.0
    }

    /// Seconds left in the mercy window.
    #[must_use]
    pub fn mercy_timer(&self) -> f32 {
        self.mercy_timer
    }

    /// Seconds until mercy may trigger again.
    #[must_use]
    pub fn mercy_cooldown(&self) -> f32 {
        self.mercy_cooldown
    }

    /// Smoothed lone-wolf pressure in `[0, 1]`.
    #[must_use]
    pub fn lone_wolf_pressure(&self) -> f32 {
        self.lone_wolf_pressure
    }

    /// React to a player death. Returns whether a mercy window opened.
    pub fn on_player_death<R: Rng + ?Sized>(&mut self, tuning: &FairnessTuning, rng: &mut R) -> bool {
        if self.mercy_cooldown > 0.0 {
            tracing::debug!(cooldown = self.mercy_cooldown, "Mercy on cooldown");
            return false;
        }
        self.mercy_timer = tuning.mercy_duration.sample(rng);
        self.mercy_cooldown = self.mercy_timer + tuning.mercy_cooldown_extra.sample(rng);
        tracing::info!(
            window = self.mercy_timer,
            cooldown = self.mercy_cooldown,
            "Mercy window opened"
        );
        true
    }

    /// Advance timers and re-smooth lone-wolf pressure.
    pub fn tick(
        &mut self,
        dt: f32,
        tuning: &FairnessTuning,
        players: &[PlayerView],
        objective: Option<&ObjectiveView>,
    ) {
        self.mercy_timer = (self.mercy_timer - dt).max(0.0);
        self.mercy_cooldown = (self.mercy_cooldown - dt).max(0.0);

        let raw = raw_lone_wolf_pressure(players, objective, tuning.defend_radius_scale);
        let alpha = if tuning.lone_wolf_smoothing > 0.0 {
            1.0 - (-dt / tuning.lone_wolf_smoothing).exp()
        } else {
            1.0
        };
        self.lone_wolf_pressure = clamp01(self.lone_wolf_pressure + (raw - self.lone_wolf_pressure) * alpha);
    }
}

/// `1 - defenders / alive`, zero without living players or a valid objective.
#[must_use]
pub fn raw_lone_wolf_pressure(
    players: &[PlayerView],
    objective: Option<&ObjectiveView>,
    defend_radius_scale: f32,
) -> f32 {
    let Some(objective) = objective.filter(|o| o.zone_valid) else {
        return 0.0;
    };
    let radius = objective.radius * defend_radius_scale;
    let radius_sq = radius * radius;
    let (alive, defenders) = alive_players(players).fold((0_u32, 0_u32), |(a, d), p| {
        let defending = p.position.distance_squared(objective.position) <= radius_sq;
        (a + 1, d + u32::from(defending))
    });
    if alive == 0 {
        0.0
    } else {
        clamp01(1.0 - defenders as f32 / alive as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PlayerId;
    use crate::math::Vec2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn objective() -> ObjectiveView {
        ObjectiveView {
            position: Vec2::ZERO,
            radius: 10.0,
            charge_fraction: 0.3,
            zone_valid: true,
        }
    }

    fn player(id: u32, x: f32) -> PlayerView {
        PlayerView {
            id: PlayerId(id),
            position: Vec2::new(x, 0.0),
            health_fraction: 1.0,
            alive: true,
        }
    }

    #[test]
    fn test_mercy_trigger_and_cooldown() {
        let tuning = FairnessTuning::default();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut state = FairnessState::new();

        assert!(state.on_player_death(&tuning, &mut rng));
        assert!(state.mercy_timer() > 0.0);
        assert!(state.mercy_cooldown() >= state.mercy_timer() + 2.0);

        let before = state.clone();
        assert!(!state.on_player_death(&tuning, &mut rng));
        assert_eq!(state, before);
    }

    #[test]
    fn test_mercy_rearms_after_cooldown() {
        let tuning = FairnessTuning::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut state = FairnessState::new();
        state.on_player_death(&tuning, &mut rng);
        for _ in 0..(20 * 20) {
            state.tick(0.05, &tuning, &[], None);
        }
        assert!(!state.mercy_active());
        assert_eq!(state.mercy_cooldown(), 0.0);
        assert!(state.on_player_death(&tuning, &mut rng));
    }

    #[test]
    fn test_raw_lone_wolf_pressure() {
        let players = [player(1, 0.0), player(2, 50.0), player(3, 60.0), player(4, 70.0)];
        let obj = objective();
        assert!((raw_lone_wolf_pressure(&players, Some(&obj), 1.5) - 0.75).abs() < 1e-6);
        assert_eq!(raw_lone_wolf_pressure(&players, None, 1.5), 0.0);
        assert_eq!(raw_lone_wolf_pressure(&[], Some(&obj), 1.5), 0.0);
    }

    #[test]
    fn test_lone_wolf_smoothing_converges() {
        let tuning = FairnessTuning::default();
        let players = [player(1, 0.0), player(2, 80.0)];
        let obj = objective();
        let mut state = FairnessState::new();
        state.tick(0.05, &tuning, &players, Some(&obj));
        assert!(state.lone_wolf_pressure() < 0.1);
        for _ in 0..2000 {
            state.tick(0.05, &tuning, &players, Some(&obj));
        }
        assert!((state.lone_wolf_pressure() - 0.5).abs() < 1e-3);
    }
}
