//! Role tags attached to spawned units.
//!
//! A role is assigned once, at spawn time, and decides which steering rule
//! the unit follows for the rest of its life.

use serde::{Deserialize, Serialize};

/// Number of behavioural roles (everything except [`Role::None`]).
pub const ROLE_COUNT: usize = 6;

/// Behavioural tag for a spawned unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    /// Pushes onto the objective.
    Contester,
    /// Peels onto wounded or isolated players.
    Peeler,
    /// Holds a ring band around the objective.
    Artillery,
    /// Circles to the far side of the objective before converging.
    Flanker,
    /// Chases the current squad target.
    Hunter,
    /// Holds a point offset from the objective.
    Anchor,
    /// No role; falls back to holding the objective.
    #[default]
    None,
}

impl Role {
    /// Every role that carries a threat signal, in table order.
    pub const TAGGED: [Role; ROLE_COUNT] = [
        Role::Contester,
        Role::Peeler,
        Role::Artillery,
        Role::Flanker,
        Role::Hunter,
        Role::Anchor,
    ];

    /// Roles eligible for the third "support" pulse of an assault.
    pub const SUPPORT: [Role; 4] = [Role::Flanker, Role::Hunter, Role::Artillery, Role::Peeler];

    /// Index into per-role tables, `None` for [`Role::None`].
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Role::Contester => Some(0),
            Role::Peeler => Some(1),
            Role::Artillery => Some(2),
            Role::Flanker => Some(3),
            Role::Hunter => Some(4),
            Role::Anchor => Some(5),
            Role::None => None,
        }
    }

    /// Compact wire id.
    #[must_use]
    pub const fn wire_id(self) -> u8 {
        match self.index() {
            Some(i) => i as u8,
            None => ROLE_COUNT as u8,
        }
    }

    /// Inverse of [`Role::wire_id`]; unknown ids decode to [`Role::None`].
    #[must_use]
    pub fn from_wire_id(id: u8) -> Self {
        Self::TAGGED.get(id as usize).copied().unwrap_or(Role::None)
    }

    /// Short lowercase name for logs and reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Role::Contester => "contester",
            Role::Peeler => "peeler",
            Role::Artillery => "artillery",
            Role::Flanker => "flanker",
            Role::Hunter => "hunter",
            Role::Anchor => "anchor",
            Role::None => "none",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_ids_round_trip() {
        for role in Role::TAGGED {
            assert_eq!(Role::from_wire_id(role.wire_id()), role);
        }
        assert_eq!(Role::from_wire_id(Role::None.wire_id()), Role::None);
        assert_eq!(Role::from_wire_id(200), Role::None);
    }

    #[test]
    fn test_support_roles_are_tagged() {
        for role in Role::SUPPORT {
            assert!(role.index().is_some());
        }
    }
}
