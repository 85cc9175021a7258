use serde::{Deserialize, Serialize};
use std::fmt;

///
/// IndexState
///
/// Lifecycle of one index: `Building -> Ready -> Deleting -> (removed)`.
/// Only `Ready` indexes serve lookups and per-record maintenance.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexState {
    Building,
    Ready,
    Deleting,
}

impl IndexState {
    /// Persisted minor-path segment.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Building => "BUILDING",
            Self::Ready => "READY",
            Self::Deleting => "DELETING",
        }
    }

    #[must_use]
    pub fn parse(segment: &str) -> Option<Self> {
        match segment {
            "BUILDING" => Some(Self::Building),
            "READY" => Some(Self::Ready),
            "DELETING" => Some(Self::Deleting),
            _ => None,
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Building, Self::Ready) | (Self::Ready, Self::Deleting)
        )
    }

    /// Later lifecycle stages win when two records for one index coexist.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Building => 0,
            Self::Ready => 1,
            Self::Deleting => 2,
        }
    }

    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_transitions_are_legal() {
        use IndexState::{Building, Deleting, Ready};

        assert!(Building.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Deleting));

        for (from, to) in [
            (Building, Deleting),
            (Ready, Building),
            (Deleting, Ready),
            (Deleting, Building),
            (Ready, Ready),
        ] {
            assert!(!from.can_transition_to(to), "{from} -> {to}");
        }
    }

    #[test]
    fn segment_round_trips() {
        for state in [
            IndexState::Building,
            IndexState::Ready,
            IndexState::Deleting,
        ] {
            assert_eq!(IndexState::parse(state.as_str()), Some(state));
        }
        assert_eq!(IndexState::parse("ready"), None);
    }
}
