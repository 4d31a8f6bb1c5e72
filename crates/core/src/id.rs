//! Unique identifiers for Kaizen records.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Ulid);

        impl $name {
            /// Generate a new identifier
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

ulid_id!(
    /// Unique identifier for a candidate within one GRPO round
    CandidateId
);

ulid_id!(
    /// Unique identifier for a persisted GRPO round
    RoundId
);

ulid_id!(
    /// Unique identifier for a self evaluation
    EvaluationId
);

ulid_id!(
    /// Unique identifier for a transfer log entry
    TransferId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = CandidateId::new();
        let b = CandidateId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_display_round_trips_through_from_str() {
        let id = EvaluationId::new();
        let parsed: EvaluationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
