//! Identifier and value scalars for the loyalty account domain.
//!
//! Identities are opaque UUIDs. Point values are validated at construction:
//! a [`Points`] value is always positive and bounded, so arithmetic over
//! transfer values never needs to re-check inputs.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wraps an existing UUID, e.g. one received over the API.
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrows the underlying UUID.
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id! {
    /// Identity of one loyalty account. Exactly one account exists per
    /// customer; the account id names the event stream all of the account's
    /// transfers live in.
    AccountId
}

uuid_id! {
    /// Identity of the customer an account belongs to.
    CustomerId
}

uuid_id! {
    /// Identity of a single ledger entry (adding or spending transfer).
    ///
    /// Transfer ids are supplied by the caller and double as idempotency
    /// keys: re-dispatching a command whose transfer id is already in the
    /// account stream applies nothing.
    PointsTransferId
}

/// Face value of a transfer, in points.
///
/// Always positive; capped at one billion so that any realistic sum of
/// transfer values stays far inside `i64` range.
#[nutype(
    validate(greater = 0, less_or_equal = 1_000_000_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Points(u64);

/// Free-text note attached to a spending transfer.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct TransferComment(String);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(AccountId::new(), AccountId::new());
        assert_ne!(PointsTransferId::new(), PointsTransferId::new());
    }

    #[test]
    fn id_roundtrips_through_uuid_and_json() {
        let id = AccountId::new();
        assert_eq!(AccountId::from_uuid(*id.as_uuid()), id);

        let json = serde_json::to_string(&id).unwrap();
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn points_rejects_zero() {
        assert!(Points::try_new(0).is_err());
        assert!(Points::try_new(1).is_ok());
    }

    #[test]
    fn points_rejects_absurd_values() {
        assert!(Points::try_new(1_000_000_000).is_ok());
        assert!(Points::try_new(1_000_000_001).is_err());
    }

    #[test]
    fn comment_is_trimmed_and_bounded() {
        let comment = TransferComment::try_new("  birthday bonus  ").unwrap();
        assert_eq!(comment.as_ref(), "birthday bonus");
        assert!(TransferComment::try_new("  ").is_err());
        assert!(TransferComment::try_new("x".repeat(256)).is_err());
    }

    proptest! {
        #[test]
        fn points_accepts_the_whole_valid_range(v in 1u64..=1_000_000_000) {
            let points = Points::try_new(v).unwrap();
            let back: u64 = points.into();
            prop_assert_eq!(back, v);
        }
    }
}
