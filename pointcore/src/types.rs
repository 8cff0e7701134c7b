//! Core identifier and ordering types for the `PointCore` ledger.
//!
//! Every type here uses a smart constructor: once a value exists it is valid,
//! and no call site needs to re-check it.

use chrono::{DateTime, Duration, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one event stream in the store.
///
/// A stream is the consistency boundary for writes. In the ledger there is one
/// stream per loyalty account (`account-{uuid}`). Stream ids are trimmed,
/// non-empty, and at most 128 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamId(String);

/// Globally unique event identifier, restricted to UUIDv7.
///
/// UUIDv7 embeds the creation timestamp in the high bits, so sorting by
/// `EventId` sorts events by creation time. The projection feed relies on
/// this ordering.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a fresh `EventId` stamped with the current time.
    ///
    /// Ids are drawn through one process-wide v7 context, so ids created in
    /// sequence sort in creation order even within the same millisecond.
    pub fn new() -> Self {
        static CONTEXT: std::sync::OnceLock<std::sync::Mutex<uuid::ContextV7>> =
            std::sync::OnceLock::new();
        let context = CONTEXT.get_or_init(|| std::sync::Mutex::new(uuid::ContextV7::new()));
        let guard = context.lock().expect("v7 context mutex poisoned");
        let timestamp = uuid::Timestamp::now(&*guard);
        Self::try_new(Uuid::new_v7(timestamp)).expect("new_v7 always produces a v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of an event within its stream.
///
/// Versions start at 0 for an empty stream and increase by one per event.
/// The expected-version check on writes compares against this value.
#[nutype(
    validate(greater_or_equal = 0),
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
pub struct EventVersion(u64);

impl EventVersion {
    /// Version of a stream that has no events yet.
    pub fn initial() -> Self {
        Self::try_new(0).expect("0 is a valid version")
    }

    /// The version directly after this one.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u64 = self.into();
        Self::try_new(current + 1).expect("incremented version is valid")
    }
}

/// UTC instant attached to events and transfers.
///
/// A thin wrapper over [`DateTime<Utc>`] so the rest of the crate never
/// handles naive or zoned datetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wraps a UTC datetime.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// The current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Borrows the underlying datetime.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Consumes the wrapper.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// This instant shifted forward by whole days. Used for transfer
    /// validity windows.
    #[must_use]
    pub fn plus_days(self, days: u32) -> Self {
        Self(self.0 + Duration::days(i64::from(days)))
    }

    /// This instant shifted backward by whole days.
    #[must_use]
    pub fn minus_days(self, days: u32) -> Self {
        Self(self.0 - Duration::days(i64::from(days)))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn stream_id_accepts_reasonable_names(s in "[a-z0-9-]{1,128}") {
            let stream_id = StreamId::try_new(s.clone()).unwrap();
            prop_assert_eq!(stream_id.as_ref(), &s);
        }

        #[test]
        fn stream_id_rejects_oversized_names(s in "[a-z0-9]{129,300}") {
            prop_assert!(StreamId::try_new(s).is_err());
        }

        #[test]
        fn event_version_next_is_successor(v in 0u64..u64::MAX) {
            let next: u64 = EventVersion::try_new(v).unwrap().next().into();
            prop_assert_eq!(next, v + 1);
        }

        #[test]
        fn timestamp_ordering_tracks_datetime(offset1 in 0i64..1_000_000, offset2 in 0i64..1_000_000) {
            let base = Utc::now();
            let t1 = Timestamp::new(base + Duration::seconds(offset1));
            let t2 = Timestamp::new(base + Duration::seconds(offset2));
            prop_assert_eq!(t1 < t2, offset1 < offset2);
        }
    }

    #[test]
    fn stream_id_trims_and_rejects_blank() {
        assert_eq!(
            StreamId::try_new("  account-1  ").unwrap().as_ref(),
            "account-1"
        );
        assert!(StreamId::try_new("   ").is_err());
        assert!(StreamId::try_new("").is_err());
    }

    #[test]
    fn event_id_new_is_v7_and_monotonic_by_time() {
        let first = EventId::new();
        let second = EventId::new();
        assert_eq!(
            first.as_ref().get_version(),
            Some(uuid::Version::SortRand)
        );
        // v7 ids created in sequence never sort backwards
        assert!(first <= second);
    }

    #[test]
    fn event_id_rejects_other_uuid_versions() {
        assert!(EventId::try_new(Uuid::nil()).is_err());
        assert!(EventId::try_new(Uuid::max()).is_err());
    }

    #[test]
    fn initial_version_is_zero() {
        let v: u64 = EventVersion::initial().into();
        assert_eq!(v, 0);
    }

    #[test]
    fn plus_days_and_minus_days_are_inverse() {
        let now = Timestamp::now();
        assert_eq!(now.plus_days(30).minus_days(30), now);
        assert!(now.plus_days(1) > now);
        assert!(now.minus_days(1) < now);
    }

    #[test]
    fn timestamp_serializes_transparently() {
        let ts = Timestamp::now();
        let json = serde_json::to_string(&ts).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, back);
    }
}
