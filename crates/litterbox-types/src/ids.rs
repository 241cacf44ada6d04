//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Event ids are generated by the producer (UUID v4) and double as the
//! idempotency key in the store. Device ids are assigned outside this
//! pipeline and only carried through it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier (UUID v4).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl core::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier of a single usage event (the idempotency key).
    UsageEventId
}

define_id! {
    /// Identifier of the edge device that emitted an event.
    EdgeDeviceId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_not_nil() {
        assert_ne!(UsageEventId::new().into_inner(), Uuid::nil());
        assert_ne!(EdgeDeviceId::new().into_inner(), Uuid::nil());
    }

    #[test]
    fn id_serializes_as_plain_uuid_string() {
        let id = UsageEventId::new();
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, format!("\"{}\"", id.into_inner()));
    }

    #[test]
    fn id_parses_from_canonical_string() {
        let parsed: Result<EdgeDeviceId, _> = "12345678-1234-5678-9012-123456789abc".parse();
        assert_eq!(
            parsed.map(|id| id.to_string()).ok().as_deref(),
            Some("12345678-1234-5678-9012-123456789abc")
        );
    }

    #[test]
    fn id_rejects_garbage() {
        let parsed: Result<UsageEventId, _> = "not-a-uuid".parse();
        assert!(parsed.is_err());
    }
}
