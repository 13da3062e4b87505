//! Newtype domain identifiers.
//!
//! Every value that crosses the host boundary with an identity of its own is a
//! distinct newtype. This prevents accidentally interchanging, for example, a
//! [`RequestCode`] with a [`ResultCode`] even though both are `i32` under the
//! hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for i32-wrapped newtypes (host-assigned integers).
// Generates: struct (Copy), new(), as_i32(), Display.
// ---------------------------------------------------------------------------
macro_rules! i32_code {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(i32);

        impl $name {
            /// Creates a new code from a raw integer.
            pub const fn new(value: i32) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_i32(self) -> i32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Activity-result codes
// ---------------------------------------------------------------------------

i32_code! {
    /// Request code the host attaches to an interactive platform flow.
    ///
    /// The same code comes back with the flow's result, which is how a result
    /// is matched to the retrieval step waiting for it.
    RequestCode
}

i32_code! {
    /// Result code reported by the host when an interactive platform flow ends.
    ResultCode
}

impl ResultCode {
    /// The user completed the flow and granted access.
    pub const OK: ResultCode = ResultCode::new(-1);

    /// The user backed out of the flow.
    pub const CANCELED: ResultCode = ResultCode::new(0);
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one retrieval attempt (one accepted `start()` call).
///
/// Resume tokens carry the attempt they were issued for; a token whose attempt
/// no longer matches the orchestrator's pending state is stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Generates a new random attempt identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
