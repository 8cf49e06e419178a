//! Typed ID wrappers for users, workflows, steps, and surfaces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up a user ID with a step ID, etc.
/// These are just strings underneath — no format is enforced.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(UserId, "Unique identifier for a unified (cross-surface) user.");
typed_id!(WorkflowId, "Identifier of a workflow definition (also the instance key).");
typed_id!(StepId, "Identifier of a step within a workflow definition.");
typed_id!(SurfaceId, "Identifier of a surface adapter (e.g. \"telegram\", \"slack\", \"sms\").");
typed_id!(SurfaceUserId, "A user's identity as known to one particular surface.");
