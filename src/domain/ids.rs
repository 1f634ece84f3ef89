//! Type-safe entity identifiers.
//!
//! Every entity gets its own newtype wrapper around [`uuid::Uuid`] (v4) so
//! identifiers of different entities cannot be confused at call sites. All
//! wrappers share the same shape, so they are stamped out by `define_id!`.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a new random identifier (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wraps an existing [`uuid::Uuid`].
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner [`uuid::Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Unique identifier of a student.
    StudentId
);
define_id!(
    /// Unique identifier of a lesson.
    LessonId
);
define_id!(
    /// Unique identifier of a warning record.
    WarningId
);
define_id!(
    /// Unique identifier of a remedial target.
    TargetId
);
define_id!(
    /// Unique identifier of an update request.
    RequestId
);
define_id!(
    /// Unique identifier of a behavioral incident.
    IncidentId
);
define_id!(
    /// Unique identifier of a quiz.
    QuizId
);
