//! Service layer: derived-state cascade logic.
//!
//! Each service owns one derived-state concern and emits events through
//! the [`super::domain::EventBus`]. The cascade between them is wired
//! with explicit calls from [`crate::engine::CascadeEngine`] and from
//! [`UpdateRequestService`].

pub mod consecutivity;
pub mod notifications;
pub mod points;
pub mod requests;
pub mod targets;
pub mod warnings;

pub use consecutivity::ConsecutivityTracker;
pub use notifications::{Notification, NotificationPlanner, Recipient};
pub use points::PointsService;
pub use requests::{PrivilegeCheck, StaticPrivileges, UpdateRequestService};
pub use targets::TargetService;
pub use warnings::WarningService;
