//! Domain layer: entity types, typed identifiers, and the event system.
//!
//! This module contains the engine-side domain model: students, primary
//! facts, the derived-state records (consecutivity, warnings, points,
//! targets, streaks), update requests, and the typed event outbox.

pub mod consecutivity;
pub mod event;
pub mod event_bus;
pub mod facts;
pub mod ids;
pub mod points;
pub mod student;
pub mod target;
pub mod update_request;
pub mod warning;

pub use event::DomainEvent;
pub use event_bus::EventBus;
pub use points::Fasee7Points;
pub use student::Student;
pub use target::Target;
pub use update_request::UpdateRequest;
pub use warning::Warning;
