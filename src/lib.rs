//! # fasee7-engine
//!
//! Derived-state cascade engine for a tutoring program. Primary facts
//! (attendance, homework, quiz scores, behavioral incidents, performance
//! indicators) flow in; the engine derives consecutivity runs, warnings,
//! points, rankings, remedial targets, and achievement streaks, and
//! governs corrections through an approval-gated update-request workflow
//! with transactional apply and rollback.
//!
//! ## Architecture
//!
//! ```text
//! Primary facts (attendance, homework, quizzes, incidents, PI changes)
//!     │
//!     ├── CascadeEngine (engine.rs)          entry points, fixed cascade order
//!     │
//!     ├── ConsecutivityTracker (service/)    absence + same-kind incident runs
//!     ├── WarningService (service/)          threshold and behavioral warnings
//!     ├── PointsService (service/)           sub-totals, totals, ranking
//!     ├── TargetService (service/)           remedial targets, streak bonuses
//!     ├── UpdateRequestService (service/)    approval gate, snapshot rollback
//!     │
//!     ├── Stores (store/)                    in-memory tables behind RwLock
//!     └── EventBus (domain/)                 broadcast outbox for observers
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod service;
pub mod store;
