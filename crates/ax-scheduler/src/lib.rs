//! C12 — job scheduler with SQLite persistence: cron matcher, one-shot
//! timers, heartbeat, and gated proactive hints.
//!
//! # Overview
//!
//! Jobs are persisted to a SQLite `jobs` table. The [`engine::SchedulerEngine`]
//! polls the database every second and executes any job whose `next_run` has
//! arrived, updating state and computing the next scheduled time.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                              |
//! |------------|---------------------------------------------------------|
//! | `Once`     | Single fire at an absolute UTC instant                 |
//! | `Interval` | Repeat every N seconds                                 |
//! | `Daily`    | Fire at HH:MM UTC every day                            |
//! | `Weekly`   | Fire at HH:MM UTC on a specific weekday                |
//! | `Cron`     | 5-field cron expression, matched via [`cron::CronSchedule`] |
//!
//! [`heartbeat`] and [`hints`] are independent tick loops layered on top of
//! the same `start`/`stop` lifecycle contract: both must stop emitting the
//! moment their `shutdown` watch channel is flipped.

pub mod cron;
pub mod db;
pub mod engine;
pub mod error;
pub mod heartbeat;
pub mod hints;
pub mod schedule;
pub mod types;

pub use cron::CronSchedule;
pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use hints::{Decision, HintGate, ProactiveHint};
pub use types::{Job, JobStatus, Schedule};
