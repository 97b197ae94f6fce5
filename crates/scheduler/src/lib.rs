//! # Shadow Scheduler
//!
//! Keeps watched shadow files converted, one conversion loop per file.
//!
//! ```text
//!            change / poll                timer fires
//!   Idle ───────────────────> Scheduled ─────────────> Generating ──> Idle
//!     ▲                         │   ▲  in flight: re-arm    │
//!     └──── same as checkpoint ─┘   └───────────────────────┘
//!
//!   any ── stop ──> Stopped
//! ```
//!
//! [`GenerationMachine`] holds the transitions, [`GenerationScheduler`] owns the
//! registry and the per-file tasks, and [`ConversionPipeline`] runs one conversion
//! against the [`Generator`] and [`TargetSink`] collaborators.

mod conversion;
mod error;
mod generator;
mod machine;
mod scheduler;
mod sink;

pub use conversion::{ConversionOutcome, ConversionPipeline, Liveness};
pub use error::{GenerationError, Result};
pub use generator::{Generation, Generator};
pub use machine::{GenerationMachine, Phase, TimerDecision};
pub use scheduler::{FileSnapshot, GenerationScheduler, SchedulerConfig};
pub use sink::{FileSink, MemorySink, TargetSink};
