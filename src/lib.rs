/**
 * pipeline-core - Task-Pipeline Engine
 *
 * A coding-agent task moves through an ordered sequence of stages (brainstorm, design
 * review, plan, implement, code review, verify) gated by human or automated review, with
 * circuit breakers on repeated rejection and cooperative pausing for capacity limits and
 * context exhaustion. This crate owns that state machine and everything it needs to run
 * unattended for hours: persistence, the dependency graph between tasks, prompt assembly,
 * the Runner seam to an external model client, and the scheduler that arbitrates capacity
 * and group orchestration across tasks.
 *
 * Deliberately external: the model client itself, on-disk template and
 * artifact I/O (see `template::TemplateSource`), and any UI/presentation layer - this crate
 * only publishes an event stream and accepts commands (see `events`).
 *
 * Module map:
 * - `model`      - Task, Hand-off, Todo, Task Group, Settings, Approval Request
 * - `graph`       - dependency graph, readiness, cycle detection
 * - `template`    - prompt assembly and hand-off parsing
 * - `runner`      - the `ModelSession` seam to an external model client
 * - `engine`      - the stage state machine drive loop
 * - `scheduler`   - admission, auto-unblock, capacity throttling, group orchestration
 * - `persistence` - the embedded SQLite store
 * - `config`      - layered stage settings resolution
 * - `events`      - the external event/command catalogue
 * - `error`       - the crate-wide error type
 */

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod model;
pub mod persistence;
pub mod runner;
pub mod scheduler;
pub mod template;

pub use engine::PipelineEngine;
pub use error::{Error, Result};
pub use scheduler::Scheduler;
