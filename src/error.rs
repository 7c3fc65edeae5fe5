/**
 * Error Handling Module
 *
 * DESIGN DECISION: Centralized error types using thiserror for consistent error semantics
 * WHY: The engine must never panic on its public surface; every fallible path returns Result
 *
 * REASONING CHAIN:
 * 1. The Engine converts every Runner/Scheduler failure into a hand-off or status event
 * 2. thiserror keeps each conversion a one-line `?` without manual Display impls
 * 3. Grouping variants by subsystem mirrors the engine's own component boundaries
 * 4. From conversions for rusqlite/serde_json/io let persistence and parsing code use `?`
 * 5. Errors are never the propagation path for malformed data; that falls back silently
 *
 * PATTERN: thiserror per-concern variant grouping
 */

use thiserror::Error;

/// Primary error type for the pipeline engine.
#[derive(Error, Debug)]
pub enum Error {
    /*
     * Persistence Store errors (Component A)
     */
    /// Underlying SQLite failure (schema, query, or I/O).
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /*
     * Dependency Graph errors (Component B)
     */
    /// Adding or editing an edge would create a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /*
     * Template & Hand-off Assembler errors (Component C)
     */
    /// Template file missing or unreadable for a stage.
    #[error("template error: {0}")]
    Template(String),

    /*
     * Model Session Runner errors (Component D)
     */
    /// The model session ended without completing (non-retryable within this attempt).
    #[error("session error: {0}")]
    Session(String),

    /// A retryable remote failure exhausted its attempt budget.
    #[error("transient failure exhausted retries: {0}")]
    RetriesExhausted(String),

    /*
     * Pipeline Engine errors (Component E)
     */
    /// Requested stage transition is not valid for the task's tier or current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A circuit breaker has tripped for this stage.
    #[error("circuit breaker tripped: {0}")]
    CircuitBreaker(String),

    /*
     * Scheduler & Capacity Arbiter errors (Component F)
     */
    /// Task admission was refused because a prerequisite is not done.
    #[error("task blocked: {0}")]
    TaskBlocked(String),

    /*
     * Configuration errors
     */
    #[error("configuration error: {0}")]
    Configuration(String),

    /*
     * Generic (de)serialization / IO passthrough
     */
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CycleDetected("A -> B -> A".to_string());
        assert_eq!(err.to_string(), "cycle detected: A -> B -> A");
    }

    #[test]
    fn test_error_conversion_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(_) => {}
            _ => panic!("expected Serialization error"),
        }
    }

    #[test]
    fn test_error_conversion_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        match err {
            Error::Io(msg) => assert!(msg.contains("missing")),
            _ => panic!("expected Io error"),
        }
    }

    #[test]
    fn test_result_alias() {
        fn ok() -> Result<i32> {
            Ok(1)
        }
        fn bad() -> Result<i32> {
            Err(Error::NotFound("task 1".into()))
        }
        assert_eq!(ok().unwrap(), 1);
        assert!(bad().is_err());
    }
}
