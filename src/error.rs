use thiserror::Error;

/// Errors surfaced by the coordination core.
///
/// Most degenerate conditions are handled locally and never become errors:
/// a missing trajectory prediction means "no conflict", an infeasible
/// palette yields a best-effort coloring, and a detected wait cycle is
/// broken by forced admission. Only oracle-level failures propagate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The grid oracle could not be constructed (invalid topology,
    /// unreachable targets for every agent, zero agents). Fatal for the
    /// episode: callers must discard it and regenerate.
    #[error("grid oracle construction failed: {0}")]
    OracleConstruction(String),

    /// `step` was called after every agent finished.
    #[error("episode is finished; call reset before stepping")]
    EpisodeFinished,

    /// An action referenced an agent handle unknown to the oracle.
    #[error("unknown agent handle {0}")]
    UnknownHandle(crate::Handle),
}
