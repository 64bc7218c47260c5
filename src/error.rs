// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// The engine distinguishes three failure classes:
//   - InvalidSeed: malformed historical data. Fatal to the session; the
//     caller must fetch and seed again.
//   - UninitializedState: API misuse (incremental extension before a cold
//     compute). A programming error, not user-recoverable.
//   - SessionClosed: the transport reported an unrecoverable failure and the
//     session is terminal. A new session must be created.
//
// Dropped late ticks and gap fills are *not* errors — they surface as
// `ApplyOutcome` variants and are handled internally.

/// Unified error type for engine operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Historical seed data violated the bucket invariant.
    InvalidSeed(String),
    /// An incremental operation ran before the required cold compute.
    UninitializedState(&'static str),
    /// The session is terminally closed; create a new one.
    SessionClosed,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSeed(msg) => write!(f, "invalid_seed: {msg}"),
            Self::UninitializedState(what) => {
                write!(f, "uninitialized_state: {what} extended before cold compute")
            }
            Self::SessionClosed => write!(f, "session_closed"),
        }
    }
}

impl std::error::Error for EngineError {}
