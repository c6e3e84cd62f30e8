//! Error types for the command pipeline.

use std::borrow::Cow;

use nodal_core::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Classification of a command failure, reported to the originating client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// A referenced path does not exist.
    ResolutionError,
    /// A referenced object exists but has the wrong kind for the operation.
    TypeError,
    /// A created object would land on an occupied path.
    DuplicatePath,
    /// A rename would land on an occupied path.
    PathCollision,
    /// A precondition failed while executing on the real-time thread.
    ExecutionError,
    /// The request is structurally invalid (e.g. deleting the root).
    BadRequest,
    /// The requested relation already exists (e.g. a duplicate connection).
    Exists,
}

impl ErrorKind {
    /// Short, stable name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResolutionError => "resolution error",
            Self::TypeError => "type error",
            Self::DuplicatePath => "duplicate path",
            Self::PathCollision => "path collision",
            Self::ExecutionError => "execution error",
            Self::BadRequest => "bad request",
            Self::Exists => "already exists",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command-scoped failure, carried in the command's `error` field.
///
/// Messages are `Cow` so that the real-time stage can record a failure with a
/// static message without allocating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CommandError {
    /// Failure class.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: Cow<'static, str>,
}

impl CommandError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A referenced path was not found.
    pub fn resolution(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::ResolutionError, message)
    }

    /// A referenced object has the wrong kind.
    pub fn type_error(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// The request is structurally invalid.
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Real-time failure with a static message (does not allocate).
    pub const fn execution(message: &'static str) -> Self {
        Self {
            kind: ErrorKind::ExecutionError,
            message: Cow::Borrowed(message),
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::DuplicatePath(_) => ErrorKind::DuplicatePath,
            StoreError::NotFound(_) => ErrorKind::ResolutionError,
            StoreError::PathCollision(_) => ErrorKind::PathCollision,
            StoreError::InvalidMove { .. } => ErrorKind::BadRequest,
        };
        Self::new(kind, err.to_string())
    }
}

/// Errors from starting, feeding or stopping the engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] nodal_config::ConfigError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name.
        name: &'static str,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The engine has shut down and no longer accepts commands.
    #[error("engine is not running")]
    Disconnected,

    /// A bounded queue is full; retry later.
    #[error("{0} queue is full")]
    QueueFull(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodal_core::Path;

    #[test]
    fn store_errors_map_to_kinds() {
        let p = Path::new("/a").unwrap();
        let cases = [
            (StoreError::DuplicatePath(p.clone()), ErrorKind::DuplicatePath),
            (StoreError::NotFound(p.clone()), ErrorKind::ResolutionError),
            (StoreError::PathCollision(p.clone()), ErrorKind::PathCollision),
            (
                StoreError::InvalidMove {
                    from: p.clone(),
                    to: p.clone(),
                },
                ErrorKind::BadRequest,
            ),
        ];
        for (store_err, kind) in cases {
            let err = CommandError::from(store_err);
            assert_eq!(err.kind, kind);
            assert!(err.message.contains("/a"), "got: {}", err.message);
        }
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = CommandError::type_error("/g/osc is a plugin block");
        assert_eq!(err.to_string(), "type error: /g/osc is a plugin block");
    }

    #[test]
    fn execution_error_is_borrowed() {
        let err = CommandError::execution("port is not active");
        assert!(matches!(err.message, Cow::Borrowed(_)));
        assert_eq!(err.kind, ErrorKind::ExecutionError);
    }
}
