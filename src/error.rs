/// Coarse classification of a session-fatal [`Error`], used by the acceptor
/// to decide how loudly to log a failure.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ErrorKind {
    /// The client's request itself was bad (unknown compiler, ...).
    Protocol,
    /// Something on the host went wrong (spawn, filesystem, io).
    System,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("io error")]
    Io {
        #[from]
        cause: std::io::Error,
    },
    #[error("malformed frame header")]
    Protocol,
    #[error("unknown compiler `{0}`")]
    UnknownCompiler(String),
    #[error("Control frame does not select a compiler")]
    NoCompilerSelected,
    #[error("failed to spawn child process")]
    Spawn {
        #[source]
        cause: std::io::Error,
    },
    #[error("failed to create session working directory")]
    WorkdirCreate {
        #[source]
        cause: std::io::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol | Error::UnknownCompiler(_) | Error::NoCompilerSelected => {
                ErrorKind::Protocol
            }
            Error::Io { .. } | Error::Spawn { .. } | Error::WorkdirCreate { .. } => {
                ErrorKind::System
            }
        }
    }

    pub fn is_protocol(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }
}

pub type Result<T> = std::result::Result<T, Error>;
