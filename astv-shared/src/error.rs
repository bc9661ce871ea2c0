use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("packet too big")]
    ErrPacketTooBig,
    #[error("connection closed")]
    ErrConnectionClosed,
    #[error("no interface is available")]
    ErrNoInterface,

    //wire errors
    #[error("name part too long, must be at most 64 bytes")]
    ErrNamePartTooLong,
    #[error("incoming decode: {0}")]
    ErrIncomingDecode(String),
    #[error("record data too long")]
    ErrRecordDataTooLong,

    //service errors
    #[error("bad type in name: {0}")]
    ErrBadTypeInName(String),
    #[error("service name is not unique")]
    ErrNonUniqueName,
    #[error("service is not registered")]
    ErrServiceNotRegistered,
    #[error("service browser requires at least one handler")]
    ErrNoServiceHandler,

    //session errors
    #[error("session is not open")]
    ErrSessionNotOpen,
    #[error("invalid token: {0}")]
    ErrInvalidToken(String),
    #[error("no peer address")]
    ErrNoPeerAddr,

    #[error("mutex poison: {0}")]
    PoisonError(String),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The OS error behind this error, if any.
    pub fn as_io(&self) -> Option<&io::Error> {
        match self {
            Error::Io(e) => Some(&e.0),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// io::Error has no PartialEq; compare kinds.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_compare_by_kind() {
        let a = Error::from(io::Error::new(io::ErrorKind::AddrInUse, "first"));
        let b = Error::from(io::Error::new(io::ErrorKind::AddrInUse, "second"));
        assert_eq!(a, b);
        assert_eq!(a.as_io().map(io::Error::kind), Some(io::ErrorKind::AddrInUse));
        assert!(Error::ErrNonUniqueName.as_io().is_none());
    }
}
