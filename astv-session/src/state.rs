use std::fmt;
use std::io;

#[cfg(not(windows))]
use nix::errno::Errno;

/// Why a connection attempt or an open session failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailureReason {
    ConnectOther,
    ConnectAddressUnavailable,
    ConnectPermissionDenied,
    ConnectDeviceBusy,
    ConnectCanceled,
    ConnectRefused,
    ConnectHostDown,
    ConnectAlreadyConnected,
    ConnectTimeout,
    ConnectNetworkDown,
    /// The server never answered the discover handshake.
    ConnectShakeNoResponse,

    /// Browsing found no server in time.
    DiscoverTimeout,
    DiscoverResolveServiceNotFound,
    DiscoverResolveBusy,
    DiscoverIncorrectConfiguration,
    DiscoverResolveCanceled,
    DiscoverResolveTimeout,
    /// Resolved, but without a usable IPv4 address.
    DiscoverResolveFailed,
    DiscoverResolveUnknown,
}

impl FailureReason {
    /// Heading shown above every failure message.
    pub fn title(&self) -> &'static str {
        "An error occurred connecting to the controlling device"
    }

    /// Text shown to the user for this failure.
    pub fn message(&self) -> &'static str {
        use FailureReason::*;
        match self {
            ConnectAddressUnavailable => {
                "Unable to connect to the server with supplied address. Try restarting the mobile and server applications."
            }
            ConnectCanceled => "The connection request was canceled",
            ConnectDeviceBusy => {
                "The server refused the connection. Try restarting the server application."
            }
            ConnectHostDown => {
                "Unable to connect to the server. Make sure the server application is running."
            }
            ConnectNetworkDown => {
                "The network is down. Make sure both your mobile device and server device are connected to the same WiFi network."
            }
            ConnectPermissionDenied => {
                "Permission denied by the mobile device. Please try again, or restart the mobile app if the issue continues."
            }
            ConnectRefused => {
                "The connection was refused by the server. Make sure no other devices are connected already"
            }
            ConnectTimeout => {
                "The connection timed out. Please try again later, or reconnect to the server if the issue continues."
            }
            ConnectShakeNoResponse => {
                "Did not receive a response from the server to initial handshake request. Please restart both the mobile and server applications."
            }
            DiscoverTimeout => {
                "Could not find the server on the local network. Please ensure the server application on the other device is running."
            }
            DiscoverResolveServiceNotFound => {
                "The resolve service could not be found. Please try again."
            }
            DiscoverResolveBusy => {
                "The resolve service is busy at this time. Please try again, or restart the mobile app if the issue persists."
            }
            DiscoverIncorrectConfiguration => {
                "The resolve service was incorrectly configured. Please try again."
            }
            DiscoverResolveCanceled => "The resolve service was canceled. Please try again.",
            DiscoverResolveTimeout => {
                "The resolve service could not discover the server address in time. Please restart both the mobile and server applications."
            }
            DiscoverResolveFailed => {
                "Unable to resolve the server's address. Please try again, or restart both the mobile and server applications if the issue persists."
            }
            DiscoverResolveUnknown => {
                "An error occurred while resolving the server IP. Please try again."
            }
            ConnectOther | ConnectAlreadyConnected => {
                "Please try again. If the issue persists, restart both your mobile device and the server device."
            }
        }
    }

    /// An existing connection is not a problem worth reporting.
    pub fn is_user_visible(&self) -> bool {
        *self != FailureReason::ConnectAlreadyConnected
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Lifecycle of a connection to the server.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last attempt failed; discovering again starts over.
    Failed(FailureReason),
}

impl ConnectionState {
    /// Connecting or connected: datagrams may be sent.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// Maps a transport error to the state the session ends up in.
    ///
    /// POSIX error codes are matched exactly where available; otherwise the
    /// error kind decides.
    pub fn from_io_error(err: &io::Error) -> Self {
        os_error_state(err).unwrap_or_else(|| from_error_kind(err.kind()))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

#[cfg(not(windows))]
fn os_error_state(err: &io::Error) -> Option<ConnectionState> {
    err.raw_os_error().map(|code| from_errno(Errno::from_i32(code)))
}

#[cfg(windows)]
fn os_error_state(_err: &io::Error) -> Option<ConnectionState> {
    None
}

#[cfg(not(windows))]
fn from_errno(errno: Errno) -> ConnectionState {
    use FailureReason::*;
    let reason = match errno {
        Errno::EADDRINUSE | Errno::EADDRNOTAVAIL => ConnectAddressUnavailable,
        Errno::EACCES | Errno::EPERM => ConnectPermissionDenied,
        Errno::EBUSY => ConnectDeviceBusy,
        Errno::ECANCELED => ConnectCanceled,
        Errno::ECONNREFUSED => ConnectRefused,
        Errno::EHOSTDOWN | Errno::EHOSTUNREACH => ConnectHostDown,
        Errno::EISCONN => ConnectAlreadyConnected,
        Errno::ENOTCONN => return ConnectionState::Disconnected,
        Errno::ETIMEDOUT => ConnectTimeout,
        Errno::ENETDOWN | Errno::ENETUNREACH | Errno::ENETRESET => ConnectNetworkDown,
        other => {
            log::error!("posix connection error: {other}");
            ConnectOther
        }
    };
    ConnectionState::Failed(reason)
}

fn from_error_kind(kind: io::ErrorKind) -> ConnectionState {
    use FailureReason::*;
    let reason = match kind {
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => ConnectAddressUnavailable,
        io::ErrorKind::PermissionDenied => ConnectPermissionDenied,
        io::ErrorKind::ResourceBusy => ConnectDeviceBusy,
        io::ErrorKind::ConnectionRefused => ConnectRefused,
        io::ErrorKind::HostUnreachable => ConnectHostDown,
        io::ErrorKind::NotConnected => return ConnectionState::Disconnected,
        io::ErrorKind::TimedOut => ConnectTimeout,
        io::ErrorKind::NetworkDown | io::ErrorKind::NetworkUnreachable => ConnectNetworkDown,
        _ => ConnectOther,
    };
    ConnectionState::Failed(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(
            ConnectionState::from_io_error(&refused),
            ConnectionState::Failed(FailureReason::ConnectRefused)
        );
        let not_connected = io::Error::from(io::ErrorKind::NotConnected);
        assert_eq!(
            ConnectionState::from_io_error(&not_connected),
            ConnectionState::Disconnected
        );
        let other = io::Error::other("boom");
        assert_eq!(
            ConnectionState::from_io_error(&other),
            ConnectionState::Failed(FailureReason::ConnectOther)
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_errno_mapping() {
        let cases = [
            (Errno::EADDRNOTAVAIL, FailureReason::ConnectAddressUnavailable),
            (Errno::EPERM, FailureReason::ConnectPermissionDenied),
            (Errno::EHOSTUNREACH, FailureReason::ConnectHostDown),
            (Errno::EISCONN, FailureReason::ConnectAlreadyConnected),
            (Errno::ENETRESET, FailureReason::ConnectNetworkDown),
            (Errno::EINVAL, FailureReason::ConnectOther),
        ];
        for (errno, reason) in cases {
            let err = io::Error::from_raw_os_error(errno as i32);
            assert_eq!(ConnectionState::from_io_error(&err), ConnectionState::Failed(reason));
        }

        let err = io::Error::from_raw_os_error(Errno::ENOTCONN as i32);
        assert_eq!(ConnectionState::from_io_error(&err), ConnectionState::Disconnected);
    }

    #[test]
    fn test_messages() {
        assert!(FailureReason::DiscoverTimeout
            .message()
            .starts_with("Could not find the server on the local network"));
        assert_eq!(
            FailureReason::ConnectOther.message(),
            FailureReason::ConnectAlreadyConnected.message()
        );
        assert!(!FailureReason::ConnectAlreadyConnected.is_user_visible());
        assert!(FailureReason::ConnectShakeNoResponse.is_user_visible());
    }

    #[test]
    fn test_is_open() {
        assert!(ConnectionState::Connecting.is_open());
        assert!(ConnectionState::Connected.is_open());
        assert!(!ConnectionState::Disconnected.is_open());
        assert!(!ConnectionState::Failed(FailureReason::ConnectTimeout).is_open());
    }
}
