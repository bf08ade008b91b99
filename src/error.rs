//! Errors raised while talking to the store.

use std::fmt;
use std::io;

/// Everything that can go wrong between connecting and the last reply.
#[derive(Debug)]
pub enum ClientError {
    /// `host:port` did not resolve to any address.
    Resolve(String, io::Error),
    /// Socket level failure: refused, reset, closed.
    Io(io::Error),
    /// Connect, read or write did not finish within its timeout.
    Timeout(io::Error),
    /// The server sent bytes that are not valid RESP2.
    Protocol(String),
    /// The server rejected the supplied credentials.
    Auth(String),
    /// Any other error reply from the server.
    Server(String),
    /// A well-formed reply of the wrong shape for the command.
    UnexpectedReply {
        command: &'static str,
        reply: String,
    },
}

impl ClientError {
    /// Classify an error reply, splitting credential rejection from the rest.
    pub fn from_reply(message: String) -> ClientError {
        if is_auth_reply(&message) {
            ClientError::Auth(message)
        } else {
            ClientError::Server(message)
        }
    }

    /// Whether this error means the credentials were rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }

    /// Whether the connection can still carry another request. Error
    /// replies leave the stream in sync; transport and framing failures
    /// do not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Timeout(_) | ClientError::Protocol(_)
        )
    }
}

/// Error prefixes Redis uses for a bad or missing credential.
fn is_auth_reply(message: &str) -> bool {
    message.starts_with("WRONGPASS")
        || message.starts_with("NOAUTH")
        || message.starts_with("ERR invalid password")
        || message.starts_with("ERR invalid username-password pair")
        // Password supplied but the server has none configured
        || message.starts_with("ERR AUTH <password> called without any password configured")
        || message.starts_with("ERR Client sent AUTH, but no password is set")
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> ClientError {
        match err.kind() {
            // Socket timeouts surface as EAGAIN on Unix
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ClientError::Timeout(err),
            _ => ClientError::Io(err),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Resolve(addr, e) => write!(f, "Failed to resolve '{addr}': {e}"),
            ClientError::Io(e) => write!(f, "{e}"),
            ClientError::Timeout(_) => write!(f, "Timed out waiting for the server"),
            ClientError::Protocol(reason) => write!(f, "Protocol error: {reason}"),
            ClientError::Auth(message) | ClientError::Server(message) => f.write_str(message),
            ClientError::UnexpectedReply { command, reply } => {
                write!(f, "Unexpected reply to {command}: {reply}")
            }
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Resolve(_, e) | ClientError::Io(e) | ClientError::Timeout(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_classification() {
        for reply in [
            "WRONGPASS invalid username-password pair or user is disabled.",
            "NOAUTH Authentication required.",
            "ERR invalid password",
            "ERR AUTH <password> called without any password configured for the default user. \
             Are you sure your configuration is correct?",
            "ERR Client sent AUTH, but no password is set",
        ] {
            assert!(ClientError::from_reply(reply.to_string()).is_auth(), "{reply}");
        }

        let err = ClientError::from_reply("ERR unknown command 'FOO'".to_string());
        assert!(!err.is_auth());
        assert_eq!(err.to_string(), "ERR unknown command 'FOO'");
    }

    #[test]
    fn test_io_display_keeps_description() {
        let err = ClientError::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(err.to_string(), "refused");
        assert!(!err.is_auth());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_timeouts_are_reported_as_such() {
        for kind in [io::ErrorKind::WouldBlock, io::ErrorKind::TimedOut] {
            let err = ClientError::from(io::Error::new(kind, "Resource temporarily unavailable"));
            assert!(matches!(err, ClientError::Timeout(_)), "{err:?}");
            assert_eq!(err.to_string(), "Timed out waiting for the server");
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_error_reply_keeps_connection_usable() {
        assert!(!ClientError::from_reply("ERR unknown command 'FOO'".to_string()).is_fatal());
        assert!(!ClientError::from_reply("WRONGPASS nope".to_string()).is_fatal());
    }
}
