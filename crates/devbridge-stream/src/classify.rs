//! Map transport failures onto error kinds

use devbridge_proto::ErrorKind;

pub fn status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Auth,
        408 | 504 => ErrorKind::Timeout,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    }
}

pub fn reqwest_error(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_connect() {
        ErrorKind::NetworkUnreachable
    } else if let Some(code) = error.status() {
        status(code.as_u16())
    } else if error.is_body() || error.is_request() {
        // Connection dropped mid-request or mid-stream
        ErrorKind::NetworkUnreachable
    } else {
        ErrorKind::Unknown
    }
}
