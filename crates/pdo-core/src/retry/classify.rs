//! Maps a failed connection attempt to an [`ErrorKind`].

use crate::error::TransportError;
use crate::retry::policy::ErrorKind;

pub fn classify(e: &TransportError) -> ErrorKind {
    match e {
        TransportError::Timeout => ErrorKind::Timeout,
        TransportError::Connect(_) | TransportError::Read(_) => ErrorKind::Connection,
        TransportError::Http(code) => status_kind(*code),
        TransportError::Curl(ce) if ce.is_operation_timedout() => ErrorKind::Timeout,
        TransportError::Curl(ce) if ce.is_aborted_by_callback() => ErrorKind::Cancelled,
        TransportError::Curl(_) => ErrorKind::Connection,
        TransportError::Request(_) => ErrorKind::Request,
        TransportError::Cancelled => ErrorKind::Cancelled,
    }
}

fn status_kind(code: u32) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 | 503 => ErrorKind::Throttled,
        other => ErrorKind::Status(u16::try_from(other).unwrap_or(u16::MAX)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_keep_their_code() {
        assert_eq!(classify(&TransportError::Http(400)), ErrorKind::Status(400));
        assert_eq!(classify(&TransportError::Http(502)), ErrorKind::Status(502));
        assert_eq!(classify(&TransportError::Http(503)), ErrorKind::Throttled);
        assert_eq!(classify(&TransportError::Http(408)), ErrorKind::Timeout);
    }

    #[test]
    fn curl_failures_split_on_timeout() {
        // CURLE_OPERATION_TIMEDOUT, CURLE_COULDNT_CONNECT
        let timed_out = curl::Error::new(28);
        let refused = curl::Error::new(7);
        assert_eq!(classify(&TransportError::Curl(timed_out)), ErrorKind::Timeout);
        assert_eq!(classify(&TransportError::Curl(refused)), ErrorKind::Connection);
    }

    #[test]
    fn local_failures() {
        assert_eq!(classify(&TransportError::Request("bad".into())), ErrorKind::Request);
        assert_eq!(classify(&TransportError::Cancelled), ErrorKind::Cancelled);
    }
}
