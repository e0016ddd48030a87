//! Transport-level error classification shared by the agent, Postgres and
//! audit classifiers.

use std::io::ErrorKind;

/// Walks the source chain looking for an [`std::io::Error`] whose kind is
/// a transient network condition (connection refused/reset, timeout,
/// would-block). `ErrorKind` already abstracts over the per-platform errno
/// values, so the same set covers Unix and Windows.
pub fn is_retriable_io(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
            );
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("wrapper")]
    struct Wrapper(#[source] io::Error);

    #[test]
    fn finds_io_error_through_the_source_chain() {
        let err = Wrapper(io::Error::new(ErrorKind::ConnectionRefused, "refused"));
        assert!(is_retriable_io(&err));

        let err = Wrapper(io::Error::new(ErrorKind::PermissionDenied, "denied"));
        assert!(!is_retriable_io(&err));
    }

    #[test]
    fn non_io_errors_are_not_retriable() {
        #[derive(Debug, thiserror::Error)]
        #[error("plain")]
        struct Plain;
        assert!(!is_retriable_io(&Plain));
    }
}
