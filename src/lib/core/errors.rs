use crate::core::error::CellfuseError;
use anyhow::Error;
use std::io;

/// Returns `true` if any error in the chain is a broken pipe, including IO errors
/// wrapped in [`CellfuseError::Io`].
pub fn is_broken_pipe(err: &Error) -> bool {
    err.chain().any(|cause| {
        let io_err = cause.downcast_ref::<io::Error>().or_else(|| {
            match cause.downcast_ref::<CellfuseError>() {
                Some(CellfuseError::Io(inner)) => Some(inner),
                _ => None,
            }
        });
        io_err.is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_broken_pipe_is_detected() {
        let inner = CellfuseError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        let err = Error::new(inner).context("writing manifest");
        assert!(is_broken_pipe(&err));
    }

    #[test]
    fn other_errors_are_not_broken_pipes() {
        let err = Error::new(CellfuseError::InvalidInput("bad".to_string()));
        assert!(!is_broken_pipe(&err));
    }
}
