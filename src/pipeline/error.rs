//! Pipeline error type
//!
//! Every condition the pipeline cannot continue from. Nothing in the pipeline
//! exits the process; the binary decides what a failure means for the
//! destination file and the exit status.

use crate::engine::OperationType;
use thiserror::Error;

/// Fatal pipeline condition
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Buffer allocation, engine initialization or an invalid workload
    #[error("setup failed: {0}")]
    SetupFailed(String),

    /// The kernel rejected a batch, or accepted only part of it
    #[error("{stage}: io_submit accepted {accepted} of {requested}: {reason}")]
    SubmissionFailed {
        stage: &'static str,
        requested: usize,
        accepted: usize,
        reason: String,
    },

    /// The completion wait failed, or reported something that was not in flight
    #[error("completion wait failed: {0}")]
    CompletionFailed(String),

    /// An operation finished with an error code
    #[error("{op} failed at offset {offset}: {}", describe_code(*.code))]
    OperationFailed {
        op: OperationType,
        offset: u64,
        code: i64,
    },

    /// An operation moved fewer (or more) bytes than requested
    #[error("short {op} at offset {offset}: expected {expected} bytes, got {transferred}")]
    ShortTransfer {
        op: OperationType,
        offset: u64,
        expected: usize,
        transferred: i64,
    },
}

/// Render a `-errno` result code
fn describe_code(code: i64) -> String {
    if code < 0 && code >= -(i32::MAX as i64) {
        let err = std::io::Error::from_raw_os_error((-code) as i32);
        format!("{} (errno {})", err, -code)
    } else {
        format!("error code {}", code)
    }
}

/// Message for an engine error, with the kernel-without-AIO case spelled out
pub(crate) fn kernel_error_message(error: &anyhow::Error) -> String {
    let enosys = error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .any(|io| io.raw_os_error() == Some(libc::ENOSYS));

    if enosys {
        "AIO not in this kernel".to_string()
    } else {
        format!("{:#}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_operation_failed_display_names_errno() {
        let err = PipelineError::OperationFailed {
            op: OperationType::Read,
            offset: 4096,
            code: -(libc::EIO as i64),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("read failed at offset 4096"));
        assert!(msg.contains(&format!("errno {}", libc::EIO)));
    }

    #[test]
    fn test_secondary_code_display() {
        let err = PipelineError::OperationFailed {
            op: OperationType::Write,
            offset: 0,
            code: 7,
        };
        assert_eq!(err.to_string(), "write failed at offset 0: error code 7");
    }

    #[test]
    fn test_short_transfer_display() {
        let err = PipelineError::ShortTransfer {
            op: OperationType::Write,
            offset: 8192,
            expected: 4096,
            transferred: 100,
        };
        assert_eq!(
            err.to_string(),
            "short write at offset 8192: expected 4096 bytes, got 100"
        );
    }

    #[test]
    fn test_kernel_error_message_enosys() {
        let err = Err::<(), _>(std::io::Error::from_raw_os_error(libc::ENOSYS))
            .context("io_setup failed")
            .unwrap_err();
        assert_eq!(kernel_error_message(&err), "AIO not in this kernel");
    }

    #[test]
    fn test_kernel_error_message_other() {
        let err = Err::<(), _>(std::io::Error::from_raw_os_error(libc::EAGAIN))
            .context("io_submit failed")
            .unwrap_err();
        let msg = kernel_error_message(&err);
        assert!(msg.starts_with("io_submit failed: "));
    }
}
