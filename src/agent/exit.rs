//! Agent CLI exit-code classification.
//!
//! The wrapper pipeline gives a few codes fixed meanings: 124 is the
//! `timeout` wrapper firing, 137/143 are SIGKILL/SIGTERM. Everything else
//! non-zero is an agent failure.

/// A classified non-zero agent exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliFailure {
    pub exit_code: i64,
    /// Stable machine-readable code, e.g. `CLI_TIMEOUT`.
    pub code: &'static str,
    /// Japanese user-facing message; never carries internal detail.
    pub user_message: String,
    pub recoverable: bool,
}

/// Classify an agent exit code. `None` means success.
pub fn classify_exit(exit_code: i64) -> Option<CliFailure> {
    match exit_code {
        0 => None,
        1 => Some(CliFailure {
            exit_code,
            code: "CLI_GENERAL_ERROR",
            user_message: "生成中にエラーが発生しました".to_string(),
            recoverable: false,
        }),
        124 => Some(CliFailure {
            exit_code,
            code: "CLI_TIMEOUT",
            user_message: "生成に時間がかかりすぎました（5分制限）".to_string(),
            recoverable: true,
        }),
        137 => Some(CliFailure {
            exit_code,
            code: "CLI_KILLED",
            user_message: "生成がキャンセルされました".to_string(),
            recoverable: true,
        }),
        143 => Some(CliFailure {
            exit_code,
            code: "CLI_TERMINATED",
            user_message: "生成が中断されました".to_string(),
            recoverable: true,
        }),
        other => Some(CliFailure {
            exit_code,
            code: "CLI_UNKNOWN_ERROR",
            user_message: format!("予期しないエラーが発生しました (コード: {other})"),
            recoverable: false,
        }),
    }
}
