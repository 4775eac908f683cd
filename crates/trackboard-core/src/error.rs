use std::fmt;

/// Machine-readable error codes surfaced to operators and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    TaskNotFound,
    InvalidEnumValue,
    InvalidDocument,
    StoreUnavailable,
    PermissionDenied,
    BatchTooLarge,
    MutationFailed,
    ControllerInactive,
    InvalidCredential,
    GateLocked,
    LocalStorageFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::TaskNotFound => "E2001",
            Self::InvalidEnumValue => "E2005",
            Self::InvalidDocument => "E3001",
            Self::StoreUnavailable => "E4001",
            Self::PermissionDenied => "E4002",
            Self::BatchTooLarge => "E4003",
            Self::MutationFailed => "E4004",
            Self::ControllerInactive => "E4005",
            Self::InvalidCredential => "E7001",
            Self::GateLocked => "E7002",
            Self::LocalStorageFailed => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::TaskNotFound => "Task not found",
            Self::InvalidEnumValue => "Invalid status/priority/category value",
            Self::InvalidDocument => "Stored document does not decode as a task",
            Self::StoreUnavailable => "Document store unavailable",
            Self::PermissionDenied => "Document store denied the request",
            Self::BatchTooLarge => "Batch exceeds the store's write ceiling",
            Self::MutationFailed => "Operation failed, please retry",
            Self::ControllerInactive => "Sync controller is not active",
            Self::InvalidCredential => "Incorrect password",
            Self::GateLocked => "Too many failed attempts",
            Self::LocalStorageFailed => "Local storage write failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .trackboard/config.toml and retry."),
            Self::TaskNotFound => Some("Run `tb list` to see valid task ids."),
            Self::InvalidEnumValue => {
                Some("Use one of the documented status/priority/category values.")
            }
            Self::InvalidDocument => Some("Re-seed with `tb seed --force` to restore the task set."),
            Self::StoreUnavailable | Self::MutationFailed => {
                Some("Retry once the store is reachable; cached data is still shown.")
            }
            Self::PermissionDenied => Some("Check the credentials used to reach the store."),
            Self::BatchTooLarge => Some("Split the write into smaller batches."),
            Self::ControllerInactive => None,
            Self::InvalidCredential => Some("Check the tester password and try again."),
            Self::GateLocked => Some("Wait for the lockout window to pass before retrying."),
            Self::LocalStorageFailed => Some("Check disk space and write permissions."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 12] = [
        ErrorCode::ConfigParseError,
        ErrorCode::TaskNotFound,
        ErrorCode::InvalidEnumValue,
        ErrorCode::InvalidDocument,
        ErrorCode::StoreUnavailable,
        ErrorCode::PermissionDenied,
        ErrorCode::BatchTooLarge,
        ErrorCode::MutationFailed,
        ErrorCode::ControllerInactive,
        ErrorCode::InvalidCredential,
        ErrorCode::GateLocked,
        ErrorCode::LocalStorageFailed,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let rendered = code.code();
            assert_eq!(rendered.len(), 5);
            assert!(rendered.starts_with('E'));
            assert!(rendered.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn mutation_failure_reads_as_retry_prompt() {
        assert_eq!(
            ErrorCode::MutationFailed.message(),
            "Operation failed, please retry"
        );
    }
}
