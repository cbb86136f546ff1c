//! Classification of join-tool output.
//!
//! The external join tool does not return granular exit codes, so the only
//! way to tell a permission problem apart from any other failure is to
//! match known substrings in its captured output. The tool is always run
//! with a forced C locale so these patterns are stable.
//!
//! The directory server is part of the problem here: when enrollment over
//! LDAP lacks permissions it frequently reports oblique errors such as
//! "Constraint violation" or "Object class violation" instead of a plain
//! access-denied. All of these classify as an authorization failure.

/// Outcome of classifying a failed join-domain stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinFailure {
    /// The output matched a known permission-problem pattern.
    AuthDenied,
    /// Any other failure.
    Other,
}

/// Patterns where a literal must appear somewhere after the word "failed".
const FAILED_PATTERNS: &[&str] = &[
    ": Constraint violation",
    ": Object class violation",
    ": Insufficient access",
];

/// Classify the captured output of a failed join-domain invocation.
pub fn classify_join_output(output: &str) -> JoinFailure {
    if output.contains("NT_STATUS_ACCESS_DENIED") {
        return JoinFailure::AuthDenied;
    }

    if let Some(rest) = output.split_once("failed").map(|(_, rest)| rest) {
        if FAILED_PATTERNS.iter().any(|pat| rest.contains(pat)) {
            return JoinFailure::AuthDenied;
        }
    }

    JoinFailure::Other
}
