//! Exit codes understood by the calling MTA, a cut-down `sysexits.h`.

/// Process exit codes with MTA retry/bounce semantics.
///
/// The numeric values are a contract with external MTA configuration and must
/// stay stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sysexit {
    /// Successful termination; the message was accepted for storage.
    Ok = 0,
    /// Cannot read the message body (missing or ambiguous input).
    NoInput = 66,
    /// No mailbox configured for the recipient; permanent reject.
    NoUser = 67,
    /// Transport or service failure; the MTA should not blindly requeue.
    Unavailable = 69,
    /// Internal software error; alert the operator, do not blame the sender.
    Software = 70,
    /// Critical file missing; the log file could not be opened.
    OsFile = 72,
    /// Temporary failure; the MTA is invited to retry later.
    TempFail = 75,
    /// Configuration missing or unparseable; the operator must fix it.
    Config = 78,
}

impl Sysexit {
    /// Numeric exit code to pass to `process::exit`.
    pub fn code(self) -> i32 {
        self as i32
    }
}
