//! Process logger construction.

use env_logger::{Env, Target};
use std::fs::OpenOptions;
use std::path::Path;

/// Default log sink; override with `MAILBUCKET_LOG_FILE`.
pub const DEFAULT_LOG_FILE: &str = "/var/log/mailbucket.log";

/// Initialize the process logger, appending to the file at `path`.
///
/// The level comes from `RUST_LOG`, defaulting to info. Nothing is logged
/// before this returns; the caller maps an open failure to the
/// "critical OS file missing" exit code.
pub fn init(path: impl AsRef<Path>) -> Result<(), std::io::Error> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let env = Env::new().filter_or("RUST_LOG", "info");
    env_logger::Builder::from_env(env)
        .target(Target::Pipe(Box::new(file)))
        .init();

    Ok(())
}
