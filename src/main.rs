#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::correctness,
    missing_debug_implementations,
    missing_docs,
    clippy::all,
    clippy::wildcard_imports,
    clippy::needless_borrow,
    clippy::cast_lossless,
    clippy::unused_async,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
    clippy::cloned_instead_of_copied
)]
#![cfg_attr(not(test), forbid(clippy::indexing_slicing))]
#![cfg_attr(not(test), forbid(clippy::string_slice))]
mod bucket;
mod config;
pub(crate) mod error;
pub(crate) mod logger;
pub(crate) mod naming;
pub(crate) mod router;
pub(crate) mod sysexit;

use clap::Parser;
use config::Config;
use nix::sys::stat::SFlag;
use std::io::Read;
use std::os::fd::AsFd;
use std::process;
use sysexit::Sysexit;

/// Mail delivery hook storing each incoming message as one object in a
/// destination bucket.
#[derive(Debug, Parser)]
#[command(name = "mailbucket", version, about)]
struct Args {
    /// Email address of the receiving mailbox.
    #[arg(long, short = 'a', default_value = "CatchAll")]
    address: String,

    /// Envelope sender address (informational only).
    #[arg(long = "from", short = 'f', default_value = "")]
    from: String,

    /// Message body, when not piped on stdin.
    #[arg(value_name = "BODY")]
    body: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_file = std::env::var("MAILBUCKET_LOG_FILE")
        .unwrap_or_else(|_| logger::DEFAULT_LOG_FILE.to_string());
    if let Err(e) = logger::init(&log_file) {
        eprintln!("unable to open log file {log_file}: {e}");
        process::exit(Sysexit::OsFile.code());
    }

    process::exit(run(args).await.code());
}

/// The whole pipeline for one message: resolve, name, upload. Every failure
/// is translated to exactly one exit signal; nothing is retried here.
async fn run(args: Args) -> Sysexit {
    log::info!("processing message for: {}", args.address);
    if !args.from.is_empty() {
        log::info!("envelope sender: {}", args.from);
    }

    let config = match Config::load(&config::CONFIG_PATHS) {
        Ok(config) => config,
        Err(e) => {
            log::error!("unable to load config file: {e}");
            return Sysexit::Config;
        }
    };

    let Some(mailbox) = router::match_mailbox(&config.mailboxes, &args.address) else {
        log::warn!("mailbox not found for: {}", args.address);
        return Sysexit::NoUser;
    };

    let body = match read_body(stdin_is_pipe(), &args.body) {
        Ok(body) => body,
        Err(e) => {
            log::error!("{e}");
            return Sysexit::NoInput;
        }
    };

    let key = naming::object_key(&mailbox.key_prefix, &naming::generate_name_hash());

    bucket::put_object(&config.request_config, mailbox, &args.address, &key, &body)
        .await
        .sysexit()
}

/// Read the message body: a piped stdin wins; otherwise exactly one trailing
/// argument must carry the body. Anything else is an input error.
fn read_body(stdin_piped: bool, args: &[String]) -> Result<Vec<u8>, error::Error> {
    if stdin_piped {
        read_to_end(std::io::stdin())
    } else {
        match args {
            [body] => Ok(body.clone().into_bytes()),
            _ => Err(error::Error::AmbiguousBody),
        }
    }
}

/// Raw bytes up to end-of-stream; 8BITMIME mail is not required to be UTF-8.
fn read_to_end(mut reader: impl Read) -> Result<Vec<u8>, error::Error> {
    let mut body = Vec::new();
    reader.read_to_end(&mut body)?;
    Ok(body)
}

fn stdin_is_pipe() -> bool {
    let stdin = std::io::stdin();
    nix::sys::stat::fstat(stdin.as_fd())
        .map(|st| SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT == SFlag::S_IFIFO)
        .unwrap_or(false)
}
