//!
//! The command line interface and the logger setup of the binary.
//!

use clap::{ArgAction, Parser, Subcommand};
// ---
use lamport_script::config::LOGS_DIR;
use lamport_script::{Result, SchemeParams};

// ***
// The clap config for command line arguments.
// ***

/// Define the CLI.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,

    // --- optional ---
    /// TOML file with the scheme parameters (`digits`, `leaf_count`).
    #[clap(short, long, global = true)]
    pub config: Option<String>,
    /// Overrides the number of digits (the digest length in bytes).
    #[clap(short, long, global = true)]
    pub digits: Option<usize>,
    /// Overrides the number of leaves in each digit tree.
    #[clap(short, long, global = true)]
    pub leaves: Option<usize>,
    /// Increases the verbosity (repeat for more).
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    /// Also writes the log into the logs directory.
    #[clap(long, global = true)]
    pub log_file: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Derives the key pair and prints the extended private key and the public key.
    Generate {
        /// The master secret (64 hex chars).
        #[clap(short, long)]
        secret: String,
    },
    /// Signs the message with the one-time key.
    Sign {
        /// The master secret (64 hex chars).
        #[clap(short, long)]
        secret: String,
        /// The message in hex.
        #[clap(short, long)]
        message: String,
        /// Signs the message bytes directly instead of their envelope.
        #[clap(long)]
        raw: bool,
    },
    /// Prints the verifier program for the public key.
    Script {
        /// The public key (64 hex chars).
        #[clap(short, long)]
        public_key: String,
    },
    /// Runs the verifier program on the signature.
    Verify {
        /// The public key (64 hex chars).
        #[clap(short, long)]
        public_key: String,
        /// The signature in hex.
        #[clap(short, long)]
        signature: String,
        /// The message in hex; when given, the recovered digest must match it.
        #[clap(short, long)]
        message: Option<String>,
        /// Compares with the message bytes directly instead of their envelope.
        #[clap(long)]
        raw: bool,
    },
}

impl Args {
    ///
    /// Resolves the scheme parameters.
    ///
    /// The config file (or the canonical parameters without it) is overridden by the flags.
    ///
    pub fn scheme_params(&self) -> Result<SchemeParams> {
        let mut params = match &self.config {
            Some(path) => SchemeParams::from_file(path)?,
            None => SchemeParams::default(),
        };
        if let Some(digits) = self.digits {
            params.digits = digits;
        }
        if let Some(leaves) = self.leaves {
            params.leaf_count = leaves;
        }
        params.validate()?;
        Ok(params)
    }
}

///
/// Setups the logger so it ignores the debug & trace logs in the third-party libs.
///
pub fn setup_logger(verbosity: u64, log_file: bool) -> std::result::Result<(), fern::InitError> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Warn)
        // Allow for this crate
        .level_for(env!("CARGO_CRATE_NAME"), level)
        .chain(std::io::stderr());

    if log_file {
        std::fs::create_dir_all(LOGS_DIR)?;
        dispatch = dispatch.chain(fern::log_file(format!("{}output.log", LOGS_DIR))?);
    }
    dispatch.apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use lamport_script::Error;

    #[test]
    fn test_parse_sign_command() {
        let args = Args::parse_from([
            "lamport-script",
            "-vv",
            "sign",
            "--secret",
            "00",
            "-m",
            "abcd",
            "--raw",
        ]);
        assert_eq!(args.verbose, 2);
        match args.command {
            Command::Sign { message, raw, .. } => {
                assert_eq!(message, "abcd");
                assert!(raw);
            }
            c => panic!("unexpected command {c:?}"),
        }
    }

    #[test]
    fn test_flags_override_params() {
        let args = Args::parse_from(["lamport-script", "script", "-p", "00", "-d", "2", "-l", "4"]);
        assert_eq!(
            args.scheme_params().unwrap(),
            SchemeParams::new(2, 4).unwrap()
        );

        let args = Args::parse_from(["lamport-script", "script", "-p", "00"]);
        assert_eq!(args.scheme_params().unwrap(), SchemeParams::CANONICAL);

        let args = Args::parse_from(["lamport-script", "-l", "5", "script", "-p", "00"]);
        assert!(matches!(
            args.scheme_params(),
            Err(Error::StructuralInvariant(_))
        ));
    }
}
