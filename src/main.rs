//!
//! The command line front-end: key generation, signing, verifier compilation and dry-run
//! verification.
//!
mod cli;
// ---
use clap::Parser;
use log::{debug, error, info};
// ---
use crate::cli::{Args, Command};
use lamport_script::common::{decode_hex, decode_hex_array};
use lamport_script::hash::envelope;
use lamport_script::{
    Error, LamportScheme, MasterSecret, PublicKey, Result, SchemeParams, ScriptCompiler,
    Signature, SignatureSchemeTrait, StackMachine,
};

/// The digest to sign (or compare with) for the hex message.
fn message_digest(message: &str, raw: bool) -> Result<Vec<u8>> {
    let message = decode_hex("message", message)?;
    if raw {
        Ok(message)
    } else {
        Ok(envelope(&message).to_vec())
    }
}

fn run_generate(params: SchemeParams, secret: &str) -> Result<()> {
    let secret: MasterSecret = secret.parse()?;
    let scheme: LamportScheme = LamportScheme::new(params)?;
    let key_pair = scheme.gen_key_pair(&secret)?;

    println!("xprv: {}", key_pair.secret.xprv());
    println!("public key: {}", hex::encode(key_pair.public));
    Ok(())
}

fn run_sign(params: SchemeParams, secret: &str, message: &str, raw: bool) -> Result<()> {
    let secret: MasterSecret = secret.parse()?;
    let digest = message_digest(message, raw)?;

    let scheme: LamportScheme = LamportScheme::new(params)?;
    let key_pair = scheme.gen_key_pair(&secret)?;
    let signature = scheme.sign(&digest, &key_pair.secret)?;

    println!("digest: {}", hex::encode(&digest));
    println!("signature: {}", signature);
    Ok(())
}

fn run_script(params: SchemeParams, public_key: &str) -> Result<()> {
    let public_key: PublicKey = decode_hex_array("public key", public_key)?;
    let program = ScriptCompiler::new(params)?.compile();

    print!("{}", program.bind(&public_key));
    Ok(())
}

fn run_verify(
    params: SchemeParams,
    public_key: &str,
    signature: &str,
    message: Option<&str>,
    raw: bool,
) -> Result<()> {
    let public_key: PublicKey = decode_hex_array("public key", public_key)?;
    let signature = Signature::from_bytes(&decode_hex("signature", signature)?, &params)?;
    let program = ScriptCompiler::new(params)?.compile();

    let digest = StackMachine::new().execute(&program, &public_key, signature.witness())?;
    info!(
        "The program accepted the signature after {} instructions.",
        program.instruction_count()
    );

    if let Some(message) = message {
        let expected = message_digest(message, raw)?;
        if expected != digest {
            return Err(Error::Precondition(format!(
                "the signature authenticates {}, not {}",
                hex::encode(&digest),
                hex::encode(&expected)
            )));
        }
        debug!("The digest matches the message.");
    }

    println!("digest: {}", hex::encode(&digest));
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let params = args.scheme_params()?;
    debug!("Running with {:?}.", params);

    match &args.command {
        Command::Generate { secret } => run_generate(params, secret),
        Command::Sign {
            secret,
            message,
            raw,
        } => run_sign(params, secret, message, *raw),
        Command::Script { public_key } => run_script(params, public_key),
        Command::Verify {
            public_key,
            signature,
            message,
            raw,
        } => run_verify(params, public_key, signature, message.as_deref(), *raw),
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = cli::setup_logger(u64::from(args.verbose), args.log_file) {
        panic!("Unable to initialize the logger!\nERROR: {}", e);
    }

    if let Err(e) = run(&args) {
        error!("{e}");
        std::process::exit(1);
    }
}
