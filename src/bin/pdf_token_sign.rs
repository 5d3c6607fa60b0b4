//! Sign, prepare and verify PDFs from the command line.
//!
//! Keys are loaded into a software token that answers like a hardware token
//! behind a signing bridge.
//!
//! Usage:
//!   pdf_token_sign sign <input.pdf> --cert <cert.pem> --key <key.pem> [--output <out.pdf>]
//!                  [--config <signer.json>] [--reason ..] [--name ..] [--location ..]
//!                  [--contact ..] [--signature-length N] [--cades]
//!   pdf_token_sign presign <input.pdf> [--output <out.pdf>] [--signature-length N] [--config <signer.json>]
//!   pdf_token_sign verify <signed.pdf>
//!
//! Set RUST_LOG=debug for stage-by-stage offsets.

use pdf_token_sign::config::SignerConfig;
use pdf_token_sign::provider::SoftwareToken;
use pdf_token_sign::signatures::{SignatureSubFilter, SignatureVerifier};
use pdf_token_sign::{pipeline, Error, Result};
use std::path::{Path, PathBuf};

const USAGE: &str = "Usage:
  pdf_token_sign sign <input.pdf> --cert <cert.pem> --key <key.pem> [--output <out.pdf>]
                 [--config <signer.json>] [--reason ..] [--name ..] [--location ..]
                 [--contact ..] [--signature-length N] [--cades]
  pdf_token_sign presign <input.pdf> [--output <out.pdf>] [--signature-length N] [--config <signer.json>]
  pdf_token_sign verify <signed.pdf>";

#[derive(Debug, Default)]
struct CliArgs {
    command: String,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    config: Option<PathBuf>,
    reason: Option<String>,
    name: Option<String>,
    location: Option<String>,
    contact: Option<String>,
    signature_length: Option<usize>,
    cades: bool,
}

impl CliArgs {
    fn from_args(args: &[String]) -> Result<Self> {
        let mut parsed = CliArgs {
            command: args.get(1).cloned().unwrap_or_default(),
            ..CliArgs::default()
        };

        let mut i = 2;
        while i < args.len() {
            let value = |i: usize| {
                args.get(i + 1)
                    .cloned()
                    .ok_or_else(|| Error::Config(format!("{} needs a value", args[i])))
            };
            match args[i].as_str() {
                "--output" | "-o" => {
                    parsed.output = Some(PathBuf::from(value(i)?));
                    i += 1;
                },
                "--cert" => {
                    parsed.cert = Some(PathBuf::from(value(i)?));
                    i += 1;
                },
                "--key" => {
                    parsed.key = Some(PathBuf::from(value(i)?));
                    i += 1;
                },
                "--config" => {
                    parsed.config = Some(PathBuf::from(value(i)?));
                    i += 1;
                },
                "--reason" => {
                    parsed.reason = Some(value(i)?);
                    i += 1;
                },
                "--name" => {
                    parsed.name = Some(value(i)?);
                    i += 1;
                },
                "--location" => {
                    parsed.location = Some(value(i)?);
                    i += 1;
                },
                "--contact" => {
                    parsed.contact = Some(value(i)?);
                    i += 1;
                },
                "--signature-length" => {
                    let raw = value(i)?;
                    let length = raw
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid signature length {:?}", raw)))?;
                    parsed.signature_length = Some(length);
                    i += 1;
                },
                "--cades" => parsed.cades = true,
                other if other.starts_with('-') => {
                    return Err(Error::Config(format!("unknown option {}", other)));
                },
                other => {
                    if parsed.input.is_some() {
                        return Err(Error::Config(format!("unexpected argument {}", other)));
                    }
                    parsed.input = Some(PathBuf::from(other));
                },
            }
            i += 1;
        }

        Ok(parsed)
    }

    fn input(&self) -> Result<&Path> {
        self.input
            .as_deref()
            .ok_or_else(|| Error::Config("missing input file".to_string()))
    }

    fn output_or(&self, suffix: &str) -> Result<PathBuf> {
        if let Some(output) = &self.output {
            return Ok(output.clone());
        }
        let input = self.input()?;
        let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
        Ok(input.with_file_name(format!("{}.{}.pdf", stem, suffix)))
    }

    fn signer_config(&self) -> Result<SignerConfig> {
        let mut config = match &self.config {
            Some(path) => SignerConfig::from_json_file(path)?,
            None => SignerConfig::default(),
        };
        if let Some(reason) = &self.reason {
            config = config.with_reason(reason.clone());
        }
        if let Some(name) = &self.name {
            config = config.with_name(name.clone());
        }
        if let Some(location) = &self.location {
            config = config.with_location(location.clone());
        }
        if let Some(contact) = &self.contact {
            config = config.with_contact_info(contact.clone());
        }
        if let Some(length) = self.signature_length {
            config = config.with_signature_length(length);
        }
        if self.cades {
            config = config.with_sub_filter(SignatureSubFilter::CadesDetached);
        }
        config.validate()?;
        Ok(config)
    }
}

async fn sign(args: &CliArgs) -> Result<()> {
    let cert = args
        .cert
        .as_ref()
        .ok_or_else(|| Error::Config("sign needs --cert".to_string()))?;
    let key = args
        .key
        .as_ref()
        .ok_or_else(|| Error::Config("sign needs --key".to_string()))?;

    let token = SoftwareToken::from_files(cert, key)?;
    let config = args.signer_config()?;
    let pdf = std::fs::read(args.input()?)?;

    let signed = pipeline::sign_document(&pdf, token.certificate_id(), &token, &config).await?;

    let output = args.output_or("signed")?;
    std::fs::write(&output, &signed)?;
    println!("Signed {} -> {}", args.input()?.display(), output.display());
    Ok(())
}

fn presign(args: &CliArgs) -> Result<()> {
    let config = args.signer_config()?;
    let pdf = std::fs::read(args.input()?)?;
    let prepared = pipeline::presign(&pdf, &config)?;

    let output = args.output_or("prepared")?;
    std::fs::write(&output, &prepared)?;
    println!("Prepared {} -> {}", args.input()?.display(), output.display());
    Ok(())
}

fn verify(args: &CliArgs) -> Result<bool> {
    let pdf = std::fs::read(args.input()?)?;
    let results = SignatureVerifier::new().verify_all(&pdf)?;
    if results.is_empty() {
        println!("No signatures found");
        return Ok(false);
    }

    let mut all_ok = true;
    for (index, result) in results.iter().enumerate() {
        let info = &result.signature_info;
        println!("Signature {}: {:?}", index + 1, result.status);
        if let Some(cn) = &info.certificate_cn {
            println!("  Signer:      {}", cn);
        }
        if let Some(issuer) = &info.certificate_issuer {
            println!("  Issuer:      {}", issuer);
        }
        if let Some(time) = &info.signing_time {
            println!("  Signed at:   {}", time);
        }
        if let Some(reason) = &info.reason {
            println!("  Reason:      {}", reason);
        }
        println!("  ByteRange:   {:?}", info.byte_range);
        for message in &result.messages {
            println!("  - {}", message);
        }
        all_ok &= result.status.is_ok();
    }
    Ok(all_ok)
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let cli = match CliArgs::from_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        },
    };

    let outcome = match cli.command.as_str() {
        "sign" => sign(&cli).await.map(|_| true),
        "presign" => presign(&cli).map(|_| true),
        "verify" => verify(&cli),
        "" | "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            return;
        },
        other => {
            eprintln!("Unknown command {:?}\n\n{}", other, USAGE);
            std::process::exit(2);
        },
    };

    match outcome {
        Ok(true) => {},
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        },
    }
}
