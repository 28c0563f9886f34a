//! Certify PDFs from the command line
//!
//! Usage:
//!   certify check-identity
//!   certify sign <input.pdf> <output.pdf> [--reason R] [--location L] [--contact C]
//!                [--visible] [--page N] [--embedded]
//!   certify sign-and-encrypt <input.pdf> <output.pdf> [sign options]
//!                [--user-password P] [--owner-password P] [--permissions JSON] [--rc4]
//!   certify inspect <input.pdf>
//!
//! The signing identity comes from the `PDF_CERTIFY_*` environment variables.

use pdf_certify::encryption::{EncryptionAlgorithm, EncryptionOptions, Permissions};
use pdf_certify::pipeline::{CertifyOptions, SignAndCertify};
use pdf_certify::signatures::{extract_metadata, SignatureMode, SignatureVerifier, SigningOptions};
use pdf_certify::{CertificateValidator, IdentityStore, PipelineConfig};
use std::fs;
use std::path::PathBuf;
use std::process;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

struct CommandArgs {
    positional: Vec<String>,
    signing: SigningOptions,
    encryption: EncryptionOptions,
}

impl CommandArgs {
    fn parse(args: &[String]) -> CliResult<Self> {
        let mut positional = Vec::new();
        let mut signing = SigningOptions::default();
        let mut encryption = EncryptionOptions::disabled();

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || -> CliResult<String> {
                i += 1;
                args.get(i)
                    .cloned()
                    .ok_or_else(|| format!("{flag} requires a value").into())
            };
            match flag {
                "--reason" => signing.reason = value()?,
                "--location" => signing.location = value()?,
                "--contact" => signing.contact_info = value()?,
                "--visible" => signing.visible = true,
                "--page" => {
                    signing.visible = true;
                    signing.page_number = Some(value()?.parse()?);
                },
                "--embedded" => signing.mode = SignatureMode::Embedded,
                "--user-password" => encryption.user_password = Some(value()?),
                "--owner-password" => encryption.owner_password = Some(value()?),
                "--permissions" => {
                    encryption.permissions = serde_json::from_str::<Permissions>(&value()?)?
                },
                "--rc4" => encryption.algorithm = EncryptionAlgorithm::Rc4_128,
                other if other.starts_with("--") => return Err(format!("Unknown option {other}").into()),
                other => positional.push(other.to_string()),
            }
            i += 1;
        }

        Ok(Self {
            positional,
            signing,
            encryption,
        })
    }

    fn input_output(&self) -> CliResult<(PathBuf, PathBuf)> {
        match self.positional.as_slice() {
            [input, output] => Ok((PathBuf::from(input), PathBuf::from(output))),
            _ => Err("expected <input.pdf> <output.pdf>".into()),
        }
    }
}

fn check_identity() -> CliResult<()> {
    let identity = IdentityStore::from_env().load()?;
    let certificate = identity.certificate();
    let issues = CertificateValidator::validate(&identity).err().unwrap_or_default();

    let report = serde_json::json!({
        "commonName": identity.common_name(),
        "issuer": identity.issuer_name(),
        "source": identity.source(),
        "serialNumber": certificate.map(|c| c.serial_number()),
        "notBefore": certificate.map(|c| c.not_before().to_rfc3339()),
        "notAfter": certificate.map(|c| c.not_after().to_rfc3339()),
        "keySize": identity.public_key().map(|k| k.key_size),
        "valid": issues.is_empty(),
        "issues": issues.iter().map(ToString::to_string).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn certify(args: &[String], encrypt: bool) -> CliResult<()> {
    let mut parsed = CommandArgs::parse(args)?;
    let (input, output) = parsed.input_output()?;
    parsed.encryption.enabled = encrypt;

    let document = fs::read(&input)?;
    let pipeline = SignAndCertify::from_config(&PipelineConfig::from_env());
    let options = CertifyOptions::new(parsed.signing, parsed.encryption);
    let result = pipeline.sign_and_certify_with_store(&document, &IdentityStore::from_env(), &options)?;

    fs::write(&output, &result.document)?;
    if let Some(warning) = &result.warning {
        eprintln!("Warning: {warning}");
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn inspect(args: &[String]) -> CliResult<()> {
    let [input] = args else {
        return Err("expected <input.pdf>".into());
    };
    let document = fs::read(input)?;
    let label = extract_metadata(&document)?;
    let signatures = SignatureVerifier::new().verify_document(&document)?;

    let report = serde_json::json!({
        "certification": label,
        "signatures": signatures,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn usage() -> &'static str {
    "Usage: certify <check-identity | sign | sign-and-encrypt | inspect> [args]"
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", usage());
        process::exit(2);
    };

    let outcome = match command.as_str() {
        "check-identity" => check_identity(),
        "sign" => certify(rest, false),
        "sign-and-encrypt" => certify(rest, true),
        "inspect" => inspect(rest),
        _ => {
            eprintln!("{}", usage());
            process::exit(2);
        },
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
