//! Policy document validation CLI tool
//!
//! Validates a kioskd policy document (the `AccessLevels` JSON upload) and
//! reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let document_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("Usage: validate-policies <policy-document.json>");
            eprintln!();
            eprintln!("Validates a kioskd policy document before it is uploaded.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-policies policies.json");
            return ExitCode::from(2);
        }
    };

    if !document_path.exists() {
        eprintln!("Error: Policy document not found: {}", document_path.display());
        return ExitCode::from(1);
    }

    match kiosk_config::load_policy_document(&document_path) {
        Ok(policies) => {
            println!("✓ Policy document is valid");
            println!();
            println!("Summary:");
            println!("  Access levels: {}", policies.len());

            if !policies.is_empty() {
                println!();
                println!("Access levels:");
                for policy in &policies {
                    println!(
                        "  - {} [level {}]: privilege {} {}, {}",
                        policy.name,
                        policy.access_level,
                        policy.direction,
                        policy.required_privilege,
                        policy.window
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Policy document validation failed");
            eprintln!();
            match &e {
                kiosk_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                kiosk_config::ConfigError::DocumentError(parse_err) => {
                    eprintln!("JSON parse error:");
                    eprintln!("  {}", parse_err);
                }
                kiosk_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                other => {
                    eprintln!("{}", other);
                }
            }
            ExitCode::from(1)
        }
    }
}
