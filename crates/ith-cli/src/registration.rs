//! # Registration Id Subcommand

use anyhow::bail;
use clap::Args;

use ith_core::extract_registration_id;

/// Arguments for the registration-id subcommand.
#[derive(Args, Debug)]
pub struct RegistrationIdArgs {
    /// Pairing link, e.g. `https://id.ai/pair#aBcDe`.
    pub url: String,
}

pub fn run(args: &RegistrationIdArgs) -> anyhow::Result<()> {
    match extract_registration_id(&args.url) {
        Some(id) => {
            println!("{id}");
            Ok(())
        }
        None => bail!("no registration id in {:?}", args.url),
    }
}
