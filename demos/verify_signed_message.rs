//
// Copyright (c) 2025 rmarshal-core contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Verify (or, with `--sign`, produce) an HMAC-signed message token.

use anyhow::Result;
use clap::Parser;
use rmarshal_core::{SignedMessage, Value};

#[derive(Parser)]
#[command(name = "verify_signed_message")]
#[command(about = "Verify or generate an ActiveSupport::MessageVerifier-style signed token")]
struct Args {
    /// The secret the token was signed with
    #[arg(short, long, env = "MESSAGE_SECRET")]
    secret: String,

    /// The purpose string the token was signed for
    #[arg(short, long)]
    purpose: String,

    /// Token to verify. If omitted, `--sign` must be given instead.
    #[arg(short, long)]
    token: Option<String>,

    /// Plaintext value to sign and print a token for, instead of verifying
    #[arg(long)]
    sign: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let verifier = SignedMessage::new(args.secret);

    if let Some(value) = args.sign {
        let token = verifier.generate(&value, &args.purpose)?;
        println!("{token}");
        return Ok(());
    }

    let token = args
        .token
        .ok_or_else(|| anyhow::anyhow!("either --token or --sign must be given"))?;

    match verifier.verify(&token, &args.purpose) {
        Value::Nil => {
            println!("invalid");
            std::process::exit(1);
        }
        value => println!("{value:?}"),
    }

    Ok(())
}
