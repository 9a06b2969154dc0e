//
// Copyright (c) 2025 rmarshal-core contributors
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//

//! Decrypt an "authenticated encrypted cookie" session value from the
//! command line and print its decoded mapping.

use anyhow::{Context, Result};
use clap::Parser;
use rmarshal_core::SessionEnvelope;

#[derive(Parser)]
#[command(name = "decode_cookie")]
#[command(about = "Decrypt a Rails-style authenticated encrypted cookie")]
struct Args {
    /// Raw cookie value, as sent in the Cookie header (still percent-encoded)
    #[arg(short, long)]
    cookie: String,

    /// The deployment's secret_key_base
    #[arg(short, long, env = "SECRET_KEY_BASE")]
    secret_key_base: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let envelope = SessionEnvelope::new(args.cookie, args.secret_key_base);
    let session = envelope
        .decrypt()
        .context("failed to decrypt session cookie")?;

    for (key, value) in session {
        println!("{key:?} => {value:?}");
    }

    Ok(())
}
