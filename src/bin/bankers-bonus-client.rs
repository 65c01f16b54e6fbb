//! Client of the bankers' bonus program: each banker submits a private bonus and all of them learn
//! which banker, by client id, has the highest bonus and pays for lunch.
//!
//! To run with 3 computing parties listening on ports 14000-14002:
//!
//! ```text
//! bankers-bonus-client 0 3 100 0
//! bankers-bonus-client 1 3 200 0
//! bankers-bonus-client 2 3 50 1
//! ```
//!
//! The winner is the second client, with id 1.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use spdz_extio::{
    channel::{TcpChannel, tcp::party_endpoints},
    params::{DEFAULT_GF2N_DEGREE, DEFAULT_PRIME_BITS, FieldParams, prep_dir},
    protocol::{RoundStatus, Session},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A client submitting a private bonus to SPDZ engines running the bankers' bonus program.
#[derive(Debug, Parser)]
#[command(name = "bankers-bonus-client")]
struct Cli {
    /// The id of this client, starting with 0.
    client_id: u32,
    /// The number of computing parties, at least one.
    #[arg(value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    parties: usize,
    /// The bonus to compare.
    bonus: u64,
    /// 1 if this is the last client of the round, 0 if more clients will join.
    #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
    finish: u8,
    /// The host the computing parties run on.
    #[arg(default_value = "localhost")]
    host: String,
    /// The port of party 0, party i listens on `port_base + i`.
    #[arg(default_value_t = 14000)]
    port_base: u16,
    /// The directory holding the `Params-Data` file, defaults to the preprocessing directory of
    /// the setup.
    #[arg(long)]
    params_dir: Option<PathBuf>,
    /// The degree of the binary field, used to locate the default preprocessing directory.
    #[arg(long, default_value_t = DEFAULT_GF2N_DEGREE)]
    degree: u32,
    /// How long to wait for each party, in seconds.
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let params_dir = cli
        .params_dir
        .unwrap_or_else(|| prep_dir(cli.parties, DEFAULT_PRIME_BITS, cli.degree));
    let params = FieldParams::load(&params_dir)?;
    let field = params.field()?;

    let endpoints = party_endpoints(&cli.host, cli.port_base, cli.parties)?;
    let timeout = Duration::from_secs(cli.timeout_secs);
    let channel = TcpChannel::connect(&endpoints, timeout)
        .await
        .context("could not connect to the computing parties")?;

    let mut session = Session::new(channel, field.clone());
    session
        .handshake(cli.client_id, RoundStatus::from(cli.finish == 1))
        .await?;
    println!("Finish setup socket connections to SPDZ engines.");

    session
        .send_private_inputs(&[field.element(cli.bonus)])
        .await?;
    println!("Sent private inputs to each SPDZ engine, waiting for result...");

    let winner = session.receive_result().await?;
    println!("Winning client id is : {winner}");

    session.into_channel().close().await?;
    info!("Closed connections");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn requires_at_least_one_party() {
        assert!(Cli::try_parse_from(["bankers-bonus-client", "0", "0", "100", "1"]).is_err());
        let cli = Cli::try_parse_from(["bankers-bonus-client", "0", "3", "100", "1"]).unwrap();
        assert_eq!(cli.parties, 3);
        assert_eq!(cli.port_base, 14000);
    }

    #[test]
    fn finish_is_zero_or_one() {
        assert!(Cli::try_parse_from(["bankers-bonus-client", "0", "3", "100", "2"]).is_err());
    }
}
