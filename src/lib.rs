//! A Rust implementation of the external client interface of SPDZ-style secure multi-party
//! computation (MPC) engines, based on [Confidential Benchmarking based on Multiparty
//! Computation](https://eprint.iacr.org/2015/1006.pdf).
//!
//! A client that is not one of the computing parties can submit private inputs to a running
//! computation and receive an authenticated result, without trusting any single computing party.
//!
//! ## Main Components
//!
//! * [`protocol`]: The client [`protocol::Session`] with its two primitives, masked inputs
//!   ([`protocol::send_private_inputs`]) and authenticated outputs ([`protocol::fetch_result`]).
//! * [`channel`]: Communication abstractions for exchanging messages with the computing parties,
//!   including a TCP transport.
//! * [`field`]: Arithmetic in the prime field all shares live in.
//! * [`params`]: Loading of the field parameters shared with the computing parties.
//! * [`sim`]: Simulated computing parties for tests and local experiments.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use spdz_extio::{
//!     channel::{TcpChannel, tcp::party_endpoints},
//!     params::FieldParams,
//!     protocol::{RoundStatus, Session},
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let field = FieldParams::load("Player-Data/3-128-128")?.field()?;
//! let endpoints = party_endpoints("localhost", 14000, 3)?;
//! let channel = TcpChannel::connect(&endpoints, std::time::Duration::from_secs(60)).await?;
//!
//! let mut session = Session::new(channel, field.clone());
//! session.handshake(0, RoundStatus::Finished).await?;
//! session.send_private_inputs(&[field.element(100u32)]).await?;
//! let result = session.receive_result().await?;
//! println!("Computation result: {result}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! Inputs are masked with a random value that no single party knows, and the triples used for
//! masking as well as the result are checked for consistency, detecting a cheating party except
//! with probability about `1/p`. The channels between client and parties are neither encrypted nor
//! authenticated, this has to be provided by the network.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod field;
pub mod params;
pub mod protocol;
pub mod sim;

mod reconstruct;

pub use reconstruct::Triple;
