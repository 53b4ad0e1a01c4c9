//! Ring-vector storage and sampling for secure multi-party computation (MPC).
//!
//! MPC protocols based on additive secret sharing compute in the rings `Z/2^k Z` and
//! move around long vectors of ring elements: shares, masks and correlated randomness.
//! This crate provides the building blocks below the protocols:
//!
//! - [`ring`]: the rings `Z/2^k Z` for `k` in `{1, 8, 16, 32, 64}` as the types
//!   [`Ring1`], [`Ring8`], [`Ring16`], [`Ring32`] and [`Ring64`].
//! - [`rvector`]: [`RVector`], a fixed-length vector of ring elements with element-wise
//!   arithmetic, which can lend its buffer to one collaborator at a time via a [`Lease`].
//! - [`rng`]: [`Sampler`], unbiased uniform sampling of ring elements from an arbitrary
//!   interval, amortized over large vectors.
//! - [`crc`]: table-driven CRC-64 (ECMA-182 and ISO polynomials).
//! - [`mrvf`]: the MRVF file format, storing a vector together with its ring width and a
//!   CRC-64 checksum.
//!
//! Caller bugs such as mismatched vector lengths are reported as [`ContractViolation`]s,
//! see the [`contract`] module for the policy.
//!
//! ## Example
//!
//! ```
//! use mpmt::{MrvfHandler, Ring32, Sampler};
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sampler = Sampler::new(StdRng::seed_from_u64(42));
//! let mut shares = sampler.rvector_range(Ring32(0), Ring32(999), 1000)?;
//! let mask = sampler.rvector::<Ring32>(1000)?;
//! shares.try_add_assign(&mask)?;
//!
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("shares.mrvf");
//! let handler = MrvfHandler::<Ring32>::new();
//! handler.save_to_path(&path, &mut shares)?;
//! assert_eq!(handler.load_from_path(&path)?, shares);
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod contract;
pub mod crc;
pub mod mrvf;
pub mod ring;
pub mod rng;
pub mod rvector;

pub use contract::ContractViolation;
pub use crc::{Crc64, CrcStandard};
pub use mrvf::MrvfHandler;
pub use ring::{Ring, Ring1, Ring8, Ring16, Ring32, Ring64, RingWidth};
pub use rng::{EntropySource, Sampler, SamplerConfig};
pub use rvector::{Lease, RVector};
