//! Memory-hard proof of work built on Equihash.
//!
//! The [`equihash`] module implements the puzzle itself: parameter validation,
//! the collision-search solver, the canonical solution encoding and the
//! verifier. [`difficulty`] maps a floating-point difficulty onto the 256-bit
//! bound a solution's hash must stay under.
//!
//! On top of that, [`service`] wraps the puzzle (and a plain hashcash fallback)
//! in versioned [`ProofOfWork`] records, and [`Minter`] runs mints on a
//! background thread with cancellation and timeouts.
//!
//! ```no_run
//! use equipow::{Equihash, PowRegistry, PowService, PowVersion};
//!
//! let params = Equihash::new(90, 5, 2.0)?;
//! let puzzle = params.puzzle(b"seed");
//! let solution = puzzle.find_solution();
//! assert!(puzzle.verify(&solution));
//!
//! let registry = PowRegistry::standard();
//! let service = registry.get(PowVersion::Equihash)?;
//! let challenge = service.get_challenge("item", "owner")?;
//! let pow = service.mint_blocking(b"payload", &challenge, 1.0)?;
//! assert!(registry.verify_with_control(&pow, "item", "owner", 1.0));
//! # Ok::<(), equipow::Error>(())
//! ```
pub mod difficulty;
pub mod equihash;
pub mod error;
pub mod numeric;
pub mod service;
pub mod work;

pub use difficulty::{adjust_difficulty, hash_upper_bound};
pub use equihash::{sort_inputs, Equihash, Puzzle, Solution};
pub use error::Error;
pub use service::{
    derive_challenge, EquihashService, EquihashServiceBuilder, HashCashService, MintHandle,
    Minter, MinterConfig, MinterConfigBuilder, PowRegistry, PowService, PowVersion, ProofOfWork,
};
pub use work::{StopFlag, StopReason};
