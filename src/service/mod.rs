//! Proof-of-work records and the services that mint and check them.
//!
//! Every [`ProofOfWork`] carries an explicit version byte naming the algorithm
//! that produced it. A [`PowRegistry`] maps versions to services; the variant is
//! never guessed from the record's content.
pub mod equihash;
pub mod hashcash;
pub mod minter;

pub use equihash::{EquihashService, EquihashServiceBuilder};
pub use hashcash::HashCashService;
pub use minter::{MintHandle, Minter, MinterConfig, MinterConfigBuilder};

use crate::error::Error;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Algorithms a proof-of-work record can be minted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PowVersion {
    HashCash = 0,
    Equihash = 1,
}

impl PowVersion {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PowVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PowVersion::HashCash),
            1 => Ok(PowVersion::Equihash),
            other => Err(Error::UnknownVersion(other)),
        }
    }
}

impl From<PowVersion> for u8 {
    fn from(version: PowVersion) -> Self {
        version.as_u8()
    }
}

/// A minted proof of work over `payload`, bound to `challenge`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofOfWork {
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
    /// The nonce the proof was found at.
    pub counter: u64,
    #[serde(with = "hex::serde")]
    pub challenge: Vec<u8>,
    /// Difficulty as requested by the minter, before any scaling.
    pub difficulty: f64,
    pub duration_ms: u64,
    /// Algorithm-specific solution bytes; empty for hashcash.
    #[serde(with = "hex::serde")]
    pub solution: Vec<u8>,
    pub version: u8,
}

impl ProofOfWork {
    pub fn pow_version(&self) -> Result<PowVersion, Error> {
        PowVersion::try_from(self.version)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A proof-of-work algorithm behind a common mint/verify contract.
pub trait PowService: Debug + Send + Sync {
    fn version(&self) -> PowVersion;

    /// Mint synchronously, polling `should_stop` between attempts.
    ///
    /// Returns [`Error::Cancelled`] once `should_stop` reports `true`.
    fn mint_until(
        &self,
        payload: &[u8],
        challenge: &[u8],
        difficulty: f64,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<ProofOfWork, Error>;

    fn mint_blocking(
        &self,
        payload: &[u8],
        challenge: &[u8],
        difficulty: f64,
    ) -> Result<ProofOfWork, Error> {
        self.mint_until(payload, challenge, difficulty, &|| false)
    }

    /// Check the work in `pow` against its own payload, challenge and difficulty.
    fn verify(&self, pow: &ProofOfWork) -> bool;

    fn get_challenge(&self, item_id: &str, owner_id: &str) -> Result<Vec<u8>, Error> {
        derive_challenge(item_id, owner_id)
    }

    /// Whether a proof claiming `difficulty` satisfies a required `control_difficulty`.
    fn is_difficulty_sufficient(&self, difficulty: f64, control_difficulty: f64) -> bool {
        difficulty >= control_difficulty
    }

    /// Verify `pow` and additionally require that it was minted for
    /// `(item_id, owner_id)` at no less than `control_difficulty`.
    fn verify_with_control(
        &self,
        pow: &ProofOfWork,
        item_id: &str,
        owner_id: &str,
        control_difficulty: f64,
    ) -> bool {
        let challenge_matches = matches!(
            self.get_challenge(item_id, owner_id),
            Ok(challenge) if challenge == pow.challenge
        );
        challenge_matches
            && self.is_difficulty_sufficient(pow.difficulty, control_difficulty)
            && self.verify(pow)
    }
}

/// `sha256(item_id || 0x00 || owner_id)`. Ids containing NUL are rejected so
/// that distinct pairs can never collide.
pub fn derive_challenge(item_id: &str, owner_id: &str) -> Result<Vec<u8>, Error> {
    if item_id.contains('\0') || owner_id.contains('\0') {
        return Err(Error::InvalidArgument(
            "challenge ids must not contain NUL".into(),
        ));
    }
    let mut hasher = Sha256::new();
    hasher.update(item_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(owner_id.as_bytes());
    Ok(hasher.finalize().to_vec())
}

/// Explicit version → service table.
#[derive(Debug, Clone, Default)]
pub struct PowRegistry {
    services: BTreeMap<PowVersion, Arc<dyn PowService>>,
}

impl PowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashcash as version 0 and Equihash(90, 5) as version 1.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HashCashService));
        registry.register(Arc::new(EquihashService::default()));
        registry
    }

    /// Register `service` under its own version, returning any service it replaced.
    pub fn register(&mut self, service: Arc<dyn PowService>) -> Option<Arc<dyn PowService>> {
        self.services.insert(service.version(), service)
    }

    pub fn get(&self, version: PowVersion) -> Result<&Arc<dyn PowService>, Error> {
        self.services
            .get(&version)
            .ok_or(Error::UnknownVersion(version.as_u8()))
    }

    pub fn versions(&self) -> impl Iterator<Item = PowVersion> + '_ {
        self.services.keys().copied()
    }

    fn service_for(&self, pow: &ProofOfWork) -> Option<&Arc<dyn PowService>> {
        let version = pow.pow_version().ok()?;
        self.services.get(&version)
    }

    /// Dispatch on `pow.version`; unknown or unregistered versions fail.
    pub fn verify(&self, pow: &ProofOfWork) -> bool {
        self.service_for(pow).is_some_and(|service| service.verify(pow))
    }

    pub fn verify_with_control(
        &self,
        pow: &ProofOfWork,
        item_id: &str,
        owner_id: &str,
        control_difficulty: f64,
    ) -> bool {
        self.service_for(pow).is_some_and(|service| {
            service.verify_with_control(pow, item_id, owner_id, control_difficulty)
        })
    }
}
