//! Stake-proof verification and replay protection.
//!
//! A stake proof is a self-signed receipt. Its signature must verify
//! against the *transport* identity of the peer presenting it, which
//! stops a proof lifted off one peer from being presented by another.
//! Replay of an already-spent proof is caught separately by
//! [`ReplayGuard`] — validation itself is stateless, because heartbeats
//! legitimately re-present the same proof.

use std::collections::HashSet;
use std::sync::Mutex;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::protocol::StakeProof;

/// Why a stake proof was rejected. The `Display` text is what the peer
/// sees in the response envelope.
#[derive(Debug, Error)]
pub enum StakeError {
    #[error("stake proof required (min {0:.2})")]
    Missing(f64),

    #[error("stake too low: have {have:.2} need {need:.2}")]
    TooLow { have: f64, need: f64 },

    #[error("stake staker mismatch (expected {expected} got {got})")]
    StakerMismatch { expected: String, got: String },

    #[error("missing pubkey for {0}")]
    PubkeyMissing(String),

    #[error("stake signature invalid")]
    SignatureInvalid,
}

/// Canonical signed payload: `tx_hash|amount|nonce|timestamp|chain_id`,
/// amount in fixed six-decimal notation. Signers and the registry must
/// agree on this rendering byte for byte.
pub fn stake_payload(proof: &StakeProof) -> String {
    format!(
        "{}|{:.6}|{}|{}|{}",
        proof.tx_hash, proof.amount, proof.nonce, proof.timestamp, proof.chain_id
    )
}

/// SHA-256 digest of the canonical payload. This is the message the
/// Ed25519 signature covers.
pub fn stake_digest(proof: &StakeProof) -> [u8; 32] {
    Sha256::digest(stake_payload(proof).as_bytes()).into()
}

/// Validate a stake proof presented by `peer_id`.
///
/// Checks, in order: presence, amount against `min_stake`, staker
/// binding (an empty `staker` means "the presenter"), availability of
/// the peer's public key, and the signature over [`stake_digest`].
pub fn verify_stake(
    peer_id: &str,
    pubkey: Option<&VerifyingKey>,
    proof: Option<&StakeProof>,
    min_stake: f64,
) -> Result<(), StakeError> {
    let proof = proof.ok_or(StakeError::Missing(min_stake))?;

    if proof.amount < min_stake {
        return Err(StakeError::TooLow {
            have: proof.amount,
            need: min_stake,
        });
    }

    if !proof.staker.is_empty() && proof.staker != peer_id {
        return Err(StakeError::StakerMismatch {
            expected: short_id(peer_id),
            got: proof.staker.clone(),
        });
    }

    let pubkey = pubkey.ok_or_else(|| StakeError::PubkeyMissing(short_id(peer_id)))?;

    let signature =
        Signature::from_slice(&proof.signature).map_err(|_| StakeError::SignatureInvalid)?;
    pubkey
        .verify(&stake_digest(proof), &signature)
        .map_err(|_| StakeError::SignatureInvalid)
}

/// Log-sized prefix of a peer identity string.
pub fn short_id(peer_id: &str) -> String {
    peer_id.chars().take(10).collect()
}

/// Process-wide set of stake proofs that already admitted a
/// registration, keyed by `"<tx_hash>|<nonce>"`.
///
/// Grows monotonically for the process lifetime and is deliberately not
/// persisted: after a restart, previously-spent proofs are accepted
/// again. Lock order: this mutex is never held together with the
/// registry state mutex.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    seen: Mutex<HashSet<String>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim `(tx_hash, nonce)`. Returns `false` when the
    /// pair was already spent by an earlier registration.
    pub fn check_and_claim(&self, tx_hash: &str, nonce: i64) -> bool {
        let key = format!("{tx_hash}|{nonce}");
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.insert(key)
    }
}
