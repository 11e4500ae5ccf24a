//! Signature verification for framed blocks.
//!
//! Blocks may carry an Ed25519 signature over their stored payload, checked
//! against the verifying key embedded in the container preamble. Signing is
//! not mandatory in the observed format versions: unsigned blocks are marked
//! [`TrustLevel::Unsigned`] rather than rejected, and by default a failed
//! verification only flags the derived entity as untrusted. Strict mode
//! turns failures into [`crate::Error::Integrity`] at the facade.

use crate::container::{BlockRecord, Preamble};
use ed25519_dalek::{Signature, VerifyingKey};
use tracing::{trace, warn};

/// Verification outcome for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    /// Verification has not run yet
    Unverified,
    /// The signature checked out against the container key
    Verified,
    /// The block carries no signature
    Unsigned,
    /// The signature did not verify (or no usable key exists)
    Failed,
}

/// Verifies block signatures against the container's embedded key.
pub struct IntegrityVerifier {
    key: Option<VerifyingKey>,
}

impl IntegrityVerifier {
    /// Builds a verifier from the container preamble.
    ///
    /// All-zero key material means no key; key bytes that do not decode to a
    /// valid curve point are treated the same way, so signed blocks in such
    /// containers fail verification instead of aborting the read.
    pub fn from_preamble(preamble: &Preamble) -> Self {
        let key = if preamble.has_key() {
            match VerifyingKey::from_bytes(&preamble.key_material) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("container key material is not a valid Ed25519 key: {e}");
                    None
                }
            }
        } else {
            None
        };
        Self { key }
    }

    /// Classifies the trust level of one framed block.
    pub fn verify(&self, block: &BlockRecord) -> TrustLevel {
        let Some(signature) = &block.signature else {
            return TrustLevel::Unsigned;
        };

        let Some(key) = &self.key else {
            warn!(
                block = block.index,
                offset = block.offset,
                "signed block but container embeds no usable key"
            );
            return TrustLevel::Failed;
        };

        let signature = Signature::from_bytes(signature);
        match key.verify_strict(&block.payload, &signature) {
            Ok(()) => {
                trace!(block = block.index, "signature verified");
                TrustLevel::Verified
            }
            Err(e) => {
                warn!(
                    block = block.index,
                    offset = block.offset,
                    "signature verification failed: {e}"
                );
                TrustLevel::Failed
            }
        }
    }
}
