use anyhow::{anyhow, Result};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use sha2::{Digest as _, Sha256};
use sha3::{Digest as _, Keccak256};

/// Byte length of a recoverable secp256k1 signature: r ‖ s ‖ v.
pub const SIGNATURE_BYTES: usize = 65;

/// A 20-byte settlement-layer account address.
pub type Address = [u8; 20];

/// A 256-bit digest.
pub type Hash = [u8; 32];

/// Reserved owner address marking an output as an exit to the settlement
/// layer. Fixed by the protocol; no real account can occupy it.
pub const EXIT_ADDRESS: Address = [0xff; 20];

pub const ZERO_ADDRESS: Address = [0u8; 20];
pub const ZERO_HASH: Hash = [0u8; 32];

const SIGNATURE_PREAMBLE: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// A recoverable secp256k1 signature in r ‖ s ‖ v layout. The recovery id
/// `v` is accepted both raw (0/1) and in the legacy 27/28 convention.
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signature(#[serde(with = "BigArray")] pub [u8; SIGNATURE_BYTES]);

impl Signature {
    pub fn zero() -> Self {
        Signature([0u8; SIGNATURE_BYTES])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_BYTES] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(self.0))
    }
}

/// Keccak-256, the digest the settlement layer verifies against.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256, used for content-addressing transactions in storage.
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Digest of a 32-byte payload wrapped in the settlement-layer signed-message
/// preamble. Wallet signatures are produced over this, not the raw digest.
pub fn geth_hash(digest: &Hash) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(SIGNATURE_PREAMBLE);
    hasher.update(digest);
    hasher.finalize().into()
}

/// Derives the address for a verifying key: the low 20 bytes of the keccak
/// digest of the uncompressed curve point.
pub fn address_from_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut addr = ZERO_ADDRESS;
    addr.copy_from_slice(&digest[12..32]);
    addr
}

/// Signs the preamble-wrapped digest, returning an r ‖ s ‖ v signature with
/// a raw (0/1) recovery id.
pub fn sign_digest(digest: &Hash, key: &SigningKey) -> Result<Signature> {
    let wrapped = geth_hash(digest);
    let (sig, recovery_id) = key.sign_prehash_recoverable(&wrapped)?;
    let mut out = [0u8; SIGNATURE_BYTES];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = recovery_id.to_byte();
    Ok(Signature(out))
}

/// Recovers the signer address of a signature made over the
/// preamble-wrapped form of `digest`.
pub fn recover_signer(digest: &Hash, sig: &Signature) -> Result<Address> {
    let v = sig.0[64];
    let recovery_byte = if v >= 27 { v - 27 } else { v };
    let recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or_else(|| anyhow!("invalid recovery id {}", v))?;
    let parsed = EcdsaSignature::from_slice(&sig.0[..64])?;
    let wrapped = geth_hash(digest);
    let key = VerifyingKey::recover_from_prehash(&wrapped, &parsed, recovery_id)?;
    Ok(address_from_key(&key))
}

/// Checks that `sig` over `digest` recovers to `expected`.
pub fn validate_signature(digest: &Hash, sig: &Signature, expected: &Address) -> Result<()> {
    let recovered = recover_signer(digest, sig)?;
    if recovered != *expected {
        return Err(anyhow!(
            "signature recovered to 0x{}, expected 0x{}",
            hex::encode(recovered),
            hex::encode(expected)
        ));
    }
    Ok(())
}
