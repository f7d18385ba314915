//! Bitforest wallet helpers.
//!
//! Key management proper (secure storage, seed phrases, hardware wallets)
//! is out of scope for this crate — it exists to make the common client
//! workflow ergonomic: generate an Ed25519 identity, describe it as an
//! [`IdScript`], and sign the next operation in a chain.

use bitforest_core::idscript::IdScript;
use bitforest_core::operation::{Operation, NONCE_LEN};
use ed25519_dalek::{Keypair, Signer};
use rand::rngs::OsRng;

/// Generates a fresh Ed25519 keypair using the OS CSPRNG.
pub fn generate_keypair() -> Keypair {
    let mut csprng = OsRng {};
    Keypair::generate(&mut csprng)
}

/// Builds the single-key identity script `.ed25519 <hex pubkey>` for `kp`.
pub fn single_key_script(kp: &Keypair) -> IdScript {
    IdScript::assemble(&format!(".ed25519 {}", hex::encode(kp.public.as_bytes())))
        .expect("a freshly hex-encoded 32-byte key always assembles")
}

/// Builds an `N`-of-`M` quorum script over the given public keys, in order.
///
/// `need` and `max` must each be in `1..=256` and `need <= max <= keys.len()`.
pub fn quorum_script(keys: &[ed25519_dalek::PublicKey], need: u16, max: u16) -> bitforest_core::Result<IdScript> {
    let mut asm = String::new();
    for key in keys {
        asm.push_str(".ed25519 ");
        asm.push_str(&hex::encode(key.as_bytes()));
        asm.push(' ');
    }
    asm.push_str(&format!(".quorum {}. {}.", need, max));
    IdScript::assemble(&asm)
}

/// Produces a fresh random 16-byte nonce. Uniqueness across a log's
/// operations, not unpredictability, is the load-bearing property; the OS
/// CSPRNG is used anyway since it's the simplest way to get it cheaply.
pub fn fresh_nonce() -> [u8; NONCE_LEN] {
    use rand::RngCore;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng {}.fill_bytes(&mut nonce);
    nonce
}

/// Builds and signs the next operation in a chain: `signer` authorizes it
/// (via `signer_next_id`, the script that the *previous* operation named as
/// its `next_id`), and `next_id` becomes the script that will authorize
/// whichever operation follows this one.
pub fn sign_next_operation(
    signer: &Keypair,
    next_id: IdScript,
    data: Vec<u8>,
) -> Operation {
    let mut op = Operation {
        nonce: fresh_nonce(),
        next_id,
        data,
        signatures: vec![],
    };
    let sig = signer.sign(&op.signed_part()).to_bytes().to_vec();
    op.signatures = vec![sig];
    op
}

/// Builds the unsigned genesis operation for a brand-new name. The server
/// is trusted to stage it correctly; no signature accompanies it.
pub fn genesis_operation(next_id: IdScript, data: Vec<u8>) -> Operation {
    Operation {
        nonce: fresh_nonce(),
        next_id,
        data,
        signatures: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_key_script_round_trips_through_verify() {
        let kp = generate_keypair();
        let script = single_key_script(&kp);
        let msg = b"hello wallet";
        let sig = kp.sign(msg).to_bytes().to_vec();
        assert!(script.verify(msg, &[sig]).is_ok());
    }

    #[test]
    fn quorum_script_assembles_and_verifies() {
        let a = generate_keypair();
        let b = generate_keypair();
        let script = quorum_script(&[a.public, b.public], 1, 2).unwrap();
        let msg = b"quorum";
        let sig_a = a.sign(msg).to_bytes().to_vec();
        let zero = vec![0u8; 64];
        assert!(script.verify(msg, &[sig_a, zero]).is_ok());
    }

    #[test]
    fn sign_next_operation_chains() {
        let kp0 = generate_keypair();
        let kp1 = generate_keypair();
        let genesis = genesis_operation(single_key_script(&kp0), b"alice".to_vec());
        let op1 = sign_next_operation(&kp0, single_key_script(&kp1), b"rotate".to_vec());
        assert!(genesis.next_id.verify(&op1.signed_part(), &op1.signatures).is_ok());
    }

    #[test]
    fn fresh_nonces_are_distinct() {
        let n1 = fresh_nonce();
        let n2 = fresh_nonce();
        assert_ne!(n1, n2);
    }
}
