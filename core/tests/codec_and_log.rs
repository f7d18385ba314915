use bitforest_core::codec::{compute_merkle_root, dsha256, hash256, Block, Header, Transaction, TxInput, TxOutput};
use bitforest_core::idscript::IdScript;
use bitforest_core::operation::{Operation, OperationLog, NONCE_LEN};
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signer};

fn keypair(seed: u8) -> Keypair {
    let secret = SecretKey::from_bytes(&[seed; 32]).unwrap();
    let public = PublicKey::from(&secret);
    Keypair { secret, public }
}

fn script_for(pk: &Keypair) -> IdScript {
    IdScript::assemble(&format!(".ed25519 {}", hex::encode(pk.public.as_bytes()))).unwrap()
}

#[test]
fn dsha256_is_sha256_twice() {
    use sha2::{Digest, Sha256};
    let data = b"the quick brown fox";
    let expected = Sha256::digest(Sha256::digest(data));
    assert_eq!(dsha256(data).as_slice(), expected.as_slice());
}

#[test]
fn header_chain_links_via_dsha256() {
    let genesis = Header {
        version: 1,
        prev_block: [0u8; 32],
        merkle_root: [1u8; 32],
        time: 0,
        bits: 0x1d00ffff,
        nonce: 0,
    };
    let next = Header {
        version: 1,
        prev_block: dsha256(&genesis.to_bytes()),
        merkle_root: [2u8; 32],
        time: 1,
        bits: 0x1d00ffff,
        nonce: 1,
    };
    assert_eq!(next.prev_block, dsha256(&genesis.to_bytes()));
}

#[test]
fn merkle_branch_round_trips_for_every_leaf() {
    let txs: Vec<Transaction> = (0..6u8)
        .map(|i| Transaction {
            version: 1,
            inputs: vec![TxInput {
                prev_hash: [i; 32],
                prev_idx: 0,
                script: vec![i],
                seqno: 0xFFFF_FFFF,
            }],
            outputs: vec![TxOutput {
                value: i as u64,
                script: vec![],
            }],
            lock_time: 0,
        })
        .collect();
    let block = Block {
        header: Header {
            version: 1,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
        },
        transactions: txs.clone(),
    };
    for tx in &txs {
        let h = hash256(tx);
        let (branch, pos) = block.merkle_branch(&h).expect("tx present");
        let computed = compute_merkle_root(h, &branch, pos);
        // every leaf must resolve to the same root regardless of position
        let (branch0, pos0) = block.merkle_branch(&hash256(&txs[0])).unwrap();
        let root0 = compute_merkle_root(hash256(&txs[0]), &branch0, pos0);
        assert_eq!(computed, root0);
    }
}

/// Scenario S6 from the design doc.
#[test]
fn s6_quorum_script_scenario() {
    let kp1 = keypair(1);
    let kp2 = keypair(2);
    let asm = format!(
        ".ed25519 {} .ed25519 {} .quorum 1. 2.",
        hex::encode(kp1.public.as_bytes()),
        hex::encode(kp2.public.as_bytes())
    );
    let script = IdScript::assemble(&asm).unwrap();
    let msg = b"some message";
    let sig1 = kp1.sign(msg).to_bytes().to_vec();
    let zero_sig = vec![0u8; 64];

    assert!(script.verify(msg, &[sig1, zero_sig.clone()]).is_ok());
    assert!(matches!(
        script.verify(msg, &[zero_sig.clone(), zero_sig]),
        Err(bitforest_core::Error::NoQuorum)
    ));

    let truncated = IdScript(script.0[..script.0.len() - 1].to_vec());
    assert!(matches!(
        truncated.verify(msg, &[vec![0u8; 64], vec![0u8; 64]]),
        Err(bitforest_core::Error::InvalidId)
    ));
}

/// Scenario S8 (log validity) from the design doc, exercised end to end
/// with three chained identities.
#[test]
fn s8_log_validity_chain() {
    let kp0 = keypair(10);
    let kp1 = keypair(11);
    let kp2 = keypair(12);

    let genesis = Operation {
        nonce: [1u8; NONCE_LEN],
        next_id: script_for(&kp0),
        data: b"alice registers".to_vec(),
        signatures: vec![],
    };

    let mut op1 = Operation {
        nonce: [2u8; NONCE_LEN],
        next_id: script_for(&kp1),
        data: b"rotate to kp1".to_vec(),
        signatures: vec![],
    };
    op1.signatures = vec![kp0.sign(&op1.signed_part()).to_bytes().to_vec()];

    let mut op2 = Operation {
        nonce: [3u8; NONCE_LEN],
        next_id: script_for(&kp2),
        data: b"rotate to kp2".to_vec(),
        signatures: vec![],
    };
    op2.signatures = vec![kp1.sign(&op2.signed_part()).to_bytes().to_vec()];

    let log = OperationLog(vec![genesis.clone(), op1.clone(), op2.clone()]);
    assert!(log.is_valid());

    let mut swapped = log.clone();
    swapped.0.swap(1, 2);
    assert!(!swapped.is_valid());

    let mut bad_sig = log.clone();
    bad_sig.0[1].signatures[0][0] ^= 0xFF;
    assert!(!bad_sig.is_valid());

    // round trip through the wire encoding used for forest storage
    let blob = log.to_bytes();
    let decoded = OperationLog::unpack_all(&blob).unwrap();
    assert_eq!(decoded, log);
    assert!(decoded.is_valid());
}
