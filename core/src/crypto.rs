//! Hashing, keys and recoverable signatures.
//!
//! Everything hash-shaped in the chain is SHA3-256 (the FIPS-202 variant,
//! not legacy Keccak) rendered as lowercase hex. Identity is secp256k1:
//! an address is the last 20 bytes of SHA3-256 over the uncompressed
//! public key without its `0x04` prefix, and signatures are 65 bytes:
//! the 64-byte compact ECDSA signature followed by the recovery id, so the
//! signer's address can be recovered from the message alone.
//!
//! Signing hashes the message with SHA3-256 and signs the digest with
//! deterministic RFC 6979 nonces (HMAC-SHA-256), byte-compatible with
//! libsecp256k1.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha3::{Digest, Sha3_256};

use crate::error::{Error, Result};

/// Returns `true` if every character of `input` is a hex digit.
///
/// Case-insensitive, and true for the empty string.
pub fn is_hex_string(input: &str) -> bool {
    input.chars().all(|c| c.is_ascii_hexdigit())
}

/// Returns `true` for a canonical address: exactly 40 lowercase hex chars.
pub fn validate_address(address: &str) -> bool {
    address.len() == 40
        && address
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Returns `true` if `private_key` is a hex scalar in (0, n) on secp256k1.
///
/// Leading zeros may be omitted; the canonical form pads to 64 characters.
pub fn validate_private_key(private_key: &str) -> bool {
    if private_key.is_empty() || private_key.len() > 64 || !is_hex_string(private_key) {
        return false;
    }
    let padded = format!("{private_key:0>64}");
    let bytes = match hex::decode(padded) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    SigningKey::from_slice(&bytes).is_ok()
}

/// SHA3-256 digest of raw bytes, hex encoded.
pub fn sha3(data: &[u8]) -> String {
    hex::encode(Sha3_256::digest(data))
}

/// SHA3-256 digest of a string input.
///
/// With `hex_input` the string is hex-decoded first; otherwise its UTF-8
/// bytes are hashed.
pub fn sha3_str(input: &str, hex_input: bool) -> Result<String> {
    if hex_input {
        Ok(sha3(&hex::decode(input)?))
    } else {
        Ok(sha3(input.as_bytes()))
    }
}

/// Merkle tree root over a sequence of hex hash strings.
///
/// An empty sequence hashes the empty byte string. Each element is hashed
/// to form the leaves (hex-decoded when it parses as hex, UTF-8
/// otherwise); adjacent nodes are combined by hashing their concatenated
/// bytes, and a level with an odd node count duplicates its last node
/// before pairing. A single leaf therefore pairs with itself.
pub fn merkle_tree_root(hashes: &[String]) -> Result<String> {
    if hashes.is_empty() {
        return Ok(sha3(&[]));
    }
    let mut level = Vec::with_capacity(hashes.len());
    for hash in hashes {
        level.push(sha3_str(hash, is_hex_string(hash))?);
    }
    loop {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1].clone();
            level.push(last);
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let joined = format!("{}{}", pair[0], pair[1]);
            next.push(sha3(&hex::decode(joined)?));
        }
        level = next;
        if level.len() == 1 {
            return Ok(level.remove(0));
        }
    }
}

/// Generates a new private key from the system RNG.
///
/// Draws 32 random bytes and retries until the scalar lands in (0, n).
pub fn generate_private_key() -> String {
    let mut bytes = [0u8; 32];
    loop {
        OsRng.fill_bytes(&mut bytes);
        if SigningKey::from_slice(&bytes).is_ok() {
            return hex::encode(bytes);
        }
    }
}

/// Deterministic private key for test tooling: SHA3-256 of the seed text.
pub fn private_key_from_seed(seed: &str) -> String {
    sha3(seed.as_bytes())
}

fn signing_key(private_key: &str) -> Result<SigningKey> {
    if !validate_private_key(private_key) {
        return Err(Error::InvalidPrivateKey);
    }
    let padded = format!("{private_key:0>64}");
    let bytes = hex::decode(padded)?;
    Ok(SigningKey::from_slice(&bytes)?)
}

/// Uncompressed public key without the `0x04` prefix, hex encoded.
pub fn get_pub_key(private_key: &str) -> Result<String> {
    let key = signing_key(private_key)?;
    let point = key.verifying_key().to_encoded_point(false);
    Ok(hex::encode(&point.as_bytes()[1..]))
}

/// Address of a public key: last 20 bytes of its SHA3-256 digest.
pub fn address_from_public(pub_key: &str) -> Result<String> {
    let digest = sha3(&hex::decode(pub_key)?);
    Ok(digest[digest.len() - 40..].to_string())
}

pub fn address_from_private(private_key: &str) -> Result<String> {
    address_from_public(&get_pub_key(private_key)?)
}

/// Signs `message` with a recoverable ECDSA signature.
///
/// Returns 65 raw bytes: the compact signature with the recovery id
/// appended.
pub fn sign(message: &[u8], private_key: &str) -> Result<Vec<u8>> {
    let key = signing_key(private_key)?;
    let digest = Sha3_256::digest(message);
    let (signature, recovery) = key.sign_prehash_recoverable(digest.as_slice())?;
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery.to_byte());
    Ok(bytes)
}

/// Recovers the signer's address from a message and a 65-byte signature.
pub fn recover(message: &[u8], signature: &[u8]) -> Result<String> {
    if signature.len() != 65 {
        return Err(Error::Malformed("signature must be 65 bytes"));
    }
    let recovery = RecoveryId::from_byte(signature[64])
        .ok_or(Error::Malformed("invalid recovery id"))?;
    let signature = Signature::from_slice(&signature[..64])?;
    let digest = Sha3_256::digest(message);
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery)?;
    let point = key.to_encoded_point(false);
    address_from_public(&hex::encode(&point.as_bytes()[1..]))
}

/// String-mode signing for the tool surface; output is hex.
///
/// With `hex_input` the message is hex-decoded, otherwise signed as UTF-8.
pub fn sign_str(message: &str, private_key: &str, hex_input: bool) -> Result<String> {
    let data = if hex_input {
        hex::decode(message)?
    } else {
        message.as_bytes().to_vec()
    };
    Ok(hex::encode(sign(&data, private_key)?))
}

/// String-mode recovery for the tool surface; returns the signer address.
pub fn recover_str(message: &str, signature: &str, hex_input: bool) -> Result<String> {
    let data = if hex_input {
        hex::decode(message)?
    } else {
        message.as_bytes().to_vec()
    };
    recover(&data, &hex::decode(signature)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_KEY: &str = "685cf62751cef607271ed7190b6a707405c5b07ec0830156e748c0c2ea4a2cfe";
    const PUB_KEY: &str = "6b2cc423e68813a13b4f0b3c7666939d20f845a40104a3c85db2d8a3bcfd9517620075fac7de10a94073ab9a09a9a8dd28bb44adaaf24bf334a6c6258524dd08";
    const ADDRESS: &str = "c70f4891d2ce22b1f62492605c1d5c2fc1a8ef47";

    #[test]
    fn hex_string_check() {
        assert!(is_hex_string("AbCdeF1234567890"));
        assert!(!is_hex_string("abcdefg"));
    }

    #[test]
    fn private_key_validation() {
        assert!(validate_private_key(PRIVATE_KEY));
        assert!(validate_private_key(
            "685CF62751CEF607271ED7190b6a707405c5b07ec0830156e748c0c2ea4a2cfe"
        ));
        assert!(!validate_private_key(
            "0000000000000000000000000000000000000000000000000000000000000000"
        ));
        assert!(!validate_private_key(
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"
        ));
    }

    #[test]
    fn address_validation() {
        assert!(validate_address("0000000000000000000000000000000000000000"));
        assert!(validate_address(ADDRESS));
        assert!(!validate_address("1234567890"));
        assert!(!validate_address("abcdefghijklmnopqrstuvwxyzabcdefghijklmn"));
    }

    #[test]
    fn sha3_hex_and_text() {
        assert_eq!(
            sha3_str("abcdef", true).unwrap(),
            "8b8a2a6bc589cd378fc57f47d5668c58b31167b2bf9e632696e5c2d50fc16002"
        );
        assert_eq!(
            sha3_str("test", false).unwrap(),
            "36f028580bb02cc8272a9a020f4200e346e276ae664e45ee80745574e2f5ab80"
        );
    }

    #[test]
    fn generated_key_is_valid() {
        assert!(validate_private_key(&generate_private_key()));
    }

    #[test]
    fn pub_key_derivation() {
        assert_eq!(get_pub_key(PRIVATE_KEY).unwrap(), PUB_KEY);
    }

    #[test]
    fn address_derivation() {
        assert_eq!(address_from_public(PUB_KEY).unwrap(), ADDRESS);
        assert_eq!(address_from_private(PRIVATE_KEY).unwrap(), ADDRESS);
    }

    #[test]
    fn deterministic_signatures() {
        assert_eq!(
            sign_str("abcdef", PRIVATE_KEY, true).unwrap(),
            "b90e97baea96a2120a53d3ba34201705891e79beb8b86cfaf26a4e467264ac6e2481ffed9036a8403161d1d0bf7a7485f6e190d1ffdc1bccefd74fe6c547b30a01"
        );
        assert_eq!(
            sign_str("test", PRIVATE_KEY, false).unwrap(),
            "6f2dfa18ba808d126ef8d7664cbb5331a4464f6ab739f82981a179e47569550636daa57960b6bfeef2981ea61141ce34b2febe811394ce3b46ffde0ce121516101"
        );
    }

    #[test]
    fn signature_recovery() {
        let signature = sign_str("abcdef", PRIVATE_KEY, true).unwrap();
        assert_eq!(recover_str("abcdef", &signature, true).unwrap(), ADDRESS);
        let signature = sign_str("test", PRIVATE_KEY, false).unwrap();
        assert_eq!(recover_str("test", &signature, false).unwrap(), ADDRESS);
    }

    #[test]
    fn merkle_empty_input() {
        assert_eq!(merkle_tree_root(&[]).unwrap(), sha3(&[]));
    }

    #[test]
    fn merkle_single_leaf_pairs_with_itself() {
        let leaf = sha3(&hex::decode("aa").unwrap());
        let joined = hex::decode(format!("{leaf}{leaf}")).unwrap();
        assert_eq!(merkle_tree_root(&["aa".into()]).unwrap(), sha3(&joined));
    }

    #[test]
    fn merkle_duplicates_odd_levels() {
        let a = sha3(b"a");
        let b = sha3(b"b");
        let c = sha3(b"c");
        let odd = merkle_tree_root(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let padded = merkle_tree_root(&[a, b, c.clone(), c]).unwrap();
        assert_eq!(odd, padded);
    }

    #[test]
    fn seed_derived_key() {
        assert_eq!(private_key_from_seed("test"), sha3_str("test", false).unwrap());
        assert!(validate_private_key(&private_key_from_seed("test")));
    }
}
