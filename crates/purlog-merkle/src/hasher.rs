//! RFC 6962 domain-separated SHA-256 hashing.

use sha2::{Digest, Sha256};

/// A SHA-256 node or leaf hash.
pub type Hash = [u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Root hash of the empty tree: `SHA256("")`.
pub fn empty_root() -> Hash {
    Sha256::digest([]).into()
}

/// Hash a leaf: `SHA256(0x00 || data)`.
pub fn hash_leaf(data: &[u8]) -> Hash {
    let mut h = Sha256::new();
    h.update([LEAF_PREFIX]);
    h.update(data);
    h.finalize().into()
}

/// Hash an interior node: `SHA256(0x01 || left || right)`.
pub fn hash_children(left: &Hash, right: &Hash) -> Hash {
    let mut h = Sha256::new();
    h.update([NODE_PREFIX]);
    h.update(left);
    h.update(right);
    h.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_root_is_sha256_of_nothing() {
        // Well-known SHA-256 of the empty string.
        assert_eq!(
            hex(&empty_root()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_rfc6962_leaf_vector() {
        // RFC 6962 test vector: leaf hash of the empty string.
        assert_eq!(
            hex(&hash_leaf(b"")),
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
        );
    }

    #[test]
    fn test_domain_separation() {
        let l = hash_leaf(b"abc");
        assert_ne!(l, hash_leaf(b"abd"));
        assert_ne!(hash_children(&l, &l), hash_leaf(b"abc"));
    }

    fn hex(h: &Hash) -> String {
        h.iter().map(|b| format!("{b:02x}")).collect()
    }
}
