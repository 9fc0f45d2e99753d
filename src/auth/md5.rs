//! MD5 password authentication
//!
//! PostgreSQL's legacy password hashing scheme. Superseded by SCRAM-SHA-256
//! since Postgres 10, but still the default on older servers and some
//! managed providers.

use md5::{Digest, Md5};

/// Compute the `md5(md5(password + username) + salt)` response to an
/// `AuthenticationMD5Password` request.
///
/// Returns the value PostgreSQL expects in the PasswordMessage: the string
/// `"md5"` followed by the hex-encoded digest.
pub fn encode(username: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = hex_digest(&[password.as_bytes(), username.as_bytes()].concat());
    let outer = hex_digest(&[inner.as_bytes(), &salt].concat());
    format!("md5{}", outer)
}

fn hex_digest(input: &[u8]) -> String {
    let digest = Md5::digest(input);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{:02x}", byte).expect("writing to a String never fails");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // md5(password + username) = md5("secretbob")
        let inner = hex_digest(b"secretbob");
        let expected = format!("md5{}", hex_digest(&[inner.as_bytes(), &[1, 2, 3, 4]].concat()));
        assert_eq!(encode("bob", "secret", [1, 2, 3, 4]), expected);
    }

    #[test]
    fn output_has_md5_prefix_and_32_hex_chars() {
        let result = encode("alice", "hunter2", [0xde, 0xad, 0xbe, 0xef]);
        assert!(result.starts_with("md5"));
        assert_eq!(result.len(), 3 + 32);
        assert!(result[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_salts_produce_different_output() {
        let a = encode("alice", "hunter2", [0, 0, 0, 0]);
        let b = encode("alice", "hunter2", [0, 0, 0, 1]);
        assert_ne!(a, b);
    }

    #[test]
    fn different_usernames_produce_different_output() {
        let a = encode("alice", "hunter2", [1, 2, 3, 4]);
        let b = encode("alicia", "hunter2", [1, 2, 3, 4]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_password_still_produces_valid_output() {
        let result = encode("alice", "", [1, 2, 3, 4]);
        assert!(result.starts_with("md5"));
        assert_eq!(result.len(), 35);
    }
}
