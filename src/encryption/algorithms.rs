//! Standard security handler key derivation (revisions 2-4).
//!
//! PDF Spec: Section 7.6.3.3 - 7.6.3.4, Algorithms 2 through 7.

use md5::{Digest, Md5};

use super::rc4::rc4_crypt;

/// Padding string used to extend passwords to 32 bytes.
///
/// PDF Spec: Algorithm 2, step a
pub const PADDING: &[u8; 32] = b"\x28\xBF\x4E\x5E\x4E\x75\x8A\x41\
                                 \x64\x00\x4E\x56\xFF\xFA\x01\x08\
                                 \x2E\x2E\x00\xB6\xD0\x68\x3E\x80\
                                 \x2F\x0C\xA9\xFE\x64\x53\x69\x7A";

/// Pad or truncate a password to exactly 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Compute the file encryption key from the user password (Algorithm 2).
pub fn compute_encryption_key(
    user_password: &[u8],
    owner_hash: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
) -> Vec<u8> {
    let key_length = key_length.min(16);

    let mut hasher = Md5::new();
    hasher.update(pad_password(user_password));
    hasher.update(owner_hash);
    hasher.update(permissions.to_le_bytes());
    hasher.update(file_id);
    let mut hash = hasher.finalize().to_vec();

    // Step h: 50 extra rounds over the first n bytes for R >= 3
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..key_length]).to_vec();
        }
    }

    hash.truncate(if revision >= 3 { key_length } else { 5 });
    hash
}

/// RC4 key protecting the /O value, derived from the owner password.
fn owner_rc4_key(owner_password: &[u8], revision: u32, key_length: usize) -> Vec<u8> {
    let key_length = key_length.min(16);
    let mut hash = Md5::digest(pad_password(owner_password)).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash).to_vec();
        }
    }
    hash.truncate(if revision >= 3 { key_length } else { 5 });
    hash
}

fn xor_key(key: &[u8], round: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ round).collect()
}

/// Compute the /O value (Algorithm 3).
///
/// An empty owner password falls back to the user password.
pub fn compute_owner_hash(
    owner_password: &[u8],
    user_password: &[u8],
    revision: u32,
    key_length: usize,
) -> Vec<u8> {
    let password = if owner_password.is_empty() {
        user_password
    } else {
        owner_password
    };
    let key = owner_rc4_key(password, revision, key_length);

    let mut result = rc4_crypt(&key, &pad_password(user_password));
    if revision >= 3 {
        for round in 1..=19u8 {
            result = rc4_crypt(&xor_key(&key, round), &result);
        }
    }
    result
}

/// Compute the /U value from the file key (Algorithms 4 and 5).
pub fn compute_user_hash(encryption_key: &[u8], file_id: &[u8], revision: u32) -> Vec<u8> {
    if revision < 3 {
        return rc4_crypt(encryption_key, PADDING);
    }

    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let mut hash = hasher.finalize().to_vec();

    for round in 0..20u8 {
        hash = rc4_crypt(&xor_key(encryption_key, round), &hash);
    }

    // Arbitrary padding to 32 bytes
    hash.extend_from_slice(&[0u8; 16]);
    hash
}

/// Authenticate a user password against /U (Algorithm 6).
///
/// Returns the file key on success.
pub fn authenticate_user_password(
    password: &[u8],
    user_hash: &[u8],
    owner_hash: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
) -> Option<Vec<u8>> {
    let key = compute_encryption_key(password, owner_hash, permissions, file_id, revision, key_length);
    let expected = compute_user_hash(&key, file_id, revision);

    let compared = if revision >= 3 { 16 } else { 32 };
    if user_hash.len() < compared || expected.len() < compared {
        return None;
    }
    constant_time_compare(&user_hash[..compared], &expected[..compared]).then_some(key)
}

/// Authenticate an owner password against /O (Algorithm 7).
///
/// Recovers the user password from /O and authenticates that.
pub fn authenticate_owner_password(
    password: &[u8],
    user_hash: &[u8],
    owner_hash: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
) -> Option<Vec<u8>> {
    let key = owner_rc4_key(password, revision, key_length);

    let mut user_password = owner_hash.to_vec();
    if revision >= 3 {
        for round in (0..=19u8).rev() {
            user_password = rc4_crypt(&xor_key(&key, round), &user_password);
        }
    } else {
        user_password = rc4_crypt(&key, &user_password);
    }

    authenticate_user_password(
        &user_password,
        user_hash,
        owner_hash,
        permissions,
        file_id,
        revision,
        key_length,
    )
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_ID: &[u8] = b"0123456789abcdef";

    #[test]
    fn test_pad_password() {
        let padded = pad_password(b"test");
        assert_eq!(&padded[..4], b"test");
        assert_eq!(&padded[4..], &PADDING[..28]);

        let long = b"this is a very long password that exceeds 32 bytes";
        assert_eq!(&pad_password(long)[..], &long[..32]);
        assert_eq!(pad_password(b""), *PADDING);
    }

    #[test]
    fn test_key_lengths() {
        let key = compute_encryption_key(b"user", &[0u8; 32], -4, FILE_ID, 4, 16);
        assert_eq!(key.len(), 16);
        let key = compute_encryption_key(b"user", &[0u8; 32], -4, FILE_ID, 2, 5);
        assert_eq!(key.len(), 5);
    }

    #[test]
    fn test_hash_lengths() {
        let owner = compute_owner_hash(b"owner-pass", b"user-pass", 4, 16);
        assert_eq!(owner.len(), 32);
        let key = compute_encryption_key(b"user-pass", &owner, -3904, FILE_ID, 4, 16);
        assert_eq!(compute_user_hash(&key, FILE_ID, 4).len(), 32);
    }

    #[test]
    fn test_user_password_authenticates() {
        for revision in [3, 4] {
            let permissions = -3904;
            let owner = compute_owner_hash(b"owner-pass", b"user-pass", revision, 16);
            let key = compute_encryption_key(b"user-pass", &owner, permissions, FILE_ID, revision, 16);
            let user = compute_user_hash(&key, FILE_ID, revision);

            let recovered = authenticate_user_password(
                b"user-pass", &user, &owner, permissions, FILE_ID, revision, 16,
            );
            assert_eq!(recovered, Some(key));
            assert!(authenticate_user_password(
                b"wrong", &user, &owner, permissions, FILE_ID, revision, 16
            )
            .is_none());
        }
    }

    #[test]
    fn test_owner_password_authenticates() {
        let permissions = -4;
        let owner = compute_owner_hash(b"owner-pass", b"", 4, 16);
        let key = compute_encryption_key(b"", &owner, permissions, FILE_ID, 4, 16);
        let user = compute_user_hash(&key, FILE_ID, 4);

        let recovered =
            authenticate_owner_password(b"owner-pass", &user, &owner, permissions, FILE_ID, 4, 16);
        assert_eq!(recovered, Some(key));
        assert!(
            authenticate_owner_password(b"not-owner", &user, &owner, permissions, FILE_ID, 4, 16)
                .is_none()
        );
    }

    #[test]
    fn test_empty_owner_falls_back_to_user() {
        assert_eq!(
            compute_owner_hash(b"", b"same-pass", 4, 16),
            compute_owner_hash(b"same-pass", b"same-pass", 4, 16)
        );
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
        assert!(!constant_time_compare(b"abc", b"abcd"));
    }
}
