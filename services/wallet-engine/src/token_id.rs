//! Transfer token identifiers.
//!
//! Identifiers are 32 bytes drawn from the operating system CSPRNG, rendered as
//! `0x` followed by 64 lowercase hex digits. Nothing about the sender, amount or
//! creation time goes into them, so a pending token cannot be guessed.

use rand::rngs::OsRng;
use rand::RngCore;

const ID_BYTES: usize = 32;
const PREFIX: &str = "0x";

/// Draw a fresh token identifier.
pub fn generate() -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", PREFIX, hex::encode(bytes))
}

/// Whether `id` has the shape produced by [`generate`].
pub fn is_well_formed(id: &str) -> bool {
    match id.strip_prefix(PREFIX) {
        Some(digits) => {
            digits.len() == ID_BYTES * 2
                && digits.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
        None => false,
    }
}
