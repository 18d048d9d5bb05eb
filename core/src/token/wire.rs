// Copyright 2024 The Guard Contributors
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Wire-format primitives shared by [`super::mint`] and [`super::verify`]: the keyed SHA-1 hash
//! the token format actually specifies (a plain `SHA1(key ‖ data)` construction, not a real
//! HMAC), the CRC-32 fold used for the level blob, and the base64 codec.

use base64::Engine;
use sha1::{Digest, Sha1};

pub const TOKEN_BLOB_LEN: usize = 27;
pub const HEADER_LEN: usize = 7;
pub const DIGEST_LEN: usize = 20;

/// `SHA1(key ‖ parts[0] ‖ parts[1] ‖ ...)`.
pub fn keyed_sha1(key: &[u8], parts: &[&[u8]]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(key);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Folds a 32-bit CRC into 16 bits by XORing its two halves.
pub fn fold16(crc: u32) -> u16 {
    (((crc >> 16) ^ (crc & 0xFFFF)) & 0xFFFF) as u16
}

pub fn crc32_of(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

pub fn b64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn b64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(data.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold16_xors_halves() {
        assert_eq!(fold16(0x1234_5678), 0x1234 ^ 0x5678);
    }

    #[test]
    fn base64_round_trips() {
        let data = [1u8, 2, 3, 4, 5];
        let encoded = b64_encode(&data);
        assert_eq!(b64_decode(&encoded).unwrap(), data.to_vec());
    }
}
