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

//! The DHT security token: a short proof that a `FIND_NODE`/`STORE` request round-tripped
//! through this node recently, so a remote peer cannot replay a token it captured from a
//! different node or a stale session.

use std::time::Instant;

use arrayvec::ArrayVec;
use guard_core::{Address, Rng};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::{config::DhtGuardConfig, secret::RotatingSecret};

type HmacSha1 = Hmac<Sha1>;

/// A token's wire bytes; capacity is the 8-byte ceiling the config allows, not the configured
/// length, so the same type serves every `token_bytes` setting without heap allocation.
pub type DhtTokenBytes = ArrayVec<u8, 8>;

/// Issues and validates DHT security tokens on behalf of the RPC layer.
pub struct DhtToken<R> {
    secret: RotatingSecret<R>,
    bytes: usize,
}

impl<R> DhtToken<R>
where
    R: Rng,
{
    pub fn new(config: DhtGuardConfig, rng: R, now: Instant) -> Self {
        assert!((1..=8).contains(&config.token_bytes), "token_bytes must be in 1..=8");
        DhtToken {
            secret: RotatingSecret::new(config.rotation(), rng, now),
            bytes: config.token_bytes,
        }
    }

    pub fn issue(&self, addr: Address, port: u16) -> DhtTokenBytes {
        Self::truncated_mac(self.secret.current(), addr, port, self.bytes)
    }

    /// True if `token` matches the current or previous secret, checked in constant time so a
    /// peer cannot learn which secret (or byte position) it got closer to by timing.
    pub fn validate(&self, token: &[u8], addr: Address, port: u16) -> bool {
        let current = Self::truncated_mac(self.secret.current(), addr, port, self.bytes);
        let previous = Self::truncated_mac(self.secret.previous(), addr, port, self.bytes);
        let matches_current = token.ct_eq(&current[..]);
        let matches_previous = token.ct_eq(&previous[..]);
        (matches_current | matches_previous).into()
    }

    pub fn lifetime(&self) -> std::time::Duration {
        self.secret.lifetime()
    }

    pub fn drive(&mut self, now: Instant) {
        self.secret.drive(now);
    }

    fn truncated_mac(secret: &[u8; 16], addr: Address, port: u16, bytes: usize) -> DhtTokenBytes {
        let mut mac = <HmacSha1 as Mac>::new_from_slice(secret).expect("16-byte key is always valid for HMAC-SHA1");
        mac.update(&addr.to_bytes());
        mac.update(&port.to_be_bytes());
        let full = mac.finalize().into_bytes();
        let mut out = DhtTokenBytes::new();
        out.try_extend_from_slice(&full[..bytes])
            .expect("bytes is asserted <= 8 at construction");
        out
    }
}
