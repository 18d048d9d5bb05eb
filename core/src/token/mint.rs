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

//! Mints handshake version tokens: a short-lived, per-version-string proof that lets the peer on
//! the other end verify this node minted it recently, without either side holding shared state
//! beyond the signing key epochs.

use std::time::Instant;

use log::debug;

use crate::{aging::AgingTable, config::TokenConfig, rng::Rng, warn_once::WarnOnce};

use super::{
    epoch::KeyEpochTable,
    wire,
    wire::{b64_encode, crc32_of, fold16, keyed_sha1, HEADER_LEN},
};

const LOG_TARGET: &str = "guard::token";

struct CachedToken {
    encoded: String,
    minted_at: Instant,
}

/// Issues version tokens on behalf of this node's handshake layer.
pub struct TokenMint<R> {
    config: TokenConfig,
    epochs: KeyEpochTable,
    cache: AgingTable<String, CachedToken>,
    rng: R,
    warn_once: WarnOnce,
    base_instant: Instant,
    base_unix: u32,
}

impl<R> TokenMint<R>
where
    R: Rng,
{
    /// `base_unix` is the wall-clock UNIX timestamp, in seconds, corresponding to `base_instant`
    /// — the pair lets every later `mint`/`verify` call convert its monotonic `now: Instant` into
    /// the wire-format `stamp_be32` without this crate ever reading the system clock itself.
    pub fn new(config: TokenConfig, epochs: KeyEpochTable, rng: R, base_instant: Instant, base_unix: u32) -> Self {
        assert!(
            config.clock_skew_secs as u64 > 2 * config.token_life_secs as u64,
            "CLOCK_SKEW must exceed 2 * TOKEN_LIFE"
        );
        let cache_ttl = config.token_life();
        TokenMint {
            config,
            epochs,
            cache: AgingTable::new(cache_ttl),
            rng,
            warn_once: WarnOnce::new(),
            base_instant,
            base_unix,
        }
    }

    pub fn unix_stamp(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.base_instant).as_secs() as u32;
        self.base_unix.wrapping_add(elapsed)
    }

    /// Mints (or returns the still-fresh cached) token for `full_version`.
    pub fn mint(&mut self, full_version: &str, now: Instant) -> &str {
        self.mint_keyed(full_version, full_version, now)
    }

    /// Same as [`Self::mint`] but cached under the short version string legacy clients send,
    /// kept distinct from `mint` so a node speaking both dialects never cross-contaminates the
    /// two caches.
    pub fn mint_short(&mut self, short_version: &str, now: Instant) -> &str {
        self.mint_keyed(short_version, short_version, now)
    }

    fn mint_keyed(&mut self, cache_key: &str, version_string: &str, now: Instant) -> &str {
        let needs_mint = match self.cache.get(&cache_key.to_string()) {
            Some(cached) => now.saturating_duration_since(cached.minted_at) >= self.config.token_life(),
            None => true,
        };
        if needs_mint {
            let encoded = self.build(version_string, now);
            self.cache
                .insert(cache_key.to_string(), CachedToken { encoded, minted_at: now }, now);
        }
        &self
            .cache
            .get(&cache_key.to_string())
            .expect("inserted above or already present")
            .encoded
    }

    fn build(&mut self, version_string: &str, now: Instant) -> String {
        let ancient_ban = self.config.ancient_ban();
        let (epoch_idx, fell_back) = self.epochs.select_for_mint(now, ancient_ban);
        if fell_back && self.warn_once.should_emit("mint_ancient_fallback") {
            debug!(
                target: LOG_TARGET,
                "no key epoch younger than ancient_ban, falling back to the latest epoch"
            );
        }

        let epoch = &self.epochs.as_slice()[epoch_idx];
        let key_index = self.rng.gen_below(epoch.keys.len() as u32) as u8;

        let stamp = self.unix_stamp(now);
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&stamp.to_be_bytes());
        let mut rand3 = [0u8; 3];
        self.rng.fill_bytes(&mut rand3);
        header[4..7].copy_from_slice(&rand3);
        header[6] = (header[6] & 0xE0) | (key_index & 0x1F);

        let key = self.epochs.as_slice()[epoch_idx].keys[key_index as usize];
        let digest = keyed_sha1(&key, &[&header, version_string.as_bytes()]);

        let mut token_blob = Vec::with_capacity(27);
        token_blob.extend_from_slice(&header);
        token_blob.extend_from_slice(&digest);

        let crc = crc32_of(&token_blob);
        let mut level_blob = Vec::new();
        for idx in epoch_idx..self.epochs.len() {
            let keys_crc = self.epochs.crc32_of_keys(idx);
            level_blob.extend_from_slice(&fold16(crc ^ keys_crc).to_be_bytes());
        }

        format!("{}; {}", b64_encode(&token_blob), b64_encode(&level_blob))
    }
}
