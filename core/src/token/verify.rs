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

//! Verifies handshake version tokens minted by [`super::mint::TokenMint`], walking the twelve
//! checks below in order and stopping at the first that fails.

use std::time::Instant;

use thiserror::Error;

use crate::{address::Address, config::TokenConfig};

use super::{
    epoch::{KeyEpochTable, Version, VersionParseError},
    wire::{crc32_of, fold16, keyed_sha1, DIGEST_LEN, HEADER_LEN, TOKEN_BLOB_LEN},
};

/// The reason a token failed verification. Variants are listed in the order their corresponding
/// check appears in [`TokenVerify::verify`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token blob is not exactly 27 bytes after decoding")]
    BadLength,
    #[error("token is not valid base64")]
    BadEncoding,
    #[error("token stamp is outside the accepted clock-skew window")]
    BadStamp,
    #[error("peer version string does not parse")]
    BadVersion,
    #[error("selected key epoch has no usable keys")]
    BadKeys,
    #[error("key index in token exceeds the selected epoch's key count")]
    BadIndex,
    #[error("token signature does not match")]
    Invalid,
    #[error("peer version predates the epoch its token claims to use")]
    OldVersion,
    #[error("token is missing its level section")]
    MissingLevel,
    #[error("level section has an odd or otherwise invalid length")]
    BadLevelLength,
    #[error("level section is not valid base64")]
    BadLevelEncoding,
    #[error("level section's topmost crc16 does not match")]
    InvalidLevel,
    #[error("level section is shorter than the number of epochs the peer should know about")]
    ShortLevel,
    #[error("legacy-era token is missing a build number")]
    MissingBuild,
    #[error("legacy-era token's build number is too old")]
    WrongBuild,
}

/// Feeds observed (stamp, token_life, peer) triples to a clock-skew estimator. Purely
/// diagnostic: nothing it computes ever rejects a token.
pub trait ClockSkewSink {
    fn observe(&mut self, stamp: u32, life: u32, addr: Address);
}

/// Discards every observation. The default for deployments that do not want clock-skew
/// telemetry.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoClockSkewSink;

impl ClockSkewSink for NoClockSkewSink {
    fn observe(&mut self, _stamp: u32, _life: u32, _addr: Address) {}
}

/// An exponentially-weighted running estimate of the network's perceived mint time, built from
/// every token this node successfully parses the stamp of (not only ones that verify — step 2
/// runs before signature validation). Ops code compares this against its own wall clock outside
/// this crate; nothing here ever rejects a token on its account.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClockSkewEstimator {
    estimate_unix_secs: f64,
    has_sample: bool,
}

const EWMA_ALPHA: f64 = 0.1;

impl ClockSkewEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn estimate(&self) -> Option<f64> {
        self.has_sample.then_some(self.estimate_unix_secs)
    }
}

impl ClockSkewSink for ClockSkewEstimator {
    fn observe(&mut self, stamp: u32, _life: u32, _addr: Address) {
        if self.has_sample {
            self.estimate_unix_secs += EWMA_ALPHA * (stamp as f64 - self.estimate_unix_secs);
        } else {
            self.estimate_unix_secs = stamp as f64;
            self.has_sample = true;
        }
    }
}

/// Verifies version tokens against this node's configured key-epoch table.
pub struct TokenVerify<S = ClockSkewEstimator> {
    config: TokenConfig,
    epochs: KeyEpochTable,
    base_instant: Instant,
    base_unix: u32,
    clock_skew: S,
}

impl<S> TokenVerify<S>
where
    S: ClockSkewSink,
{
    pub fn new(config: TokenConfig, epochs: KeyEpochTable, base_instant: Instant, base_unix: u32, clock_skew: S) -> Self {
        assert!(
            config.clock_skew_secs as u64 > 2 * config.token_life_secs as u64,
            "CLOCK_SKEW must exceed 2 * TOKEN_LIFE"
        );
        TokenVerify {
            config,
            epochs,
            base_instant,
            base_unix,
            clock_skew,
        }
    }

    pub fn unix_stamp(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.base_instant).as_secs() as u32;
        self.base_unix.wrapping_add(elapsed)
    }

    fn instant_of_stamp(&self, stamp: u32) -> Instant {
        let delta = stamp.wrapping_sub(self.base_unix) as i64;
        if delta >= 0 {
            self.base_instant + std::time::Duration::from_secs(delta as u64)
        } else {
            self.base_instant
                .checked_sub(std::time::Duration::from_secs((-delta) as u64))
                .unwrap_or(self.base_instant)
        }
    }

    /// `true` once `now` is past the configured ancient-ban horizon relative to the newest
    /// epoch in the table — a signal that the whole epoch table is stale, not a verify-path
    /// check.
    pub fn token_is_ancient(&self, now: Instant) -> bool {
        let newest = self.epochs.latest().timestamp;
        now.saturating_duration_since(newest) > self.config.ancient_ban()
    }

    /// Walks the twelve checks in order, returning the first failure encountered.
    pub fn verify(&mut self, version: &str, token: &str, peer: Address, now: Instant) -> Result<(), TokenError> {
        // Step 1: base64-decodable, first block exactly 27 bytes.
        let mut parts = token.splitn(2, "; ");
        let blob_part = parts.next().unwrap_or("");
        let level_part = parts.next();

        let token_blob = super::wire::b64_decode(blob_part).map_err(|_| TokenError::BadEncoding)?;
        if token_blob.len() != TOKEN_BLOB_LEN {
            return Err(TokenError::BadLength);
        }
        let header: [u8; HEADER_LEN] = token_blob[..HEADER_LEN].try_into().expect("checked length above");
        let digest: [u8; DIGEST_LEN] = token_blob[HEADER_LEN..].try_into().expect("checked length above");

        // Step 2: stamp within ±CLOCK_SKEW of local clock.
        let stamp = u32::from_be_bytes(header[0..4].try_into().unwrap());
        let local_now_stamp = self.unix_stamp(now);
        let skew = (stamp as i64 - local_now_stamp as i64).unsigned_abs();
        self.clock_skew.observe(stamp, self.config.token_life_secs, peer);
        if skew > self.config.clock_skew_secs as u64 {
            return Err(TokenError::BadStamp);
        }

        // Step 3: version string parses.
        let sender_version = Version::parse(version).map_err(|VersionParseError(_)| TokenError::BadVersion)?;

        // Step 4: select the epoch the sender must have known at `stamp`.
        let stamp_instant = self.instant_of_stamp(stamp);
        let epoch_idx = self.epochs.select_for_verify(stamp_instant, sender_version, self.config.ancient_ban());
        let epoch = &self.epochs.as_slice()[epoch_idx];
        if epoch.keys.is_empty() {
            return Err(TokenError::BadKeys);
        }

        // Step 5: key index in range.
        let key_index = (header[6] & 0x1F) as usize;
        if key_index >= epoch.keys.len() {
            return Err(TokenError::BadIndex);
        }

        // Step 6: signature matches.
        let expected = keyed_sha1(&epoch.keys[key_index], &[&header, version.as_bytes()]);
        if expected != digest {
            return Err(TokenError::Invalid);
        }

        // Step 7: sender version >= epoch version.
        if sender_version < epoch.version {
            return Err(TokenError::OldVersion);
        }

        // Step 8: level section present.
        let level_part = level_part.ok_or(TokenError::MissingLevel)?;

        // Step 9: level blob even length, decodable, implies <= total epochs.
        let level_bytes = super::wire::b64_decode(level_part).map_err(|_| TokenError::BadLevelEncoding)?;
        if level_bytes.len() % 2 != 0 {
            return Err(TokenError::BadLevelLength);
        }
        let claimed_epochs = level_bytes.len() / 2;
        if epoch_idx + claimed_epochs > self.epochs.len() {
            return Err(TokenError::BadLevelLength);
        }

        // Step 10: topmost claimed epoch's crc16 matches our recomputation.
        let crc = crc32_of(&token_blob);
        let topmost_idx = epoch_idx + claimed_epochs - 1;
        let topmost_crc16 = u16::from_be_bytes(level_bytes[level_bytes.len() - 2..].try_into().unwrap());
        let expected_crc16 = fold16(crc ^ self.epochs.crc32_of_keys(topmost_idx));
        if topmost_crc16 != expected_crc16 {
            return Err(TokenError::InvalidLevel);
        }

        // Step 11: sender's known-epoch count >= expected count at `stamp`.
        let expected_count = self.epochs.len() - epoch_idx;
        if claimed_epochs < expected_count {
            return Err(TokenError::ShortLevel);
        }

        // Step 12: legacy build-number era, `stamp ∈ [legacy_build_floor_unix, legacy_build_switch_unix)`.
        if stamp >= self.config.legacy_build_floor_unix as u32 && stamp < self.config.legacy_build_switch_unix as u32 {
            let required = epoch.version.build.unwrap_or(0);
            match sender_version.build {
                None => return Err(TokenError::MissingBuild),
                Some(b) if b == 0 || b < required => return Err(TokenError::WrongBuild),
                Some(_) => {},
            }
        }

        Ok(())
    }
}

impl TokenVerify<ClockSkewEstimator> {
    /// Convenience accessor for the built-in estimator's current reading, when `S` is left at
    /// its default.
    pub fn clock_skew_estimate(&self) -> Option<f64> {
        self.clock_skew.estimate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        rng::SeededRng,
        token::{epoch::KeyEpoch, mint::TokenMint},
    };
    use std::net::{IpAddr, Ipv4Addr};

    fn peer() -> Address {
        Address::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)))
    }

    fn fixture() -> (TokenMint<SeededRng>, TokenVerify<NoClockSkewSink>, Instant) {
        let t0 = Instant::now();
        let epoch = KeyEpoch::new(Version::new(0, 97, 0, None), t0, vec![[3u8; 20], [4u8; 20]]);
        let mint_epochs = KeyEpochTable::new(vec![epoch.clone()]);
        let verify_epochs = KeyEpochTable::new(vec![epoch]);
        let mint = TokenMint::new(TokenConfig::default(), mint_epochs, SeededRng::new(42), t0, 1_700_000_000);
        let verify = TokenVerify::new(TokenConfig::default(), verify_epochs, t0, 1_700_000_000, NoClockSkewSink);
        (mint, verify, t0)
    }

    #[test]
    fn freshly_minted_token_verifies() {
        let (mut mint, mut verify, t0) = fixture();
        let token = mint.mint("0.97.1", t0).to_string();
        assert_eq!(verify.verify("0.97.1", &token, peer(), t0), Ok(()));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let (mut mint, mut verify, t0) = fixture();
        let token = mint.mint("0.97.1", t0).to_string();
        let blob_end = token.find("; ").unwrap();
        let mut mangled = token.clone();
        let flip_at = blob_end - 1;
        let flipped = if mangled.as_bytes()[flip_at] == b'A' { 'B' } else { 'A' };
        mangled.replace_range(flip_at..flip_at + 1, &flipped.to_string());
        assert_eq!(verify.verify("0.97.1", &mangled, peer(), t0), Err(TokenError::Invalid));
    }

    #[test]
    fn stale_stamp_outside_clock_skew_is_rejected() {
        let (mut mint, mut verify, t0) = fixture();
        let token = mint.mint("0.97.1", t0).to_string();
        let far_future = t0 + std::time::Duration::from_secs(7_200);
        assert_eq!(
            verify.verify("0.97.1", &token, peer(), far_future),
            Err(TokenError::BadStamp)
        );
    }

    #[test]
    fn missing_level_section_is_rejected() {
        let (mut mint, mut verify, t0) = fixture();
        let token = mint.mint("0.97.1", t0).to_string();
        let blob_only = token.split("; ").next().unwrap().to_string();
        assert_eq!(
            verify.verify("0.97.1", &blob_only, peer(), t0),
            Err(TokenError::MissingLevel)
        );
    }

    #[test]
    fn unparseable_version_is_rejected() {
        let (mut mint, mut verify, t0) = fixture();
        let token = mint.mint("0.97.1", t0).to_string();
        assert_eq!(verify.verify("not-a-version", &token, peer(), t0), Err(TokenError::BadVersion));
    }

    #[test]
    fn older_version_than_epoch_is_rejected() {
        let (mut mint, mut verify, t0) = fixture();
        let token = mint.mint("0.96.0", t0).to_string();
        assert_eq!(verify.verify("0.96.0", &token, peer(), t0), Err(TokenError::OldVersion));
    }

    #[test]
    fn legacy_build_floor_excludes_stamps_before_it() {
        let t0 = Instant::now();
        let epoch = KeyEpoch::new(Version::new(0, 97, 0, None), t0, vec![[3u8; 20]]);
        let mint_epochs = KeyEpochTable::new(vec![epoch.clone()]);
        let verify_epochs = KeyEpochTable::new(vec![epoch]);
        let mut config = TokenConfig::default();
        config.legacy_build_floor_unix = 2_000_000_000;
        config.legacy_build_switch_unix = 3_000_000_000;
        let mut mint = TokenMint::new(config.clone(), mint_epochs, SeededRng::new(7), t0, 1_700_000_000);
        let mut verify = TokenVerify::new(config, verify_epochs, t0, 1_700_000_000, NoClockSkewSink);
        // base_unix (1_700_000_000) is before the configured floor, so the legacy build check
        // must not apply even though "0.97.1" carries no build field.
        let token = mint.mint("0.97.1", t0).to_string();
        assert_eq!(verify.verify("0.97.1", &token, peer(), t0), Ok(()));
    }

    #[test]
    fn legacy_build_floor_applies_within_the_configured_window() {
        let t0 = Instant::now();
        let epoch = KeyEpoch::new(Version::new(0, 97, 0, Some(5)), t0, vec![[3u8; 20]]);
        let mint_epochs = KeyEpochTable::new(vec![epoch.clone()]);
        let verify_epochs = KeyEpochTable::new(vec![epoch]);
        let mut config = TokenConfig::default();
        config.legacy_build_floor_unix = 1_000_000_000;
        config.legacy_build_switch_unix = 1_800_000_000;
        let mut mint = TokenMint::new(config.clone(), mint_epochs, SeededRng::new(7), t0, 1_700_000_000);
        let mut verify = TokenVerify::new(config, verify_epochs, t0, 1_700_000_000, NoClockSkewSink);
        // base_unix (1_700_000_000) falls inside [floor, switch), so a sender version string with
        // no build number must be rejected.
        let token = mint.mint("0.97.1", t0).to_string();
        assert_eq!(verify.verify("0.97.1", &token, peer(), t0), Err(TokenError::MissingBuild));
    }
}
