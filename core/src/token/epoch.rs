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

//! A node's handshake version string and the immutable, deployment-configured table of signing
//! key epochs it is checked against.

use std::time::Instant;

use thiserror::Error;

use super::wire::crc32_of;

/// A parsed `major.minor.patch[.build]` version string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: Option<u32>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("version string `{0}` does not parse as major.minor.patch[.build]")]
pub struct VersionParseError(pub String);

impl Version {
    pub fn new(major: u16, minor: u16, patch: u16, build: Option<u32>) -> Self {
        Version { major, minor, patch, build }
    }

    /// Parses the leading `major.minor.patch[.build]` numeric run of a handshake version
    /// string, ignoring any vendor/platform suffix that follows.
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        let mut fields = s.split('.');
        let major = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| VersionParseError(s.to_string()))?;
        let minor = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| VersionParseError(s.to_string()))?;
        let patch = fields
            .next()
            .and_then(|f| leading_digits(f).parse().ok())
            .ok_or_else(|| VersionParseError(s.to_string()))?;
        let build = fields.next().and_then(|f| leading_digits(f).parse().ok());
        Ok(Version { major, minor, patch, build })
    }
}

fn leading_digits(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}

/// One signing-key generation: the version it first applied to, when it was introduced, and the
/// up-to-32 keys valid within it.
#[derive(Clone, Debug)]
pub struct KeyEpoch {
    pub version: Version,
    pub timestamp: Instant,
    pub keys: Vec<[u8; 20]>,
}

impl KeyEpoch {
    pub fn new(version: Version, timestamp: Instant, keys: Vec<[u8; 20]>) -> Self {
        assert!(!keys.is_empty(), "a key epoch must carry at least one key");
        assert!(keys.len() <= 32, "at most 32 keys fit in the token's 5-bit key index");
        KeyEpoch { version, timestamp, keys }
    }

    fn keys_crc32(&self) -> u32 {
        let mut all = Vec::with_capacity(self.keys.len() * 20);
        for key in &self.keys {
            all.extend_from_slice(key);
        }
        crc32_of(&all)
    }
}

/// An immutable, ascending-by-`timestamp` sequence of [`KeyEpoch`]s, built once from
/// configuration at construction.
#[derive(Clone, Debug)]
pub struct KeyEpochTable {
    epochs: Vec<KeyEpoch>,
}

impl KeyEpochTable {
    /// Sorts `epochs` by timestamp. Panics if empty — a table with no epochs cannot mint or
    /// verify anything, which is a deployment misconfiguration, not a runtime condition.
    pub fn new(mut epochs: Vec<KeyEpoch>) -> Self {
        assert!(!epochs.is_empty(), "a key epoch table needs at least one epoch");
        epochs.sort_by_key(|e| e.timestamp);
        KeyEpochTable { epochs }
    }

    pub fn as_slice(&self) -> &[KeyEpoch] {
        &self.epochs
    }

    pub fn latest(&self) -> &KeyEpoch {
        self.epochs.last().expect("non-empty by construction")
    }

    pub fn latest_index(&self) -> usize {
        self.epochs.len() - 1
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn crc32_of_keys(&self, index: usize) -> u32 {
        self.epochs[index].keys_crc32()
    }

    /// The epoch a minter should sign with right now: the most recent epoch younger than
    /// `now - ancient_ban`, or (with a caller-reported fallback) the latest epoch if none
    /// qualifies.
    pub fn select_for_mint(&self, now: Instant, ancient_ban: std::time::Duration) -> (usize, bool) {
        let cutoff = now.checked_sub(ancient_ban);
        let found = self.epochs.iter().enumerate().rev().find(|(_, e)| match cutoff {
            Some(cutoff) => e.timestamp > cutoff,
            None => true,
        });
        match found {
            Some((idx, _)) => (idx, false),
            None => (self.latest_index(), true),
        }
    }

    /// The epoch the sender must have known about at `stamp`: the smallest index `k` such that
    /// `version <= table[k].version`, bounded above by the last epoch older than
    /// `stamp - ancient_ban`. Falls back to the last epoch if nothing matches, so long-expired
    /// peers remain verifiable rather than unconditionally rejected.
    pub fn select_for_verify(&self, stamp: Instant, version: Version, ancient_ban: std::time::Duration) -> usize {
        let cutoff = stamp.checked_sub(ancient_ban);
        let ceiling = self
            .epochs
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| match cutoff {
                Some(cutoff) => e.timestamp < cutoff,
                None => false,
            })
            .map(|(idx, _)| idx)
            .unwrap_or(self.latest_index());

        self.epochs[..=ceiling]
            .iter()
            .position(|e| version <= e.version)
            .unwrap_or(ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn epoch(version: (u16, u16, u16), t: Instant) -> KeyEpoch {
        KeyEpoch::new(Version::new(version.0, version.1, version.2, None), t, vec![[7u8; 20]])
    }

    #[test]
    fn version_parses_major_minor_patch_build() {
        assert_eq!(
            Version::parse("0.97.1.31415").unwrap(),
            Version::new(0, 97, 1, Some(31415))
        );
        assert_eq!(Version::parse("1.2.3").unwrap(), Version::new(1, 2, 3, None));
    }

    #[test]
    fn version_parse_rejects_short_strings() {
        assert!(Version::parse("1.2").is_err());
    }

    #[test]
    fn version_ordering_is_lexicographic() {
        assert!(Version::new(0, 96, 0, None) < Version::new(0, 97, 0, None));
    }

    #[test]
    fn select_for_mint_prefers_most_recent_non_ancient_epoch() {
        let t0 = Instant::now();
        let table = KeyEpochTable::new(vec![
            epoch((0, 96, 0), t0),
            epoch((0, 97, 0), t0 + Duration::from_secs(1000)),
        ]);
        let (idx, fallback) = table.select_for_mint(t0 + Duration::from_secs(1500), Duration::from_secs(3600));
        assert_eq!(idx, 1);
        assert!(!fallback);
    }

    #[test]
    fn select_for_mint_falls_back_when_everything_is_ancient() {
        let t0 = Instant::now();
        let table = KeyEpochTable::new(vec![epoch((0, 96, 0), t0)]);
        let (idx, fallback) = table.select_for_mint(t0 + Duration::from_secs(10_000), Duration::from_secs(60));
        assert_eq!(idx, 0);
        assert!(fallback);
    }

    #[test]
    fn select_for_verify_picks_smallest_epoch_at_or_above_version() {
        let t0 = Instant::now();
        let table = KeyEpochTable::new(vec![
            epoch((0, 96, 0), t0),
            epoch((0, 97, 0), t0 + Duration::from_secs(1000)),
            epoch((0, 98, 0), t0 + Duration::from_secs(2000)),
        ]);
        let stamp = t0 + Duration::from_secs(2500);
        let idx = table.select_for_verify(stamp, Version::new(0, 96, 5, None), Duration::from_secs(3600));
        assert_eq!(idx, 1);
    }
}
