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

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for [`crate::ban::BanEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BanConfig {
    /// Duration of the first ban, in seconds.
    pub initial_delay_secs: u32,
    /// Ceiling on `ban_delay` after repeated exponential back-off, in seconds.
    pub max_delay_secs: u32,
    /// Leaky-bucket capacity: requests allowed per `period_secs` before a ban is triggered.
    pub max_requests: u32,
    /// Leaky-bucket drain window, in seconds.
    pub period_secs: u32,
    /// Every `remind_every`-th request while banned gets a `FirstBan` re-remind instead of a
    /// silent `ForceClose`.
    pub remind_every: u32,
    /// Hard cap on quarantined fds, regardless of `sys_nofile`.
    pub max_fds_abs: u32,
    /// Quarantine capacity as a percentage of the process's open-file limit.
    pub max_fds_ratio_pct: u8,
    /// How often the aging GC for ban records is driven, in seconds (fractional).
    pub gc_tick_secs: f64,
}

impl BanConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs as u64)
    }

    pub fn gc_tick(&self) -> Duration {
        Duration::from_secs_f64(self.gc_tick_secs)
    }

    /// `R` in the spec: the per-second leak rate of the counter.
    pub fn decay_rate(&self) -> f32 {
        self.max_requests as f32 / self.period_secs as f32
    }
}

impl Default for BanConfig {
    fn default() -> Self {
        BanConfig {
            initial_delay_secs: 300,
            max_delay_secs: 10_800,
            max_requests: 5,
            period_secs: 60,
            remind_every: 5,
            max_fds_abs: 512,
            max_fds_ratio_pct: 20,
            gc_tick_secs: 1.0,
        }
    }
}

/// Tuning knobs shared by [`crate::aging::AgingTable`] consumers that do not define their own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgingConfig {
    pub gc_tick_secs: f64,
}

impl AgingConfig {
    pub fn gc_tick(&self) -> Duration {
        Duration::from_secs_f64(self.gc_tick_secs)
    }
}

impl Default for AgingConfig {
    fn default() -> Self {
        AgingConfig { gc_tick_secs: 1.5 }
    }
}

/// Tuning knobs for [`crate::token::TokenMint`] / [`crate::token::TokenVerify`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// How long a minted token remains fresh in the mint-side cache, in seconds.
    pub token_life_secs: u32,
    /// Acceptable clock skew between mint and verify, in seconds.
    pub clock_skew_secs: u32,
    /// An epoch older than this, relative to `now`, is no longer considered "known" for the
    /// purposes of must-have-known-at-stamp epoch selection.
    pub ancient_ban_secs: u64,
    /// The timestamp (Unix seconds) marking the start of the legacy-build-numbering era
    /// (`SVN_EPOCH`) for the purposes of step 12's build check. A sender's `stamp` must be at or
    /// after this value, and before `legacy_build_switch_unix`, for the check to apply.
    pub legacy_build_floor_unix: u64,
    /// The timestamp (Unix seconds) at which builds switch from the legacy numbering scheme
    /// (`SVN_EPOCH`) to the modern one (`GIT_EPOCH`) for the purposes of step 12's build check.
    pub legacy_build_switch_unix: u64,
}

impl TokenConfig {
    pub fn token_life(&self) -> Duration {
        Duration::from_secs(self.token_life_secs as u64)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs as u64)
    }

    pub fn ancient_ban(&self) -> Duration {
        Duration::from_secs(self.ancient_ban_secs)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            token_life_secs: 60,
            clock_skew_secs: 3_600,
            // Six months: long enough that a peer which has been offline for a season is still
            // given the benefit of the doubt rather than hard-rejected at step 4 of verification.
            ancient_ban_secs: 180 * 24 * 3_600,
            legacy_build_floor_unix: 0,
            legacy_build_switch_unix: 1_315_699_200, // 2011-09-11T00:00:00Z
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_skew_is_comfortably_larger_than_two_token_lives() {
        let cfg = TokenConfig::default();
        assert!(cfg.clock_skew_secs as u64 > 2 * cfg.token_life_secs as u64);
    }

    #[test]
    fn decay_rate_matches_spec_example() {
        let cfg = BanConfig::default();
        assert!((cfg.decay_rate() - 5.0 / 60.0).abs() < 1e-6);
    }
}
