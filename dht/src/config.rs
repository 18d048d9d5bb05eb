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

/// Tuning knobs for [`crate::token::DhtToken`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DhtGuardConfig {
    /// How often the rotating secret is replaced, in seconds.
    pub token_rotation_secs: u64,
    /// Length of an issued token, in bytes. Must be in `1..=8`.
    pub token_bytes: usize,
}

impl DhtGuardConfig {
    pub fn rotation(&self) -> Duration {
        Duration::from_secs(self.token_rotation_secs)
    }
}

impl Default for DhtGuardConfig {
    fn default() -> Self {
        DhtGuardConfig {
            // No reference deployment value survived distillation; five minutes keeps the
            // window a query round-trip comfortably fits inside while still rotating often
            // enough that a captured secret ages out quickly.
            token_rotation_secs: 300,
            token_bytes: 4,
        }
    }
}
