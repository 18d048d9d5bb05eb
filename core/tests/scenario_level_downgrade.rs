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

//! End-to-end exercise of a token whose level section claims fewer epochs than a verifier with a
//! larger table expects: the minter and verifier share the same signing epoch (so the signature
//! itself checks out), but the verifier knows of a newer epoch the minter's table stops short of,
//! so the claimed level count is too short relative to what the verifier expects.

use std::time::{Duration, Instant};

use guard_core::token::{KeyEpoch, KeyEpochTable, NoClockSkewSink, TokenError, TokenMint, TokenVerify, Version};
use guard_core::{Address, SeededRng, TokenConfig};

fn epoch(version: (u16, u16, u16), t: Instant, keys: Vec<[u8; 20]>) -> KeyEpoch {
    KeyEpoch::new(Version::new(version.0, version.1, version.2, None), t, keys)
}

#[test]
fn verifier_with_a_newer_epoch_rejects_a_token_with_too_short_a_level_claim() {
    let t0 = Instant::now();
    // Both sides share this epoch; the minter's table stops here, but the verifier's table also
    // knows of a later one, `e1`, that the minted token's level section cannot speak to.
    let e0 = epoch((0, 97, 0), t0, vec![[1u8; 20]]);
    let e1 = epoch((0, 98, 0), t0 + Duration::from_secs(1_000), vec![[2u8; 20]]);

    let mint_table = KeyEpochTable::new(vec![e0.clone()]);
    let verify_table = KeyEpochTable::new(vec![e0, e1]);

    let mut mint = TokenMint::new(TokenConfig::default(), mint_table, SeededRng::new(11), t0, 1_700_000_000);
    // The version string matches `e0.version` exactly, so both `select_for_mint` (only epoch
    // available) and `select_for_verify` (smallest index whose version is >= the sender's) land
    // on `e0`, and step 7's `sender_version >= epoch.version` check passes on the equality case.
    let token = mint.mint("0.97.0", t0).to_string();

    let mut verify = TokenVerify::new(TokenConfig::default(), verify_table, t0, 1_700_000_000, NoClockSkewSink);
    let addr = Address::new("203.0.113.55".parse().unwrap());

    // The signature checks out (same epoch, same key on both sides), but the level section the
    // minter attached only speaks for one epoch while the verifier's table has two epochs from
    // `e0` onward, so the claim is too short.
    assert_eq!(
        verify.verify("0.97.0", &token, addr, t0),
        Err(TokenError::ShortLevel)
    );
}
