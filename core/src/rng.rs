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

//! The CSPRNG seam. Production code draws from the OS random source; tests use a seeded,
//! reproducible generator so that mint/verify round-trips are deterministic.

use rand::RngCore;

/// The randomness capability the token mint and the DHT secret rotation depend on.
pub trait Rng {
    fn fill_bytes(&mut self, buf: &mut [u8]);

    /// A uniform value in `[0, n)`. `n` must be non-zero.
    fn gen_below(&mut self, n: u32) -> u32;
}

/// The production RNG, backed by the OS entropy source via `rand`'s thread-local CSPRNG.
#[derive(Default)]
pub struct OsRng;

impl Rng for OsRng {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(buf);
    }

    fn gen_below(&mut self, n: u32) -> u32 {
        assert!(n > 0, "gen_below requires a non-zero bound");
        rand::rngs::OsRng.next_u32() % n
    }
}

/// A seeded RNG for reproducible tests.
pub struct SeededRng(rand::rngs::StdRng);

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        use rand::SeedableRng;
        SeededRng(rand::rngs::StdRng::seed_from_u64(seed))
    }
}

impl Rng for SeededRng {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        self.0.fill_bytes(buf);
    }

    fn gen_below(&mut self, n: u32) -> u32 {
        assert!(n > 0, "gen_below requires a non-zero bound");
        self.0.next_u32() % n
    }
}
