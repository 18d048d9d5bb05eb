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

//! Every engine in this crate is driven by an externally supplied `Instant` rather than reading
//! the wall clock itself, so that the leaky-bucket, ban back-off and token-lifetime scenarios in
//! the test suite can simulate arbitrary elapsed time without sleeping.

#[cfg(any(test, feature = "test-mocks"))]
use std::cell::Cell;
use std::time::{Duration, Instant};

/// A fake, caller-advanced clock for deterministic tests.
///
/// `std::time::Instant` cannot be constructed from an arbitrary point in time, so this wraps a
/// real `Instant` taken at construction and adds a manually advanced offset on top of it.
#[cfg(any(test, feature = "test-mocks"))]
#[derive(Debug)]
pub struct FakeClock {
    origin: Instant,
    offset: Cell<Duration>,
}

#[cfg(any(test, feature = "test-mocks"))]
impl FakeClock {
    pub fn new() -> Self {
        FakeClock {
            origin: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }

    pub fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    pub fn advance(&self, by: Duration) -> Instant {
        self.offset.set(self.offset.get() + by);
        self.now()
    }

    pub fn advance_secs(&self, secs: u64) -> Instant {
        self.advance(Duration::from_secs(secs))
    }
}

#[cfg(any(test, feature = "test-mocks"))]
impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}
