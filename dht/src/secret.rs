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

//! A two-slot secret that rotates on a fixed period, giving every issued [`crate::token::DhtToken`]
//! a validity window of up to twice the rotation period (the round just before a rotation is
//! still checked against `previous`).

use std::time::{Duration, Instant};

use guard_core::{CalloutQueue, Rng};

const LOG_TARGET: &str = "guard::dht_token";

/// Holds the current and previous 128-bit secret, scheduling its own rotation on the same
/// callout-queue primitive [`guard_core::ban::BanEngine`] uses.
pub struct RotatingSecret<R> {
    current: [u8; 16],
    previous: [u8; 16],
    rotation: Duration,
    rng: R,
    callouts: CalloutQueue<(), ()>,
}

impl<R> RotatingSecret<R>
where
    R: Rng,
{
    pub fn new(rotation: Duration, mut rng: R, now: Instant) -> Self {
        let mut current = [0u8; 16];
        let mut previous = [0u8; 16];
        rng.fill_bytes(&mut current);
        rng.fill_bytes(&mut previous);
        let mut callouts = CalloutQueue::new();
        callouts.schedule((), (), now + rotation);
        RotatingSecret {
            current,
            previous,
            rotation,
            rng,
            callouts,
        }
    }

    pub fn current(&self) -> &[u8; 16] {
        &self.current
    }

    pub fn previous(&self) -> &[u8; 16] {
        &self.previous
    }

    pub fn lifetime(&self) -> Duration {
        self.rotation
    }

    /// Rotates the secret if the scheduled rotation callout is due, re-arming the next one.
    pub fn drive(&mut self, now: Instant) {
        if !self.callouts.drain_due(now).is_empty() {
            self.previous = self.current;
            self.rng.fill_bytes(&mut self.current);
            self.callouts.schedule((), (), now + self.rotation);
            log::debug!(target: LOG_TARGET, "rotated DHT security token secret");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_core::SeededRng;

    #[test]
    fn rotates_exactly_once_per_period() {
        let t0 = Instant::now();
        let mut secret = RotatingSecret::new(Duration::from_secs(60), SeededRng::new(7), t0);
        let first_current = *secret.current();

        secret.drive(t0 + Duration::from_secs(30));
        assert_eq!(*secret.current(), first_current);

        secret.drive(t0 + Duration::from_secs(61));
        assert_ne!(*secret.current(), first_current);
        assert_eq!(*secret.previous(), first_current);
    }
}
