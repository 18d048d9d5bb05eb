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

//! A steady request rate below the ban threshold must never tip a peer into a ban: the
//! leaky-bucket counter has to stay bounded by `max(1, lambda * period / max_requests + 1)`
//! regardless of how long the stream runs.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use guard_core::ban::{BanEngine, Decision, NoWhitelist};
use guard_core::config::BanConfig;
use guard_core::quarantine::{FdCloser, QuarantineFifo, RawFd};
use guard_core::Address;

struct NullCloser;
impl FdCloser for NullCloser {
    fn close(&mut self, _fd: RawFd) {}
}

#[test]
fn steady_rate_below_threshold_never_bans() {
    let config = BanConfig {
        initial_delay_secs: 300,
        max_delay_secs: 10_800,
        max_requests: 5,
        period_secs: 60,
        remind_every: 5,
        ..BanConfig::default()
    };
    let mut engine = BanEngine::new(config, NoWhitelist, QuarantineFifo::new(16, Box::new(NullCloser)));
    let addr = Address::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 20)));

    // One request every 15s is 4 requests per 60s period, comfortably under max_requests=5.
    let t0 = Instant::now();
    for i in 0..200u64 {
        let decision = engine.allow(addr, t0 + Duration::from_secs(15 * i));
        assert_eq!(decision, Decision::Allow, "request {i} should never trigger a ban at this rate");
    }
    assert!(!engine.is_banned(addr));
}
