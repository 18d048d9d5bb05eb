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

//! The hammering ban engine: a per-address leaky-bucket rate limiter with exponential ban
//! back-off, sitting directly on the socket-accept path.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::{
    aging::AgingTable,
    address::Address,
    callout::CalloutQueue,
    config::BanConfig,
    quarantine::{FdCloser, QuarantineFifo},
};

const LOG_TARGET: &str = "guard::ban";

/// What the socket layer should do with the connection that just made a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Proceed normally.
    Allow,
    /// This is a freshly banned (or re-reminded) peer; send it a short reason and close.
    FirstBan,
    /// This peer is already banned and was already reminded recently; shut it down silently.
    ForceClose,
    /// This peer is banned for a caller-supplied reason; report it verbatim and close.
    BanWithMessage(String),
}

/// Capability to check whether an address is exempt from all ban accounting.
pub trait WhitelistCheck {
    fn is_whitelisted(&self, addr: Address) -> bool;
}

/// A whitelist that exempts nobody; the default when no out-of-band list is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoWhitelist;

impl WhitelistCheck for NoWhitelist {
    fn is_whitelisted(&self, _addr: Address) -> bool {
        false
    }
}

/// Lets the socket layer perform the non-blocking half-close and buffer shrink `force()`
/// requires, without this crate touching a real socket type.
pub trait QuarantineSocket {
    fn shrink_buffers(&mut self, to_bytes: usize);
    fn shutdown_read(&mut self);
    fn take_fd(&mut self) -> crate::quarantine::RawFd;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BanCallout {
    Decay,
    Unban,
}

struct BanRecord {
    counter: f32,
    created: Instant,
    ban_delay: u32,
    ban_count: u32,
    ban_msg: Option<String>,
    banned: bool,
}

impl BanRecord {
    fn fresh(now: Instant) -> Self {
        BanRecord {
            counter: 0.0,
            created: now,
            ban_delay: 0,
            ban_count: 0,
            ban_msg: None,
            banned: false,
        }
    }
}

/// The per-address rate limiter described in the module docs.
pub struct BanEngine<W = NoWhitelist> {
    config: BanConfig,
    records: AgingTable<Address, BanRecord>,
    callouts: CalloutQueue<Address, BanCallout>,
    quarantine: QuarantineFifo,
    whitelist: W,
}

impl<W> BanEngine<W>
where
    W: WhitelistCheck,
{
    pub fn new(config: BanConfig, whitelist: W, quarantine: QuarantineFifo) -> Self {
        // The aging TTL here is a generous backstop, not the removal mechanism: records are
        // actually retired by their own Decay/Unban callouts. A value far beyond any realistic
        // ban_delay just guarantees a leaked record cannot survive forever if a callout is ever
        // dropped by an embedding bug.
        let backstop_ttl = Duration::from_secs(config.max_delay_secs as u64 * 4);
        BanEngine {
            config,
            records: AgingTable::new(backstop_ttl),
            callouts: CalloutQueue::new(),
            quarantine,
            whitelist,
        }
    }

    /// As [`Self::allow`], but for callers that only sometimes have a resolvable `Address` (e.g.
    /// a non-IP transport, or a connection that hung up before its peer address was read).
    /// `None` always short-circuits to `Allow`, the same way an unrecognized address family does
    /// in the reference implementation this engine is modeled on.
    pub fn allow_opt(&mut self, addr: Option<Address>, now: Instant) -> Decision {
        match addr {
            Some(addr) => self.allow(addr, now),
            None => Decision::Allow,
        }
    }

    /// The core decision function: called once per request/connection attempt from `addr`.
    pub fn allow(&mut self, addr: Address, now: Instant) -> Decision {
        if self.whitelist.is_whitelisted(addr) {
            return Decision::Allow;
        }

        let rate = self.config.decay_rate();
        let max = self.config.max_requests as f32;

        let Some(mut rec) = self.records.remove(&addr) else {
            let mut rec = BanRecord::fresh(now);
            rec.counter = 1.0;
            self.arm_decay(addr, &rec, rate, now);
            self.records.insert(addr, rec, now);
            return Decision::Allow;
        };

        if rec.banned {
            let decision = if let Some(msg) = rec.ban_msg.clone() {
                Decision::BanWithMessage(msg)
            } else {
                rec.ban_count += 1;
                if rec.ban_count % self.config.remind_every.max(1) == 0 {
                    Decision::FirstBan
                } else {
                    Decision::ForceClose
                }
            };
            self.records.insert(addr, rec, now);
            return decision;
        }

        let elapsed = now.saturating_duration_since(rec.created).as_secs_f32();
        rec.counter = (rec.counter - elapsed * rate).max(0.0);
        rec.counter += 1.0;
        rec.created = now;

        if rec.counter <= max {
            self.arm_decay(addr, &rec, rate, now);
            self.records.insert(addr, rec, now);
            Decision::Allow
        } else {
            let next_delay = if rec.ban_delay == 0 {
                self.config.initial_delay_secs
            } else {
                rec.ban_delay.saturating_mul(2).min(self.config.max_delay_secs)
            };
            rec.ban_delay = next_delay;
            rec.banned = true;
            rec.ban_count = 0;
            self.callouts
                .schedule(addr, BanCallout::Unban, now + Duration::from_secs(next_delay as u64));
            debug!(target: LOG_TARGET, "{} hammering: banned for {}s", addr, next_delay);
            self.records.insert(addr, rec, now);
            Decision::FirstBan
        }
    }

    /// Force-bans `addr` for `max_delay_secs` with a caller-supplied reason, preserving any
    /// existing `ban_count`.
    pub fn record(&mut self, addr: Address, msg: impl Into<String>, now: Instant) {
        let ban_count = self.records.remove(&addr).map(|r| r.ban_count).unwrap_or(0);
        let mut rec = BanRecord::fresh(now);
        rec.banned = true;
        rec.ban_delay = self.config.max_delay_secs;
        rec.ban_count = ban_count;
        rec.ban_msg = Some(msg.into());
        self.callouts.schedule(
            addr,
            BanCallout::Unban,
            now + Duration::from_secs(self.config.max_delay_secs as u64),
        );
        self.records.insert(addr, rec, now);
    }

    /// Performs the non-blocking shutdown-and-quarantine the socket layer must do after a
    /// `ForceClose` decision.
    pub fn force(&mut self, sock: &mut dyn QuarantineSocket) {
        sock.shrink_buffers(512);
        sock.shutdown_read();
        let fd = sock.take_fd();
        self.quarantine.push(fd);
    }

    pub fn is_banned(&self, addr: Address) -> bool {
        self.records.get(&addr).is_some_and(|r| r.banned)
    }

    pub fn delay(&self, addr: Address) -> Duration {
        self.records
            .get(&addr)
            .map(|r| Duration::from_secs(r.ban_delay as u64))
            .unwrap_or_default()
    }

    pub fn message(&self, addr: Address) -> Option<&str> {
        self.records.get(&addr).and_then(|r| r.ban_msg.as_deref())
    }

    /// The fd-exhaustion entry point, delegated straight through to the quarantine FIFO.
    pub fn reclaim(&mut self, now: Instant) -> bool {
        self.quarantine.reclaim(now)
    }

    pub fn quarantine(&self) -> &QuarantineFifo {
        &self.quarantine
    }

    /// Dispatches every callout (decay expiry, unban) that is due by `now`, plus the backstop
    /// aging sweep. Must be called periodically (`ban.gc_tick`) by the embedding event loop.
    pub fn drive(&mut self, now: Instant) {
        for (addr, kind) in self.callouts.drain_due(now) {
            match kind {
                BanCallout::Decay => {
                    // The decay timer fires exactly when the counter would reach zero; if the
                    // record wasn't touched again in the meantime and isn't banned, it's dead
                    // weight.
                    if self.records.get(&addr).is_some_and(|r| !r.banned) {
                        self.records.remove(&addr);
                    }
                },
                BanCallout::Unban => self.unban(addr, now),
            }
        }
        self.records.gc(now);
        self.quarantine.decay_pressure_flags(now);
    }

    fn unban(&mut self, addr: Address, now: Instant) {
        let Some(mut rec) = self.records.remove(&addr) else {
            return;
        };
        let rate = self.config.decay_rate();
        let elapsed = now.saturating_duration_since(rec.created).as_secs_f32();
        rec.counter = (rec.counter - elapsed * rate).max(0.0);
        rec.created = now;

        if rec.counter <= 0.0 {
            debug!(target: LOG_TARGET, "{} unbanned, counter drained, dropping record", addr);
            // Leave it dropped; do not reinsert.
            return;
        }

        rec.banned = false;
        rec.ban_msg = None;
        self.arm_decay(addr, &rec, rate, now);
        warn!(target: LOG_TARGET, "{} unbanned with residual load {:.2}", addr, rec.counter);
        self.records.insert(addr, rec, now);
    }

    fn arm_decay(&mut self, addr: Address, rec: &BanRecord, rate: f32, now: Instant) {
        let seconds_to_zero = if rate > 0.0 { rec.counter / rate } else { 0.0 };
        self.callouts
            .schedule(addr, BanCallout::Decay, now + Duration::from_secs_f32(seconds_to_zero.max(0.0)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    struct NullCloser;
    impl FdCloser for NullCloser {
        fn close(&mut self, _fd: crate::quarantine::RawFd) {}
    }

    fn engine() -> BanEngine {
        let config = BanConfig {
            initial_delay_secs: 300,
            max_delay_secs: 10_800,
            max_requests: 5,
            period_secs: 60,
            remind_every: 5,
            ..BanConfig::default()
        };
        BanEngine::new(config, NoWhitelist, QuarantineFifo::new(16, Box::new(NullCloser)))
    }

    fn addr() -> Address {
        Address::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)))
    }

    #[test]
    fn scenario_1_hammering_transitions_to_ban() {
        let mut e = engine();
        let a = addr();
        let t0 = Instant::now();
        let mut decisions = Vec::new();
        for i in 0..6u64 {
            decisions.push(e.allow(a, t0 + Duration::from_secs(i)));
        }
        assert_eq!(
            decisions,
            vec![
                Decision::Allow,
                Decision::Allow,
                Decision::Allow,
                Decision::Allow,
                Decision::Allow,
                Decision::FirstBan,
            ]
        );
        assert!(e.is_banned(a));
        assert_eq!(e.delay(a), Duration::from_secs(300));

        e.drive(t0 + Duration::from_secs(301));
        assert!(!e.is_banned(a));
    }

    #[test]
    fn scenario_2_exponential_backoff() {
        let mut e = engine();
        let a = addr();
        let t0 = Instant::now();
        for i in 0..6u64 {
            e.allow(a, t0 + Duration::from_secs(i));
        }
        assert_eq!(e.delay(a), Duration::from_secs(300));
        e.drive(t0 + Duration::from_secs(301));

        let t1 = t0 + Duration::from_secs(305);
        let mut decisions = Vec::new();
        for i in 0..6u64 {
            decisions.push(e.allow(a, t1 + Duration::from_secs(i)));
        }
        assert_eq!(decisions.last(), Some(&Decision::FirstBan));
        assert_eq!(e.delay(a), Duration::from_secs(600));
    }

    #[test]
    fn scenario_3_silent_drop_with_periodic_reminder() {
        let mut e = engine();
        let a = addr();
        let t0 = Instant::now();
        for i in 0..6u64 {
            e.allow(a, t0 + Duration::from_secs(i));
        }
        assert!(e.is_banned(a));

        let mut decisions = Vec::new();
        for i in 0..10u64 {
            decisions.push(e.allow(a, t0 + Duration::from_secs(10 + i)));
        }
        assert_eq!(
            decisions,
            vec![
                Decision::ForceClose,
                Decision::ForceClose,
                Decision::ForceClose,
                Decision::ForceClose,
                Decision::FirstBan,
                Decision::ForceClose,
                Decision::ForceClose,
                Decision::ForceClose,
                Decision::ForceClose,
                Decision::FirstBan,
            ]
        );
    }

    #[test]
    fn ban_cap_doubles_up_to_max_delay() {
        let mut e = engine();
        let a = addr();
        let mut t = Instant::now();
        let mut last_delay = Duration::ZERO;
        for _ in 0..20 {
            for i in 0..6u64 {
                e.allow(a, t + Duration::from_secs(i));
            }
            last_delay = e.delay(a);
            t += last_delay + Duration::from_secs(5);
            e.drive(t);
        }
        assert_eq!(last_delay, Duration::from_secs(10_800));
    }

    #[test]
    fn custom_record_preserves_ban_count() {
        let mut e = engine();
        let a = addr();
        let t0 = Instant::now();
        for i in 0..6u64 {
            e.allow(a, t0 + Duration::from_secs(i));
        }
        e.allow(a, t0 + Duration::from_secs(10));
        e.record(a, "explicit abuse", t0 + Duration::from_secs(11));
        assert_eq!(e.message(a), Some("explicit abuse"));
        assert_eq!(e.delay(a), Duration::from_secs(10_800));
    }

    #[test]
    fn allow_opt_none_always_allows() {
        let mut e = engine();
        let t0 = Instant::now();
        assert_eq!(e.allow_opt(None, t0), Decision::Allow);
    }

    #[test]
    fn whitelisted_address_always_allowed() {
        struct AllowAll;
        impl WhitelistCheck for AllowAll {
            fn is_whitelisted(&self, _addr: Address) -> bool {
                true
            }
        }
        let mut e = BanEngine::new(BanConfig::default(), AllowAll, QuarantineFifo::new(4, Box::new(NullCloser)));
        let a = addr();
        let t0 = Instant::now();
        for i in 0..20u64 {
            assert_eq!(e.allow(a, t0 + Duration::from_secs(i)), Decision::Allow);
        }
    }
}
