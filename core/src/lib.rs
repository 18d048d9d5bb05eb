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

//! Abuse-control primitives a peer-to-peer node places between its socket layer and its
//! higher-level request handlers: a generic aging/expiry table, a hammering ban engine with
//! leaky-bucket accounting and exponential back-off, a bounded fd quarantine FIFO, a vendor
//! blacklist and handshake version-token mint/verify machinery, all built on a single-threaded
//! callout (timer) queue.
//!
//! Every engine here is driven by an externally supplied [`std::time::Instant`] rather than
//! reading the wall clock; see [`clock::FakeClock`] for the test-only time source used
//! throughout this crate's own test suite.

pub mod address;
pub mod aging;
pub mod ban;
pub mod callout;
pub mod clock;
pub mod config;
pub mod quarantine;
pub mod rng;
pub mod token;
pub mod vendor;
pub mod warn_once;

pub use address::Address;
pub use aging::{AgingTable, ThreadSafeAgingTable};
pub use ban::{BanEngine, Decision, NoWhitelist, QuarantineSocket, WhitelistCheck};
pub use callout::{CalloutHandle, CalloutQueue};
pub use config::{AgingConfig, BanConfig, TokenConfig};
pub use quarantine::{quarantine_capacity, FdCloser, QuarantineFifo, RawFd};
pub use rng::{OsRng, Rng, SeededRng};
pub use vendor::VendorBlacklist;
pub use warn_once::WarnOnce;
