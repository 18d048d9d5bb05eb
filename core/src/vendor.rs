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

//! A stateless lookup from a handshake's vendor-version header to a ban reason, if any. Kept
//! separate from [`crate::ban::BanEngine`] because it has no timers and no per-address state —
//! it is pure data.

/// A small table of own-vendor builds known to corrupt the wire, plus foreign vendors this node
/// refuses outright. Both lists are deployment-supplied so that this crate does not hard-code a
/// specific vendor's release history.
#[derive(Clone, Debug, Default)]
pub struct VendorBlacklist {
    own_vendor_code: String,
    harmful_own_versions: Vec<String>,
    refused_foreign_vendors: Vec<String>,
}

impl VendorBlacklist {
    pub fn new(own_vendor_code: impl Into<String>) -> Self {
        VendorBlacklist {
            own_vendor_code: own_vendor_code.into(),
            harmful_own_versions: Vec::new(),
            refused_foreign_vendors: Vec::new(),
        }
    }

    pub fn with_harmful_own_version(mut self, version: impl Into<String>) -> Self {
        self.harmful_own_versions.push(version.into());
        self
    }

    pub fn with_refused_foreign_vendor(mut self, vendor_code: impl Into<String>) -> Self {
        self.refused_foreign_vendors.push(vendor_code.into());
        self
    }

    /// Returns a ban reason for `(vendor_code, version)`, if the pair is on either list.
    pub fn reason(&self, vendor_code: &str, version: &str) -> Option<&'static str> {
        if vendor_code == self.own_vendor_code && self.harmful_own_versions.iter().any(|v| v == version) {
            return Some("harmful build — upgrade required");
        }
        if self.refused_foreign_vendors.iter().any(|v| v == vendor_code) {
            return Some("connection refused");
        }
        None
    }
}
