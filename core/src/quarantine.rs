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

//! Sockets that [`crate::ban::BanEngine::force`] has silently shut down are kept open for a
//! while rather than closed immediately, so a hammering peer gets no FIN and no RST to key a
//! faster retry off of. `QuarantineFifo` is the bounded holding pen for those fds.

use std::{collections::VecDeque, time::{Duration, Instant}};

/// An OS file descriptor. Left as a bare integer (rather than e.g. `std::os::fd::RawFd`) so this
/// crate stays platform-agnostic; the socket layer is responsible for the actual syscalls.
pub type RawFd = i32;

/// Closes a quarantined fd. Implemented by the socket layer; this crate never calls into the OS
/// directly (see Non-goals).
pub trait FdCloser: Send {
    fn close(&mut self, fd: RawFd);
}

const QUIESCENCE: Duration = Duration::from_secs(600);

/// A bounded FIFO of quarantined fds. Pushing past capacity closes the oldest entry first.
pub struct QuarantineFifo {
    capacity: usize,
    fds: VecDeque<RawFd>,
    closer: Box<dyn FdCloser>,
    fd_shortage: bool,
    fd_runout: bool,
    last_pressure: Option<Instant>,
}

/// `capacity = min(max_fds_abs, sys_nofile * max_fds_ratio_pct / 100)`.
pub fn quarantine_capacity(max_fds_abs: u32, max_fds_ratio_pct: u8, sys_nofile: u32) -> usize {
    let ratio_based = (sys_nofile as u64 * max_fds_ratio_pct as u64 / 100) as usize;
    (max_fds_abs as usize).min(ratio_based)
}

impl QuarantineFifo {
    pub fn new(capacity: usize, closer: Box<dyn FdCloser>) -> Self {
        QuarantineFifo {
            capacity,
            fds: VecDeque::with_capacity(capacity),
            closer,
            fd_shortage: false,
            fd_runout: false,
            last_pressure: None,
        }
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Adds `fd` to the pen, closing the oldest entry first if already at capacity.
    pub fn push(&mut self, fd: RawFd) {
        if self.capacity == 0 {
            self.closer.close(fd);
            return;
        }
        if self.fds.len() >= self.capacity {
            if let Some(victim) = self.fds.pop_front() {
                self.closer.close(victim);
            }
        }
        self.fds.push_back(fd);
    }

    /// The fd-exhaustion entry point: close and evict the single oldest quarantined fd to make
    /// room elsewhere. Safe to call on an empty FIFO. Returns whether an fd was actually
    /// recycled.
    pub fn reclaim(&mut self, now: Instant) -> bool {
        match self.fds.pop_front() {
            Some(victim) => {
                self.closer.close(victim);
                self.fd_shortage = true;
                self.last_pressure = Some(now);
                true
            },
            None => {
                self.fd_shortage = true;
                self.fd_runout = true;
                self.last_pressure = Some(now);
                false
            },
        }
    }

    /// Clears the shortage/runout flags once 10 minutes have passed without further pressure.
    pub fn decay_pressure_flags(&mut self, now: Instant) {
        if let Some(last) = self.last_pressure {
            if now.saturating_duration_since(last) >= QUIESCENCE {
                self.fd_shortage = false;
                self.fd_runout = false;
                self.last_pressure = None;
            }
        }
    }

    pub fn fd_shortage(&self) -> bool {
        self.fd_shortage
    }

    pub fn fd_runout(&self) -> bool {
        self.fd_runout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingCloser(Arc<Mutex<Vec<RawFd>>>);
    impl FdCloser for RecordingCloser {
        fn close(&mut self, fd: RawFd) {
            self.0.lock().unwrap().push(fd);
        }
    }

    #[test]
    fn push_at_capacity_closes_the_oldest() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let mut fifo = QuarantineFifo::new(2, Box::new(RecordingCloser(closed.clone())));
        fifo.push(1);
        fifo.push(2);
        fifo.push(3);
        assert_eq!(*closed.lock().unwrap(), vec![1]);
        assert_eq!(fifo.len(), fifo.capacity());
    }

    #[test]
    fn reclaim_on_empty_fifo_returns_false() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let mut fifo = QuarantineFifo::new(4, Box::new(RecordingCloser(closed)));
        assert!(!fifo.reclaim(Instant::now()));
        assert!(fifo.fd_runout());
    }

    #[test]
    fn capacity_is_the_tighter_of_the_two_bounds() {
        assert_eq!(quarantine_capacity(100, 10, 10_000), 100);
        assert_eq!(quarantine_capacity(5_000, 10, 10_000), 1_000);
    }

    #[test]
    fn pressure_flags_clear_after_quiescence() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let mut fifo = QuarantineFifo::new(1, Box::new(RecordingCloser(closed)));
        let t0 = Instant::now();
        fifo.reclaim(t0);
        assert!(fifo.fd_shortage());
        fifo.decay_pressure_flags(t0 + Duration::from_secs(599));
        assert!(fifo.fd_shortage());
        fifo.decay_pressure_flags(t0 + Duration::from_secs(600));
        assert!(!fifo.fd_shortage());
    }
}
