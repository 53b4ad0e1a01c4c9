use std::fmt;

use rand::{CryptoRng, RngCore, TryCryptoRng, TryRngCore};

/// An [`RngCore`] wrapper that counts how often, and for how many bytes, it is asked
/// for randomness.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    inner: R,
    calls: usize,
    bytes: usize,
}

impl<R> CountingRng<R> {
    /// Wraps `inner` with all counters at zero.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            calls: 0,
            bytes: 0,
        }
    }

    /// Number of requests served so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Number of random bytes handed out so far.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Sets both counters back to zero.
    pub fn reset(&mut self) {
        self.calls = 0;
        self.bytes = 0;
    }

    fn record(&mut self, bytes: usize) {
        self.calls += 1;
        self.bytes += bytes;
    }
}

impl<R: RngCore> RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.record(4);
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.record(8);
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        self.record(dst.len());
        self.inner.fill_bytes(dst)
    }
}

impl<R: CryptoRng> CryptoRng for CountingRng<R> {}

/// An entropy source that always fails, like an unavailable OS generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingRng;

/// The error reported by [`FailingRng`].
#[derive(Debug)]
pub struct Unavailable;

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("entropy source unavailable")
    }
}

impl std::error::Error for Unavailable {}

impl TryRngCore for FailingRng {
    type Error = Unavailable;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        Err(Unavailable)
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        Err(Unavailable)
    }

    fn try_fill_bytes(&mut self, _dst: &mut [u8]) -> Result<(), Self::Error> {
        Err(Unavailable)
    }
}

impl TryCryptoRng for FailingRng {}
