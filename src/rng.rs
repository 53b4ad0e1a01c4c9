//! Unbiased uniform sampling of ring elements, optionally restricted to `[lb, ub]`.
//!
//! Bounded values use rejection sampling. With `range = ub - lb + 1` and
//! `maxv = 2^k - 1`, a random word `w` is accepted iff `w < maxv - (maxv % range)` and
//! mapped to `w % range + lb`. The accepted words form a multiple of `range`, so every
//! result is equally likely. `range == 1` returns `lb` without touching the entropy
//! source, and the full ring (`lb == 0`, `ub == maxv`) skips rejection.
//!
//! Bulk sampling amortizes calls to the entropy source: the output buffer is filled
//! with random bytes in as few calls as possible (at most [`SamplerConfig::block_size`]
//! bytes each) and rejection runs over it in place. Rejected elements are redrawn
//! according to the [`BulkStrategy`].
use rand::{TryCryptoRng, rngs::OsRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::{
    contract::{ContractViolation, check_contract},
    ring::Ring,
    rvector::{AllocError, Lease, RVector},
};

/// Errors occurring during sampling.
#[derive(Debug, Error)]
pub enum Error {
    /// The entropy source failed to produce random bytes.
    #[error("entropy source failed")]
    Entropy(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The sampling request violates its contract (e.g. `lb > ub`).
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    /// The output vector could not be allocated.
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// A source of cryptographically secure random bytes.
///
/// Implemented for every [`TryCryptoRng`] with a `std::error::Error` error type, e.g.
/// [`OsRng`] or a seeded `rand_chacha::ChaCha20Rng`. A failure keeps the generator's
/// error as its source.
pub trait EntropySource {
    /// Fills `dest` entirely with random bytes.
    fn fill_entropy(&mut self, dest: &mut [u8]) -> Result<(), Error>;
}

impl<T> EntropySource for T
where
    T: TryCryptoRng + ?Sized,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    #[inline]
    fn fill_entropy(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.try_fill_bytes(dest)
            .map_err(|e| Error::Entropy(Box::new(e)))
    }
}

/// How bulk sampling redraws rejected elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkStrategy {
    /// Draw a fresh word from the entropy source for every rejection.
    Single,
    /// Take replacement words from a pre-filled window of `words` 64-bit words which
    /// is refilled in one call when exhausted.
    Window {
        /// Window length in 64-bit words.
        words: usize,
    },
}

/// Configuration of a [`Sampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// How rejected elements of bulk requests are redrawn.
    pub strategy: BulkStrategy,
    /// Maximum number of bytes requested from the entropy source in one call.
    pub block_size: usize,
}

impl SamplerConfig {
    /// Default upper bound of a single entropy request: 32 MiB.
    pub const DEFAULT_BLOCK_SIZE: usize = 1 << 25;
    /// Default window length in words.
    pub const DEFAULT_WINDOW_WORDS: usize = 512;
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            strategy: BulkStrategy::Window {
                words: Self::DEFAULT_WINDOW_WORDS,
            },
            block_size: Self::DEFAULT_BLOCK_SIZE,
        }
    }
}

/// What to do for a requested range, decided once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    /// `range == 1`: the result is fixed.
    Constant(u64),
    /// The whole ring: every word is accepted as is.
    Full,
    /// Rejection sampling.
    Reject(Bounds),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    lb: u64,
    range: u64,
    threshold: u64,
}

impl Bounds {
    #[inline]
    fn accept(&self, word: u64) -> Option<u64> {
        (word < self.threshold).then(|| word % self.range + self.lb)
    }
}

fn plan<R: Ring>(lb: R, ub: R) -> Result<Plan, ContractViolation> {
    let (lb, ub, maxv) = (lb.to_word(), ub.to_word(), R::MAX.to_word());
    check_contract!(lb <= ub, ContractViolation::InvalidRange { lb, ub })?;
    if lb == 0 && ub == maxv {
        return Ok(Plan::Full);
    }
    // cannot overflow: ub - lb < maxv
    let range = ub - lb + 1;
    if range == 1 {
        return Ok(Plan::Constant(lb));
    }
    Ok(Plan::Reject(Bounds {
        lb,
        range,
        threshold: maxv - maxv % range,
    }))
}

/// Interprets the first `R::BYTES` bytes as a little-endian word of the ring.
#[inline]
fn word_from_le<R: Ring>(bytes: &[u8]) -> u64 {
    let mut buf = [0; 8];
    buf[..R::BYTES].copy_from_slice(&bytes[..R::BYTES]);
    u64::from_le_bytes(buf) & R::MAX.to_word()
}

/// Uniform sampler of ring elements on top of an [`EntropySource`].
#[derive(Debug)]
pub struct Sampler<E> {
    source: E,
    config: SamplerConfig,
    window: Vec<u8>,
    window_pos: usize,
}

impl Sampler<OsRng> {
    /// A sampler drawing from the operating system's CSPRNG.
    pub fn from_os_rng() -> Self {
        Self::new(OsRng)
    }
}

impl<E: EntropySource> Sampler<E> {
    /// A sampler with the default configuration.
    pub fn new(source: E) -> Self {
        Self::with_config(source, SamplerConfig::default())
    }

    /// A sampler with an explicit configuration.
    pub fn with_config(source: E, config: SamplerConfig) -> Self {
        Self {
            source,
            config,
            window: Vec::new(),
            window_pos: 0,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// The entropy source.
    pub fn source(&self) -> &E {
        &self.source
    }

    /// Consumes the sampler and returns the entropy source.
    pub fn into_source(self) -> E {
        self.source
    }

    /// A uniformly random element of the whole ring.
    pub fn sample<R: Ring>(&mut self) -> Result<R, Error> {
        self.draw_word::<R>().map(R::from_word)
    }

    /// A uniformly random element of `[lb, ub]` (`lb <= ub` as words).
    pub fn sample_range<R: Ring>(&mut self, lb: R, ub: R) -> Result<R, Error> {
        let bounds = match plan(lb, ub)? {
            Plan::Constant(value) => return Ok(R::from_word(value)),
            Plan::Full => return self.sample(),
            Plan::Reject(bounds) => bounds,
        };
        loop {
            if let Some(value) = bounds.accept(self.draw_word::<R>()?) {
                return Ok(R::from_word(value));
            }
        }
    }

    /// Overwrites `out` with uniformly random elements of the whole ring.
    pub fn fill<R: Ring>(&mut self, out: &mut [R]) -> Result<(), Error> {
        self.fill_raw(bytemuck::cast_slice_mut(out))?;
        // normalize byte order (and mask the bit ring) in place
        for x in out.iter_mut() {
            *x = R::from_word(x.from_le().to_word());
        }
        Ok(())
    }

    /// Overwrites `out` with uniformly random elements of `[lb, ub]`.
    pub fn fill_range<R: Ring>(&mut self, lb: R, ub: R, out: &mut [R]) -> Result<(), Error> {
        let bounds = match plan(lb, ub)? {
            Plan::Constant(value) => {
                out.fill(R::from_word(value));
                return Ok(());
            }
            Plan::Full => return self.fill(out),
            Plan::Reject(bounds) => bounds,
        };
        self.fill_raw(bytemuck::cast_slice_mut(out))?;
        let mut rejected = 0_usize;
        for x in out.iter_mut() {
            let mut word = x.from_le().to_word();
            let value = loop {
                if let Some(value) = bounds.accept(word) {
                    break value;
                }
                rejected += 1;
                word = self.redraw_word::<R>()?;
            };
            *x = R::from_word(value);
        }
        trace!(len = out.len(), rejected, "filled bounded ring elements");
        Ok(())
    }

    /// A new vector of `len` uniformly random elements.
    pub fn rvector<R: Ring>(&mut self, len: usize) -> Result<RVector<R>, Error> {
        let mut lease = Lease::allocate(len)?;
        self.fill(&mut lease)?;
        Ok(RVector::from_lease(lease))
    }

    /// A new vector of `len` uniformly random elements of `[lb, ub]`.
    pub fn rvector_range<R: Ring>(
        &mut self,
        lb: R,
        ub: R,
        len: usize,
    ) -> Result<RVector<R>, Error> {
        let mut lease = Lease::allocate(len)?;
        self.fill_range(lb, ub, &mut lease)?;
        Ok(RVector::from_lease(lease))
    }

    /// Overwrites the buffer of `vector` with uniformly random elements.
    pub fn fill_rvector<R: Ring>(&mut self, vector: &mut RVector<R>) -> Result<(), Error> {
        let mut lease = vector.check_out()?;
        let result = self.fill(&mut lease);
        vector.check_in(lease)?;
        result
    }

    /// Overwrites the buffer of `vector` with uniformly random elements of `[lb, ub]`.
    pub fn fill_rvector_range<R: Ring>(
        &mut self,
        lb: R,
        ub: R,
        vector: &mut RVector<R>,
    ) -> Result<(), Error> {
        let mut lease = vector.check_out()?;
        let result = self.fill_range(lb, ub, &mut lease);
        vector.check_in(lease)?;
        result
    }

    /// Fills `bytes` in calls of at most `block_size` bytes.
    fn fill_raw(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        for block in bytes.chunks_mut(self.config.block_size.max(1)) {
            self.source.fill_entropy(block)?;
        }
        Ok(())
    }

    /// One word of the ring straight from the entropy source.
    fn draw_word<R: Ring>(&mut self) -> Result<u64, Error> {
        let mut buf = [0; 8];
        self.source.fill_entropy(&mut buf[..R::BYTES])?;
        Ok(word_from_le::<R>(&buf))
    }

    /// A replacement word for a rejected bulk element.
    fn redraw_word<R: Ring>(&mut self) -> Result<u64, Error> {
        let BulkStrategy::Window { words } = self.config.strategy else {
            return self.draw_word::<R>();
        };
        let window_len = words.max(1) * 8;
        if self.window.len() != window_len || self.window_pos + R::BYTES > window_len {
            self.window.resize(window_len, 0);
            self.source.fill_entropy(&mut self.window)?;
            self.window_pos = 0;
            trace!(bytes = window_len, "refilled rejection window");
        }
        let word = word_from_le::<R>(&self.window[self.window_pos..]);
        self.window_pos += R::BYTES;
        Ok(word)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::ring::{Ring1, Ring8, Ring16, Ring32, Ring64};

    fn sampler(strategy: BulkStrategy) -> Sampler<ChaCha20Rng> {
        Sampler::with_config(
            ChaCha20Rng::seed_from_u64(7),
            SamplerConfig {
                strategy,
                block_size: 64,
            },
        )
    }

    #[test]
    fn threshold_removes_modulo_bias() {
        // 2^8 - 1 = 255 = 25 * 10 + 5, so words 250..=255 are rejected
        let Plan::Reject(bounds) = plan(Ring8(3), Ring8(12)).unwrap() else {
            panic!("expected rejection plan");
        };
        assert_eq!(bounds.range, 10);
        assert_eq!(bounds.threshold, 250);
        assert_eq!(bounds.accept(249), Some(9 + 3));
        assert_eq!(bounds.accept(250), None);
        assert_eq!(bounds.accept(255), None);
    }

    #[test]
    fn special_ranges() {
        assert_eq!(plan(Ring64(5), Ring64(5)).unwrap(), Plan::Constant(5));
        assert_eq!(plan(Ring64(0), Ring64::MAX).unwrap(), Plan::Full);
        assert_eq!(plan(Ring1::FALSE, Ring1::TRUE).unwrap(), Plan::Full);
        assert_eq!(plan(Ring1::TRUE, Ring1::TRUE).unwrap(), Plan::Constant(1));
        let Plan::Reject(bounds) = plan(Ring64(1), Ring64::MAX).unwrap() else {
            panic!("expected rejection plan");
        };
        assert_eq!(bounds.range, u64::MAX);
        assert_eq!(bounds.threshold, u64::MAX);
    }

    #[test]
    #[cfg_attr(
        any(debug_assertions, feature = "panic-on-contract-violation"),
        should_panic(expected = "lower bound 0x9 is greater than upper bound 0x8")
    )]
    fn inverted_range_is_a_contract_violation() {
        let mut s = sampler(BulkStrategy::Single);
        let err = s.sample_range(Ring32(9), Ring32(8)).unwrap_err();
        assert!(matches!(
            err,
            Error::Contract(ContractViolation::InvalidRange { lb: 9, ub: 8 })
        ));
        let mut out = [Ring32(0); 4];
        assert!(s.fill_range(Ring32(9), Ring32(8), &mut out).is_err());
    }

    #[test]
    fn bounded_samples_stay_in_range() {
        for strategy in [BulkStrategy::Single, BulkStrategy::Window { words: 4 }] {
            let mut s = sampler(strategy);
            let v = s.rvector_range(Ring16(1000), Ring16(1009), 5000).unwrap();
            assert_eq!(v.len(), 5000);
            assert!(v.iter().all(|x| (1000..=1009).contains(&x.0)));
            for _ in 0..100 {
                let x = s.sample_range(Ring64(u64::MAX - 2), Ring64::MAX).unwrap();
                assert!(x.0 >= u64::MAX - 2);
            }
        }
    }

    #[test]
    fn every_value_of_small_range_appears() {
        let mut s = sampler(BulkStrategy::Window { words: 16 });
        let mut out = [Ring8(0); 4096];
        s.fill_range(Ring8(250), Ring8(255), &mut out).unwrap();
        for value in 250..=255 {
            assert!(out.contains(&Ring8(value)));
        }
    }

    #[test]
    fn bit_ring_samples_are_canonical() {
        let mut s = sampler(BulkStrategy::Single);
        let bits = s.rvector::<Ring1>(1000).unwrap();
        assert!(bits.iter().all(|b| b.is_canonical()));
        let ones = bits.iter().filter(|b| b.get()).count();
        assert!((400..600).contains(&ones));
    }

    #[test]
    fn same_seed_same_output() {
        let a = sampler(BulkStrategy::Single).rvector::<Ring32>(100).unwrap();
        let b = sampler(BulkStrategy::Window { words: 8 })
            .rvector::<Ring32>(100)
            .unwrap();
        // unbounded fills never redraw, so the strategy does not matter
        assert_eq!(a, b);
    }

    #[test]
    fn fill_rvector_returns_the_lease() {
        let mut s = sampler(BulkStrategy::Single);
        let mut v = RVector::<Ring64>::with_len(32).unwrap();
        s.fill_rvector_range(Ring64(10), Ring64(20), &mut v).unwrap();
        assert!(!v.is_checked_out());
        assert!(v.iter().all(|x| (10..=20).contains(&x.0)));
    }

    proptest! {
        #[test]
        fn sample_range_respects_bounds(lb in any::<u32>(), width in any::<u32>(), seed in any::<u64>()) {
            let ub = lb.saturating_add(width);
            let mut s = Sampler::new(ChaCha20Rng::seed_from_u64(seed));
            let x = s.sample_range(Ring32(lb), Ring32(ub)).unwrap();
            prop_assert!(lb <= x.0 && x.0 <= ub);
        }
    }
}
