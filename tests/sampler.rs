use mpmt::{
    ContractViolation, RVector, Ring, Ring1, Ring8, Ring32, Ring64, Sampler, SamplerConfig,
    rng::{BulkStrategy, Error},
};
use mpmt_test_utils::{
    counting::{CountingRng, FailingRng, Unavailable},
    stats::{chi_square, chi_square_critical},
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

const STRATEGIES: [BulkStrategy; 2] = [BulkStrategy::Single, BulkStrategy::Window { words: 256 }];

fn counting_sampler(strategy: BulkStrategy) -> Sampler<CountingRng<ChaCha20Rng>> {
    Sampler::with_config(
        CountingRng::new(ChaCha20Rng::seed_from_u64(1)),
        SamplerConfig {
            strategy,
            ..SamplerConfig::default()
        },
    )
}

fn histogram<R: Ring>(values: &RVector<R>, lb: u64, ub: u64) -> Vec<u64> {
    let mut counts = vec![0; (ub - lb + 1) as usize];
    for x in values.iter() {
        let word = x.to_word();
        assert!((lb..=ub).contains(&word), "{word} outside [{lb}, {ub}]");
        counts[(word - lb) as usize] += 1;
    }
    counts
}

#[test]
fn bounded_bulk_samples_are_uniform() {
    for strategy in STRATEGIES {
        let mut sampler = counting_sampler(strategy);
        let values = sampler
            .rvector_range(Ring8(3), Ring8(12), 1_000_000)
            .unwrap();
        let counts = histogram(&values, 3, 12);
        let statistic = chi_square(&counts);
        assert!(statistic < chi_square_critical(9), "{strategy:?}: {statistic}");

        let values = sampler
            .rvector_range(Ring32(1000), Ring32(1099), 1_000_000)
            .unwrap();
        let counts = histogram(&values, 1000, 1099);
        assert!(chi_square(&counts) < chi_square_critical(99), "{strategy:?}");
    }
}

#[test]
fn single_samples_are_uniform() {
    let mut sampler = counting_sampler(BulkStrategy::Single);
    let mut counts = [0_u64; 7];
    for _ in 0..200_000 {
        let x = sampler.sample_range(Ring64(u64::MAX - 6), Ring64::MAX).unwrap();
        counts[(x.0 - (u64::MAX - 6)) as usize] += 1;
    }
    assert!(chi_square(&counts) < chi_square_critical(6));
}

#[test]
fn bits_are_uniform() {
    let mut sampler = counting_sampler(BulkStrategy::Single);
    let bits = sampler.rvector::<Ring1>(100_000).unwrap();
    let counts = histogram(&bits, 0, 1);
    assert!(chi_square(&counts) < chi_square_critical(1));
}

#[test]
fn singleton_range_draws_no_entropy() {
    for strategy in STRATEGIES {
        let mut sampler = counting_sampler(strategy);
        assert_eq!(sampler.sample_range(Ring32(77), Ring32(77)).unwrap(), Ring32(77));
        let v = sampler.rvector_range(Ring8(0), Ring8(0), 1000).unwrap();
        assert!(v.iter().all(|&x| x == Ring8(0)));
        let mut out = [Ring64(1); 16];
        sampler.fill_range(Ring64::MAX, Ring64::MAX, &mut out).unwrap();
        assert_eq!(out, [Ring64::MAX; 16]);
        assert_eq!(sampler.source().calls(), 0);
        assert_eq!(sampler.source().bytes(), 0);
    }
}

#[test]
fn full_range_never_rejects() {
    let mut sampler = counting_sampler(BulkStrategy::Single);
    sampler.rvector::<Ring32>(1000).unwrap();
    assert_eq!(sampler.source().calls(), 1);
    assert_eq!(sampler.source().bytes(), 4000);

    // an explicit full range is the same request
    let mut sampler = counting_sampler(BulkStrategy::Single);
    sampler.rvector_range(Ring32(0), Ring32::MAX, 1000).unwrap();
    assert_eq!(sampler.source().calls(), 1);
    assert_eq!(sampler.source().bytes(), 4000);
}

#[test]
fn entropy_is_requested_in_blocks() {
    let mut sampler = Sampler::with_config(
        CountingRng::new(ChaCha20Rng::seed_from_u64(2)),
        SamplerConfig {
            strategy: BulkStrategy::Single,
            block_size: 1000,
        },
    );
    sampler.rvector::<Ring64>(1000).unwrap();
    assert_eq!(sampler.source().calls(), 8);
    assert_eq!(sampler.source().bytes(), 8000);
}

#[test]
fn window_amortizes_redraws() {
    // range 129: almost half of all bytes are rejected
    let mut single = counting_sampler(BulkStrategy::Single);
    let a = single.rvector_range(Ring8(0), Ring8(128), 10_000).unwrap();
    let mut window = counting_sampler(BulkStrategy::Window { words: 1024 });
    let b = window.rvector_range(Ring8(0), Ring8(128), 10_000).unwrap();
    assert!(a.iter().chain(b.iter()).all(|x| x.0 <= 128));
    assert!(single.source().calls() > 1000);
    assert!(window.source().calls() < 10);
}

#[test]
#[cfg_attr(
    any(debug_assertions, feature = "panic-on-contract-violation"),
    should_panic(expected = "lower bound 0x5 is greater than upper bound 0x4")
)]
fn inverted_range_is_rejected() {
    let mut sampler = counting_sampler(BulkStrategy::Single);
    assert!(matches!(
        sampler.rvector_range(Ring8(5), Ring8(4), 10),
        Err(Error::Contract(ContractViolation::InvalidRange { lb: 5, ub: 4 }))
    ));
    assert_eq!(sampler.source().calls(), 0);
}

#[test]
fn entropy_failures_are_reported() {
    let mut sampler = Sampler::new(FailingRng);
    let err = sampler.sample::<Ring64>().unwrap_err();
    assert!(matches!(err, Error::Entropy(_)));
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(source.to_string(), "entropy source unavailable");
    assert!(source.is::<Unavailable>());

    let mut vector = RVector::<Ring32>::with_len(4).unwrap();
    assert!(sampler.fill_rvector(&mut vector).is_err());
    assert!(!vector.is_checked_out());
    assert!(sampler.fill_rvector_range(Ring32(1), Ring32(2), &mut vector).is_err());
    assert!(!vector.is_checked_out());
}

#[test]
fn os_entropy() {
    let mut sampler = Sampler::from_os_rng();
    let values = sampler.rvector_range(Ring64(10), Ring64(20), 64).unwrap();
    assert!(values.iter().all(|x| (10..=20).contains(&x.0)));
}
