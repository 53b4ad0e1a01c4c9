use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput};
use mpmt::{RVector, Ring8, Ring64, Sampler, SamplerConfig, rng::BulkStrategy};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

pub fn sampler_benchmark(c: &mut Criterion) {
    let len_exponents = [16, 20];
    let strategies = [
        ("single", BulkStrategy::Single),
        ("window", BulkStrategy::Window { words: 512 }),
    ];
    let mut g = c.benchmark_group("sampler");
    for exp in len_exponents {
        let len = 2_usize.pow(exp);
        g.throughput(Throughput::Elements(len as u64));

        let mut sampler = Sampler::new(ChaCha20Rng::seed_from_u64(42));
        let mut vector = RVector::<Ring64>::with_len(len).unwrap();
        g.bench_function(BenchmarkId::new("full ring64", len), |b| {
            b.iter(|| sampler.fill_rvector(black_box(&mut vector)).unwrap())
        });

        for (name, strategy) in strategies {
            let mut sampler = Sampler::with_config(
                ChaCha20Rng::seed_from_u64(42),
                SamplerConfig {
                    strategy,
                    ..SamplerConfig::default()
                },
            );
            // range 129 rejects almost every second draw
            let mut vector = RVector::<Ring8>::with_len(len).unwrap();
            g.bench_function(BenchmarkId::new(format!("bounded ring8 {name}"), len), |b| {
                b.iter(|| {
                    sampler
                        .fill_rvector_range(Ring8(0), Ring8(128), black_box(&mut vector))
                        .unwrap()
                })
            });
        }
    }
}
