//! Criterion benchmarks for the sampler hot paths.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use demix::model::counts::SuffStats;
use demix::model::labels::QMatrices;
use demix::model::sampler;
use demix::utils::math::LnTable;
use demix::GenotypeData;

fn synthetic_data(n_individuals: usize, n_loci: usize, seed: u64) -> GenotypeData {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut alleles = Vec::with_capacity(n_individuals);
    let mut ids = Vec::with_capacity(n_individuals);
    let mut pops = Vec::with_capacity(n_individuals);
    for i in 0..n_individuals {
        let ind: Vec<Vec<u16>> = (0..n_loci)
            .map(|_| {
                (0..2)
                    .map(|_| {
                        // ~2% missing, four alleles otherwise
                        if rng.random::<f64>() < 0.02 {
                            0
                        } else {
                            rng.random_range(1..=4)
                        }
                    })
                    .collect()
            })
            .collect();
        alleles.push(ind);
        ids.push(format!("s{}", i));
        pops.push(format!("p{}", i % 4));
    }
    GenotypeData::from_parts(alleles, ids, pops).unwrap()
}

fn bench_group_update(c: &mut Criterion) {
    let data = synthetic_data(50, 20, 1);
    let k = 4;
    let table = LnTable::new(data.max_alleles(), 1.0);
    let mut stats = SuffStats::new(&data, k);
    let mut rng = StdRng::seed_from_u64(2);
    stats.randomize(&data, &mut rng);
    let mut weights = vec![0.0; k];

    c.bench_function("group_update_n50_l20_k4", |b| {
        b.iter(|| {
            sampler::update_groups(
                black_box(&data),
                &mut stats,
                1.0,
                1.0,
                1.0,
                &table,
                &mut weights,
                &mut rng,
            )
            .unwrap()
        })
    });

    c.bench_function("group_update_tempered", |b| {
        b.iter(|| {
            sampler::update_groups(
                black_box(&data),
                &mut stats,
                1.0,
                1.0,
                0.5,
                &table,
                &mut weights,
                &mut rng,
            )
            .unwrap()
        })
    });
}

fn bench_label_alignment(c: &mut Criterion) {
    let data = synthetic_data(50, 20, 3);
    let k = 4;
    let mut stats = SuffStats::new(&data, k);
    let mut rng = StdRng::seed_from_u64(4);
    stats.randomize(&data, &mut rng);
    let mut weights = vec![0.0; k];
    let mut q = QMatrices::new(data.n_gene_copies(), k);
    let mut cost = vec![vec![0.0; k]; k];

    c.bench_function("produce_and_align_n50_l20_k4", |b| {
        b.iter(|| {
            sampler::produce_q_matrix(&data, &stats, 1.0, 1.0, &mut q, &mut weights).unwrap();
            q.align_labels(&mut stats, &mut cost).unwrap();
            q.update_running();
        })
    });
}

criterion_group!(benches, bench_group_update, bench_label_alignment);
criterion_main!(benches);
