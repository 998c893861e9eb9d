// cargo bench -p paver
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use paveio::prelude::*;
use paver::first_fit::find_first_fit;
use pavepart::GptTable;
use pavepart::gpt::GptEntry;
use pavepart::guids::GPT_PARTITION_TYPE_DATA;

criterion_group!(benches, bench_first_fit, bench_table_load);
criterion_main!(benches);

const BS: u64 = 512;
const COUNT: u64 = 1 << 25;

fn make_guid(i: usize) -> [u8; 16] {
    (i as u128 + 1).to_le_bytes()
}

/// `n` partitions of 1024 blocks separated by 8-block holes, listed in
/// reverse so the search has to sort them.
fn fragmented(n: usize) -> Vec<GptEntry> {
    (0..n)
        .rev()
        .map(|i| {
            let first = 2048 + i as u64 * 1032;
            GptEntry::new(
                GPT_PARTITION_TYPE_DATA,
                make_guid(i),
                first,
                first + 1023,
                0,
                &format!("p{i}"),
            )
        })
        .collect()
}

fn bench_first_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_fit");
    for &n in &[8usize, 32, 128] {
        let entries = fragmented(n);

        group.bench_with_input(BenchmarkId::new("small_gap", n), &n, |b, &_n| {
            b.iter(|| {
                let pos = find_first_fit(&entries, BS, COUNT, 4 * BS).unwrap();
                std::hint::black_box(pos)
            });
        });

        // Nothing but the tail gap is large enough.
        group.bench_with_input(BenchmarkId::new("tail_gap", n), &n, |b, &_n| {
            b.iter(|| {
                let pos = find_first_fit(&entries, BS, COUNT, 1 << 30).unwrap();
                std::hint::black_box(pos)
            });
        });
    }
    group.finish();
}

fn bench_table_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("gpt_table_load");
    for &n in &[8usize, 32, 128] {
        let mut io = MemBlockIO::new(COUNT * BS);
        let mut table = GptTable::new_empty(BS, COUNT).unwrap();
        for (i, e) in fragmented(n).iter().enumerate() {
            table
                .add_partition(&e.name(), e.type_guid, make_guid(i), e.first_lba, 1024, 0)
                .unwrap();
        }
        table.sync(&mut io).unwrap();

        group.bench_with_input(BenchmarkId::new("primary", n), &n, |b, &_n| {
            b.iter(|| {
                let table = GptTable::load(&mut io, BS, COUNT).unwrap();
                std::hint::black_box(table.len())
            });
        });
    }
    group.finish();
}
