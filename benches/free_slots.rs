//! Benchmark for free slot lookup on a large rack
//!
//! Target: full-rack lookup well under a scan-to-light round trip

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use shelf_dispatch::{Carrier, MemoryInventory, SlotRef, SlotTopology, StorageSlot};
use std::sync::Arc;

const SLOTS: usize = 2000;

/// One storage with every fourth slot occupied and every tenth pair combined
fn rack() -> Arc<MemoryInventory> {
    let inventory = Arc::new(MemoryInventory::new());
    for i in 0..SLOTS {
        let mut slot = StorageSlot::new("S1", format!("{:04}", i), if i % 3 == 0 { 13 } else { 7 }, 12);
        if i % 10 == 0 {
            slot.related_names.insert(format!("{:04}", i + 1));
        }
        if i % 10 == 1 {
            slot.related_names.insert(format!("{:04}", i - 1));
        }
        inventory.insert_slot(slot);
    }
    for i in (0..SLOTS).step_by(4) {
        inventory.insert_carrier(Carrier::new(format!("C{}", i), 7, 12).stored_at(SlotRef::new("S1", format!("{:04}", i))));
    }
    inventory
}

fn bench_free_slots(c: &mut Criterion) {
    let mut group = c.benchmark_group("free_slots");
    group.throughput(Throughput::Elements(SLOTS as u64));

    let topology = SlotTopology::new(rack());
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("any_size", |b| {
        b.iter(|| {
            rt.block_on(async {
                let free = topology.free_slots(black_box("S1"), 0, 0).await.unwrap();
                black_box(free.len());
            });
        });
    });

    group.bench_function("large_reels", |b| {
        b.iter(|| {
            rt.block_on(async {
                let free = topology.free_slots(black_box("S1"), black_box(13), black_box(12)).await.unwrap();
                black_box(free.len());
            });
        });
    });

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    group.throughput(Throughput::Elements(1));

    let topology = SlotTopology::new(rack());
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("resolve_code", |b| {
        let mut counter = 0usize;
        b.iter(|| {
            counter += 1;
            let code = format!("{:04}", counter % SLOTS);
            rt.block_on(async {
                let _ = topology.resolve(black_box(&code), Some("S1")).await;
            });
        });
    });

    group.finish();
}

criterion_group!(benches, bench_free_slots, bench_resolve);
criterion_main!(benches);
