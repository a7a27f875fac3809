use btrieve_dump::extract::{extract, ExtractOptions};
use btrieve_dump::fcr::load;
use btrieve_dump::swap_words;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const PAGE: usize = 4096;
const PAGES: usize = 2048;
const RECORD: usize = 128;

/// 6.x+ image: two FCR pages, then alternating data and index pages.
fn synthetic_image() -> Vec<u8> {
    let mut buf = vec![0u8; PAGE * PAGES];
    buf[0..2].copy_from_slice(&0x4346u16.to_le_bytes());
    buf[0x08..0x0A].copy_from_slice(&(PAGE as u16).to_le_bytes());
    buf[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());
    buf[0x18..0x1A].copy_from_slice(&(RECORD as i16).to_le_bytes());

    let slots = (PAGE - 6) / RECORD;
    let mut live = 0u32;
    for page in 2..PAGES {
        if page % 2 == 1 {
            continue;
        }
        let base = page * PAGE;
        buf[base + 4..base + 6].copy_from_slice(&0x8000u16.to_le_bytes());
        for slot in 0..slots {
            let at = base + 6 + slot * RECORD;
            buf[at] = 1;
            buf[at + 2..at + RECORD].fill(slot as u8);
            live += 1;
        }
    }
    buf[0x1A..0x1E].copy_from_slice(&swap_words(live).to_le_bytes());
    buf
}

fn bench_extract(c: &mut Criterion) {
    let image = synthetic_image();
    let desc = load(&image).unwrap();

    c.bench_function("load_fcr", |b| b.iter(|| load(black_box(&image)).unwrap()));

    c.bench_function("extract_8mb_sequential", |b| {
        b.iter(|| extract(black_box(&image), &desc, &ExtractOptions::default()).unwrap())
    });

    let parallel = ExtractOptions { parallel: true, ..Default::default() };
    c.bench_function("extract_8mb_parallel", |b| {
        b.iter(|| extract(black_box(&image), &desc, &parallel).unwrap())
    });
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
