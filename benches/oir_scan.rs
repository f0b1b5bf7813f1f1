use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::io::Cursor;

use micrometa::io::olympus::{scan_xml_blocks, OirScanOptions};

const FRAME: &str = r#"<?xml version="1.0" encoding="ASCII"?><lsmframe:frameProperties xmlns:lsmframe="http://www.olympus.co.jp/hpf/model/lsmframe" xmlns:commonframe="http://www.olympus.co.jp/hpf/model/commonframe" xmlns:base="http://www.olympus.co.jp/hpf/model/base"><commonframe:imageDefinition><base:width>1024</base:width><base:height>1024</base:height><base:bitCounts>12</base:bitCounts></commonframe:imageDefinition></lsmframe:frameProperties>"#;
const IMAGE: &str = r#"<?xml version="1.0" encoding="ASCII"?><lsmimage:imageProperties xmlns:lsmimage="http://www.olympus.co.jp/hpf/model/lsmimage"><commonimage:acquisition/></lsmimage:imageProperties>"#;

/// Pixel data interleaved with short printable runs, then the two XML blocks
fn synthetic_oir(pixel_bytes: usize) -> Vec<u8> {
    let mut buf: Vec<u8> = (0..pixel_bytes)
        .map(|i| if i % 97 < 40 { b'a' + (i % 26) as u8 } else { 0x80 | (i % 0x7f) as u8 })
        .collect();
    buf.push(0);
    buf.extend(FRAME.as_bytes());
    buf.push(0);
    buf.extend(IMAGE.as_bytes());
    buf.extend([0u8; 1024]);
    buf
}

fn scan(data: &[u8], options: &OirScanOptions) {
    let blocks = scan_xml_blocks(Cursor::new(data), options, "bench.oir").unwrap();
    assert_eq!(blocks.len(), 2);
}

fn oir_scanning(c: &mut Criterion) {
    let data = synthetic_oir(16 << 20);
    let default = OirScanOptions::default();
    let small_chunks = OirScanOptions {
        chunk_size: 64 << 10,
        ..Default::default()
    };
    c.bench_function("scan_16mib_default_chunks", |b| {
        b.iter(|| scan(black_box(&data), &default))
    });
    c.bench_function("scan_16mib_64kib_chunks", |b| {
        b.iter(|| scan(black_box(&data), &small_chunks))
    });
}

criterion_group!(benches, oir_scanning);
criterion_main!(benches);
