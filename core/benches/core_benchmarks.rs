use criterion::{Criterion, black_box, criterion_group, criterion_main};

use renderlab_core::codec::{decode_png, encode_png};
use renderlab_core::gltf::load_gltf;

const WIDTH: u32 = 600;
const HEIGHT: u32 = 400;

const TRIANGLE_GLTF: &str = r#"{
  "asset": { "version": "2.0" },
  "scenes": [ { "nodes": [0] } ],
  "nodes": [ { "mesh": 0 } ],
  "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0 } } ] } ],
  "buffers": [ { "byteLength": 36,
    "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA" } ],
  "bufferViews": [ { "buffer": 0, "byteLength": 36 } ],
  "accessors": [ { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
    "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] } ]
}"#;

fn frame_pixels() -> Vec<u8> {
    (0..WIDTH * HEIGHT * 4).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// PNG codec
// ---------------------------------------------------------------------------

fn bench_encode_frame(c: &mut Criterion) {
    let pixels = frame_pixels();
    c.bench_function("encode_png_600x400", |b| {
        b.iter(|| encode_png(WIDTH, HEIGHT, 4, black_box(&pixels)));
    });
}

fn bench_decode_frame(c: &mut Criterion) {
    let png = encode_png(WIDTH, HEIGHT, 4, &frame_pixels()).expect("encode");
    c.bench_function("decode_png_600x400", |b| {
        b.iter(|| decode_png(black_box(&png)));
    });
}

// ---------------------------------------------------------------------------
// glTF loading
// ---------------------------------------------------------------------------

fn bench_load_triangle(c: &mut Criterion) {
    c.bench_function("load_gltf_embedded_triangle", |b| {
        b.iter(|| load_gltf(black_box(TRIANGLE_GLTF.as_bytes())));
    });
}

criterion_group!(codec, bench_encode_frame, bench_decode_frame);
criterion_group!(loading, bench_load_triangle);
criterion_main!(codec, loading);
