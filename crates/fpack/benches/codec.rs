use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use fpack::{Arena, Encoder, FpackError, Pool, decode, encode};

fn write_message(enc: &mut Encoder<'_>) -> Result<(), FpackError> {
    enc.skip(3);
    enc.bool(true);
    enc.int16(i16::MAX);
    enc.int64(i64::MIN);
    enc.uint32(u32::MAX);
    enc.float64(f64::MAX);
    enc.var_int(-7);
    enc.var_uint(512);
    enc.fix_string("foo", 1);
    enc.var_bytes(b"bar");
    enc.del_string("baz", "\r\n");
    enc.tail(b"tail");
    Ok(())
}

/// 两遍编码与解码（借用 / 竞技场克隆）的单条报文耗时。
fn bench_codec(c: &mut Criterion) {
    let pool = Pool::new();

    c.bench_function("encode_pooled", |b| {
        b.iter(|| {
            let frame = encode(Some(&pool), write_message).expect("编码失败");
            black_box(frame.len());
            frame.release();
        });
    });

    let frame = encode(None, write_message).expect("编码失败");
    c.bench_function("decode_borrowed", |b| {
        b.iter(|| {
            decode(black_box(&frame[..]), |dec| {
                dec.skip(3);
                black_box(dec.bool());
                black_box(dec.int16());
                black_box(dec.int64());
                black_box(dec.uint32());
                black_box(dec.float64());
                black_box(dec.var_int());
                black_box(dec.var_uint());
                black_box(dec.fix_string(1, false));
                black_box(dec.var_bytes(false));
                black_box(dec.del_string("\r\n", false));
                black_box(dec.tail(false));
                Ok::<_, FpackError>(())
            })
            .expect("解码失败");
        });
    });

    c.bench_function("decode_arena_clone", |b| {
        b.iter(|| {
            let arena = Arena::new(&pool, 1 << 10);
            decode(black_box(&frame[..]), |dec| {
                dec.use_arena(&arena);
                dec.skip(3);
                dec.bool();
                dec.int16();
                dec.int64();
                dec.uint32();
                dec.float64();
                dec.var_int();
                dec.var_uint();
                black_box(dec.fix_string(1, true));
                black_box(dec.var_bytes(true));
                black_box(dec.del_string("\r\n", true));
                black_box(dec.tail(true));
                Ok::<_, FpackError>(())
            })
            .expect("解码失败");
            arena.release();
        });
    });
}

criterion_group!(codec_benches, bench_codec);
criterion_main!(codec_benches);
