//! `codec_contract` 集成测试：线格式字面量与编解码驱动的错误传播契约。
//!
//! # 测试目标（Why）
//! - 线格式是跨进程契约，必须逐字节锁定；
//! - 驱动的错误优先级（回调错误 > 粘性错误 > 剩余字节）决定调用方如何区分失败原因。

use std::borrow::Cow;

use fpack::{
    Arena, ByteOrder, Decoder, Encoder, FpackError, Pool, decode, decode_plain, encode,
    encode_in_arena, encode_into, encode_plain,
};

/// 覆盖全部原语的样例报文（大端）。
const SAMPLE_HEX: &str = concat!(
    "000000",
    "0100",
    "7f",
    "7fff",
    "7fffffff",
    "7fffffffffffffff",
    "8000000000000000",
    "ff",
    "ffff",
    "ffffffff",
    "ffffffffffffffff",
    "7f7fffff",
    "7fefffffffffffff",
    "0e",
    "8004",
    "03666f6f",
    "03626172",
    "03666f6f",
    "03626172",
    "62617a",
);

fn write_sample(enc: &mut Encoder<'_>) -> Result<(), FpackError> {
    enc.skip(3);
    enc.bool(true);
    enc.bool(false);
    enc.int8(i8::MAX);
    enc.int16(i16::MAX);
    enc.int32(i32::MAX);
    enc.int64(i64::MAX);
    enc.int64(i64::MIN);
    enc.uint8(u8::MAX);
    enc.uint16(u16::MAX);
    enc.uint32(u32::MAX);
    enc.uint64(u64::MAX);
    enc.float32(f32::MAX);
    enc.float64(f64::MAX);
    enc.var_int(7);
    enc.var_uint(512);
    enc.fix_string("foo", 1);
    enc.fix_bytes(b"bar", 1);
    enc.var_string("foo");
    enc.var_bytes(b"bar");
    enc.tail(b"baz");
    Ok(())
}

#[derive(Debug, PartialEq)]
enum AppError {
    Codec(FpackError),
    Rejected,
}

impl From<FpackError> for AppError {
    fn from(err: FpackError) -> Self {
        Self::Codec(err)
    }
}

#[test]
fn sample_matches_wire_literal() {
    let expected = hex::decode(SAMPLE_HEX).expect("样例十六进制必须合法");

    let pool = Pool::new();
    let pooled = encode(Some(&pool), write_sample).expect("池化编码失败");
    assert_eq!(&pooled[..], &expected[..]);
    assert!(pooled.is_pooled());
    pooled.release();

    let heap = encode(None, write_sample).expect("系统分配编码失败");
    assert_eq!(&heap[..], &expected[..]);
    assert!(!heap.is_pooled());
}

#[test]
fn sample_decodes_symmetrically() {
    let bytes = hex::decode(SAMPLE_HEX).expect("样例十六进制必须合法");
    decode(&bytes, |dec| {
        dec.skip(3);
        assert!(dec.bool());
        assert!(!dec.bool());
        assert_eq!(dec.int8(), i8::MAX);
        assert_eq!(dec.int16(), i16::MAX);
        assert_eq!(dec.int32(), i32::MAX);
        assert_eq!(dec.int64(), i64::MAX);
        assert_eq!(dec.int64(), i64::MIN);
        assert_eq!(dec.uint8(), u8::MAX);
        assert_eq!(dec.uint16(), u16::MAX);
        assert_eq!(dec.uint32(), u32::MAX);
        assert_eq!(dec.uint64(), u64::MAX);
        assert_eq!(dec.float32().to_bits(), f32::MAX.to_bits());
        assert_eq!(dec.float64().to_bits(), f64::MAX.to_bits());
        assert_eq!(dec.var_int(), 7);
        assert_eq!(dec.var_uint(), 512);
        assert_eq!(dec.fix_string(1, false), "foo");
        assert_eq!(&*dec.fix_bytes(1, false), b"bar");
        assert_eq!(dec.var_string(true), "foo");
        assert_eq!(&*dec.var_bytes(true), b"bar");
        assert_eq!(&*dec.tail(false), b"baz");
        Ok::<_, FpackError>(())
    })
    .expect("样例解码失败");
}

/// 各宽度的极值与特殊浮点位型（NaN 载荷、无穷、负零）。
const FLOAT32_BITS: [u32; 6] = [
    f32::NAN.to_bits(),
    0x7FC0_1234,
    0xFFC0_0001,
    f32::INFINITY.to_bits(),
    f32::NEG_INFINITY.to_bits(),
    (-0.0f32).to_bits(),
];
const FLOAT64_BITS: [u64; 6] = [
    f64::NAN.to_bits(),
    0x7FF8_0000_DEAD_BEEF,
    0xFFF8_0000_0000_0001,
    f64::INFINITY.to_bits(),
    f64::NEG_INFINITY.to_bits(),
    (-0.0f64).to_bits(),
];

fn write_extremes(enc: &mut Encoder<'_>, order: ByteOrder) -> Result<(), FpackError> {
    enc.set_byte_order(order);
    enc.int8(i8::MIN);
    enc.int8(i8::MAX);
    enc.int16(i16::MIN);
    enc.int16(i16::MAX);
    enc.int32(i32::MIN);
    enc.int32(i32::MAX);
    enc.int64(i64::MIN);
    enc.int64(i64::MAX);
    enc.uint8(0);
    enc.uint8(u8::MAX);
    enc.uint16(0);
    enc.uint16(u16::MAX);
    enc.uint32(0);
    enc.uint32(u32::MAX);
    enc.uint64(0);
    enc.uint64(u64::MAX);
    for (size, min, max) in SIGNED_RANGES {
        enc.int(min, size);
        enc.int(max, size);
    }
    for (size, max) in UNSIGNED_RANGES {
        enc.uint(0, size);
        enc.uint(max, size);
    }
    for bits in FLOAT32_BITS {
        enc.float32(f32::from_bits(bits));
    }
    for bits in FLOAT64_BITS {
        enc.float64(f64::from_bits(bits));
    }
    enc.var_int(i64::MIN);
    enc.var_int(i64::MAX);
    enc.var_uint(u64::MAX);
    Ok(())
}

const SIGNED_RANGES: [(usize, i64, i64); 4] = [
    (1, i8::MIN as i64, i8::MAX as i64),
    (2, i16::MIN as i64, i16::MAX as i64),
    (4, i32::MIN as i64, i32::MAX as i64),
    (8, i64::MIN, i64::MAX),
];
const UNSIGNED_RANGES: [(usize, u64); 4] = [
    (1, u8::MAX as u64),
    (2, u16::MAX as u64),
    (4, u32::MAX as u64),
    (8, u64::MAX),
];

#[test]
fn extremes_and_float_bit_patterns_round_trip() {
    for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
        let bytes = encode(None, |enc: &mut Encoder<'_>| write_extremes(enc, order))
            .expect("极值编码失败");
        decode(&bytes, |dec| {
            dec.set_byte_order(order);
            assert_eq!(dec.int8(), i8::MIN);
            assert_eq!(dec.int8(), i8::MAX);
            assert_eq!(dec.int16(), i16::MIN);
            assert_eq!(dec.int16(), i16::MAX);
            assert_eq!(dec.int32(), i32::MIN);
            assert_eq!(dec.int32(), i32::MAX);
            assert_eq!(dec.int64(), i64::MIN);
            assert_eq!(dec.int64(), i64::MAX);
            assert_eq!(dec.uint8(), 0);
            assert_eq!(dec.uint8(), u8::MAX);
            assert_eq!(dec.uint16(), 0);
            assert_eq!(dec.uint16(), u16::MAX);
            assert_eq!(dec.uint32(), 0);
            assert_eq!(dec.uint32(), u32::MAX);
            assert_eq!(dec.uint64(), 0);
            assert_eq!(dec.uint64(), u64::MAX);
            for (size, min, max) in SIGNED_RANGES {
                assert_eq!(dec.int(size), min, "int min at width {size}");
                assert_eq!(dec.int(size), max, "int max at width {size}");
            }
            for (size, max) in UNSIGNED_RANGES {
                assert_eq!(dec.uint(size), 0, "uint zero at width {size}");
                assert_eq!(dec.uint(size), max, "uint max at width {size}");
            }
            for bits in FLOAT32_BITS {
                assert_eq!(dec.float32().to_bits(), bits);
            }
            for bits in FLOAT64_BITS {
                assert_eq!(dec.float64().to_bits(), bits);
            }
            assert_eq!(dec.var_int(), i64::MIN);
            assert_eq!(dec.var_int(), i64::MAX);
            assert_eq!(dec.var_uint(), u64::MAX);
            Ok::<_, FpackError>(())
        })
        .expect("极值解码失败");
    }
}

#[test]
fn signed_minimums_wire_literals() {
    let bytes = encode_plain(None, |enc| {
        enc.int(i64::from(i8::MIN), 1);
        enc.int(i64::from(i16::MIN), 2);
        enc.int(i64::from(i32::MIN), 4);
        enc.int(i64::MIN, 8);
        enc.var_int(i64::MIN);
    })
    .expect("编码失败");
    let expected = hex::decode(concat!(
        "80",
        "8000",
        "80000000",
        "8000000000000000",
        "ffffffffffffffffff01",
    ))
    .expect("十六进制必须合法");
    assert_eq!(&bytes[..], &expected[..]);

    let below = encode_plain(None, |enc| enc.int(i64::from(i16::MIN) - 1, 2));
    assert_eq!(below.expect_err("低于 i16 下界"), FpackError::NumberOverflow { size: 2 });
}

#[test]
fn byte_order_literals() {
    let big = encode_plain(None, |enc| enc.uint16(42)).expect("编码失败");
    assert_eq!(&big[..], b"\x00\x2a");

    let little = encode_plain(None, |enc| {
        enc.use_little_endian();
        enc.uint16(42);
    })
    .expect("编码失败");
    assert_eq!(&little[..], b"\x2a\x00");

    let negative = encode_plain(None, |enc| enc.int16(-42)).expect("编码失败");
    assert_eq!(&negative[..], b"\xff\xd6");

    let mut dec = Decoder::with_byte_order(b"\x2a\x00\x00\x2a", ByteOrder::LittleEndian);
    assert_eq!(dec.uint16(), 42);
    dec.set_byte_order(ByteOrder::BigEndian);
    assert_eq!(dec.uint16(), 42);
}

#[test]
fn byte_order_switch_leaves_varints_alone() {
    let big = encode_plain(None, |enc| enc.var_uint(300)).expect("编码失败");
    let little = encode_plain(None, |enc| {
        enc.use_little_endian();
        enc.var_uint(300);
    })
    .expect("编码失败");
    assert_eq!(&big[..], &little[..]);
    assert_eq!(&big[..], b"\xac\x02");
}

#[test]
fn narrow_int_overflow_is_rejected_before_allocation() {
    let pool = Pool::new();
    let overflow = encode_plain(Some(&pool), |enc| enc.int(128, 1));
    assert_eq!(
        overflow.expect_err("128 不能放入 1 字节"),
        FpackError::NumberOverflow { size: 1 }
    );
    assert_eq!(pool.stats().borrowed, 0);

    let fits = encode_plain(Some(&pool), |enc| enc.int(127, 1)).expect("127 可以放入 1 字节");
    assert_eq!(&fits[..], b"\x7f");
    fits.release();

    let invalid = encode_plain(Some(&pool), |enc| enc.uint(1, 3));
    assert_eq!(
        invalid.expect_err("宽度 3 非法"),
        FpackError::InvalidSize { size: 3 }
    );
}

#[test]
fn delimited_fields_round_trip() {
    let bytes = encode_plain(None, |enc| {
        enc.del_string("foo", "\x00");
        enc.del_bytes(b"bar", &[0x00]);
    })
    .expect("编码失败");
    assert_eq!(&bytes[..], b"foo\x00bar\x00");

    decode_plain(&bytes, |dec| {
        assert_eq!(dec.del_string("\x00", false), "foo");
        assert_eq!(&*dec.del_bytes(&[0x00], true), b"bar");
    })
    .expect("解码失败");

    let empty = encode_plain(None, |enc| enc.del_string("foo", ""));
    assert_eq!(empty.expect_err("空分隔符"), FpackError::EmptyDelimiter);
}

/// 载荷内的分隔符不做转义，解码在首次出现处截断。
#[test]
fn embedded_delimiter_truncates_early() {
    let bytes = encode_plain(None, |enc| enc.del_string("a,b", ",")).expect("编码失败");
    let result = decode_plain(&bytes, |dec| {
        assert_eq!(dec.del_string(",", false), "a");
    });
    assert_eq!(result, Err(FpackError::RemainingBytes));
}

#[test]
fn remaining_bytes_are_reported() {
    let input = [0x2A, 0x54];
    let short = decode_plain(&input, |dec| {
        dec.uint8();
    });
    assert_eq!(short, Err(FpackError::RemainingBytes));

    let full = decode_plain(&input, |dec| {
        assert_eq!(dec.uint8(), 0x2A);
        assert_eq!(dec.uint8(), 0x54);
    });
    assert_eq!(full, Ok(()));
}

#[test]
fn sticky_error_wins_over_remaining_bytes() {
    let result = decode_plain(&[0x01, 0x02], |dec| {
        dec.uint32();
        dec.uint8();
    });
    assert_eq!(result, Err(FpackError::BufferTooShort));
}

#[test]
fn callback_errors_short_circuit() {
    let pool = Pool::new();

    let counting = encode(Some(&pool), |_enc: &mut Encoder<'_>| Err(AppError::Rejected));
    assert_eq!(counting.expect_err("计数阶段拒绝"), AppError::Rejected);
    assert_eq!(pool.stats().borrowed, 0);

    let writing = encode(Some(&pool), |enc: &mut Encoder<'_>| {
        enc.uint64(1);
        if enc.counting() {
            Ok(())
        } else {
            Err(AppError::Rejected)
        }
    });
    assert_eq!(writing.expect_err("写入阶段拒绝"), AppError::Rejected);
    assert_eq!(pool.stats().outstanding(), 0);

    let decoded = decode(&[0xFF, 0xFF], |dec| {
        dec.uint32();
        Err(AppError::Rejected)
    });
    assert_eq!(decoded, Err(AppError::Rejected));

    let sticky = decode(&[0xFF], |dec| {
        dec.uint16();
        Ok::<_, AppError>(())
    });
    assert_eq!(sticky, Err(AppError::Codec(FpackError::BufferTooShort)));
}

#[test]
fn encode_into_checks_capacity_first() {
    let mut small = [0xAAu8; 3];
    let result = encode_into(&mut small, |enc| {
        enc.uint32(7);
        Ok::<_, FpackError>(())
    });
    assert_eq!(result, Err(FpackError::BufferTooShort));
    assert_eq!(small, [0xAA; 3], "容量不足时不得写入任何字节");

    let mut large = [0u8; 8];
    let written = encode_into(&mut large, |enc| {
        enc.uint32(7);
        Ok::<_, FpackError>(())
    })
    .expect("容量充足");
    assert_eq!(written, 4);
    assert_eq!(&large[..4], b"\x00\x00\x00\x07");
}

#[test]
fn arena_backs_encode_and_decode_clones() {
    let pool = Pool::new();
    let arena = Arena::new(&pool, 256);

    let frame = encode_in_arena(&arena, |enc| {
        enc.uint8(42);
        enc.fix_string("Hello World!", 2);
        Ok::<_, FpackError>(())
    })
    .expect("竞技场编码失败");
    assert_eq!(frame.len(), 15);

    let mut text = Cow::Borrowed("");
    decode(frame, |dec| {
        dec.use_arena(&arena);
        assert_eq!(dec.uint8(), 42);
        text = dec.fix_string(2, true);
        Ok::<_, FpackError>(())
    })
    .expect("竞技场解码失败");
    assert!(matches!(text, Cow::Borrowed(_)));
    assert_eq!(text, "Hello World!");
    assert_eq!(arena.length(), 15 + 12);
    assert_eq!(arena.chunks(), 1);

    drop(text);
    arena.release();
    assert_eq!(pool.stats().outstanding(), 0);
}

#[test]
fn plain_encode_of_single_varint() {
    let pool = Pool::new();
    let bytes = encode_plain(Some(&pool), |enc| enc.var_uint(42)).expect("编码失败");
    assert_eq!(&bytes[..], b"*");
    assert!(!bytes.is_pooled(), "单字节结果低于池化阈值");
    bytes.release();
}
