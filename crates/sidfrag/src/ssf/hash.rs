//! Stable fragment hashing.
//!
//! Hash values identify fragments across runs, machines and serialized
//! catalogs, so the platform-default randomized hasher is unusable here.
//! Rows are encoded into a canonical byte stream (explicit null tags, fixed
//! field order, little-endian values) and digested with MD5; the first 8
//! bytes of the digest, big-endian, become the 64-bit hash id.

use super::row::SsfRow;

/// Append an optional value's canonical encoding: a presence tag byte
/// followed by the little-endian value bytes when present.
fn put_opt_u16(buf: &mut Vec<u8>, v: Option<u16>) {
    match v {
        None => buf.push(0),
        Some(v) => {
            buf.push(1);
            buf.extend_from_slice(&v.to_le_bytes());
        }
    }
}

fn put_opt_u8(buf: &mut Vec<u8>, v: Option<u8>) {
    match v {
        None => buf.push(0),
        Some(v) => {
            buf.push(1);
            buf.push(v);
        }
    }
}

fn put_opt_bool(buf: &mut Vec<u8>, v: Option<bool>) {
    match v {
        None => buf.push(0),
        Some(v) => {
            buf.push(1);
            buf.push(v as u8);
        }
    }
}

/// Truncate an MD5 digest to its first 8 bytes, big-endian.
fn truncate_digest(digest: md5::Digest) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.0[..8]);
    u64::from_be_bytes(bytes)
}

/// Encode one row's non-timing fields in canonical order.
fn encode_row(buf: &mut Vec<u8>, row: &SsfRow) {
    put_opt_u16(buf, row.freq1);
    put_opt_u16(buf, row.pwduty1);
    put_opt_bool(buf, row.gate1);
    put_opt_bool(buf, row.sync1);
    put_opt_bool(buf, row.ring1);
    put_opt_bool(buf, row.test1);
    put_opt_bool(buf, row.tri1);
    put_opt_bool(buf, row.saw1);
    put_opt_bool(buf, row.pulse1);
    put_opt_bool(buf, row.noise1);
    put_opt_u8(buf, row.atk1);
    put_opt_u8(buf, row.dec1);
    put_opt_u8(buf, row.sus1);
    put_opt_u8(buf, row.rel1);
    put_opt_u8(buf, row.vol);
    put_opt_bool(buf, row.flt1);
    put_opt_bool(buf, row.fltlo);
    put_opt_bool(buf, row.fltband);
    put_opt_bool(buf, row.flthi);
    put_opt_u8(buf, row.fltres);
    put_opt_u16(buf, row.fltcoff);
    put_opt_u16(buf, row.freq3);
    put_opt_bool(buf, row.test3);
}

/// Hash over every non-timing column of the rows, in row order.
pub fn hash_noclock(rows: &[SsfRow]) -> u64 {
    let mut buf = Vec::with_capacity(rows.len() * 40);
    for row in rows {
        encode_row(&mut buf, row);
    }
    truncate_digest(md5::compute(&buf))
}

/// Hash over the `clock` column alone.
pub fn hash_clock(rows: &[SsfRow]) -> u64 {
    let mut buf = Vec::with_capacity(rows.len() * 8);
    for row in rows {
        buf.extend_from_slice(&row.clock.to_le_bytes());
    }
    truncate_digest(md5::compute(&buf))
}

/// Combined fragment id: `hash(hashid_clock, hashid_noclock)`.
pub fn combine(hashid_clock: u64, hashid_noclock: u64) -> u64 {
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&hashid_clock.to_be_bytes());
    buf[8..].copy_from_slice(&hashid_noclock.to_be_bytes());
    truncate_digest(md5::compute(buf))
}
