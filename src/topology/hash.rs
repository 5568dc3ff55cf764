//! Key hash functions
//!
//! Client and server must agree on these bit for bit, so each hash
//! function version maps to exactly one algorithm.

/// Seed used for MurmurHash3 key hashing
const MURMUR3_SEED: u32 = 9001;

/// Seed used for MurmurHash2 key hashing (-1 as a Java int)
const MURMUR2_SEED: u32 = 0xffff_ffff;

/// Hash algorithm selected by a topology's hash function version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashFunction {
    Murmur2,
    Murmur3,
}

impl HashFunction {
    /// Raw 32-bit hash of `key`
    pub fn hash(self, key: &[u8]) -> u32 {
        match self {
            HashFunction::Murmur2 => murmur2(key, MURMUR2_SEED),
            HashFunction::Murmur3 => (murmur3_x64_128(key, MURMUR3_SEED).0 >> 32) as u32,
        }
    }

    /// Hash with the sign bit cleared, as used for segment and ring lookup
    pub fn normalized_hash(self, key: &[u8]) -> u32 {
        self.hash(key) & 0x7fff_ffff
    }
}

/// MurmurHash2, 32-bit
pub fn murmur2(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0x5bd1e995;
    const R: u32 = 24;

    let len = data.len();
    let mut h: u32 = seed ^ (len as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// MurmurHash3 x64_128 as hashed by the server; returns `(h1, h2)`
///
/// Differs from the reference MurmurHash3: the state starts from fixed
/// constants xor the seed, the multipliers evolve after every block mix,
/// tail bytes are sign-extended and only `h2` absorbs the length.
pub fn murmur3_x64_128(data: &[u8], seed: u32) -> (u64, u64) {
    // Seed is sign-extended like a Java int
    let seed = seed as i32 as i64 as u64;
    let mut state = Murmur3State {
        h1: 0x9368_e53c_2f6a_f274 ^ seed,
        h2: 0x586d_cd20_8f7c_d3fd ^ seed,
        c1: 0x87c3_7b91_1142_53d5,
        c2: 0x4cf5_ad43_2745_937f,
    };

    let mut blocks = data.chunks_exact(16);
    for block in &mut blocks {
        state.mix(read_u64_le(&block[0..8]), read_u64_le(&block[8..16]));
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let mut k1: u64 = 0;
        let mut k2: u64 = 0;
        for (i, byte) in tail.iter().enumerate() {
            let widened = *byte as i8 as i64 as u64;
            if i < 8 {
                k1 ^= widened << (8 * i);
            } else {
                k2 ^= widened << (8 * (i - 8));
            }
        }
        state.mix(k1, k2);
    }

    let Murmur3State { mut h1, mut h2, .. } = state;
    h2 ^= data.len() as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

struct Murmur3State {
    h1: u64,
    h2: u64,
    c1: u64,
    c2: u64,
}

impl Murmur3State {
    fn mix(&mut self, k1: u64, k2: u64) {
        let k1 = k1.wrapping_mul(self.c1).rotate_left(23).wrapping_mul(self.c2);
        self.h1 ^= k1;
        self.h1 = self.h1.wrapping_add(self.h2);

        self.h2 = self.h2.rotate_left(41);

        let k2 = k2.wrapping_mul(self.c2).rotate_left(23).wrapping_mul(self.c1);
        self.h2 ^= k2;
        self.h2 = self.h2.wrapping_add(self.h1);

        self.h1 = self.h1.wrapping_mul(3).wrapping_add(0x52dc_e729);
        self.h2 = self.h2.wrapping_mul(3).wrapping_add(0x3849_5ab5);

        self.c1 = self.c1.wrapping_mul(5).wrapping_add(0x7b7d_159c);
        self.c2 = self.c2.wrapping_mul(5).wrapping_add(0x6bce_6396);
    }
}

fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}
