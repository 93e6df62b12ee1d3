//! Matrix engine: builds, evolves and derives keys from the Z matrix.
//!
//! Every pseudo-random choice goes through [`seeded_random`], which is
//! reseeded on each call, so the whole engine is a deterministic function
//! of the master key, the variant and the derivation counter.

use keyshare_types::config::validate_alphabet;
use keyshare_types::error::{KeyShareError, KeyShareResult};
use rand::Rng;

/// One SplitMix64 step from `seed`, reduced to `lo..=hi`.
///
/// Identical arguments always give identical results on every platform.
pub fn seeded_random(seed: u64, lo: u64, hi: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    if hi <= lo {
        return lo;
    }
    match (hi - lo).checked_add(1) {
        Some(span) => lo + z % span,
        None => z,
    }
}

/// Rotate `seq` right by `n` positions. `n` is taken modulo the length, so
/// negative and oversized shifts are fine.
pub fn rotate<T: Clone>(seq: &[T], n: i64) -> Vec<T> {
    let mut out = seq.to_vec();
    rotate_in_place(&mut out, n);
    out
}

fn rotate_in_place<T>(seq: &mut [T], n: i64) {
    if seq.is_empty() {
        return;
    }
    let shift = n.rem_euclid(seq.len() as i64) as usize;
    seq.rotate_right(shift);
}

/// How the random component of Z is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedVariant {
    /// `ZC[i][j] = random(ZA[i][j])`, `ZD[i][j] = random(ZB[i][j])`.
    Split,
    /// `ZS[i][j] = random(seed)` for every cell.
    Single(u64),
}

/// The printable range keys are mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alphabet {
    first: u32,
    cardinality: u32,
}

impl Alphabet {
    pub fn new(first_char: i64, cardinality: i64) -> KeyShareResult<Self> {
        validate_alphabet(first_char, cardinality)?;
        // validate_alphabet bounds both below 0xD800.
        Ok(Self {
            first: first_char as u32,
            cardinality: cardinality as u32,
        })
    }

    fn char_for(self, byte: u8) -> char {
        char::from_u32(u32::from(byte) % self.cardinality + self.first)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

/// A square byte matrix of side `K`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZMatrix {
    cells: Vec<Vec<u8>>,
}

impl ZMatrix {
    /// Build Z from `2K` seed bytes.
    pub fn build(seed: &[u8], size: usize, variant: SeedVariant) -> KeyShareResult<Self> {
        if size < 2 || seed.len() != 2 * size {
            return Err(KeyShareError::Config(format!(
                "matrix of size {size} needs {} seed bytes (got {})",
                2 * size,
                seed.len()
            )));
        }
        let (m1, m2) = seed.split_at(size);
        let za: Vec<Vec<u8>> = (0..size).map(|i| rotate(m1, i as i64)).collect();
        // Column j of ZB is M2 rotated by j.
        let zb_cols: Vec<Vec<u8>> = (0..size).map(|j| rotate(m2, j as i64)).collect();

        let mut cells = vec![vec![0u8; size]; size];
        for (i, row) in cells.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let a = za[i][j];
                let b = zb_cols[j][i];
                let noise = match variant {
                    SeedVariant::Split => {
                        random_byte(u64::from(a)) ^ random_byte(u64::from(b))
                    }
                    SeedVariant::Single(seed) => random_byte(seed),
                };
                *cell = a ^ b ^ noise;
            }
        }
        Ok(Self { cells })
    }

    /// Build Z from a master key of `2K` decimal digits; each digit is one
    /// seed byte.
    pub fn from_master_key(
        master_key: &str,
        size: usize,
        variant: SeedVariant,
    ) -> KeyShareResult<Self> {
        if !master_key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(KeyShareError::Config(
                "master key must contain decimal digits only".into(),
            ));
        }
        let seed: Vec<u8> = master_key.bytes().map(|b| b - b'0').collect();
        Self::build(&seed, size, variant)
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn row(&self, i: usize) -> &[u8] {
        &self.cells[i]
    }

    fn column(&self, j: usize) -> Vec<u8> {
        self.cells.iter().map(|row| row[j]).collect()
    }

    fn pick(&self, seed: u64) -> usize {
        seeded_random(seed, 0, self.size() as u64 - 1) as usize
    }

    /// Re-randomise Z in place: rotate each row right by
    /// `random(Z[i][0])`, then each column down by `random(Z[0][j])`.
    pub fn evolve(&mut self) {
        for i in 0..self.size() {
            let shift = self.pick(u64::from(self.cells[i][0]));
            rotate_in_place(&mut self.cells[i], shift as i64);
        }
        for j in 0..self.size() {
            let shift = self.pick(u64::from(self.cells[0][j]));
            let column = rotate(&self.column(j), shift as i64);
            for (row, value) in self.cells.iter_mut().zip(column) {
                row[j] = value;
            }
        }
    }

    /// Derive the key for counter `n`. Pure: Z is not modified.
    pub fn derive(&self, n: u64, alphabet: Alphabet) -> String {
        let i = self.pick(n.wrapping_add(u64::from(self.cells[0][0])));
        let j = self.pick(u64::from(self.cells[i][0]));
        let column = self.column(j);
        self.cells[i]
            .iter()
            .zip(column)
            .map(|(r, c)| alphabet.char_for(r ^ c))
            .collect()
    }
}

fn random_byte(seed: u64) -> u8 {
    seeded_random(seed, 0, 255) as u8
}

/// Random master key of `2 * size` decimal digits.
pub fn generate_master_key(size: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..2 * size)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
