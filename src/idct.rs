//! Zig-zag ordering, the 8x8 DCT pair and level shifting.

use std::sync::OnceLock;

/// Maps each natural (row-major) coefficient index to its position in zig-zag order.
pub const UNZIGZAG: [u8; 64] = [
    0, 1, 5, 6, 14, 15, 27, 28, //
    2, 4, 7, 13, 16, 26, 29, 42, //
    3, 8, 12, 17, 25, 30, 41, 43, //
    9, 11, 18, 24, 31, 40, 44, 53, //
    10, 19, 23, 32, 39, 45, 52, 54, //
    20, 22, 33, 38, 46, 51, 55, 60, //
    21, 34, 37, 47, 50, 56, 59, 61, //
    35, 36, 48, 49, 57, 58, 62, 63, //
];

pub type Block<T> = [[T; 8]; 8];

/// Rearranges zig-zag ordered coefficients into an 8x8 matrix.
pub fn unzigzag(zz: &[i32; 64]) -> Block<f64> {
    let mut out = [[0.0; 8]; 8];
    for (i, &z) in UNZIGZAG.iter().enumerate() {
        out[i / 8][i % 8] = f64::from(zz[usize::from(z)]);
    }
    out
}

/// The DCT basis matrix: `A[u][x]` is the weight of sample `x` in frequency `u`.
fn basis() -> &'static Block<f64> {
    static BASIS: OnceLock<Block<f64>> = OnceLock::new();
    BASIS.get_or_init(|| {
        let mut a = [[0.0; 8]; 8];
        for (u, row) in a.iter_mut().enumerate() {
            for (x, v) in row.iter_mut().enumerate() {
                *v = if u == 0 {
                    1.0 / (2.0 * 2f64.sqrt())
                } else {
                    0.5 * (std::f64::consts::PI * (2 * x + 1) as f64 * u as f64 / 16.0).cos()
                };
            }
        }
        a
    })
}

/// Matrix product, with either operand optionally transposed.
fn mul(
    lhs: &Block<f64>,
    rhs: &Block<f64>,
    transpose_lhs: bool,
    transpose_rhs: bool,
) -> Block<f64> {
    let mut out = [[0.0; 8]; 8];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..8).fold(0.0, |acc, k| {
                let l = if transpose_lhs { lhs[k][i] } else { lhs[i][k] };
                let r = if transpose_rhs { rhs[j][k] } else { rhs[k][j] };
                acc + l * r
            });
        }
    }
    out
}

/// Inverse 2-D DCT of a natural-order coefficient matrix (`Aᵀ · C · A`).
pub fn idct(coefficients: &Block<f64>) -> Block<f64> {
    let a = basis();
    mul(&mul(a, coefficients, true, false), a, false, false)
}

/// Forward 2-D DCT of a block of samples (`A · X · Aᵀ`).
pub fn fdct(samples: &Block<f64>) -> Block<f64> {
    let a = basis();
    mul(&mul(a, samples, false, false), a, false, true)
}

/// Values this close to an integer are taken to be that integer before truncation.
const SNAP_EPSILON: f64 = 1e-6;

/// Maps signed IDCT output of precision `precision` to unsigned samples, truncating towards
/// zero and clamping to `0..2^precision`.
///
/// Output within 1e-6 of an integer is rounded to that integer instead of truncated.
pub fn level_shift(block: &Block<f64>, precision: u8) -> [u16; 64] {
    let s = 1i32 << (precision - 1);
    let mut out = [0; 64];
    for (o, &v) in out.iter_mut().zip(block.iter().flatten()) {
        let r = v.round();
        let v = (if (v - r).abs() < SNAP_EPSILON { r } else { v.trunc() }) as i32;
        *o = if v <= -s {
            0
        } else if v >= s {
            (2 * s - 1) as u16
        } else {
            (v + s) as u16
        };
    }
    out
}
