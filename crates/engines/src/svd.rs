//! Truncated SVD via seeded randomized subspace iteration.
//!
//! Factorizes a dense row-major matrix `A (m x n)` into rank-k user and
//! item factors such that `A ~= U * V^T` with `U = Q (m x k)` an
//! orthonormal basis of the dominant column space and `V = A^T Q (n x k)`.
//! A fixed seed and iteration count keep the factorization deterministic,
//! which in turn keeps every downstream ranking deterministic.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of power iterations. Three is enough to separate the dominant
/// subspace for the rating matrices this engine sees.
const POWER_ITERATIONS: usize = 3;

/// Rank-k factors of a matrix: `(user_factors m*k, item_factors n*k)`,
/// both row-major.
pub type Factors = (Vec<f32>, Vec<f32>);

/// Compute rank-k factors of `a` (row-major, `m x n`).
///
/// `k` is clamped to `min(m, n)`. Degenerate inputs (empty matrix, rank
/// deficiency) produce zero columns rather than panicking.
pub fn truncated_factors(a: &[f32], m: usize, n: usize, k: usize, seed: u64) -> Factors {
    let k = k.min(m).min(n);
    if k == 0 || a.is_empty() {
        return (Vec::new(), Vec::new());
    }

    // Random test matrix Omega (n x k), seeded for determinism.
    let mut rng = StdRng::seed_from_u64(seed);
    let mut omega = vec![0.0f32; n * k];
    for value in omega.iter_mut() {
        *value = rng.random_range(-1.0..1.0);
    }

    // Y = A * Omega, orthonormalized into the sketch Q (m x k).
    let mut q = matmul(a, m, n, &omega, k);
    orthonormalize_columns(&mut q, m, k);

    // Power iterations sharpen the subspace estimate.
    for _ in 0..POWER_ITERATIONS {
        let mut z = matmul_at(a, m, n, &q, k);
        orthonormalize_columns(&mut z, n, k);
        q = matmul(a, m, n, &z, k);
        orthonormalize_columns(&mut q, m, k);
    }

    // Item factors V = A^T Q, so predictions are plain row dot products.
    let v = matmul_at(a, m, n, &q, k);
    (q, v)
}

/// Dot product of row `row` of a `(rows x k)` factor matrix with row
/// `other_row` of another `(other_rows x k)` factor matrix.
pub fn factor_dot(u: &[f32], row: usize, v: &[f32], other_row: usize, k: usize) -> f32 {
    let a = &u[row * k..(row + 1) * k];
    let b = &v[other_row * k..(other_row + 1) * k];
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `C = A (m x n) * B (n x k)`, all row-major.
fn matmul(a: &[f32], m: usize, n: usize, b: &[f32], k: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * k];
    for i in 0..m {
        let a_row = &a[i * n..(i + 1) * n];
        let c_row = &mut c[i * k..(i + 1) * k];
        for (j, &a_ij) in a_row.iter().enumerate() {
            if a_ij == 0.0 {
                continue;
            }
            let b_row = &b[j * k..(j + 1) * k];
            for (c_val, &b_val) in c_row.iter_mut().zip(b_row) {
                *c_val += a_ij * b_val;
            }
        }
    }
    c
}

/// `C = A^T (n x m) * B (m x k)`, with `a` stored as `(m x n)` row-major.
fn matmul_at(a: &[f32], m: usize, n: usize, b: &[f32], k: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; n * k];
    for i in 0..m {
        let a_row = &a[i * n..(i + 1) * n];
        let b_row = &b[i * k..(i + 1) * k];
        for (j, &a_ij) in a_row.iter().enumerate() {
            if a_ij == 0.0 {
                continue;
            }
            let c_row = &mut c[j * k..(j + 1) * k];
            for (c_val, &b_val) in c_row.iter_mut().zip(b_row) {
                *c_val += a_ij * b_val;
            }
        }
    }
    c
}

/// Modified Gram-Schmidt over the columns of a row-major `(rows x k)`
/// matrix. Rank-deficient columns collapse to zero.
fn orthonormalize_columns(mat: &mut [f32], rows: usize, k: usize) {
    for col in 0..k {
        // Remove projections onto previous columns.
        for prev in 0..col {
            let mut dot = 0.0f32;
            for r in 0..rows {
                dot += mat[r * k + col] * mat[r * k + prev];
            }
            for r in 0..rows {
                mat[r * k + col] -= dot * mat[r * k + prev];
            }
        }
        // Normalize.
        let mut norm = 0.0f32;
        for r in 0..rows {
            norm += mat[r * k + col] * mat[r * k + col];
        }
        let norm = norm.sqrt();
        if norm > 1e-8 {
            for r in 0..rows {
                mat[r * k + col] /= norm;
            }
        } else {
            for r in 0..rows {
                mat[r * k + col] = 0.0;
            }
        }
    }
}
