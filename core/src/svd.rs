//! Truncated SVD of a sparse document matrix.
//!
//! Randomized subspace iteration: a seeded random block is pushed through
//! `X Xᵀ` a few times, re-orthonormalized after every product, and the small
//! Gram matrix of the resulting basis is diagonalized with Jacobi rotations.
//! Only the row embedding `U Σ` is returned, which is what a 2-D scatter of
//! documents needs.

use crate::lexicon::TermId;
use crate::matrix::assemble_csr;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sprs::CsMat;

const EPS: f64 = 1e-12;
const JACOBI_MAX_SWEEPS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionOptions {
    /// Extra basis vectors beyond the requested rank.
    pub oversample: usize,
    pub power_iterations: usize,
    pub seed: u64,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self { oversample: 8, power_iterations: 7, seed: 42 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// One row per matrix row, `rank` columns.
    pub coordinates: Vec<Vec<f64>>,
    pub singular_values: Vec<f64>,
}

/// Scale every row to unit Euclidean length. All-zero rows stay zero.
pub fn l2_normalize_rows(x: &CsMat<f64>) -> CsMat<f64> {
    let rows: Vec<Vec<(TermId, f64)>> = x
        .outer_iterator()
        .map(|row| {
            let norm = row.iter().map(|(_, &w)| w * w).sum::<f64>().sqrt();
            row.iter()
                .map(|(j, &w)| (j as TermId, if norm > 0.0 { w / norm } else { 0.0 }))
                .collect()
        })
        .collect();
    assemble_csr((x.rows(), x.cols()), rows)
}

/// Rank-`rank` embedding `U Σ` of `x`. Columns beyond the numerical rank of
/// `x` come back as zeros.
pub fn truncated_svd(x: &CsMat<f64>, rank: usize, options: &ProjectionOptions) -> Embedding {
    let (n, m) = (x.rows(), x.cols());
    let width = (rank + options.oversample).min(n).min(m);
    if width == 0 {
        return Embedding { coordinates: vec![vec![0.0; rank]; n], singular_values: vec![0.0; rank] };
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut basis: Vec<Vec<f64>> = (0..width).map(|_| (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()).collect();
    orthonormalize(&mut basis);
    for _ in 0..options.power_iterations {
        let mut projected: Vec<Vec<f64>> = basis.iter().map(|q| mul_transpose(x, q)).collect();
        orthonormalize(&mut projected);
        basis = projected.iter().map(|z| mul(x, z)).collect();
        orthonormalize(&mut basis);
    }

    // Gram matrix of B = Qᵀ X, i.e. C = (Xᵀ Q)ᵀ (Xᵀ Q).
    let b: Vec<Vec<f64>> = basis.iter().map(|q| mul_transpose(x, q)).collect();
    let mut gram = vec![vec![0.0; width]; width];
    for a in 0..width {
        for c in a..width {
            let v = dot(&b[a], &b[c]);
            gram[a][c] = v;
            gram[c][a] = v;
        }
    }
    let (eigenvalues, eigenvectors) = jacobi_eigen(gram);

    let mut order: Vec<usize> = (0..width).collect();
    order.sort_by(|&a, &c| eigenvalues[c].total_cmp(&eigenvalues[a]).then(a.cmp(&c)));

    let mut coordinates = vec![vec![0.0; rank]; n];
    let mut singular_values = vec![0.0; rank];
    for (k, &col) in order.iter().take(rank).enumerate() {
        let sigma = eigenvalues[col].max(0.0).sqrt();
        if sigma <= EPS {
            continue;
        }
        // u = Q w, a left singular vector of X.
        let mut u = vec![0.0; n];
        for (l, q) in basis.iter().enumerate() {
            let w = eigenvectors[l][col];
            for (ui, qi) in u.iter_mut().zip(q) {
                *ui += w * qi;
            }
        }
        flip_sign(&mut u);
        for (i, ui) in u.into_iter().enumerate() {
            coordinates[i][k] = ui * sigma;
        }
        singular_values[k] = sigma;
    }
    Embedding { coordinates, singular_values }
}

/// `X v` for `v` of length `cols`.
fn mul(x: &CsMat<f64>, v: &[f64]) -> Vec<f64> {
    x.outer_iterator().map(|row| row.iter().map(|(j, &w)| w * v[j]).sum::<f64>()).collect()
}

/// `Xᵀ u` for `u` of length `rows`.
fn mul_transpose(x: &CsMat<f64>, u: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; x.cols()];
    for (i, row) in x.outer_iterator().enumerate() {
        let ui = u[i];
        if ui == 0.0 {
            continue;
        }
        for (j, &w) in row.iter() {
            out[j] += w * ui;
        }
    }
    out
}

fn dot(a: &[f64], b: &[f64]) -> f64 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

/// Modified Gram-Schmidt. Vectors that collapse numerically are zeroed
/// instead of being normalized into noise.
fn orthonormalize(vectors: &mut [Vec<f64>]) {
    for k in 0..vectors.len() {
        let (done, rest) = vectors.split_at_mut(k);
        let v = &mut rest[0];
        for q in done.iter() {
            let proj = dot(q, v);
            for (vi, qi) in v.iter_mut().zip(q) {
                *vi -= proj * qi;
            }
        }
        let norm = v.iter().map(|vi| vi * vi).sum::<f64>().sqrt();
        if norm > EPS {
            v.iter_mut().for_each(|vi| *vi /= norm);
        } else {
            v.iter_mut().for_each(|vi| *vi = 0.0);
        }
    }
}

/// Eigen-decomposition of a small symmetric matrix by cyclic Jacobi
/// rotations. Returns eigenvalues and a matrix whose columns are the
/// matching eigenvectors.
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v: Vec<Vec<f64>> = (0..n).map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect()).collect();
    for _ in 0..JACOBI_MAX_SWEEPS {
        let off: f64 = (0..n).flat_map(|p| (0..n).filter(move |&q| q != p).map(move |q| (p, q))).map(|(p, q)| a[p][q] * a[p][q]).sum();
        if off < EPS * EPS {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q].abs() < EPS * EPS {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let akp = a[k][p];
                    let akq = a[k][q];
                    a[k][p] = c * akp - s * akq;
                    a[k][q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p][k];
                    let aqk = a[q][k];
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let vkp = row[p];
                    let vkq = row[q];
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }
    ((0..n).map(|i| a[i][i]).collect(), v)
}

/// Make the largest-magnitude component positive so repeated runs agree on
/// orientation.
fn flip_sign(u: &mut [f64]) {
    let pivot = u.iter().copied().fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        u.iter_mut().for_each(|x| *x = -*x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(rows: &[&[f64]]) -> CsMat<f64> {
        let cols = rows.first().map_or(0, |r| r.len());
        let sparse: Vec<Vec<(TermId, f64)>> = rows
            .iter()
            .map(|r| r.iter().enumerate().filter(|&(_, &w)| w != 0.0).map(|(j, &w)| (j as TermId, w)).collect())
            .collect();
        assemble_csr((rows.len(), cols), sparse)
    }

    fn distance(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
    }

    #[test]
    fn jacobi_recovers_known_spectrum() {
        let (vals, _) = jacobi_eigen(vec![vec![2.0, 1.0], vec![1.0, 2.0]]);
        let mut vals = vals;
        vals.sort_by(|a, b| a.total_cmp(b));
        assert!((vals[0] - 1.0).abs() < 1e-9);
        assert!((vals[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn normalization_keeps_zero_rows() {
        let x = l2_normalize_rows(&dense(&[&[3.0, 4.0], &[0.0, 0.0]]));
        assert!((x.get(0, 0).copied().unwrap() - 0.6).abs() < 1e-12);
        assert!(x.outer_view(1).map_or(true, |r| r.nnz() == 0));
    }

    #[test]
    fn rank_two_data_keeps_pairwise_distances() {
        let x = dense(&[&[1.0, 0.0, 0.0], &[0.0, 2.0, 0.0], &[1.0, 1.0, 0.0], &[0.5, 0.0, 0.0]]);
        let emb = truncated_svd(&x, 2, &ProjectionOptions::default());
        let original: Vec<Vec<f64>> = vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0], vec![0.5, 0.0]];
        for a in 0..4 {
            for b in 0..4 {
                let want = distance(&original[a], &original[b]);
                let got = distance(&emb.coordinates[a], &emb.coordinates[b]);
                assert!((want - got).abs() < 1e-6, "pair ({a}, {b}): {want} vs {got}");
            }
        }
        assert!(emb.singular_values[0] >= emb.singular_values[1]);
    }

    #[test]
    fn narrow_matrix_pads_with_zeros() {
        let x = dense(&[&[1.0], &[2.0]]);
        let emb = truncated_svd(&x, 2, &ProjectionOptions::default());
        assert_eq!(emb.coordinates.len(), 2);
        assert!(emb.coordinates.iter().all(|p| p[1] == 0.0));
        assert!((emb.singular_values[0] - 5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn same_seed_same_embedding() {
        let x = dense(&[&[1.0, 2.0, 0.0], &[0.0, 1.0, 3.0], &[2.0, 0.0, 1.0]]);
        let opts = ProjectionOptions::default();
        assert_eq!(truncated_svd(&x, 2, &opts), truncated_svd(&x, 2, &opts));
    }
}
