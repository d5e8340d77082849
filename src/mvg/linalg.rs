// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! Linear-algebra capability used by the rest of [`crate::mvg`].
//!
//! `cgmath` supplies everything needed for fixed 3×3/4×4 work (multiply,
//! transpose, invert). DLT systems are rectangular (2n×4 for triangulation,
//! 2n×12 for resection) and need a null space, which cgmath has no concept
//! of; [`DMatrix`] plus a cyclic Jacobi eigensolver over the normal-equations
//! matrix `AᵀA` fills that gap without pulling in a general SVD dependency.

use cgmath::{InnerSpace, Matrix3, SquareMatrix, Vector3};

/// A finite 3×4 projection matrix, row-major.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat3x4(pub [[f64; 4]; 3]);

impl Mat3x4 {
    pub fn from_rows(rows: [[f64; 4]; 3]) -> Self {
        Self(rows)
    }

    /// Assembles `P = K·[R|T]`.
    pub fn from_krt(k: Matrix3<f64>, r: Matrix3<f64>, t: Vector3<f64>) -> Self {
        // cgmath matrices are column-major; index as k[col][row].
        let mut rt = [[0.0_f64; 4]; 3];
        for row in 0..3 {
            for col in 0..3 {
                rt[row][col] = r[col][row];
            }
            rt[row][3] = t[row];
        }
        let mut p = [[0.0_f64; 4]; 3];
        for row in 0..3 {
            for col in 0..4 {
                let mut acc = 0.0;
                for mid in 0..3 {
                    acc += k[mid][row] * rt[mid][col];
                }
                p[row][col] = acc;
            }
        }
        Self(p)
    }

    /// Projects a homogeneous world point and returns the de-homogenised
    /// pixel coordinates, or `None` if the point is behind the camera plane
    /// (w-component of the projection is ~0).
    pub fn project(&self, x: f64, y: f64, z: f64) -> Option<(f64, f64)> {
        let row = |r: usize| self.0[r][0] * x + self.0[r][1] * y + self.0[r][2] * z + self.0[r][3];
        let w = row(2);
        if w.abs() < 1e-12 {
            return None;
        }
        Some((row(0) / w, row(1) / w))
    }

    /// The leading 3×3 submatrix (the part that determines finiteness).
    pub fn leading_3x3(&self) -> Matrix3<f64> {
        // column-major constructor: Matrix3::new(c0r0,c0r1,c0r2, c1r0,..)
        Matrix3::new(
            self.0[0][0],
            self.0[1][0],
            self.0[2][0],
            self.0[0][1],
            self.0[1][1],
            self.0[2][1],
            self.0[0][2],
            self.0[1][2],
            self.0[2][2],
        )
    }

    pub fn translation_column(&self) -> Vector3<f64> {
        Vector3::new(self.0[0][3], self.0[1][3], self.0[2][3])
    }

    /// Frobenius norm of `self - other`, used by the recomposition round-trip
    /// property (P2 in the spec).
    pub fn frobenius_distance(&self, other: &Mat3x4) -> f64 {
        let mut acc = 0.0;
        for r in 0..3 {
            for c in 0..4 {
                let d = self.0[r][c] - other.0[r][c];
                acc += d * d;
            }
        }
        acc.sqrt()
    }
}

/// Dense row-major matrix of runtime size, used only for the rectangular DLT
/// systems; everything fixed-size stays in `cgmath` types.
#[derive(Clone, Debug)]
pub struct DMatrix {
    pub rows: usize,
    pub cols: usize,
    data: Vec<f64>,
}

impl DMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        self.data[r * self.cols + c] = v;
    }

    pub fn transpose(&self) -> DMatrix {
        let mut out = DMatrix::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.set(c, r, self.get(r, c));
            }
        }
        out
    }

    pub fn matmul(&self, other: &DMatrix) -> DMatrix {
        assert_eq!(self.cols, other.rows, "matmul: inner dimensions must match");
        let mut out = DMatrix::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for c in 0..other.cols {
                let mut acc = 0.0;
                for k in 0..self.cols {
                    acc += self.get(r, k) * other.get(k, c);
                }
                out.set(r, c, acc);
            }
        }
        out
    }

    /// `A^T A`, a symmetric positive-semidefinite matrix of size `cols x cols`.
    pub fn gram(&self) -> DMatrix {
        self.transpose().matmul(self)
    }
}

/// Eigenvalues (ascending) and corresponding eigenvectors (columns of the
/// returned matrix) of a symmetric matrix, via the classic cyclic Jacobi
/// rotation algorithm. Converges for the small (4×4 to 12×12) matrices MVG
/// ever builds; not intended for large or ill-conditioned inputs.
pub fn symmetric_eigen(a: &DMatrix, max_sweeps: usize) -> (Vec<f64>, DMatrix) {
    assert_eq!(a.rows, a.cols, "symmetric_eigen requires a square matrix");
    let n = a.rows;
    let mut mat = a.clone();
    let mut v = DMatrix::zeros(n, n);
    for i in 0..n {
        v.set(i, i, 1.0);
    }

    for _sweep in 0..max_sweeps {
        // Off-diagonal magnitude; stop once effectively diagonal.
        let mut off = 0.0_f64;
        for p in 0..n {
            for q in (p + 1)..n {
                off += mat.get(p, q) * mat.get(p, q);
            }
        }
        if off.sqrt() < 1e-12 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = mat.get(p, q);
                if apq.abs() < 1e-300 {
                    continue;
                }
                let app = mat.get(p, p);
                let aqq = mat.get(q, q);
                let phi = 0.5 * (2.0 * apq).atan2(aqq - app);
                let (s, c) = phi.sin_cos();

                for k in 0..n {
                    let akp = mat.get(k, p);
                    let akq = mat.get(k, q);
                    mat.set(k, p, c * akp - s * akq);
                    mat.set(k, q, s * akp + c * akq);
                }
                for k in 0..n {
                    let apk = mat.get(p, k);
                    let aqk = mat.get(q, k);
                    mat.set(p, k, c * apk - s * aqk);
                    mat.set(q, k, s * apk + c * aqk);
                }
                for k in 0..n {
                    let vkp = v.get(k, p);
                    let vkq = v.get(k, q);
                    v.set(k, p, c * vkp - s * vkq);
                    v.set(k, q, s * vkp + c * vkq);
                }
            }
        }
    }

    let eigenvalues: Vec<f64> = (0..n).map(|i| mat.get(i, i)).collect();
    (eigenvalues, v)
}

/// Returns the unit-norm null-space vector of `a` (the right singular vector
/// for the smallest singular value), found as the eigenvector of `AᵀA`
/// belonging to its smallest eigenvalue. `a` must have at least as many rows
/// as columns minus one for the result to be meaningful (DLT systems always
/// do).
pub fn null_space_vector(a: &DMatrix) -> Vec<f64> {
    let gram = a.gram();
    let (eigenvalues, eigenvectors) = symmetric_eigen(&gram, 100);
    let mut best = 0;
    for i in 1..eigenvalues.len() {
        if eigenvalues[i] < eigenvalues[best] {
            best = i;
        }
    }
    let n = eigenvectors.rows;
    let mut vec: Vec<f64> = (0..n).map(|r| eigenvectors.get(r, best)).collect();
    normalize_in_place(&mut vec);
    vec
}

pub fn normalize_in_place(v: &mut [f64]) {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-300 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// RQ decomposition of a 3×3 matrix `m = R·Q` with `R` upper-triangular and
/// `Q` orthogonal, computed via Givens rotations that zero the lower-left
/// entries one at a time (the standard computer-vision trick for turning a
/// camera calibration's leading 3×3 into `K` and `R`).
pub fn rq3(m: Matrix3<f64>) -> (Matrix3<f64>, Matrix3<f64>) {
    // Work in row-major form for clarity; cgmath is column-major so index as m[c][r].
    let mut r = [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ];
    let mut q = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    // Zero r[2][0] using rotation in the (x, z) plane (Qx).
    {
        let (a, b) = (r[2][1], r[2][2]);
        let d = (a * a + b * b).sqrt().max(1e-300);
        let (c_, s_) = (b / d, -a / d);
        givens_right_rows(&mut r, 1, 2, c_, s_);
        givens_left_cols(&mut q, 1, 2, c_, s_);
    }
    // Zero r[2][0] using rotation in the (x, y) plane (Qy). Note r[2][0] might
    // have been perturbed; recompute from current r.
    {
        let (a, b) = (r[2][0], r[2][2]);
        let d = (a * a + b * b).sqrt().max(1e-300);
        let (c_, s_) = (b / d, a / d);
        givens_right_rows(&mut r, 0, 2, c_, s_);
        givens_left_cols(&mut q, 0, 2, c_, s_);
    }
    // Zero r[1][0] using rotation in the (x, y) plane (Qz).
    {
        let (a, b) = (r[1][0], r[1][1]);
        let d = (a * a + b * b).sqrt().max(1e-300);
        let (c_, s_) = (b / d, -a / d);
        givens_right_rows(&mut r, 0, 1, c_, s_);
        givens_left_cols(&mut q, 0, 1, c_, s_);
    }

    let r_mat = Matrix3::new(
        r[0][0], r[1][0], r[2][0], r[0][1], r[1][1], r[2][1], r[0][2], r[1][2], r[2][2],
    );
    let q_mat = Matrix3::new(
        q[0][0], q[1][0], q[2][0], q[0][1], q[1][1], q[2][1], q[0][2], q[1][2], q[2][2],
    );

    // Force positive diagonal on R, folding the sign flip into Q so R*Q is unchanged.
    let mut sign = Matrix3::<f64>::identity();
    for i in 0..3 {
        if r_mat[i][i] < 0.0 {
            sign[i][i] = -1.0;
        }
    }
    (r_mat * sign, sign * q_mat)
}

/// Rotate rows `i` and `j` of a row-major 3×3 in place, in the sense of
/// right-multiplying by a Givens rotation acting on columns `i, j`.
fn givens_right_rows(r: &mut [[f64; 3]; 3], i: usize, j: usize, c: f64, s: f64) {
    for row in r.iter_mut() {
        let a = row[i];
        let b = row[j];
        row[i] = c * a - s * b;
        row[j] = s * a + c * b;
    }
}

/// Left-multiply a row-major 3×3 by a Givens rotation acting on rows `i, j`.
fn givens_left_cols(q: &mut [[f64; 3]; 3], i: usize, j: usize, c: f64, s: f64) {
    for col in 0..3 {
        let a = q[i][col];
        let b = q[j][col];
        q[i][col] = c * a - s * b;
        q[j][col] = s * a + c * b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_space_of_rank_deficient_system() {
        // A has rank 3 in 4 unknowns: null space is the x=y=z=w=1 direction
        // scaled, i.e. rows are all multiples of [1,1,1,-3].
        let rows = [[1.0, 1.0, 1.0, -3.0], [2.0, 2.0, 2.0, -6.0], [0.5, 0.5, 0.5, -1.5]];
        let mut a = DMatrix::zeros(3, 4);
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                a.set(r, c, *v);
            }
        }
        let n = null_space_vector(&a);
        // direction (1,1,1,1)/2 up to sign
        let expect = [0.5, 0.5, 0.5, 0.5];
        let same_sign_err: f64 = n.iter().zip(expect.iter()).map(|(a, b)| (a - b).powi(2)).sum();
        let flip_sign_err: f64 = n.iter().zip(expect.iter()).map(|(a, b)| (a + b).powi(2)).sum();
        assert!(same_sign_err.min(flip_sign_err) < 1e-8, "n={:?}", n);
    }

    #[test]
    fn rq3_recomposes_and_is_orthogonal() {
        let m = Matrix3::new(800.0, 0.3, 320.0, 0.0, 790.0, 240.0, 0.0, 0.0, 1.0);
        let (r, q) = rq3(m);
        let recomposed = r * q;
        for c in 0..3 {
            for row in 0..3 {
                assert!((recomposed[c][row] - m[c][row]).abs() < 1e-6);
            }
        }
        // Q should be orthogonal: Q * Q^T = I
        let qqt = q * q.transpose();
        let identity = Matrix3::<f64>::identity();
        for c in 0..3 {
            for row in 0..3 {
                assert!((qqt[c][row] - identity[c][row]).abs() < 1e-6);
            }
        }
        for i in 0..3 {
            assert!(r[i][i] >= 0.0);
        }
    }

    #[test]
    fn krt_roundtrips_through_leading_3x3_and_translation() {
        let k = Matrix3::new(1000.0, 0.0, 0.0, 0.0, 1000.0, 0.0, 320.0, 240.0, 1.0);
        let r = Matrix3::identity();
        let t = Vector3::new(1.0, 2.0, 3.0);
        let p = Mat3x4::from_krt(k, r, t);
        let (_, _) = rq3(p.leading_3x3());
        assert_eq!(p.translation_column(), k * t);
    }
}
