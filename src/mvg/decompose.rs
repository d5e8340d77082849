// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

//! §4.2.3 Decomposition of a finite projection matrix into intrinsics,
//! rotation and translation.

use cgmath::{Matrix, Matrix3, SquareMatrix, Vector3};

use crate::mvg::error::MvgError;
use crate::mvg::linalg::{rq3, Mat3x4};

/// A camera's intrinsic/extrinsic decomposition, `P = K·[R|T]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposition {
    /// Upper-triangular calibration matrix with `K[2][2] == 1`.
    pub k: Matrix3<f64>,
    /// Proper rotation (`det(R) == 1`) from world to camera axes.
    pub r: Matrix3<f64>,
    /// Camera-space translation.
    pub t: Vector3<f64>,
}

/// Splits `p`'s leading 3×3 into `K·R` via RQ decomposition, then recovers
/// `T` from the translation column. Fails only if the leading 3×3 is
/// singular (a degenerate, non-finite camera).
///
/// Used both by resection (to report human-readable intrinsics/extrinsics)
/// and by the recomposition round-trip property (P2): re-assembling
/// `Mat3x4::from_krt(k, r, t)` from the returned fields must reproduce `p` up
/// to the overall homogeneous scale RQ's `K[2][2] == 1` normalisation fixes.
pub fn decompose(p: &Mat3x4) -> Result<Decomposition, MvgError> {
    let m3 = p.leading_3x3();
    let (mut k0, mut r) = rq3(m3);

    // rq3 already forces a positive diagonal on k0; that alone does not
    // guarantee R is a proper rotation. Flipping K's last column together
    // with R's last row leaves K0*R unchanged (the two negations cancel in
    // the dot product) but flips det(R)'s sign.
    if r.determinant() < 0.0 {
        for row in 0..3 {
            k0[2][row] = -k0[2][row];
        }
        for col in 0..3 {
            r[col][2] = -r[col][2];
        }
    }

    let k0_inv = k0.invert().ok_or(MvgError::DegenerateInput)?;
    let t = k0_inv * p.translation_column();

    let scale = 1.0 / k0[2][2];
    let k = k0 * scale;

    Ok(Decomposition { k, r, t })
}

/// Extracts `(roll, pitch, yaw)` Tait-Bryan angles, in radians, from a
/// proper rotation matrix under the `R = Rz(yaw)·Ry(pitch)·Rx(roll)`
/// convention. Used only to give a shot's calibration a human-readable pose;
/// nothing downstream recomputes `R` from these angles except
/// [`rotation_from_euler_xyz`]'s round-trip test.
///
/// Near the gimbal lock singularity (`pitch` at ±90°, where roll and yaw
/// become degenerate) `roll` is pinned to zero and the remaining degree of
/// freedom is folded into `yaw`.
pub fn euler_xyz(r: Matrix3<f64>) -> (f64, f64, f64) {
    let sin_pitch = (-r[0][2]).clamp(-1.0, 1.0);
    let pitch = sin_pitch.asin();

    if (1.0 - sin_pitch.abs()) < 1e-9 {
        let yaw = (-r[1][0]).atan2(r[1][1]);
        return (0.0, pitch, yaw);
    }

    let roll = r[1][2].atan2(r[2][2]);
    let yaw = r[0][1].atan2(r[0][0]);
    (roll, pitch, yaw)
}

/// Inverse of [`euler_xyz`]: rebuilds `R = Rz(yaw)·Ry(pitch)·Rx(roll)`.
pub fn rotation_from_euler_xyz(roll: f64, pitch: f64, yaw: f64) -> Matrix3<f64> {
    let (sx, cx) = roll.sin_cos();
    let (sy, cy) = pitch.sin_cos();
    let (sz, cz) = yaw.sin_cos();
    Matrix3::new(
        cy * cz,
        cy * sz,
        -sy,
        sx * sy * cz - cx * sz,
        sx * sy * sz + cx * cz,
        sx * cy,
        cx * sy * cz + sx * sz,
        cx * sy * sz - sx * cz,
        cx * cy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose_recomposes_a_synthetic_camera() {
        let k = Matrix3::new(1200.0, 0.0, 0.0, 0.0, 1150.0, 0.0, 300.0, 220.0, 1.0);
        let r = Matrix3::new(0.0, 0.0, 1.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0); // 90deg about Y
        let t = Vector3::new(0.2, -0.1, 3.0);
        let p = Mat3x4::from_krt(k, r, t);

        let d = decompose(&p).unwrap();
        let recomposed = Mat3x4::from_krt(d.k, d.r, d.t);
        assert!(p.frobenius_distance(&recomposed) < 1e-6, "{:?}", recomposed);
        assert!((d.k[2][2] - 1.0).abs() < 1e-9);

        let identity = Matrix3::<f64>::identity();
        let rrt = d.r * d.r.transpose();
        for c in 0..3 {
            for row in 0..3 {
                assert!((rrt[c][row] - identity[c][row]).abs() < 1e-6);
            }
        }
    }
}
