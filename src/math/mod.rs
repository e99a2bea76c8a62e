//! Mathematical utilities for pipe FEM calculations

pub mod bessel;
pub mod eigen;
pub mod skyline;
pub mod sparse;

use nalgebra::{DMatrix, DVector, Matrix3, SMatrix, SVector, Vector3};
use num_complex::Complex64;

use crate::error::{FemError, FemResult};

pub use eigen::{generalized_eigen_dense, lanczos_shift_invert, EigenPairs};
pub use skyline::SkylineSolver;
pub use sparse::{extract_block, sparse_matvec, SparseMatrixBuilder};

pub type CMat = DMatrix<Complex64>;
pub type CVec = DVector<Complex64>;
pub type Mat3 = Matrix3<f64>;
pub type Vec3 = Vector3<f64>;

/// 12x12 matrix for element stiffness/mass
pub type Mat12 = SMatrix<f64, 12, 12>;
/// 12-element vector for element forces/displacements
pub type Vec12 = SVector<f64, 12>;

/// Imaginary unit
pub const J: Complex64 = Complex64 { re: 0.0, im: 1.0 };

/// Compute the 3x3 direction cosine matrix of a line element
///
/// Rows are the local x, y and z axes in global coordinates. Local x runs
/// from the first to the last node. The reference orientation is:
/// - vertical elements: y in the XY plane, z = global Z
/// - horizontal elements: y = global Y (up), z = x cross y
/// - inclined elements: z horizontal, y = z cross x
///
/// `twist` rotates y and z about the element axis (radians).
pub fn element_rotation(first: &[f64; 3], last: &[f64; 3], twist: f64) -> FemResult<Mat3> {
    let d = Vec3::new(last[0] - first[0], last[1] - first[1], last[2] - first[2]);
    let length = d.norm();

    if length < 1e-10 {
        return Err(FemError::InvalidGeometry(format!(
            "zero-length element between {:?} and {:?}",
            first, last
        )));
    }

    let x = d / length;

    let (y, z) = if x[0].abs() < 1e-10 && x[2].abs() < 1e-10 {
        if x[1] > 0.0 {
            (Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0))
        } else {
            (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0))
        }
    } else if d[1].abs() < 1e-10 {
        let y = Vec3::new(0.0, 1.0, 0.0);
        let z = x.cross(&y).normalize();
        (y, z)
    } else {
        // Projection of the axis onto the horizontal plane
        let proj = Vec3::new(d[0], 0.0, d[2]);
        let z = if x[1] > 0.0 {
            proj.cross(&x).normalize()
        } else {
            x.cross(&proj).normalize()
        };
        let y = z.cross(&x).normalize();
        (y, z)
    };

    let (y, z) = if twist.abs() > 1e-12 {
        let (sin_r, cos_r) = twist.sin_cos();
        (y * cos_r + z * sin_r, -y * sin_r + z * cos_r)
    } else {
        (y, z)
    };

    #[rustfmt::skip]
    let r = Mat3::new(
        x[0], x[1], x[2],
        y[0], y[1], y[2],
        z[0], z[1], z[2],
    );
    Ok(r)
}

/// Build the 12x12 block-diagonal transformation from a direction cosine matrix
pub fn transformation_matrix(r: &Mat3) -> Mat12 {
    let mut t = Mat12::zeros();
    for block in 0..4 {
        t.fixed_view_mut::<3, 3>(3 * block, 3 * block).copy_from(r);
    }
    t
}

/// Rigid offset between the node line and the section centroid
///
/// Maps nodal displacements to centroid displacements: u_c = u_n + θ × e with
/// e = (0, ey, ez) in the local frame. Element matrices formulated at the
/// centroid are brought back to the nodes with `Tᵀ K T`.
pub fn offset_transformation(offset_y: f64, offset_z: f64) -> Mat12 {
    let mut t = Mat12::identity();
    for node in 0..2 {
        let o = 6 * node;
        // ux += θy·ez − θz·ey
        t[(o, o + 4)] = offset_z;
        t[(o, o + 5)] = -offset_y;
        // uy −= θx·ez
        t[(o + 1, o + 3)] = -offset_z;
        // uz += θx·ey
        t[(o + 2, o + 3)] = offset_y;
    }
    t
}

/// Gauss-Legendre points and weights on [-1, 1]
pub fn gauss_legendre(n: usize) -> (&'static [f64], &'static [f64]) {
    const P1: [f64; 1] = [0.0];
    const W1: [f64; 1] = [2.0];
    const P2: [f64; 2] = [-0.577_350_269_189_625_8, 0.577_350_269_189_625_8];
    const W2: [f64; 2] = [1.0, 1.0];
    const P3: [f64; 3] = [-0.774_596_669_241_483_4, 0.0, 0.774_596_669_241_483_4];
    const W3: [f64; 3] = [0.555_555_555_555_555_6, 0.888_888_888_888_888_9, 0.555_555_555_555_555_6];

    match n {
        0 | 1 => (&P1, &W1),
        2 => (&P2, &W2),
        _ => (&P3, &W3),
    }
}

/// Geometric stiffness of a line element under axial pre-load
///
/// `n` is the axial force, positive in tension (stiffening). Only the
/// transverse and torsional terms are populated; the axial stiffness is
/// not modified by the pre-load.
pub fn geometric_stiffness(n: f64, ip_over_a: f64, length: f64) -> Mat12 {
    if n.abs() < 1e-12 {
        return Mat12::zeros();
    }

    let l = length;
    let l2 = l * l;
    let p_l = n / l;
    let t = p_l * ip_over_a;

    let mut k = Mat12::zeros();

    // Bending in the local x-y plane (v, θz)
    let xy = [1, 5, 7, 11];
    // Bending in the local x-z plane (w, θy), sign flips on rotations
    let xz = [2, 4, 8, 10];

    #[rustfmt::skip]
    let block = [
        6.0 / 5.0,  l / 10.0,        -6.0 / 5.0, l / 10.0,
        l / 10.0,   2.0 * l2 / 15.0, -l / 10.0,  -l2 / 30.0,
        -6.0 / 5.0, -l / 10.0,       6.0 / 5.0,  -l / 10.0,
        l / 10.0,   -l2 / 30.0,      -l / 10.0,  2.0 * l2 / 15.0,
    ];
    let sign = [1.0, -1.0, 1.0, -1.0];

    for a in 0..4 {
        for b in 0..4 {
            let g = p_l * block[4 * a + b];
            k[(xy[a], xy[b])] = g;
            k[(xz[a], xz[b])] = sign[a] * sign[b] * g;
        }
    }

    k[(3, 3)] = t;
    k[(9, 9)] = t;
    k[(3, 9)] = -t;
    k[(9, 3)] = -t;

    k
}

/// Solve a dense complex linear system using LU decomposition
pub fn solve_dense_complex(a: CMat, b: &CVec) -> Option<CVec> {
    a.lu().solve(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rotation_horizontal() {
        let r = element_rotation(&[0.0, 0.0, 0.0], &[10.0, 0.0, 0.0], 0.0).unwrap();
        assert_relative_eq!(r, Mat3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_vertical() {
        let r = element_rotation(&[0.0, 0.0, 0.0], &[0.0, 10.0, 0.0], 0.0).unwrap();
        assert_relative_eq!(r[(0, 1)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(r[(1, 0)], -1.0, epsilon = 1e-12);
        assert_relative_eq!(r[(2, 2)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_is_orthonormal() {
        let r = element_rotation(&[1.0, -2.0, 0.5], &[3.0, 1.0, -1.0], 0.3).unwrap();
        assert_relative_eq!(r * r.transpose(), Mat3::identity(), epsilon = 1e-12);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_length_element() {
        let err = element_rotation(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], 0.0).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_offset_transformation_moves_rotation_to_centroid() {
        let t = offset_transformation(0.1, 0.0);
        let mut u = Vec12::zeros();
        u[3] = 1.0; // twist at first node
        let uc = t * u;
        assert_relative_eq!(uc[2], 0.1, epsilon = 1e-15);
        assert_relative_eq!(uc[1], 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_gauss_integrates_cubic() {
        let (points, weights) = gauss_legendre(2);
        let integral: f64 = points
            .iter()
            .zip(weights)
            .map(|(x, w)| w * (x.powi(3) + x.powi(2)))
            .sum();
        assert_relative_eq!(integral, 2.0 / 3.0, epsilon = 1e-14);
    }

    #[test]
    fn test_geometric_stiffness_symmetry() {
        let kg = geometric_stiffness(1.0e4, 1.0e-3, 0.5);
        assert_relative_eq!(kg, kg.transpose(), epsilon = 1e-12);
        assert_eq!(kg[(0, 0)], 0.0);
    }
}
