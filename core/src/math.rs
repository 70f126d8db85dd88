//! Math type aliases and helper functions.
//!
//! Rendering math is always f32. Projections follow the left-handed,
//! depth [0, 1] convention used by the renderer.

pub use nalgebra;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32).
pub type Vec4 = nalgebra::Vector4<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

/// Build a left-handed perspective projection with depth range [0, 1].
pub fn perspective_lh(yfov: f32, aspect: f32, znear: f32, zfar: f32) -> Mat4 {
    let f = 1.0 / (yfov / 2.0).tan();
    let range = zfar / (zfar - znear);
    #[rustfmt::skip]
    let result = Mat4::new(
        f / aspect, 0.0, 0.0,   0.0,
        0.0,        f,   0.0,   0.0,
        0.0,        0.0, range, -znear * range,
        0.0,        0.0, 1.0,   0.0,
    );
    result
}

/// Left-handed look-at view matrix.
pub fn look_at_lh(eye: &Vec3, target: &Vec3, up: &Vec3) -> Mat4 {
    let eye_point = nalgebra::Point3::from(*eye);
    let target_point = nalgebra::Point3::from(*target);
    nalgebra::Isometry3::look_at_lh(&eye_point, &target_point, up).to_homogeneous()
}

/// Build a matrix from 16 column-major floats.
pub fn mat4_from_cols_slice(cols: &[f32; 16]) -> Mat4 {
    Mat4::from_column_slice(cols)
}

/// Convert a 4x4 matrix to a column-major `[[f32; 4]; 4]` array.
pub fn mat4_to_cols_array_2d(m: &Mat4) -> [[f32; 4]; 4] {
    let s = m.as_slice();
    [
        [s[0], s[1], s[2], s[3]],
        [s[4], s[5], s[6], s[7]],
        [s[8], s[9], s[10], s[11]],
        [s[12], s[13], s[14], s[15]],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(m: &Mat4, p: Vec3) -> Vec3 {
        let v = m * Vec4::new(p.x, p.y, p.z, 1.0);
        Vec3::new(v.x / v.w, v.y / v.w, v.z / v.w)
    }

    #[test]
    fn test_perspective_depth_range() {
        let proj = perspective_lh(std::f32::consts::FRAC_PI_4, 1.5, 0.1, 100.0);
        assert!(project(&proj, Vec3::new(0.0, 0.0, 0.1)).z.abs() < 1e-5);
        assert!((project(&proj, Vec3::new(0.0, 0.0, 100.0)).z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_look_at_puts_target_in_front() {
        let view = look_at_lh(&Vec3::new(0.0, 0.0, -5.0), &Vec3::zeros(), &Vec3::y());
        let target = view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((target.z - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_column_major_round_trip() {
        let mut cols = [0.0f32; 16];
        for (i, c) in cols.iter_mut().enumerate() {
            *c = i as f32;
        }
        let m = mat4_from_cols_slice(&cols);
        assert_eq!(m[(0, 3)], 12.0);
        assert_eq!(mat4_to_cols_array_2d(&m)[3], [12.0, 13.0, 14.0, 15.0]);
    }
}
