use std::f32::consts::TAU;
use glam::{Mat4, Vec3, Vec4};

/// Pitch is kept short of straight up or down
pub const PITCH_LIMIT: f32 = 1.5;

/// Translation, Euler rotation in radians applied Y then X then Z, and per-axis scale.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Columns of the rotation Ry * Rx * Rz, built directly from the angles.
    fn rotation_columns(&self) -> [Vec3; 3] {
        let (s1, c1) = self.rotation.y.sin_cos();
        let (s2, c2) = self.rotation.x.sin_cos();
        let (s3, c3) = self.rotation.z.sin_cos();
        [
            Vec3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1),
            Vec3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3),
            Vec3::new(c2 * s1, -s2, c1 * c2),
        ]
    }

    /// translate * Ry * Rx * Rz * scale
    pub fn mesh_matrix(&self) -> Mat4 {
        let [x, y, z] = self.rotation_columns();
        Mat4::from_cols(
            (x * self.scale.x).extend(0.0),
            (y * self.scale.y).extend(0.0),
            (z * self.scale.z).extend(0.0),
            self.translation.extend(1.0),
        )
    }

    /// Rotation with inverse scale, for transforming normals. Degenerate for a zero scale component.
    pub fn normal_matrix(&self) -> Mat4 {
        let [x, y, z] = self.rotation_columns();
        let inv_scale = self.scale.recip();
        Mat4::from_cols(
            (x * inv_scale.x).extend(0.0),
            (y * inv_scale.y).extend(0.0),
            (z * inv_scale.z).extend(0.0),
            Vec4::W,
        )
    }

    /// Facing direction on the ground plane, ignoring pitch.
    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.rotation.y.sin_cos();
        Vec3::new(sin_yaw, 0.0, cos_yaw)
    }

    pub fn right(&self) -> Vec3 {
        let forward = self.forward();
        Vec3::new(forward.z, 0.0, -forward.x)
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.forward())
    }

    pub fn translate_by(&mut self, delta: Vec3) {
        self.translation += delta;
    }

    pub fn rotate_by(&mut self, delta: Vec3) {
        self.rotation += delta;
        self.rotation.x = self.rotation.x.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.rotation.y = self.rotation.y.rem_euclid(TAU);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::EulerRot;

    #[test]
    fn identity_transform_gives_identity_matrix() {
        let transform = Transform::default();
        assert_abs_diff_eq!(transform.mesh_matrix(), Mat4::IDENTITY, epsilon = f32::EPSILON);
        assert_abs_diff_eq!(transform.normal_matrix(), Mat4::IDENTITY, epsilon = f32::EPSILON);
    }

    #[test]
    fn translation_lands_in_last_column() {
        let transform = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let matrix = transform.mesh_matrix();
        assert_eq!(matrix.w_axis, Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_abs_diff_eq!(
            matrix,
            Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            epsilon = f32::EPSILON
        );
    }

    #[test]
    fn rotation_is_applied_y_then_x_then_z() {
        let transform = Transform {
            translation: Vec3::new(0.5, -1.0, 2.0),
            rotation: Vec3::new(0.3, -1.1, 0.7),
            scale: Vec3::new(2.0, 0.5, 1.5),
        };
        let expected = Mat4::from_scale_rotation_translation(
            transform.scale,
            glam::Quat::from_euler(EulerRot::YXZ, -1.1, 0.3, 0.7),
            transform.translation,
        );
        assert_abs_diff_eq!(transform.mesh_matrix(), expected, epsilon = 1e-5);
    }

    #[test]
    fn normal_matrix_is_inverse_transpose_of_linear_part() {
        let transform = Transform {
            translation: Vec3::new(4.0, 5.0, 6.0),
            rotation: Vec3::new(-0.4, 2.0, 0.1),
            scale: Vec3::new(3.0, 0.25, 1.0),
        };
        let linear = glam::Mat3::from_mat4(transform.mesh_matrix());
        let expected = linear.inverse().transpose();
        let normal = glam::Mat3::from_mat4(transform.normal_matrix());
        assert_abs_diff_eq!(normal, expected, epsilon = 1e-4);
    }

    #[test]
    fn directions_on_ground_plane() {
        let transform = Transform::default().with_rotation(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0));
        assert_abs_diff_eq!(transform.forward(), Vec3::X, epsilon = 1e-6);
        assert_abs_diff_eq!(transform.right(), Vec3::NEG_Z, epsilon = 1e-6);
        assert_abs_diff_eq!(Transform::default().up(), Vec3::NEG_Y, epsilon = 1e-6);
    }

    #[test]
    fn rotate_by_clamps_pitch_and_wraps_yaw() {
        let mut transform = Transform::default();
        transform.rotate_by(Vec3::new(3.0, -0.5, 0.0));
        assert_eq!(transform.rotation.x, PITCH_LIMIT);
        assert_abs_diff_eq!(transform.rotation.y, TAU - 0.5, epsilon = 1e-6);

        transform.rotate_by(Vec3::new(-5.0, 1.0, 0.0));
        assert_eq!(transform.rotation.x, -PITCH_LIMIT);
        assert_abs_diff_eq!(transform.rotation.y, 0.5, epsilon = 1e-5);
    }
}
