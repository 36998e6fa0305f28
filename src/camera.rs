use glam::{EulerRot, Mat3, Vec3};

/// Where the camera is and how it is turned.
///
/// `rotation` holds Euler angles in radians: pitch around X, yaw around Y and
/// roll around Z, applied as `Ry · Rx · Rz`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub rotation: Vec3,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::new(-278.0, 273.0, 800.0),
            rotation: Vec3::ZERO,
        }
    }
}

impl CameraPose {
    pub fn new(position: Vec3, rotation: Vec3) -> Self {
        Self { position, rotation }
    }

    /// Orientation matrix (camera space to world space).
    pub fn rotation_matrix(&self) -> Mat3 {
        Mat3::from_euler(
            EulerRot::YXZ,
            self.rotation.y,
            self.rotation.x,
            self.rotation.z,
        )
    }

    /// World space to camera space; the transpose of [`rotation_matrix`](Self::rotation_matrix).
    pub fn inverse_rotation_matrix(&self) -> Mat3 {
        self.rotation_matrix().transpose()
    }
}

/// Supplies the camera pose for a point in time.
pub trait PoseProvider {
    fn pose(&self, time: f32) -> CameraPose;
}

/// A camera that never moves.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticPose(pub CameraPose);

impl PoseProvider for StaticPose {
    fn pose(&self, _time: f32) -> CameraPose {
        self.0
    }
}

/// Swings around a pivot while bobbing up and down.
#[derive(Clone, Copy, Debug)]
pub struct OrbitPose {
    pub origin: Vec3,
    /// Distance from the camera origin to the pivot.
    pub radius: f32,
    /// Yaw speed in radians per second.
    pub yaw_speed: f32,
    /// Peak pitch in radians.
    pub pitch_amplitude: f32,
}

impl Default for OrbitPose {
    fn default() -> Self {
        Self {
            origin: CameraPose::default().position,
            radius: 1100.0,
            yaw_speed: std::f32::consts::PI / 8.0,
            pitch_amplitude: 0.125,
        }
    }
}

impl PoseProvider for OrbitPose {
    fn pose(&self, time: f32) -> CameraPose {
        let rotation = Vec3::new(
            -(time * self.yaw_speed * 2.0).sin() * self.pitch_amplitude,
            time * self.yaw_speed,
            0.0,
        );
        let forward = CameraPose::new(Vec3::ZERO, rotation).rotation_matrix().z_axis;
        let pivot = self.origin - Vec3::Z * self.radius;
        CameraPose::new(pivot + forward * self.radius, rotation)
    }
}

/// Current and previous pose, advanced once per frame.
pub struct CameraState {
    provider: Box<dyn PoseProvider>,
    current: Option<CameraPose>,
    previous: Option<CameraPose>,
}

impl CameraState {
    pub fn new(provider: impl PoseProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            current: None,
            previous: None,
        }
    }

    /// Move to the pose for `time`; returns `(current, previous)`.
    ///
    /// On the first call both are the same pose.
    pub fn advance(&mut self, time: f32) -> (CameraPose, CameraPose) {
        let pose = self.provider.pose(time);
        let previous = self.current.unwrap_or(pose);
        self.previous = Some(previous);
        self.current = Some(pose);
        (pose, previous)
    }

    pub fn current(&self) -> Option<CameraPose> {
        self.current
    }

    pub fn previous(&self) -> Option<CameraPose> {
        self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Moves one unit along X per second.
    struct Slide;

    impl PoseProvider for Slide {
        fn pose(&self, time: f32) -> CameraPose {
            CameraPose::new(Vec3::new(time, 0.0, 0.0), Vec3::ZERO)
        }
    }

    #[test]
    fn previous_is_last_returned_pose() {
        let mut camera = CameraState::new(Slide);

        let (current, previous) = camera.advance(1.0);
        assert_eq!(current, previous);

        let (current, previous) = camera.advance(2.5);
        assert_eq!(current.position.x, 2.5);
        assert_eq!(previous.position.x, 1.0);

        let (_, previous) = camera.advance(3.0);
        assert_eq!(previous.position.x, 2.5);
    }

    #[test]
    fn static_pose_is_constant() {
        let mut camera = CameraState::new(StaticPose::default());
        let (a, _) = camera.advance(0.0);
        let (b, prev) = camera.advance(100.0);
        assert_eq!(a, b);
        assert_eq!(prev, a);
    }

    #[test]
    fn rotation_matrix_is_yaw_then_pitch() {
        let (x, y) = (0.3_f32, 1.1_f32);
        let pose = CameraPose::new(Vec3::ZERO, Vec3::new(x, y, 0.0));
        let m = pose.rotation_matrix();

        // columns of Ry(y) · Rx(x)
        assert!(m.x_axis.abs_diff_eq(Vec3::new(y.cos(), 0.0, -y.sin()), 1e-6));
        assert!(m.y_axis.abs_diff_eq(
            Vec3::new(y.sin() * x.sin(), x.cos(), y.cos() * x.sin()),
            1e-6
        ));
        assert!(m.z_axis.abs_diff_eq(
            Vec3::new(y.sin() * x.cos(), -x.sin(), y.cos() * x.cos()),
            1e-6
        ));
        assert!((m * pose.inverse_rotation_matrix()).abs_diff_eq(Mat3::IDENTITY, 1e-5));
    }

    #[test]
    fn orbit_starts_at_origin() {
        let orbit = OrbitPose::default();
        let pose = orbit.pose(0.0);
        assert!(pose.position.abs_diff_eq(orbit.origin, 1e-3));
        assert_ne!(orbit.pose(1.0).position, pose.position);
    }
}
