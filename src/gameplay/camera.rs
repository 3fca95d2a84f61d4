use glam::{Mat4, Vec3};

#[derive(Debug, Clone)]
pub struct CameraProjectionDesc {
    /// Vertical field of view in degrees.
    pub v_fov: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Default for CameraProjectionDesc {
    fn default() -> Self {
        Self {
            v_fov: 45.0,
            z_near: 1.0,
            z_far: 1000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraDesc {
    pub position: Vec3,
    /// Yaw in degrees. Yaw 0 looks down -z, positive yaw turns towards +x.
    pub yaw: f32,
    /// Pitch in degrees, clamped to (-90, 90).
    pub pitch: f32,
    pub projection: CameraProjectionDesc,
    pub aspect_ratio: f32,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 40.0, 80.0),
            yaw: 0.0,
            pitch: -25.0,
            projection: CameraProjectionDesc::default(),
            aspect_ratio: 16.0 / 9.0,
        }
    }
}

/// A read-only source of view and projection data for the frame loop.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    yaw: f32,
    pitch: f32,
    projection: CameraProjectionDesc,
    aspect_ratio: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Camera::new(CameraDesc::default())
    }
}

impl Camera {
    const WORLD_UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);

    pub fn new(desc: CameraDesc) -> Self {
        let mut camera = Self {
            position: desc.position,
            front: Vec3::ZERO,
            up: Vec3::ZERO,
            right: Vec3::ZERO,
            yaw: desc.yaw.to_radians(),
            pitch: desc.pitch.to_radians(),
            projection: desc.projection,
            aspect_ratio: desc.aspect_ratio,
        };
        camera.clamp_pitch();
        camera.update_camera_vectors();
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn z_near(&self) -> f32 {
        self.projection.z_near
    }

    pub fn z_far(&self) -> f32 {
        self.projection.z_far
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    pub fn proj_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.projection.v_fov.to_radians(),
            self.aspect_ratio,
            self.projection.z_near,
            self.projection.z_far,
        )
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
    }

    /// Places the camera on a circle of `radius` around `target` at `height`, looking at it.
    pub fn orbit(&mut self, target: Vec3, radius: f32, height: f32, angle: f32) {
        self.position = target + Vec3::new(radius * angle.sin(), height, radius * angle.cos());
        let dir = (target - self.position).normalize_or_zero();
        if dir == Vec3::ZERO {
            return;
        }
        self.pitch = dir.y.asin();
        self.yaw = dir.x.atan2(-dir.z);
        self.clamp_pitch();
        self.update_camera_vectors();
    }

    fn clamp_pitch(&mut self) {
        const CAMERA_LIM_RAD: f32 = std::f32::consts::FRAC_PI_2 - 0.01;
        self.pitch = self.pitch.clamp(-CAMERA_LIM_RAD, CAMERA_LIM_RAD);
    }

    fn update_camera_vectors(&mut self) {
        self.front = Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            -self.yaw.cos() * self.pitch.cos(),
        )
        .normalize();
        self.right = self.front.cross(Self::WORLD_UP).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orbit_looks_at_target() {
        let mut camera = Camera::default();
        let target = Vec3::new(5.0, 0.0, -3.0);
        camera.orbit(target, 50.0, 20.0, 0.7);

        let view = camera.view_matrix();
        let target_in_view = view.transform_point3(target);
        // right-handed view space looks down -z
        assert!(target_in_view.x.abs() < 1e-3);
        assert!(target_in_view.y.abs() < 1e-3);
        assert!(target_in_view.z < 0.0);
    }
}
