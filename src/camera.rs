//! Orbit camera around the centre of the simulation volume.
//!
//! The simulation never renders, but the kernels' uniform block carries the
//! camera focus and position for the renderer, so the core keeps them current.

use glam::{Mat4, Vec3};

/// Degrees per second for keyboard rotation.
pub const ROTATION_SPEED: f32 = 100.0;
/// Vertical angle is clamped to avoid flipping over the pole.
pub const MAX_VERTICAL_ANGLE: f32 = 89.0;

/// Orbit camera for viewing the trail volume.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitCamera {
    /// Horizontal rotation in degrees, kept in `[0, 360)`.
    pub horizontal_angle: f32,
    /// Vertical rotation in degrees, kept in `[-89, 89]`.
    pub vertical_angle: f32,
    /// Distance from the focus point, in voxels.
    pub orbit_radius: f32,
}

impl OrbitCamera {
    /// Starting azimuth, looking down the x axis.
    pub const INITIAL_HORIZONTAL_ANGLE: f32 = 90.0;

    /// Camera framing a grid of side `grid_resolution`.
    pub fn new(grid_resolution: u32) -> Self {
        Self {
            horizontal_angle: Self::INITIAL_HORIZONTAL_ANGLE,
            vertical_angle: 0.0,
            orbit_radius: grid_resolution as f32 * 1.25,
        }
    }

    /// Centre of the volume.
    pub fn focus(grid_resolution: u32) -> Vec3 {
        Vec3::splat((grid_resolution as f32 - 1.0) / 2.0)
    }

    /// World position for a grid of side `grid_resolution`.
    pub fn position(&self, grid_resolution: u32) -> Vec3 {
        let azimuth = self.horizontal_angle.to_radians();
        let altitude = self.vertical_angle.to_radians();
        let x = self.orbit_radius * altitude.cos() * azimuth.sin();
        let y = self.orbit_radius * altitude.sin();
        let z = self.orbit_radius * altitude.cos() * azimuth.cos();
        Self::focus(grid_resolution) + Vec3::new(x, y, z)
    }

    pub fn view_matrix(&self, grid_resolution: u32) -> Mat4 {
        Mat4::look_at_rh(self.position(grid_resolution), Self::focus(grid_resolution), Vec3::Y)
    }

    /// Rotate by `horizontal` and `vertical` input axes (each in `[-1, 1]`).
    pub fn rotate(&mut self, horizontal: f32, vertical: f32, dt: f32) {
        self.horizontal_angle = (self.horizontal_angle + horizontal * ROTATION_SPEED * dt).rem_euclid(360.0);
        self.vertical_angle = (self.vertical_angle + vertical * ROTATION_SPEED * dt)
            .clamp(-MAX_VERTICAL_ANGLE, MAX_VERTICAL_ANGLE);
    }

    /// Move along the orbit radius; positive `direction` zooms out.
    pub fn zoom(&mut self, direction: f32, dt: f32, grid_resolution: u32) {
        let speed = grid_resolution as f32 / 8.0;
        self.orbit_radius = (self.orbit_radius + direction * speed * dt).max(0.0);
    }

    /// Scale the orbit radius with the grid.
    pub fn rescale(&mut self, factor: f32) {
        self.orbit_radius *= factor;
    }
}
