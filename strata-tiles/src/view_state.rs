use glam::DVec3;
use strata_geo::{Cartographic, CullingVolume, Ellipsoid, EPSILON7};

/// One camera/frustum against which tiles are selected. A view group may
/// carry several of these per frame (stereo, shadow cascades).
#[derive(Clone, Debug)]
pub struct ViewState {
    pub position: DVec3,
    pub direction: DVec3,
    pub up: DVec3,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub horizontal_fov: f64,
    pub vertical_fov: f64,
    pub culling_volume: CullingVolume,
    pub position_cartographic: Option<Cartographic>,
    sse_denominator: f64,
}

impl ViewState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        position: DVec3,
        direction: DVec3,
        up: DVec3,
        viewport_width: f64,
        viewport_height: f64,
        horizontal_fov: f64,
        vertical_fov: f64,
        ellipsoid: &Ellipsoid,
    ) -> Self {
        let culling_volume =
            CullingVolume::from_perspective(position, direction, up, horizontal_fov, vertical_fov);
        Self {
            position,
            direction,
            up,
            viewport_width,
            viewport_height,
            horizontal_fov,
            vertical_fov,
            culling_volume,
            position_cartographic: ellipsoid.cartesian_to_cartographic(position),
            sse_denominator: 2.0 * (0.5 * vertical_fov).tan(),
        }
    }

    /// The screen-space error, in pixels, of rendering geometry with the
    /// given error at the given distance.
    pub fn screen_space_error(&self, geometric_error: f64, distance: f64) -> f64 {
        (geometric_error * self.viewport_height) / (distance.max(EPSILON7) * self.sse_denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_3;

    fn view() -> ViewState {
        ViewState::new(
            DVec3::ZERO,
            DVec3::X,
            DVec3::Z,
            1024.0,
            768.0,
            FRAC_PI_3,
            FRAC_PI_3,
            &Ellipsoid::WGS84,
        )
    }

    #[test]
    fn sse_shrinks_with_distance() {
        let v = view();
        let near = v.screen_space_error(10.0, 100.0);
        let far = v.screen_space_error(10.0, 1000.0);
        assert!(near > far);
        assert!((near / far - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_distance_does_not_blow_up() {
        let v = view();
        assert!(v.screen_space_error(10.0, 0.0).is_finite());
    }

    #[test]
    fn matches_the_standard_formula() {
        let v = view();
        let expected = (10.0 * 768.0) / (500.0 * 2.0 * (0.5f64 * FRAC_PI_3).tan());
        assert!((v.screen_space_error(10.0, 500.0) - expected).abs() < 1e-12);
    }
}
