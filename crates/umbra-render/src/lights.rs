//! Light model
//!
//! Lights are a closed set of variants, classified into per-kind buckets when
//! they are added to a [`LightSet`]. The mesh shader receives one uniform
//! array per bucket.

use glam::{Mat3, Mat4, Vec3};
use umbra_core::{LightInfo, LightKind};

/// Constant base term, no direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub radiance: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub radiance: Vec3,
    /// Unit vector the light travels along
    pub direction: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub radiance: Vec3,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub radiance: Vec3,
    pub position: Vec3,
    /// Unit vector along the cone axis
    pub direction: Vec3,
    /// Cone angle in degrees
    pub angle: f32,
}

impl SpotLight {
    /// Where the cone axis meets the ground plane `y = 0`
    pub fn ground_target(&self) -> Vec3 {
        self.position - (self.position.y / self.direction.y) * self.direction
    }

    /// Swing the light around the world Y axis by `delta` radians while it
    /// keeps aiming at the same ground point.
    pub fn rotate(&mut self, delta: f32) {
        let new_position = Mat3::from_rotation_y(delta) * self.position;
        let target = self.ground_target();
        self.direction = (target - new_position).normalize();
        self.position = new_position;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Ambient(AmbientLight),
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
}

impl Light {
    /// Build a renderer light from a scene record. Area lights have no
    /// renderer counterpart and yield `None`.
    ///
    /// Directions go through the full transform (as points) before being
    /// normalized, so a translated light node also tilts its direction.
    pub fn from_info(info: &LightInfo, transform: &Mat4) -> Option<Light> {
        let radiance = info.spectrum;
        match info.kind {
            LightKind::Ambient => Some(Light::Ambient(AmbientLight { radiance })),
            LightKind::Directional => Some(Light::Directional(DirectionalLight {
                radiance,
                direction: transform.transform_point3(info.direction).normalize(),
            })),
            LightKind::Point => Some(Light::Point(PointLight {
                radiance,
                position: transform.transform_point3(info.position),
            })),
            LightKind::Spot => Some(Light::Spot(SpotLight {
                radiance,
                position: transform.transform_point3(info.position),
                direction: transform.transform_point3(info.direction).normalize(),
                angle: info.falloff_deg,
            })),
            LightKind::Area => {
                log::debug!("Area light dropped, no renderer counterpart");
                None
            }
        }
    }

    pub fn radiance(&self) -> Vec3 {
        match self {
            Light::Ambient(l) => l.radiance,
            Light::Directional(l) => l.radiance,
            Light::Point(l) => l.radiance,
            Light::Spot(l) => l.radiance,
        }
    }
}

/// Lights bucketed by kind, in insertion order
#[derive(Debug, Clone, Default)]
pub struct LightSet {
    ambient: Vec<AmbientLight>,
    directional: Vec<DirectionalLight>,
    point: Vec<PointLight>,
    spot: Vec<SpotLight>,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, light: Light) {
        match light {
            Light::Ambient(l) => self.ambient.push(l),
            Light::Directional(l) => self.directional.push(l),
            Light::Point(l) => self.point.push(l),
            Light::Spot(l) => self.spot.push(l),
        }
    }

    pub fn ambient(&self) -> &[AmbientLight] {
        &self.ambient
    }

    pub fn directional(&self) -> &[DirectionalLight] {
        &self.directional
    }

    pub fn point(&self) -> &[PointLight] {
        &self.point
    }

    pub fn spot(&self) -> &[SpotLight] {
        &self.spot
    }

    pub fn spot_mut(&mut self) -> &mut [SpotLight] {
        &mut self.spot
    }

    /// Sum of all ambient terms
    pub fn ambient_radiance(&self) -> Vec3 {
        self.ambient.iter().map(|l| l.radiance).sum()
    }

    pub fn len(&self) -> usize {
        self.ambient.len() + self.directional.len() + self.point.len() + self.spot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Light> for LightSet {
    fn from_iter<I: IntoIterator<Item = Light>>(iter: I) -> Self {
        let mut set = LightSet::new();
        for light in iter {
            set.push(light);
        }
        set
    }
}
