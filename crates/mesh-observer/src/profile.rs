//! Observer profile: read-only configuration consumed once at construction.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::MaterialId;

/// How active meshes are presented to the renderer and physics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Hidden, collision disabled.
    None,
    /// Shown with the visible material, collision enabled.
    #[default]
    Visible,
    /// Shown with the occlusion material, collision enabled.
    Occlusion,
}

impl DisplayMode {
    pub fn is_shown(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Requested density of the surface reconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelOfDetail {
    #[default]
    Coarse,
    Medium,
    Fine,
    /// Use `triangles_per_cubic_meter` from the profile.
    Custom,
}

impl LevelOfDetail {
    /// Preset density, `None` for `Custom`.
    pub fn preset_triangles_per_cubic_meter(&self) -> Option<u32> {
        match self {
            Self::Coarse => Some(0),
            Self::Medium => Some(127),
            Self::Fine => Some(255),
            Self::Custom => None,
        }
    }
}

/// Shape of the region the scan observes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    #[default]
    AxisAlignedCube,
    UserAlignedCube,
    Sphere,
}

/// How renderables for pooled slots are built by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstructionMode {
    #[default]
    Programmatic,
    Prefab {
        name: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse profile: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid profile: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverProfile {
    pub name: String,
    pub auto_start: bool,
    pub update_interval_secs: f64,
    pub level_of_detail: LevelOfDetail,
    pub triangles_per_cubic_meter: u32,
    pub observer_volume: VolumeType,
    pub observation_extents: [f32; 3],
    pub display_option: DisplayMode,
    pub visible_material: MaterialId,
    pub occlusion_material: MaterialId,
    pub physics_layer: u32,
    pub recalculate_normals: bool,
    pub construction: ConstructionMode,
    pub additional_components: Vec<String>,
    /// Slots built during warm-up.
    pub initial_pool_size: usize,
    /// Free count below which a tick replenishes the pool.
    pub low_water_mark: usize,
    /// Slots built per replenishment.
    pub replenish_batch: usize,
}

impl Default for ObserverProfile {
    fn default() -> Self {
        Self {
            name: "Spatial Mesh Observer".to_string(),
            auto_start: true,
            update_interval_secs: 3.5,
            level_of_detail: LevelOfDetail::Coarse,
            triangles_per_cubic_meter: 0,
            observer_volume: VolumeType::AxisAlignedCube,
            observation_extents: [3.0, 3.0, 3.0],
            display_option: DisplayMode::Visible,
            visible_material: MaterialId::new("spatial-mesh-visible"),
            occlusion_material: MaterialId::new("spatial-mesh-occlusion"),
            physics_layer: 31,
            recalculate_normals: true,
            construction: ConstructionMode::Programmatic,
            additional_components: Vec::new(),
            initial_pool_size: 10,
            low_water_mark: 5,
            replenish_batch: 10,
        }
    }
}

impl ObserverProfile {
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        let profile: Self = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if !self.update_interval_secs.is_finite() || self.update_interval_secs <= 0.0 {
            return Err(ProfileError::Invalid(format!(
                "update_interval_secs must be positive, got {}",
                self.update_interval_secs
            )));
        }
        if self.replenish_batch == 0 {
            return Err(ProfileError::Invalid(
                "replenish_batch must be at least 1".to_string(),
            ));
        }
        if self.physics_layer > 31 {
            return Err(ProfileError::Invalid(format!(
                "physics_layer must be in 0..=31, got {}",
                self.physics_layer
            )));
        }
        if self
            .observation_extents
            .iter()
            .any(|e| !e.is_finite() || *e < 0.0)
        {
            return Err(ProfileError::Invalid(format!(
                "observation_extents must be finite and non-negative, got {:?}",
                self.observation_extents
            )));
        }
        if let ConstructionMode::Prefab { name } = &self.construction
            && name.trim().is_empty()
        {
            return Err(ProfileError::Invalid(
                "prefab construction requires a prefab name".to_string(),
            ));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs_f64(self.update_interval_secs)
    }

    pub fn effective_triangles_per_cubic_meter(&self) -> u32 {
        self.level_of_detail
            .preset_triangles_per_cubic_meter()
            .unwrap_or(self.triangles_per_cubic_meter)
    }

    pub fn material_for(&self, mode: DisplayMode) -> Option<&MaterialId> {
        match mode {
            DisplayMode::None => None,
            DisplayMode::Visible => Some(&self.visible_material),
            DisplayMode::Occlusion => Some(&self.occlusion_material),
        }
    }
}
