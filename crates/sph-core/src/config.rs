use crate::error::SettingsError;
use crate::kernel::KernelKind;
use crate::math::{constants, Float};
use crate::settings::{RunSettings, RunSettingsId};

/// Parameters of the k-d tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FinderConfig {
    /// Maximum number of particles in a leaf.
    pub leaf_size: usize,
    /// Recursion depth up to which subtrees are built as separate tasks.
    pub max_parallel_depth: usize,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            leaf_size: 25,
            max_parallel_depth: 50,
        }
    }
}

/// How the radius of a solid sphere is chosen at handoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HandoffRadius {
    /// Sphere with the same volume as the particle, `cbrt(3m / 4πρ)`.
    #[default]
    EqualVolume,
    /// Multiple of the smoothing length, see [`HandoffConfig::smoothing_length_mult`].
    SmoothingLength,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandoffConfig {
    pub radius: HandoffRadius,
    pub smoothing_length_mult: Float,
    /// Removes particles whose specific energy exceeds the sublimation energy of their material.
    pub remove_sublimated: bool,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            radius: HandoffRadius::EqualVolume,
            smoothing_length_mult: 1.0 / 3.0,
            remove_sublimated: true,
        }
    }
}

/// Parameters of the iterative merging of overlapping spheres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergeConfig {
    /// Particles with the magnitude of the weighted normal above this value lie on the surface.
    pub surfaceness_threshold: Float,
    pub iterations: usize,
    /// Components with fewer particles are not merged.
    pub min_component_size: usize,
    /// Relative velocity tolerance of the binding criterion.
    pub bounce_limit: Float,
    /// Spin tolerance of the rotational stability criterion.
    pub rotation_limit: Float,
    pub gravity_constant: Float,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            surfaceness_threshold: 0.4,
            iterations: 5,
            min_component_size: 4,
            bounce_limit: 1.0,
            rotation_limit: 1.0,
            gravity_constant: constants::GRAVITY,
        }
    }
}

/// Self-gravity model of the solver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GravityKind {
    None,
    /// Analytic field of a homogeneous sphere centered at the origin.
    Spherical { density: Float, radius: Float },
    /// Exact pairwise summation.
    BruteForce,
    /// Multipole approximation on the k-d tree with opening angle `theta`.
    BarnesHut { theta: Float },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverConfig {
    pub kernel: KernelKind,
    /// Linear coefficient of the artificial viscosity.
    pub av_alpha: Float,
    /// Quadratic coefficient of the artificial viscosity.
    pub av_beta: Float,
    pub gravity: GravityKind,
    pub gravity_constant: Float,
    pub finder: FinderConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kernel: KernelKind::CubicSpline,
            av_alpha: 1.5,
            av_beta: 3.0,
            gravity: GravityKind::None,
            gravity_constant: constants::GRAVITY,
            finder: FinderConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Default configuration overridden by the entries present in `settings`.
    pub fn from_settings(settings: &RunSettings) -> Result<Self, SettingsError> {
        let mut config = Self::default();
        if settings.has(RunSettingsId::Kernel) {
            config.kernel = settings.get_enum(RunSettingsId::Kernel)?;
        }
        if settings.has(RunSettingsId::FinderLeafSize) {
            let leaf_size: i64 = settings.get(RunSettingsId::FinderLeafSize)?;
            config.finder.leaf_size = usize::try_from(leaf_size.max(1)).unwrap_or(1);
        }
        if settings.has(RunSettingsId::GravityConstant) {
            config.gravity_constant = settings.get(RunSettingsId::GravityConstant)?;
        }
        if settings.has(RunSettingsId::ArtificialViscosityAlpha) {
            config.av_alpha = settings.get(RunSettingsId::ArtificialViscosityAlpha)?;
        }
        if settings.has(RunSettingsId::ArtificialViscosityBeta) {
            config.av_beta = settings.get(RunSettingsId::ArtificialViscosityBeta)?;
        }
        Ok(config)
    }
}
