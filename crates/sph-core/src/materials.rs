use std::fmt::Debug;

use crate::error::{DomainError, Result};
use crate::math::{sqr, Float, Interval};
use crate::quantity::{Order, QuantityId};
use crate::scheduler::{parallel_for_each_mut, Scheduler};
use crate::settings::{BodySettings, BodySettingsId, EosKind};
use crate::storage::{IndexRange, Storage};

/// Material of a body: parameters plus hooks run by the solver on the material's particles.
pub trait Material: Send + Sync + Debug {
    fn params(&self) -> &BodySettings;

    /// Populates per-particle fields when the body is added to a storage.
    fn create(&self, _storage: &mut Storage, _range: IndexRange) -> Result<()> {
        Ok(())
    }

    /// Runs before derivatives are evaluated.
    fn initialize(
        &self,
        _scheduler: &dyn Scheduler,
        _storage: &mut Storage,
        _range: IndexRange,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after derivatives are evaluated.
    fn finalize(
        &self,
        _scheduler: &dyn Scheduler,
        _storage: &mut Storage,
        _range: IndexRange,
    ) -> Result<()> {
        Ok(())
    }

    /// Specific energy above which particles of this material sublimate.
    fn sublimation_energy(&self) -> Float {
        self.params()
            .get::<Float>(BodySettingsId::TillotsonSublimation)
            .unwrap_or(Float::INFINITY)
    }
}

/// Material with parameters only.
#[derive(Clone, Debug, Default)]
pub struct NullMaterial {
    params: BodySettings,
}

impl NullMaterial {
    pub fn new(params: BodySettings) -> Self {
        Self { params }
    }
}

impl Material for NullMaterial {
    fn params(&self) -> &BodySettings {
        &self.params
    }
}

/// Equation of state `p(ρ, u)` with the sound speed.
pub trait Eos: Send + Sync + Debug {
    /// Returns pressure and sound speed.
    fn evaluate(&self, density: Float, energy: Float) -> (Float, Float);

    /// Specific internal energy for the given density and pressure.
    fn internal_energy(&self, density: Float, pressure: Float) -> Float;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IdealGasEos {
    pub gamma: Float,
}

impl IdealGasEos {
    pub fn new(gamma: Float) -> Self {
        Self { gamma }
    }
}

impl Eos for IdealGasEos {
    fn evaluate(&self, density: Float, energy: Float) -> (Float, Float) {
        let p = (self.gamma - 1.0) * energy * density;
        let cs = if density > 0.0 {
            (self.gamma * p / density).max(0.0).sqrt()
        } else {
            0.0
        };
        (p, cs)
    }

    fn internal_energy(&self, density: Float, pressure: Float) -> Float {
        pressure / ((self.gamma - 1.0) * density)
    }
}

/// Tillotson equation of state for solids, with compressed and expanded phases blended between
/// the energies of incipient and complete vaporization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TillotsonEos {
    pub u0: Float,
    pub uiv: Float,
    pub ucv: Float,
    pub a: Float,
    pub b: Float,
    pub rho0: Float,
    pub bulk_a: Float,
    pub bulk_b: Float,
    pub alpha: Float,
    pub beta: Float,
}

impl TillotsonEos {
    pub fn from_settings(params: &BodySettings) -> Result<Self> {
        Ok(Self {
            u0: params.get(BodySettingsId::TillotsonSublimation)?,
            uiv: params.get(BodySettingsId::TillotsonEnergyIv)?,
            ucv: params.get(BodySettingsId::TillotsonEnergyCv)?,
            a: params.get(BodySettingsId::TillotsonSmallA)?,
            b: params.get(BodySettingsId::TillotsonSmallB)?,
            rho0: params.get(BodySettingsId::Density)?,
            bulk_a: params.get(BodySettingsId::BulkModulus)?,
            bulk_b: params.get(BodySettingsId::TillotsonNonlinearB)?,
            alpha: params.get(BodySettingsId::TillotsonAlpha)?,
            beta: params.get(BodySettingsId::TillotsonBeta)?,
        })
    }
}

impl Eos for TillotsonEos {
    fn evaluate(&self, rho: Float, u: Float) -> (Float, Float) {
        let Self {
            u0,
            uiv,
            ucv,
            a,
            b,
            rho0,
            bulk_a,
            bulk_b,
            alpha,
            beta,
        } = *self;
        let eta = rho / rho0;
        let mu = eta - 1.0;
        let denom = u / (u0 * eta * eta) + 1.0;

        // compressed phase
        let pc = (a + b / denom) * rho * u + bulk_a * mu + bulk_b * mu * mu;
        let dpdu = a * rho + b * rho / sqr(denom);
        let dpdrho = a * u
            + b * u * (3.0 * denom - 2.0) / sqr(denom)
            + bulk_a / rho0
            + 2.0 * bulk_b * mu / rho0;
        let csc = dpdrho + dpdu * pc / (rho * rho);

        // expanded phase
        let rho_exp = rho0 / rho - 1.0;
        let beta_exp = (-(beta * rho_exp).min(70.0)).exp();
        let alpha_exp = (-(alpha * sqr(rho_exp)).min(70.0)).exp();
        let pe = a * rho * u + (b * rho * u / denom + bulk_a * mu * beta_exp) * alpha_exp;
        let dpdu = a * rho + alpha_exp * b * rho / sqr(denom);
        let dpdrho = a * u
            + alpha_exp * (b * u * (3.0 * denom - 2.0) / sqr(denom))
            + alpha_exp * (b * u * rho / denom) * rho0 * (2.0 * alpha * rho_exp) / sqr(rho)
            + alpha_exp
                * bulk_a
                * beta_exp
                * (1.0 / rho0 + rho0 * mu / sqr(rho) * (2.0 * alpha * rho_exp + beta));
        let cse = (dpdrho + dpdu * pe / (rho * rho)).max(0.0);

        let (p, cs) = if rho <= rho0 && u > ucv {
            (pe, cse)
        } else if rho <= rho0 && u > uiv {
            let w = ucv - uiv;
            (
                ((u - uiv) * pe + (ucv - u) * pc) / w,
                ((u - uiv) * cse + (ucv - u) * csc) / w,
            )
        } else {
            (pc, csc)
        };
        (p, cs.max(0.25 * bulk_a / rho0).sqrt())
    }

    /// Inverts the compressed phase analytically; the expanded regime falls back to bisection.
    fn internal_energy(&self, rho: Float, p: Float) -> Float {
        let eta = rho / self.rho0;
        let mu = eta - 1.0;
        let x = (p - self.bulk_a * mu - self.bulk_b * sqr(mu)) / rho;
        let l = self.a;
        let m = self.u0 * sqr(eta) * (self.a + self.b) - x;
        let n = -x * self.u0 * sqr(eta);
        let u = (-m + (sqr(m) - 4.0 * l * n).sqrt()) / (2.0 * l);
        if rho > self.rho0 || u <= self.uiv {
            return u;
        }
        let (mut lo, mut hi) = (0.0, self.u0);
        let f = |u: Float| p - self.evaluate(rho, u).0;
        if f(lo) * f(hi) > 0.0 {
            return u;
        }
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if f(lo) * f(mid) <= 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        0.5 * (lo + hi)
    }
}

/// Material computing pressure and sound speed from an equation of state.
#[derive(Debug)]
pub struct EosMaterial {
    params: BodySettings,
    eos: Box<dyn Eos>,
}

impl EosMaterial {
    pub fn new(params: BodySettings, eos: Box<dyn Eos>) -> Self {
        Self { params, eos }
    }

    /// Material with the equation of state selected by [`BodySettingsId::Eos`].
    pub fn from_settings(params: BodySettings) -> Result<Self> {
        let eos: Box<dyn Eos> = match params.get_enum::<EosKind>(BodySettingsId::Eos)? {
            EosKind::IdealGas => Box::new(IdealGasEos::new(
                params.get(BodySettingsId::AdiabaticIndex)?,
            )),
            EosKind::Tillotson => Box::new(TillotsonEos::from_settings(&params)?),
            EosKind::None => {
                return Err(DomainError::Eos("material requires an equation of state".into()).into())
            }
        };
        Ok(Self::new(params, eos))
    }

    pub fn eos(&self) -> &dyn Eos {
        self.eos.as_ref()
    }

    /// Clamps density and specific energy of the material's particles to the allowed ranges.
    fn clamp_to_ranges(&self, storage: &mut Storage, range: IndexRange) -> Result<()> {
        for (id, setting) in [
            (QuantityId::Density, BodySettingsId::DensityRange),
            (QuantityId::Energy, BodySettingsId::EnergyRange),
        ] {
            let Ok(interval) = self.params.get::<Interval>(setting) else {
                continue;
            };
            for value in &mut storage.get_mut::<Float>(id)?[range.from..range.to] {
                *value = interval.clamp(*value);
            }
        }
        Ok(())
    }

    fn update_pressure(
        &self,
        scheduler: &dyn Scheduler,
        storage: &mut Storage,
        range: IndexRange,
    ) -> Result<()> {
        let rho = storage.get::<Float>(QuantityId::Density)?;
        let u = storage.get::<Float>(QuantityId::Energy)?;
        let mut values = vec![(0.0, 0.0); range.len()];
        parallel_for_each_mut(scheduler, &mut values, 256, |k, value| {
            let i = range.from + k;
            *value = self.eos.evaluate(rho[i], u[i]);
        });
        if let Some(k) = values
            .iter()
            .position(|(p, cs)| !p.is_finite() || !cs.is_finite())
        {
            return Err(DomainError::NonFinite {
                quantity: QuantityId::Pressure,
                index: range.from + k,
            }
            .into());
        }
        let p = storage.get_mut::<Float>(QuantityId::Pressure)?;
        for (k, (value, _)) in values.iter().enumerate() {
            p[range.from + k] = *value;
        }
        let cs = storage.get_mut::<Float>(QuantityId::SoundSpeed)?;
        for (k, (_, value)) in values.iter().enumerate() {
            cs[range.from + k] = *value;
        }
        Ok(())
    }
}

impl Material for EosMaterial {
    fn params(&self) -> &BodySettings {
        &self.params
    }

    fn create(&self, storage: &mut Storage, range: IndexRange) -> Result<()> {
        let rho0: Float = self.params.get(BodySettingsId::Density)?;
        let u0: Float = self.params.get(BodySettingsId::Energy)?;
        storage.insert_or_raise(QuantityId::Density, Order::First, rho0)?;
        storage.insert_or_raise(QuantityId::Energy, Order::First, u0)?;
        storage.insert_or_raise(QuantityId::Pressure, Order::Zero, 0.0)?;
        storage.insert_or_raise(QuantityId::SoundSpeed, Order::Zero, 0.0)?;
        self.update_pressure(&crate::scheduler::SequentialScheduler, storage, range)
    }

    fn initialize(
        &self,
        scheduler: &dyn Scheduler,
        storage: &mut Storage,
        range: IndexRange,
    ) -> Result<()> {
        self.clamp_to_ranges(storage, range)?;
        self.update_pressure(scheduler, storage, range)
    }
}

/// Tabulated material parameters of common rocky and icy bodies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialPreset {
    pub density: Float,
    pub bulk_modulus: Float,
    pub shear_modulus: Float,
    pub tillotson_a: Float,
    pub tillotson_b: Float,
    pub tillotson_nonlinear_b: Float,
    pub tillotson_alpha: Float,
    pub tillotson_beta: Float,
    pub sublimation: Float,
    pub energy_iv: Float,
    pub energy_cv: Float,
}

impl MaterialPreset {
    pub const BASALT: Self = Self {
        density: 2700.0,
        bulk_modulus: 2.67e10,
        shear_modulus: 2.27e10,
        tillotson_a: 0.5,
        tillotson_b: 1.5,
        tillotson_nonlinear_b: 2.67e10,
        tillotson_alpha: 5.0,
        tillotson_beta: 5.0,
        sublimation: 4.87e8,
        energy_iv: 4.72e6,
        energy_cv: 1.82e7,
    };

    pub const ICE: Self = Self {
        density: 917.0,
        bulk_modulus: 9.47e9,
        shear_modulus: 2.8e9,
        tillotson_a: 0.3,
        tillotson_b: 0.1,
        tillotson_nonlinear_b: 9.47e9,
        tillotson_alpha: 10.0,
        tillotson_beta: 5.0,
        sublimation: 1.0e7,
        energy_iv: 7.73e5,
        energy_cv: 3.04e6,
    };

    pub const IRON: Self = Self {
        density: 7800.0,
        bulk_modulus: 1.28e11,
        shear_modulus: 8.2e10,
        tillotson_a: 0.5,
        tillotson_b: 1.5,
        tillotson_nonlinear_b: 1.05e11,
        tillotson_alpha: 5.0,
        tillotson_beta: 5.0,
        sublimation: 9.5e6,
        energy_iv: 2.4e6,
        energy_cv: 8.67e6,
    };

    pub const OLIVINE: Self = Self {
        density: 3500.0,
        bulk_modulus: 1.31e11,
        shear_modulus: 6.5e10,
        tillotson_a: 0.5,
        tillotson_b: 1.4,
        tillotson_nonlinear_b: 4.9e10,
        tillotson_alpha: 5.0,
        tillotson_beta: 5.0,
        sublimation: 5.5e8,
        energy_iv: 4.5e6,
        energy_cv: 1.5e7,
    };

    /// Writes the preset into material parameters.
    pub fn apply_to(&self, params: &mut BodySettings) {
        params
            .set(BodySettingsId::Density, self.density)
            .set(BodySettingsId::BulkModulus, self.bulk_modulus)
            .set(BodySettingsId::ShearModulus, self.shear_modulus)
            .set(BodySettingsId::TillotsonSmallA, self.tillotson_a)
            .set(BodySettingsId::TillotsonSmallB, self.tillotson_b)
            .set(BodySettingsId::TillotsonNonlinearB, self.tillotson_nonlinear_b)
            .set(BodySettingsId::TillotsonAlpha, self.tillotson_alpha)
            .set(BodySettingsId::TillotsonBeta, self.tillotson_beta)
            .set(BodySettingsId::TillotsonSublimation, self.sublimation)
            .set(BodySettingsId::TillotsonEnergyIv, self.energy_iv)
            .set(BodySettingsId::TillotsonEnergyCv, self.energy_cv);
    }

    /// Default parameters with this preset applied.
    pub fn settings(&self) -> BodySettings {
        let mut params = BodySettings::defaults();
        self.apply_to(&mut params);
        params
    }
}
