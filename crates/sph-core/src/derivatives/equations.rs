use crate::derivatives::{add_slices, Pair, PairDerivative, ParticleSnapshot};
use crate::error::Result;
use crate::geometry::{SymmetricTensor, TracelessTensor, Vector};
use crate::math::{sqr, Float};
use crate::quantity::{Order, QuantityId};
use crate::storage::Storage;

/// `ρ ∇·v = Σ_j m_j (v_j - v_i) · ∇W_ij`.
///
/// Stores `∇·v` into [`QuantityId::VelocityDivergence`] and, when the density is evolved, adds
/// the continuity equation `dρ/dt = -ρ ∇·v`.
pub struct VelocityDivergence<'a> {
    snapshot: &'a ParticleSnapshot,
    densities: &'a [Float],
}

impl<'a> VelocityDivergence<'a> {
    pub fn new(snapshot: &'a ParticleSnapshot) -> Result<Self> {
        let densities = ParticleSnapshot::require(&snapshot.densities, QuantityId::Density)?;
        Ok(Self {
            snapshot,
            densities,
        })
    }
}

impl PairDerivative for VelocityDivergence<'_> {
    type Accumulator = Vec<Float>;

    fn accumulator(&self, particle_count: usize) -> Vec<Float> {
        vec![0.0; particle_count]
    }

    fn eval_pair(&self, pair: &Pair, acc: &mut Vec<Float>) {
        let Pair { i, j, grad } = *pair;
        let s = self.snapshot;
        let dv = (s.velocities[j] - s.velocities[i]).dot(&grad);
        acc[i] += s.masses[j] * dv;
        acc[j] += s.masses[i] * dv;
    }

    fn merge(&self, into: &mut Vec<Float>, from: Vec<Float>) {
        add_slices(into, &from);
    }

    fn store(&self, acc: Vec<Float>, storage: &mut Storage) -> Result<()> {
        storage.insert_or_raise(QuantityId::VelocityDivergence, Order::Zero, 0.0)?;
        let divv = storage.get_mut::<Float>(QuantityId::VelocityDivergence)?;
        for ((d, a), rho) in divv.iter_mut().zip(&acc).zip(self.densities) {
            *d = a / rho;
        }
        if let Ok(drho) = storage.dt_mut::<Float>(QuantityId::Density) {
            for (d, a) in drho.iter_mut().zip(&acc) {
                *d -= a;
            }
        }
        Ok(())
    }
}

/// Symmetrized velocity gradient, `ρ ∇v = Σ_j m_j (v_j - v_i) ⊗ ∇W_ij`.
pub struct VelocityGradient<'a> {
    snapshot: &'a ParticleSnapshot,
    densities: &'a [Float],
}

impl<'a> VelocityGradient<'a> {
    pub fn new(snapshot: &'a ParticleSnapshot) -> Result<Self> {
        let densities = ParticleSnapshot::require(&snapshot.densities, QuantityId::Density)?;
        Ok(Self {
            snapshot,
            densities,
        })
    }
}

impl PairDerivative for VelocityGradient<'_> {
    type Accumulator = Vec<SymmetricTensor>;

    fn accumulator(&self, particle_count: usize) -> Vec<SymmetricTensor> {
        vec![SymmetricTensor::ZERO; particle_count]
    }

    fn eval_pair(&self, pair: &Pair, acc: &mut Vec<SymmetricTensor>) {
        let Pair { i, j, grad } = *pair;
        let s = self.snapshot;
        let outer = SymmetricTensor::symmetric_outer(&(s.velocities[j] - s.velocities[i]), &grad);
        acc[i] += outer * s.masses[j];
        acc[j] += outer * s.masses[i];
    }

    fn merge(&self, into: &mut Vec<SymmetricTensor>, from: Vec<SymmetricTensor>) {
        add_slices(into, &from);
    }

    fn store(&self, acc: Vec<SymmetricTensor>, storage: &mut Storage) -> Result<()> {
        storage.insert_or_raise(QuantityId::VelocityGradient, Order::Zero, SymmetricTensor::ZERO)?;
        let gradv = storage.get_mut::<SymmetricTensor>(QuantityId::VelocityGradient)?;
        for ((g, a), rho) in gradv.iter_mut().zip(&acc).zip(self.densities) {
            *g = *a * (1.0 / rho);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StressAccumulator {
    pub acceleration: Vec<Vector>,
    pub energy: Vec<Float>,
}

/// Pressure gradient, divergence of the deviatoric stress and Monaghan artificial viscosity,
/// together with the work they do on the specific internal energy.
pub struct StressForce<'a> {
    snapshot: &'a ParticleSnapshot,
    densities: &'a [Float],
    pressures: &'a [Float],
    sound_speeds: &'a [Float],
    stress: Option<&'a [TracelessTensor]>,
    av_alpha: Float,
    av_beta: Float,
}

impl<'a> StressForce<'a> {
    pub fn new(snapshot: &'a ParticleSnapshot, av_alpha: Float, av_beta: Float) -> Result<Self> {
        Ok(Self {
            snapshot,
            densities: ParticleSnapshot::require(&snapshot.densities, QuantityId::Density)?,
            pressures: ParticleSnapshot::require(&snapshot.pressures, QuantityId::Pressure)?,
            sound_speeds: ParticleSnapshot::require(&snapshot.sound_speeds, QuantityId::SoundSpeed)?,
            stress: snapshot.stress.as_deref(),
            av_alpha,
            av_beta,
        })
    }

    /// Monaghan viscosity term `Π_ij`, nonzero only for approaching particles.
    pub fn artificial_viscosity(&self, i: usize, j: usize) -> Float {
        let s = self.snapshot;
        let dr = (s.positions[i] - s.positions[j]).clear_h();
        let dv = s.velocities[i] - s.velocities[j];
        let vr = dv.dot(&dr);
        if vr >= 0.0 {
            return 0.0;
        }
        let h = 0.5 * (s.positions[i].h() + s.positions[j].h());
        let mu = h * vr / (dr.length_squared() + 0.01 * sqr(h));
        let cs = 0.5 * (self.sound_speeds[i] + self.sound_speeds[j]);
        let rho = 0.5 * (self.densities[i] + self.densities[j]);
        (-self.av_alpha * cs * mu + self.av_beta * sqr(mu)) / rho
    }
}

impl PairDerivative for StressForce<'_> {
    type Accumulator = StressAccumulator;

    fn accumulator(&self, particle_count: usize) -> StressAccumulator {
        StressAccumulator {
            acceleration: vec![Vector::ZERO; particle_count],
            energy: vec![0.0; particle_count],
        }
    }

    fn eval_pair(&self, pair: &Pair, acc: &mut StressAccumulator) {
        let Pair { i, j, grad } = *pair;
        let s = self.snapshot;
        let (mi, mj) = (s.masses[i], s.masses[j]);
        let pi_rho_i = self.pressures[i] / sqr(self.densities[i]);
        let pj_rho_j = self.pressures[j] / sqr(self.densities[j]);
        let av = self.artificial_viscosity(i, j);

        let f = grad * (pi_rho_i + pj_rho_j + av);
        let mut ai = -f * mj;
        let mut aj = f * mi;
        if let Some(stress) = self.stress {
            let sigma = stress[i] * (1.0 / sqr(self.densities[i]))
                + stress[j] * (1.0 / sqr(self.densities[j]));
            let t = sigma.apply(&grad);
            ai += t * mj;
            aj -= t * mi;
        }
        acc.acceleration[i] += ai;
        acc.acceleration[j] += aj;

        let work = (s.velocities[i] - s.velocities[j]).dot(&grad);
        acc.energy[i] += mj * (pi_rho_i + 0.5 * av) * work;
        acc.energy[j] += mi * (pj_rho_j + 0.5 * av) * work;
    }

    fn merge(&self, into: &mut StressAccumulator, from: StressAccumulator) {
        add_slices(&mut into.acceleration, &from.acceleration);
        add_slices(&mut into.energy, &from.energy);
    }

    fn store(&self, acc: StressAccumulator, storage: &mut Storage) -> Result<()> {
        let dv = storage.d2t_mut::<Vector>(QuantityId::Position)?;
        for (d, a) in dv.iter_mut().zip(&acc.acceleration) {
            *d += a.clear_h();
        }
        if let Ok(du) = storage.dt_mut::<Float>(QuantityId::Energy) {
            add_slices(du, &acc.energy);
        }
        Ok(())
    }
}
