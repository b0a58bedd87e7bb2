//! Conversion of a smoothed-particle state into solid spheres for the N-body phase.
//!
//! [`smoothed_to_solid_handoff`] assigns sphere radii and drops sublimated particles,
//! [`merge_overlapping_spheres`] then repeatedly merges the interior spheres of each connected
//! component, keeping the surface intact.

use std::sync::Arc;

use tracing::{debug, info};

use crate::collision::{commit_verdict, CollisionHandler, MergingHandler, SphereState};
use crate::components::{find_components, InnerParticles};
use crate::config::{FinderConfig, HandoffConfig, HandoffRadius, MergeConfig};
use crate::error::Result;
use crate::finders::{FinderFlags, KdTree, NeighborFinder, NeighborRecord};
use crate::geometry::Vector;
use crate::materials::NullMaterial;
use crate::math::{sphere_volume, Float, EPS, PI};
use crate::quantity::{Order, QuantityId};
use crate::scheduler::{parallel_for_each_mut, Scheduler, ThreadLocal};
use crate::storage::{IndicesFlags, Storage};

/// Summary of the sphere merging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Spheres flagged as surface before the first iteration.
    pub surface_count: usize,
    /// Iterations that were carried out.
    pub iterations: usize,
    /// Spheres merged into others and removed.
    pub merged: usize,
}

/// Result of [`merge_overlapping_spheres`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandoffOutcome {
    Completed(MergeReport),
    /// The abort callback returned true; the storage holds the merges done so far.
    Interrupted(MergeReport),
}

impl HandoffOutcome {
    pub fn report(&self) -> &MergeReport {
        match self {
            HandoffOutcome::Completed(report) | HandoffOutcome::Interrupted(report) => report,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, HandoffOutcome::Interrupted(_))
    }
}

/// Creates solid spheres from smoothed particles.
///
/// The result holds positions with velocities, masses and the attractors of `input`, all
/// particles share a single [`NullMaterial`]. The sphere radius is stored in the `h` lane.
pub fn smoothed_to_solid_handoff(input: &Storage, config: &HandoffConfig) -> Result<Storage> {
    let mut positions = input.get::<Vector>(QuantityId::Position)?.to_vec();
    let velocities = input.dt::<Vector>(QuantityId::Position)?.to_vec();
    let masses = input.get::<Float>(QuantityId::Mass)?;

    match config.radius {
        HandoffRadius::EqualVolume => {
            let rho = input.get::<Float>(QuantityId::Density)?;
            for ((r, m), rho) in positions.iter_mut().zip(masses).zip(rho) {
                r.set_h((3.0 * m / (4.0 * PI * rho)).cbrt());
            }
        }
        HandoffRadius::SmoothingLength => {
            for r in &mut positions {
                r.set_h(config.smoothing_length_mult * r.h());
            }
        }
    }

    let mut spheres = Storage::with_material(Arc::new(NullMaterial::default()));
    spheres.insert_values(QuantityId::Position, Order::Second, positions)?;
    spheres
        .dt_mut::<Vector>(QuantityId::Position)?
        .copy_from_slice(&velocities);
    spheres.insert_values(QuantityId::Mass, Order::Zero, masses.to_vec())?;

    let sublimated = if config.remove_sublimated {
        let removed = sublimated_particles(input)?;
        spheres.remove(&removed, IndicesFlags::SORTED | IndicesFlags::PROPAGATE)?;
        removed.len()
    } else {
        0
    };
    for attractor in input.attractors() {
        spheres.add_attractor(*attractor);
    }
    info!(
        radius = ?config.radius,
        spheres = spheres.particle_count(),
        sublimated,
        "converted smoothed particles to solid spheres"
    );
    Ok(spheres)
}

/// Ascending indices of particles with specific energy above the sublimation energy of their
/// material.
fn sublimated_particles(input: &Storage) -> Result<Vec<usize>> {
    let limits: Vec<Float> = input
        .materials()
        .iter()
        .map(|view| view.material.sublimation_energy())
        .collect();
    if limits.iter().all(|u| !u.is_finite()) {
        return Ok(Vec::new());
    }
    let u = input.get::<Float>(QuantityId::Energy)?;
    let mut removed = Vec::new();
    for (view, u_max) in input.materials().iter().zip(limits) {
        removed.extend(view.range.iter().filter(|&i| u[i] > u_max));
    }
    Ok(removed)
}

/// Flags spheres lying on the surface of a body.
///
/// For each sphere the unit vectors towards neighbors within `2 h_i` are averaged with the
/// neighbor volumes as weights. Interior spheres are surrounded evenly and the average nearly
/// cancels; a sphere is on the surface if its magnitude exceeds `threshold`.
pub fn flag_surface_particles(
    scheduler: &dyn Scheduler,
    finder: &dyn NeighborFinder,
    threshold: Float,
) -> Vec<bool> {
    let r = finder.points();
    let mut surface = vec![false; r.len()];
    let neighbors = ThreadLocal::new(scheduler, Vec::<NeighborRecord>::new);
    parallel_for_each_mut(scheduler, &mut surface, scheduler.recommended_granularity(), |i, flag| {
        neighbors.with(scheduler, |neighbors| {
            finder.find_all_at(&r[i], 2.0 * r[i].h(), neighbors);
            let mut normal = Vector::ZERO;
            let mut weight = 0.0;
            for n in neighbors.iter() {
                let j = n.index;
                if i == j || (r[i] - r[j]).length_squared() < EPS {
                    continue;
                }
                let v = sphere_volume(r[j].h());
                normal += (r[j] - r[i]).normalized() * v;
                weight += v;
            }
            if weight > 0.0 {
                *flag = (normal / weight).length() > threshold;
            }
        });
    });
    surface
}

/// Merges the interior spheres of one component, starting with the most crowded ones.
///
/// Each sphere takes part in at most one merger per pass: after sphere `i` has tried to absorb
/// all of its clean neighbors, `i` and those neighbors are dirty, whatever the verdicts were.
fn merge_component(
    finder: &dyn NeighborFinder,
    handler: &dyn CollisionHandler,
    state: &mut SphereState,
    members: &[usize],
    dirty: &mut [bool],
    removed: &mut Vec<usize>,
) {
    let mut neighbors = Vec::new();
    let mut ordered: Vec<(usize, usize)> = members
        .iter()
        .map(|&i| {
            finder.find_all_at(&state.positions[i], 2.0 * state.positions[i].h(), &mut neighbors);
            let clean = neighbors.iter().filter(|n| !dirty[n.index]).count();
            (i, clean)
        })
        .collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1));

    for (i, _) in ordered {
        if dirty[i] {
            continue;
        }
        dirty[i] = true;
        finder.find_all_at(&state.positions[i], 2.0 * state.positions[i].h(), &mut neighbors);
        for n in &neighbors {
            let j = n.index;
            if dirty[j] {
                continue;
            }
            let verdict = handler.collide(state, i, j);
            removed.extend(commit_verdict(state, &verdict));
            dirty[j] = true;
        }
    }
}

/// Iteratively merges overlapping spheres inside bodies.
///
/// Surface spheres are flagged once and never merged. Every iteration finds the components of
/// interior spheres connected within `2 h`, merges the components of at least
/// [`MergeConfig::min_component_size`] spheres with a [`MergingHandler`] and removes the
/// absorbed spheres. `should_abort` is polled before every iteration and every component.
///
/// Mass and volume are conserved. Overlaps are only resolved by mergers: absorbed
/// spheres are removed, so a component whose spheres all merge into one body leaves no overlap
/// behind, while pairs rejected by the handler, surface spheres and spheres of components
/// smaller than the minimum size keep overlapping.
pub fn merge_overlapping_spheres(
    scheduler: &dyn Scheduler,
    storage: &mut Storage,
    config: &MergeConfig,
    mut should_abort: impl FnMut() -> bool,
) -> Result<HandoffOutcome> {
    storage.insert_or_raise(QuantityId::AngularFrequency, Order::Zero, Vector::ZERO)?;
    let mut finder = KdTree::new(FinderConfig::default());
    finder.build(
        scheduler,
        storage.get::<Vector>(QuantityId::Position)?,
        FinderFlags::SKIP_RANK,
    );
    let mut surface = flag_surface_particles(scheduler, &finder, config.surfaceness_threshold);
    let handler = MergingHandler::new(
        config.bounce_limit,
        config.rotation_limit,
        config.gravity_constant,
    );
    let mut report = MergeReport {
        surface_count: surface.iter().filter(|&&s| s).count(),
        ..MergeReport::default()
    };
    info!(
        spheres = surface.len(),
        surface = report.surface_count,
        "flagged surface spheres"
    );

    for iteration in 0..config.iterations {
        if should_abort() {
            return Ok(HandoffOutcome::Interrupted(report));
        }
        let components = find_components(&finder, 2.0, &InnerParticles(&surface));
        let mut groups = vec![Vec::new(); components.count];
        for (i, &c) in components.indices.iter().enumerate() {
            groups[c].push(i);
        }

        let mut state = SphereState::from_storage(storage)?;
        let mut dirty = surface.clone();
        let mut removed = Vec::new();
        let mut interrupted = false;
        for members in groups
            .iter()
            .filter(|members| members.len() >= config.min_component_size)
        {
            if should_abort() {
                interrupted = true;
                break;
            }
            merge_component(&finder, &handler, &mut state, members, &mut dirty, &mut removed);
        }

        state.write_to(storage)?;
        removed.sort_unstable();
        storage.remove(&removed, IndicesFlags::SORTED | IndicesFlags::PROPAGATE)?;
        let mut next = 0;
        let mut index = 0;
        surface.retain(|_| {
            let keep = removed.get(next) != Some(&index);
            if !keep {
                next += 1;
            }
            index += 1;
            keep
        });
        report.iterations += 1;
        report.merged += removed.len();
        info!(
            iteration,
            components = components.count,
            merged = removed.len(),
            "merged overlapping spheres"
        );
        if interrupted {
            return Ok(HandoffOutcome::Interrupted(report));
        }

        finder.build(
            scheduler,
            storage.get::<Vector>(QuantityId::Position)?,
            FinderFlags::SKIP_RANK,
        );
        debug!(spheres = storage.particle_count(), "rebuilt finder after merging");
    }
    Ok(HandoffOutcome::Completed(report))
}

/// Runs the complete handoff: sphere creation followed by merging.
pub fn handoff(
    scheduler: &dyn Scheduler,
    input: &Storage,
    handoff: &HandoffConfig,
    merge: &MergeConfig,
    should_abort: impl FnMut() -> bool,
) -> Result<(Storage, HandoffOutcome)> {
    let mut spheres = smoothed_to_solid_handoff(input, handoff)?;
    let outcome = merge_overlapping_spheres(scheduler, &mut spheres, merge, should_abort)?;
    Ok((spheres, outcome))
}
