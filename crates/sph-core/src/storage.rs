use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::attractor::Attractor;
use crate::error::{Result, StorageError};
use crate::geometry::{BoundingBox, Vector};
use crate::materials::Material;
use crate::math::Float;
use crate::quantity::{Buffer, BufferFlags, Order, Quantity, QuantityId, QuantityValue};

bitflags::bitflags! {
    /// Options of [`Storage::remove`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct IndicesFlags: u32 {
        /// Indices are ascending and unique; skips the sort.
        const SORTED = 1;
        /// Material ranges are updated to the new particle ordering.
        const PROPAGATE = 2;
    }
}

/// Half-open range `[from, to)` of particle indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IndexRange {
    pub from: usize,
    pub to: usize,
}

impl IndexRange {
    pub const fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn contains(&self, i: usize) -> bool {
        i >= self.from && i < self.to
    }

    #[inline]
    pub fn iter(&self) -> Range<usize> {
        self.from..self.to
    }

    fn shifted(&self, offset: usize) -> Self {
        Self::new(self.from + offset, self.to + offset)
    }
}

/// Material together with the particles it owns.
#[derive(Clone, Debug)]
pub struct MaterialView {
    pub material: Arc<dyn Material>,
    pub range: IndexRange,
}

fn same_material(a: &Arc<dyn Material>, b: &Arc<dyn Material>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Columnar particle storage.
///
/// Maps quantity ids to buffers of equal length and partitions the particles into contiguous
/// material ranges. When the storage has materials, the [`QuantityId::MaterialId`] quantity is
/// kept in sync with the ranges.
#[derive(Clone, Debug, Default)]
pub struct Storage {
    quantities: BTreeMap<QuantityId, Quantity>,
    materials: Vec<MaterialView>,
    attractors: Vec<Attractor>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage of a single body; the material takes ownership of all particles inserted later.
    pub fn with_material(material: Arc<dyn Material>) -> Self {
        Self {
            materials: vec![MaterialView {
                material,
                range: IndexRange::default(),
            }],
            ..Self::default()
        }
    }

    pub fn particle_count(&self) -> usize {
        self.quantities.values().next().map_or(0, Quantity::len)
    }

    pub fn quantity_count(&self) -> usize {
        self.quantities.len()
    }

    pub fn quantity_ids(&self) -> impl Iterator<Item = QuantityId> + '_ {
        self.quantities.keys().copied()
    }

    pub fn has(&self, id: QuantityId) -> bool {
        self.quantities.contains_key(&id)
    }

    /// True if the storage holds neither quantities nor materials.
    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty() && self.materials.is_empty()
    }

    pub fn quantity(&self, id: QuantityId) -> Result<&Quantity, StorageError> {
        self.quantities
            .get(&id)
            .ok_or(StorageError::MissingQuantity(id))
    }

    pub fn quantity_mut(&mut self, id: QuantityId) -> Result<&mut Quantity, StorageError> {
        self.quantities
            .get_mut(&id)
            .ok_or(StorageError::MissingQuantity(id))
    }

    /// Inserts a quantity with every particle set to `value`.
    ///
    /// The particle count is taken from the quantities already stored, so the storage must not
    /// be empty.
    pub fn insert<T: QuantityValue>(
        &mut self,
        id: QuantityId,
        order: Order,
        value: T,
    ) -> Result<(), StorageError> {
        if self.quantities.is_empty() {
            return Err(StorageError::EmptyStorage);
        }
        let n = self.particle_count();
        self.insert_values(id, order, vec![value; n])
    }

    /// Inserts a quantity with explicit values; all derivatives start at zero.
    pub fn insert_values<T: QuantityValue>(
        &mut self,
        id: QuantityId,
        order: Order,
        values: Vec<T>,
    ) -> Result<(), StorageError> {
        if self.quantities.contains_key(&id) {
            return Err(StorageError::DuplicateQuantity(id));
        }
        let first = self.quantities.is_empty();
        if !first && values.len() != self.particle_count() {
            return Err(StorageError::SizeMismatch {
                expected: self.particle_count(),
                actual: values.len(),
            });
        }
        self.quantities.insert(id, Quantity::new(order, values));
        if first && self.materials.len() == 1 && self.materials[0].range.is_empty() {
            self.materials[0].range = IndexRange::new(0, self.particle_count());
            self.sync_material_ids();
        }
        Ok(())
    }

    /// Like [`Storage::insert`], but an existing quantity of the same type only has its order
    /// raised and keeps its values.
    pub fn insert_or_raise<T: QuantityValue>(
        &mut self,
        id: QuantityId,
        order: Order,
        value: T,
    ) -> Result<(), StorageError> {
        match self.quantities.get_mut(&id) {
            Some(q) if q.kind() != T::KIND => Err(StorageError::WrongType {
                id,
                expected: T::KIND,
                actual: q.kind(),
            }),
            Some(q) => {
                q.set_order(order);
                Ok(())
            }
            None => self.insert(id, order, value),
        }
    }

    pub fn remove_quantity(&mut self, id: QuantityId) -> Option<Quantity> {
        self.quantities.remove(&id)
    }

    fn typed<T: QuantityValue>(&self, id: QuantityId, order: Order) -> Result<&[T], StorageError> {
        let q = self.quantity(id)?;
        if q.kind() != T::KIND {
            return Err(StorageError::WrongType {
                id,
                expected: T::KIND,
                actual: q.kind(),
            });
        }
        let actual = q.order();
        q.values::<T>(order).ok_or(StorageError::WrongOrder {
            id,
            requested: order,
            actual,
        })
    }

    fn typed_mut<T: QuantityValue>(
        &mut self,
        id: QuantityId,
        order: Order,
    ) -> Result<&mut [T], StorageError> {
        let q = self.quantity_mut(id)?;
        if q.kind() != T::KIND {
            return Err(StorageError::WrongType {
                id,
                expected: T::KIND,
                actual: q.kind(),
            });
        }
        let actual = q.order();
        q.values_mut::<T>(order).ok_or(StorageError::WrongOrder {
            id,
            requested: order,
            actual,
        })
    }

    pub fn get<T: QuantityValue>(&self, id: QuantityId) -> Result<&[T], StorageError> {
        self.typed(id, Order::Zero)
    }

    pub fn get_mut<T: QuantityValue>(&mut self, id: QuantityId) -> Result<&mut [T], StorageError> {
        self.typed_mut(id, Order::Zero)
    }

    pub fn dt<T: QuantityValue>(&self, id: QuantityId) -> Result<&[T], StorageError> {
        self.typed(id, Order::First)
    }

    pub fn dt_mut<T: QuantityValue>(&mut self, id: QuantityId) -> Result<&mut [T], StorageError> {
        self.typed_mut(id, Order::First)
    }

    pub fn d2t<T: QuantityValue>(&self, id: QuantityId) -> Result<&[T], StorageError> {
        self.typed(id, Order::Second)
    }

    pub fn d2t_mut<T: QuantityValue>(&mut self, id: QuantityId) -> Result<&mut [T], StorageError> {
        self.typed_mut(id, Order::Second)
    }

    /// Removes particles from all quantities.
    ///
    /// Without [`IndicesFlags::PROPAGATE`] the material ranges are left untouched and the caller
    /// has to fix them.
    pub fn remove(&mut self, indices: &[usize], flags: IndicesFlags) -> Result<(), StorageError> {
        let sorted;
        let indices = if flags.contains(IndicesFlags::SORTED) {
            debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
            indices
        } else {
            let mut copy = indices.to_vec();
            copy.sort_unstable();
            copy.dedup();
            sorted = copy;
            &sorted
        };
        let count = self.particle_count();
        if let Some(&index) = indices.iter().find(|&&i| i >= count) {
            return Err(StorageError::IndexOutOfRange { index, count });
        }
        if indices.is_empty() {
            return Ok(());
        }
        for q in self.quantities.values_mut() {
            q.remove_sorted(indices);
        }
        if flags.contains(IndicesFlags::PROPAGATE) {
            self.propagate_removal(indices);
        }
        Ok(())
    }

    fn propagate_removal(&mut self, sorted: &[usize]) {
        let mut next = 0;
        let mut from = 0;
        for view in &mut self.materials {
            let mut removed = 0;
            while next < sorted.len() && sorted[next] < view.range.to {
                removed += 1;
                next += 1;
            }
            let len = view.range.len().saturating_sub(removed);
            view.range = IndexRange::new(from, from + len);
            from += len;
        }
        let before = self.materials.len();
        self.materials.retain(|view| !view.range.is_empty());
        if self.materials.len() != before {
            debug!(
                dropped = before - self.materials.len(),
                "removed materials without particles"
            );
        }
        self.sync_material_ids();
    }

    /// Rewrites the material index of every particle from the material ranges.
    fn sync_material_ids(&mut self) {
        if self.materials.is_empty() || self.quantities.is_empty() {
            return;
        }
        let mut ids = vec![0_usize; self.particle_count()];
        for (k, view) in self.materials.iter().enumerate() {
            for i in view.range.iter() {
                if let Some(id) = ids.get_mut(i) {
                    *id = k;
                }
            }
        }
        self.quantities
            .insert(QuantityId::MaterialId, Quantity::new(Order::Zero, ids));
    }

    /// Appends all particles, materials and attractors of `other`.
    ///
    /// Both storages must hold the same quantities; orders are raised to the larger of the two.
    /// Merging into an empty storage moves `other` in.
    pub fn merge(&mut self, mut other: Storage) -> Result<(), StorageError> {
        if self.is_empty() {
            let mut attractors = std::mem::take(&mut self.attractors);
            attractors.append(&mut other.attractors);
            *self = other;
            self.attractors = attractors;
            return Ok(());
        }
        if other.is_empty() {
            self.attractors.append(&mut other.attractors);
            return Ok(());
        }
        if self.materials.is_empty() != other.materials.is_empty()
            || !self.quantity_ids().eq(other.quantity_ids())
        {
            return Err(StorageError::SchemaMismatch);
        }
        for (id, q) in &self.quantities {
            let o = other.quantity(*id)?;
            if q.kind() != o.kind() {
                return Err(StorageError::WrongType {
                    id: *id,
                    expected: q.kind(),
                    actual: o.kind(),
                });
            }
        }

        let offset = self.particle_count();
        for (id, q) in self.quantities.iter_mut() {
            let o = other.quantity_mut(*id)?;
            let order = q.order().max(o.order());
            q.set_order(order);
            o.set_order(order);
            if !q.append(o) {
                return Err(StorageError::SchemaMismatch);
            }
        }

        let mut materials = std::mem::take(&mut self.materials);
        materials.extend(other.materials.into_iter().map(|view| MaterialView {
            range: view.range.shifted(offset),
            material: view.material,
        }));
        for view in materials {
            if let Some(last) = self.materials.last_mut() {
                if same_material(&last.material, &view.material) && last.range.to == view.range.from {
                    last.range.to = view.range.to;
                    continue;
                }
            }
            self.materials.push(view);
        }
        self.sync_material_ids();
        if self.has(QuantityId::PersistentIndex) {
            self.set_persistent_indices();
        }
        self.attractors.append(&mut other.attractors);
        Ok(())
    }

    /// Copy of the storage; buffers not selected by `flags` are zero-filled.
    pub fn clone_buffers(&self, flags: BufferFlags) -> Storage {
        Storage {
            quantities: self
                .quantities
                .iter()
                .map(|(id, q)| (*id, q.clone_buffers(flags)))
                .collect(),
            materials: self.materials.clone(),
            attractors: self.attractors.clone(),
        }
    }

    /// Swaps the selected buffers of all quantities with `other`.
    pub fn swap(&mut self, other: &mut Storage, flags: BufferFlags) -> Result<(), StorageError> {
        if !self.quantity_ids().eq(other.quantity_ids()) {
            return Err(StorageError::SchemaMismatch);
        }
        let compatible = self.quantities.iter().all(|(id, q)| {
            other
                .quantities
                .get(id)
                .is_some_and(|o| o.kind() == q.kind() && o.order() == q.order())
        });
        if !compatible {
            return Err(StorageError::SchemaMismatch);
        }
        for (id, q) in self.quantities.iter_mut() {
            if let Some(o) = other.quantities.get_mut(id) {
                q.swap_buffers(o, flags);
            }
        }
        Ok(())
    }

    /// Zeroes the highest derivative of every quantity before derivatives are accumulated.
    pub fn zero_highest_derivatives(&mut self) {
        for q in self.quantities.values_mut() {
            q.zero_highest_derivative();
        }
    }

    /// First particle holding a non-finite value in the highest derivative of any quantity.
    pub fn first_non_finite_derivative(&self) -> Option<(QuantityId, usize)> {
        self.quantities
            .iter()
            .filter(|(_, q)| q.order() != Order::Zero)
            .find_map(|(&id, q)| {
                q.buffers()
                    .last()
                    .and_then(Buffer::first_non_finite)
                    .map(|index| (id, index))
            })
    }

    /// Explicit Euler update: `value += dt * dt_value`, `dt_value += dt * d2t_value`.
    pub fn advance(&mut self, dt: Float) {
        for q in self.quantities.values_mut() {
            q.advance(dt);
        }
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn materials(&self) -> &[MaterialView] {
        &self.materials
    }

    pub fn material(&self, index: usize) -> Option<&MaterialView> {
        self.materials.get(index)
    }

    /// Index of the material owning particle `i`.
    pub fn material_of_particle(&self, i: usize) -> Option<usize> {
        let k = self.materials.partition_point(|view| view.range.to <= i);
        self.materials
            .get(k)
            .filter(|view| view.range.contains(i))
            .map(|_| k)
    }

    /// Runs the `create` hook of every material.
    ///
    /// The hooks run on a copy of the storage, which replaces `self` only if all of them succeed.
    pub fn create_materials(&mut self) -> Result<()> {
        let mut staging = self.clone();
        for view in self.materials.clone() {
            view.material.create(&mut staging, view.range)?;
        }
        staging.is_valid()?;
        *self = staging;
        Ok(())
    }

    /// Creates the material fields of a new body and appends it; `self` is unchanged on failure.
    pub fn add_body(&mut self, mut body: Storage) -> Result<()> {
        body.create_materials()?;
        self.merge(body)?;
        Ok(())
    }

    pub fn attractors(&self) -> &[Attractor] {
        &self.attractors
    }

    pub fn attractors_mut(&mut self) -> &mut Vec<Attractor> {
        &mut self.attractors
    }

    pub fn add_attractor(&mut self, attractor: Attractor) {
        self.attractors.push(attractor);
    }

    /// Checks that buffers have equal sizes and materials partition the particles.
    pub fn is_valid(&self) -> Result<(), StorageError> {
        let n = self.particle_count();
        for q in self.quantities.values() {
            if let Some(b) = q.buffers().iter().find(|b| b.len() != n) {
                return Err(StorageError::SizeMismatch {
                    expected: n,
                    actual: b.len(),
                });
            }
        }
        if self.materials.is_empty() || self.quantities.is_empty() {
            return Ok(());
        }
        let mut expected_from = 0;
        for (k, view) in self.materials.iter().enumerate() {
            if view.range.from != expected_from {
                return Err(StorageError::InvalidMaterialRange(format!(
                    "material {k} starts at {}, expected {expected_from}",
                    view.range.from
                )));
            }
            expected_from = view.range.to;
        }
        if expected_from != n {
            return Err(StorageError::InvalidMaterialRange(format!(
                "materials cover {expected_from} of {n} particles"
            )));
        }
        let ids = self.get::<usize>(QuantityId::MaterialId)?;
        for (k, view) in self.materials.iter().enumerate() {
            if let Some(i) = view.range.iter().find(|&i| ids[i] != k) {
                return Err(StorageError::InvalidMaterialRange(format!(
                    "particle {i} has material id {}, expected {k}",
                    ids[i]
                )));
            }
        }
        Ok(())
    }

    /// Appends copies of the given particles at the end of their material ranges.
    ///
    /// Returns the indices of the copies in the resulting storage.
    pub fn duplicate(&mut self, indices: &[usize]) -> Result<Vec<usize>, StorageError> {
        let n = self.particle_count();
        if let Some(&index) = indices.iter().find(|&&i| i >= n) {
            return Err(StorageError::IndexOutOfRange { index, count: n });
        }
        let ranges: Vec<IndexRange> = if self.materials.is_empty() {
            vec![IndexRange::new(0, n)]
        } else {
            self.materials.iter().map(|view| view.range).collect()
        };
        let mut sources = Vec::with_capacity(indices.len());
        let mut positions = Vec::with_capacity(indices.len());
        let mut counts = vec![0_usize; ranges.len()];
        let mut shift = 0;
        for (k, range) in ranges.iter().enumerate() {
            for &i in indices.iter().filter(|&&i| range.contains(i)) {
                positions.push(range.to + shift + counts[k]);
                sources.push(i);
                counts[k] += 1;
            }
            shift += counts[k];
        }
        for q in self.quantities.values_mut() {
            q.duplicate(&sources, &positions);
        }
        if !self.materials.is_empty() {
            let mut shift = 0;
            for (view, count) in self.materials.iter_mut().zip(&counts) {
                view.range = IndexRange::new(view.range.from + shift, view.range.to + shift + count);
                shift += count;
            }
        }
        if self.has(QuantityId::PersistentIndex) {
            let ids = self.get_mut::<usize>(QuantityId::PersistentIndex)?;
            let mut next = ids.iter().copied().max().map_or(0, |m| m + 1);
            for &p in &positions {
                ids[p] = next;
                next += 1;
            }
        }
        Ok(positions)
    }

    /// Bounding box of particle positions (empty if positions are not stored).
    pub fn bounding_box(&self) -> BoundingBox {
        self.get::<Vector>(QuantityId::Position)
            .map(BoundingBox::from_points)
            .unwrap_or_default()
    }

    pub fn total_mass(&self) -> Result<Float, StorageError> {
        Ok(self.get::<Float>(QuantityId::Mass)?.iter().sum())
    }

    pub fn center_of_mass(&self) -> Result<Vector, StorageError> {
        let r = self.get::<Vector>(QuantityId::Position)?;
        let m = self.get::<Float>(QuantityId::Mass)?;
        let total: Float = m.iter().sum();
        if total <= 0.0 {
            return Err(StorageError::EmptyStorage);
        }
        let weighted: Vector = r.iter().zip(m).map(|(r, m)| r.clear_h() * *m).sum();
        Ok(weighted / total)
    }

    /// Assigns persistent indices `0..n` in the current particle order.
    pub fn set_persistent_indices(&mut self) {
        if self.quantities.is_empty() {
            return;
        }
        let ids: Vec<usize> = (0..self.particle_count()).collect();
        self.quantities
            .insert(QuantityId::PersistentIndex, Quantity::new(Order::Zero, ids));
    }

    pub(crate) fn from_parts(
        quantities: BTreeMap<QuantityId, Quantity>,
        materials: Vec<MaterialView>,
        attractors: Vec<Attractor>,
    ) -> Self {
        Self {
            quantities,
            materials,
            attractors,
        }
    }

    pub(crate) fn quantities(&self) -> &BTreeMap<QuantityId, Quantity> {
        &self.quantities
    }
}

impl PartialEq for Storage {
    /// Compares buffers and material ranges; materials are equal if they are the same object.
    fn eq(&self, other: &Self) -> bool {
        self.quantities == other.quantities
            && self.attractors == other.attractors
            && self.materials.len() == other.materials.len()
            && self
                .materials
                .iter()
                .zip(&other.materials)
                .all(|(a, b)| a.range == b.range && same_material(&a.material, &b.material))
    }
}
