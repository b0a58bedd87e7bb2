//! Flat, byte-level representation of a [`Storage`] for persisting simulation state.
//!
//! Every buffer is written as little-endian lanes: floating-point quantities as `f64` lanes,
//! index quantities as `u64`. Materials cannot be serialized, only their ranges are recorded and
//! the caller supplies the material objects when restoring.

use std::collections::BTreeMap;
use std::mem::size_of;
use std::sync::Arc;

use bytemuck::Pod;

use crate::attractor::Attractor;
use crate::error::StorageError;
use crate::geometry::{SymmetricTensor, TracelessTensor, Vector};
use crate::materials::Material;
use crate::math::Float;
use crate::quantity::{Buffer, Order, Quantity, QuantityId, ValueKind};
use crate::storage::{IndexRange, MaterialView, Storage};

/// One quantity: its buffers ordered by derivative, as raw bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantityRecord {
    pub id: QuantityId,
    pub kind: ValueKind,
    pub order: Order,
    /// Number of particles.
    pub len: usize,
    pub buffers: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StorageRecords {
    pub quantities: Vec<QuantityRecord>,
    pub material_ranges: Vec<IndexRange>,
    pub attractors: Vec<Attractor>,
}

/// Size in bytes of one element of the given kind.
pub fn element_size(kind: ValueKind) -> usize {
    match kind {
        ValueKind::Scalar => size_of::<Float>(),
        ValueKind::Vector => size_of::<Vector>(),
        ValueKind::SymmetricTensor => size_of::<SymmetricTensor>(),
        ValueKind::TracelessTensor => size_of::<TracelessTensor>(),
        ValueKind::Index => size_of::<u64>(),
    }
}

fn encode_lanes<T: Pod>(values: &[T]) -> Vec<u8> {
    bytemuck::cast_slice::<T, Float>(values)
        .iter()
        .flat_map(|x| x.to_le_bytes())
        .collect()
}

fn encode(buffer: &Buffer) -> Vec<u8> {
    match buffer {
        Buffer::Scalar(v) => encode_lanes(v),
        Buffer::Vector(v) => encode_lanes(v),
        Buffer::Symmetric(v) => encode_lanes(v),
        Buffer::Traceless(v) => encode_lanes(v),
        Buffer::Index(v) => v.iter().flat_map(|&i| (i as u64).to_le_bytes()).collect(),
    }
}

fn lanes(bytes: &[u8]) -> impl Iterator<Item = [u8; 8]> + '_ {
    bytes.chunks_exact(8).map(|chunk| {
        let mut lane = [0_u8; 8];
        lane.copy_from_slice(chunk);
        lane
    })
}

fn decode_lanes<T: Pod>(bytes: &[u8]) -> Vec<T> {
    let floats: Vec<Float> = lanes(bytes).map(Float::from_le_bytes).collect();
    let mut values = vec![T::zeroed(); bytes.len() / size_of::<T>()];
    bytemuck::cast_slice_mut::<T, Float>(&mut values).copy_from_slice(&floats);
    values
}

fn decode(kind: ValueKind, bytes: &[u8]) -> Buffer {
    match kind {
        ValueKind::Scalar => Buffer::Scalar(decode_lanes(bytes)),
        ValueKind::Vector => Buffer::Vector(decode_lanes(bytes)),
        ValueKind::SymmetricTensor => Buffer::Symmetric(decode_lanes(bytes)),
        ValueKind::TracelessTensor => Buffer::Traceless(decode_lanes(bytes)),
        ValueKind::Index => {
            Buffer::Index(lanes(bytes).map(|l| u64::from_le_bytes(l) as usize).collect())
        }
    }
}

impl QuantityRecord {
    fn into_quantity(self) -> Result<Quantity, StorageError> {
        if self.buffers.len() != self.order.buffer_count() {
            return Err(StorageError::WrongOrder {
                id: self.id,
                requested: self.order,
                actual: Order::from_raw(self.buffers.len().saturating_sub(1)).unwrap_or(Order::Second),
            });
        }
        let mut quantity = Quantity::zeros(self.kind, self.order, self.len);
        let expected = self.len * element_size(self.kind);
        for (k, bytes) in self.buffers.iter().enumerate() {
            if bytes.len() != expected {
                return Err(StorageError::SizeMismatch {
                    expected,
                    actual: bytes.len(),
                });
            }
            let order = Order::from_raw(k).ok_or(StorageError::WrongOrder {
                id: self.id,
                requested: self.order,
                actual: Order::Second,
            })?;
            if let Some(buffer) = quantity.buffer_mut(order) {
                *buffer = decode(self.kind, bytes);
            }
        }
        Ok(quantity)
    }
}

impl Storage {
    /// Flattens the storage into records.
    pub fn to_records(&self) -> StorageRecords {
        let quantities = self
            .quantities()
            .iter()
            .map(|(&id, q)| QuantityRecord {
                id,
                kind: q.kind(),
                order: q.order(),
                len: q.len(),
                buffers: q.buffers().iter().map(encode).collect(),
            })
            .collect();
        StorageRecords {
            quantities,
            material_ranges: self.materials().iter().map(|view| view.range).collect(),
            attractors: self.attractors().to_vec(),
        }
    }

    /// Rebuilds a storage; `materials[k]` is assigned to the `k`-th recorded range.
    pub fn from_records(
        records: StorageRecords,
        materials: &[Arc<dyn Material>],
    ) -> Result<Storage, StorageError> {
        if materials.len() != records.material_ranges.len() {
            return Err(StorageError::InvalidMaterialRange(format!(
                "{} materials supplied for {} ranges",
                materials.len(),
                records.material_ranges.len()
            )));
        }
        let mut quantities = BTreeMap::new();
        for record in records.quantities {
            let id = record.id;
            if quantities.insert(id, record.into_quantity()?).is_some() {
                return Err(StorageError::DuplicateQuantity(id));
            }
        }
        let views = materials
            .iter()
            .zip(records.material_ranges)
            .map(|(material, range)| MaterialView {
                material: Arc::clone(material),
                range,
            })
            .collect();
        let storage = Storage::from_parts(quantities, views, records.attractors);
        storage.is_valid()?;
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::NullMaterial;

    fn sample() -> Storage {
        let mut storage = Storage::with_material(Arc::new(NullMaterial::default()));
        storage
            .insert_values(
                QuantityId::Position,
                Order::Second,
                vec![Vector::with_h(1.0, -2.0, 3.5, 0.1), Vector::with_h(0.0, 4.0, 1e-8, 0.2)],
            )
            .unwrap();
        storage.insert(QuantityId::Mass, Order::Zero, 2.5).unwrap();
        storage
            .insert(QuantityId::NeighborCount, Order::Zero, 7_usize)
            .unwrap();
        storage
    }

    #[test]
    fn test_records_restore_storage() {
        let storage = sample();
        let materials: Vec<Arc<dyn Material>> =
            storage.materials().iter().map(|v| Arc::clone(&v.material)).collect();
        let restored = Storage::from_records(storage.to_records(), &materials).unwrap();
        assert_eq!(restored, storage, "restored storage should equal the original");
    }

    #[test]
    fn test_records_are_little_endian() {
        let records = sample().to_records();
        let mass = records
            .quantities
            .iter()
            .find(|r| r.id == QuantityId::Mass)
            .unwrap();
        assert_eq!(mass.buffers.len(), 1);
        assert_eq!(&mass.buffers[0][..8], &2.5_f64.to_le_bytes());
    }

    #[test]
    fn test_truncated_buffer_is_rejected() {
        let storage = sample();
        let mut records = storage.to_records();
        records.quantities[0].buffers[0].pop();
        let materials: Vec<Arc<dyn Material>> = vec![Arc::new(NullMaterial::default())];
        assert!(matches!(
            Storage::from_records(records, &materials),
            Err(StorageError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_material_count_must_match_ranges() {
        let records = sample().to_records();
        assert!(matches!(
            Storage::from_records(records, &[]),
            Err(StorageError::InvalidMaterialRange(_))
        ));
    }
}
