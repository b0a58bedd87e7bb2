use crate::geometry::{SymmetricTensor, TracelessTensor, Vector};
use crate::math::Float;

/// Identifiers of the quantities a [`Storage`](crate::storage::Storage) can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum QuantityId {
    /// Positions with smoothing lengths in the `H` lane; usually second order.
    Position = 0,
    Mass = 1,
    Density = 2,
    /// Specific internal energy.
    Energy = 3,
    Pressure = 4,
    SoundSpeed = 5,
    DeviatoricStress = 6,
    Damage = 7,
    VelocityDivergence = 8,
    VelocityGradient = 9,
    /// Spin of solid spheres after handoff.
    AngularFrequency = 10,
    NeighborCount = 11,
    Flag = 12,
    /// Index of the material owning the particle, kept in sync with the material ranges.
    MaterialId = 13,
    /// Particle index that survives removals; renumbered on merge.
    PersistentIndex = 14,
    Temperature = 15,
}

/// Number of time derivatives stored alongside the values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Order {
    Zero = 0,
    First = 1,
    Second = 2,
}

impl Order {
    #[inline]
    pub fn buffer_count(self) -> usize {
        self as usize + 1
    }

    pub fn from_raw(raw: usize) -> Option<Self> {
        match raw {
            0 => Some(Order::Zero),
            1 => Some(Order::First),
            2 => Some(Order::Second),
            _ => None,
        }
    }
}

/// Element type of a quantity buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Scalar = 0,
    Vector = 1,
    SymmetricTensor = 2,
    TracelessTensor = 3,
    Index = 4,
}

bitflags::bitflags! {
    /// Selects buffers of a quantity by derivative order.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BufferFlags: u32 {
        const VALUES = 1;
        const FIRST_DERIVATIVES = 2;
        const SECOND_DERIVATIVES = 4;
        const ALL = 7;
    }
}

impl BufferFlags {
    fn selects(&self, order: usize) -> bool {
        self.bits() & (1 << order) != 0
    }
}

/// Type-erased particle buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum Buffer {
    Scalar(Vec<Float>),
    Vector(Vec<Vector>),
    Symmetric(Vec<SymmetricTensor>),
    Traceless(Vec<TracelessTensor>),
    Index(Vec<usize>),
}

macro_rules! for_each_kind {
    ($buffer:expr, $v:ident => $body:expr) => {
        match $buffer {
            Buffer::Scalar($v) => $body,
            Buffer::Vector($v) => $body,
            Buffer::Symmetric($v) => $body,
            Buffer::Traceless($v) => $body,
            Buffer::Index($v) => $body,
        }
    };
}

macro_rules! for_each_pair {
    ($a:expr, $b:expr, $x:ident, $y:ident => $body:expr, $mismatch:expr) => {
        match ($a, $b) {
            (Buffer::Scalar($x), Buffer::Scalar($y)) => $body,
            (Buffer::Vector($x), Buffer::Vector($y)) => $body,
            (Buffer::Symmetric($x), Buffer::Symmetric($y)) => $body,
            (Buffer::Traceless($x), Buffer::Traceless($y)) => $body,
            (Buffer::Index($x), Buffer::Index($y)) => $body,
            _ => $mismatch,
        }
    };
}

impl Buffer {
    pub fn zeros(kind: ValueKind, len: usize) -> Self {
        match kind {
            ValueKind::Scalar => Buffer::Scalar(vec![0.0; len]),
            ValueKind::Vector => Buffer::Vector(vec![Vector::ZERO; len]),
            ValueKind::SymmetricTensor => Buffer::Symmetric(vec![SymmetricTensor::ZERO; len]),
            ValueKind::TracelessTensor => Buffer::Traceless(vec![TracelessTensor::ZERO; len]),
            ValueKind::Index => Buffer::Index(vec![0; len]),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Buffer::Scalar(_) => ValueKind::Scalar,
            Buffer::Vector(_) => ValueKind::Vector,
            Buffer::Symmetric(_) => ValueKind::SymmetricTensor,
            Buffer::Traceless(_) => ValueKind::TracelessTensor,
            Buffer::Index(_) => ValueKind::Index,
        }
    }

    pub fn len(&self) -> usize {
        for_each_kind!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sets every element to zero without changing the length.
    pub fn fill_zero(&mut self) {
        let len = self.len();
        *self = Buffer::zeros(self.kind(), len);
    }

    /// Removes elements at the given ascending, unique indices.
    pub(crate) fn remove_sorted(&mut self, indices: &[usize]) {
        for_each_kind!(self, v => remove_sorted(v, indices))
    }

    /// Appends the elements of `other`; both buffers must hold the same kind.
    pub(crate) fn append(&mut self, other: &mut Buffer) -> bool {
        for_each_pair!(self, other, a, b => { a.append(b); true }, false)
    }

    /// Inserts copies of the given elements at `positions` (ascending, in the resulting buffer).
    pub(crate) fn duplicate(&mut self, sources: &[usize], positions: &[usize]) {
        for_each_kind!(self, v => duplicate(v, sources, positions))
    }

    /// `self += dt * derivative`; index buffers are left untouched.
    pub(crate) fn add_scaled(&mut self, derivative: &Buffer, dt: Float) {
        match (self, derivative) {
            (Buffer::Scalar(a), Buffer::Scalar(b)) => {
                a.iter_mut().zip(b).for_each(|(a, b)| *a += b * dt)
            }
            (Buffer::Vector(a), Buffer::Vector(b)) => {
                a.iter_mut().zip(b).for_each(|(a, b)| *a += *b * dt)
            }
            (Buffer::Symmetric(a), Buffer::Symmetric(b)) => {
                a.iter_mut().zip(b).for_each(|(a, b)| *a += *b * dt)
            }
            (Buffer::Traceless(a), Buffer::Traceless(b)) => {
                a.iter_mut().zip(b).for_each(|(a, b)| *a += *b * dt)
            }
            _ => {}
        }
    }

    /// Index of the first element that is not finite.
    pub fn first_non_finite(&self) -> Option<usize> {
        match self {
            Buffer::Scalar(v) => v.iter().position(|x| !x.is_finite()),
            Buffer::Vector(v) => v.iter().position(|x| !x.is_finite()),
            Buffer::Symmetric(v) => v.iter().position(|x| !x.is_finite()),
            Buffer::Traceless(v) => v.iter().position(|x| !x.is_finite()),
            Buffer::Index(_) => None,
        }
    }
}

fn remove_sorted<T: Copy>(values: &mut Vec<T>, indices: &[usize]) {
    if indices.is_empty() {
        return;
    }
    let mut next = 0;
    let mut write = 0;
    for read in 0..values.len() {
        if next < indices.len() && indices[next] == read {
            next += 1;
            continue;
        }
        values[write] = values[read];
        write += 1;
    }
    values.truncate(write);
}

fn duplicate<T: Copy>(values: &mut Vec<T>, sources: &[usize], positions: &[usize]) {
    let copies: Vec<T> = sources.iter().map(|&i| values[i]).collect();
    for (value, &position) in copies.into_iter().zip(positions) {
        values.insert(position, value);
    }
}

/// Element types that can be stored in a quantity.
pub trait QuantityValue: Copy + Default + Send + Sync + 'static {
    const KIND: ValueKind;

    fn into_buffer(values: Vec<Self>) -> Buffer;

    fn view(buffer: &Buffer) -> Option<&[Self]>;

    fn view_mut(buffer: &mut Buffer) -> Option<&mut [Self]>;
}

macro_rules! impl_quantity_value {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl QuantityValue for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            fn into_buffer(values: Vec<Self>) -> Buffer {
                Buffer::$variant(values)
            }

            fn view(buffer: &Buffer) -> Option<&[Self]> {
                match buffer {
                    Buffer::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn view_mut(buffer: &mut Buffer) -> Option<&mut [Self]> {
                match buffer {
                    Buffer::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }
        }
    };
}

impl_quantity_value!(Float, Scalar, Scalar);
impl_quantity_value!(Vector, Vector, Vector);
impl_quantity_value!(SymmetricTensor, SymmetricTensor, Symmetric);
impl_quantity_value!(TracelessTensor, TracelessTensor, Traceless);
impl_quantity_value!(usize, Index, Index);

/// Values of one quantity together with up to two time derivatives.
///
/// All buffers have the same length; `buffers[k]` holds the `k`-th derivative.
#[derive(Clone, Debug, PartialEq)]
pub struct Quantity {
    order: Order,
    buffers: Vec<Buffer>,
}

impl Quantity {
    /// Quantity holding `values`, derivatives initialized to zero.
    pub fn new<T: QuantityValue>(order: Order, values: Vec<T>) -> Self {
        let len = values.len();
        let mut buffers = vec![T::into_buffer(values)];
        for _ in 0..order as usize {
            buffers.push(Buffer::zeros(T::KIND, len));
        }
        Self { order, buffers }
    }

    /// Quantity of the given kind filled with zeros.
    pub fn zeros(kind: ValueKind, order: Order, len: usize) -> Self {
        Self {
            order,
            buffers: (0..order.buffer_count())
                .map(|_| Buffer::zeros(kind, len))
                .collect(),
        }
    }

    #[inline]
    pub fn order(&self) -> Order {
        self.order
    }

    #[inline]
    pub fn kind(&self) -> ValueKind {
        self.buffers[0].kind()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn buffer(&self, order: Order) -> Option<&Buffer> {
        self.buffers.get(order as usize)
    }

    #[inline]
    pub fn buffer_mut(&mut self, order: Order) -> Option<&mut Buffer> {
        self.buffers.get_mut(order as usize)
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    pub(crate) fn buffers_mut(&mut self) -> &mut [Buffer] {
        &mut self.buffers
    }

    /// Typed view of the `order`-th buffer, `None` on type or order mismatch.
    pub fn values<T: QuantityValue>(&self, order: Order) -> Option<&[T]> {
        self.buffer(order).and_then(T::view)
    }

    pub fn values_mut<T: QuantityValue>(&mut self, order: Order) -> Option<&mut [T]> {
        self.buffer_mut(order).and_then(T::view_mut)
    }

    /// Raises the order, appending zero-filled derivative buffers. Never lowers it.
    pub fn set_order(&mut self, order: Order) {
        let (kind, len) = (self.kind(), self.len());
        while self.buffers.len() < order.buffer_count() {
            self.buffers.push(Buffer::zeros(kind, len));
        }
        self.order = self.order.max(order);
    }

    /// Copy of the quantity; buffers not selected by `flags` are zero-filled.
    pub fn clone_buffers(&self, flags: BufferFlags) -> Self {
        let buffers = self
            .buffers
            .iter()
            .enumerate()
            .map(|(k, b)| {
                if flags.selects(k) {
                    b.clone()
                } else {
                    Buffer::zeros(b.kind(), b.len())
                }
            })
            .collect();
        Self {
            order: self.order,
            buffers,
        }
    }

    /// Swaps the selected buffers with `other`; returns false if the quantities are incompatible.
    pub fn swap_buffers(&mut self, other: &mut Quantity, flags: BufferFlags) -> bool {
        if self.kind() != other.kind() || self.order != other.order {
            return false;
        }
        for (k, (a, b)) in self.buffers.iter_mut().zip(&mut other.buffers).enumerate() {
            if flags.selects(k) {
                std::mem::swap(a, b);
            }
        }
        true
    }

    /// Zeroes the highest derivative; a zero-order quantity has none.
    pub fn zero_highest_derivative(&mut self) {
        if self.order != Order::Zero {
            if let Some(last) = self.buffers.last_mut() {
                last.fill_zero();
            }
        }
    }

    /// Explicit Euler update of values and first derivatives.
    pub fn advance(&mut self, dt: Float) {
        match self.order {
            Order::Zero => {}
            Order::First => {
                let (value, rest) = self.buffers.split_at_mut(1);
                value[0].add_scaled(&rest[0], dt);
            }
            Order::Second => {
                let (value, rest) = self.buffers.split_at_mut(1);
                let (first, second) = rest.split_at_mut(1);
                value[0].add_scaled(&first[0], dt);
                first[0].add_scaled(&second[0], dt);
            }
        }
    }

    pub(crate) fn remove_sorted(&mut self, indices: &[usize]) {
        for buffer in &mut self.buffers {
            buffer.remove_sorted(indices);
        }
    }

    pub(crate) fn duplicate(&mut self, sources: &[usize], positions: &[usize]) {
        for buffer in &mut self.buffers {
            buffer.duplicate(sources, positions);
        }
    }

    /// Moves the buffers of `other` to the end of this quantity; orders must match.
    pub(crate) fn append(&mut self, other: &mut Quantity) -> bool {
        if self.order != other.order || self.kind() != other.kind() {
            return false;
        }
        self.buffers
            .iter_mut()
            .zip(&mut other.buffers)
            .all(|(a, b)| a.append(b))
    }
}
