use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;

use crate::error::SettingsError;
use crate::geometry::Vector;
use crate::kernel::KernelKind;
use crate::math::{Float, Interval};

/// Value stored in a [`Settings`] map.
#[derive(Clone, Debug, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(Float),
    Vector(Vector),
    Interval(Interval),
    String(String),
    Path(PathBuf),
    /// Discriminant of an enumeration such as [`EosKind`].
    Enum(i64),
    Flags(u32),
}

impl SettingValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            SettingValue::Bool(_) => "bool",
            SettingValue::Int(_) => "int",
            SettingValue::Float(_) => "float",
            SettingValue::Vector(_) => "vector",
            SettingValue::Interval(_) => "interval",
            SettingValue::String(_) => "string",
            SettingValue::Path(_) => "path",
            SettingValue::Enum(_) => "enum",
            SettingValue::Flags(_) => "flags",
        }
    }
}

/// Types that can be read from and written to a [`SettingValue`].
pub trait SettingType: Sized {
    const NAME: &'static str;

    fn from_value(value: &SettingValue) -> Option<Self>;

    fn into_value(self) -> SettingValue;
}

macro_rules! impl_setting_type {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl SettingType for $ty {
            const NAME: &'static str = $name;

            fn from_value(value: &SettingValue) -> Option<Self> {
                match value {
                    SettingValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn into_value(self) -> SettingValue {
                SettingValue::$variant(self)
            }
        }
    };
}

impl_setting_type!(bool, Bool, "bool");
impl_setting_type!(i64, Int, "int");
impl_setting_type!(Vector, Vector, "vector");
impl_setting_type!(Interval, Interval, "interval");
impl_setting_type!(String, String, "string");
impl_setting_type!(PathBuf, Path, "path");

impl SettingType for Float {
    const NAME: &'static str = "float";

    // integers are accepted where a float is requested
    fn from_value(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Float(v) => Some(*v),
            SettingValue::Int(v) => Some(*v as Float),
            _ => None,
        }
    }

    fn into_value(self) -> SettingValue {
        SettingValue::Float(self)
    }
}

/// Enumerations stored as [`SettingValue::Enum`].
pub trait SettingEnum: Copy {
    fn to_raw(self) -> i64;

    fn from_raw(raw: i64) -> Option<Self>;
}

/// Opaque map of configuration values keyed by an enumerated id.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings<Id: Ord> {
    entries: BTreeMap<Id, SettingValue>,
}

impl<Id: Ord> Default for Settings<Id> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<Id: Copy + Ord + Debug> Settings<Id> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set<T: SettingType>(&mut self, id: Id, value: T) -> &mut Self {
        self.entries.insert(id, value.into_value());
        self
    }

    pub fn set_enum<E: SettingEnum>(&mut self, id: Id, value: E) -> &mut Self {
        self.entries.insert(id, SettingValue::Enum(value.to_raw()));
        self
    }

    pub fn set_flags(&mut self, id: Id, flags: u32) -> &mut Self {
        self.entries.insert(id, SettingValue::Flags(flags));
        self
    }

    pub fn get<T: SettingType>(&self, id: Id) -> Result<T, SettingsError> {
        let value = self.value(id)?;
        T::from_value(value).ok_or_else(|| SettingsError::WrongType {
            name: format!("{id:?}"),
            expected: T::NAME,
            actual: value.type_name(),
        })
    }

    pub fn get_enum<E: SettingEnum>(&self, id: Id) -> Result<E, SettingsError> {
        let value = self.value(id)?;
        match value {
            SettingValue::Enum(raw) => E::from_raw(*raw),
            _ => None,
        }
        .ok_or_else(|| SettingsError::WrongType {
            name: format!("{id:?}"),
            expected: "enum",
            actual: value.type_name(),
        })
    }

    pub fn get_flags(&self, id: Id) -> Result<u32, SettingsError> {
        match self.value(id)? {
            SettingValue::Flags(flags) => Ok(*flags),
            other => Err(SettingsError::WrongType {
                name: format!("{id:?}"),
                expected: "flags",
                actual: other.type_name(),
            }),
        }
    }

    pub fn value(&self, id: Id) -> Result<&SettingValue, SettingsError> {
        self.entries
            .get(&id)
            .ok_or_else(|| SettingsError::Missing(format!("{id:?}")))
    }

    pub fn has(&self, id: Id) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn remove(&mut self, id: Id) -> Option<SettingValue> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &SettingValue)> {
        self.entries.iter()
    }

    /// Overwrites entries of `self` with all entries of `other`.
    pub fn extend(&mut self, other: &Settings<Id>) {
        for (id, value) in other.iter() {
            self.entries.insert(*id, value.clone());
        }
    }
}

/// Equation of state selected for a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EosKind {
    None = 0,
    IdealGas = 1,
    Tillotson = 2,
}

impl SettingEnum for EosKind {
    fn to_raw(self) -> i64 {
        self as i64
    }

    fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(EosKind::None),
            1 => Some(EosKind::IdealGas),
            2 => Some(EosKind::Tillotson),
            _ => None,
        }
    }
}

/// Parameters of a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BodySettingsId {
    Eos,
    AdiabaticIndex,
    TillotsonSmallA,
    TillotsonSmallB,
    TillotsonAlpha,
    TillotsonBeta,
    TillotsonNonlinearB,
    /// Specific energy of sublimation; particles above it are removed at handoff.
    TillotsonSublimation,
    TillotsonEnergyIv,
    TillotsonEnergyCv,
    Density,
    DensityRange,
    Energy,
    EnergyRange,
    Damage,
    BulkModulus,
    ShearModulus,
    HeatCapacity,
    ParticleCount,
    SmoothingLengthEta,
}

pub type BodySettings = Settings<BodySettingsId>;

impl BodySettings {
    /// Default material parameters; the numeric values describe basalt.
    pub fn defaults() -> Self {
        let mut settings = Self::empty();
        settings
            .set_enum(BodySettingsId::Eos, EosKind::Tillotson)
            .set(BodySettingsId::AdiabaticIndex, 1.4)
            .set(BodySettingsId::TillotsonSmallA, 0.5)
            .set(BodySettingsId::TillotsonSmallB, 1.5)
            .set(BodySettingsId::TillotsonAlpha, 5.0)
            .set(BodySettingsId::TillotsonBeta, 5.0)
            .set(BodySettingsId::TillotsonNonlinearB, 2.67e10)
            .set(BodySettingsId::TillotsonSublimation, 4.87e8)
            .set(BodySettingsId::TillotsonEnergyIv, 4.72e6)
            .set(BodySettingsId::TillotsonEnergyCv, 1.82e7)
            .set(BodySettingsId::Density, 2700.0)
            .set(BodySettingsId::DensityRange, Interval::new(50.0, Float::INFINITY))
            .set(BodySettingsId::Energy, 0.0)
            .set(BodySettingsId::EnergyRange, Interval::new(0.0, Float::INFINITY))
            .set(BodySettingsId::Damage, 0.0)
            .set(BodySettingsId::BulkModulus, 2.67e10)
            .set(BodySettingsId::ShearModulus, 2.27e10)
            .set(BodySettingsId::HeatCapacity, 700.0)
            .set(BodySettingsId::ParticleCount, 10_000_i64)
            .set(BodySettingsId::SmoothingLengthEta, 1.3);
        settings
    }
}

impl SettingEnum for KernelKind {
    fn to_raw(self) -> i64 {
        match self {
            KernelKind::CubicSpline => 0,
            KernelKind::WendlandC2 => 1,
            KernelKind::Gaussian => 2,
        }
    }

    fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(KernelKind::CubicSpline),
            1 => Some(KernelKind::WendlandC2),
            2 => Some(KernelKind::Gaussian),
            _ => None,
        }
    }
}

/// Global run parameters that are not tied to a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunSettingsId {
    /// [`KernelKind`] of the solver.
    Kernel,
    FinderLeafSize,
    GravityConstant,
    ArtificialViscosityAlpha,
    ArtificialViscosityBeta,
}

pub type RunSettings = Settings<RunSettingsId>;
