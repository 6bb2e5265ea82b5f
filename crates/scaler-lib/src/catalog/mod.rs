//! Machine-type catalog
//!
//! Resolves tier identifiers to their CPU and memory shape and walks to the
//! next larger or smaller tier within the same family. Three kinds of tier
//! are understood:
//! - statically registered shared-core, N1, N2 and E2 tiers
//! - `db-custom-<vcpu>-<memory-mb>` tiers synthesized from their name
//! - `db-perf-optimized-N-<vcpu>` tiers from a fixed size sequence

mod custom;
mod perf;
mod registry;

pub use custom::{CustomShape, MAX_CUSTOM_CPU, MAX_CUSTOM_MEMORY_MB};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Hardware family of a machine type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    F1,
    G1,
    N1,
    N2,
    E2,
    Custom,
    PerfOptimized,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::F1 => "f1",
            Family::G1 => "g1",
            Family::N1 => "n1",
            Family::N2 => "n2",
            Family::E2 => "e2",
            Family::Custom => "custom",
            Family::PerfOptimized => "perf-optimized",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "f1" => Some(Family::F1),
            "g1" => Some(Family::G1),
            "n1" => Some(Family::N1),
            "n2" => Some(Family::N2),
            "e2" => Some(Family::E2),
            "custom" => Some(Family::Custom),
            "perf-optimized" | "perf_optimized" => Some(Family::PerfOptimized),
            _ => None,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory-to-CPU class of a machine type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Micro,
    Small,
    Standard,
    HighMem,
}

impl SizeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Micro => "micro",
            SizeClass::Small => "small",
            SizeClass::Standard => "standard",
            SizeClass::HighMem => "highmem",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of one machine tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineType {
    pub name: String,
    pub cpu: u32,
    pub memory_gb: f64,
    pub family: Family,
    pub size_class: SizeClass,
}

impl MachineType {
    pub fn memory_per_cpu_gb(&self) -> f64 {
        if self.cpu == 0 {
            return 0.0;
        }
        self.memory_gb / self.cpu as f64
    }

    /// Whether `other` strictly exceeds this type in both CPU and memory
    pub fn is_strictly_smaller_than(&self, other: &MachineType) -> bool {
        other.cpu > self.cpu && other.memory_gb > self.memory_gb
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("machine type {0} not found")]
    NotFound(String),

    #[error("invalid custom machine type {name}: {reason}")]
    InvalidCustomTier { name: String, reason: String },

    #[error("no larger machine type available for {0}")]
    NoLargerAvailable(String),

    #[error("no smaller machine type available for {0}")]
    NoSmallerAvailable(String),
}

/// Resolve a tier identifier to its machine type.
pub fn lookup(name: &str) -> Result<MachineType, CatalogError> {
    if let Some(machine) = registry::get(name) {
        return Ok(machine.clone());
    }
    if let Some(shape) = CustomShape::parse(name)? {
        return Ok(shape.to_machine_type());
    }
    if let Some(index) = perf::position(name) {
        return Ok(perf::machine_type(index));
    }
    Err(CatalogError::NotFound(name.to_string()))
}

/// Smallest tier in the same family that is strictly larger in both
/// CPU and memory.
pub fn next_larger(name: &str) -> Result<String, CatalogError> {
    if let Some(current) = registry::get(name) {
        return registry::next_larger(current)
            .map(|m| m.name.clone())
            .ok_or_else(|| CatalogError::NoLargerAvailable(name.to_string()));
    }
    if let Some(shape) = CustomShape::parse(name)? {
        return shape
            .grow()
            .map(|s| s.name())
            .ok_or_else(|| CatalogError::NoLargerAvailable(name.to_string()));
    }
    if let Some(index) = perf::position(name) {
        return perf::step_up(index)
            .map(perf::name)
            .ok_or_else(|| CatalogError::NoLargerAvailable(name.to_string()));
    }
    Err(CatalogError::NotFound(name.to_string()))
}

/// Largest tier in the same family that is strictly smaller in both
/// CPU and memory.
pub fn next_smaller(name: &str) -> Result<String, CatalogError> {
    if let Some(current) = registry::get(name) {
        return registry::next_smaller(current)
            .map(|m| m.name.clone())
            .ok_or_else(|| CatalogError::NoSmallerAvailable(name.to_string()));
    }
    if let Some(shape) = CustomShape::parse(name)? {
        return shape
            .shrink()
            .map(|s| s.name())
            .ok_or_else(|| CatalogError::NoSmallerAvailable(name.to_string()));
    }
    if let Some(index) = perf::position(name) {
        return perf::step_down(index)
            .map(perf::name)
            .ok_or_else(|| CatalogError::NoSmallerAvailable(name.to_string()));
    }
    Err(CatalogError::NotFound(name.to_string()))
}

/// Every enumerable tier: the static registry followed by the
/// performance-optimized sequence. Custom tiers are synthesized on demand
/// and are not listed.
pub fn all() -> Vec<MachineType> {
    let mut machines: Vec<MachineType> = registry::entries().cloned().collect();
    machines.extend(perf::all());
    machines
}
