use super::{CatalogError, Family, MachineType, SizeClass};

const CUSTOM_PREFIX: &str = "db-custom-";

/// Allowed memory-per-vCPU band for custom shapes, GB
const MIN_MEMORY_PER_CPU_GB: f64 = 0.9;
const MAX_MEMORY_PER_CPU_GB: f64 = 6.5;

/// Above this memory-per-vCPU ratio a custom shape counts as high-memory
const HIGHMEM_RATIO_GB: f64 = 4.0;

pub const MAX_CUSTOM_CPU: u32 = 96;
pub const MAX_CUSTOM_MEMORY_MB: u32 = 624 * 1024;

const MEMORY_GRANULARITY_MB: u32 = 256;
const MIN_SHRINK_MEMORY_MB: u32 = 1024;
const FALLBACK_GROWTH_MB: u32 = 1024;

/// CPU and memory of a `db-custom-<vcpu>-<memory-mb>` tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomShape {
    pub cpu: u32,
    pub memory_mb: u32,
}

impl CustomShape {
    /// Parse a custom tier name.
    ///
    /// Returns `Ok(None)` when the name is not a custom tier at all, and an
    /// error when it is one but the shape is outside the allowed band.
    pub fn parse(name: &str) -> Result<Option<Self>, CatalogError> {
        let Some(rest) = name.strip_prefix(CUSTOM_PREFIX) else {
            return Ok(None);
        };
        let Some((cpu, memory)) = rest.split_once('-') else {
            return Ok(None);
        };
        let (Ok(cpu), Ok(memory_mb)) = (cpu.parse::<u32>(), memory.parse::<u32>()) else {
            return Ok(None);
        };

        let invalid = |reason: String| CatalogError::InvalidCustomTier {
            name: name.to_string(),
            reason,
        };

        if cpu == 0 {
            return Err(invalid("at least one vCPU is required".to_string()));
        }
        if cpu > MAX_CUSTOM_CPU {
            return Err(invalid(format!("at most {MAX_CUSTOM_CPU} vCPUs are allowed")));
        }
        if memory_mb > MAX_CUSTOM_MEMORY_MB {
            return Err(invalid(format!("at most {MAX_CUSTOM_MEMORY_MB} MB of memory is allowed")));
        }

        let shape = Self { cpu, memory_mb };
        let ratio = shape.memory_per_cpu_gb();
        if !(MIN_MEMORY_PER_CPU_GB..=MAX_MEMORY_PER_CPU_GB).contains(&ratio) {
            return Err(invalid(format!(
                "{ratio:.2} GB per vCPU is outside {MIN_MEMORY_PER_CPU_GB}-{MAX_MEMORY_PER_CPU_GB}"
            )));
        }

        Ok(Some(shape))
    }

    pub fn name(&self) -> String {
        format!("{CUSTOM_PREFIX}{}-{}", self.cpu, self.memory_mb)
    }

    pub fn memory_gb(&self) -> f64 {
        self.memory_mb as f64 / 1024.0
    }

    pub fn memory_per_cpu_gb(&self) -> f64 {
        self.memory_gb() / self.cpu as f64
    }

    pub fn to_machine_type(&self) -> MachineType {
        let size_class = if self.memory_per_cpu_gb() > HIGHMEM_RATIO_GB {
            SizeClass::HighMem
        } else {
            SizeClass::Standard
        };
        MachineType {
            name: self.name(),
            cpu: self.cpu,
            memory_gb: self.memory_gb(),
            family: Family::Custom,
            size_class,
        }
    }

    /// Next larger shape.
    ///
    /// Memory-heavy shapes grow CPU by half, the rest grow memory by half.
    /// If that hits a cap, one vCPU and 1 GB are added instead. `None` when
    /// no growth is possible.
    pub fn grow(&self) -> Option<Self> {
        let mut cpu = self.cpu;
        let mut memory_mb = self.memory_mb;

        if self.memory_per_cpu_gb() > HIGHMEM_RATIO_GB {
            cpu = (cpu + cpu.div_ceil(2)).min(MAX_CUSTOM_CPU);
        } else {
            memory_mb = memory_mb.saturating_add(memory_mb / 2).min(MAX_CUSTOM_MEMORY_MB);
        }

        if cpu == self.cpu && memory_mb == self.memory_mb {
            cpu = (cpu + 1).min(MAX_CUSTOM_CPU);
            memory_mb = memory_mb
                .saturating_add(FALLBACK_GROWTH_MB)
                .min(MAX_CUSTOM_MEMORY_MB);
        }

        let grown = Self::normalized(cpu, memory_mb);
        (grown != *self).then_some(grown)
    }

    /// Next smaller shape: roughly two thirds of CPU and memory, never
    /// below one vCPU or 1 GB. `None` when no reduction is possible.
    pub fn shrink(&self) -> Option<Self> {
        let cpu = ((self.cpu * 2 + 1) / 3).max(1);
        let memory_mb = (self.memory_mb / 3 * 2).max(MIN_SHRINK_MEMORY_MB);

        let shrunk = Self::normalized(cpu, memory_mb);
        (shrunk != *self).then_some(shrunk)
    }

    /// Clamp memory into the allowed band for `cpu` and round it to the
    /// 256 MB granularity, staying inside the band.
    fn normalized(cpu: u32, memory_mb: u32) -> Self {
        let cpu = cpu.clamp(1, MAX_CUSTOM_CPU);
        let min_mb = MIN_MEMORY_PER_CPU_GB * 1024.0 * cpu as f64;
        let max_mb = (MAX_MEMORY_PER_CPU_GB * 1024.0 * cpu as f64).min(MAX_CUSTOM_MEMORY_MB as f64);
        let step = MEMORY_GRANULARITY_MB as f64;

        let clamped = (memory_mb as f64).clamp(min_mb, max_mb);
        let mut rounded = (clamped / step).round() * step;
        if rounded < min_mb {
            rounded = (min_mb / step).ceil() * step;
        }
        if rounded > max_mb {
            rounded = (max_mb / step).floor() * step;
        }

        Self {
            cpu,
            memory_mb: rounded as u32,
        }
    }
}
