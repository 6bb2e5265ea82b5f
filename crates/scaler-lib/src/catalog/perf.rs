use super::{Family, MachineType, SizeClass};

const PERF_PREFIX: &str = "db-perf-optimized-N-";
const SIZES: [u32; 10] = [2, 4, 8, 16, 32, 48, 64, 80, 96, 128];
const MEMORY_PER_CPU_GB: f64 = 8.0;
const MAX_MEMORY_GB: f64 = 864.0;

/// Index of a performance-optimized tier in the size sequence
pub(super) fn position(name: &str) -> Option<usize> {
    let cpu = name.strip_prefix(PERF_PREFIX)?.parse::<u32>().ok()?;
    SIZES.iter().position(|&size| size == cpu)
}

pub(super) fn name(index: usize) -> String {
    format!("{PERF_PREFIX}{}", SIZES[index])
}

pub(super) fn machine_type(index: usize) -> MachineType {
    let cpu = SIZES[index];
    MachineType {
        name: name(index),
        cpu,
        memory_gb: (cpu as f64 * MEMORY_PER_CPU_GB).min(MAX_MEMORY_GB),
        family: Family::PerfOptimized,
        size_class: SizeClass::HighMem,
    }
}

pub(super) fn step_up(index: usize) -> Option<usize> {
    (index + 1 < SIZES.len()).then_some(index + 1)
}

pub(super) fn step_down(index: usize) -> Option<usize> {
    index.checked_sub(1)
}

pub(super) fn all() -> impl Iterator<Item = MachineType> {
    (0..SIZES.len()).map(machine_type)
}
