use super::{Family, MachineType, SizeClass};
use std::collections::BTreeMap;
use std::sync::OnceLock;

type Entry = (&'static str, u32, f64, Family, SizeClass);

const MACHINE_TYPES: &[Entry] = &[
    // Shared core
    ("db-f1-micro", 1, 0.6, Family::F1, SizeClass::Micro),
    ("db-g1-small", 1, 1.7, Family::G1, SizeClass::Small),
    // N1 standard
    ("db-n1-standard-1", 1, 3.75, Family::N1, SizeClass::Standard),
    ("db-n1-standard-2", 2, 7.5, Family::N1, SizeClass::Standard),
    ("db-n1-standard-4", 4, 15.0, Family::N1, SizeClass::Standard),
    ("db-n1-standard-8", 8, 30.0, Family::N1, SizeClass::Standard),
    ("db-n1-standard-16", 16, 60.0, Family::N1, SizeClass::Standard),
    ("db-n1-standard-32", 32, 120.0, Family::N1, SizeClass::Standard),
    ("db-n1-standard-64", 64, 240.0, Family::N1, SizeClass::Standard),
    ("db-n1-standard-96", 96, 360.0, Family::N1, SizeClass::Standard),
    // N1 high memory
    ("db-n1-highmem-2", 2, 13.0, Family::N1, SizeClass::HighMem),
    ("db-n1-highmem-4", 4, 26.0, Family::N1, SizeClass::HighMem),
    ("db-n1-highmem-8", 8, 52.0, Family::N1, SizeClass::HighMem),
    ("db-n1-highmem-16", 16, 104.0, Family::N1, SizeClass::HighMem),
    ("db-n1-highmem-32", 32, 208.0, Family::N1, SizeClass::HighMem),
    ("db-n1-highmem-64", 64, 416.0, Family::N1, SizeClass::HighMem),
    ("db-n1-highmem-96", 96, 624.0, Family::N1, SizeClass::HighMem),
    // N2 standard
    ("db-n2-standard-2", 2, 8.0, Family::N2, SizeClass::Standard),
    ("db-n2-standard-4", 4, 16.0, Family::N2, SizeClass::Standard),
    ("db-n2-standard-8", 8, 32.0, Family::N2, SizeClass::Standard),
    ("db-n2-standard-16", 16, 64.0, Family::N2, SizeClass::Standard),
    ("db-n2-standard-32", 32, 128.0, Family::N2, SizeClass::Standard),
    ("db-n2-standard-48", 48, 192.0, Family::N2, SizeClass::Standard),
    ("db-n2-standard-64", 64, 256.0, Family::N2, SizeClass::Standard),
    ("db-n2-standard-80", 80, 320.0, Family::N2, SizeClass::Standard),
    ("db-n2-standard-96", 96, 384.0, Family::N2, SizeClass::Standard),
    ("db-n2-standard-128", 128, 512.0, Family::N2, SizeClass::Standard),
    // N2 high memory
    ("db-n2-highmem-2", 2, 16.0, Family::N2, SizeClass::HighMem),
    ("db-n2-highmem-4", 4, 32.0, Family::N2, SizeClass::HighMem),
    ("db-n2-highmem-8", 8, 64.0, Family::N2, SizeClass::HighMem),
    ("db-n2-highmem-16", 16, 128.0, Family::N2, SizeClass::HighMem),
    ("db-n2-highmem-32", 32, 256.0, Family::N2, SizeClass::HighMem),
    ("db-n2-highmem-48", 48, 384.0, Family::N2, SizeClass::HighMem),
    ("db-n2-highmem-64", 64, 512.0, Family::N2, SizeClass::HighMem),
    ("db-n2-highmem-80", 80, 640.0, Family::N2, SizeClass::HighMem),
    ("db-n2-highmem-96", 96, 768.0, Family::N2, SizeClass::HighMem),
    ("db-n2-highmem-128", 128, 864.0, Family::N2, SizeClass::HighMem),
    // E2 standard
    ("db-e2-standard-2", 2, 8.0, Family::E2, SizeClass::Standard),
    ("db-e2-standard-4", 4, 16.0, Family::E2, SizeClass::Standard),
    ("db-e2-standard-8", 8, 32.0, Family::E2, SizeClass::Standard),
    ("db-e2-standard-16", 16, 64.0, Family::E2, SizeClass::Standard),
    ("db-e2-standard-32", 32, 128.0, Family::E2, SizeClass::Standard),
    // E2 high memory
    ("db-e2-highmem-2", 2, 16.0, Family::E2, SizeClass::HighMem),
    ("db-e2-highmem-4", 4, 32.0, Family::E2, SizeClass::HighMem),
    ("db-e2-highmem-8", 8, 64.0, Family::E2, SizeClass::HighMem),
    ("db-e2-highmem-16", 16, 128.0, Family::E2, SizeClass::HighMem),
];

static REGISTRY: OnceLock<BTreeMap<&'static str, MachineType>> = OnceLock::new();

fn registry() -> &'static BTreeMap<&'static str, MachineType> {
    REGISTRY.get_or_init(|| {
        MACHINE_TYPES
            .iter()
            .map(|&(name, cpu, memory_gb, family, size_class)| {
                (
                    name,
                    MachineType {
                        name: name.to_string(),
                        cpu,
                        memory_gb,
                        family,
                        size_class,
                    },
                )
            })
            .collect()
    })
}

pub(super) fn get(name: &str) -> Option<&'static MachineType> {
    registry().get(name)
}

/// Registered tiers ordered by family, size class, then CPU
pub(super) fn entries() -> impl Iterator<Item = &'static MachineType> {
    let mut machines: Vec<&'static MachineType> = registry().values().collect();
    machines.sort_by(|a, b| {
        a.family
            .cmp(&b.family)
            .then_with(|| a.size_class.as_str().cmp(b.size_class.as_str()))
            .then_with(|| a.cpu.cmp(&b.cpu))
    });
    machines.into_iter()
}

fn peers(current: &MachineType) -> impl Iterator<Item = &'static MachineType> + '_ {
    registry()
        .values()
        .filter(move |c| c.family == current.family && c.size_class == current.size_class)
}

fn by_shape(a: &&MachineType, b: &&MachineType) -> std::cmp::Ordering {
    a.cpu
        .cmp(&b.cpu)
        .then_with(|| a.memory_gb.total_cmp(&b.memory_gb))
}

pub(super) fn next_larger(current: &MachineType) -> Option<&'static MachineType> {
    peers(current)
        .filter(|c| current.is_strictly_smaller_than(c))
        .min_by(by_shape)
}

pub(super) fn next_smaller(current: &MachineType) -> Option<&'static MachineType> {
    peers(current)
        .filter(|c| c.is_strictly_smaller_than(current))
        .max_by(by_shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        assert_eq!(registry().len(), MACHINE_TYPES.len());
    }

    #[test]
    fn test_every_name_is_prefixed() {
        assert!(MACHINE_TYPES.iter().all(|(name, ..)| name.starts_with("db-")));
    }

    #[test]
    fn test_entries_are_grouped() {
        let names: Vec<&str> = entries().map(|m| m.name.as_str()).collect();
        assert_eq!(names.first(), Some(&"db-f1-micro"));
        let pos_2 = names.iter().position(|n| *n == "db-n1-standard-2").unwrap();
        let pos_4 = names.iter().position(|n| *n == "db-n1-standard-4").unwrap();
        assert!(pos_2 < pos_4);
    }
}
