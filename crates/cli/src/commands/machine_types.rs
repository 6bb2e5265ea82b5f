//! Machine-type catalog commands

use anyhow::{bail, Result};
use scaler_lib::catalog::{self, Family, MachineType};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_json, print_table, OutputFormat};

/// Row for the machine types table
#[derive(Tabled)]
struct MachineTypeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "vCPU")]
    cpu: u32,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "GB/vCPU")]
    ratio: String,
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Class")]
    size_class: String,
}

impl From<&MachineType> for MachineTypeRow {
    fn from(machine: &MachineType) -> Self {
        Self {
            name: machine.name.clone(),
            cpu: machine.cpu,
            memory: format!("{:.2} GB", machine.memory_gb),
            ratio: format!("{:.2}", machine.memory_per_cpu_gb()),
            family: machine.family.to_string(),
            size_class: machine.size_class.to_string(),
        }
    }
}

#[derive(Serialize)]
struct MachineTypeDetails {
    #[serde(flatten)]
    machine: MachineType,
    memory_per_cpu_gb: f64,
    next_larger: Option<String>,
    next_smaller: Option<String>,
}

/// List registered machine types, optionally of one family
pub fn list(family: Option<&str>, format: OutputFormat) -> Result<()> {
    let family = match family {
        Some(name) => match Family::parse(name) {
            Some(family) => Some(family),
            None => bail!("Unknown machine family '{}'", name),
        },
        None => None,
    };

    let machines: Vec<MachineType> = catalog::all()
        .into_iter()
        .filter(|m| family.map_or(true, |f| m.family == f))
        .collect();

    match format {
        OutputFormat::Json => print_json(&machines)?,
        OutputFormat::Table => {
            let rows: Vec<MachineTypeRow> = machines.iter().map(MachineTypeRow::from).collect();
            print_table(rows, "No machine types found");
            if !machines.is_empty() {
                println!("\nTotal: {} machine types", machines.len());
            }
        }
    }

    Ok(())
}

/// Show one machine type with its scaling neighbors
pub fn show(tier: &str, format: OutputFormat) -> Result<()> {
    let machine = catalog::lookup(tier)?;
    let details = MachineTypeDetails {
        memory_per_cpu_gb: machine.memory_per_cpu_gb(),
        next_larger: catalog::next_larger(tier).ok(),
        next_smaller: catalog::next_smaller(tier).ok(),
        machine,
    };

    match format {
        OutputFormat::Json => print_json(&details)?,
        OutputFormat::Table => {
            let row = MachineTypeRow::from(&details.machine);
            print_table(vec![row], "Machine type not found");
            println!(
                "Next larger:  {}",
                details.next_larger.as_deref().unwrap_or("-")
            );
            println!(
                "Next smaller: {}",
                details.next_smaller.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}
