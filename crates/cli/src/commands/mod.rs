//! CLI subcommands

pub mod analyze;
pub mod machine_types;
pub mod plan;
