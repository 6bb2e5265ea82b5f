//! Wiring of the cloud adapters and the analyzer for CLI commands

use anyhow::{Context, Result};
use scaler_lib::analyzer::Analyzer;
use scaler_lib::cloud::{http_client, MonitoringClient, RestClient, SqlAdminClient, TokenSource};
use scaler_lib::config::AnalysisConfig;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CliConfig;
use crate::Cli;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Project from the flag, then the config file, then `GOOGLE_CLOUD_PROJECT`
pub fn resolve_project(flag: Option<&str>, settings: &CliConfig) -> Result<String> {
    flag.map(str::to_string)
        .or_else(|| settings.default_project.clone())
        .or_else(|| std::env::var("GOOGLE_CLOUD_PROJECT").ok())
        .filter(|p| !p.trim().is_empty())
        .context("No project given; pass --project or set SCALER_PROJECT_ID")
}

/// Build an analyzer for the selected project and profile
pub fn build_analyzer(cli: &Cli, settings: &CliConfig, dry_run: bool, force: bool) -> Result<Analyzer> {
    let project = resolve_project(cli.project.as_deref(), settings)?;
    let profile = cli.profile.or(settings.default_profile).unwrap_or_default();

    let mut config = AnalysisConfig::for_profile(profile).with_project(&project);
    config.dry_run = dry_run;
    config.force = force;
    config.validate().context("Invalid analysis configuration")?;

    let http = http_client(REQUEST_TIMEOUT).context("Failed to create HTTP client")?;
    let access_token = cli.access_token.clone().or_else(|| settings.access_token.clone());
    let tokens = TokenSource::from_settings(access_token, http.clone());

    let sqladmin = SqlAdminClient::new(
        RestClient::new(http.clone(), &cli.sqladmin_url, tokens.clone())
            .context("Invalid SQL Admin API URL")?,
        &project,
    );
    let monitoring = MonitoringClient::new(
        RestClient::new(http, &cli.monitoring_url, tokens).context("Invalid Monitoring API URL")?,
        &project,
    );

    Ok(Analyzer::new(Arc::new(sqladmin), Arc::new(monitoring), config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_config() {
        let settings = CliConfig {
            default_project: Some("from-config".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_project(Some("from-flag"), &settings).unwrap(), "from-flag");
        assert_eq!(resolve_project(None, &settings).unwrap(), "from-config");
    }

    #[test]
    fn test_blank_project_is_rejected() {
        assert!(resolve_project(Some("  "), &CliConfig::default()).is_err());
    }
}
