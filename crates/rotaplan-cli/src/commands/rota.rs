//! Rota creation, cleanup and dry run.

use std::path::Path;

use chrono::Utc;
use rotaplan_core::{RotaConfig, build_event, cleanup as cleanup_events, create_rota, plan_shifts};
use rotaplan_google::{AuthConfig, Authenticator};
use tracing::{debug, info};

use crate::error::CliResult;

/// Reads and validates the rota file.
pub fn load(path: &Path) -> CliResult<RotaConfig> {
    let config = RotaConfig::load(path)?;
    debug!(
        "loaded rota with {} members for calendar {}",
        config.members.len(),
        config.calendar_id
    );
    Ok(config)
}

/// Creates one recurring event per member.
pub async fn create(rota: &RotaConfig, auth: AuthConfig) -> CliResult<()> {
    let service = Authenticator::new(auth).service().await?;
    let created = create_rota(&service, rota).await?;
    println!("created {} shift(s) in {}", created.len(), rota.calendar_id);
    Ok(())
}

/// Deletes upcoming events of the rota calendar.
pub async fn cleanup(rota: &RotaConfig, auth: AuthConfig) -> CliResult<()> {
    let service = Authenticator::new(auth).service().await?;
    let report = cleanup_events(&service, &rota.calendar_id, Utc::now()).await?;
    info!("deleted {} event(s), {} failure(s)", report.deleted, report.failed);
    Ok(())
}

/// Prints the shifts that would be created.
pub fn dry_run(rota: &RotaConfig) -> CliResult<()> {
    for line in describe_shifts(rota)? {
        println!("{}", line);
    }
    Ok(())
}

/// One line per shift: summary, first shift and recurrence.
pub fn describe_shifts(rota: &RotaConfig) -> CliResult<Vec<String>> {
    plan_shifts(rota)?
        .iter()
        .map(|shift| -> CliResult<String> {
            let event = build_event(rota, shift)?;
            Ok(format!(
                "{} <{}>: {} to {} ({}), every {} week(s)",
                event.summary,
                shift.member.email,
                shift.start,
                shift.end,
                rota.time_zone,
                shift.interval_weeks
            ))
        })
        .collect()
}
