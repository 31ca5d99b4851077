//! Cron-based scheduling of the workflow
//!
//! Schedules are 6-field cron expressions (sec min hour day month dow) as
//! required by `tokio-cron-scheduler`. The presets `@hourly`, `@daily`,
//! `@weekly` and `@monthly` are accepted and expanded before validation.
//!
//! ```toml
//! [workflow]
//! schedule = "@hourly"          # same as "0 0 * * * *"
//! start_date = "2022-11-17T14:00:00Z"
//! ```

pub mod operations;
pub use operations::WorkflowScheduler;

use anyhow::{anyhow, Result};
use tracing::debug;

/// Expand presets and validate, returning the 6-field expression to register
pub fn normalize_schedule(schedule: &str) -> Result<String> {
    let trimmed = schedule.trim();
    let expanded = match trimmed {
        "@hourly" => "0 0 * * * *",
        "@daily" | "@midnight" => "0 0 0 * * *",
        "@weekly" => "0 0 0 * * 0",
        "@monthly" => "0 0 0 1 * *",
        other if other.starts_with('@') => {
            return Err(anyhow!("Unknown schedule preset '{}'", other));
        }
        other => other,
    };

    validate_6_field_cron(expanded)
        .map_err(|e| anyhow!("Invalid 6-field cron schedule '{}': {}", schedule, e))?;

    Ok(expanded.to_string())
}

fn validate_6_field_cron(schedule: &str) -> Result<()> {
    let parts: Vec<&str> = schedule.split_whitespace().collect();

    if parts.len() != 6 {
        return Err(anyhow!(
            "expected 6 fields (second minute hour day month dayofweek), got {}",
            parts.len()
        ));
    }

    validate_cron_field(parts[0], "second", 0, 59)?;
    validate_cron_field(parts[1], "minute", 0, 59)?;
    validate_cron_field(parts[2], "hour", 0, 23)?;
    validate_cron_field(parts[3], "day", 1, 31)?;
    validate_cron_field(parts[4], "month", 1, 12)?;
    validate_cron_field(parts[5], "dayofweek", 0, 7)?;

    debug!(
        "Validated cron '{}' → sec:{} min:{} hour:{} day:{} month:{} dow:{}",
        schedule, parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]
    );
    Ok(())
}

fn validate_cron_field(field: &str, name: &str, min: u32, max: u32) -> Result<()> {
    if field == "*" || field == "?" {
        return Ok(());
    }

    if let Some(step_str) = field.strip_prefix("*/") {
        let step = step_str
            .parse::<u32>()
            .map_err(|_| anyhow!("Invalid {} step value: {}", name, step_str))?;
        if step == 0 {
            return Err(anyhow!("{} step value cannot be 0", name));
        }
        return Ok(());
    }

    if field.contains(',') {
        for part in field.split(',') {
            validate_cron_field(part, name, min, max)?;
        }
        return Ok(());
    }

    if let Some((start, end)) = field.split_once('-') {
        let start = parse_in_range(start, name, min, max)?;
        let end = parse_in_range(end, name, min, max)?;
        if start > end {
            return Err(anyhow!("{} range {}-{} is reversed", name, start, end));
        }
        return Ok(());
    }

    parse_in_range(field, name, min, max)?;
    Ok(())
}

fn parse_in_range(value: &str, name: &str, min: u32, max: u32) -> Result<u32> {
    let parsed = value
        .parse::<u32>()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))?;
    if parsed < min || parsed > max {
        return Err(anyhow!(
            "{} value {} is outside valid range {}-{}",
            name,
            parsed,
            min,
            max
        ));
    }
    Ok(parsed)
}
