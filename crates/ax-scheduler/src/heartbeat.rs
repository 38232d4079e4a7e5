//! Heartbeat ticks: every `heartbeat_interval_min`, if the wall-clock falls
//! inside the configured active hours (in the configured timezone), emit an
//! inbound message built from `HEARTBEAT.md` plus a computed status block.

use std::path::Path;

use ax_core::config::SchedulerConfig;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{info, warn};

const FALLBACK_HEARTBEAT: &str = "No HEARTBEAT.md found for this agent. \
Use this check-in to review recent activity and decide if anything needs attention.";

/// True if `now` (UTC) falls inside `[start, end)` hours of day in `tz`,
/// where `start > end` means the window wraps past midnight (e.g. 22..6).
pub fn is_active_hour(now: DateTime<Utc>, tz: Tz, start: u32, end: u32) -> bool {
    let local_hour = now.with_timezone(&tz).hour();
    if start == end {
        // A zero-width window means "always active" rather than "never".
        true
    } else if start < end {
        local_hour >= start && local_hour < end
    } else {
        local_hour >= start || local_hour < end
    }
}

fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        warn!(timezone = %name, "unrecognised timezone, falling back to UTC");
        chrono_tz::UTC
    })
}

/// Read `HEARTBEAT.md` from the agent directory, or fall back to a default
/// message, then append a "Current Status" block listing `overdue` checks.
pub fn build_heartbeat_message(agent_dir: &Path, overdue: &[String]) -> String {
    let base = std::fs::read_to_string(agent_dir.join("HEARTBEAT.md"))
        .unwrap_or_else(|_| FALLBACK_HEARTBEAT.to_string());

    let status_block = if overdue.is_empty() {
        "## Current Status\n\nNo overdue checks.".to_string()
    } else {
        let items: String = overdue.iter().map(|o| format!("- {o}\n")).collect();
        format!("## Current Status\n\n{items}")
    };

    format!("{base}\n\n{status_block}")
}

/// Drives the heartbeat tick loop. `handler` receives the rendered message
/// string whenever the tick lands inside active hours.
pub async fn run<F, Fut>(
    config: SchedulerConfig,
    agent_dir: std::path::PathBuf,
    overdue_checks: impl Fn() -> Vec<String> + Send + Sync + 'static,
    handler: F,
    mut shutdown: watch::Receiver<bool>,
) where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let tz = parse_timezone(&config.timezone);
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(
        config.heartbeat_interval_min.max(1) * 60,
    ));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                if is_active_hour(now, tz, config.active_hours_start, config.active_hours_end) {
                    let overdue = overdue_checks();
                    let message = build_heartbeat_message(&agent_dir, &overdue);
                    info!("heartbeat fired");
                    handler(message).await;
                } else {
                    info!("heartbeat suppressed: outside active hours");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 27, hour, 0, 0).unwrap()
    }

    #[test]
    fn simple_daytime_window() {
        assert!(is_active_hour(at(10), chrono_tz::UTC, 8, 22));
        assert!(!is_active_hour(at(23), chrono_tz::UTC, 8, 22));
        assert!(!is_active_hour(at(7), chrono_tz::UTC, 8, 22));
    }

    #[test]
    fn wrapping_overnight_window() {
        assert!(is_active_hour(at(23), chrono_tz::UTC, 22, 6));
        assert!(is_active_hour(at(2), chrono_tz::UTC, 22, 6));
        assert!(!is_active_hour(at(12), chrono_tz::UTC, 22, 6));
    }

    #[test]
    fn message_falls_back_without_heartbeat_file() {
        let dir = tempfile::tempdir().unwrap();
        let msg = build_heartbeat_message(dir.path(), &[]);
        assert!(msg.contains("No HEARTBEAT.md found"));
        assert!(msg.contains("No overdue checks"));
    }

    #[test]
    fn message_lists_overdue_checks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("HEARTBEAT.md"), "Daily check-in.").unwrap();
        let msg = build_heartbeat_message(dir.path(), &["backup verification".to_string()]);
        assert!(msg.contains("Daily check-in."));
        assert!(msg.contains("- backup verification"));
    }
}
