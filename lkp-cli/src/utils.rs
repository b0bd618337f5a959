//! Shared utility functions.

use chrono::{TimeZone, Utc};

/// Format a Unix timestamp (seconds) as a human-readable string.
pub fn format_timestamp_secs(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "invalid".to_string())
}

/// Whether `target` is an EC2 ARN in any AWS partition.
///
/// ssh runs `lkp ssh match` for every host it connects to, so anything else
/// (hostnames, addresses, other ARN services) is left to plain ssh.
pub fn is_lkp_target(target: &str) -> bool {
    let mut parts = target.splitn(4, ':');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some("arn"), Some(partition), Some("ec2"), Some(_)) if partition.starts_with("aws")
    )
}
