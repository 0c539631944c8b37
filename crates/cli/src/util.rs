//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use std::io::{self, BufRead, Write};

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(ts_ms: i64) -> String {
    let now_ms = chrono::Utc::now().timestamp_millis();
    if ts_ms > now_ms {
        return "in the future".to_string();
    }

    let seconds = (now_ms - ts_ms) / 1000;
    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format timestamp in local time (YYYY-MM-DD HH:MM:SS)
pub fn format_absolute_time(ts_ms: i64) -> String {
    match Local.timestamp_millis_opt(ts_ms) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        chrono::LocalResult::Ambiguous(dt, _) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        chrono::LocalResult::None => "unknown time".to_string(),
    }
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Octal permission bits, e.g. `0644`
pub fn format_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

/// `user:group`, falling back to numeric ids
pub fn format_owner(uid: u32, gid: u32) -> String {
    use nix::unistd::{Gid, Group, Uid, User};

    let user = User::from_uid(Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| uid.to_string());
    let group = Group::from_gid(Gid::from_raw(gid))
        .ok()
        .flatten()
        .map(|g| g.name)
        .unwrap_or_else(|| gid.to_string());

    format!("{}:{}", user, group)
}

/// Prompt on stdout and read one trimmed line from `input`
pub fn prompt(input: &mut impl BufRead, message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

/// Ask a yes/no question; anything but `y`/`yes` is no
pub fn confirm(input: &mut impl BufRead, message: &str) -> Result<bool> {
    let answer = prompt(input, &format!("{} [y/N] ", message))?;
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Parse a 1-based menu selection
pub fn parse_selection(answer: &str, count: usize) -> Option<usize> {
    match answer.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}
