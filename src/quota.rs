//! Session quota rules
//!
//! Pure functions over [`Settings`] and [`UsageData`] at a given instant.
//! The coordinator owns the records; everything here only reads them.

use serde::{Deserialize, Serialize};

use crate::config::Settings;

/// Usage accumulated in the current session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageData {
    /// When the current session began (epoch ms)
    pub session_start_time: i64,
    /// Submissions made in this session
    pub prompt_count: u32,
    /// Time of the most recent submission, 0 if none
    pub last_used: i64,
}

impl UsageData {
    /// A freshly reset session starting at `now`
    pub fn fresh(now: i64) -> Self {
        Self {
            session_start_time: now,
            prompt_count: 0,
            last_used: 0,
        }
    }

    /// Counts one submission made at `now`
    pub fn record_submission(&mut self, now: i64) {
        self.prompt_count = self.prompt_count.saturating_add(1);
        self.last_used = now;
    }

    /// Milliseconds since the session started
    pub fn elapsed_ms(&self, now: i64) -> i64 {
        now - self.session_start_time
    }
}

/// Where a session stands against its quota
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    /// Just reset, nothing submitted yet
    Fresh,
    /// Some submissions made, limits not reached
    Active,
    /// Prompt or time limit reached; only a reset leaves this phase
    Exhausted,
}

/// True once the session has run for at least the configured time limit
pub fn time_exhausted(settings: &Settings, usage: &UsageData, now: i64) -> bool {
    usage.elapsed_ms(now) >= settings.time_limit_ms()
}

/// True once the session has used all of its prompts
pub fn prompts_exhausted(settings: &Settings, usage: &UsageData) -> bool {
    usage.prompt_count >= settings.prompt_limit
}

pub fn session_phase(settings: &Settings, usage: &UsageData, now: i64) -> SessionPhase {
    if prompts_exhausted(settings, usage) || time_exhausted(settings, usage, now) {
        SessionPhase::Exhausted
    } else if usage.prompt_count == 0 {
        SessionPhase::Fresh
    } else {
        SessionPhase::Active
    }
}

/// Whether automation may run right now
///
/// `enabled ∧ count < limit ∧ elapsed < time limit`; false when either
/// record is missing.
pub fn can_use(settings: Option<&Settings>, usage: Option<&UsageData>, now: i64) -> bool {
    match (settings, usage) {
        (Some(settings), Some(usage)) => {
            settings.is_enabled
                && !prompts_exhausted(settings, usage)
                && !time_exhausted(settings, usage, now)
        }
        _ => false,
    }
}

/// Literal prefix match of `url` against the allow-list.
///
/// Not hostname-aware: `https://a.com` also matches `https://a.com.evil`.
pub fn is_allowed_site(allowed_sites: &[String], url: &str) -> bool {
    allowed_sites.iter().any(|site| url.starts_with(site.as_str()))
}

/// Read-only view of the session for settings surfaces
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub phase: SessionPhase,
    pub prompt_count: u32,
    pub prompts_remaining: u32,
    /// Negative once the time limit has passed
    pub time_remaining_ms: i64,
    /// `m:ss`, or `Expired`
    pub time_remaining: String,
}

impl SessionSummary {
    pub fn new(settings: &Settings, usage: &UsageData, now: i64) -> Self {
        let time_remaining_ms = settings.time_limit_ms() - usage.elapsed_ms(now);
        Self {
            phase: session_phase(settings, usage, now),
            prompt_count: usage.prompt_count,
            prompts_remaining: settings.prompt_limit.saturating_sub(usage.prompt_count),
            time_remaining_ms,
            time_remaining: format_time_remaining(time_remaining_ms),
        }
    }
}

pub fn format_time_remaining(remaining_ms: i64) -> String {
    if remaining_ms <= 0 {
        return "Expired".to_string();
    }
    let minutes = remaining_ms / 60_000;
    let seconds = (remaining_ms % 60_000) / 1000;
    format!("{}:{:02}", minutes, seconds)
}
