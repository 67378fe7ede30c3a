//! Environment overlay for harness configuration
//!
//! Reads `HARNESS_*` variables (a `.env` file is loaded by the binary before
//! this runs) on top of the defaults. CLI flags are applied afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use shared::SharedError;

use super::{HarnessConfig, LaunchSpec};
use crate::error::HarnessResult;

pub const PORT: &str = "HARNESS_PORT";
pub const CLIENTS: &str = "HARNESS_CLIENTS";
pub const SERVER_CMD: &str = "HARNESS_SERVER_CMD";
pub const CLIENT_CMD: &str = "HARNESS_CLIENT_CMD";
pub const SERVER_DIR: &str = "HARNESS_SERVER_DIR";
pub const CLIENT_DIR: &str = "HARNESS_CLIENT_DIR";
pub const METADATA_WIDTH: &str = "HARNESS_METADATA_WIDTH";
pub const SETTLE_MS: &str = "HARNESS_SETTLE_MS";
pub const BARRIER_TIMEOUT_MS: &str = "HARNESS_BARRIER_TIMEOUT_MS";
pub const TERMINATION_GRACE_MS: &str = "HARNESS_TERMINATION_GRACE_MS";
pub const WRITE_TIMEOUT_MS: &str = "HARNESS_WRITE_TIMEOUT_MS";
pub const FIXED_DELAY_MS: &str = "HARNESS_FIXED_DELAY_MS";
pub const LOG_LEVEL: &str = "HARNESS_LOG_LEVEL";
pub const BANNER_MARKERS: &str = "HARNESS_BANNER_MARKERS";
pub const PROMPT_PREFIXES: &str = "HARNESS_PROMPT_PREFIXES";
pub const ACK_SERVER_READY: &str = "HARNESS_ACK_SERVER_READY";
pub const ACK_CLIENT_READY: &str = "HARNESS_ACK_CLIENT_READY";
pub const ACK_SIGNUP: &str = "HARNESS_ACK_SIGNUP";
pub const ACK_ADD_CONTACT: &str = "HARNESS_ACK_ADD_CONTACT";
pub const ACK_SEND_MESSAGE: &str = "HARNESS_ACK_SEND_MESSAGE";

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, SharedError> {
    value.trim().parse().map_err(|_| SharedError::InvalidConfig {
        field: key.to_string(),
        value: value.to_string(),
    })
}

/// Comma-separated list; blank entries are skipped
pub fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// An empty pattern clears the acknowledgment
pub fn pattern(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn millis(key: &str, value: &str) -> Result<Duration, SharedError> {
    parse::<u64>(key, value).map(Duration::from_millis)
}

impl HarnessConfig {
    /// Overlay values from the process environment
    pub fn with_env(self) -> HarnessResult<Self> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn with_lookup<F>(mut self, lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(PORT) {
            self.port = parse(PORT, &value)?;
        }

        if let Some(value) = lookup(CLIENTS) {
            self.clients = parse(CLIENTS, &value)?;
        }

        // Commands first so a directory override applies to them
        if let Some(value) = lookup(SERVER_CMD) {
            let working_dir = self.server.working_dir.take();
            self.server = LaunchSpec::from_command_line(&value)?;
            self.server.working_dir = working_dir;
        }

        if let Some(value) = lookup(CLIENT_CMD) {
            let working_dir = self.client.working_dir.take();
            self.client = LaunchSpec::from_command_line(&value)?;
            self.client.working_dir = working_dir;
        }

        if let Some(value) = lookup(SERVER_DIR) {
            self.server.working_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup(CLIENT_DIR) {
            self.client.working_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup(METADATA_WIDTH) {
            self.grammar.metadata_width = parse(METADATA_WIDTH, &value)?;
        }

        if let Some(value) = lookup(SETTLE_MS) {
            self.timing.settle_grace = millis(SETTLE_MS, &value)?;
        }

        if let Some(value) = lookup(BARRIER_TIMEOUT_MS) {
            self.timing.barrier_timeout = millis(BARRIER_TIMEOUT_MS, &value)?;
        }

        if let Some(value) = lookup(TERMINATION_GRACE_MS) {
            self.timing.termination_grace = millis(TERMINATION_GRACE_MS, &value)?;
        }

        if let Some(value) = lookup(WRITE_TIMEOUT_MS) {
            self.timing.write_timeout = millis(WRITE_TIMEOUT_MS, &value)?;
        }

        if let Some(value) = lookup(FIXED_DELAY_MS) {
            self.timing.fixed_delay = Some(millis(FIXED_DELAY_MS, &value)?);
        }

        if let Some(value) = lookup(LOG_LEVEL) {
            self.log_level = value;
        }

        if let Some(value) = lookup(BANNER_MARKERS) {
            self.banner_markers = list(&value);
        }

        if let Some(value) = lookup(PROMPT_PREFIXES) {
            self.prompt_prefixes = list(&value);
        }

        let acks = &mut self.commands.acks;
        for (key, slot) in [
            (ACK_SERVER_READY, &mut acks.server_ready),
            (ACK_CLIENT_READY, &mut acks.client_ready),
            (ACK_SIGNUP, &mut acks.signup),
            (ACK_ADD_CONTACT, &mut acks.add_contact),
            (ACK_SEND_MESSAGE, &mut acks.send_message),
        ] {
            if let Some(value) = lookup(key) {
                *slot = pattern(&value);
            }
        }

        Ok(self)
    }
}
