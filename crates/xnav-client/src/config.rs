//! [`ClientConfig`] – construction parameters for [`XNav`][crate::XNav].

use serde::{Deserialize, Serialize};
use tracing::warn;
use xnav_types::{XNavError, keys};

/// Default bound on distinct tag ids: the 36h11 AprilTag family (0..=586).
pub const DEFAULT_TAG_ID_LIMIT: usize = 587;

/// Largest accepted `tag_id_limit`.  The arena is allocated up front.
pub const MAX_TAG_ID_LIMIT: usize = 65_536;

/// Largest accepted `event_queue_capacity`.
pub const MAX_EVENT_QUEUE_CAPACITY: usize = 4_096;

/// Highest team number expressible in the `10.TE.AM.2` convention.
const MAX_TEAM_NUMBER: u32 = 25_599;

/// Client settings.  Every field has a default, so a partial TOML table is
/// enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root table name; must match the vision device configuration.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Identity announced to the bus.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Explicit server address (IP or hostname).  Wins over `team_number`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,

    /// FRC team number, mapped to `10.TE.AM.2` when no address is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_number: Option<u32>,

    /// Tag ids at or above this value are never cached.
    #[serde(default = "default_tag_id_limit")]
    pub tag_id_limit: usize,

    /// Capacity of the queue behind [`XNav::target_events`][crate::XNav::target_events].
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

fn default_table_name() -> String {
    keys::DEFAULT_TABLE.to_string()
}
fn default_client_name() -> String {
    "XNavLib".to_string()
}
fn default_tag_id_limit() -> usize {
    DEFAULT_TAG_ID_LIMIT
}
fn default_event_queue_capacity() -> usize {
    16
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            client_name: default_client_name(),
            server_address: None,
            team_number: None,
            tag_id_limit: default_tag_id_limit(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl ClientConfig {
    /// Config for `table_name` with every other field defaulted.
    pub fn for_table(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Self::default()
        }
    }

    /// Check the numeric bounds.
    ///
    /// # Errors
    ///
    /// Returns [`XNavError::Config`] when `tag_id_limit` exceeds
    /// [`MAX_TAG_ID_LIMIT`] or `event_queue_capacity` exceeds
    /// [`MAX_EVENT_QUEUE_CAPACITY`].
    pub fn validate(&self) -> Result<(), XNavError> {
        if self.tag_id_limit > MAX_TAG_ID_LIMIT {
            return Err(XNavError::Config(format!(
                "tag_id_limit {} exceeds {MAX_TAG_ID_LIMIT}",
                self.tag_id_limit
            )));
        }
        if self.event_queue_capacity > MAX_EVENT_QUEUE_CAPACITY {
            return Err(XNavError::Config(format!(
                "event_queue_capacity {} exceeds {MAX_EVENT_QUEUE_CAPACITY}",
                self.event_queue_capacity
            )));
        }
        Ok(())
    }

    /// Same config with out-of-range bounds pulled back to their maximum.
    pub(crate) fn clamped(mut self) -> Self {
        if self.tag_id_limit > MAX_TAG_ID_LIMIT {
            warn!(
                requested = self.tag_id_limit,
                max = MAX_TAG_ID_LIMIT,
                "tag_id_limit too large; clamping"
            );
            self.tag_id_limit = MAX_TAG_ID_LIMIT;
        }
        if self.event_queue_capacity > MAX_EVENT_QUEUE_CAPACITY {
            warn!(
                requested = self.event_queue_capacity,
                max = MAX_EVENT_QUEUE_CAPACITY,
                "event_queue_capacity too large; clamping"
            );
            self.event_queue_capacity = MAX_EVENT_QUEUE_CAPACITY;
        }
        self
    }

    /// Server the session should target.
    ///
    /// `Ok(None)` means "use the bus's default discovery".
    ///
    /// # Errors
    ///
    /// Returns [`XNavError::InvalidAddress`] for an address containing
    /// whitespace or a team number outside `1..=25599`.
    pub fn resolve_server(&self) -> Result<Option<String>, XNavError> {
        if let Some(address) = self.server_address.as_deref().map(str::trim)
            && !address.is_empty()
        {
            return validate_address(address).map(Some);
        }
        match self.team_number {
            None | Some(0) => Ok(None),
            Some(team) if team > MAX_TEAM_NUMBER => Err(XNavError::InvalidAddress(format!(
                "team number {team} does not fit the 10.TE.AM.2 scheme"
            ))),
            Some(team) => Ok(Some(team_address(team))),
        }
    }
}

/// `10.TE.AM.2` address of the robot network for `team`.
pub fn team_address(team: u32) -> String {
    format!("10.{}.{}.2", team / 100, team % 100)
}

/// Reject addresses that cannot be a host name or IP literal.
pub(crate) fn validate_address(address: &str) -> Result<String, XNavError> {
    let address = address.trim();
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return Err(XNavError::InvalidAddress(address.to_string()));
    }
    Ok(address.to_string())
}
