//! Normalized activity identifiers.
//!
//! The hub carries activity ids as decimal strings on the wire, and the
//! original firmware is not consistent about padding or sign formatting.
//! Ids are parsed to an integer exactly once at the codec boundary and
//! compared numerically everywhere else; `Display` re-emits the canonical
//! decimal form for outgoing bodies.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A hub activity identifier, normalized to its integer form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivityId(i64);

impl ActivityId {
    /// The reserved "all off / no activity running" sentinel.
    ///
    /// Never listed as a selectable activity, but a valid target for
    /// `start_activity`.
    pub const POWER_OFF: ActivityId = ActivityId(-1);

    pub const fn new(id: i64) -> Self {
        ActivityId(id)
    }

    /// Parse a wire-format id string into its normalized form.
    ///
    /// Leading/trailing whitespace is tolerated because some hub firmware
    /// revisions pad digest payloads.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        raw.trim()
            .parse::<i64>()
            .map(ActivityId)
            .map_err(|_| ProtocolError::InvalidActivityId(raw.to_string()))
    }

    pub fn is_power_off(self) -> bool {
        self == Self::POWER_OFF
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ActivityId {
    fn from(id: i64) -> Self {
        ActivityId(id)
    }
}

impl FromStr for ActivityId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityId::parse(s)
    }
}

// The configuration JSON carries ids as strings ("-1", "28710925"); keep the
// wire representation while exposing the integer form in the model.
impl Serialize for ActivityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ActivityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ActivityId::parse(&raw).map_err(de::Error::custom)
    }
}
