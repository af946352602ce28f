//! The hub's cached device/activity catalog.
//!
//! Fetched wholesale from the hub as one JSON document and replaced
//! wholesale on refresh; nothing here is ever mutated in place.

use serde::{Deserialize, Serialize};

use crate::activity::ActivityId;
use crate::error::{ProtocolError, Result};

/// The hub configuration: every activity and device the hub knows about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Activities in hub order, including the power-off sentinel.
    #[serde(rename = "activity", default)]
    pub activities: Vec<Activity>,

    /// Devices in hub order.
    #[serde(rename = "device", default)]
    pub devices: Vec<Device>,
}

/// A hub-defined macro that configures multiple devices into a usable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub label: String,
    #[serde(rename = "type", default)]
    pub activity_type: String,
    #[serde(rename = "controlGroup", default)]
    pub control_groups: Vec<ControlGroup>,
}

/// A physical device the hub can control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(rename = "controlGroup", default)]
    pub control_groups: Vec<ControlGroup>,
}

/// A named grouping of commands (e.g. "Volume", "Transport").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlGroup {
    pub name: String,
    #[serde(rename = "function", default)]
    pub functions: Vec<Function>,
}

/// A single named command within a control group.
///
/// `action` is the hub's nested JSON-encoded blob naming the device and
/// command string; use [`Function::action`] to get the typed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub label: String,
    pub action: String,
}

/// The decoded `action` blob of a [`Function`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(rename = "deviceId", default)]
    pub device_id: String,
    #[serde(default)]
    pub command: String,
}

impl Function {
    /// Decode the embedded action JSON.
    pub fn action(&self) -> Result<Action> {
        let action: Action = serde_json::from_str(&self.action)?;
        if action.device_id.is_empty() {
            return Err(ProtocolError::MissingActionField("deviceId"));
        }
        if action.command.is_empty() {
            return Err(ProtocolError::MissingActionField("command"));
        }
        Ok(action)
    }
}

impl HubConfig {
    /// Parse a hub configuration reply payload.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Activities a user can actually start, excluding the power-off
    /// sentinel.
    pub fn selectable_activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter().filter(|a| !a.id.is_power_off())
    }

    pub fn activity_by_id(&self, id: ActivityId) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }

    /// Case-sensitive label match, the way the hub UI names activities.
    pub fn activity_by_label(&self, label: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.label == label)
    }

    pub fn device_by_id(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn device_by_label(&self, label: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.label == label)
    }

    /// Look up the action for a named command on a device.
    ///
    /// Searches the device's control groups in hub order and returns the
    /// first function whose name matches.
    pub fn device_action(&self, device_id: &str, command: &str) -> Option<Action> {
        let device = self.device_by_id(device_id)?;
        device
            .control_groups
            .iter()
            .flat_map(|g| g.functions.iter())
            .find(|f| f.name == command)
            .and_then(|f| f.action().ok())
    }
}
