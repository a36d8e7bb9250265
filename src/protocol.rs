//! Shared JSON protocol for the dashboard
//!
//! This module defines the message shapes exchanged with browsers: the
//! REST envelope and the WebSocket messages in both directions. The wire
//! format is JSON via `serde_json`; field and tag names here are stable
//! API surface.

use serde::{Deserialize, Serialize};

use crate::domain::{unix_millis, SensorSnapshot};

/// Envelope for every REST response.
///
/// Success: `{"success": true, "data": ...}`.
/// Failure: `{"success": false, "error": "..."}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response carrying an error message.
    pub fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Server-to-client WebSocket messages, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Periodic broadcast of every sensor's latest value
    Readings {
        timestamp: u64,
        data: Vec<SensorSnapshot>,
        sensor_count: usize,
    },
    /// Reply to `request_status`
    Status {
        timestamp: u64,
        connected_clients: usize,
        sensor_count: usize,
        uptime_s: u64,
    },
    /// Reply to `ping`
    Pong { timestamp: u64 },
}

impl WsMessage {
    /// Broadcast message for one snapshot pass, stamped now.
    pub fn readings(data: Vec<SensorSnapshot>) -> Self {
        let sensor_count = data.len();
        WsMessage::Readings {
            timestamp: unix_millis(),
            data,
            sensor_count,
        }
    }

    pub fn status(connected_clients: usize, sensor_count: usize, uptime_s: u64) -> Self {
        WsMessage::Status {
            timestamp: unix_millis(),
            connected_clients,
            sensor_count,
            uptime_s,
        }
    }

    pub fn pong() -> Self {
        WsMessage::Pong {
            timestamp: unix_millis(),
        }
    }

    /// Serialize for the wire. Serialization of these shapes cannot
    /// fail; an empty object would indicate a bug, not a runtime error.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Client-to-server WebSocket messages, tagged by `type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness check; answered with `pong`
    Ping,
    /// Ask for a `status` message
    RequestStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BusLocation, Measurement, SensorDescriptor, SensorKind};
    use serde_json::{json, Value};

    fn sample_snapshot() -> SensorSnapshot {
        SensorSnapshot {
            sensor: SensorDescriptor::new(
                SensorKind::Illuminance,
                BusLocation::I2cMuxed {
                    bus: 0,
                    mux_address: 0x70,
                    channel: 2,
                    address: 0x23,
                },
            ),
            measurement: Some(Measurement::Illuminance { lux: 150.0 }),
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn readings_shape_on_the_wire() {
        let msg = WsMessage::readings(vec![sample_snapshot()]);
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "readings");
        assert_eq!(value["sensor_count"], 1);
        assert!(value["timestamp"].is_u64());
        assert_eq!(value["data"][0]["sensor"]["kind"], "illuminance");
        assert_eq!(value["data"][0]["sensor"]["label"], "i2c0:mux70:ch2:0x23");
        assert_eq!(value["data"][0]["measurement"]["lux"], 150.0);
    }

    #[test]
    fn failed_snapshot_omits_measurement() {
        let snap = SensorSnapshot::failed(
            SensorDescriptor::new(
                SensorKind::TempHumidity,
                BusLocation::I2cDirect { bus: 0, address: 0x44 },
            )
            .with_status(crate::domain::SensorStatus::Error),
        );
        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value["sensor"]["status"], "error");
        assert!(value.get("measurement").is_none());
    }

    #[test]
    fn client_messages_parse() {
        assert_eq!(
            serde_json::from_value::<ClientMessage>(json!({"type": "ping"})).unwrap(),
            ClientMessage::Ping
        );
        assert_eq!(
            serde_json::from_value::<ClientMessage>(json!({"type": "request_status"})).unwrap(),
            ClientMessage::RequestStatus
        );
        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "reboot"})).is_err());
    }

    #[test]
    fn api_response_envelopes() {
        let ok = serde_json::to_value(ApiResponse::ok(5)).unwrap();
        assert_eq!(ok, json!({"success": true, "data": 5}));

        let err = serde_json::to_value(ApiResponse::<u32>::err("sensor not detected")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "sensor not detected"}));
    }
}
