//! Telemetry emission: decoded records to event-bus messages.
//!
//! The driver never depends on a concrete bus client - it publishes through
//! the [`TelemetryEmitter`] trait, keyed by IMEI. The shipped
//! [`TracingTelemetryEmitter`] is a "bus of one": it logs at `info`/`debug`
//! through `tracing` rather than producing to Kafka/NATS/etc. A real
//! integration implements this same trait against a production producer;
//! the driver's dispatch logic does not change.

use gt06_core::UnparsableKind;
use gt06_proto::payload::{CellInfo, ExtendedLocation, Location, Status};

/// A decoded GPS fix, in either of the layouts this crate understands.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationFix {
    /// Standard fixed layout (0x12/0x22/0x16/0x26/0x15/0x1A/0x32).
    Standard(Location),
    /// 0x94 scanning-decode layout.
    Extended(ExtendedLocation),
}

/// Cell-tower (LBS) data, single or multi-record.
#[derive(Debug, Clone, PartialEq)]
pub enum CellFix {
    Single(CellInfo),
    Multi(Vec<CellInfo>),
}

/// A session lifecycle event, published to topic `device.sessions` (§6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// First login for this IMEI; a new session record was created.
    Connected,
    /// Login for an IMEI with an existing session; the same session id
    /// was rebound to a new connection.
    Rebound,
    /// The owning connection closed; the session record persists until
    /// TTL eviction.
    Disconnected,
}

/// Decoded-record-to-event-bus-message translation, keyed by IMEI.
///
/// Delivery is fire-and-forget with at-least-once semantics: the driver
/// continues regardless of publish outcome, and a failed publish is logged
/// at `warn` and otherwise ignored (§4.6, §7 `BusUnavailable`).
pub trait TelemetryEmitter: Clone + Send + Sync + 'static {
    /// Publishes a decoded location fix for `imei`.
    fn publish_location(&self, imei: &str, fix: &LocationFix);

    /// Publishes a decoded status record for `imei`.
    fn publish_status(&self, imei: &str, status: &Status);

    /// Publishes a decoded cell-tower record for `imei`.
    fn publish_cell(&self, imei: &str, fix: &CellFix);

    /// Publishes a session lifecycle event for `imei`.
    fn publish_session_event(&self, imei: &str, event: SessionEvent);

    /// Publishes a best-effort "unparsable" marker for a structurally valid
    /// frame whose body failed to decode (§4.2/§4.5/§7 `ParseFailure`). The
    /// frame is still ACKed regardless; this is the telemetry side of that
    /// contract, distinct from the warn-level log emitted alongside it.
    fn publish_unparsable(&self, imei: &str, kind: UnparsableKind, reason: &str);
}

/// `tracing`-backed [`TelemetryEmitter`]: the bus-of-one shipped with the
/// gateway. Stands in for a real Kafka/NATS producer without a network
/// dependency; swapping in a real bus means implementing this trait, not
/// changing the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetryEmitter;

impl TelemetryEmitter for TracingTelemetryEmitter {
    fn publish_location(&self, imei: &str, fix: &LocationFix) {
        match fix {
            LocationFix::Standard(location) => tracing::info!(
                imei,
                latitude = location.latitude,
                longitude = location.longitude,
                speed = location.speed,
                course = location.course,
                valid = location.valid,
                altitude = ?location.altitude,
                "device.location"
            ),
            LocationFix::Extended(location) => tracing::info!(
                imei,
                latitude = location.location.latitude,
                longitude = location.location.longitude,
                scan_offset = location.scan_offset,
                "device.location (extended)"
            ),
        }
    }

    fn publish_status(&self, imei: &str, status: &Status) {
        tracing::info!(
            imei,
            battery = status.battery_level,
            signal = status.signal_strength,
            alarm = ?status.alarm,
            "device.status"
        );
    }

    fn publish_cell(&self, imei: &str, fix: &CellFix) {
        match fix {
            CellFix::Single(cell) => {
                tracing::debug!(imei, mcc = cell.mcc, mnc = cell.mnc, lac = cell.lac, cell_id = cell.cell_id, "device.cell");
            },
            CellFix::Multi(cells) => {
                tracing::debug!(imei, count = cells.len(), "device.cell (multi)");
            },
        }
    }

    fn publish_session_event(&self, imei: &str, event: SessionEvent) {
        tracing::info!(imei, ?event, "device.sessions");
    }

    fn publish_unparsable(&self, imei: &str, kind: UnparsableKind, reason: &str) {
        tracing::warn!(imei, ?kind, reason, "device.unparsable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_emitter_does_not_panic_on_any_event() {
        let emitter = TracingTelemetryEmitter;
        emitter.publish_session_event("123456789012345", SessionEvent::Connected);
        emitter.publish_session_event("123456789012345", SessionEvent::Rebound);
        emitter.publish_session_event("123456789012345", SessionEvent::Disconnected);
        emitter.publish_unparsable("123456789012345", UnparsableKind::Location, "body too short");
    }
}
