//! Snapshot export to InfluxDB
//!
//! [`MetricsPublisher`] reads snapshot updates (throttled, latest wins),
//! converts the observed kinds into line-protocol [`Point`]s and hands them to
//! a [`MetricsSink`]. Failed writes are logged and dropped; the session never
//! waits on the publisher.

use std::collections::BTreeMap;
use std::pin::pin;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::MetricsConfig;
use crate::session::{FailureStreak, Session};
use crate::snapshot::SnapshotView;
use crate::stream::ThrottleExt;
use crate::types::{Altitude, Attitude, BatteryStatus, GpsRawInt, HighresImu, Odometry, Vibration};

mod point;
mod sink;

pub use point::{FieldValue, Point};
pub use sink::{MetricsSink, UdpLineSink};

/// Convert the observed kinds of a snapshot into points.
///
/// Kinds never observed produce no point. The GPS `position` point is only
/// emitted while the receiver sees at least one satellite.
pub fn points_from_snapshot(view: &SnapshotView) -> Vec<Point> {
    let mut points = Vec::with_capacity(7);

    if let Some(imu) = view.get::<HighresImu>() {
        points.push(
            Point::new("imu")
                .tag("category", "imu")
                .field("temperature", imu.temperature)
                .field("xacc", imu.xacc)
                .field("yacc", imu.yacc)
                .field("zacc", imu.zacc)
                .field("xgyro", imu.xgyro)
                .field("ygyro", imu.ygyro)
                .field("zgyro", imu.zgyro)
                .field("xmag", imu.xmag)
                .field("ymag", imu.ymag)
                .field("zmag", imu.zmag)
                .field("abs_pressure", imu.abs_pressure),
        );
    }

    if let Some(altitude) = view.get::<Altitude>() {
        points.push(
            Point::new("altitude")
                .tag("category", "altitudes")
                .field("altitude_local", altitude.altitude_local)
                .field("altitude_relative", altitude.altitude_relative)
                .field("altitude_terrain", altitude.altitude_terrain)
                .field("bottom_clearance", altitude.bottom_clearance),
        );
    }

    if let Some(attitude) = view.get::<Attitude>() {
        points.push(
            Point::new("attitude")
                .tag("category", "attitude")
                .field("roll", attitude.roll)
                .field("pitch", attitude.pitch)
                .field("yaw", attitude.yaw)
                .field("rollspeed", attitude.rollspeed)
                .field("pitchspeed", attitude.pitchspeed)
                .field("yawspeed", attitude.yawspeed),
        );
    }

    if let Some(battery) = view.get::<BatteryStatus>() {
        // Raw units: cdegC and cA
        points.push(
            Point::new("battery")
                .tag("category", "battery")
                .field("temperature", battery.temperature as f64)
                .field("charge_state", battery.charge_state as f64)
                .field("current_battery", battery.current_battery as f64),
        );
    }

    if let Some(odometry) = view.get::<Odometry>() {
        points.push(
            Point::new("odometry")
                .tag("category", "estimator")
                .field("x", odometry.x)
                .field("y", odometry.y)
                .field("z", odometry.z)
                .field("vx", odometry.vx)
                .field("vy", odometry.vy)
                .field("vz", odometry.vz)
                .field("rollspeed", odometry.rollspeed)
                .field("pitchspeed", odometry.pitchspeed)
                .field("yawspeed", odometry.yawspeed),
        );
    }

    if let Some(vibration) = view.get::<Vibration>() {
        points.push(
            Point::new("vibration")
                .tag("category", "estimator")
                .field("vibration_x", vibration.vibration_x)
                .field("vibration_y", vibration.vibration_y)
                .field("vibration_z", vibration.vibration_z)
                .field("clipping_0", vibration.clipping_0)
                .field("clipping_1", vibration.clipping_1)
                .field("clipping_2", vibration.clipping_2),
        );
    }

    if let Some(gps) = view.get::<GpsRawInt>().filter(|gps| gps.satellites_visible > 0) {
        points.push(
            Point::new("position")
                .tag("category", "estimator")
                .field("latitude", gps.latitude_deg())
                .field("longitude", gps.longitude_deg())
                .field("altitude", gps.altitude_m()),
        );
    }

    points
}

/// Totals reported when a publisher stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub batches: u64,
    pub points: u64,
    pub failed_batches: u64,
}

/// Periodic snapshot exporter.
pub struct MetricsPublisher<S> {
    sink: S,
    interval: Duration,
    tags: BTreeMap<String, String>,
}

impl<S: MetricsSink> MetricsPublisher<S> {
    pub fn new(sink: S, config: &MetricsConfig) -> Self {
        Self { sink, interval: config.interval(), tags: config.tags.clone() }
    }

    /// Publish until `cancel` fires or `updates` ends.
    pub async fn run<U>(self, updates: U, cancel: CancellationToken) -> PublisherStats
    where
        U: Stream<Item = SnapshotView> + Send,
    {
        info!(interval_ms = self.interval.as_millis() as u64, "Metrics publisher started");
        let mut updates = pin!(updates.throttle(self.interval));
        let mut stats = PublisherStats::default();
        let mut failures = FailureStreak::new("metrics write");

        loop {
            let view = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                view = updates.next() => match view {
                    Some(view) => view,
                    None => break,
                },
            };

            let points = self.decorate(points_from_snapshot(&view));
            if points.is_empty() {
                continue;
            }

            match self.sink.write(&points).await {
                Ok(()) => {
                    failures.success();
                    stats.batches += 1;
                    stats.points += points.len() as u64;
                }
                Err(e) => {
                    stats.failed_batches += 1;
                    failures.failure(&e);
                }
            }
        }

        debug!(?stats, "Metrics publisher stopped");
        stats
    }

    /// Spawn the publisher on the current runtime, tied to the session's
    /// cancellation.
    pub fn spawn(self, session: &Session) -> JoinHandle<PublisherStats> {
        let updates = session.snapshot_updates();
        let cancel = session.cancellation_token();
        tokio::spawn(self.run(updates, cancel))
    }

    fn decorate(&self, points: Vec<Point>) -> Vec<Point> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|d| i64::try_from(d.as_nanos()).ok());
        points
            .into_iter()
            .map(|mut point| {
                for (key, value) in &self.tags {
                    point.tags.entry(key.clone()).or_insert_with(|| value.clone());
                }
                point.timestamp = timestamp;
                point
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Telemetry;
    use crate::snapshot::Snapshot;
    use crate::types::{Identity, TelemetryMessage};
    use crate::{BridgeError, Result};
    use std::sync::{Arc, Mutex};
    use tokio_stream::wrappers::WatchStream;

    #[derive(Clone, Default)]
    struct MemorySink {
        batches: Arc<Mutex<Vec<Vec<Point>>>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl MetricsSink for MemorySink {
        async fn write(&self, points: &[Point]) -> Result<()> {
            if self.fail {
                return Err(BridgeError::metrics("sink offline", None));
            }
            self.batches.lock().expect("lock").push(points.to_vec());
            Ok(())
        }
    }

    fn record(snapshot: &Snapshot, message: impl Into<TelemetryMessage>) {
        snapshot.record(Telemetry {
            sender: Identity::new(1, 1),
            sequence: 0,
            message: message.into(),
        });
    }

    #[test]
    fn only_observed_kinds_become_points() {
        let snapshot = Snapshot::new();
        assert!(points_from_snapshot(&snapshot.view()).is_empty());

        record(&snapshot, Attitude { roll: 0.1, ..Default::default() });
        record(&snapshot, Vibration { clipping_2: 7, ..Default::default() });

        let points = points_from_snapshot(&snapshot.view());
        let names: Vec<&str> = points.iter().map(|p| p.measurement.as_str()).collect();
        assert_eq!(names, vec!["attitude", "vibration"]);
        assert_eq!(points[1].fields.get("clipping_2"), Some(&FieldValue::Integer(7)));
        assert_eq!(points[1].tags.get("category").map(String::as_str), Some("estimator"));
    }

    #[test]
    fn gps_position_requires_satellites() {
        let snapshot = Snapshot::new();
        let fix = GpsRawInt { lat: 473_977_418, lon: 85_455_938, alt: 488_120, ..Default::default() };

        record(&snapshot, fix);
        assert!(points_from_snapshot(&snapshot.view()).is_empty());

        record(&snapshot, GpsRawInt { satellites_visible: 9, ..fix });
        let points = points_from_snapshot(&snapshot.view());
        assert_eq!(points.len(), 1);
        let Some(FieldValue::Float(latitude)) = points[0].fields.get("latitude") else {
            panic!("latitude missing: {:?}", points[0]);
        };
        assert!((latitude - 47.3977418).abs() < 1e-9);
        assert_eq!(points[0].fields.get("altitude"), Some(&FieldValue::Float(488.12)));
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_writes_tagged_batches_until_cancelled() {
        let snapshot = Snapshot::new();
        let sink = MemorySink::default();
        let config = MetricsConfig {
            interval_ms: 50,
            tags: BTreeMap::from([("vehicle".to_string(), "x500".to_string())]),
            ..MetricsConfig::default()
        };
        let cancel = CancellationToken::new();
        let publisher = MetricsPublisher::new(sink.clone(), &config);
        let task = tokio::spawn(publisher.run(WatchStream::new(snapshot.subscribe()), cancel.clone()));

        record(&snapshot, HighresImu { temperature: 31.5, ..Default::default() });
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        let stats = task.await.expect("publisher task");

        assert_eq!(stats.failed_batches, 0);
        let batches = sink.batches.lock().expect("lock").clone();
        assert_eq!(stats.batches as usize, batches.len());
        let last = batches.last().expect("at least one batch");
        assert_eq!(last[0].measurement, "imu");
        assert_eq!(last[0].tags.get("vehicle").map(String::as_str), Some("x500"));
        assert!(last[0].timestamp.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_writes_are_dropped() {
        let snapshot = Snapshot::new();
        let sink = MemorySink { fail: true, ..MemorySink::default() };
        record(&snapshot, Attitude::default());

        let publisher = MetricsPublisher::new(sink, &MetricsConfig::default());
        let updates = WatchStream::new(snapshot.subscribe()).take(1);
        let stats = publisher.run(updates, CancellationToken::new()).await;

        assert_eq!(stats, PublisherStats { batches: 0, points: 0, failed_batches: 1 });
    }
}
