//! HTTP and WebSocket serving layer
//!
//! An `actix-web` application exposing the rig over REST plus a `/ws`
//! endpoint that streams periodic readings. The rig itself is blocking
//! hardware I/O, so every handler hops through `web::block`.
//!
//! Broadcasting works through one `tokio::sync::broadcast` channel: a
//! sampler thread serializes a snapshot pass into JSON and sends it, and
//! every connected WebSocket session forwards what it receives. The
//! sampler only touches the hardware while at least one client is
//! connected.

pub mod routes;
pub mod ws;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::ports::RigPort;
use crate::protocol::WsMessage;

/// Messages buffered per WebSocket session before old ones are dropped.
const BROADCAST_CAPACITY: usize = 16;

/// Shared state handed to every handler via `web::Data`.
pub struct AppState {
    pub rig: Arc<dyn RigPort>,
    /// Connected WebSocket sessions
    pub clients: AtomicUsize,
    /// Fan-out channel for readings broadcasts
    pub tx: broadcast::Sender<String>,
    started: Instant,
}

impl AppState {
    pub fn new(rig: Arc<dyn RigPort>) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            rig,
            clients: AtomicUsize::new(0),
            tx,
            started: Instant::now(),
        }
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    pub fn uptime_s(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Start the background sampler thread.
///
/// Every `interval` it reads all registered sensors and broadcasts the
/// result as a `readings` message. While no client is connected it
/// sleeps without touching the hardware. The thread runs for the life
/// of the process; the handle is returned for completeness.
pub fn spawn_sampler(state: Arc<AppState>, interval: Duration) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("ws-sampler".into())
        .spawn(move || loop {
            std::thread::sleep(interval);
            if state.connected_clients() == 0 {
                continue;
            }
            let snapshots = state.rig.snapshot();
            // send only fails with zero receivers; clients may have
            // disconnected since the gate above
            let _ = state.tx.send(WsMessage::readings(snapshots).to_json());
        })
        .expect("failed to spawn ws-sampler thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SensorDescriptor, SensorKind, SensorSnapshot};
    use crate::ports::rig::{RigError, ScanSummary};

    /// Rig that counts snapshot passes instead of touching hardware.
    #[derive(Default)]
    struct CountingRig {
        snapshots: AtomicUsize,
    }

    impl RigPort for CountingRig {
        fn scan(&self) -> Result<ScanSummary, RigError> {
            Ok(ScanSummary::default())
        }

        fn sensors(&self) -> Vec<SensorDescriptor> {
            Vec::new()
        }

        fn snapshot(&self) -> Vec<SensorSnapshot> {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }

        fn read_kind(&self, kind: SensorKind) -> Result<SensorSnapshot, RigError> {
            Err(RigError::NoSuchSensor(kind))
        }

        fn reset(&self) {}
    }

    #[test]
    fn sampler_idles_until_a_client_connects() {
        let rig = Arc::new(CountingRig::default());
        let state = Arc::new(AppState::new(rig.clone()));
        spawn_sampler(state.clone(), Duration::from_millis(5));

        // many intervals pass with zero clients
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(rig.snapshots.load(Ordering::SeqCst), 0);

        // one client appears; broadcasts and hardware passes start
        let mut rx = state.tx.subscribe();
        state.clients.fetch_add(1, Ordering::SeqCst);
        let msg = rx.blocking_recv().unwrap();
        assert!(msg.contains(r#""type":"readings""#), "got {msg}");
        assert!(rig.snapshots.load(Ordering::SeqCst) >= 1);
    }
}
