//! Request/response correlation over one multiplexed socket.
//!
//! Each [`send`](Correlator::send) allocates the next id, parks a
//! oneshot sender in the pending table, and queues the encoded frame for
//! the writer. The reader calls [`resolve`](Correlator::resolve) with
//! every `result` frame; matching is by id only, so responses may arrive
//! in any order relative to their requests.
//!
//! A pending entry leaves the table exactly once: when its response
//! arrives, when its deadline passes, when the caller drops the future,
//! or when the connection dies ([`fail_all`](Correlator::fail_all)).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;
use crate::protocol::{Command, ResultFrame};

type Responder = oneshot::Sender<Result<ResultFrame, Error>>;

/// Pending-command table plus id allocator for a single connection.
pub struct Correlator {
    next_id: AtomicU64,
    pending: DashMap<u64, Responder>,
    outgoing: mpsc::UnboundedSender<String>,
    timeout: Duration,
}

impl Correlator {
    /// Create a correlator writing encoded frames into `outgoing`.
    /// Ids start at 1.
    pub fn new(outgoing: mpsc::UnboundedSender<String>, timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            outgoing,
            timeout,
        }
    }

    /// Send a command and wait for its correlated response.
    ///
    /// Resolves with the raw [`ResultFrame`] even when the server reports
    /// `success: false`; use [`ResultFrame::into_result`] to surface that
    /// as [`Error::Server`].
    pub async fn send(&self, command: &Command) -> Result<ResultFrame, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = command.to_frame(id)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        if self.outgoing.send(frame).is_err() {
            return Err(Error::ConnectionLost);
        }
        tracing::trace!(id, command = command.kind(), "command sent");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                tracing::debug!(id, command = command.kind(), "command timed out");
                Err(Error::Timeout {
                    operation: command.kind().to_owned(),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Hand a response to the command waiting on its id.
    ///
    /// Returns `false` when nothing is waiting (late response after a
    /// timeout, or an id this connection never issued). Such frames are
    /// dropped, never applied to another command.
    pub fn resolve(&self, frame: ResultFrame) -> bool {
        let Some((id, tx)) = self.pending.remove(&frame.id) else {
            return false;
        };
        tracing::trace!(id, success = frame.success, "command resolved");
        // The receiver may have been dropped between remove and send.
        let _ = tx.send(Ok(frame));
        true
    }

    /// Reject every pending command with [`Error::ConnectionLost`].
    pub fn fail_all(&self) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(Error::ConnectionLost));
                failed += 1;
            }
        }
        if failed > 0 {
            tracing::debug!(failed, "rejected pending commands after connection loss");
        }
        failed
    }

    /// Number of commands still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Removes the pending entry when the waiting future completes or is
/// dropped, whichever comes first.
struct PendingGuard<'a> {
    pending: &'a DashMap<u64, Responder>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Value, json};
    use tokio_test::{assert_pending, task};

    use super::*;

    fn correlator(timeout: Duration) -> (Correlator, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Correlator::new(tx, timeout), rx)
    }

    fn frame_id(raw: &str) -> u64 {
        let value: Value = serde_json::from_str(raw).unwrap();
        value["id"].as_u64().unwrap()
    }

    fn ok(id: u64, result: Value) -> ResultFrame {
        ResultFrame {
            id,
            success: true,
            result,
            error: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ids_start_at_one_and_increase() {
        let (c, mut rx) = correlator(Duration::from_secs(30));
        let (a, b, ()) = tokio::join!(
            c.send(&Command::GetStates),
            c.send(&Command::AreaRegistryList),
            async {
                let first = rx.recv().await.unwrap();
                let second = rx.recv().await.unwrap();
                assert_eq!(frame_id(&first), 1);
                assert_eq!(frame_id(&second), 2);
                assert!(c.resolve(ok(1, json!("a"))));
                assert!(c.resolve(ok(2, json!("b"))));
            }
        );
        assert_eq!(a.unwrap().result, json!("a"));
        assert_eq!(b.unwrap().result, json!("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn responses_match_by_id_not_arrival_order() {
        let (c, mut rx) = correlator(Duration::from_secs(30));
        let (states, devices, areas, ()) = tokio::join!(
            c.send(&Command::GetStates),
            c.send(&Command::DeviceRegistryList),
            c.send(&Command::AreaRegistryList),
            async {
                let mut sent = Vec::new();
                for _ in 0..3 {
                    let raw = rx.recv().await.unwrap();
                    let value: Value = serde_json::from_str(&raw).unwrap();
                    sent.push((value["id"].as_u64().unwrap(), value["type"].clone()));
                }
                // Answer in reverse, echoing the request type as the payload.
                for (id, kind) in sent.into_iter().rev() {
                    assert!(c.resolve(ok(id, kind)));
                }
            }
        );
        assert_eq!(states.unwrap().result, json!("get_states"));
        assert_eq!(devices.unwrap().result, json!("config/device_registry/list"));
        assert_eq!(areas.unwrap().result, json!("config/area_registry/list"));
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rejects_and_late_response_is_dropped() {
        let (c, mut rx) = correlator(Duration::from_secs(30));
        let err = c.send(&Command::GetStates).await.unwrap_err();
        assert!(
            matches!(err, Error::Timeout { ref operation, .. } if operation == "get_states"),
            "unexpected error: {err:?}"
        );
        assert_eq!(c.pending_count(), 0);

        let id = frame_id(&rx.recv().await.unwrap());
        assert!(!c.resolve(ok(id, json!([]))), "late response must not resolve anything");
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_is_not_misapplied_to_next_command() {
        let (c, mut rx) = correlator(Duration::from_secs(1));
        assert!(c.send(&Command::Ping).await.is_err());
        let stale = frame_id(&rx.recv().await.unwrap());

        let (next, ()) = tokio::join!(c.send(&Command::GetStates), async {
            let fresh = frame_id(&rx.recv().await.unwrap());
            assert_ne!(fresh, stale);
            assert!(!c.resolve(ok(stale, json!("stale"))));
            assert!(c.resolve(ok(fresh, json!("fresh"))));
        });
        assert_eq!(next.unwrap().result, json!("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn fail_all_rejects_every_pending_command() {
        let (c, mut rx) = correlator(Duration::from_secs(30));
        let (a, b, c_res, ()) = tokio::join!(
            c.send(&Command::GetStates),
            c.send(&Command::DeviceRegistryList),
            c.send(&Command::Ping),
            async {
                for _ in 0..3 {
                    rx.recv().await.unwrap();
                }
                assert_eq!(c.pending_count(), 3);
                assert_eq!(c.fail_all(), 3);
            }
        );
        for result in [a, b, c_res] {
            assert!(matches!(result, Err(Error::ConnectionLost)));
        }
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn server_failure_is_a_successful_correlation() {
        let (c, mut rx) = correlator(Duration::from_secs(30));
        let cmd = Command::CallService {
            domain: "light".into(),
            service: "explode".into(),
            service_data: None,
        };
        let (frame, ()) = tokio::join!(c.send(&cmd), async {
            let id = frame_id(&rx.recv().await.unwrap());
            let inbound = crate::protocol::Inbound::decode(&format!(
                r#"{{"id":{id},"type":"result","success":false,"error":{{"code":"not_found","message":"nope"}}}}"#
            ))
            .unwrap();
            let crate::protocol::Inbound::Result(frame) = inbound else {
                panic!("expected result");
            };
            assert!(c.resolve(frame));
        });
        let frame = frame.unwrap();
        assert!(!frame.success);
        assert!(matches!(frame.into_result(), Err(Error::Server { ref message, .. }) if message == "nope"));
    }

    #[tokio::test]
    async fn send_after_writer_gone_is_connection_lost() {
        let (c, rx) = correlator(Duration::from_secs(30));
        drop(rx);
        assert!(matches!(
            c.send(&Command::GetStates).await,
            Err(Error::ConnectionLost)
        ));
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn dropped_caller_releases_pending_entry() {
        let (c, _rx) = correlator(Duration::from_secs(30));
        {
            let mut fut = task::spawn(c.send(&Command::GetStates));
            assert_pending!(fut.poll());
            assert_eq!(c.pending_count(), 1);
        }
        assert_eq!(c.pending_count(), 0);
    }
}
