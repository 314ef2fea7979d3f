// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock protocol socket and driver for deterministic testing.
//!
//! `MockDriver` hands out `MockSocket` instances whose event streams are fed
//! either from pre-registered scripts (played immediately on open) or
//! injected live per session. Sends, presence signals, and pairing requests
//! are captured for assertion.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use zapline_core::types::{Credentials, Presence, SocketEvent};
use zapline_core::{ProtocolSocket, SocketDriver, SocketHandle, ZaplineError};

/// Pairing code every mock socket hands out.
const MOCK_PAIRING_CODE: &str = "K2Q4-9XTZ";

/// A scriptable protocol socket capturing everything sent through it.
pub struct MockSocket {
    session_id: String,
    sent: Mutex<Vec<(String, String)>>,
    presence: Mutex<Vec<(String, Presence)>>,
    pairing_requests: Mutex<Vec<String>>,
    refresh_count: AtomicU32,
    fail_sends: AtomicU32,
    fail_recipients: Mutex<HashSet<String>>,
    next_protocol_id: AtomicU32,
    logged_out: AtomicBool,
}

impl MockSocket {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            sent: Mutex::new(Vec::new()),
            presence: Mutex::new(Vec::new()),
            pairing_requests: Mutex::new(Vec::new()),
            refresh_count: AtomicU32::new(0),
            fail_sends: AtomicU32::new(0),
            fail_recipients: Mutex::new(HashSet::new()),
            next_protocol_id: AtomicU32::new(0),
            logged_out: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// All (recipient, text) pairs sent through this socket, in order.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// All (recipient, presence) signals, in order.
    pub async fn presence_signals(&self) -> Vec<(String, Presence)> {
        self.presence.lock().await.clone()
    }

    /// Phone numbers pairing codes were requested for.
    pub async fn pairing_requests(&self) -> Vec<String> {
        self.pairing_requests.lock().await.clone()
    }

    pub fn refresh_count(&self) -> u32 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    /// Makes the next `n` sends fail with a transient error.
    pub fn fail_next_sends(&self, n: u32) {
        self.fail_sends.store(n, Ordering::SeqCst);
    }

    /// Makes every send addressed to `to` fail with a transient error.
    pub async fn fail_sends_to(&self, to: &str) {
        self.fail_recipients.lock().await.insert(to.to_string());
    }
}

#[async_trait]
impl ProtocolSocket for MockSocket {
    async fn send_text(&self, to: &str, text: &str) -> Result<String, ZaplineError> {
        let remaining = self.fail_sends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_sends.store(remaining - 1, Ordering::SeqCst);
            return Err(ZaplineError::TransientProtocol {
                message: "mock send failure".into(),
            });
        }
        if self.fail_recipients.lock().await.contains(to) {
            return Err(ZaplineError::TransientProtocol {
                message: format!("mock send failure to {to}"),
            });
        }
        self.sent.lock().await.push((to.to_string(), text.to_string()));
        let n = self.next_protocol_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock-proto-{}-{n}", self.session_id))
    }

    async fn send_presence(&self, to: &str, presence: Presence) -> Result<(), ZaplineError> {
        self.presence.lock().await.push((to.to_string(), presence));
        Ok(())
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, ZaplineError> {
        self.pairing_requests
            .lock()
            .await
            .push(phone_number.to_string());
        Ok(MOCK_PAIRING_CODE.to_string())
    }

    async fn refresh_code(&self) -> Result<(), ZaplineError> {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) -> Result<(), ZaplineError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockDriverInner {
    open_count: AtomicU32,
    fail_opens: AtomicU32,
    scripts: Mutex<VecDeque<Vec<SocketEvent>>>,
    taps: Mutex<HashMap<String, mpsc::Sender<SocketEvent>>>,
    sockets: Mutex<Vec<Arc<MockSocket>>>,
    opens_with_credentials: Mutex<Vec<bool>>,
}

/// Factory handing out [`MockSocket`]s, with scripted failures and events.
pub struct MockDriver {
    inner: MockDriverInner,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            inner: MockDriverInner {
                open_count: AtomicU32::new(0),
                fail_opens: AtomicU32::new(0),
                scripts: Mutex::new(VecDeque::new()),
                taps: Mutex::new(HashMap::new()),
                sockets: Mutex::new(Vec::new()),
                opens_with_credentials: Mutex::new(Vec::new()),
            },
        }
    }

    /// Makes the next `n` `open` calls fail with a transient error.
    pub fn fail_next_opens(&self, n: u32) {
        self.inner.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Registers events to play immediately on the next successful open.
    /// Scripts queue up: one per open, in registration order.
    pub async fn push_script(&self, events: Vec<SocketEvent>) {
        self.inner.scripts.lock().await.push_back(events);
    }

    /// Injects an event into the session's most recent open.
    ///
    /// Panics when the session was never opened.
    pub async fn inject(&self, session_id: &str, event: SocketEvent) {
        let tx = {
            let taps = self.inner.taps.lock().await;
            taps.get(session_id)
                .unwrap_or_else(|| panic!("no open socket for session {session_id}"))
                .clone()
        };
        tx.send(event).await.expect("event receiver dropped");
    }

    pub fn open_count(&self) -> u32 {
        self.inner.open_count.load(Ordering::SeqCst)
    }

    /// Whether each open (in order) was handed stored credentials.
    pub async fn opens_with_credentials(&self) -> Vec<bool> {
        self.inner.opens_with_credentials.lock().await.clone()
    }

    /// The most recently opened socket, if any.
    pub async fn last_socket(&self) -> Option<Arc<MockSocket>> {
        self.inner.sockets.lock().await.last().cloned()
    }

    /// Every socket ever opened, in order.
    pub async fn sockets(&self) -> Vec<Arc<MockSocket>> {
        self.inner.sockets.lock().await.clone()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocketDriver for MockDriver {
    async fn open(
        &self,
        session_id: &str,
        credentials: Option<Credentials>,
    ) -> Result<SocketHandle, ZaplineError> {
        self.inner.open_count.fetch_add(1, Ordering::SeqCst);
        self.inner
            .opens_with_credentials
            .lock()
            .await
            .push(credentials.is_some());

        let failing = self.inner.fail_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.inner.fail_opens.store(failing - 1, Ordering::SeqCst);
            return Err(ZaplineError::TransientProtocol {
                message: "mock open failure".into(),
            });
        }

        let (tx, rx) = mpsc::channel(64);
        if let Some(script) = self.inner.scripts.lock().await.pop_front() {
            for event in script {
                tx.send(event).await.expect("scripted event send failed");
            }
        }
        self.inner
            .taps
            .lock()
            .await
            .insert(session_id.to_string(), tx);

        let socket = Arc::new(MockSocket::new(session_id));
        self.inner.sockets.lock().await.push(Arc::clone(&socket));

        Ok(SocketHandle {
            socket,
            events: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_events_arrive_on_open() {
        let driver = MockDriver::new();
        driver
            .push_script(vec![SocketEvent::Qr { code: "qr-1".into() }])
            .await;

        let mut handle = driver.open("s1", None).await.unwrap();
        let event = handle.events.recv().await.unwrap();
        assert!(matches!(event, SocketEvent::Qr { code } if code == "qr-1"));
    }

    #[tokio::test]
    async fn injected_events_reach_latest_open() {
        let driver = MockDriver::new();
        let mut handle = driver.open("s1", None).await.unwrap();
        driver
            .inject("s1", SocketEvent::PairingCode { code: "c".into() })
            .await;
        let event = handle.events.recv().await.unwrap();
        assert!(matches!(event, SocketEvent::PairingCode { .. }));
    }

    #[tokio::test]
    async fn failed_opens_count_down() {
        let driver = MockDriver::new();
        driver.fail_next_opens(1);
        assert!(driver.open("s1", None).await.is_err());
        assert!(driver.open("s1", None).await.is_ok());
        assert_eq!(driver.open_count(), 2);
    }

    #[tokio::test]
    async fn socket_captures_sends_and_failures() {
        let driver = MockDriver::new();
        let handle = driver.open("s1", None).await.unwrap();
        let socket = handle.socket;

        socket.send_text("111", "oi").await.unwrap();

        let mock = driver.last_socket().await.unwrap();
        mock.fail_next_sends(1);
        assert!(socket.send_text("222", "oi").await.is_err());
        assert!(socket.send_text("333", "oi").await.is_ok());
        assert_eq!(mock.sent_count().await, 2);
    }
}
