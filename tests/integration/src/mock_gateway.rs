//! In-process mock gateway
//!
//! Accepts WebSocket connections and hands each one to the test as a
//! [`MockSession`]: received client frames arrive as parsed JSON, and the
//! test scripts server behavior by sending frames or close codes back.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Default wait for an expected frame or session
const EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A scripted gateway server bound to a loopback port
pub struct MockGateway {
    addr: SocketAddr,
    sessions: mpsc::UnboundedReceiver<MockSession>,
}

/// One accepted client connection
pub struct MockSession {
    inbound: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl MockGateway {
    /// Bind a listener and start accepting
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind mock gateway");
        let addr = listener.local_addr().expect("local addr");
        let (session_tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let session_tx = session_tx.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let (mut sink, mut source) = ws.split();
                    let (in_tx, in_rx) = mpsc::unbounded_channel();
                    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

                    if session_tx
                        .send(MockSession {
                            inbound: in_rx,
                            outbound: out_tx,
                        })
                        .is_err()
                    {
                        return;
                    }

                    loop {
                        tokio::select! {
                            incoming = source.next() => match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                        let _ = in_tx.send(value);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(_)) => break,
                            },
                            outgoing = out_rx.recv() => match outgoing {
                                Some(message) => {
                                    let closing = matches!(message, Message::Close(_));
                                    if sink.send(message).await.is_err() || closing {
                                        break;
                                    }
                                }
                                None => {
                                    let _ = sink.close().await;
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        });

        Self { addr, sessions }
    }

    /// `ws://` URL shards connect to
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the next client connection
    pub async fn next_session(&mut self) -> MockSession {
        tokio::time::timeout(EXPECT_TIMEOUT, self.sessions.recv())
            .await
            .expect("timed out waiting for a gateway connection")
            .expect("gateway listener gone")
    }

    /// Assert no connection arrives within `window`
    pub async fn expect_no_session(&mut self, window: Duration) {
        if tokio::time::timeout(window, self.sessions.recv())
            .await
            .is_ok()
        {
            panic!("unexpected gateway connection");
        }
    }
}

impl MockSession {
    /// Send a raw frame
    pub fn send(&self, frame: Value) {
        let _ = self
            .outbound
            .send(Message::Text(frame.to_string().into()));
    }

    /// Send HELLO with the given heartbeat interval
    pub fn send_hello(&self, heartbeat_interval_ms: u64) {
        self.send(json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}}));
    }

    /// Send a dispatch frame
    pub fn send_dispatch(&self, event: &str, sequence: u64, data: Value) {
        self.send(json!({"op": 0, "t": event, "s": sequence, "d": data}));
    }

    /// Send HEARTBEAT_ACK
    pub fn send_heartbeat_ack(&self) {
        self.send(json!({"op": 11, "d": null}));
    }

    /// Close the connection with a gateway close code
    pub fn send_close(&self, code: u16) {
        let _ = self.outbound.send(Message::Close(Some(CloseFrame {
            code: code.into(),
            reason: "".into(),
        })));
    }

    /// Receive the next client frame
    pub async fn recv(&mut self) -> Value {
        self.recv_within(EXPECT_TIMEOUT).await
    }

    /// Receive the next client frame within `window`
    pub async fn recv_within(&mut self, window: Duration) -> Value {
        tokio::time::timeout(window, self.inbound.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client connection gone")
    }

    /// Receive the next frame and assert its opcode
    pub async fn expect_op(&mut self, op: u64) -> Value {
        let frame = self.recv().await;
        assert_eq!(
            frame["op"].as_u64(),
            Some(op),
            "expected op {op}, got frame {frame}"
        );
        frame
    }

    /// Assert the client sends nothing for `window`
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(window, self.inbound.recv()).await {
            panic!("expected silence, got frame {frame}");
        }
    }

    /// A standard READY payload
    pub fn ready_payload(session_id: &str, guilds: Value) -> Value {
        json!({
            "v": 6,
            "session_id": session_id,
            "user": {"id": "90000000000000001", "username": "mock-bot", "bot": true},
            "guilds": guilds
        })
    }
}
