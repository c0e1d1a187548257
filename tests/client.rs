use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ircrarria::irc::{
    transport, ConnectionParams, ConnectionState, EventHandler, IrcClient, IrcError, IrcEvent, MalformedPolicy,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// The server side of a loopback connection.
struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn expect(&mut self) -> String {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for client line")
            .unwrap()
            .expect("client closed the stream")
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }
}

struct Session {
    client: Arc<IrcClient>,
    handle: JoinHandle<Result<(), IrcError>>,
    peer: Peer,
    events: mpsc::UnboundedReceiver<IrcEvent>,
}

impl Session {
    async fn next_event(&mut self) -> IrcEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn finish(self) -> Result<(), IrcError> {
        timeout(WAIT, self.handle)
            .await
            .expect("client did not stop")
            .unwrap()
    }
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn params(port: u16) -> ConnectionParams {
    ConnectionParams::new("127.0.0.1", port, "relay", "relaybot")
}

async fn session_with(
    configure: impl FnOnce(&mut ConnectionParams),
    handler: Option<Arc<dyn EventHandler>>,
) -> Session {
    let (listener, port) = listener().await;
    let mut p = params(port);
    configure(&mut p);

    let client = Arc::new(IrcClient::new(p));
    let (tx, events) = mpsc::unbounded_channel();
    if let Some(handler) = handler {
        client.subscribe(handler);
    }
    client.subscribe(Arc::new(tx));

    let runner = Arc::clone(&client);
    let handle = tokio::spawn(async move { runner.start().await });

    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut peer = Peer::new(stream);
    assert_eq!(peer.expect().await, "NICK relaybot");
    assert_eq!(peer.expect().await, "USER relay 0 * :relay");

    Session {
        client,
        handle,
        peer,
        events,
    }
}

async fn session() -> Session {
    session_with(|_| {}, None).await
}

#[tokio::test]
async fn test_registers_and_runs() {
    let s = session().await;
    assert!(s.client.is_alive());
    assert_eq!(s.client.state(), ConnectionState::Running);
}

#[tokio::test]
async fn test_dispatches_events_in_wire_order() {
    let mut s = session().await;
    s.peer.send(":irc.example 001 relaybot :Welcome").await;
    s.peer.send(":nick!user@host PRIVMSG #chan :hello world").await;
    s.peer.send(":a!b@c JOIN #chan").await;
    s.peer.send(":a!b@c PART #chan :later").await;
    s.peer.send(":a!b@c QUIT :bye now").await;
    s.peer.send(":irc.example 001 relaybot :Welcome again").await;

    assert_eq!(s.next_event().await, IrcEvent::Welcome);
    assert_eq!(
        s.next_event().await,
        IrcEvent::Message {
            source: "#chan".into(),
            author: "nick".into(),
            content: "hello world".into(),
        }
    );
    assert_eq!(
        s.next_event().await,
        IrcEvent::Join {
            channel: "#chan".into(),
            user: "a".into(),
        }
    );
    assert_eq!(
        s.next_event().await,
        IrcEvent::Leave {
            channel: "#chan".into(),
            user: "a".into(),
            reason: Some("later".into()),
        }
    );
    assert_eq!(
        s.next_event().await,
        IrcEvent::Quit {
            user: "a".into(),
            reason: Some("bye now".into()),
        }
    );
    assert_eq!(s.next_event().await, IrcEvent::Welcome);
}

#[tokio::test]
async fn test_ping_is_answered() {
    let mut s = session().await;
    s.peer.send("PING :server.example").await;
    assert_eq!(s.peer.expect().await, "PONG server.example");
}

#[tokio::test]
async fn test_lenient_mode_skips_malformed_lines() {
    let mut s = session().await;
    s.peer.send("garbage-no-colon-no-space-").await;
    s.peer.send(":only-an-origin").await;
    s.peer.send(":a!b@c QUIT :still here").await;

    assert_eq!(
        s.next_event().await,
        IrcEvent::Quit {
            user: "a".into(),
            reason: Some("still here".into()),
        }
    );
    assert!(s.client.is_alive());
}

#[tokio::test]
async fn test_strict_mode_terminates_on_malformed_line() {
    let mut s = session_with(|p| p.malformed = MalformedPolicy::Strict, None).await;
    s.peer.send("garbage-no-colon-no-space-").await;

    let client = Arc::clone(&s.client);
    match s.finish().await {
        Err(IrcError::MalformedLine(line)) => assert_eq!(line, "garbage-no-colon-no-space-"),
        other => panic!("expected malformed line error, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Dead);
}

#[tokio::test]
async fn test_overlong_line_follows_malformed_policy() {
    let flood = "x".repeat(transport::MAX_LINE_LEN + 100);

    let mut s = session().await;
    s.peer.send(&flood).await;
    s.peer.send(":a!b@c QUIT :survived").await;
    assert_eq!(
        s.next_event().await,
        IrcEvent::Quit {
            user: "a".into(),
            reason: Some("survived".into()),
        }
    );
    assert!(s.client.is_alive());

    let mut s = session_with(|p| p.malformed = MalformedPolicy::Strict, None).await;
    s.peer.send(&flood).await;
    assert!(matches!(s.finish().await, Err(IrcError::MalformedLine(_))));
}

#[tokio::test]
async fn test_write_methods() {
    let mut s = session().await;

    s.client.send_message("#chan", "hi there").await.unwrap();
    assert_eq!(s.peer.expect().await, "PRIVMSG #chan :hi there");

    s.client.set_self_mode("+B").await.unwrap();
    assert_eq!(s.peer.expect().await, "MODE relaybot +B");

    s.client.join_channel("#chan").await.unwrap();
    assert_eq!(s.peer.expect().await, "JOIN #chan");

    s.client.execute_raw("PRIVMSG NickServ :IDENTIFY x").await.unwrap();
    assert_eq!(s.peer.expect().await, "PRIVMSG NickServ :IDENTIFY x");

    assert!(matches!(
        s.client.send_message("#chan", "a\r\nQUIT").await,
        Err(IrcError::InvalidLine)
    ));
    assert!(s.client.is_alive());

    s.client.request_disconnect().await.unwrap();
    assert_eq!(s.peer.expect().await, "QUIT");
}

#[tokio::test]
async fn test_server_close_ends_session() {
    let s = session().await;
    let client = Arc::clone(&s.client);
    let Session { handle, peer, .. } = s;
    drop(peer);

    let outcome = timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(outcome.is_ok());
    assert!(!client.is_alive());
    assert!(matches!(
        client.send_message("#chan", "late").await,
        Err(IrcError::NotRunning)
    ));
    assert!(matches!(client.start().await, Err(IrcError::Terminated)));
}

#[tokio::test]
async fn test_close_unblocks_read_loop() {
    let s = session().await;
    s.client.close();
    s.client.close();
    assert_eq!(s.client.state(), ConnectionState::Dead);

    let client = Arc::clone(&s.client);
    assert!(s.finish().await.is_ok());
    assert!(matches!(client.join_channel("#chan").await, Err(IrcError::NotRunning)));
}

struct JoinOnWelcome;

#[async_trait]
impl EventHandler for JoinOnWelcome {
    async fn on_welcome(&self, client: &IrcClient) {
        client.set_self_mode("+B").await.unwrap();
        client.join_channel("#chan").await.unwrap();
    }
}

#[tokio::test]
async fn test_handler_can_write_from_callback() {
    let mut s = session_with(|_| {}, Some(Arc::new(JoinOnWelcome))).await;
    s.peer.send(":irc.example 001 relaybot :Welcome").await;
    s.peer.send("PING :after-welcome").await;

    assert_eq!(s.peer.expect().await, "MODE relaybot +B");
    assert_eq!(s.peer.expect().await, "JOIN #chan");
    assert_eq!(s.peer.expect().await, "PONG after-welcome");
    assert_eq!(s.next_event().await, IrcEvent::Welcome);
}

#[tokio::test]
async fn test_concurrent_start_runs_once() {
    let (listener, port) = listener().await;
    let client = IrcClient::new(params(port));

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut peer = Peer::new(stream);
        peer.expect().await;
        peer.expect().await;
    });

    let (first, second) = timeout(WAIT, async { tokio::join!(client.start(), client.start()) })
        .await
        .expect("starts did not finish");
    server.await.unwrap();

    match (first, second) {
        (Ok(()), Err(IrcError::AlreadyRunning)) | (Err(IrcError::AlreadyRunning), Ok(())) => {}
        other => panic!("expected exactly one successful start, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Dead);
}

#[tokio::test]
async fn test_tls_handshake_failure_releases_client() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = stream.write_all(b"NOTICE * :this is not tls\r\n").await;
    });

    let mut p = params(port);
    p.use_tls = true;
    let client = IrcClient::new(p);

    let outcome = timeout(WAIT, client.start()).await.expect("handshake hung");
    assert!(matches!(outcome, Err(IrcError::Tls(_))), "got {:?}", outcome);
    assert_eq!(client.state(), ConnectionState::Dead);
    server.await.unwrap();
}
