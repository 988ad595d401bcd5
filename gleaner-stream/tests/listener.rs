use futures::{SinkExt, StreamExt};
use gleaner_config::ListenerConfig;
use gleaner_stream::{answer_from_event, Frame, MonitorEnd, Subscription};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Accepts one client, records what it sends, and replays `script` to it.
async fn serve_once(script: Vec<&'static str>, hold_open: Duration) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/socket.io/?EIO=4&transport=websocket", listener.local_addr().unwrap());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut write, mut read) = ws.split();

        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = read.next().await {
                if let Message::Text(text) = msg {
                    let _ = seen_tx.send(text);
                }
            }
        });
        for frame in script {
            write.send(Message::Text(frame.to_string())).await.unwrap();
        }
        tokio::time::sleep(hold_open).await;
        let _ = write.send(Message::Close(None)).await;
        reader.abort();
    });

    (url, seen_rx)
}

fn config(url: String) -> ListenerConfig {
    let mut config = ListenerConfig::new(url);
    config.connect_timeout_ms = 2_000;
    config.opening_frames = vec![
        r#"40{"token":null,"deviceId":"{device_id}"}"#.to_string(),
        r#"42["session_init",{}]"#.to_string(),
    ];
    config
}

#[tokio::test]
async fn delivers_frames_and_stops_at_duration() {
    let (url, mut seen) = serve_once(
        vec![
            "2",
            r#"42["progress_update",{"progress":50}]"#,
            r#"42["query_response",{"query":"q","answer":"A","sources":["https://a.test"],"related_questions":["r"]}]"#,
        ],
        Duration::from_secs(5),
    )
    .await;

    let mut sub = Subscription::connect(&config(url)).await.unwrap();
    sub.send_query("top 10 cars").await.unwrap();

    let mut events = Vec::new();
    let started = std::time::Instant::now();
    let summary = sub
        .monitor(Duration::from_millis(600), |frame| {
            events.push(frame);
            async {}
        })
        .await;

    assert_eq!(summary.ended, MonitorEnd::Elapsed);
    assert!(started.elapsed() < Duration::from_secs(3));
    // the keepalive ping is answered inside the task, never delivered
    assert_eq!(summary.frames, 2);
    assert_eq!(events[0].event_name(), Some("progress_update"));
    let Frame::Event { name, data } = &events[1] else {
        panic!("expected an event, got {:?}", events[1]);
    };
    assert_eq!(name, "query_response");
    let (query, answer) = answer_from_event(data).unwrap();
    assert_eq!(query.as_deref(), Some("q"));
    assert_eq!(answer.answer, "A");

    sub.close().await;

    let mut sent = Vec::new();
    while let Ok(Some(text)) = tokio::time::timeout(Duration::from_millis(200), seen.recv()).await {
        sent.push(text);
    }
    assert!(sent[0].starts_with(r#"40{"token":null,"deviceId":"web:"#), "{sent:?}");
    assert!(!sent[0].contains("{device_id}"));
    assert_eq!(sent[1], r#"42["session_init",{}]"#);
    assert!(sent.iter().any(|s| s == "3"), "no pong in {sent:?}");
    assert!(sent.iter().any(|s| s.starts_with(r#"42["query",{"#) && s.contains("top 10 cars")));
}

#[tokio::test]
async fn peer_close_ends_monitoring() {
    let (url, _seen) = serve_once(vec![r#"42["query_response",{"answer":"x"}]"#], Duration::from_millis(50)).await;

    let mut sub = Subscription::connect(&config(url)).await.unwrap();
    let summary = sub.monitor(Duration::from_secs(10), |_| async {}).await;

    assert_eq!(summary.ended, MonitorEnd::PeerClosed);
    assert_eq!(summary.frames, 1);
}

#[tokio::test]
async fn cancellation_ends_monitoring() {
    let (url, _seen) = serve_once(vec![], Duration::from_secs(10)).await;

    let mut sub = Subscription::connect(&config(url)).await.unwrap();
    let cancel = sub.cancellation();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    let summary = sub.monitor(Duration::from_secs(10), |_| async {}).await;

    assert_eq!(summary.ended, MonitorEnd::Cancelled);
}

#[tokio::test]
async fn unreachable_server_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = Subscription::connect(&config(format!("ws://{addr}/"))).await;

    assert!(result.is_err());
}
