//! Broadcaster ingest over a real WebSocket connection

mod common;

use azaan_relay::{create_router, AppState};
use common::{eventually, Harness};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

async fn serve(h: &Harness) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(AppState::new(h.manager.clone()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Status of a handshake the server refused
async fn refused_with(url: String) -> u16 {
    match connect_async(url).await {
        Err(WsError::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected handshake error: {}", e),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

#[tokio::test]
async fn test_binary_frames_relayed_until_close() {
    let h = Harness::new();
    let addr = serve(&h).await;

    let (mut ws, response) = connect_async(format!("ws://{}/live?broadcastId=42", addr))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 101);
    assert!(h.venue_dir("42").is_dir());
    assert_eq!(h.manager.live_count(), 1);

    ws.send(Message::Text("hello".into())).await.unwrap();
    for i in 1..=3u8 {
        ws.send(Message::Binary(vec![i; 320])).await.unwrap();
    }
    ws.send(Message::Ping(vec![9])).await.unwrap();
    ws.send(Message::Close(None)).await.unwrap();

    assert!(eventually(|| h.manager.live_count() == 0).await);

    // Only binary messages reach the transcoder, in order
    let writes = h.transcoder.writes();
    assert_eq!(writes.len(), 3);
    for (i, frame) in writes.iter().enumerate() {
        assert_eq!(frame.len(), 320);
        assert!(frame.iter().all(|b| *b == i as u8 + 1));
    }
    assert!(!h.venue_dir("42").exists());
    assert_eq!(h.transcoder.stops(), 1);
}

#[tokio::test]
async fn test_dropped_connection_tears_session_down() {
    let h = Harness::new();
    let addr = serve(&h).await;

    let (mut ws, _) = connect_async(format!("ws://{}/live?venueId=7", addr))
        .await
        .unwrap();
    ws.send(Message::Binary(vec![1; 320])).await.unwrap();

    let transcoder = h.transcoder.clone();
    assert!(eventually(|| transcoder.writes().len() == 1).await);

    // No close frame
    drop(ws);

    assert!(eventually(|| h.manager.live_count() == 0).await);
    assert!(!h.venue_dir("7").exists());
}

#[tokio::test]
async fn test_busy_venue_refused_before_upgrade() {
    let h = Harness::new();
    let addr = serve(&h).await;

    let (mut first, _) = connect_async(format!("ws://{}/live?venueId=42", addr))
        .await
        .unwrap();

    assert_eq!(
        refused_with(format!("ws://{}/live?masjidId=42", addr)).await,
        409
    );

    // The live broadcast keeps relaying
    first.send(Message::Binary(vec![5; 320])).await.unwrap();
    let transcoder = h.transcoder.clone();
    assert!(eventually(|| transcoder.writes().len() == 1).await);
    assert_eq!(h.transcoder.starts(), 1);

    first.send(Message::Close(None)).await.unwrap();
    assert!(eventually(|| h.manager.live_count() == 0).await);
}

#[tokio::test]
async fn test_invalid_venue_refused_before_upgrade() {
    let h = Harness::new();
    let addr = serve(&h).await;

    for query in ["", "?venueId=", "?venueId=null", "?broadcastId=null", "?venueId=..%2F42"] {
        assert_eq!(
            refused_with(format!("ws://{}/live{}", addr, query)).await,
            400,
            "{}",
            query
        );
    }

    assert_eq!(h.transcoder.starts(), 0);
    assert_eq!(h.root_entries(), 0);
    assert_eq!(h.manager.live_count(), 0);
}
