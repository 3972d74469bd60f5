use crate::*;

async fn get_json(url: &str) -> serde_json::Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

#[tokio::test]
async fn status_reports_sessions_and_counters() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut ws = connect(&server, "alice").await;
    send_frame(&mut ws, &png(&frame_with_patch(0, 0, 10)), 1024).await;
    recv_frame(&mut ws).await.unwrap();

    let service = server.service.clone();
    assert!(wait_until(REPLY_TIMEOUT, || service.status().stats.results_sent == 1).await);

    let status = get_json(&server.api_url("/status")).await;
    let sessions = status["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["peer"], "alice");
    assert!(sessions[0]["connected_secs"].is_number());
    assert_eq!(status["pending_frames"], 0);
    assert_eq!(status["frames_completed"], 1);
    assert_eq!(status["frames_failed"], 0);
    assert_eq!(status["faces_detected"], 0);
    assert_eq!(status["results_sent"], 1);
}

#[tokio::test]
async fn session_inspect_and_drop() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut ws = connect(&server, "alice").await;

    let messages = chunk_messages(FrameId::generate(), &png(&frame_with_patch(0, 0, 40)), 64);
    send_messages(&mut ws, messages.into_iter().take(1)).await;
    let service = server.service.clone();
    assert!(wait_until(REPLY_TIMEOUT, || service.reassembler().pending_count() == 1).await);

    let info = get_json(&server.api_url("/sessions/alice")).await;
    assert_eq!(info["peer"], "alice");
    assert_eq!(info["pending_frames"], 1);

    let missing = reqwest::get(server.api_url("/sessions/bob")).await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let dropped: serde_json::Value = reqwest::Client::new()
        .delete(server.api_url("/sessions/alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dropped["dropped"], true);
    assert!(service.sessions().is_empty());
    assert_eq!(service.reassembler().pending_count(), 0);

    // The dropped peer's socket is closed by the server.
    let closed = tokio::time::timeout(REPLY_TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

#[tokio::test]
async fn api_can_be_disabled() {
    let mut config = test_config();
    config.server.api_enabled = false;
    let server = start_server_with(config, ScriptedNetwork::silent()).await;

    let resp = reqwest::get(server.api_url("/status")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    // Streaming is unaffected.
    let mut ws = connect(&server, "alice").await;
    send_frame(&mut ws, &png(&frame_with_patch(0, 0, 10)), 1024).await;
    recv_frame(&mut ws).await.unwrap();
}
