use crate::*;

#[tokio::test]
async fn detected_faces_are_drawn_on_the_reply() {
    let server = start_server(ScriptedNetwork::bright_patches()).await;
    let mut ws = connect(&server, "alice").await;

    let img = frame_with_patch(40, 30, 40);
    send_frame(&mut ws, &png(&img), 1024).await;

    let reply = recv_frame(&mut ws).await.unwrap();
    let annotated = codec::decode(&reply.payload).unwrap();
    assert_eq!(annotated.dimensions(), img.dimensions());
    assert_ne!(annotated, img);

    // Outline pixels are pure green.
    assert!(annotated.pixels().any(|p| *p == Rgb([0, 255, 0])));

    let service = server.service.clone();
    assert!(wait_until(REPLY_TIMEOUT, || service.status().stats.results_sent == 1).await);
    assert!(service.status().stats.faces_detected >= 1);
}

#[tokio::test]
async fn scoring_failure_sends_nothing_and_keeps_session() {
    let server = start_server(ScriptedNetwork::failing()).await;
    let mut ws = connect(&server, "alice").await;

    send_frame(&mut ws, &png(&frame_with_patch(0, 0, 20)), 1024).await;
    expect_silence(&mut ws).await;

    let service = server.service.clone();
    assert!(wait_until(REPLY_TIMEOUT, || service.status().stats.frames_failed == 1).await);
    assert_eq!(service.status().stats.results_sent, 0);
    assert_eq!(service.sessions().len(), 1);
}

#[tokio::test]
async fn undecodable_frame_is_dropped() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut ws = connect(&server, "alice").await;

    send_frame(&mut ws, &Bytes::from_static(b"definitely not an image"), 8).await;
    expect_silence(&mut ws).await;

    let service = server.service.clone();
    assert!(wait_until(REPLY_TIMEOUT, || service.status().stats.frames_failed == 1).await);

    // The same connection still serves the next frame.
    let img = frame_with_patch(10, 10, 10);
    send_frame(&mut ws, &png(&img), 1024).await;
    let reply = recv_frame(&mut ws).await.unwrap();
    assert_eq!(codec::decode(&reply.payload).unwrap(), img);
}

#[tokio::test]
async fn concurrent_frames_from_one_peer_all_return() {
    let server = start_server(ScriptedNetwork::bright_patches()).await;
    let mut ws = connect(&server, "alice").await;

    for i in 0..4 {
        send_frame(&mut ws, &png(&frame_with_patch(10 + i * 20, 20, 30)), 200).await;
    }

    // Replies may finish in any order but their chunks never interleave,
    // so each one reassembles cleanly.
    for _ in 0..4 {
        let reply = recv_frame(&mut ws).await.unwrap();
        assert!(codec::decode(&reply.payload).is_ok());
    }
}
