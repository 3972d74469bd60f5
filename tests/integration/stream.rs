use crate::*;

#[tokio::test]
async fn no_faces_returns_identical_pixels() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut ws = connect(&server, "alice").await;

    let img = frame_with_patch(40, 30, 40);
    send_frame(&mut ws, &png(&img), 256).await;

    let reply = recv_frame(&mut ws).await.unwrap();
    assert_eq!(codec::decode(&reply.payload).unwrap(), img);
    assert!(reply.chunks >= 1);
}

#[tokio::test]
async fn reply_is_chunked_at_the_configured_size() {
    let mut config = test_config();
    config.transfer.chunk_size = 100;
    let server = start_server_with(config, ScriptedNetwork::silent()).await;
    let mut ws = connect(&server, "alice").await;

    send_frame(&mut ws, &png(&frame_with_patch(0, 0, 60)), 1024).await;

    let reply = recv_frame(&mut ws).await.unwrap();
    assert_eq!(reply.chunks as usize, reply.payload.len().div_ceil(100));
}

#[tokio::test]
async fn chunks_may_arrive_in_any_order() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut ws = connect(&server, "alice").await;

    let img = frame_with_patch(10, 10, 30);
    let mut messages = chunk_messages(FrameId::generate(), &png(&img), 64);
    assert!(messages.len() > 2);
    messages.reverse();
    send_messages(&mut ws, messages).await;

    let reply = recv_frame(&mut ws).await.unwrap();
    assert_eq!(codec::decode(&reply.payload).unwrap(), img);
}

#[tokio::test]
async fn duplicate_chunks_still_complete_once() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut ws = connect(&server, "alice").await;

    let img = frame_with_patch(10, 10, 30);
    let messages = chunk_messages(FrameId::generate(), &png(&img), 128);
    let first = messages[0].clone();
    send_messages(&mut ws, std::iter::once(first).chain(messages)).await;

    recv_frame(&mut ws).await.unwrap();
    expect_silence(&mut ws).await;
    assert_eq!(server.service.status().stats.frames_completed, 1);
}

#[tokio::test]
async fn malformed_chunk_keeps_session_open() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut ws = connect(&server, "alice").await;

    send_messages(&mut ws, [Bytes::from_static(b"too short")]).await;
    ws.send(Message::Text("ignored".into())).await.unwrap();

    let img = frame_with_patch(20, 20, 20);
    send_frame(&mut ws, &png(&img), 512).await;

    let reply = recv_frame(&mut ws).await.unwrap();
    assert_eq!(codec::decode(&reply.payload).unwrap(), img);
    assert_eq!(server.service.sessions().len(), 1);
}

#[tokio::test]
async fn peers_with_the_same_frame_id_stay_separate() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut alice = connect(&server, "alice").await;
    let mut bob = connect(&server, "bob").await;

    let shared_id = FrameId::generate();
    let alice_img = frame_with_patch(0, 0, 40);
    let bob_img = frame_with_patch(100, 60, 40);
    let alice_msgs = chunk_messages(shared_id, &png(&alice_img), 64);
    let bob_msgs = chunk_messages(shared_id, &png(&bob_img), 64);

    // Interleave the two streams chunk by chunk.
    let longest = alice_msgs.len().max(bob_msgs.len());
    for i in 0..longest {
        if let Some(m) = alice_msgs.get(i) {
            send_messages(&mut alice, [m.clone()]).await;
        }
        if let Some(m) = bob_msgs.get(i) {
            send_messages(&mut bob, [m.clone()]).await;
        }
    }

    let alice_reply = recv_frame(&mut alice).await.unwrap();
    let bob_reply = recv_frame(&mut bob).await.unwrap();
    assert_eq!(codec::decode(&alice_reply.payload).unwrap(), alice_img);
    assert_eq!(codec::decode(&bob_reply.payload).unwrap(), bob_img);
}

#[tokio::test]
async fn disconnect_discards_partial_frames() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut ws = connect(&server, "alice").await;

    let messages = chunk_messages(FrameId::generate(), &png(&frame_with_patch(0, 0, 40)), 64);
    send_messages(&mut ws, messages.into_iter().take(2)).await;
    let service = server.service.clone();
    assert!(wait_until(REPLY_TIMEOUT, || service.reassembler().pending_count() == 1).await);

    ws.close(None).await.unwrap();
    assert!(wait_until(REPLY_TIMEOUT, || service.reassembler().pending_count() == 0).await);
    assert!(wait_until(REPLY_TIMEOUT, || service.sessions().is_empty()).await);
}

#[tokio::test]
async fn reconnect_replaces_previous_connection() {
    let server = start_server(ScriptedNetwork::silent()).await;
    let mut old = connect(&server, "alice").await;
    let first_id = {
        let service = server.service.clone();
        assert!(wait_until(REPLY_TIMEOUT, || service.sessions().len() == 1).await);
        service.sessions().get("alice").unwrap().connection_id()
    };

    let mut new = connect(&server, "alice").await;
    let service = server.service.clone();
    assert!(
        wait_until(REPLY_TIMEOUT, || {
            service
                .sessions()
                .get("alice")
                .is_some_and(|h| h.connection_id() != first_id)
        })
        .await
    );

    // The old socket is shut down by the server.
    let closed = tokio::time::timeout(REPLY_TIMEOUT, async {
        loop {
            match old.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    // The old connection's teardown must not evict the new one.
    assert_eq!(service.sessions().len(), 1);
    let img = frame_with_patch(30, 30, 30);
    send_frame(&mut new, &png(&img), 1024).await;
    let reply = recv_frame(&mut new).await.unwrap();
    assert_eq!(codec::decode(&reply.payload).unwrap(), img);
}
