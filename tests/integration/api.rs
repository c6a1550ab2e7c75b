use crate::*;

use latmesh_api::ApiState;

/// Serve the HTTP surface for `registry` on an ephemeral port.
async fn spawn_api(
    registry: RegionRegistry,
) -> Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(latmesh_api::serve_listener(
        listener,
        ApiState::new(registry),
        async move {
            let _ = stop_rx.await;
        },
    ));
    Ok((addr, stop_tx))
}

/// Measure every peer once through the client role.
async fn measure_all(registry: &RegionRegistry, client: &Pinger) {
    for peer in registry.peers() {
        if let Ok(outcome) = client.ping(peer.address()).await {
            peer.record(outcome.rtt_us);
        }
    }
}

/// Ping over loopback, then read the result back through every endpoint.
#[tokio::test]
async fn test_measurement_shows_up_on_every_endpoint() {
    let ams = spawn_ping_server("ams", Arc::new(FixedRtt(1))).await.unwrap();
    let registry = loopback_registry(&[("ams", ams)]);
    registry.lookup_or_create("ams").unwrap();

    measure_all(&registry, &pinger(LOCAL, Arc::new(FixedRtt(1523)))).await;
    let (api, _stop) = spawn_api(registry.clone()).await.unwrap();

    let (status, body) = http_get(api, "/").await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, "iad\tams\t1523\n");

    let (status, body) = http_get(api, "/health").await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, "iad");

    let (status, body) = http_get(api, "/metrics").await.unwrap();
    assert_eq!(status, 200);
    assert!(body.contains("latency_iad_to_ams_microsecond_bucket"));
    assert!(body.contains("latency_iad_to_ams_microsecond_count 1"));

    let (status, body) = http_get(api, "/peers").await.unwrap();
    assert_eq!(status, 200);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["region"], "iad");
    assert_eq!(json["peers"][0]["region"], "ams");
    assert_eq!(json["peers"][0]["last_latency_us"], 1523);
    assert_eq!(json["peers"][0]["samples"], 1);
}

/// An unreachable peer keeps its last value while the others update.
#[tokio::test]
async fn test_unreachable_peer_keeps_last_value() {
    let ams = spawn_ping_server("ams", Arc::new(FixedRtt(1))).await.unwrap();
    let dead = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let registry = loopback_registry(&[("ams", ams), ("sin", dead)]);
    registry.lookup_or_create("ams").unwrap();
    registry.lookup_or_create("sin").unwrap().record(4200);

    measure_all(&registry, &pinger(LOCAL, Arc::new(FixedRtt(1523)))).await;
    let (api, _stop) = spawn_api(registry).await.unwrap();

    let (_, body) = http_get(api, "/").await.unwrap();
    assert_eq!(body, "iad\tams\t1523\niad\tsin\t4200\n");
}

/// Readers on the HTTP side never see a torn registry while writers insert.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_is_consistent_under_concurrent_inserts() {
    let registry = RegionRegistry::new(&test_config());
    let (api, _stop) = spawn_api(registry.clone()).await.unwrap();

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for i in 0..25 {
                    registry.lookup_or_create(&format!("r{w}-{i}")).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for _ in 0..10 {
        let (status, body) = http_get(api, "/").await.unwrap();
        assert_eq!(status, 200);
        for line in body.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            assert_eq!(fields.len(), 3, "torn line {line:?}");
            assert_eq!(fields[0], "iad");
            assert_eq!(fields[2], "0");
        }
    }

    for w in writers {
        w.await.unwrap();
    }
    let (_, body) = http_get(api, "/").await.unwrap();
    assert_eq!(body.lines().count(), 100);
}
