mod common;

use std::time::Duration;

use common::{
    client, proxy_config, spawn_backend, spawn_ok_backend, start_proxy, text, wait_until,
    TestResult,
};
use http::StatusCode;
use sluice_proxy_lib::lifecycle::Phase;
use sluice_proxy_lib::ProxyError;
use tokio::net::TcpStream;

#[tokio::test]
async fn idle_proxy_stops_cleanly_on_trigger() -> TestResult<()> {
    let backend = spawn_ok_backend().await?;
    let proxy = start_proxy(proxy_config(&backend.url())?).await?;
    let addr = proxy.addr;

    assert_eq!(proxy.shutdown.phase(), Phase::Running);
    assert!(proxy.shutdown.trigger());
    // Only the first trigger starts the drain.
    assert!(!proxy.shutdown.trigger());

    tokio::time::timeout(Duration::from_secs(5), proxy.handle).await???;
    assert_eq!(proxy.shutdown.phase(), Phase::Stopped);

    // Listener is closed once the drain has started.
    assert!(TcpStream::connect(addr).await.is_err());
    Ok(())
}

#[tokio::test]
async fn in_flight_request_completes_during_drain() -> TestResult<()> {
    let backend = spawn_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(400)).await;
        text(StatusCode::OK, "done")
    })
    .await?;
    let proxy = start_proxy(proxy_config(&backend.url())?).await?;
    let gate = proxy.service.gate().clone();

    let http = client()?;
    let url = proxy.url("/work");
    let request = tokio::spawn(async move { http.get(url).send().await });

    assert!(wait_until(Duration::from_secs(2), || gate.counts().running == 1).await);
    proxy.shutdown.trigger();

    let res = request.await??;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await?, "done");

    tokio::time::timeout(Duration::from_secs(5), proxy.handle).await???;
    assert_eq!(gate.counts().completed, 1);
    Ok(())
}

#[tokio::test]
async fn drain_deadline_surfaces_as_shutdown_timeout() -> TestResult<()> {
    let backend = spawn_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        text(StatusCode::OK, "too late")
    })
    .await?;
    let mut config = proxy_config(&backend.url())?;
    config.shutdown_timeout = Duration::from_millis(200);
    let proxy = start_proxy(config).await?;
    let gate = proxy.service.gate().clone();

    let http = client()?;
    let url = proxy.url("/stuck");
    let _request = tokio::spawn(async move { http.get(url).send().await });

    assert!(wait_until(Duration::from_secs(2), || gate.counts().running == 1).await);
    proxy.shutdown.trigger();

    let result = tokio::time::timeout(Duration::from_secs(10), proxy.handle).await??;
    match result {
        Err(err @ ProxyError::ShutdownTimeout { queued: 0, running: 1 }) => {
            assert_eq!(err.exit_code(), 2);
        }
        other => return Err(format!("expected shutdown timeout, got {other:?}").into()),
    }
    Ok(())
}

#[tokio::test]
async fn observability_endpoints_follow_gate_state() -> TestResult<()> {
    let backend = spawn_ok_backend().await?;
    let mut config = proxy_config(&backend.url())?;
    config.telemetry.metrics_port = Some(0);

    let server = sluice_proxy_lib::ProxyServer::bind(config).await?;
    let obs = server
        .observability_addr()
        .ok_or("observability listener not bound")?;
    let proxy_addr = server.local_addr()?;
    let shutdown = server.shutdown_handle();
    let gate = server.service().gate().clone();
    let handle = tokio::spawn(server.run());
    let http = client()?;

    let res = http.get(format!("http://{proxy_addr}/")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);

    let health = http.get(format!("http://{obs}/health")).send().await?;
    assert_eq!(health.status(), StatusCode::OK);
    let ready = http.get(format!("http://{obs}/ready")).send().await?;
    assert_eq!(ready.status(), StatusCode::OK);

    let metrics = http.get(format!("http://{obs}/metrics")).send().await?.text().await?;
    assert!(metrics.contains("sluice_requests_total"));
    assert!(metrics.contains("sluice_gate_released_total"));

    let missing = http.get(format!("http://{obs}/nope")).send().await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    // Readiness flips as soon as the gate stops accepting.
    let outcome = gate.drain(Duration::from_secs(1)).await;
    assert!(outcome.is_drained());
    let ready = http.get(format!("http://{obs}/ready")).send().await?;
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle).await???;
    Ok(())
}
