use crate::collectors::{CheckResults, HttpCheckResult, TcpCheckResult};
use crate::config::{HttpCheckConfig, TcpCheckConfig};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time;
use tracing::warn;

/// Runs every server check as its own task. Results keep configuration order;
/// the second value is the number of checks that failed with an error or timeout.
pub async fn collect_server_checks(
    client: &Client,
    http: &[HttpCheckConfig],
    tcp: &[TcpCheckConfig],
) -> (CheckResults, u64) {
    let mut http_set = JoinSet::new();
    for (idx, check) in http.iter().cloned().enumerate() {
        let client = client.clone();
        http_set.spawn(async move { (idx, run_http_check(&client, &check).await) });
    }
    let mut tcp_set = JoinSet::new();
    for (idx, check) in tcp.iter().cloned().enumerate() {
        tcp_set.spawn(async move { (idx, run_tcp_check(&check).await) });
    }

    let mut errors = 0_u64;
    let mut http_results: Vec<(usize, HttpCheckResult)> = Vec::with_capacity(http.len());
    while let Some(joined) = http_set.join_next().await {
        match joined {
            Ok((idx, (result, had_error))) => {
                errors += u64::from(had_error);
                http_results.push((idx, result));
            }
            Err(err) => {
                warn!(error = %err, "задача HTTP-проверки завершилась аварийно");
                errors += 1;
            }
        }
    }
    let mut tcp_results: Vec<(usize, TcpCheckResult)> = Vec::with_capacity(tcp.len());
    while let Some(joined) = tcp_set.join_next().await {
        match joined {
            Ok((idx, (result, had_error))) => {
                errors += u64::from(had_error);
                tcp_results.push((idx, result));
            }
            Err(err) => {
                warn!(error = %err, "задача TCP-проверки завершилась аварийно");
                errors += 1;
            }
        }
    }

    http_results.sort_by_key(|(idx, _)| *idx);
    tcp_results.sort_by_key(|(idx, _)| *idx);

    (
        CheckResults {
            http: http_results.into_iter().map(|(_, r)| r).collect(),
            tcp: tcp_results.into_iter().map(|(_, r)| r).collect(),
        },
        errors,
    )
}

async fn run_http_check(client: &Client, cfg: &HttpCheckConfig) -> (HttpCheckResult, bool) {
    let start = Instant::now();
    let req = client
        .get(&cfg.url)
        .timeout(Duration::from_millis(cfg.timeout_ms));

    let (up, status_code, had_error) = match req.send().await {
        Ok(resp) => {
            let code = resp.status().as_u16();
            (code == cfg.expected_status, code, false)
        }
        Err(err) => {
            warn!(check = %cfg.name, error = %err, "http check failed");
            (false, 0, true)
        }
    };

    (
        HttpCheckResult {
            name: cfg.name.clone(),
            up,
            latency_ms: start.elapsed().as_millis() as u64,
            status_code,
        },
        had_error,
    )
}

async fn run_tcp_check(cfg: &TcpCheckConfig) -> (TcpCheckResult, bool) {
    let start = Instant::now();
    let addr = format!("{}:{}", cfg.host, cfg.port);
    let timeout = Duration::from_millis(cfg.timeout_ms);

    let (up, had_error) = match time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => (true, false),
        Ok(Err(err)) => {
            warn!(check = %cfg.name, address = %addr, error = %err, "tcp check failed");
            (false, true)
        }
        Err(_elapsed) => {
            warn!(
                check = %cfg.name,
                address = %addr,
                timeout = %humantime::format_duration(timeout),
                "tcp check timeout"
            );
            (false, true)
        }
    };

    (
        TcpCheckResult {
            name: cfg.name.clone(),
            up,
            latency_ms: start.elapsed().as_millis() as u64,
        },
        had_error,
    )
}
