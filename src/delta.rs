use crate::collectors::NetCounters;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetRate {
    pub sent_bytes_per_sec: f64,
    pub received_bytes_per_sec: f64,
    pub sent_packets_per_sec: f64,
    pub received_packets_per_sec: f64,
}

impl NetRate {
    pub fn upload_mb_per_sec(&self) -> f64 {
        self.sent_bytes_per_sec / BYTES_PER_MB
    }

    pub fn download_mb_per_sec(&self) -> f64 {
        self.received_bytes_per_sec / BYTES_PER_MB
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterSample {
    pub counters: NetCounters,
    /// `None` until a previous sample of the same interface exists.
    pub rate: Option<NetRate>,
}

/// Rate between two samples of one interface. A counter that went backwards means the
/// interface was reset, which is treated like a first sample.
pub fn compute_rate(
    current: &NetCounters,
    previous: &NetCounters,
    elapsed: Duration,
) -> Option<NetRate> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    if current.bytes_sent < previous.bytes_sent
        || current.bytes_received < previous.bytes_received
        || current.packets_sent < previous.packets_sent
        || current.packets_received < previous.packets_received
    {
        return None;
    }

    Some(NetRate {
        sent_bytes_per_sec: (current.bytes_sent - previous.bytes_sent) as f64 / secs,
        received_bytes_per_sec: (current.bytes_received - previous.bytes_received) as f64 / secs,
        sent_packets_per_sec: (current.packets_sent - previous.packets_sent) as f64 / secs,
        received_packets_per_sec: (current.packets_received - previous.packets_received) as f64
            / secs,
    })
}

/// Keeps the previous network sample between polls.
#[derive(Debug, Default)]
pub struct RateTracker {
    previous: HashMap<String, NetCounters>,
    taken_at: Option<Instant>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, samples: &[NetCounters], now: Instant) -> Vec<AdapterSample> {
        let elapsed = self
            .taken_at
            .map(|prev| now.saturating_duration_since(prev));

        let out = samples
            .iter()
            .map(|current| {
                let rate = match (self.previous.get(&current.name), elapsed) {
                    (Some(previous), Some(elapsed)) => compute_rate(current, previous, elapsed),
                    _ => None,
                };
                AdapterSample {
                    counters: current.clone(),
                    rate,
                }
            })
            .collect();

        self.previous = samples
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();
        self.taken_at = Some(now);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(name: &str, sent: u64, received: u64) -> NetCounters {
        NetCounters {
            name: name.to_string(),
            mac_address: None,
            bytes_sent: sent,
            bytes_received: received,
            packets_sent: sent / 100,
            packets_received: received / 100,
        }
    }

    #[test]
    fn first_sample_has_no_rate() {
        let mut tracker = RateTracker::new();
        let out = tracker.observe(&[counters("eth0", 1_000, 2_000)], Instant::now());
        assert_eq!(out.len(), 1);
        assert!(out[0].rate.is_none());
    }

    #[test]
    fn rate_is_delta_over_elapsed() {
        let mut tracker = RateTracker::new();
        let start = Instant::now();
        tracker.observe(&[counters("eth0", 1_000, 2_000)], start);
        let out = tracker.observe(
            &[counters("eth0", 3_000, 10_000)],
            start + Duration::from_secs(2),
        );
        let rate = out[0].rate.expect("скорость после второго замера");
        assert_eq!(rate.sent_bytes_per_sec, 1_000.0);
        assert_eq!(rate.received_bytes_per_sec, 4_000.0);
        assert_eq!(rate.sent_packets_per_sec, 10.0);
    }

    #[test]
    fn new_interface_and_reset_counters_yield_no_rate() {
        let mut tracker = RateTracker::new();
        let start = Instant::now();
        tracker.observe(&[counters("eth0", 5_000, 5_000)], start);
        let out = tracker.observe(
            &[counters("eth0", 100, 100), counters("wlan0", 10, 10)],
            start + Duration::from_secs(1),
        );
        assert!(out.iter().all(|s| s.rate.is_none()));

        let out = tracker.observe(
            &[counters("eth0", 300, 100), counters("wlan0", 10, 10)],
            start + Duration::from_secs(2),
        );
        assert_eq!(out[0].rate.map(|r| r.sent_bytes_per_sec), Some(200.0));
        assert_eq!(out[1].rate.map(|r| r.sent_bytes_per_sec), Some(0.0));
    }

    #[test]
    fn rates_are_never_negative_for_monotonic_counters() {
        let mut tracker = RateTracker::new();
        let start = Instant::now();
        let mut sent = 0_u64;
        for step in 0..20_u64 {
            sent += step * 37;
            let out = tracker.observe(
                &[counters("eth0", sent, sent * 2)],
                start + Duration::from_millis(250 * step),
            );
            if let Some(rate) = out[0].rate {
                assert!(rate.sent_bytes_per_sec >= 0.0);
                assert!(rate.received_bytes_per_sec >= 0.0);
            }
        }
    }

    #[test]
    fn zero_elapsed_yields_no_rate() {
        let a = counters("eth0", 10, 10);
        assert!(compute_rate(&a, &a, Duration::ZERO).is_none());
    }

    #[test]
    fn mb_per_sec_conversion() {
        let rate = NetRate {
            sent_bytes_per_sec: BYTES_PER_MB * 2.0,
            received_bytes_per_sec: BYTES_PER_MB / 2.0,
            sent_packets_per_sec: 0.0,
            received_packets_per_sec: 0.0,
        };
        assert_eq!(rate.upload_mb_per_sec(), 2.0);
        assert_eq!(rate.download_mb_per_sec(), 0.5);
    }
}
