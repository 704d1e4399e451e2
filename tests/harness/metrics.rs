// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Metrics collection for attack simulation results.

use form_shield::orchestrator::Classification;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Collects metrics during attack simulation.
#[derive(Debug, Default)]
pub struct AttackMetrics {
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    /// Count of submissions by classification
    outcomes: HashMap<Classification, usize>,
    /// Submissions the submitter was told succeeded
    accepted: usize,
    /// Count of submissions by IP
    requests_per_ip: HashMap<String, usize>,
    /// Latency samples (microseconds)
    latencies: Vec<u64>,
}

impl AttackMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Record one submission outcome.
    pub fn record(
        &mut self,
        classification: Classification,
        accepted: bool,
        ip: &str,
        latency: Duration,
    ) {
        *self.outcomes.entry(classification).or_insert(0) += 1;
        if accepted {
            self.accepted += 1;
        }
        *self.requests_per_ip.entry(ip.to_string()).or_insert(0) += 1;
        self.latencies.push(latency.as_micros() as u64);
    }

    pub fn total_requests(&self) -> usize {
        self.outcomes.values().sum()
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.outcomes.get(&classification).copied().unwrap_or(0)
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Ratio of submissions that did not reach the sink as legitimate.
    pub fn block_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        let legitimate = self.count(Classification::Legitimate);
        (total - legitimate) as f64 / total as f64
    }

    /// Get p99 latency in microseconds.
    pub fn p99_latency_us(&self) -> u64 {
        if self.latencies.is_empty() {
            return 0;
        }
        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        let idx = (sorted.len() as f64 * 0.99) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn unique_ips(&self) -> usize {
        self.requests_per_ip.len()
    }

    /// Generate a summary report.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            total_requests: self.total_requests(),
            accepted: self.accepted,
            legitimate: self.count(Classification::Legitimate),
            spam: self.count(Classification::Spam),
            session_invalid: self.count(Classification::SessionInvalid),
            rate_limited: self.count(Classification::RateLimited),
            validation_failed: self.count(Classification::ValidationFailed),
            duration_ms: self.duration().as_millis() as u64,
            block_rate: self.block_rate(),
            p99_latency_us: self.p99_latency_us(),
            unique_ips: self.unique_ips(),
        }
    }
}

/// Summary report of attack metrics.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    pub total_requests: usize,
    pub accepted: usize,
    pub legitimate: usize,
    pub spam: usize,
    pub session_invalid: usize,
    pub rate_limited: usize,
    pub validation_failed: usize,
    pub duration_ms: u64,
    pub block_rate: f64,
    pub p99_latency_us: u64,
    pub unique_ips: usize,
}

impl std::fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Attack Metrics Report ===")?;
        writeln!(f, "Duration:          {} ms", self.duration_ms)?;
        writeln!(f, "Total Requests:    {}", self.total_requests)?;
        writeln!(f, "Told Accepted:     {}", self.accepted)?;
        writeln!(f)?;
        writeln!(f, "--- Classification ---")?;
        writeln!(f, "Legitimate:        {}", self.legitimate)?;
        writeln!(f, "Spam:              {}", self.spam)?;
        writeln!(f, "Session Invalid:   {}", self.session_invalid)?;
        writeln!(f, "Rate Limited:      {}", self.rate_limited)?;
        writeln!(f, "Validation Failed: {}", self.validation_failed)?;
        writeln!(f, "Block Rate:        {:.1}%", self.block_rate * 100.0)?;
        writeln!(f)?;
        writeln!(f, "P99 Latency:       {} us", self.p99_latency_us)?;
        writeln!(f, "Unique IPs:        {}", self.unique_ips)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        let mut metrics = AttackMetrics::new();
        metrics.start();

        metrics.record(Classification::Legitimate, true, "10.0.0.1", Duration::from_micros(100));
        metrics.record(Classification::Spam, true, "10.0.0.1", Duration::from_micros(150));
        metrics.record(Classification::RateLimited, false, "10.0.0.2", Duration::from_micros(50));

        metrics.finish();

        assert_eq!(metrics.total_requests(), 3);
        assert_eq!(metrics.accepted(), 2);
        assert_eq!(metrics.count(Classification::Spam), 1);
        assert_eq!(metrics.unique_ips(), 2);
        assert!((metrics.block_rate() - 2.0 / 3.0).abs() < 0.01);
    }
}
