// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics.

use crate::orchestrator::Classification;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    submissions: IntCounterVec,
    sessions_issued: IntCounter,
    session_issue_failures: IntCounter,
    limiter_degraded: IntCounter,
    sink_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("form_shield".to_string()), None)?;

        let submissions = IntCounterVec::new(
            Opts::new("submissions_total", "Submissions by classification"),
            &["classification"],
        )?;
        let sessions_issued = IntCounter::new("sessions_issued_total", "Sessions issued")?;
        let session_issue_failures = IntCounter::new(
            "session_issue_failures_total",
            "Session issuance refused because the store was unavailable",
        )?;
        let limiter_degraded = IntCounter::new(
            "rate_limiter_degraded_total",
            "Submissions let through because the rate limiter store was unavailable",
        )?;
        let sink_failures = IntCounter::new(
            "sink_failures_total",
            "Classified submissions the sink failed to record",
        )?;

        registry.register(Box::new(submissions.clone()))?;
        registry.register(Box::new(sessions_issued.clone()))?;
        registry.register(Box::new(session_issue_failures.clone()))?;
        registry.register(Box::new(limiter_degraded.clone()))?;
        registry.register(Box::new(sink_failures.clone()))?;

        Ok(Self {
            registry,
            submissions,
            sessions_issued,
            session_issue_failures,
            limiter_degraded,
            sink_failures,
        })
    }

    pub fn submission(&self, classification: Classification) {
        self.submissions
            .with_label_values(&[classification.as_str()])
            .inc();
    }

    pub fn session_issued(&self) {
        self.sessions_issued.inc();
    }

    pub fn session_issue_failed(&self) {
        self.session_issue_failures.inc();
    }

    pub fn limiter_degraded(&self) {
        self.limiter_degraded.inc();
    }

    pub fn sink_failed(&self) {
        self.sink_failures.inc();
    }

    /// Render in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
