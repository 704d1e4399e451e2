// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for bot attack simulation.
//!
//! Drives the submission pipeline with the request patterns form spam bots
//! actually use, and collects per-outcome metrics.

pub mod attacks;
pub mod generators;
pub mod metrics;
