// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bot behaviour patterns for security testing.

/// How a simulated bot obtains and fills in the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotBehavior {
    /// Fetches a fresh session and fills every field, decoy included
    FillEverything,
    /// Fetches a fresh session but fills a decoy scraped from a cached page
    StaleDecoy,
    /// Fetches one session and resubmits it over and over
    TokenReplay,
    /// Never fetches a session; invents session ids
    ForgedToken,
    /// Omits the session id entirely
    NoToken,
    /// Behaves like a browser: fresh session, decoy left empty
    Mimic,
}

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of submissions to send
    pub total_requests: usize,
    /// Number of unique client IPs to rotate through
    pub unique_ips: usize,
    pub behavior: BotBehavior,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 1,
            behavior: BotBehavior::FillEverything,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Naive bot from one address filling every input it finds.
    pub fn naive_bot() -> Self {
        Self {
            total_requests: 50,
            unique_ips: 1,
            behavior: BotBehavior::FillEverything,
        }
    }

    /// Botnet filling every field, spread over many addresses.
    pub fn distributed_fillers() -> Self {
        Self {
            total_requests: 200,
            unique_ips: 50,
            behavior: BotBehavior::FillEverything,
        }
    }

    /// Scraper replaying a decoy name from a cached copy of the page.
    pub fn cached_page_bot() -> Self {
        Self {
            total_requests: 50,
            unique_ips: 5,
            behavior: BotBehavior::StaleDecoy,
        }
    }

    /// One captured token submitted repeatedly.
    pub fn replay_attack() -> Self {
        Self {
            total_requests: 40,
            unique_ips: 4,
            behavior: BotBehavior::TokenReplay,
        }
    }

    /// Guessing session ids instead of requesting them.
    pub fn forgery_attack() -> Self {
        Self {
            total_requests: 60,
            unique_ips: 10,
            behavior: BotBehavior::ForgedToken,
        }
    }

    /// Posting straight to the endpoint without any token.
    pub fn tokenless_flood() -> Self {
        Self {
            total_requests: 250,
            unique_ips: 1,
            behavior: BotBehavior::NoToken,
        }
    }

    /// Browser-mimicking bot from one address, held back only by the limiter.
    pub fn headless_browser_flood() -> Self {
        Self {
            total_requests: 150,
            unique_ips: 1,
            behavior: BotBehavior::Mimic,
        }
    }
}

/// Expected outcomes for an attack pattern.
pub struct AttackExpectations {
    /// Most submissions that may be classified legitimate
    pub max_legitimate: usize,
    /// Whether every delivered submission must carry the spam flag
    pub all_delivered_are_spam: bool,
    /// Description of expected behavior
    pub description: &'static str,
}

impl AttackConfig {
    /// Expected outcomes under a limit of `max_requests` per identity.
    pub fn expectations(&self, max_requests: usize) -> AttackExpectations {
        match self.behavior {
            BotBehavior::FillEverything | BotBehavior::StaleDecoy => AttackExpectations {
                max_legitimate: 0,
                all_delivered_are_spam: true,
                description: "Decoy fills are classified spam, never legitimate",
            },
            BotBehavior::TokenReplay => AttackExpectations {
                max_legitimate: 1,
                all_delivered_are_spam: false,
                description: "A captured token is accepted at most once",
            },
            BotBehavior::ForgedToken | BotBehavior::NoToken => AttackExpectations {
                max_legitimate: 0,
                all_delivered_are_spam: true,
                description: "Submissions without an issued token never get through",
            },
            BotBehavior::Mimic => AttackExpectations {
                max_legitimate: max_requests * self.unique_ips,
                all_delivered_are_spam: false,
                description: "A convincing bot is capped by the per-identity limit",
            },
        }
    }
}
