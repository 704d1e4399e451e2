// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for attack simulation.

use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Well-formed session ids that were never issued.
pub fn generate_forged_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{:064x}", i as u128 * 0x9e37_79b9_7f4a_7c15)).collect()
}

/// Ids a guesser might try that are not even well formed.
pub fn generate_malformed_ids() -> Vec<String> {
    vec![
        String::new(),
        "   ".to_string(),
        "null".to_string(),
        "undefined".to_string(),
        "abc".to_string(),
        "z".repeat(64),
        "A".repeat(64),
        "0".repeat(63),
        "0".repeat(65),
        "../../etc/passwd".to_string(),
        "session:abc".to_string(),
    ]
}

/// What a filler bot puts into every input it finds.
pub fn generate_spam_values() -> Vec<&'static str> {
    vec![
        "x",
        "http://cheap-pills.example/buy",
        "Great post! Visit my site",
        "<a href=\"http://spam.example\">click</a>",
        "1",
        "   padded   ",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_forged_ids_are_well_formed() {
        let ids = generate_forged_ids(10);
        assert!(ids.iter().all(|id| id.len() == 64));
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 10);
    }
}
