//! Host pattern matching: `ALL`, hostname globs, exact IPv4 addresses and
//! CIDR ranges, each optionally negated with a leading `!`. Matching is
//! purely textual or arithmetic; no resolver is ever consulted.

use std::net::Ipv4Addr;

pub(super) fn matches(pattern: &str, short_host: &str, fqdn: &str) -> bool {
    if let Some(body) = pattern.strip_prefix('!') {
        return !matches_body(body.trim_start(), short_host, fqdn);
    }
    matches_body(pattern, short_host, fqdn)
}

fn matches_body(body: &str, short_host: &str, fqdn: &str) -> bool {
    if body == "ALL" {
        return true;
    }

    if let Some((network, prefix_len)) = parse_cidr(body) {
        return [short_host, fqdn]
            .iter()
            .filter_map(|name| name.parse::<Ipv4Addr>().ok())
            .any(|addr| cidr_contains(network, prefix_len, addr));
    }

    if let Ok(pattern_addr) = body.parse::<Ipv4Addr>() {
        return [short_host, fqdn]
            .iter()
            .filter_map(|name| name.parse::<Ipv4Addr>().ok())
            .any(|addr| addr == pattern_addr);
    }

    // hostnames compare case-insensitively
    let body = body.to_lowercase();
    let short_host = short_host.to_lowercase();
    let fqdn = fqdn.to_lowercase();
    if body == short_host || body == fqdn {
        return true;
    }

    if body.contains(['*', '?', '[']) {
        if let Ok(pattern) = glob::Pattern::new(&body) {
            return pattern.matches(&short_host) || pattern.matches(&fqdn);
        }
    }

    false
}

fn parse_cidr(s: &str) -> Option<(Ipv4Addr, u32)> {
    let (addr, len) = s.split_once('/')?;
    let addr = addr.parse::<Ipv4Addr>().ok()?;
    let len = len.parse::<u32>().ok()?;
    if len > 32 {
        return None;
    }
    Some((addr, len))
}

fn cidr_contains(network: Ipv4Addr, prefix_len: u32, addr: Ipv4Addr) -> bool {
    if prefix_len == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - prefix_len);
    (u32::from(network) & mask) == (u32::from(addr) & mask)
}

#[cfg(test)]
mod tests {
    use super::matches;

    const SHORT: &str = "web1";
    const FQDN: &str = "web1.prod.example.com";

    #[test]
    fn all_matches_everything() {
        assert!(matches("ALL", SHORT, FQDN));
    }

    #[test]
    fn exact_names_match_either_form() {
        assert!(matches("web1", SHORT, FQDN));
        assert!(matches("web1.prod.example.com", SHORT, FQDN));
        assert!(matches("WEB1", SHORT, FQDN));
        assert!(!matches("web2", SHORT, FQDN));
    }

    #[test]
    fn globs_match_both_forms() {
        assert!(matches("web*", SHORT, FQDN));
        assert!(matches("*.example.com", SHORT, FQDN));
        assert!(matches("web?.prod.*", SHORT, FQDN));
        assert!(!matches("db*", SHORT, FQDN));
    }

    #[test]
    fn negation_inverts_the_match() {
        assert!(!matches("!web1", SHORT, FQDN));
        assert!(matches("!db*", SHORT, FQDN));
        assert!(!matches("!ALL", SHORT, FQDN));
    }

    #[test]
    fn ipv4_literals_compare_as_addresses() {
        assert!(matches("10.0.0.5", "10.0.0.5", "10.0.0.5"));
        assert!(!matches("10.0.0.5", "10.0.0.6", "10.0.0.6"));
        // an IP pattern never matches a non-IP hostname
        assert!(!matches("10.0.0.5", SHORT, FQDN));
    }

    #[test]
    fn cidr_containment_is_arithmetic() {
        assert!(matches("10.0.0.0/8", "10.3.2.1", "10.3.2.1"));
        assert!(matches("192.168.1.0/24", "192.168.1.77", "192.168.1.77"));
        assert!(!matches("192.168.1.0/24", "192.168.2.1", "192.168.2.1"));
        assert!(matches("0.0.0.0/0", "203.0.113.9", "203.0.113.9"));
        assert!(!matches("10.0.0.0/8", SHORT, FQDN));
        // invalid prefix lengths never match
        assert!(!matches("10.0.0.0/40", "10.0.0.1", "10.0.0.1"));
    }

    #[test]
    fn negated_cidr() {
        assert!(!matches("!10.0.0.0/8", "10.1.1.1", "10.1.1.1"));
        assert!(matches("!10.0.0.0/8", "192.168.0.1", "192.168.0.1"));
    }
}
