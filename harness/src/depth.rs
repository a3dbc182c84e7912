//! Recursion ceiling for self-invoking agents.
//!
//! An agent under test may itself shell out to this harness (a self-testing
//! skill, for example). The depth travels through the environment: the entry
//! point reads it once, threads it explicitly through the run, and the
//! invoker stamps `depth + 1` onto every spawned agent process.

use anyhow::{Result, bail};

/// Environment variable carrying the recursion depth across process spawns.
pub const DEPTH_ENV_VAR: &str = "AGENT_TEST_DEPTH";

/// Maximum nesting of harness runs before the process refuses to start.
pub const MAX_DEPTH: u32 = 2;

/// Read the inherited recursion depth from the environment.
pub fn inherited_depth() -> u32 {
    parse_depth(std::env::var(DEPTH_ENV_VAR).ok().as_deref())
}

/// Unset or unparseable values count as depth 0.
pub fn parse_depth(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(0)
}

/// Refuse to run past the recursion ceiling.
pub fn check_depth(depth: u32) -> Result<()> {
    if depth > MAX_DEPTH {
        bail!("maximum test recursion depth ({MAX_DEPTH}) exceeded");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_within_ceiling_passes() {
        check_depth(0).expect("depth 0");
        check_depth(MAX_DEPTH).expect("depth at ceiling");
    }

    #[test]
    fn depth_past_ceiling_fails() {
        let err = check_depth(MAX_DEPTH + 1).expect_err("past ceiling");
        assert!(err.to_string().contains("recursion depth"));
    }

    #[test]
    fn parses_inherited_values() {
        assert_eq!(parse_depth(None), 0);
        assert_eq!(parse_depth(Some("")), 0);
        assert_eq!(parse_depth(Some("not-a-number")), 0);
        assert_eq!(parse_depth(Some("1")), 1);
        assert_eq!(parse_depth(Some(" 2 ")), 2);
    }
}
