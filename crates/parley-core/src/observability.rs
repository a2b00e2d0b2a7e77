//! Wire-level tracing gate (§10.1 of SPEC_FULL). Disabled by default; the
//! hub uses this to log inbound/outbound frames at `trace` without bloating
//! normal `info`-level logs.

const WIRE_TRACE_ENV: &str = "PARLEY_WIRE_TRACE";
const PREVIEW_LEN: usize = 256;

pub fn wire_trace_enabled() -> bool {
    std::env::var(WIRE_TRACE_ENV)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Truncates a payload preview for logging so large E2EE/chat ciphertext
/// never floods the log, while still showing enough to debug framing.
pub fn preview(payload: &str) -> String {
    if payload.len() <= PREVIEW_LEN {
        payload.to_string()
    } else {
        format!("{}... ({} bytes total)", &payload[..PREVIEW_LEN], payload.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payloads_pass_through_untruncated() {
        assert_eq!(preview("hello"), "hello");
    }

    #[test]
    fn long_payloads_are_truncated_with_a_size_suffix() {
        let long = "a".repeat(1000);
        let result = preview(&long);
        assert!(result.contains("1000 bytes total"));
        assert!(result.len() < long.len());
    }
}
