/// Marker that opens a tmate remote-shell invocation line.
pub const SSH_MARKER: &str = "ssh ";

/// First log line (trimmed) containing both `marker` and `host`.
///
/// Matching is case-sensitive substring containment, in document order.
pub fn find_connection_line<'a>(logs: &'a str, marker: &str, host: &str) -> Option<&'a str> {
    logs.lines()
        .find(|line| line.contains(marker) && line.contains(host))
        .map(str::trim)
}
