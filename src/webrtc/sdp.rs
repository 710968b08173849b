//! Offer-side SDP munging
//!
//! Rate control is server-driven through the config channel, so the
//! browser's congestion-control feedback is stripped from the offer before
//! negotiation and never makes it into the answer.

/// Remove `transport-cc` and `goog-remb` feedback lines from an SDP.
pub fn strip_receiver_feedback(sdp: &str) -> String {
    let had_trailing_newline = sdp.ends_with('\n');
    let mut out: String = sdp
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.contains("transport-cc") && !line.contains("goog-remb"))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\r\n");
    if had_trailing_newline {
        out.push_str("\r\n");
    }
    out
}
