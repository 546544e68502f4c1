use axum::http::{header, HeaderMap, HeaderValue};

/// Subprotocol carrying raw-DEFLATE compressed frames
pub const COMPRESSED_SUBPROTOCOL: &str = "dotlz";

/// Subprotocol carrying plain text frames
pub const PLAIN_SUBPROTOCOL: &str = "dotl";

/// Server preference order, most preferred first
pub const SUPPORTED_SUBPROTOCOLS: [&str; 2] = [COMPRESSED_SUBPROTOCOL, PLAIN_SUBPROTOCOL];

/// Outcome of the subprotocol negotiation for one upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    pub use_compression: bool,
    /// Echoed back in the handshake response; `None` means no overlap.
    pub subprotocol: Option<&'static str>,
}

impl Negotiation {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let offered = offered_subprotocols(headers);
        negotiate(offered.iter().map(String::as_str))
    }
}

/// Collect the client's offered subprotocols in the order they were sent.
///
/// The header may appear several times and each value may be a comma
/// separated list.
pub fn offered_subprotocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fold repeated `Sec-WebSocket-Protocol` lines into a single comma
/// separated value. The upgrade extractor only reads the first line.
pub fn merge_offered_subprotocols(headers: &mut HeaderMap) {
    if headers.get_all(header::SEC_WEBSOCKET_PROTOCOL).iter().count() < 2 {
        return;
    }
    let merged = offered_subprotocols(headers).join(", ");
    headers.remove(header::SEC_WEBSOCKET_PROTOCOL);
    if let Ok(value) = HeaderValue::from_str(&merged) {
        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, value);
    }
}

/// Pick the first server-supported subprotocol the client also offered.
pub fn select_subprotocol<'a>(offered: impl IntoIterator<Item = &'a str>) -> Option<&'static str> {
    let offered: Vec<&str> = offered.into_iter().collect();
    SUPPORTED_SUBPROTOCOLS
        .into_iter()
        .find(|supported| offered.iter().any(|o| o == supported))
}

pub fn uses_compression(chosen: Option<&str>) -> bool {
    chosen == Some(COMPRESSED_SUBPROTOCOL)
}

pub fn negotiate<'a>(offered: impl IntoIterator<Item = &'a str>) -> Negotiation {
    let subprotocol = select_subprotocol(offered);
    Negotiation {
        use_compression: uses_compression(subprotocol),
        subprotocol,
    }
}

/// Whether an established socket runs the compressed framing
pub fn socket_uses_compression(protocol: Option<&HeaderValue>) -> bool {
    uses_compression(protocol.and_then(|p| p.to_str().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_preference_wins_over_client_order() {
        let n = negotiate(["dotl", "dotlz"]);
        assert_eq!(n.subprotocol, Some("dotlz"));
        assert!(n.use_compression);
    }

    #[test]
    fn plain_only_offer_disables_compression() {
        let n = negotiate(["dotl"]);
        assert_eq!(n.subprotocol, Some("dotl"));
        assert!(!n.use_compression);
    }

    #[test]
    fn no_overlap_falls_back_to_plain() {
        let none = negotiate(std::iter::empty());
        assert_eq!(none, Negotiation { use_compression: false, subprotocol: None });

        let unrelated = negotiate(["chat", "graphql-ws"]);
        assert_eq!(unrelated, Negotiation { use_compression: false, subprotocol: None });
    }

    #[test]
    fn names_are_matched_exactly() {
        assert_eq!(negotiate(["DOTLZ"]).subprotocol, None);
    }

    #[test]
    fn header_lists_are_split_and_trimmed() {
        let mut headers = HeaderMap::new();
        headers.append(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("chat,  dotl"));
        headers.append(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("dotlz"));

        assert_eq!(offered_subprotocols(&headers), vec!["chat", "dotl", "dotlz"]);
        assert!(Negotiation::from_headers(&headers).use_compression);
    }

    #[test]
    fn repeated_header_lines_are_folded_into_one() {
        let mut headers = HeaderMap::new();
        headers.append(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("chat"));
        headers.append(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("dotlz, dotl"));

        merge_offered_subprotocols(&mut headers);
        assert_eq!(headers.get_all(header::SEC_WEBSOCKET_PROTOCOL).iter().count(), 1);
        assert_eq!(headers[header::SEC_WEBSOCKET_PROTOCOL], "chat, dotlz, dotl");

        let mut single = HeaderMap::new();
        single.insert(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("dotl ,dotlz"));
        merge_offered_subprotocols(&mut single);
        assert_eq!(single[header::SEC_WEBSOCKET_PROTOCOL], "dotl ,dotlz");
    }

    #[test]
    fn socket_protocol_decides_compression() {
        assert!(socket_uses_compression(Some(&HeaderValue::from_static("dotlz"))));
        assert!(!socket_uses_compression(Some(&HeaderValue::from_static("dotl"))));
        assert!(!socket_uses_compression(None));
    }
}
