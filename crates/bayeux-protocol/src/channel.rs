//! Channel names for the Bayeux protocol.
//!
//! Channels are hierarchical identifiers of the form `/seg1/seg2/...`.
//! A *name* contains only literal segments. A *pattern* ends in `*`
//! (exactly one segment) or `**` (zero or more trailing segments).

/// Handshake meta channel.
pub const HANDSHAKE: &str = "/meta/handshake";
/// Connect meta channel.
pub const CONNECT: &str = "/meta/connect";
/// Subscribe meta channel.
pub const SUBSCRIBE: &str = "/meta/subscribe";
/// Unsubscribe meta channel.
pub const UNSUBSCRIBE: &str = "/meta/unsubscribe";
/// Disconnect meta channel.
pub const DISCONNECT: &str = "/meta/disconnect";

/// First segment of protocol control channels.
pub const META: &str = "meta";
/// First segment of point-to-point service channels.
pub const SERVICE: &str = "service";

/// Wildcard matching exactly one segment.
pub const WILDCARD: &str = "*";
/// Wildcard matching zero or more trailing segments.
pub const DEEP_WILDCARD: &str = "**";

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '!' | '~' | '(' | ')' | '$' | '@')
}

fn is_literal_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(is_segment_char)
}

/// Split a string into raw segments, requiring a leading `/`.
fn raw_segments(name: &str) -> Option<std::str::Split<'_, char>> {
    name.strip_prefix('/').map(|rest| rest.split('/'))
}

/// Check whether `name` is a literal channel name (no wildcards).
#[must_use]
pub fn is_name(name: &str) -> bool {
    raw_segments(name).is_some_and(|mut segments| segments.all(is_literal_segment))
}

/// Check whether `name` is a wildcard pattern.
#[must_use]
pub fn is_pattern(name: &str) -> bool {
    let Some(segments) = raw_segments(name) else {
        return false;
    };
    let segments: Vec<&str> = segments.collect();
    let Some((last, prefix)) = segments.split_last() else {
        return false;
    };
    (*last == WILDCARD || *last == DEEP_WILDCARD) && prefix.iter().all(|s| is_literal_segment(s))
}

/// Check whether `name` is either a valid channel name or a valid pattern.
#[must_use]
pub fn is_valid(name: &str) -> bool {
    is_name(name) || is_pattern(name)
}

/// Parse a channel name or pattern into its segments.
///
/// Returns `None` if the input matches neither grammar.
#[must_use]
pub fn parse(name: &str) -> Option<Vec<&str>> {
    if !is_valid(name) {
        return None;
    }
    raw_segments(name).map(Iterator::collect)
}

/// Join segments back into a channel name.
#[must_use]
pub fn unparse<S: AsRef<str>>(segments: &[S]) -> String {
    let mut name = String::new();
    for segment in segments {
        name.push('/');
        name.push_str(segment.as_ref());
    }
    name
}

fn first_segment_is(name: &str, expected: &str) -> bool {
    parse(name).is_some_and(|segments| segments.first() == Some(&expected))
}

/// Check whether the channel lives in the `/meta` namespace.
#[must_use]
pub fn is_meta(name: &str) -> bool {
    first_segment_is(name, META)
}

/// Check whether the channel lives in the `/service` namespace.
#[must_use]
pub fn is_service(name: &str) -> bool {
    first_segment_is(name, SERVICE)
}

/// Check whether a remote client may subscribe to the channel.
#[must_use]
pub fn is_subscribable(name: &str) -> bool {
    is_valid(name) && !is_meta(name) && !is_service(name)
}

/// Expand a channel name into every pattern that matches it.
///
/// The order is deterministic: the global wildcard, the name itself,
/// the name with its last segment replaced by `*`, then each proper
/// prefix followed by `**`, shortest first.
///
/// Invalid names expand to nothing.
#[must_use]
pub fn expand(name: &str) -> Vec<String> {
    let Some(segments) = parse(name) else {
        return Vec::new();
    };

    let mut channels = Vec::with_capacity(segments.len() + 2);
    channels.push(unparse(&[DEEP_WILDCARD]));
    channels.push(name.to_string());

    let mut copy = segments.clone();
    if let Some(last) = copy.last_mut() {
        *last = WILDCARD;
    }
    channels.push(unparse(&copy));

    for i in 1..segments.len() {
        let mut prefix = segments[..i].to_vec();
        prefix.push(DEEP_WILDCARD);
        channels.push(unparse(&prefix));
    }

    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand() {
        assert_eq!(expand("/foo"), vec!["/**", "/foo", "/*"]);
        assert_eq!(expand("/foo/bar"), vec!["/**", "/foo/bar", "/foo/*", "/foo/**"]);
        assert_eq!(
            expand("/foo/bar/qux"),
            vec!["/**", "/foo/bar/qux", "/foo/bar/*", "/foo/**", "/foo/bar/**"]
        );
    }

    #[test]
    fn test_expand_invalid() {
        assert!(expand("foo").is_empty());
        assert!(expand("").is_empty());
    }

    #[test]
    fn test_name_grammar() {
        assert!(is_name("/foo"));
        assert!(is_name("/foo/bar-baz_(1)/$x@y!~"));
        assert!(!is_name("/"));
        assert!(!is_name("foo"));
        assert!(!is_name("/foo//bar"));
        assert!(!is_name("/foo/"));
        assert!(!is_name("/foo/*"));
        assert!(!is_name("/foo bar"));
    }

    #[test]
    fn test_pattern_grammar() {
        assert!(is_pattern("/*"));
        assert!(is_pattern("/**"));
        assert!(is_pattern("/foo/*"));
        assert!(is_pattern("/foo/bar/**"));
        assert!(!is_pattern("/foo/*/bar"));
        assert!(!is_pattern("/foo/***"));
        assert!(!is_pattern("/foo"));
        assert!(!is_pattern("/foo//*"));
    }

    #[test]
    fn test_parse_unparse() {
        assert_eq!(parse("/foo/bar"), Some(vec!["foo", "bar"]));
        assert_eq!(parse("/foo/**"), Some(vec!["foo", "**"]));
        assert_eq!(parse("/foo/*/bar"), None);
        assert_eq!(unparse(&["foo", "bar"]), "/foo/bar");
    }

    #[test]
    fn test_namespaces() {
        assert!(is_meta(CONNECT));
        assert!(is_meta("/meta/*"));
        assert!(!is_meta("/metadata"));
        assert!(is_service("/service/echo"));
        assert!(!is_meta("not a channel"));

        assert!(is_subscribable("/chat/room"));
        assert!(is_subscribable("/**"));
        assert!(!is_subscribable(HANDSHAKE));
        assert!(!is_subscribable("/service/echo"));
        assert!(!is_subscribable("/chat//room"));
    }

    #[test]
    fn test_subscribable_is_neither_meta_nor_service() {
        let names = [
            "/foo",
            "/meta/connect",
            "/service/rpc",
            "/meta/**",
            "/a/b/c/*",
            "/service",
            "/meta",
        ];
        for name in names {
            assert!(is_valid(name));
            assert_eq!(is_subscribable(name), !is_meta(name) && !is_service(name));
        }
    }
}
