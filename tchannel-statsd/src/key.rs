//! Flat statsd keys for call and connection stats.
//!
//! Statsd sinks have no notion of tags, so the identities of a call are folded into the metric key
//! itself. [`default_metric_prefix`] derives that key from a metric name and the tags attached by
//! the runtime:
//!
//! ```
//! use tchannel_statsd::{StatsTags, default_metric_prefix};
//!
//! let tags = StatsTags::from([
//!     ("service".to_owned(), "callerS".to_owned()),
//!     ("target-service".to_owned(), "targetS".to_owned()),
//!     ("target-endpoint".to_owned(), "targetE".to_owned()),
//! ]);
//!
//! assert_eq!(
//!     default_metric_prefix("outbound.calls.sent", Some(&tags)),
//!     "tchannel.outbound.calls.sent.callerS.targetS.targetE",
//! );
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Tags attached to a stat, keyed by tag name.
pub type StatsTags = BTreeMap<String, String>;

/// Namespace that every composed key starts with.
pub const NAMESPACE: &str = "tchannel";

/// Substituted when neither `calling-service` nor `service` is tagged.
pub const NO_CALLING_SERVICE: &str = "no-calling-service";

/// Substituted when neither `target-service` nor `service` is tagged.
pub const NO_SERVICE: &str = "no-service";

/// Substituted when neither `target-endpoint` nor `endpoint` is tagged.
pub const NO_ENDPOINT: &str = "no-endpoint";

/// Substituted when a connection stat has no `peer-host-port` tag.
pub const NO_PEER_HOST_PORT: &str = "no-peer-host-port";

/// Tag names the key composer reads.
///
/// Outbound calls are tagged with the local service as `service` and the peer under `target-*`.
/// Inbound calls carry the local service as `service`/`endpoint` and the peer as
/// `calling-service`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TagRole {
    /// The local service.
    Service,
    /// The service an outbound call is sent to.
    TargetService,
    /// The endpoint an outbound call is sent to.
    TargetEndpoint,
    /// The local endpoint an inbound call is handled by.
    Endpoint,
    /// The service an inbound call originates from.
    CallingService,
    /// Host and port of the remote side of a connection.
    PeerHostPort,
}

impl TagRole {
    /// Returns the tag name for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::TargetService => "target-service",
            Self::TargetEndpoint => "target-endpoint",
            Self::Endpoint => "endpoint",
            Self::CallingService => "calling-service",
            Self::PeerHostPort => "peer-host-port",
        }
    }
}

impl fmt::Display for TagRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` for characters that cannot appear in a segment of a dotted statsd key.
fn is_reserved(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | ':' | '{' | '}' | '\\' | '/')
}

/// Replaces every character that would break a dotted statsd key with `-`.
///
/// Reserved are whitespace (including non-ASCII whitespace such as `U+00A0`), `.`, `:`, `{`, `}`,
/// `\` and `/`. Each reserved character becomes one `-`, so the result has the same character
/// count as the input. Strings without reserved characters are returned as is.
///
/// # Example
///
/// ```
/// use tchannel_statsd::clean;
///
/// assert_eq!(clean("met:ric"), "met-ric");
/// assert_eq!(clean("  met.ric  "), "--met-ric--");
/// ```
pub fn clean(s: &str) -> Cow<'_, str> {
    if !s.contains(is_reserved) {
        return Cow::Borrowed(s);
    }

    Cow::Owned(
        s.chars()
            .map(|c| if is_reserved(c) { '-' } else { c })
            .collect(),
    )
}

/// Like [`clean`], but drops everything from the first `:` on.
///
/// Connection stats are keyed by peer host, the port would only multiply the number of keys.
///
/// ```
/// use tchannel_statsd::clean_host_port;
///
/// assert_eq!(clean_host_port("10.0.0.1:4040"), "10-0-0-1");
/// ```
pub fn clean_host_port(s: &str) -> Cow<'_, str> {
    let host = s.split_once(':').map_or(s, |(host, _)| host);
    clean(host)
}

/// Returns the first non-empty value tagged under one of the given roles.
fn resolve<'a>(tags: Option<&'a StatsTags>, roles: &[TagRole]) -> Option<&'a str> {
    let tags = tags?;
    roles
        .iter()
        .filter_map(|role| tags.get(role.as_str()))
        .map(String::as_str)
        .find(|value| !value.is_empty())
}

fn segment<'a>(
    tags: Option<&'a StatsTags>,
    roles: &[TagRole],
    fallback: &'static str,
) -> Cow<'a, str> {
    match resolve(tags, roles) {
        Some(value) => clean(value),
        None => Cow::Borrowed(fallback),
    }
}

/// Composes the flat statsd key for a call stat.
///
/// The key has the form `tchannel.<name>.<caller>.<service>.<endpoint>`, where each identity
/// segment is taken from the first non-empty tag of its roles:
///
/// | Segment    | Roles                                | Fallback             |
/// |------------|--------------------------------------|----------------------|
/// | `caller`   | `calling-service`, then `service`    | `no-calling-service` |
/// | `service`  | `target-service`, then `service`     | `no-service`         |
/// | `endpoint` | `target-endpoint`, then `endpoint`   | `no-endpoint`        |
///
/// Tag values pass through [`clean`]. The name is inserted verbatim and other tags are ignored.
///
/// ```
/// use tchannel_statsd::default_metric_prefix;
///
/// assert_eq!(
///     default_metric_prefix("inbound.calls.recvd", None),
///     "tchannel.inbound.calls.recvd.no-calling-service.no-service.no-endpoint",
/// );
/// ```
pub fn default_metric_prefix(name: &str, tags: Option<&StatsTags>) -> String {
    let caller = segment(tags, &[TagRole::CallingService, TagRole::Service], NO_CALLING_SERVICE);
    let service = segment(tags, &[TagRole::TargetService, TagRole::Service], NO_SERVICE);
    let endpoint = segment(tags, &[TagRole::TargetEndpoint, TagRole::Endpoint], NO_ENDPOINT);

    format!("{NAMESPACE}.{name}.{caller}.{service}.{endpoint}")
}

/// Composes the flat statsd key for a connection stat: `tchannel.<name>.<peer host>`.
///
/// The peer is read from the `peer-host-port` tag and cleaned with [`clean_host_port`]. Without a
/// host part, the peer is `no-peer-host-port`.
pub fn connection_metric_key(name: &str, tags: Option<&StatsTags>) -> String {
    let peer = resolve(tags, &[TagRole::PeerHostPort])
        .map(clean_host_port)
        .filter(|host| !host.is_empty())
        .unwrap_or(Cow::Borrowed(NO_PEER_HOST_PORT));

    format!("{NAMESPACE}.{name}.{peer}")
}

/// Composes the key for any stat emitted by the runtime.
///
/// Stats under `connections.` are keyed by peer, all others by call identities.
pub fn statsd_key(name: &str, tags: Option<&StatsTags>) -> String {
    if name.starts_with("connections.") {
        connection_metric_key(name, tags)
    } else {
        default_metric_prefix(name, tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> StatsTags {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_clean() {
        let cases = [
            ("metric", "metric"),
            ("met:ric", "met-ric"),
            ("met{}ric", "met--ric"),
            ("\\metric", "-metric"),
            ("/metric", "-metric"),
            ("  met.ric  ", "--met-ric--"),
            ("", ""),
        ];

        for (input, expected) in cases {
            assert_eq!(clean(input), expected, "clean({input:?})");
        }
    }

    #[test]
    fn test_clean_borrows_clean_input() {
        assert!(matches!(clean("callerS"), Cow::Borrowed("callerS")));
        assert!(matches!(clean("caller.S"), Cow::Owned(_)));
    }

    #[test]
    fn test_clean_control_whitespace() {
        assert_eq!(clean("a\tb\nc\rd"), "a-b-c-d");
    }

    #[test]
    fn test_clean_non_ascii_passes_through() {
        let input = "dienst/über:straße";
        let cleaned = clean(input);
        assert_eq!(cleaned, "dienst-über-straße");
        assert_eq!(cleaned.len(), input.len());
        assert_eq!(cleaned.chars().count(), input.chars().count());
    }

    #[test]
    fn test_clean_unicode_whitespace() {
        let input = "a\u{a0}b\u{3000}c\u{2028}";
        let cleaned = clean(input);
        assert_eq!(cleaned, "a-b-c-");
        assert_eq!(cleaned.chars().count(), input.chars().count());
    }

    #[test]
    fn test_clean_preserves_length() {
        let inputs = [" ", "{}{}", "a.b.c", "ü : ö", "\\\\//", "plain", "x\u{a0}y"];
        for input in inputs {
            let cleaned = clean(input);
            assert_eq!(cleaned.chars().count(), input.chars().count(), "{input:?}");
            assert!(!cleaned.contains(char::is_whitespace), "{cleaned:?}");
            assert!(!cleaned.contains(is_reserved), "{cleaned:?}");
        }
    }

    #[test]
    fn test_outbound_key() {
        let tags = tags(&[
            ("service", "callerS"),
            ("target-service", "targetS"),
            ("target-endpoint", "targetE"),
        ]);

        assert_eq!(
            default_metric_prefix("outbound.calls.sent", Some(&tags)),
            "tchannel.outbound.calls.sent.callerS.targetS.targetE"
        );
    }

    #[test]
    fn test_inbound_key() {
        let tags = tags(&[
            ("service", "targetS"),
            ("endpoint", "targetE"),
            ("calling-service", "callerS"),
        ]);

        assert_eq!(
            default_metric_prefix("inbound.calls.recvd", Some(&tags)),
            "tchannel.inbound.calls.recvd.callerS.targetS.targetE"
        );
    }

    #[test]
    fn test_no_tags() {
        let expected = "tchannel.inbound.calls.recvd.no-calling-service.no-service.no-endpoint";
        assert_eq!(default_metric_prefix("inbound.calls.recvd", None), expected);
        assert_eq!(
            default_metric_prefix("inbound.calls.recvd", Some(&StatsTags::new())),
            expected
        );
    }

    #[test]
    fn test_only_service() {
        let tags = tags(&[("service", "svc")]);
        insta::assert_snapshot!(
            default_metric_prefix("outbound.calls.send", Some(&tags)),
            @"tchannel.outbound.calls.send.svc.svc.no-endpoint"
        );
    }

    #[test]
    fn test_target_service_preferred() {
        let tags = tags(&[("service", "local"), ("target-service", "remote")]);
        insta::assert_snapshot!(
            default_metric_prefix("outbound.calls.send", Some(&tags)),
            @"tchannel.outbound.calls.send.local.remote.no-endpoint"
        );
    }

    #[test]
    fn test_empty_value_falls_through() {
        let tags = tags(&[
            ("calling-service", ""),
            ("service", "local"),
            ("target-endpoint", ""),
        ]);
        insta::assert_snapshot!(
            default_metric_prefix("inbound.calls.recvd", Some(&tags)),
            @"tchannel.inbound.calls.recvd.local.local.no-endpoint"
        );
    }

    #[test]
    fn test_tag_values_are_cleaned() {
        let tags = tags(&[
            ("calling-service", "caller.svc"),
            ("service", "my svc"),
            ("endpoint", "Meta::health/{id}"),
        ]);
        insta::assert_snapshot!(
            default_metric_prefix("inbound.calls.latency", Some(&tags)),
            @"tchannel.inbound.calls.latency.caller-svc.my-svc.Meta--health--id-"
        );
    }

    #[test]
    fn test_name_is_not_cleaned() {
        let key = default_metric_prefix("outbound.calls:weird", None);
        assert!(key.starts_with("tchannel.outbound.calls:weird."), "{key}");
    }

    #[test]
    fn test_unrecognized_tags_ignored() {
        let base = tags(&[("service", "svc"), ("endpoint", "echo")]);
        let mut extended = base.clone();
        extended.insert("app".to_owned(), "my.app".to_owned());
        extended.insert("host".to_owned(), "host:1".to_owned());

        assert_eq!(
            default_metric_prefix("inbound.calls.recvd", Some(&base)),
            default_metric_prefix("inbound.calls.recvd", Some(&extended)),
        );
    }

    #[test]
    fn test_key_shape() {
        let all = [
            tags(&[]),
            tags(&[("service", "a.b")]),
            tags(&[("target-endpoint", "x/y"), ("calling-service", " ")]),
        ];

        for tags in &all {
            let name = "outbound.calls.send";
            let key = default_metric_prefix(name, Some(tags));
            let rest = key
                .strip_prefix(&format!("{NAMESPACE}.{name}."))
                .expect("key starts with namespace and name");
            let segments: Vec<_> = rest.split('.').collect();
            assert_eq!(segments.len(), 3, "{key}");
            assert!(segments.iter().all(|s| !s.is_empty()), "{key}");
        }
    }

    #[test]
    fn test_deterministic() {
        let tags = tags(&[("service", "svc"), ("target-service", "peer")]);
        let first = default_metric_prefix("outbound.calls.success", Some(&tags));
        let second = default_metric_prefix("outbound.calls.success", Some(&tags.clone()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_clean_host_port() {
        assert_eq!(clean_host_port("10.0.0.1:4040"), "10-0-0-1");
        assert_eq!(clean_host_port("localhost"), "localhost");
        assert_eq!(clean_host_port(""), "");
    }

    #[test]
    fn test_connection_metric_key() {
        let tags = tags(&[("peer-host-port", "10.0.0.1:4040")]);
        assert_eq!(
            connection_metric_key("connections.active", Some(&tags)),
            "tchannel.connections.active.10-0-0-1"
        );
        assert_eq!(
            connection_metric_key("connections.active", None),
            "tchannel.connections.active.no-peer-host-port"
        );
    }

    #[test]
    fn test_connection_metric_key_without_host() {
        for peer in [":4040", "", ":"] {
            let tags = tags(&[("peer-host-port", peer)]);
            assert_eq!(
                connection_metric_key("connections.active", Some(&tags)),
                "tchannel.connections.active.no-peer-host-port",
                "{peer:?}"
            );
        }
    }

    #[test]
    fn test_statsd_key_dispatch() {
        let tags = tags(&[("peer-host-port", "127.0.0.1:21300"), ("service", "svc")]);
        assert_eq!(
            statsd_key("connections.bytes-sent", Some(&tags)),
            "tchannel.connections.bytes-sent.127-0-0-1"
        );
        assert_eq!(
            statsd_key("outbound.calls.send", Some(&tags)),
            "tchannel.outbound.calls.send.svc.svc.no-endpoint"
        );
    }
}
