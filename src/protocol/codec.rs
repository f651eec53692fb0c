// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line-oriented `key=value&key=value` frames exchanged with the relay.
//!
//! Outbound frames are the one-time subscribe command and the periodic
//! heartbeat. Inbound traffic is scanned for power directives addressed to
//! the subscribed topic.
//!
//! ```text
//! → cmd=1&uid=<UID>&topic=<TOPIC>\r\n      subscribe, once per session
//! → ping\r\n                               heartbeat
//! ← ...topic=<TOPIC>&msg=on...             power on directive
//! ← ...topic=<TOPIC>&msg=off...            power off directive
//! ```

use std::fmt;

use serde::Deserialize;

/// Line terminator used on the wire.
pub const LINE_END: &str = "\r\n";

/// A frame sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Subscribes this client to a topic.
    Subscribe {
        /// Client identifier.
        uid: String,
        /// Topic to subscribe to.
        topic: String,
    },
    /// Liveness token.
    Heartbeat,
}

impl OutboundFrame {
    /// Creates a subscribe frame.
    #[must_use]
    pub fn subscribe(uid: impl Into<String>, topic: impl Into<String>) -> Self {
        Self::Subscribe {
            uid: uid.into(),
            topic: topic.into(),
        }
    }

    /// Encodes the frame including its line terminator.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        format!("{self}{LINE_END}").into_bytes()
    }
}

impl fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe { uid, topic } => write!(f, "cmd=1&uid={uid}&topic={topic}"),
            Self::Heartbeat => f.write_str("ping"),
        }
    }
}

/// A power directive decoded from inbound traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Wake every device on the power-on list.
    PowerOn,
    /// Shut down every device on the power-off list.
    PowerOff,
}

impl Directive {
    /// The `msg` value that carries this directive.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PowerOn => "on",
            Self::PowerOff => "off",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How inbound buffers are matched against the subscribed topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// The buffer only has to contain `topic=<T>&msg=on|off` somewhere.
    ///
    /// This tolerates envelope bytes the relay wraps around notifications,
    /// at the cost of firing on any payload that happens to embed the
    /// substring.
    #[default]
    Substring,
    /// Each line is parsed as `key=value` pairs and must carry exactly
    /// `topic=<T>` and `msg=on|off`.
    Strict,
}

/// Decodes the directives present in a received buffer.
///
/// Power-on is always reported before power-off when both are present.
///
/// # Examples
///
/// ```
/// use wol_relay::protocol::{Directive, MatchMode, decode_directives};
///
/// let found = decode_directives("junk topic=HOME&msg=on-suffix", "HOME", MatchMode::Substring);
/// assert_eq!(found, [Directive::PowerOn]);
///
/// let found = decode_directives("junk topic=HOME&msg=on-suffix", "HOME", MatchMode::Strict);
/// assert!(found.is_empty());
/// ```
#[must_use]
pub fn decode_directives(text: &str, topic: &str, mode: MatchMode) -> Vec<Directive> {
    let mut found = Vec::with_capacity(2);
    match mode {
        MatchMode::Substring => {
            for directive in [Directive::PowerOn, Directive::PowerOff] {
                let needle = format!("topic={topic}&msg={directive}");
                if text.contains(&needle) {
                    found.push(directive);
                }
            }
        }
        MatchMode::Strict => {
            let frames: Vec<InboundFrame<'_>> =
                text.lines().filter_map(InboundFrame::parse).collect();
            for directive in [Directive::PowerOn, Directive::PowerOff] {
                let wanted = Some(directive.as_str());
                if frames
                    .iter()
                    .any(|frame| frame.get("topic") == Some(topic) && frame.get("msg") == wanted)
                {
                    found.push(directive);
                }
            }
        }
    }
    found
}

/// One inbound line parsed as `key=value` pairs.
///
/// Pairs keep their order. Segments without `=` make the whole line
/// unparseable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame<'a> {
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> InboundFrame<'a> {
    /// Parses a single line. Returns `None` for empty or malformed lines.
    #[must_use]
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let pairs = line
            .split('&')
            .map(|segment| segment.split_once('='))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { pairs })
    }

    /// Returns the first value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// All pairs in wire order.
    #[must_use]
    pub fn pairs(&self) -> &[(&'a str, &'a str)] {
        &self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_subscribe() {
        let frame = OutboundFrame::subscribe("abc123", "pc001");
        assert_eq!(frame.encode(), b"cmd=1&uid=abc123&topic=pc001\r\n");
    }

    #[test]
    fn encode_heartbeat() {
        assert_eq!(OutboundFrame::Heartbeat.encode(), b"ping\r\n");
    }

    #[test]
    fn substring_match_tolerates_envelope() {
        let text = "junk-prefix topic=HOME&msg=on-suffix";
        let found = decode_directives(text, "HOME", MatchMode::Substring);
        assert_eq!(found, [Directive::PowerOn]);
    }

    #[test]
    fn substring_match_reports_on_before_off() {
        let text = "cmd=2&uid=x&topic=HOME&msg=off\r\ncmd=2&uid=x&topic=HOME&msg=on";
        let found = decode_directives(text, "HOME", MatchMode::Substring);
        assert_eq!(found, [Directive::PowerOn, Directive::PowerOff]);
    }

    #[test]
    fn substring_match_ignores_other_topics() {
        let found = decode_directives("cmd=2&topic=OTHER&msg=on", "HOME", MatchMode::Substring);
        assert!(found.is_empty());
    }

    #[test]
    fn unrecognised_buffers_decode_to_nothing() {
        for text in ["", "cmd=0&res=1", "ping", "\u{fffd}\u{fffd}"] {
            assert!(decode_directives(text, "HOME", MatchMode::Substring).is_empty());
            assert!(decode_directives(text, "HOME", MatchMode::Strict).is_empty());
        }
    }

    #[test]
    fn strict_match_requires_exact_values() {
        let text = "cmd=2&uid=u&topic=HOME&msg=on";
        assert_eq!(
            decode_directives(text, "HOME", MatchMode::Strict),
            [Directive::PowerOn]
        );

        for text in ["cmd=2&topic=HOME&msg=onward", "cmd=2&topic=HOME2&msg=on"] {
            assert!(decode_directives(text, "HOME", MatchMode::Strict).is_empty());
        }
    }

    #[test]
    fn strict_match_scans_every_line() {
        let text = "cmd=0&res=1\r\ncmd=2&topic=HOME&msg=off\r\n";
        assert_eq!(
            decode_directives(text, "HOME", MatchMode::Strict),
            [Directive::PowerOff]
        );
    }

    #[test]
    fn inbound_frame_parse() {
        let frame = InboundFrame::parse("cmd=2&uid=u1&topic=t&msg=on\r\n").unwrap();
        assert_eq!(frame.get("cmd"), Some("2"));
        assert_eq!(frame.get("msg"), Some("on"));
        assert_eq!(frame.get("missing"), None);
        assert_eq!(frame.pairs().len(), 4);

        assert!(InboundFrame::parse("   ").is_none());
        assert!(InboundFrame::parse("ping").is_none());
        assert!(InboundFrame::parse("a=1&broken").is_none());
    }

    #[test]
    fn match_mode_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: MatchMode,
        }
        let w: Wrapper = toml::from_str(r#"mode = "strict""#).unwrap();
        assert_eq!(w.mode, MatchMode::Strict);
        assert_eq!(MatchMode::default(), MatchMode::Substring);
    }
}
