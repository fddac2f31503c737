//! Message filter
//!
//! Each criterion is optional; a missing criterion accepts any value. The
//! filter is serialized into the handshake so the event loop can filter
//! server-side, and can also be applied locally to a single subscription.

use serde::{Deserialize, Serialize};

use super::envelope::MagixMessage;

/// Accept only messages whose format, origin and target are in the given lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagixMessageFilter {
    /// Accepted formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Vec<String>>,

    /// Accepted origins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Vec<String>>,

    /// Accepted targets; `None` inside the list matches untargeted messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec<Option<String>>>,
}

impl MagixMessageFilter {
    /// Filter that accepts every message
    pub const ALL: MagixMessageFilter = MagixMessageFilter {
        format: None,
        origin: None,
        target: None,
    };

    /// Restrict accepted formats
    pub fn formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.format = Some(formats.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict accepted origins
    pub fn origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origin = Some(origins.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict accepted targets
    pub fn targets<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        self.target = Some(targets.into_iter().collect());
        self
    }

    /// Whether this filter lets every message through
    pub fn is_all(&self) -> bool {
        self == &Self::ALL
    }

    /// Check a message against the filter
    pub fn accepts<T>(&self, message: &MagixMessage<T>) -> bool {
        let format_ok = self
            .format
            .as_ref()
            .map_or(true, |f| f.iter().any(|v| v == message.format()));
        let origin_ok = self
            .origin
            .as_ref()
            .map_or(true, |o| o.iter().any(|v| v == message.origin()));
        let target_ok = self
            .target
            .as_ref()
            .map_or(true, |t| t.iter().any(|v| v.as_deref() == message.target()));

        format_ok && origin_ok && target_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(format: &str, origin: &str, target: Option<&str>) -> MagixMessage<()> {
        let m = MagixMessage::new(format, origin, ());
        match target {
            Some(t) => m.with_target(t),
            None => m,
        }
    }

    #[test]
    fn test_all_accepts_everything() {
        assert!(MagixMessageFilter::ALL.is_all());
        assert!(MagixMessageFilter::default().is_all());
        assert!(MagixMessageFilter::ALL.accepts(&msg("a", "b", Some("c"))));
        assert!(MagixMessageFilter::ALL.accepts(&msg("a", "b", None)));
    }

    #[test]
    fn test_format_and_origin() {
        let filter = MagixMessageFilter::default()
            .formats(["controls"])
            .origins(["dev-1", "dev-2"]);

        assert!(filter.accepts(&msg("controls", "dev-2", None)));
        assert!(!filter.accepts(&msg("controls", "dev-3", None)));
        assert!(!filter.accepts(&msg("other", "dev-1", None)));
    }

    #[test]
    fn test_untargeted_match() {
        let filter = MagixMessageFilter::default().targets([None, Some("loop".to_string())]);

        assert!(filter.accepts(&msg("f", "o", None)));
        assert!(filter.accepts(&msg("f", "o", Some("loop"))));
        assert!(!filter.accepts(&msg("f", "o", Some("other"))));
    }

    #[test]
    fn test_serialized_all_is_empty_object() {
        let json = serde_json::to_string(&MagixMessageFilter::ALL).unwrap();
        assert_eq!(json, "{}");
    }
}
