//! Head line grammar.
//!
//! ```text
//! $name                event head
//! $$name$config...     operation head (config may contain '$')
//! anything else        not a protocol head
//! ```

use std::fmt;

/// The `$` sentinel that marks protocol heads.
pub const SENTINEL: char = '$';

/// Parsed first line of a protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// `$name`
    Event {
        /// Trimmed event name.
        name: String,
    },
    /// `$$name$config`
    Operation {
        /// Trimmed operation name.
        name: String,
        /// Everything after the name, rejoined with `$` and trimmed.
        config: String,
    },
}

impl Head {
    /// Name of the event or operation.
    pub fn name(&self) -> &str {
        match self {
            Head::Event { name } | Head::Operation { name, .. } => name,
        }
    }

    /// Check if this is an event head.
    #[inline]
    pub fn is_event(&self) -> bool {
        matches!(self, Head::Event { .. })
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Head::Event { name } => write!(f, "${name}"),
            Head::Operation { name, config } => write!(f, "$${name}${config}"),
        }
    }
}

/// Classify a head line.
///
/// Returns `None` when the line is not a protocol head. A lone `$` carries
/// no operation name and is treated the same way.
///
/// # Example
///
/// ```
/// use eventwire::protocol::{parse_head, Head};
///
/// assert_eq!(parse_head("$greet"), Some(Head::Event { name: "greet".into() }));
/// assert_eq!(
///     parse_head("$$upload$a=$1"),
///     Some(Head::Operation { name: "upload".into(), config: "a=$1".into() }),
/// );
/// assert_eq!(parse_head("plain text"), None);
/// ```
pub fn parse_head(line: &str) -> Option<Head> {
    let rest = line.strip_prefix(SENTINEL)?;
    let mut segments = rest.split(SENTINEL);

    // split always yields at least one segment
    let name = segments.next()?.trim();
    if !name.is_empty() {
        return Some(Head::Event {
            name: name.to_string(),
        });
    }

    let operation = segments.next()?.trim().to_string();
    let config = segments.collect::<Vec<_>>().join("$").trim().to_string();
    Some(Head::Operation {
        name: operation,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> Option<Head> {
        Some(Head::Event { name: name.into() })
    }

    fn operation(name: &str, config: &str) -> Option<Head> {
        Some(Head::Operation {
            name: name.into(),
            config: config.into(),
        })
    }

    #[test]
    fn test_not_protocol() {
        assert_eq!(parse_head(""), None);
        assert_eq!(parse_head("hello"), None);
        assert_eq!(parse_head(" $greet"), None);
        assert_eq!(parse_head("greet$"), None);
        assert_eq!(parse_head("{\"json\": true}"), None);
    }

    #[test]
    fn test_event_head() {
        assert_eq!(parse_head("$greet"), event("greet"));
        assert_eq!(parse_head("$  greet \r"), event("greet"));
    }

    #[test]
    fn test_event_head_ignores_trailing_segments() {
        // only the first segment names the event
        assert_eq!(parse_head("$greet$extra"), event("greet"));
    }

    #[test]
    fn test_operation_head() {
        assert_eq!(parse_head("$$upload$chunk=3"), operation("upload", "chunk=3"));
        assert_eq!(parse_head("$$ upload $ chunk=3 "), operation("upload", "chunk=3"));
    }

    #[test]
    fn test_operation_config_keeps_sentinels() {
        assert_eq!(parse_head("$$op$a$b$$c"), operation("op", "a$b$$c"));
        assert_eq!(parse_head("$$op$$"), operation("op", "$"));
    }

    #[test]
    fn test_operation_without_config() {
        assert_eq!(parse_head("$$op"), operation("op", ""));
        assert_eq!(parse_head("$$"), operation("", ""));
    }

    #[test]
    fn test_blank_event_name_falls_through_to_operation() {
        assert_eq!(parse_head("$ $op$cfg"), operation("op", "cfg"));
    }

    #[test]
    fn test_lone_sentinel() {
        assert_eq!(parse_head("$"), None);
        assert_eq!(parse_head("$   "), None);
    }

    #[test]
    fn test_head_accessors() {
        let head = parse_head("$greet").unwrap();
        assert!(head.is_event());
        assert_eq!(head.name(), "greet");

        let head = parse_head("$$op$x").unwrap();
        assert!(!head.is_event());
        assert_eq!(head.name(), "op");
    }

    #[test]
    fn test_display_matches_wire_form() {
        let event = Head::Event {
            name: "greet".into(),
        };
        assert_eq!(event.to_string(), "$greet");

        let operation = Head::Operation {
            name: "upload".into(),
            config: "a$b".into(),
        };
        assert_eq!(operation.to_string(), "$$upload$a$b");
        assert_eq!(parse_head(&operation.to_string()), Some(operation));
    }
}
