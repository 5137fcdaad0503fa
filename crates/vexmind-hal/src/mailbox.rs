//! [`ResponseMailbox`] – the single most recent controller response.
//!
//! Writes overwrite, reads consume.  There is no history and no per-command
//! correlation: the worker takes whatever occupies the slot after it sends.

use std::sync::Mutex;

use tracing::debug;

use crate::lock;

/// Delimiter wrapped around every controller response payload.
pub const FRAME_MARKER: &str = "<#>";

/// Return the text between the first pair of [`FRAME_MARKER`]s in `line`.
///
/// ```
/// use vexmind_hal::extract_frame;
///
/// assert_eq!(extract_frame("noise <#>arm 1<#> tail"), Some("arm 1"));
/// assert_eq!(extract_frame("boot banner"), None);
/// ```
pub fn extract_frame(line: &str) -> Option<&str> {
    let start = line.find(FRAME_MARKER)? + FRAME_MARKER.len();
    let len = line[start..].find(FRAME_MARKER)?;
    Some(&line[start..start + len])
}

#[derive(Debug, Default)]
pub struct ResponseMailbox {
    slot: Mutex<Option<String>>,
}

impl ResponseMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `response`, discarding any unread value.
    pub fn put(&self, response: String) {
        if let Some(old) = lock(&self.slot).replace(response) {
            debug!(discarded = %old, "unread response overwritten");
        }
    }

    /// Consume the current value, leaving the slot empty.
    pub fn take(&self) -> Option<String> {
        lock(&self.slot).take()
    }

    pub fn clear(&self) {
        lock(&self.slot).take();
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.slot).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_between_first_marker_pair() {
        assert_eq!(extract_frame("<#>ok<#>"), Some("ok"));
        assert_eq!(extract_frame("<#>a<#>b<#>c<#>"), Some("a"));
        assert_eq!(extract_frame("<#><#>"), Some(""));
    }

    #[test]
    fn unterminated_frame_is_none() {
        assert_eq!(extract_frame("<#>half"), None);
        assert_eq!(extract_frame(""), None);
    }

    #[test]
    fn take_consumes() {
        let mb = ResponseMailbox::new();
        assert!(mb.is_empty());
        mb.put("battery 87".into());
        assert_eq!(mb.take().as_deref(), Some("battery 87"));
        assert!(mb.is_empty());
        assert_eq!(mb.take(), None);
    }

    #[test]
    fn put_overwrites_unread_value() {
        let mb = ResponseMailbox::new();
        mb.put("first".into());
        mb.put("second".into());
        assert_eq!(mb.take().as_deref(), Some("second"));
    }

    #[test]
    fn clear_empties_slot() {
        let mb = ResponseMailbox::new();
        mb.put("stale".into());
        mb.clear();
        assert!(mb.is_empty());
    }
}
