//! SSE field-dispatch state machine (component C2).
//!
//! Consumes one logical line at a time (as produced by [`crate::line_reader`])
//! and accumulates it into `Event`/`Comment` notifications. Pure state: no
//! I/O, no async, so it is driven directly by [`crate::client::SSEClient`]'s
//! streaming loop, which lets the client consult `take_pending_retry` between
//! lines rather than needing a callback.

use crate::event::{Comment, Event};

pub(crate) enum SseItem {
    Event(Event),
    Comment(Comment),
}

pub(crate) struct SseReader {
    last_event_id: Option<String>,
    pending_event_type: Option<String>,
    pending_data: String,
    pending_id: Option<String>,
    pending_retry_ms: Option<u64>,
    has_data: bool,
}

impl SseReader {
    pub fn new(last_event_id: Option<String>) -> Self {
        SseReader {
            last_event_id,
            pending_event_type: None,
            pending_data: String::new(),
            pending_id: None,
            pending_retry_ms: None,
            has_data: false,
        }
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Returns and clears the most recent `retry:` value seen, if any. The
    /// reader never buffers more than one; the latest value always wins.
    pub fn take_pending_retry_ms(&mut self) -> Option<u64> {
        self.pending_retry_ms.take()
    }

    /// Feed one logical line (without its terminator). Returns a completed
    /// item if this line caused a comment or a dispatch.
    pub fn process_line(&mut self, line: &str) -> Option<SseItem> {
        if line.is_empty() {
            return self.dispatch();
        }

        if let Some(rest) = line.strip_prefix(':') {
            let text = rest.strip_prefix(' ').unwrap_or(rest);
            return Some(SseItem::Comment(Comment(text.to_string())));
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let raw_value = &line[idx + 1..];
                (&line[..idx], raw_value.strip_prefix(' ').unwrap_or(raw_value))
            }
            None => (line, ""),
        };

        match field {
            "event" => self.pending_event_type = Some(value.to_string()),
            "data" => {
                self.pending_data.push_str(value);
                self.pending_data.push('\n');
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\u{0}') {
                    self.pending_id = Some(value.to_string());
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.pending_retry_ms = Some(ms);
                    }
                }
            }
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseItem> {
        if !self.has_data {
            self.reset_pending();
            return None;
        }

        let mut data = std::mem::take(&mut self.pending_data);
        if data.ends_with('\n') {
            data.pop();
        }

        let event = Event::new(self.pending_event_type.take(), data, self.pending_id.take(), self.last_event_id.clone());
        self.has_data = false;
        Some(SseItem::Event(event))
    }

    fn reset_pending(&mut self) {
        self.pending_event_type = None;
        self.pending_data.clear();
        self.pending_id = None;
        self.has_data = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(reader: &mut SseReader, lines: &[&str]) -> Vec<Event> {
        let mut events = Vec::new();
        for line in lines {
            if let Some(SseItem::Event(e)) = reader.process_line(line) {
                events.push(e);
            }
        }
        events
    }

    #[test]
    fn two_events() {
        let mut reader = SseReader::new(None);
        let events = run(&mut reader, &["event: a", "data: d1", "", "event: b", "data: d2", ""]);
        assert_eq!(events, vec![
            Event::new(Some("a".into()), "d1".into(), None, None),
            Event::new(Some("b".into()), "d2".into(), None, None),
        ]);
    }

    #[test]
    fn multiline_data_is_joined_with_newline() {
        let mut reader = SseReader::new(None);
        let events = run(&mut reader, &["data: line1", "data: line2", ""]);
        assert_eq!(events, vec![Event::new(None, "line1\nline2".into(), None, None)]);
    }

    #[test]
    fn comment_line_strips_one_leading_space() {
        let mut reader = SseReader::new(None);
        let item = reader.process_line(": hello").unwrap();
        match item {
            SseItem::Comment(Comment(text)) => assert_eq!(text, "hello"),
            _ => panic!("expected comment"),
        }
    }

    #[test]
    fn colon_with_no_space_keeps_full_remainder() {
        let mut reader = SseReader::new(None);
        let item = reader.process_line(":no-space").unwrap();
        match item {
            SseItem::Comment(Comment(text)) => assert_eq!(text, "no-space"),
            _ => panic!("expected comment"),
        }
    }

    #[test]
    fn last_event_id_carries_forward_to_later_events_without_id() {
        let mut reader = SseReader::new(None);
        let events = run(&mut reader, &["id: 42", "data: a", "", "data: b", ""]);
        assert_eq!(events[0].last_event_id.as_deref(), Some("42"));
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(events[1].last_event_id.as_deref(), Some("42"));
        assert_eq!(events[1].id, None);
    }

    #[test]
    fn nul_in_id_is_ignored() {
        let mut reader = SseReader::new(Some("prior".into()));
        let events = run(&mut reader, &["id: bad\u{0}id", "data: a", ""]);
        assert_eq!(events[0].id, None);
        assert_eq!(events[0].last_event_id.as_deref(), Some("prior"));
    }

    #[test]
    fn retry_field_is_surfaced_through_side_channel_not_as_an_event() {
        let mut reader = SseReader::new(None);
        assert!(reader.process_line("retry: 2500").is_none());
        assert_eq!(reader.take_pending_retry_ms(), Some(2500));
        assert_eq!(reader.take_pending_retry_ms(), None);
    }

    #[test]
    fn non_numeric_retry_is_ignored() {
        let mut reader = SseReader::new(None);
        reader.process_line("retry: soon");
        assert_eq!(reader.take_pending_retry_ms(), None);
    }

    #[test]
    fn blank_line_with_no_data_is_a_no_op() {
        let mut reader = SseReader::new(None);
        reader.process_line("event: a");
        assert!(reader.process_line("").is_none());
        // the pending event type was reset, not carried to the next dispatch
        let events = run(&mut reader, &["data: x", ""]);
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn unterminated_event_at_stream_end_is_dropped() {
        let mut reader = SseReader::new(None);
        reader.process_line("data: half");
        // stream ends here; no blank line ever arrives, so nothing is dispatched.
    }

    #[test]
    fn line_with_no_colon_is_a_bare_field_name_with_empty_value() {
        let mut reader = SseReader::new(None);
        let events = run(&mut reader, &["data", ""]);
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn unrecognised_field_names_are_ignored() {
        let mut reader = SseReader::new(None);
        let events = run(&mut reader, &["foo: bar", "data: x", ""]);
        assert_eq!(events[0].data, "x");
    }
}
