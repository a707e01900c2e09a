// Response decoding for the remote site's HTML fragments and JSON arrays.
//
// The listing decode reproduces the site's undocumented markup positions:
// an `event-link` node carries the booking id in its `rel` attribute, the
// room label is the next sibling's text, and the time label is the text of
// the third ancestor's preceding sibling. If the site changes its rendering,
// this produces wrong or empty results; keeping it behind this module is what
// lets the rest of the crate ignore that.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("markup error: {0}")]
    Markup(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected payload shape: {0}")]
    UnexpectedPayload(String),

    #[error("empty payload where a record was expected")]
    EmptyPayload,

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// One reservation as rendered in the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub id: String,
    pub room: String,
    pub time_label: String,
}

/// One positional row of the event feed: `[booking_id, offset, duration, room_id, ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub booking_id: String,
    pub offset: i64,
    pub duration_minutes: i64,
    pub room_id: String,
}

/// Extracts every event-link record from the listing HTML fragment.
pub fn booking_list(html: &str) -> Result<Vec<Booking>, DecodeError> {
    let dom = Dom::parse(html)?;
    let mut bookings = Vec::new();
    for node in dom.nodes_with_class("event-link") {
        let id = dom
            .attr(node, "rel")
            .ok_or(DecodeError::MissingField("rel"))?;
        let room = dom
            .next_sibling(node)
            .map(|sibling| dom.text_content(sibling))
            .unwrap_or_default();
        let time_label = dom
            .ancestor(node, 3)
            .and_then(|row| dom.prev_sibling(row))
            .map(|previous| dom.text_content(previous))
            .unwrap_or_default();
        bookings.push(Booking {
            id,
            room,
            time_label,
        });
    }
    Ok(bookings)
}

/// The book/cancel endpoints answer with a JSON array whose first element is
/// the authoritative result record. No schema is validated beyond that.
pub fn first_record(payload: &str) -> Result<Value, DecodeError> {
    let value: Value = serde_json::from_str(payload)?;
    match value {
        Value::Array(items) => items.into_iter().next().ok_or(DecodeError::EmptyPayload),
        other => Err(DecodeError::UnexpectedPayload(format!(
            "expected a JSON array, got {other}"
        ))),
    }
}

/// Reads the positional rows of the `async_fetchevents` feed. The feed mixes
/// numbers and strings for the same column between rows, so both are accepted.
pub fn event_rows(payload: &str) -> Result<Vec<EventRow>, DecodeError> {
    let value: Value = serde_json::from_str(payload)?;
    let rows = value
        .as_array()
        .ok_or_else(|| DecodeError::UnexpectedPayload("event feed is not an array".into()))?;

    rows.iter()
        .map(|row| {
            let fields = row.as_array().ok_or_else(|| {
                DecodeError::UnexpectedPayload("event row is not an array".into())
            })?;
            Ok(EventRow {
                booking_id: field_string(fields, 0, "booking_id")?,
                offset: field_i64(fields, 1, "offset")?,
                duration_minutes: field_i64(fields, 2, "duration")?,
                room_id: field_string(fields, 3, "room_id")?,
            })
        })
        .collect()
}

/// Legacy event-info fragment: the first child element's text holds the time
/// range, first token is the start clock, last token is the end clock.
pub fn event_info_times(html: &str) -> Result<(String, String), DecodeError> {
    let dom = Dom::parse(html)?;
    let first_child = dom
        .first_child(Dom::ROOT)
        .ok_or_else(|| DecodeError::UnexpectedPayload("event info fragment is empty".into()))?;
    let text = dom.text_content(first_child);
    let mut tokens = text.split_whitespace();
    let start = tokens
        .next()
        .ok_or_else(|| DecodeError::UnexpectedPayload("event info has no time tokens".into()))?;
    let end = tokens.last().unwrap_or(start);
    Ok((start.to_string(), end.to_string()))
}

fn field_string(fields: &[Value], index: usize, name: &'static str) -> Result<String, DecodeError> {
    match fields.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(DecodeError::MissingField(name)),
    }
}

fn field_i64(fields: &[Value], index: usize, name: &'static str) -> Result<i64, DecodeError> {
    match fields.get(index) {
        Some(Value::Number(n)) => n.as_i64().ok_or(DecodeError::MissingField(name)),
        Some(Value::String(s)) => s.parse().map_err(|_| DecodeError::MissingField(name)),
        _ => Err(DecodeError::MissingField(name)),
    }
}

// A small node arena built from the quick-xml event stream, just enough to
// walk siblings, ancestors and attributes the way the site's markup demands.
// End-name checking is off: the fragments are HTML, not well-formed XML.
struct Dom {
    nodes: Vec<DomNode>,
}

struct DomNode {
    parent: Option<usize>,
    children: Vec<usize>,
    attrs: Vec<(String, String)>,
    text: String,
}

impl Dom {
    const ROOT: usize = 0;

    fn parse(html: &str) -> Result<Self, DecodeError> {
        let mut reader = Reader::from_str(html);
        reader.config_mut().trim_text(true);
        reader.config_mut().check_end_names = false;
        reader.config_mut().allow_unmatched_ends = true;

        let mut dom = Dom {
            nodes: vec![DomNode {
                parent: None,
                children: Vec::new(),
                attrs: Vec::new(),
                text: String::new(),
            }],
        };
        let mut stack = vec![Self::ROOT];

        loop {
            match reader.read_event() {
                Ok(Event::Start(element)) => {
                    let node = dom.push_node(*stack.last().unwrap(), &element)?;
                    stack.push(node);
                }
                Ok(Event::Empty(element)) => {
                    dom.push_node(*stack.last().unwrap(), &element)?;
                }
                Ok(Event::End(_)) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Ok(Event::Text(text)) => {
                    let unescaped = text
                        .decode()
                        .map_err(|e| DecodeError::Markup(e.to_string()))?;
                    let trimmed = unescaped.trim();
                    if !trimmed.is_empty() {
                        let current = &mut dom.nodes[*stack.last().unwrap()];
                        if !current.text.is_empty() {
                            current.text.push(' ');
                        }
                        current.text.push_str(trimmed);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(DecodeError::Markup(e.to_string())),
                Ok(_) => {}
            }
        }
        Ok(dom)
    }

    fn push_node(
        &mut self,
        parent: usize,
        element: &quick_xml::events::BytesStart<'_>,
    ) -> Result<usize, DecodeError> {
        let mut attrs = Vec::new();
        for attr in element.attributes().with_checks(false) {
            let attr = attr.map_err(|e| DecodeError::Markup(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| DecodeError::Markup(e.to_string()))?
                .into_owned();
            attrs.push((key, value));
        }
        let index = self.nodes.len();
        self.nodes.push(DomNode {
            parent: Some(parent),
            children: Vec::new(),
            attrs,
            text: String::new(),
        });
        self.nodes[parent].children.push(index);
        Ok(index)
    }

    fn nodes_with_class(&self, class: &str) -> Vec<usize> {
        (1..self.nodes.len())
            .filter(|&index| {
                self.attr_ref(index, "class")
                    .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
            })
            .collect()
    }

    fn attr_ref(&self, index: usize, key: &str) -> Option<&str> {
        self.nodes[index]
            .attrs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn attr(&self, index: usize, key: &str) -> Option<String> {
        self.attr_ref(index, key).map(str::to_string)
    }

    fn first_child(&self, index: usize) -> Option<usize> {
        self.nodes[index].children.first().copied()
    }

    fn next_sibling(&self, index: usize) -> Option<usize> {
        self.sibling_at(index, 1)
    }

    fn prev_sibling(&self, index: usize) -> Option<usize> {
        self.sibling_at(index, -1)
    }

    fn sibling_at(&self, index: usize, step: isize) -> Option<usize> {
        let parent = self.nodes[index].parent?;
        let siblings = &self.nodes[parent].children;
        let position = siblings.iter().position(|&child| child == index)?;
        let target = position.checked_add_signed(step)?;
        siblings.get(target).copied()
    }

    fn ancestor(&self, index: usize, levels: usize) -> Option<usize> {
        let mut current = index;
        for _ in 0..levels {
            current = self.nodes[current].parent?;
        }
        Some(current)
    }

    fn text_content(&self, index: usize) -> String {
        let mut parts = Vec::new();
        self.collect_text(index, &mut parts);
        parts.join(" ")
    }

    fn collect_text(&self, index: usize, parts: &mut Vec<String>) {
        let node = &self.nodes[index];
        if !node.text.is_empty() {
            parts.push(node.text.clone());
        }
        for &child in &node.children {
            self.collect_text(child, parts);
        }
    }
}
