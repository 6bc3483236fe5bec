//! Parse Appium page source into a flat list of nodes.
//!
//! Used for diagnostics only: when a locator set resolves nothing we log the
//! resource ids that *are* on screen, and the `status` command prints a short
//! summary.

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::sync::OnceLock;

/// Decode common HTML entities in a string
/// Handles: &amp; &lt; &gt; &quot; &apos; &#NNN; (decimal) &#xHHH; (hex)
fn decode_html_entities(s: &str) -> String {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();

    let named = s
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    let numeric = NUMERIC
        .get_or_init(|| Regex::new(r"&#(x[0-9A-Fa-f]+|\d+);").expect("numeric entity pattern"));
    let decoded = numeric.replace_all(&named, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    });

    // &amp; last so "&amp;lt;" stays "&lt;"
    decoded.replace("&amp;", "&")
}

/// Element bounds parsed from "[l,t][r,b]"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Parse bounds from string like "[0,0][1080,1920]"
    pub fn from_string(s: &str) -> Option<Self> {
        let (left_top, right_bottom) = s.split_once("][")?;
        let lt: Vec<i32> = left_top
            .trim_start_matches('[')
            .split(',')
            .filter_map(|v| v.trim().parse().ok())
            .collect();
        let rb: Vec<i32> = right_bottom
            .trim_end_matches(']')
            .split(',')
            .filter_map(|v| v.trim().parse().ok())
            .collect();

        match (lt.as_slice(), rb.as_slice()) {
            ([left, top], [right, bottom]) => Some(Bounds {
                left: *left,
                top: *top,
                right: *right,
                bottom: *bottom,
            }),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
}

/// One node of the page source
#[derive(Debug, Clone, Default)]
pub struct UiNode {
    pub class: String,
    pub text: String,
    pub resource_id: String,
    pub content_desc: String,
    pub bounds: Bounds,
    pub displayed: bool,
    pub enabled: bool,
}

impl UiNode {
    fn from_start(e: &BytesStart<'_>) -> Self {
        let mut node = UiNode {
            class: String::from_utf8_lossy(e.name().as_ref()).to_string(),
            displayed: true,
            enabled: true,
            ..Default::default()
        };

        for attr in e.attributes().filter_map(|a| a.ok()) {
            let key = String::from_utf8_lossy(attr.key.as_ref());
            let value = String::from_utf8_lossy(&attr.value);

            match key.as_ref() {
                "class" => node.class = value.to_string(),
                "text" => node.text = decode_html_entities(&value),
                "resource-id" => node.resource_id = value.to_string(),
                "content-desc" => node.content_desc = decode_html_entities(&value),
                "bounds" => {
                    if let Some(b) = Bounds::from_string(&value) {
                        node.bounds = b;
                    }
                }
                "displayed" => node.displayed = value == "true",
                "enabled" => node.enabled = value == "true",
                _ => {}
            }
        }

        node
    }
}

/// Parse Appium (UiAutomator2) page source XML.
///
/// Every element carrying a `bounds` attribute is a node; the `hierarchy`
/// root and wrapper elements are skipped.
pub fn parse_page_source(xml: &str) -> Result<Vec<UiNode>> {
    let mut nodes = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let has_bounds = e
                    .attributes()
                    .filter_map(|a| a.ok())
                    .any(|a| a.key.as_ref() == b"bounds");
                if has_bounds {
                    nodes.push(UiNode::from_start(e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Page source parse error at byte {}", reader.buffer_position())
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(nodes)
}

/// Resource ids of displayed nodes, in document order, without duplicates
pub fn visible_resource_ids(nodes: &[UiNode]) -> Vec<&str> {
    let mut ids: Vec<&str> = Vec::new();
    for node in nodes {
        if node.displayed
            && !node.resource_id.is_empty()
            && !node.bounds.is_empty()
            && !ids.contains(&node.resource_id.as_str())
        {
            ids.push(node.resource_id.as_str());
        }
    }
    ids
}

/// Find node by resource ID (full id or the part after `:id/`)
pub fn find_by_id<'a>(nodes: &'a [UiNode], id: &str) -> Option<&'a UiNode> {
    nodes
        .iter()
        .find(|n| n.resource_id == id || n.resource_id.ends_with(&format!("/{}", id)))
}

/// One-line summary for logs: node count plus up to `limit` visible ids
pub fn summarize(nodes: &[UiNode], limit: usize) -> String {
    let ids = visible_resource_ids(nodes);
    let shown: Vec<&str> = ids.iter().take(limit).copied().collect();
    let more = ids.len().saturating_sub(shown.len());
    let mut line = format!("{} node(s), visible ids: [{}]", nodes.len(), shown.join(", "));
    if more > 0 {
        line.push_str(&format!(" (+{} more)", more));
    }
    line
}
