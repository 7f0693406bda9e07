//! HTML to plain text

use kaddons_core::evidence::truncate_on_char_boundary;
use once_cell::sync::Lazy;
use scraper::{Html, Node, Selector};

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid body selector"));

/// Elements that start and end a line of text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "br", "table",
    "section", "article", "ul", "ol",
];

/// Elements whose content is never page text
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Turn a fetched body into text. Block elements keep their line breaks so
/// version tables stay line-oriented. Raw bodies (Markdown from GitHub) are
/// only capped.
pub fn normalize_fetched_content(body: &str, is_raw: bool, max_bytes: usize) -> String {
    if is_raw {
        return truncate_on_char_boundary(body, max_bytes).to_string();
    }

    let text = html_to_text(body);
    truncate_on_char_boundary(&text, max_bytes).to_string()
}

/// Text nodes in document order. The parser decodes entities.
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let start = document
        .select(&BODY)
        .next()
        .map(|body| *body)
        .unwrap_or_else(|| document.tree.root());

    let mut raw = String::new();
    // (node, closing) pairs so block elements can break lines on both ends
    let mut stack = vec![(start, false)];
    while let Some((node, closing)) = stack.pop() {
        match node.value() {
            Node::Text(text) => {
                raw.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
            }
            Node::Element(element) => {
                let name = element.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                let is_block = BLOCK_ELEMENTS.contains(&name);
                if is_block {
                    raw.push('\n');
                } else {
                    raw.push(' ');
                }
                if closing {
                    continue;
                }
                stack.push((node, true));
            }
            Node::Comment(_) => continue,
            _ => {}
        }
        if !closing {
            let children: Vec<_> = node.children().collect();
            stack.extend(children.into_iter().rev().map(|child| (child, false)));
        }
    }

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_tags_become_lines() {
        let html = "<h2>Supported  releases</h2><table><tr><td>1.16</td><td>1.29, 1.30</td></tr></table>";
        let text = normalize_fetched_content(html, false, 10_000);
        assert!(text.starts_with("Supported releases"));
        assert!(text.contains("1.16"));
        assert!(text.lines().any(|l| l.trim() == "1.29, 1.30"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_inline_tags_join_text_and_entities_decode() {
        let text = normalize_fetched_content("Requires <b>Kubernetes</b>&nbsp;<code>1.28</code> &amp; up", false, 1000);
        assert_eq!(text, "Requires Kubernetes 1.28 & up");
    }

    #[test]
    fn test_script_and_style_are_not_text() {
        let html = "<html><head><style>td { color: red }</style></head><body>\
                    <script>var v='Kubernetes 1.2'</script><noscript>enable js</noscript>\
                    <p>a &amp; b</p></body></html>";
        assert_eq!(normalize_fetched_content(html, false, 1000), "a & b");
    }

    #[test]
    fn test_source_newlines_inside_paragraph_are_spaces() {
        let html = "<p>Supported\n   Kubernetes\n versions</p><p>1.29</p>";
        assert_eq!(normalize_fetched_content(html, false, 1000), "Supported Kubernetes versions\n1.29");
    }

    #[test]
    fn test_raw_bodies_keep_markup() {
        let md = "| Version | <b>K8s</b> |\n\n\n| 1.2 | 1.30 |";
        assert_eq!(normalize_fetched_content(md, true, 1000), md);
    }

    #[test]
    fn test_capped_on_char_boundary() {
        let text = normalize_fetched_content(&"é".repeat(100), true, 51);
        assert_eq!(text.len(), 50);
        let text = normalize_fetched_content(&format!("<p>{}</p>", "é".repeat(100)), false, 51);
        assert_eq!(text.len(), 50);
    }
}
