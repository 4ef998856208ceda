//! Plain HTML pages for articles and draft previews.
//!
//! Site templates live outside this crate; these pages are the fallback that
//! makes a published directory browsable on its own.

use std::fmt::Write;

/// Escape text for use inside HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a standalone page: escaped title, then one `<p>` per blank-line
/// separated paragraph of `content`.
pub fn render_page(title: &str, content: &str) -> String {
    let title = escape_html(title);
    let mut body = String::new();
    for paragraph in content.trim().split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let lines: Vec<String> = paragraph.lines().map(escape_html).collect();
        let _ = writeln!(body, "<p>{}</p>", lines.join("<br>\n"));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_render_paragraphs() {
        let html = render_page("Hi <there>", "one\ntwo\n\nthree");
        assert!(html.contains("<title>Hi &lt;there&gt;</title>"));
        assert!(html.contains("<p>one<br>\ntwo</p>"));
        assert!(html.contains("<p>three</p>"));
    }
}
