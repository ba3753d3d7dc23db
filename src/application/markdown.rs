//! Small Markdown-to-HTML converter for feed content.
//!
//! Handles paragraphs, `#`–`###` headings, images, links, bold and italic.
//! Anything fancier (lists, code fences, tables) falls through as escaped
//! paragraph text. Post bodies may contain MDX; import/export statements and
//! self-closing component tags are removed before conversion.

use crate::domain::{entities::PostRecord, slug::AnchorSlugs};

/// Drop MDX-only lines: `import … from …`, `export …` and standalone
/// `<Component … />` tags.
pub fn strip_component_syntax(body: &str) -> String {
    body.lines()
        .filter(|line| !is_component_line(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_component_line(line: &str) -> bool {
    if line.starts_with("import ") && (line.contains(" from ") || line.ends_with(['"', '\'', ';'])) {
        return true;
    }
    if line.starts_with("export ") {
        return true;
    }
    line.starts_with('<')
        && line.ends_with("/>")
        && line[1..].chars().next().is_some_and(char::is_uppercase)
}

/// Article HTML for a personal post: the hero image, then the converted
/// body. Shared by the post page and the feed.
pub fn post_body_html(record: &PostRecord) -> String {
    let mut html = String::new();
    if let Some(image) = record.hero_image.as_deref() {
        html.push_str(&format!(
            "<p><img src=\"{}\" alt=\"{}\"></p>\n",
            escape_html(image),
            escape_html(&record.title)
        ));
    }
    if let Some(body) = record.body.as_deref() {
        let converted = markdown_to_html(&strip_component_syntax(body));
        if !converted.is_empty() {
            html.push_str(&converted);
            html.push('\n');
        }
    }
    html
}

/// Convert Markdown to HTML. Blocks are separated by blank lines.
pub fn markdown_to_html(markdown: &str) -> String {
    let normalized = markdown.replace("\r\n", "\n");
    let mut anchors = AnchorSlugs::default();
    let mut html = Vec::new();

    for block in normalized.split("\n\n") {
        let mut paragraph: Vec<&str> = Vec::new();
        for line in block.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if let Some((level, text)) = heading(line) {
                flush_paragraph(&mut paragraph, &mut html);
                html.push(render_heading(level, text, &mut anchors));
            } else {
                paragraph.push(line);
            }
        }
        flush_paragraph(&mut paragraph, &mut html);
    }

    html.join("\n")
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let hashes = line.chars().take_while(|ch| *ch == '#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    let text = line[hashes..].strip_prefix(' ')?.trim();
    (!text.is_empty()).then_some((hashes, text))
}

fn render_heading(level: usize, text: &str, anchors: &mut AnchorSlugs) -> String {
    let inner = render_inline(&escape_html(text));
    match anchors.anchor(text) {
        Ok(anchor) => format!("<h{level} id=\"{anchor}\">{inner}</h{level}>"),
        Err(_) => format!("<h{level}>{inner}</h{level}>"),
    }
}

fn flush_paragraph(lines: &mut Vec<&str>, html: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let text = escape_html(&lines.join("\n"));
    html.push(format!("<p>{}</p>", render_inline(&text)));
    lines.clear();
}

/// Inline spans over already-escaped text.
fn render_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        if rest.starts_with("![")
            && let Some((alt, src, consumed)) = bracket_link(&rest[1..])
        {
            out.push_str(&format!("<img src=\"{src}\" alt=\"{alt}\">"));
            rest = &rest[1 + consumed..];
            continue;
        }

        if ch == '['
            && let Some((label, href, consumed)) = bracket_link(rest)
        {
            out.push_str(&format!("<a href=\"{href}\">{}</a>", render_inline(label)));
            rest = &rest[consumed..];
            continue;
        }

        if rest.starts_with("**")
            && let Some(end) = rest[2..].find("**")
            && end > 0
        {
            out.push_str(&format!("<strong>{}</strong>", render_inline(&rest[2..2 + end])));
            rest = &rest[4 + end..];
            continue;
        }

        let closing = match ch {
            '*' => rest[1..].find('*'),
            '_' if !ends_with_word_char(&out) => closing_underscore(&rest[1..]),
            _ => None,
        };
        if let Some(end) = closing
            && end > 0
        {
            out.push_str(&format!("<em>{}</em>", render_inline(&rest[1..1 + end])));
            rest = &rest[2 + end..];
            continue;
        }

        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    out
}

/// Parse `[label](target)` at the start of `text`, returning the byte length
/// consumed.
fn bracket_link(text: &str) -> Option<(&str, &str, usize)> {
    let body = text.strip_prefix('[')?;
    let close = body.find("](")?;
    let label = &body[..close];
    let after = &body[close + 2..];
    let end = after.find(')')?;
    let target = after[..end].trim();
    if target.is_empty() || label.contains('\n') {
        return None;
    }
    Some((label, target, 1 + close + 2 + end + 1))
}

/// First `_` in `text` not followed by a word character. Another opening
/// `_` on the way ends the search.
fn closing_underscore(text: &str) -> Option<usize> {
    let is_word = |ch: Option<char>| ch.is_some_and(char::is_alphanumeric);
    for (index, _) in text.match_indices('_') {
        if !is_word(text[index + 1..].chars().next()) {
            return Some(index);
        }
        if !is_word(text[..index].chars().next_back()) {
            return None;
        }
    }
    None
}

fn ends_with_word_char(out: &str) -> bool {
    out.chars().next_back().is_some_and(char::is_alphanumeric)
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let html = markdown_to_html("First line\nstill first.\n\nSecond.");
        assert_eq!(html, "<p>First line\nstill first.</p>\n<p>Second.</p>");
    }

    #[test]
    fn headings_get_anchor_ids() {
        let html = markdown_to_html("# Intro\n\n## Details\n\n### Details");
        assert_eq!(
            html,
            "<h1 id=\"intro\">Intro</h1>\n<h2 id=\"details\">Details</h2>\n<h3 id=\"details-2\">Details</h3>"
        );
    }

    #[test]
    fn four_hashes_is_paragraph_text() {
        assert_eq!(markdown_to_html("#### deep"), "<p>#### deep</p>");
    }

    #[test]
    fn renders_inline_spans() {
        let html = markdown_to_html(
            "See ![Diagram](/images/blog/arch.png) and [the docs](https://example.com/docs) for **bold** and *soft* or _also soft_.",
        );
        assert_eq!(
            html,
            "<p>See <img src=\"/images/blog/arch.png\" alt=\"Diagram\"> and <a href=\"https://example.com/docs\">the docs</a> for <strong>bold</strong> and <em>soft</em> or <em>also soft</em>.</p>"
        );
    }

    #[test]
    fn snake_case_is_not_italic() {
        assert_eq!(
            markdown_to_html("call snake_case_name here"),
            "<p>call snake_case_name here</p>"
        );
    }

    #[test]
    fn underscores_inside_paths_are_not_italic() {
        assert_eq!(
            markdown_to_html("see /var/some_path_name here"),
            "<p>see /var/some_path_name here</p>"
        );
        assert_eq!(
            markdown_to_html("see /srv/_site_data/ here, _this_ stays."),
            "<p>see /srv/_site_data/ here, <em>this</em> stays.</p>"
        );
    }

    #[test]
    fn escapes_raw_html() {
        assert_eq!(
            markdown_to_html("<script>alert(1)</script> & co"),
            "<p>&lt;script&gt;alert(1)&lt;/script&gt; &amp; co</p>"
        );
    }

    #[test]
    fn strips_mdx_statements_and_components() {
        let body = "import Chart from '../components/Chart.astro';\nexport const meta = {};\n\nIntro.\n\n<Chart data={points} />\n\nOutro with <b>inline</b>.";
        let stripped = strip_component_syntax(body);
        assert!(!stripped.contains("import"));
        assert!(!stripped.contains("export"));
        assert!(!stripped.contains("<Chart"));
        assert!(stripped.contains("<b>inline</b>"));

        let html = markdown_to_html(&stripped);
        assert_eq!(
            html,
            "<p>Intro.</p>\n<p>Outro with &lt;b&gt;inline&lt;/b&gt;.</p>"
        );
    }

    #[test]
    fn unterminated_markers_stay_literal() {
        assert_eq!(markdown_to_html("a * b and [x]("), "<p>a * b and [x](</p>");
    }
}
