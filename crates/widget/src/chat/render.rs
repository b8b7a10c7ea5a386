//! Assistant text to display markup.
//!
//! Supports a deliberately small subset: `**bold**`, `*italic*`, line breaks, `- ` and
//! `• ` bullets, and two emoji glyphs wrapped for styling. The transform is not
//! idempotent: feeding rendered markup back in re-consumes emphasis markers, so
//! callers always render from the original accumulated plain text.
//!
//! Emphasis is matched within a single line so generated tags never straddle a list
//! item boundary.

use std::sync::LazyLock;

use regex::Regex;

use crate::chat::events::Markup;

static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold pattern compiles"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("italic pattern compiles"));

const BULLET_PREFIXES: [&str; 2] = ["- ", "• "];
const STYLED_EMOJI: [&str; 2] = ["✅", "✔️"];

/// Renders assistant plain text into markup.
pub fn render_markdown(text: &str) -> Markup {
    let mut html = String::with_capacity(text.len() + text.len() / 4);
    let mut in_list = false;

    for (index, line) in text.split('\n').enumerate() {
        if let Some(item) = bullet_item(line) {
            if !in_list {
                html.push_str("<ul>");
                in_list = true;
            }
            html.push_str("<li>");
            html.push_str(&render_inline(item));
            html.push_str("</li>");
            continue;
        }

        if in_list {
            html.push_str("</ul>");
            in_list = false;
        } else if index > 0 {
            html.push_str("<br>");
        }
        html.push_str(&render_inline(line));
    }

    if in_list {
        html.push_str("</ul>");
    }

    Markup::new(html)
}

/// Renders user-typed text: escaped, never interpreted.
pub fn render_plain(text: &str) -> Markup {
    Markup::new(escape_html(text))
}

fn bullet_item(line: &str) -> Option<&str> {
    BULLET_PREFIXES
        .iter()
        .find_map(|prefix| line.strip_prefix(prefix))
        .filter(|item| !item.is_empty())
}

fn render_inline(line: &str) -> String {
    let escaped = escape_html(line);
    let bold = BOLD.replace_all(&escaped, "<strong>$1</strong>");
    let mut rendered = ITALIC.replace_all(&bold, "<em>$1</em>").into_owned();

    for emoji in STYLED_EMOJI {
        if rendered.contains(emoji) {
            rendered = rendered.replace(emoji, &format!(r#"<span class="emoji">{emoji}</span>"#));
        }
    }

    rendered
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_bold_and_italic_spans() {
        let markup = render_markdown("**bold** and *italic*");
        assert_eq!(markup.as_str(), "<strong>bold</strong> and <em>italic</em>");
    }

    #[test]
    fn growing_accumulator_never_duplicates_markers() {
        let fragments = ["**bo", "ld** and *ita", "lic*"];
        let mut accumulated = String::new();
        let mut last = Markup::default();

        for fragment in fragments {
            accumulated.push_str(fragment);
            last = render_markdown(&accumulated);
        }

        assert_eq!(last, render_markdown("**bold** and *italic*"));
        assert_eq!(last.as_str().matches("<strong>").count(), 1);
        assert_eq!(last.as_str().matches("<em>").count(), 1);
        assert!(!last.as_str().contains('*'));
    }

    #[test]
    fn unfinished_emphasis_stays_literal() {
        assert_eq!(render_markdown("**bo").as_str(), "**bo");
        assert_eq!(render_markdown("*ita").as_str(), "*ita");
    }

    #[test]
    fn rendering_markup_again_is_not_the_identity() {
        let once = render_markdown("a * b * c");
        let twice = render_markdown(once.as_str());
        assert_ne!(once, twice);
    }

    #[test]
    fn both_bullet_spellings_collapse_into_one_list() {
        let markup = render_markdown("We offer:\n- Towing\n• Jump starts\nCall us!");
        assert_eq!(
            markup.as_str(),
            "We offer:<ul><li>Towing</li><li>Jump starts</li></ul>Call us!"
        );
    }

    #[test]
    fn emphasis_never_spans_lines() {
        assert_eq!(render_markdown("**Note:\nfoo**").as_str(), "**Note:<br>foo**");
        assert_eq!(
            render_markdown("- *first\n- second*").as_str(),
            "<ul><li>*first</li><li>second*</li></ul>"
        );
    }

    #[test]
    fn newlines_become_breaks() {
        assert_eq!(render_markdown("one\ntwo\n\nthree").as_str(), "one<br>two<br><br>three");
    }

    #[test]
    fn styled_emoji_are_wrapped() {
        assert_eq!(
            render_markdown("Booked ✅").as_str(),
            r#"Booked <span class="emoji">✅</span>"#
        );
        assert_eq!(
            render_markdown("✔️ done").as_str(),
            r#"<span class="emoji">✔️</span> done"#
        );
    }

    #[test]
    fn html_in_text_is_escaped() {
        assert_eq!(
            render_markdown("<script>alert('x')</script> **hi**").as_str(),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; <strong>hi</strong>"
        );
        assert_eq!(render_plain("a < b & *c*").as_str(), "a &lt; b &amp; *c*");
    }
}
