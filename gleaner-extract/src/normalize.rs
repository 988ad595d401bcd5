//! Markup-to-text normalisation.

use scraper::{ElementRef, Html};

/// Elements whose boundaries separate words.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Elements whose text is never content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Decode character references, strip tags, collapse whitespace and trim.
///
/// Repeated until the output stops changing, so escaped markup such as
/// `&lt;b&gt;` is stripped too and `normalize(normalize(s)) == normalize(s)`.
/// The cost: text that only looks like a tag once decoded, such as an escaped
/// `Vec<String>`, loses the tag-shaped part. Bare `<`, `>` and `&` survive.
///
/// ```
/// use gleaner_extract::normalize;
///
/// assert_eq!(normalize("  <p>Hello&nbsp;<b>world</b></p>\n"), "Hello world");
/// ```
pub fn normalize(input: &str) -> String {
    let mut current = single_pass(input);
    // Every pass that changes the text shortens it or only rewrites
    // whitespace, so the input length bounds the number of passes.
    for _ in 0..=input.len() {
        let next = single_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn single_pass(input: &str) -> String {
    if !input.contains(['<', '&']) {
        return collapse_whitespace(input);
    }
    let fragment = Html::parse_fragment(input);
    let mut text = String::with_capacity(input.len());
    push_text(fragment.root_element(), &mut text);
    collapse_whitespace(&text)
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                out.push(' ');
            }
            push_text(child_el, out);
            if block {
                out.push(' ');
            }
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_entities() {
        assert_eq!(normalize("Fish &amp; chips &#8211; &quot;good&quot;"), "Fish & chips \u{2013} \"good\"");
    }

    #[test]
    fn block_boundaries_separate_words() {
        assert_eq!(normalize("<p>first</p><p>second</p>"), "first second");
        assert_eq!(normalize("<li>a</li><li>b</li>"), "a b");
        assert_eq!(normalize("line<br>break"), "line break");
    }

    #[test]
    fn inline_markup_keeps_words_joined() {
        assert_eq!(normalize("re<b>mark</b>able"), "remarkable");
    }

    #[test]
    fn drops_scripts_and_styles() {
        assert_eq!(
            normalize("<style>.x{}</style>visible<script>var a = 1;</script>"),
            "visible"
        );
    }

    #[test]
    fn escaped_markup_is_stripped_on_later_passes() {
        assert_eq!(normalize("&lt;em&gt;kept&lt;/em&gt;"), "kept");
    }

    #[test]
    fn tag_shaped_literal_text_is_dropped() {
        assert_eq!(normalize("<code>Vec&lt;String&gt;</code> owns"), "Vec owns");
        assert_eq!(normalize(&normalize("Vec&lt;String&gt;")), "Vec");
    }

    #[test]
    fn bare_operators_survive() {
        assert_eq!(normalize("1 &lt; 2 &amp;&amp; 3 &gt; 2"), "1 < 2 && 3 > 2");
    }

    #[test]
    fn plain_text_only_collapses_whitespace() {
        assert_eq!(normalize("\t a \n\n b  "), "a b");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }
}
