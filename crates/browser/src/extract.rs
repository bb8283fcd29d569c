//! Whole-DOM text extraction.  Parsing the page HTML (rather than reading
//! what the viewport shows) is what guarantees collapsed cards and
//! below-the-fold sections make it into the profile text.

use scraper::{Html, Selector};

/// Extract the candidate profile text from page HTML.
///
/// Rooted at `card_selector` when it matches; falls back to `<body>` so a
/// site redesign degrades to noisier text instead of empty text.  Whitespace
/// is normalized per line; empty lines are dropped.
pub fn profile_text(html: &str, card_selector: &str) -> String {
    let document = Html::parse_document(html);

    let from_card = Selector::parse(card_selector)
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .map(|el| collect_text(el))
                .reduce(|mut acc, text| {
                    acc.push('\n');
                    acc.push_str(&text);
                    acc
                })
        })
        .filter(|text| !text.trim().is_empty());

    match from_card {
        Some(text) => text,
        None => {
            let body = Selector::parse("body").ok();
            body.and_then(|selector| document.select(&selector).next().map(collect_text))
                .unwrap_or_default()
        }
    }
}

fn collect_text(element: scraper::ElementRef<'_>) -> String {
    element
        .text()
        .map(|chunk| chunk.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Best-effort candidate first name for the `{name}` template slot: the
/// first word of the profile, when it looks like a name.
pub fn extract_name(profile_text: &str) -> Option<String> {
    let first_line = profile_text.lines().find(|line| !line.trim().is_empty())?;
    let first_word = first_line
        .split([',', '·', '|', '-'])
        .next()?
        .split_whitespace()
        .next()?;

    let looks_like_name = first_word.len() >= 2
        && first_word.chars().next().is_some_and(|c| c.is_uppercase())
        && first_word.chars().all(|c| c.is_alphabetic() || c == '\'');
    looks_like_name.then(|| first_word.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <nav>Discover · Inbox · Settings</nav>
          <div data-testid="profile-card">
            <h2>Alice</h2>
            <p>Python &amp; ML, NYC</p>
            <div class="collapsed">Previously founded a data startup.</div>
          </div>
          <footer>Terms</footer>
        </body></html>
    "#;

    #[test]
    fn extracts_card_text_including_collapsed_sections() {
        let text = profile_text(PAGE, "[data-testid=\"profile-card\"]");
        assert!(text.contains("Alice"));
        assert!(text.contains("Python & ML, NYC"));
        assert!(text.contains("Previously founded a data startup."));
        // Chrome around the card stays out.
        assert!(!text.contains("Inbox"));
        assert!(!text.contains("Terms"));
    }

    #[test]
    fn missing_card_falls_back_to_body() {
        let text = profile_text(PAGE, "#does-not-exist");
        assert!(text.contains("Alice"));
        assert!(text.contains("Terms"));
    }

    #[test]
    fn invalid_selector_falls_back_to_body() {
        let text = profile_text(PAGE, ":::not a selector:::");
        assert!(text.contains("Alice"));
    }

    #[test]
    fn whitespace_is_collapsed_within_a_text_node() {
        let html = "<body><div id=\"c\">  Bob \n\n   Go &amp; infra  </div></body>";
        let text = profile_text(html, "#c");
        assert_eq!(text, "Bob Go & infra");
    }

    #[test]
    fn separate_elements_become_separate_lines() {
        let html = "<body><div id=\"c\"><p>Bob</p><p>Go &amp; infra</p></div></body>";
        let text = profile_text(html, "#c");
        assert_eq!(text, "Bob\nGo & infra");
    }

    #[test]
    fn empty_page_yields_empty_text() {
        assert_eq!(profile_text("<body></body>", "#c"), "");
    }

    #[test]
    fn name_from_first_line() {
        assert_eq!(extract_name("Alice, Python & ML, NYC"), Some("Alice".to_string()));
        assert_eq!(extract_name("\n\nBob · Go & infra"), Some("Bob".to_string()));
    }

    #[test]
    fn non_name_first_words_are_rejected() {
        assert_eq!(extract_name("10+ years in fintech"), None);
        assert_eq!(extract_name("looking for a co-founder"), None);
        assert_eq!(extract_name(""), None);
    }
}
