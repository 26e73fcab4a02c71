use regex::Regex;
use std::sync::OnceLock;

fn details_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<details>.*?</details>").unwrap())
}

/// Strips `<details>...</details>` blocks and surrounding whitespace from a
/// message's content before it is handed to the model (spec.md §4.5 step 6).
/// Grounded on `services/brain/app/message/multiturn.py::sanitize_messages`
/// (`re.sub(r'<details>.*?</details>', '', content, flags=re.DOTALL)` then
/// `.strip()`).
pub fn sanitize_content(content: &str) -> String {
    details_pattern().replace_all(content, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_details_block_spanning_multiple_lines() {
        let input = "before\n<details>\nhidden stuff\nmore\n</details>\nafter";
        assert_eq!(sanitize_content(input), "before\n\nafter");
    }

    #[test]
    fn leaves_plain_content_untouched() {
        assert_eq!(sanitize_content("  hello world  "), "hello world");
    }

    #[test]
    fn strips_multiple_details_blocks() {
        let input = "<details>a</details>keep<details>b</details>";
        assert_eq!(sanitize_content(input), "keep");
    }
}
