//! Conversation titles

use crate::llm::GenerationOptions;

/// Prompt asking the model for a title of at most `max_chars` characters
pub fn title_prompt(first_message: &str, max_chars: usize) -> String {
    format!(
        "Generate a short title (no more than {} characters) for the following conversation. \
         Reply with the title only.\n\n{}",
        max_chars, first_message
    )
}

/// Options used for the title request
pub fn title_options() -> GenerationOptions {
    GenerationOptions {
        temperature: Some(0.7),
        max_tokens: Some(50),
        ..Default::default()
    }
}

/// Deterministic title: the first `max_chars` characters, plus `...` when cut
pub fn fallback_title(first_message: &str, max_chars: usize) -> String {
    let text = first_message.trim();
    let mut title: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        title.push_str("...");
    }
    title
}

/// Tidy a model reply into a title; `None` when nothing usable is left
pub fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Title:")
        .or_else(|| line.strip_prefix("title:"))
        .unwrap_or(line)
        .trim();
    let title = line
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '*' | '“' | '”' | '《' | '》'))
        .trim();

    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_truncates_by_chars() {
        assert_eq!(fallback_title("short", 20), "short");
        assert_eq!(
            fallback_title("How do I reverse a linked list in Rust?", 20),
            "How do I reverse a l..."
        );
        assert_eq!(fallback_title("你好你好你好", 4), "你好你好...");
        assert_eq!(fallback_title("exactly five", 12), "exactly five");
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  \"Rust Lists\"\n"), Some("Rust Lists".to_string()));
        assert_eq!(clean_title("Title: Sorting tips"), Some("Sorting tips".to_string()));
        assert_eq!(clean_title("\n\nfirst\nsecond"), Some("first".to_string()));
        assert_eq!(clean_title("  \"\" "), None);
        assert_eq!(clean_title(""), None);
    }
}
