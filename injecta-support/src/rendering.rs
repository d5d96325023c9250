//! Text rendering utilities for resolver keys and error hints.

/// Shortens a fully qualified type path to its bare name.
///
/// Path prefixes are dropped from every segment, so generic arguments
/// keep their own short names.
///
/// ```
/// use injecta_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("my_app::services::UserService"), "UserService");
/// assert_eq!(shorten_type_name("alloc::vec::Vec<my_app::User>"), "Vec<User>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Returns `true` if `name` looks like a plain identifier: a leading
/// letter or underscore followed by letters, digits or underscores.
///
/// ```
/// use injecta_support::rendering::is_plain_identifier;
///
/// assert!(is_plain_identifier("UserService"));
/// assert!(!is_plain_identifier("Vec<u8>"));
/// assert!(!is_plain_identifier(""));
/// ```
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Suggests registered keys that resemble `requested`.
///
/// Ranking: same letters ignoring case, then substring matches, then a
/// shared prefix of at least three characters.
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let requested_lower = requested.to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter_map(|&name| {
            if name == requested {
                return None;
            }
            let name_lower = name.to_lowercase();

            if name_lower == requested_lower {
                return Some((name, 100));
            }

            if !requested_lower.is_empty()
                && (name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower))
            {
                return Some((name, 80));
            }

            let common = name_lower
                .chars()
                .zip(requested_lower.chars())
                .take_while(|(a, b)| a == b)
                .count();

            (common >= 3).then_some((name, common * 10))
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Renders a suggestion list as an indented hint block.
///
/// Returns an empty string when there is nothing to suggest.
pub fn render_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n  Did you mean one of:");
    for suggestion in suggestions {
        out.push_str("\n    - ");
        out.push_str(suggestion);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorten_simple_path() {
        assert_eq!(shorten_type_name("my_app::services::UserService"), "UserService");
    }

    #[test]
    fn shorten_with_generics() {
        assert_eq!(
            shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
            "Arc<dyn Logger>"
        );
    }

    #[test]
    fn shorten_tuple() {
        assert_eq!(shorten_type_name("(i32, alloc::string::String)"), "(i32, String)");
    }

    #[test]
    fn shorten_no_path() {
        assert_eq!(shorten_type_name("Sample1"), "Sample1");
    }

    #[test]
    fn plain_identifiers() {
        assert!(is_plain_identifier("Sample1"));
        assert!(is_plain_identifier("_hidden"));
        assert!(!is_plain_identifier("1st"));
        assert!(!is_plain_identifier("Arc<dyn Logger>"));
        assert!(!is_plain_identifier("(i32, String)"));
    }

    #[test]
    fn suggest_case_insensitive_first() {
        let available = vec!["sampler", "Sample", "component"];
        let suggestions = suggest_similar("sample", &available, 3);
        assert_eq!(suggestions, vec!["Sample".to_string(), "sampler".to_string()]);
    }

    #[test]
    fn suggest_shared_prefix() {
        let available = vec!["userService", "logger"];
        let suggestions = suggest_similar("userRepo", &available, 3);
        assert_eq!(suggestions, vec!["userService".to_string()]);
    }

    #[test]
    fn suggest_no_match() {
        let available = vec!["database"];
        assert!(suggest_similar("xyz", &available, 3).is_empty());
    }

    #[test]
    fn render_empty_suggestions() {
        assert_eq!(render_suggestions(&[]), "");
    }

    #[test]
    fn render_suggestion_block() {
        let rendered = render_suggestions(&["sample".to_string()]);
        assert!(rendered.contains("Did you mean"));
        assert!(rendered.contains("- sample"));
    }
}
