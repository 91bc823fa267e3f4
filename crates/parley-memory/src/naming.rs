//! Reversible encoding of partition key parts for paths and index keys.

/// Encode one key part so it is safe as a path component or a `:`-separated key
/// segment.
///
/// Bytes outside `A-Z a-z 0-9 - _ . ~` are percent-encoded, so distinct inputs
/// never share an encoding. Dot-only values are escaped, and the empty value
/// becomes a lone `%`.
pub fn key_component(value: &str) -> String {
    if value.is_empty() {
        return "%".to_string();
    }
    if value.chars().all(|c| c == '.') {
        return "%2E".repeat(value.len());
    }
    urlencoding::encode(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::key_component;
    use pretty_assertions::assert_eq;

    #[test]
    fn safe_values_pass_through() {
        assert_eq!(key_component("chat-1"), "chat-1");
        assert_eq!(key_component("planner_agent.v2"), "planner_agent.v2");
    }

    #[test]
    fn separators_and_dots_are_escaped() {
        assert_eq!(key_component("team/a"), "team%2Fa");
        assert_eq!(key_component("chat:1"), "chat%3A1");
        assert_eq!(key_component(".."), "%2E%2E");
        assert_eq!(key_component(""), "%");
    }

    #[test]
    fn lookalike_values_stay_distinct() {
        let encoded: Vec<String> = ["team/a", "team a", "team_a", "team%2Fa"]
            .iter()
            .map(|value| key_component(value))
            .collect();
        for (i, left) in encoded.iter().enumerate() {
            for right in &encoded[i + 1..] {
                assert_ne!(left, right);
            }
        }
    }
}
