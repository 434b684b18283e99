// ABOUTME: Structural validation grammar for optimized user stories.
// ABOUTME: A candidate is valid or it is not; violations are never errors.

/// Literal opening every valid story must start with.
pub const STORY_OPENING: &str = "As a user, I want";

/// Literal header introducing the criteria list.
pub const CRITERIA_HEADER: &str = "Acceptance Criteria:";

/// Bounds on the number of acceptance criteria.
pub const MIN_CRITERIA: usize = 3;
pub const MAX_CRITERIA: usize = 5;

/// Check a candidate story against the output grammar.
///
/// Valid iff:
/// - it begins with the literal `"As a user, I want"`;
/// - `"so that"` occurs before the first line break;
/// - `"Acceptance Criteria:"` occurs exactly once;
/// - the text after the header yields 3 to 5 non-empty lines;
/// - line `i` (1-indexed) begins with `"<i>. "` followed by non-whitespace.
pub fn validate_story(candidate: &str) -> bool {
    if !candidate.starts_with(STORY_OPENING) {
        return false;
    }

    let first_line = candidate.lines().next().unwrap_or("");
    if !first_line.contains("so that") {
        return false;
    }

    if candidate.matches(CRITERIA_HEADER).count() != 1 {
        return false;
    }

    let entries = criteria_lines(candidate);
    if entries.len() < MIN_CRITERIA || entries.len() > MAX_CRITERIA {
        return false;
    }

    entries
        .iter()
        .enumerate()
        .all(|(i, entry)| is_numbered_entry(entry, i + 1))
}

/// Non-empty lines following the criteria header, trimmed. Empty when the
/// header is absent.
pub fn criteria_lines(candidate: &str) -> Vec<&str> {
    match candidate.split_once(CRITERIA_HEADER) {
        Some((_, tail)) => tail
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect(),
        None => Vec::new(),
    }
}

fn is_numbered_entry(entry: &str, index: usize) -> bool {
    let prefix = format!("{index}. ");
    entry
        .strip_prefix(&prefix)
        .is_some_and(|rest| !rest.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "As a user, I want to log in securely so that I can access my account.\n\n\
        Acceptance Criteria:\n\
        1. The login form must validate credentials before granting access.\n\
        2. Failed attempts must be tracked and limited.\n\
        3. The user must receive clear feedback on success or failure.";

    #[test]
    fn accepts_conformant_story() {
        assert!(validate_story(VALID));
    }

    #[test]
    fn rejects_wrong_opening() {
        let story = VALID.replace("As a user, I want", "As an admin, I need");
        assert!(!validate_story(&story));
    }

    #[test]
    fn rejects_so_that_after_first_line_break() {
        let story = "As a user, I want to log in.\nso that I can access my account.\n\n\
            Acceptance Criteria:\n1. One thing.\n2. Another thing.\n3. A third thing.";
        assert!(!validate_story(story));
    }

    #[test]
    fn rejects_missing_header() {
        let story = VALID.replace("Acceptance Criteria:", "Criteria:");
        assert!(!validate_story(&story));
    }

    #[test]
    fn rejects_duplicate_header() {
        let story = format!("{VALID}\nAcceptance Criteria:");
        assert!(!validate_story(&story));
    }

    #[test]
    fn rejects_too_few_criteria() {
        let story = "As a user, I want X so that Y.\n\nAcceptance Criteria:\n1. Only one.\n2. Only two.";
        assert!(!validate_story(story));
    }

    #[test]
    fn rejects_too_many_criteria() {
        let story = "As a user, I want X so that Y.\n\nAcceptance Criteria:\n\
            1. a\n2. b\n3. c\n4. d\n5. e\n6. f";
        assert!(!validate_story(story));
    }

    #[test]
    fn rejects_misnumbered_criteria() {
        let story = "As a user, I want X so that Y.\n\nAcceptance Criteria:\n\
            1. First.\n3. Skipped two.\n4. Fourth.";
        assert!(!validate_story(story));
    }

    #[test]
    fn rejects_numbered_entry_without_content() {
        let story = "As a user, I want X so that Y.\n\nAcceptance Criteria:\n\
            1. First.\n2.  \n3. Third.";
        assert!(!validate_story(story));
    }

    #[test]
    fn five_criteria_is_accepted() {
        let story = "As a user, I want X so that Y.\n\nAcceptance Criteria:\n\
            1. a\n2. b\n3. c\n4. d\n5. e";
        assert!(validate_story(story));
    }

    #[test]
    fn blank_lines_between_criteria_are_ignored() {
        let story = "As a user, I want X so that Y.\n\nAcceptance Criteria:\n\
            1. a\n\n2. b\n\n3. c";
        assert!(validate_story(story));
    }

    #[test]
    fn criteria_lines_empty_without_header() {
        assert!(criteria_lines("no header here").is_empty());
    }
}
