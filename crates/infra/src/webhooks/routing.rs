//! Event kind patterns
//!
//! A pattern is an exact kind (`todo_created`) or a glob where `*` matches
//! any run of characters (`todo_*`, `*_created`, `*`).

/// Whether `kind` matches `pattern`
#[must_use]
pub fn match_pattern(pattern: &str, kind: &str) -> bool {
    if pattern == kind {
        return true;
    }
    if !pattern.contains('*') {
        return false;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = kind;

    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(0) => rest = &rest[part.len()..],
            // Before the first `*` the match is anchored
            Some(_) if index == 0 => return false,
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }

    match parts.last() {
        Some(last) if !last.is_empty() => kind.ends_with(last),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_wildcards() {
        assert!(match_pattern("todo_created", "todo_created"));
        assert!(!match_pattern("todo_created", "todo_completed"));
        assert!(match_pattern("*", "anything_at_all"));
        assert!(match_pattern("todo_*", "todo_created"));
        assert!(!match_pattern("todo_*", "todolist_created"));
        assert!(match_pattern("*_created", "message_created"));
        assert!(!match_pattern("*_created", "message_created_late"));
        assert!(match_pattern("question_*_created", "question_answer_created"));
        assert!(!match_pattern("question_*_created", "question_answer_trashed"));
    }

    #[test]
    fn prefix_must_anchor_at_start() {
        assert!(!match_pattern("todo*", "my_todo_created"));
    }
}
