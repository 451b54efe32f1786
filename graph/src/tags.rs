//! Reach-count comment tags of the form `[rg:games=N]`.

const TAG_PREFIX: &str = "[rg:games=";

fn find_tags(comment: &str) -> Vec<(usize, usize, u64)> {
    let mut tags = Vec::new();
    let mut offset = 0;
    while let Some(start) = comment[offset..].find(TAG_PREFIX) {
        let start = offset + start;
        let digits_start = start + TAG_PREFIX.len();
        let rest = &comment[digits_start..];
        let digits_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let after_digits = digits_start + digits_len;
        if digits_len > 0 && comment[after_digits..].starts_with(']') {
            let count = comment[digits_start..after_digits]
                .parse()
                .expect("checked ascii digits");
            tags.push((start, after_digits + 1, count));
            offset = after_digits + 1;
        } else {
            offset = digits_start;
        }
    }
    tags
}

fn strip_tags(comment: &str) -> String {
    let tags = find_tags(comment);
    let mut cleaned = String::with_capacity(comment.len());
    let mut cursor = 0;
    for (start, end, _) in &tags {
        cleaned.push_str(&comment[cursor..*start]);
        cursor = *end;
    }
    cleaned.push_str(&comment[cursor..]);
    cleaned.trim().to_string()
}

/// Return the reach count (if tagged) and the comment with tags removed.
/// When multiple tags are present the last one wins.
pub fn extract_reach_count(comment: &str) -> (Option<u64>, String) {
    let tags = find_tags(comment);
    match tags.last() {
        Some((_, _, count)) => (Some(*count), strip_tags(comment)),
        None => (None, comment.to_string()),
    }
}

/// Remove any existing reach-count tag and append a fresh one.
pub fn upsert_reach_count_tag(comment: &str, count: u64) -> String {
    let base = strip_tags(comment);
    let tag = format!("{TAG_PREFIX}{count}]");
    if base.is_empty() {
        tag
    } else {
        format!("{base} {tag}")
    }
}
