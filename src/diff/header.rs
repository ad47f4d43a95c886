use super::types::HunkHeader;

/// Parse a hunk header like "@@ -10,4 +10,15 @@ fn foo()"
pub fn parse_hunk_header(line: &str) -> Option<HunkHeader> {
    // Find the range info between @@ markers
    let after_first = line.strip_prefix("@@ ")?;
    let end_idx = after_first.find(" @@")?;
    let range_str = &after_first[..end_idx];
    let section = after_first[end_idx + 3..].trim().to_string();

    // Parse "-old_start,old_count +new_start,new_count"
    let mut parts = range_str.split_whitespace();
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;
    if parts.next().is_some() {
        return None;
    }

    let (old_start, old_count) = parse_range(old)?;
    let (new_start, new_count) = parse_range(new)?;

    Some(HunkHeader {
        old_start,
        old_count,
        new_start,
        new_count,
        section,
    })
}

/// Parse "start,count" or just "start" (count defaults to 1)
fn parse_range(s: &str) -> Option<(u32, u32)> {
    if let Some((start, count)) = s.split_once(',') {
        Some((start.parse().ok()?, count.parse().ok()?))
    } else {
        Some((s.parse().ok()?, 1))
    }
}

/// Split "diff --git a/x b/y" into `(x, y)`.
///
/// When the two sides are identical (the common case) the split point is
/// found by length, so paths containing " b/" still come out right.
pub fn parse_git_header_paths(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("diff --git ")?;

    // Same path on both sides: "a/<p> b/<p>"
    if rest.len() % 2 == 1 {
        let half = rest.len() / 2;
        if rest.is_char_boundary(half) && rest.is_char_boundary(half + 1) {
            let (left, right) = (&rest[..half], &rest[half + 1..]);
            if let (Some(l), Some(r)) = (left.strip_prefix("a/"), right.strip_prefix("b/")) {
                if l == r {
                    return Some((l.to_string(), r.to_string()));
                }
            }
        }
    }

    let idx = rest.find(" b/")?;
    let old = rest[..idx].strip_prefix("a/").unwrap_or(&rest[..idx]);
    let new = &rest[idx + 3..];
    Some((old.to_string(), new.to_string()))
}

/// Path from a "--- a/x" / "+++ b/x" line. `None` for /dev/null.
pub fn parse_marker_path(rest: &str) -> Option<String> {
    // Drop a trailing "\t<timestamp>" from non-git diffs
    let path = rest.split('\t').next().unwrap_or(rest).trim_end();
    if path == "/dev/null" {
        return None;
    }
    let path = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(path.to_string())
}
