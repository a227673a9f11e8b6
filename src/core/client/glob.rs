// src/core/client/glob.rs

//! Redis-style glob matching, used by the in-memory store to answer
//! `SCAN ... MATCH` the way a real server would.

/// Returns true if the pattern names a family of keys rather than one literal
/// key. Only `*` counts: `?` and `[` are legal in key names (`arr[0]`), so a
/// pattern without `*` is looked up as written.
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains('*')
}

/// Matches a string against a Redis-style glob pattern.
/// Supports `*`, `?`, `[...]`, `[^...]`, and `\`.
/// Iterative with single-star backtracking, so hostile patterns cannot blow the stack.
pub fn glob_match(pattern: &[u8], string: &[u8]) -> bool {
    let mut p_idx = 0;
    let mut s_idx = 0;
    // Pattern index just past the last '*', and the string index it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while s_idx < string.len() {
        let step = match pattern.get(p_idx) {
            Some(b'?') => Some(1),
            Some(b'*') => {
                star = Some((p_idx + 1, s_idx));
                p_idx += 1;
                continue;
            }
            Some(b'[') => match_char_set(&pattern[p_idx..], string[s_idx]),
            Some(b'\\') if p_idx + 1 < pattern.len() => {
                (pattern[p_idx + 1] == string[s_idx]).then_some(2)
            }
            Some(&c) if c == string[s_idx] => Some(1),
            _ => None,
        };

        match (step, star) {
            (Some(len), _) => {
                p_idx += len;
                s_idx += 1;
            }
            (None, Some((star_p, star_s))) => {
                p_idx = star_p;
                s_idx = star_s + 1;
                star = Some((star_p, star_s + 1));
            }
            (None, None) => return false,
        }
    }

    while pattern.get(p_idx) == Some(&b'*') {
        p_idx += 1;
    }
    p_idx == pattern.len()
}

/// Checks `c` against the `[...]` set at the start of `segment`.
/// Returns the length of the set (brackets included) when it matches.
fn match_char_set(segment: &[u8], c: u8) -> Option<usize> {
    let mut idx = 1;
    let negated = segment.get(idx) == Some(&b'^');
    if negated {
        idx += 1;
    }

    let mut matched = false;
    while idx < segment.len() && segment[idx] != b']' {
        let lo = segment[idx];
        if idx + 2 < segment.len() && segment[idx + 1] == b'-' && segment[idx + 2] != b']' {
            let hi = segment[idx + 2];
            matched |= (lo.min(hi)..=lo.max(hi)).contains(&c);
            idx += 3;
        } else {
            matched |= lo == c;
            idx += 1;
        }
    }

    // An unterminated set never matches.
    (idx < segment.len() && matched != negated).then_some(idx + 1)
}
