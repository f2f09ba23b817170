//! Redis-style glob matching over raw bytes, used by KEYS, PSUBSCRIBE,
//! PUBSUB CHANNELS and CONFIG GET.
//!
//! Supports `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern(Vec<u8>);

impl Pattern {
    pub fn new(pattern: impl Into<Vec<u8>>) -> Self {
        Pattern(pattern.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True for `*`, which every key matches.
    pub fn is_match_all(&self) -> bool {
        self.0 == b"*"
    }

    pub fn matches(&self, text: &[u8]) -> bool {
        matches_at(&self.0, text)
    }
}

pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    matches_at(pattern, text)
}

fn matches_at(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Where to resume after the most recent `*`: (pattern index, text index).
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p + 1, t));
                p += 1;
                continue;
            }
            Some(b'?') => Some(1),
            Some(b'[') => match_class(&pattern[p..], text[t]),
            Some(b'\\') if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(2),
            Some(&c) => (c == text[t]).then_some(1),
            None => None,
        };

        match step {
            Some(width) => {
                p += width;
                t += 1;
            }
            None => match backtrack {
                Some((bp, bt)) => {
                    backtrack = Some((bp, bt + 1));
                    p = bp;
                    t = bt + 1;
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Match one byte against the class at the start of `pattern`.
/// Returns the class width in the pattern when it matches.
fn match_class(pattern: &[u8], c: u8) -> Option<usize> {
    let mut i = 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut hit = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            hit |= pattern[i + 1] == c;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = (pattern[i].min(pattern[i + 2]), pattern[i].max(pattern[i + 2]));
            hit |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            hit |= pattern[i] == c;
            i += 1;
        }
    }

    // An unterminated class matches nothing.
    if i >= pattern.len() {
        return None;
    }
    (hit != negate).then_some(i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(p: &str, t: &str) -> bool {
        glob_match(p.as_bytes(), t.as_bytes())
    }

    #[test]
    fn test_star_and_question() {
        assert!(m("*", ""));
        assert!(m("*", "anything"));
        assert!(m("h*o", "hello"));
        assert!(m("h*o", "ho"));
        assert!(!m("h*o", "help"));
        assert!(m("h?llo", "hallo"));
        assert!(!m("h?llo", "hllo"));
        assert!(m("a*b*c", "axxbyyc"));
        assert!(!m("a*b*c", "axxbyy"));
    }

    #[test]
    fn test_classes() {
        assert!(m("h[ae]llo", "hello"));
        assert!(!m("h[ae]llo", "hillo"));
        assert!(m("h[a-e]llo", "hello"));
        assert!(!m("h[a-d]llo", "hello"));
        assert!(!m("h[^e]llo", "hello"));
        assert!(m("h[^e]llo", "hallo"));
        assert!(!m("h[ello", "hello"));
    }

    #[test]
    fn test_escape() {
        assert!(m(r"h\*llo", "h*llo"));
        assert!(!m(r"h\*llo", "hello"));
    }

    #[test]
    fn test_channel_patterns() {
        let p = Pattern::new("news.*");
        assert!(p.matches(b"news.sports"));
        assert!(!p.matches(b"weather.today"));
        assert!(m("user:*:name", "user::name"));
        assert!(!m("user:*:name", "user:123:age"));
    }
}
