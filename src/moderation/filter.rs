/// Sensitive-word matcher
///
/// A prefix trie over the keyword set, built once per keyword version
/// and shared immutably. Matching scans every start offset and walks
/// the trie; input characters are lowercased one at a time so matching
/// is case-insensitive without allocating a lowered copy of the text.
use std::collections::HashMap;

const REDACTION_PLACEHOLDER: &str = "***";

#[derive(Debug, Default)]
struct Node {
    children: HashMap<char, usize>,
    terminal: bool,
}

/// A match found in scanned text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordMatch {
    pub word: String,
    /// Character offset (not byte offset) of the match start
    pub start: usize,
    pub len: usize,
}

/// Immutable keyword matcher
#[derive(Debug)]
pub struct WordFilter {
    // Arena-allocated trie; node 0 is the root
    nodes: Vec<Node>,
    word_count: usize,
}

impl WordFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self {
            nodes: vec![Node::default()],
            word_count: 0,
        };
        for word in words {
            filter.insert(word.as_ref());
        }
        filter
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty::<&str>())
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    fn insert(&mut self, word: &str) {
        let normalized: Vec<char> = word
            .trim()
            .chars()
            .flat_map(|c| c.to_lowercase())
            .collect();
        if normalized.is_empty() {
            return;
        }

        let mut node = 0usize;
        for ch in normalized {
            node = match self.nodes[node].children.get(&ch) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[node].children.insert(ch, next);
                    next
                }
            };
        }

        if !self.nodes[node].terminal {
            self.nodes[node].terminal = true;
            self.word_count += 1;
        }
    }

    /// Whether the exact word is in the set
    pub fn contains_word(&self, word: &str) -> bool {
        let mut node = 0usize;
        for ch in word.trim().chars().flat_map(|c| c.to_lowercase()) {
            match self.nodes[node].children.get(&ch) {
                Some(&next) => node = next,
                None => return false,
            }
        }
        node != 0 && self.nodes[node].terminal
    }

    /// Find every keyword occurrence in `text`, at every start offset.
    /// Overlapping and nested matches are all reported.
    pub fn scan(&self, text: &str) -> Vec<WordMatch> {
        let chars: Vec<char> = text.chars().collect();
        let mut matches = Vec::new();

        for start in 0..chars.len() {
            let mut node = 0usize;
            for (offset, ch) in chars[start..].iter().enumerate() {
                let lowered = match ch.to_lowercase().next() {
                    Some(c) => c,
                    None => *ch,
                };
                match self.nodes[node].children.get(&lowered) {
                    Some(&next) => node = next,
                    None => break,
                }

                if self.nodes[node].terminal {
                    matches.push(WordMatch {
                        word: chars[start..=start + offset].iter().collect(),
                        start,
                        len: offset + 1,
                    });
                }
            }
        }

        matches
    }

    /// Whether the text contains any keyword
    pub fn has_match(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().collect();

        for start in 0..chars.len() {
            let mut node = 0usize;
            for ch in &chars[start..] {
                let lowered = match ch.to_lowercase().next() {
                    Some(c) => c,
                    None => *ch,
                };
                match self.nodes[node].children.get(&lowered) {
                    Some(&next) => node = next,
                    None => break,
                }
                if self.nodes[node].terminal {
                    return true;
                }
            }
        }
        false
    }

    /// Replace every matched span with the fixed `***` placeholder.
    /// Overlapping matches collapse into one merged span; spans are
    /// rewritten back to front so earlier offsets stay valid.
    pub fn redact(&self, text: &str) -> String {
        let matches = self.scan(text);
        if matches.is_empty() {
            return text.to_string();
        }

        let mut spans: Vec<(usize, usize)> = matches
            .iter()
            .map(|m| (m.start, m.start + m.len))
            .collect();
        spans.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (start, end) in spans {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        let mut chars: Vec<char> = text.chars().collect();
        for &(start, end) in merged.iter().rev() {
            chars.splice(start..end, REDACTION_PLACEHOLDER.chars());
        }
        chars.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_word_in_sentence() {
        let filter = WordFilter::new(["badword"]);
        let matches = filter.scan("this is a badword here");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].word, "badword");
        assert_eq!(matches[0].start, 10);
    }

    #[test]
    fn test_case_insensitive() {
        let filter = WordFilter::new(["BadWord"]);
        assert!(filter.has_match("totally a BADWORD"));
        assert!(filter.has_match("totally a badword"));
    }

    #[test]
    fn test_overlapping_matches_all_reported() {
        let filter = WordFilter::new(["ab", "abc", "bc"]);
        let words: Vec<String> = filter.scan("abc").into_iter().map(|m| m.word).collect();
        assert_eq!(words, vec!["ab", "abc", "bc"]);
    }

    #[test]
    fn test_redact_uses_fixed_placeholder() {
        let filter = WordFilter::new(["badword"]);
        assert_eq!(
            filter.redact("this is a badword here"),
            "this is a *** here"
        );
    }

    #[test]
    fn test_redact_handles_unicode() {
        let filter = WordFilter::new(["敏感词"]);
        assert_eq!(filter.redact("含有敏感词的文本"), "含有***的文本");
    }

    #[test]
    fn test_redact_merges_overlapping_matches() {
        let filter = WordFilter::new(["ab", "bc"]);
        assert_eq!(filter.redact("abc def"), "*** def");
    }

    #[test]
    fn test_no_match_leaves_text_unchanged() {
        let filter = WordFilter::new(["badword"]);
        assert_eq!(filter.redact("all clean"), "all clean");
        assert!(!filter.has_match("all clean"));
        assert!(filter.scan("all clean").is_empty());
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let filter = WordFilter::empty();
        assert!(!filter.has_match("anything at all"));
        assert_eq!(filter.word_count(), 0);
    }

    #[test]
    fn test_contains_word() {
        let filter = WordFilter::new(["badword", "worse"]);
        assert!(filter.contains_word("badword"));
        assert!(filter.contains_word("BADWORD"));
        assert!(!filter.contains_word("bad"));
        assert!(!filter.contains_word(""));
    }
}
