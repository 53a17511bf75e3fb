use std::collections::BTreeMap;

/// Words that carry no signal in natural-language questions about code
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
    "where", "which", "who", "why", "with",
];

/// Tokenize text into lowercase terms.
/// Handles: punctuation, underscores, camelCase, PascalCase
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if word.is_empty() {
            continue;
        }
        let parts: Vec<String> = word
            .split('_')
            .filter(|part| !part.is_empty())
            .flat_map(split_camel_case)
            .collect();
        if parts.len() > 1 {
            push_term(&mut tokens, word.to_lowercase());
        }
        for part in parts {
            push_term(&mut tokens, part.to_lowercase());
        }
    }
    tokens
}

fn push_term(tokens: &mut Vec<String>, term: String) {
    if term.chars().count() < 2 || STOPWORDS.contains(&term.as_str()) {
        return;
    }
    if term.chars().all(|c| c.is_ascii_digit()) {
        return;
    }
    tokens.push(term);
}

/// Split camelCase or PascalCase into words
fn split_camel_case(word: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_upper = false;

    for ch in word.chars() {
        if ch.is_uppercase() {
            if !current.is_empty() && !prev_upper {
                tokens.push(std::mem::take(&mut current));
            }
            current.push(ch);
            prev_upper = true;
        } else {
            current.push(ch);
            prev_upper = false;
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Term counts of one document or query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermVector {
    counts: BTreeMap<String, u32>,
}

impl TermVector {
    pub fn from_text(text: &str) -> Self {
        let mut counts = BTreeMap::new();
        for term in tokenize(text) {
            *counts.entry(term).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn get(&self, term: &str) -> u32 {
        self.counts.get(term).copied().unwrap_or(0)
    }

    /// Terms in lexical order with their counts
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(term, count)| (term.as_str(), *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_identifiers_and_drops_stopwords() {
        assert_eq!(tokenize("what does bar do"), vec!["bar"]);
        assert_eq!(
            tokenize("parseHTTPRequest(raw_input)"),
            vec!["parsehttprequest", "parse", "httprequest", "raw_input", "raw", "input"]
        );
        assert_eq!(tokenize("x = 42"), Vec::<String>::new());
    }

    #[test]
    fn term_vector_counts() {
        let terms = TermVector::from_text("load config; loadConfig(config)");
        assert_eq!(terms.get("config"), 3);
        assert_eq!(terms.get("load"), 2);
        assert_eq!(terms.get("loadconfig"), 1);
        assert_eq!(terms.get("missing"), 0);
    }
}
