use std::collections::HashMap;

/// Upper bound on glossary entries sent with one batch.
const MAX_TERMS: usize = 40;

/// Capitalized words that start sentences far more often than they name things.
const STOP_WORDS: &[&str] = &[
    "A", "An", "And", "Are", "As", "At", "But", "By", "Did", "Do", "Does", "For", "From", "He",
    "Her", "His", "How", "I", "If", "In", "Is", "It", "Its", "Of", "On", "Or", "She", "So",
    "That", "The", "Their", "There", "These", "They", "This", "To", "Was", "We", "Were", "What",
    "When", "Where", "Which", "While", "Who", "Whom", "Whose", "Why", "With",
];

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(|c| c.is_uppercase())
}

fn clean(token: &str) -> &str {
    token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-' || c == '.'))
        .trim_end_matches('.')
}

/// Proper-noun candidates: runs of consecutive capitalized words, most
/// frequent first, ties broken by first appearance.
pub fn extract_terms<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    let mut record = |run: &mut Vec<&str>| {
        while run.first().is_some_and(|w| STOP_WORDS.contains(w)) {
            run.remove(0);
        }
        if !run.is_empty() {
            let term = run.join(" ");
            let entry = counts.entry(term).or_insert((0, order));
            entry.0 += 1;
            order += 1;
        }
        run.clear();
    };

    for text in texts {
        let mut run: Vec<&str> = Vec::new();
        for token in text.split_whitespace() {
            let word = clean(token);
            let ends_clause = token.ends_with([',', '.', ';', ':', '?', '!', ')', '"']);
            if !word.is_empty() && is_capitalized(word) {
                run.push(word);
            } else {
                record(&mut run);
            }
            if ends_clause {
                record(&mut run);
            }
        }
        record(&mut run);
    }

    let mut terms: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    terms.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    terms.into_iter().take(MAX_TERMS).map(|(t, _)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_multiword_names() {
        let terms = extract_terms([
            "The Eiffel Tower stands in Paris.",
            "Who designed the Eiffel Tower?",
            "Gustave Eiffel's company built it",
        ]);
        assert_eq!(terms[0], "Eiffel Tower");
        assert!(terms.contains(&"Paris".to_string()));
        assert!(terms.contains(&"Gustave Eiffel's".to_string()));
        assert!(!terms.iter().any(|t| t == "The" || t == "Who"));
    }

    #[test]
    fn test_chinese_text_yields_nothing() {
        assert!(extract_terms(["台北是台灣的首都。"]).is_empty());
    }
}
