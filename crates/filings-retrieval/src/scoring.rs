use std::collections::BTreeSet;

/// Words too common in filings to say anything about relevance.
const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "can", "did", "do", "does", "for",
    "from", "had", "has", "have", "how", "i", "in", "is", "it", "its", "me", "much", "of", "on",
    "or", "s", "tell", "that", "the", "their", "them", "there", "these", "this", "those", "to",
    "was", "were", "what", "when", "which", "who", "why", "will", "with", "you", "your",
];

/// Weight of query-term coverage in the final score.
const COVERAGE_WEIGHT: f64 = 0.8;
/// Bonus per matched occurrence, capped at `1.0 - COVERAGE_WEIGHT`.
const FREQUENCY_STEP: f64 = 0.02;

/// Lowercase alphanumeric tokens with stopwords removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Distinct query terms in a stable order.
pub fn query_terms(query: &str) -> BTreeSet<String> {
    tokenize(query).into_iter().collect()
}

/// Lexical relevance of a passage to a set of query terms, in `[0.0, 1.0]`.
///
/// Coverage of the distinct query terms dominates; repeated matches add a
/// small capped bonus. The document id and year count as passage text so a
/// query naming the company or year favours that filing.
pub fn score(terms: &BTreeSet<String>, passage_text: &str, document_id: &str, year: i32) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }

    let mut tokens = tokenize(passage_text);
    tokens.extend(tokenize(document_id));
    tokens.push(year.to_string());

    let mut matched = BTreeSet::new();
    let mut occurrences = 0usize;
    for token in &tokens {
        if terms.contains(token) {
            matched.insert(token.as_str());
            occurrences += 1;
        }
    }

    let coverage = matched.len() as f64 / terms.len() as f64;
    let bonus = (occurrences as f64 * FREQUENCY_STEP).min(1.0 - COVERAGE_WEIGHT);
    if matched.is_empty() {
        0.0
    } else {
        (coverage * COVERAGE_WEIGHT + bonus).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_stopwords_and_punctuation() {
        assert_eq!(
            tokenize("What were Barclays' total assets in 2020?"),
            vec!["barclays", "total", "assets", "2020"]
        );
    }

    #[test]
    fn full_coverage_outranks_partial() {
        let terms = query_terms("total assets balance sheet");
        let full = score(
            &terms,
            "Consolidated balance sheet. Total assets £1,349bn",
            "barclays_2020_ar",
            2020,
        );
        let partial = score(&terms, "Total income fell", "barclays_2020_ar", 2020);
        assert!(full > partial);
        assert!(full <= 1.0);
        assert!(partial > 0.0);
    }

    #[test]
    fn document_metadata_counts() {
        let terms = query_terms("Barclays 2020");
        let s = score(&terms, "Group chairman's statement", "barclays_2020_ar", 2020);
        assert!(s >= COVERAGE_WEIGHT);
    }

    #[test]
    fn no_match_scores_zero() {
        let terms = query_terms("dividend");
        assert_eq!(score(&terms, "Headcount rose", "hsbc_2021_ar", 2021), 0.0);
        assert_eq!(score(&BTreeSet::new(), "anything", "x", 2021), 0.0);
    }
}
