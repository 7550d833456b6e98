//! Query enhancement for annual-report retrieval.
//!
//! Filings rarely use the words people ask with ("total assets" lives on the
//! "balance sheet"), so retrieval queries are widened with a fixed synonym
//! table before they reach the passage index.

/// Metric phrase → phrases that appear near it in annual reports.
const SYNONYMS: &[(&[&str], &[&str])] = &[
    (&["total assets"], &["balance sheet", "statement of financial position"]),
    (&["net assets"], &["total equity", "balance sheet"]),
    (&["revenue"], &["turnover", "total income"]),
    (&["turnover"], &["revenue"]),
    (&["profit before tax"], &["pre-tax profit", "income statement"]),
    (&["pre-tax profit", "pretax profit"], &["profit before tax"]),
    (&["net profit", "net income"], &["profit after tax", "profit for the year"]),
    (&["earnings per share"], &["eps"]),
    (&["eps"], &["earnings per share"]),
    (&["dividend", "dividends"], &["dividend per share", "distribution"]),
    (&["cash flow"], &["cash flow statement", "cash generated from operations"]),
    (&["liabilities"], &["total liabilities", "balance sheet"]),
    (&["cet1", "capital ratio"], &["common equity tier 1", "capital adequacy"]),
    (&["employees", "headcount"], &["number of employees", "workforce"]),
    (&["return on equity", "roe"], &["return on tangible equity", "rote"]),
];

/// Ownership phrases. They widen queries but do not ask for a figure.
const HOLDING_SYNONYMS: &[(&[&str], &[&str])] = &[(
    &["shareholders", "shareholder"],
    &["major shareholders", "substantial shareholdings"],
)];

/// Phrases that ask for a quantity even without naming a metric.
const QUANTITY_CUES: &[&str] = &[
    "how much",
    "how many",
    "amount",
    "figure",
    "number of",
    "percentage",
    "value of",
];

/// Words that point at filed documents.
const REPORT_CUES: &[&str] = &[
    "report", "reports", "annual", "filing", "filings", "accounts", "statement",
];

/// Capitalised words that start questions rather than name companies.
const NON_SUBJECT_WORDS: &[&str] = &[
    "what", "who", "how", "which", "when", "where", "why", "did", "does", "do", "is", "are",
    "was", "were", "tell", "give", "show", "list", "the", "in", "for", "of", "i", "please",
    "can", "could", "according", "compare", "find",
];

/// How a user query should be treated by the orchestration loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryProfile {
    /// Asks for a financial figure.
    pub figure: bool,
    /// Should be answered from filed reports first.
    pub report_grounded: bool,
}

/// Widen a retrieval query with synonyms of the metrics it names.
///
/// New phrases are appended in table order until no rule adds anything, so
/// the result is deterministic and `expand_query(expand_query(q)) ==
/// expand_query(q)`.
pub fn expand_query(query: &str) -> String {
    let mut expanded = query.trim().to_string();
    let mut tokens = words(&expanded);

    let rules = || SYNONYMS.iter().chain(HOLDING_SYNONYMS);
    for _ in 0..rules().count() {
        let mut added = false;
        for (triggers, additions) in rules() {
            if !triggers.iter().any(|t| contains_phrase(&tokens, t)) {
                continue;
            }
            for addition in *additions {
                if !contains_phrase(&tokens, addition) {
                    expanded.push(' ');
                    expanded.push_str(addition);
                    tokens = words(&expanded);
                    added = true;
                }
            }
        }
        if !added {
            break;
        }
    }

    expanded
}

pub fn classify(query: &str) -> QueryProfile {
    let tokens = words(query);
    let names_metric = SYNONYMS
        .iter()
        .flat_map(|(triggers, _)| triggers.iter())
        .any(|t| contains_phrase(&tokens, t));
    let asks_quantity = QUANTITY_CUES.iter().any(|c| contains_phrase(&tokens, c));
    let figure = names_metric || asks_quantity;

    let mentions_reports = REPORT_CUES.iter().any(|c| tokens.iter().any(|t| t == c));
    let mentions_year = tokens.iter().any(|t| is_year(t));

    QueryProfile {
        figure,
        report_grounded: figure || mentions_reports || mentions_year,
    }
}

/// Best guess at the company a query is about: the first run of
/// capitalised words that are not question words, possessives stripped.
/// Falls back to the whole query.
pub fn subject_hint(query: &str) -> String {
    let mut run: Vec<String> = Vec::new();

    for raw in query.split_whitespace() {
        let word = clean_word(raw);
        let capitalised = word.chars().next().is_some_and(char::is_uppercase);
        let excluded = NON_SUBJECT_WORDS.contains(&word.to_lowercase().as_str());

        if capitalised && !excluded {
            run.push(word);
            // Sentence punctuation or a possessive ends the name.
            if ends_name(raw) {
                break;
            }
        } else if !run.is_empty() {
            break;
        }
    }

    if run.is_empty() {
        query.trim().to_string()
    } else {
        run.join(" ")
    }
}

fn clean_word(raw: &str) -> String {
    let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '’' && c != '&');
    let without_possessive = trimmed
        .strip_suffix("'s")
        .or_else(|| trimmed.strip_suffix("’s"))
        .unwrap_or(trimmed);
    without_possessive
        .trim_end_matches(['\'', '’'])
        .to_string()
}

fn ends_name(raw: &str) -> bool {
    let raw = raw.trim_end();
    raw.ends_with("'s")
        || raw.ends_with("’s")
        || raw.ends_with('\'')
        || raw.ends_with('’')
        || raw.ends_with([',', '?', '.', '!', ';', ':'])
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether the words of `phrase` occur contiguously in `tokens`.
fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let needle = words(phrase);
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|w| w == needle.as_slice())
}

fn is_year(token: &str) -> bool {
    token.len() == 4
        && token
            .parse::<u32>()
            .is_ok_and(|y| (1900..=2099).contains(&y))
}
