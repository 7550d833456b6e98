use filings_models::Article;

/// Attribution URL for answers served from the offline fixtures.
pub const MOCK_SOURCE_URL: &str = "offline://ft/content/search";

/// Deterministic offline articles used when no FT API key is configured.
///
/// Known companies (keyed by the first word of the name) get canned
/// headlines; anything else gets two generic ones naming the company.
pub fn mock_articles(company_name: &str, max_results: usize) -> Vec<Article> {
    let company = company_name.trim();
    let key = company
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();

    let articles = match key.as_str() {
        "apple" => vec![
            article(
                "apple-001",
                "Apple Reports Record Quarterly Revenue",
                "Apple Inc. announced financial results for its fiscal 2023 fourth quarter ended September 30, 2023, with record revenue.",
                "2023-11-02T18:30:00Z",
            ),
            article(
                "apple-002",
                "Apple Unveils New iPhone 15 with Advanced AI Features",
                "Apple's latest iPhone comes with groundbreaking AI capabilities and improved battery life.",
                "2023-09-12T17:00:00Z",
            ),
        ],
        "microsoft" => vec![
            article(
                "msft-001",
                "Microsoft Cloud Business Drives Strong Quarterly Results",
                "Azure cloud services continue to be a major growth driver for Microsoft Corporation.",
                "2023-10-24T21:15:00Z",
            ),
            article(
                "msft-002",
                "Microsoft Expands AI Capabilities in Office Suite",
                "New AI features in Microsoft 365 aim to boost productivity and creativity for users.",
                "2023-09-21T16:30:00Z",
            ),
        ],
        _ => vec![
            article(
                "generic-001",
                &format!("{company} Reports Quarterly Earnings"),
                &format!("{company} announced its financial results for the most recent fiscal quarter."),
                "2023-10-15T14:30:00Z",
            ),
            article(
                "generic-002",
                &format!("{company} Announces New Product Line"),
                &format!("A new range of products was unveiled at {company}'s annual showcase event."),
                "2023-09-22T16:45:00Z",
            ),
        ],
    };

    articles.into_iter().take(max_results).collect()
}

fn article(id: &str, title: &str, excerpt: &str, published: &str) -> Article {
    Article {
        id: id.to_string(),
        title: title.to_string(),
        excerpt: excerpt.to_string(),
        published: Some(published.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_company_gets_canned_articles() {
        let articles = mock_articles("Apple Inc", 5);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].id, "apple-001");
        assert_eq!(articles[0].title, "Apple Reports Record Quarterly Revenue");
    }

    #[test]
    fn unknown_company_gets_generic_articles() {
        let articles = mock_articles("Barclays", 5);
        assert_eq!(articles[0].id, "generic-001");
        assert_eq!(articles[0].title, "Barclays Reports Quarterly Earnings");
        assert!(articles[1].excerpt.contains("Barclays's annual showcase"));
    }

    #[test]
    fn max_results_truncates() {
        assert_eq!(mock_articles("Microsoft", 1).len(), 1);
        assert!(mock_articles("Microsoft", 0).is_empty());
    }
}
