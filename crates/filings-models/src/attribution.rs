use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance of a piece of evidence handed to the model.
///
/// Attributions travel unchanged from the tool that produced them to the
/// final answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attribution {
    /// A passage of a filed document (annual report page).
    Document {
        document_id: String,
        year: i32,
        page: u32,
    },
    /// A live market-data response.
    Source {
        source_url: String,
        timestamp: DateTime<Utc>,
    },
}

impl Attribution {
    pub fn document(document_id: impl Into<String>, year: i32, page: u32) -> Self {
        Attribution::Document {
            document_id: document_id.into(),
            year,
            page,
        }
    }

    pub fn source(source_url: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Attribution::Source {
            source_url: source_url.into(),
            timestamp,
        }
    }

    /// One-line citation used in tool message footers and CLI output.
    pub fn citation(&self) -> String {
        match self {
            Attribution::Document {
                document_id,
                year,
                page,
            } => format!("{document_id} ({year}), page {page}"),
            Attribution::Source {
                source_url,
                timestamp,
            } => format!("{source_url} (retrieved {})", timestamp.to_rfc3339()),
        }
    }
}

impl std::fmt::Display for Attribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.citation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn document_citation() {
        let attr = Attribution::document("barclays_2020_ar", 2020, 47);
        assert_eq!(attr.citation(), "barclays_2020_ar (2020), page 47");
    }

    #[test]
    fn source_citation_includes_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let attr = Attribution::source("https://markets.ft.com/holders", ts);
        assert_eq!(
            attr.citation(),
            "https://markets.ft.com/holders (retrieved 2024-03-01T12:00:00+00:00)"
        );
    }

    #[test]
    fn tagged_serialization() {
        let attr = Attribution::document("hsbc_2021_ar", 2021, 3);
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json["kind"], "document");
        assert_eq!(json["page"], 3);

        let back: Attribution = serde_json::from_value(json).unwrap();
        assert_eq!(back, attr);
    }
}
