//! The structured analysis of a paper and its flattened sink row.

use std::fmt;

use chrono::{DateTime, Local};

/// Column headers of the sink, in row order.
pub const SINK_HEADERS: [&str; 10] = [
    "Timestamp",
    "Filename",
    "Title",
    "Authors",
    "Research Area",
    "Relevance Score",
    "Key Findings",
    "Methodology",
    "Performance Metrics",
    "Recommended Action",
];

/// Timestamp format used in sink rows.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Research areas the analyzer may assign. Anything else maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchArea {
    DataPipelines,
    DistributedSystems,
    HardwareAcceleration,
    Llms,
    Other,
}

impl ResearchArea {
    pub const ALL: [ResearchArea; 5] = [
        ResearchArea::DataPipelines,
        ResearchArea::DistributedSystems,
        ResearchArea::HardwareAcceleration,
        ResearchArea::Llms,
        ResearchArea::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchArea::DataPipelines => "Data Pipelines",
            ResearchArea::DistributedSystems => "Distributed Systems",
            ResearchArea::HardwareAcceleration => "Hardware Acceleration",
            ResearchArea::Llms => "LLMs",
            ResearchArea::Other => "Other",
        }
    }

    /// Case-insensitive match against the category names. Unrecognized
    /// categories fall back to `Other`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(label))
            .unwrap_or(ResearchArea::Other)
    }
}

impl fmt::Display for ResearchArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
    DeepRead,
    Skim,
    Archive,
}

impl RecommendedAction {
    pub const ALL: [RecommendedAction; 3] = [
        RecommendedAction::DeepRead,
        RecommendedAction::Skim,
        RecommendedAction::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::DeepRead => "Deep Read",
            RecommendedAction::Skim => "Skim",
            RecommendedAction::Archive => "Archive",
        }
    }

    /// Strict, case-insensitive parse. Returns `None` for anything that is not
    /// one of the three actions.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relevance score, guaranteed to lie in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RelevanceScore(u8);

impl RelevanceScore {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 10;

    pub fn new(value: i64) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&value)
            .then_some(Self(value as u8))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for RelevanceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The validated result of analyzing one paper.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub timestamp: DateTime<Local>,
    pub filename: String,
    pub title: String,
    pub authors: Vec<String>,
    pub research_area: ResearchArea,
    pub relevance_score: RelevanceScore,
    pub key_findings: String,
    pub methodology: String,
    pub performance_metrics: Option<String>,
    pub recommended_action: RecommendedAction,
}

impl AnalysisRecord {
    /// Flatten into one sink row, in [`SINK_HEADERS`] order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            self.filename.clone(),
            self.title.clone(),
            self.authors.join(", "),
            self.research_area.to_string(),
            self.relevance_score.to_string(),
            self.key_findings.clone(),
            self.methodology.clone(),
            self.performance_metrics
                .clone()
                .unwrap_or_else(|| "N/A".to_string()),
            self.recommended_action.to_string(),
        ]
    }
}

/// Whether `row` is exactly the sink header (surrounding whitespace ignored).
pub fn is_header_row<S: AsRef<str>>(row: &[S]) -> bool {
    row.len() == SINK_HEADERS.len()
        && row
            .iter()
            .zip(SINK_HEADERS)
            .all(|(cell, expected)| cell.as_ref().trim() == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> AnalysisRecord {
        AnalysisRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
            filename: "attention.pdf".into(),
            title: "Attention Is All You Need".into(),
            authors: vec!["Ashish Vaswani".into(), "Noam Shazeer".into()],
            research_area: ResearchArea::Llms,
            relevance_score: RelevanceScore::new(7).unwrap(),
            key_findings: "Transformers work.".into(),
            methodology: "Encoder-decoder with attention.".into(),
            performance_metrics: None,
            recommended_action: RecommendedAction::Skim,
        }
    }

    #[test]
    fn area_matching_is_case_insensitive() {
        assert_eq!(ResearchArea::from_label("llms"), ResearchArea::Llms);
        assert_eq!(
            ResearchArea::from_label("  distributed systems "),
            ResearchArea::DistributedSystems
        );
    }

    #[test]
    fn unknown_area_falls_back_to_other() {
        assert_eq!(ResearchArea::from_label("Quantum Biology"), ResearchArea::Other);
        assert_eq!(ResearchArea::from_label(""), ResearchArea::Other);
    }

    #[test]
    fn action_parse_is_strict() {
        assert_eq!(
            RecommendedAction::parse("deep read"),
            Some(RecommendedAction::DeepRead)
        );
        assert_eq!(RecommendedAction::parse("Archive"), Some(RecommendedAction::Archive));
        assert_eq!(RecommendedAction::parse("Read Later"), None);
        assert_eq!(RecommendedAction::parse("DeepRead"), None);
    }

    #[test]
    fn score_bounds() {
        assert!(RelevanceScore::new(0).is_none());
        assert!(RelevanceScore::new(11).is_none());
        assert!(RelevanceScore::new(-3).is_none());
        assert_eq!(RelevanceScore::new(1).unwrap().get(), 1);
        assert_eq!(RelevanceScore::new(10).unwrap().get(), 10);
    }

    #[test]
    fn row_follows_header_order() {
        let row = sample().to_row();
        assert_eq!(row.len(), SINK_HEADERS.len());
        assert_eq!(row[0], "2024-03-05 14:07:09");
        assert_eq!(row[1], "attention.pdf");
        assert_eq!(row[3], "Ashish Vaswani, Noam Shazeer");
        assert_eq!(row[4], "LLMs");
        assert_eq!(row[5], "7");
        assert_eq!(row[8], "N/A");
        assert_eq!(row[9], "Skim");
    }

    #[test]
    fn header_row_detection() {
        assert!(is_header_row(&SINK_HEADERS));
        let mut shifted: Vec<&str> = SINK_HEADERS.to_vec();
        shifted.swap(0, 1);
        assert!(!is_header_row(&shifted));
        assert!(!is_header_row(&SINK_HEADERS[..9]));
    }
}
