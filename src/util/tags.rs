/// Categorical export columns derived from an item's free-text tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagClass {
    pub operation: &'static str,
    pub region: Option<&'static str>,
    pub planned: &'static str,
}

/// Classify a tag string. Matching is case-insensitive; Electric is checked
/// before Gas, and anything matching neither is "Both".
pub fn classify(tags: Option<&str>) -> TagClass {
    let upper = tags.unwrap_or_default().to_uppercase();

    let operation = if upper.contains("ELECTRIC") {
        "Electric"
    } else if upper.contains("GAS") {
        "Gas"
    } else {
        "Both"
    };

    let region = upper.contains("INOH").then_some("INOH");

    let planned = if upper.contains("UNPLANNED") {
        "Unplanned"
    } else {
        "Planned"
    };

    TagClass {
        operation,
        region,
        planned,
    }
}
