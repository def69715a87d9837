//! Intent Classifier
//!
//! Routes each question to BASELINE, WAREHOUSE or HYBRID. A pure function
//! of the question string plus two frozen keyword sets; no LLM call, no
//! I/O. HYBRID is the safe default when both or neither set matches.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Grain, Intent, IntentKind, OperationHint, Persona, Sector};

/// Conceptual markers: definitions, mechanisms, policy frameworks.
const CONCEPTUAL_MARKERS: [&str; 16] = [
    "what is",
    "what are",
    "explain",
    "define",
    "definition",
    "meaning of",
    "mechanism",
    "why do",
    "why does",
    "how does",
    "paris agreement",
    "kyoto protocol",
    "net zero",
    "carbon pricing",
    "emissions trading",
    "policy framework",
];

/// Quantitative markers: units, rankings, comparisons, amounts.
const QUANTITATIVE_MARKERS: [&str; 18] = [
    "how much",
    "how many",
    "emissions in",
    "emissions for",
    "emissions from",
    "tonnes",
    "mtco2",
    "highest",
    "lowest",
    "biggest",
    "largest",
    "compare",
    "versus",
    " vs ",
    "rank",
    "top ",
    "cut",
    "reduce",
];

static YEAR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("static regex compiles"));

/// Sector keyword table; longer phrases first so "industrial processes"
/// wins over "industrial".
static SECTOR_KEYWORDS: Lazy<Vec<(&'static str, Sector)>> = Lazy::new(|| {
    vec![
        ("industrial combustion", Sector::IndustrialCombustion),
        ("industrial processes", Sector::IndustrialProcesses),
        ("industrial process", Sector::IndustrialProcesses),
        ("fuel exploitation", Sector::FuelExploitation),
        ("fuel production", Sector::FuelExploitation),
        ("transport", Sector::Transport),
        ("traffic", Sector::Transport),
        ("vehicle", Sector::Transport),
        ("aviation", Sector::Transport),
        ("power", Sector::Power),
        ("electricity", Sector::Power),
        ("agriculture", Sector::Agriculture),
        ("farming", Sector::Agriculture),
        ("livestock", Sector::Agriculture),
        ("waste", Sector::Waste),
        ("landfill", Sector::Waste),
        ("building", Sector::Buildings),
        ("heating", Sector::Buildings),
        ("industry", Sector::IndustrialCombustion),
    ]
});

pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify one question. Deterministic: same question, same result.
    pub fn classify(question: &str, persona: Persona) -> Intent {
        let folded = question.to_lowercase();

        let conceptual = CONCEPTUAL_MARKERS.iter().any(|m| folded.contains(m));
        let years = extract_years(&folded);
        let quantitative =
            QUANTITATIVE_MARKERS.iter().any(|m| folded.contains(m)) || !years.is_empty();

        let kind = match (conceptual, quantitative) {
            (true, false) => IntentKind::Baseline,
            (false, true) => IntentKind::Warehouse,
            // Both or neither: answer with data plus interpretation.
            _ => IntentKind::Hybrid,
        };

        let sectors = extract_sectors(&folded);
        let grain = if folded.contains("monthly") || folded.contains("seasonal") || folded.contains("month") {
            Grain::Month
        } else {
            Grain::Year
        };
        let operation = operation_hint(&folded, &years);
        let year_range = year_range(&folded, &years);

        Intent {
            kind,
            sectors,
            entities: extract_entities(question),
            years,
            year_range,
            grain,
            operation,
            persona,
        }
    }
}

fn extract_years(folded: &str) -> Vec<i32> {
    let mut years: Vec<i32> = YEAR_TOKEN
        .find_iter(folded)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    years.sort_unstable();
    years.dedup();
    years
}

fn extract_sectors(folded: &str) -> Vec<Sector> {
    let mut sectors = Vec::new();
    for (keyword, sector) in SECTOR_KEYWORDS.iter() {
        if folded.contains(keyword) && !sectors.contains(sector) {
            sectors.push(*sector);
        }
    }
    sectors
}

fn operation_hint(folded: &str, years: &[i32]) -> OperationHint {
    if folded.contains("seasonal") {
        return OperationHint::Seasonal;
    }
    if folded.contains("compare") || folded.contains(" vs ") || folded.contains("versus") {
        return OperationHint::Compare;
    }
    if folded.contains("top ")
        || folded.contains("highest")
        || folded.contains("largest")
        || folded.contains("rank")
    {
        return OperationHint::TopN;
    }
    if (folded.contains("cut") || folded.contains("reduce") || folded.contains("change"))
        && years.len() == 2
    {
        return OperationHint::Yoy;
    }
    if folded.contains("trend") || folded.contains("over time") || years.len() >= 2 {
        return OperationHint::Trend;
    }
    if folded.contains("all sectors") || folded.contains("across sectors") || folded.contains("total emissions") {
        return OperationHint::Aggregate;
    }
    OperationHint::Simple
}

fn year_range(folded: &str, years: &[i32]) -> Option<(i32, i32)> {
    if years.len() == 2
        && (folded.contains("from") || folded.contains("between") || folded.contains(" to "))
    {
        Some((years[0], years[1]))
    } else {
        None
    }
}

/// Naive raw place-name extraction: runs of capitalised words, keeping
/// lowercase connectors ("United States of America"). Resolution happens in
/// the entity resolver; this only surfaces candidates.
fn extract_entities(question: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let connectors = ["of", "the"];

    for (index, token) in question.split_whitespace().enumerate() {
        let cleaned = token.trim_matches(|c: char| !c.is_alphanumeric());
        if cleaned.is_empty() {
            flush(&mut current, &mut entities, &connectors);
            continue;
        }
        let capitalised = cleaned.chars().next().is_some_and(char::is_uppercase);
        // Sentence-initial capitals are almost never place names.
        if capitalised && index > 0 {
            current.push(cleaned);
        } else if !current.is_empty() && connectors.contains(&cleaned) {
            current.push(cleaned);
        } else {
            flush(&mut current, &mut entities, &connectors);
        }
    }
    flush(&mut current, &mut entities, &connectors);
    entities
}

fn flush(current: &mut Vec<&str>, entities: &mut Vec<String>, connectors: &[&str; 2]) {
    // Drop trailing connectors ("Emissions of" -> no entity).
    while current.last().is_some_and(|t| connectors.contains(t)) {
        current.pop();
    }
    if !current.is_empty() {
        let candidate = current.join(" ");
        if !entities.contains(&candidate) {
            entities.push(candidate);
        }
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conceptual_question_is_baseline() {
        let intent = IntentClassifier::classify("What is the Paris Agreement?", Persona::Student);
        assert_eq!(intent.kind, IntentKind::Baseline);
        assert!(intent.years.is_empty());
    }

    #[test]
    fn numeric_question_is_warehouse() {
        let intent = IntentClassifier::classify(
            "What were transport emissions in Germany in 2023?",
            Persona::Analyst,
        );
        assert_eq!(intent.kind, IntentKind::Warehouse);
        assert_eq!(intent.sectors, vec![Sector::Transport]);
        assert_eq!(intent.years, vec![2023]);
        assert!(intent.entities.iter().any(|e| e == "Germany"));
    }

    #[test]
    fn mixed_question_is_hybrid() {
        let intent = IntentClassifier::classify(
            "Explain why power emissions in Germany changed in 2022",
            Persona::Researcher,
        );
        assert_eq!(intent.kind, IntentKind::Hybrid);
    }

    #[test]
    fn neither_set_defaults_to_hybrid() {
        let intent = IntentClassifier::classify("Tell me about Germany", Persona::Analyst);
        assert_eq!(intent.kind, IntentKind::Hybrid);
    }

    #[test]
    fn two_years_with_from_to_become_a_range() {
        let intent = IntentClassifier::classify(
            "Which 5 countries cut transport emissions most from 2020 to 2023?",
            Persona::Analyst,
        );
        assert_eq!(intent.year_range, Some((2020, 2023)));
        assert_eq!(intent.operation, OperationHint::Yoy);
    }

    #[test]
    fn multiword_entities_are_extracted() {
        let intent = IntentClassifier::classify(
            "How much did the United States of America emit in 2023?",
            Persona::Analyst,
        );
        assert!(intent
            .entities
            .iter()
            .any(|e| e.contains("United States of America")));
    }

    #[test]
    fn classification_is_deterministic() {
        let q = "Compare transport emissions of Germany and France in 2023";
        let a = IntentClassifier::classify(q, Persona::Analyst);
        let b = IntentClassifier::classify(q, Persona::Analyst);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.sectors, b.sectors);
        assert_eq!(a.entities, b.entities);
    }
}
