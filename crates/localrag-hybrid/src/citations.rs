//! Human-facing citations and warnings for a verified answer.

use regex::Regex;
use std::sync::LazyLock;

use localrag_core::error::Degradation;
use localrag_core::registry::VendorRegistry;
use localrag_core::types::{ConfidenceAssessment, ConfidenceLevel, RankedResult};

const EXTENSIONS: &[&str] = &[".pdf", ".docx", ".md", ".txt"];

static PAPER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Z]{2,})(\d{4})[_-](\d+)[_-](.+)$").unwrap());

static PROCEEDINGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Z]{2,})(\d{4})[_-](.+)$").unwrap());

/// Catalog code left in front of a vendor document title (`cat75a_`, `c31a-`, `tm2_`).
static CATALOG_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(cat7\d?[a-z]?|c\d{2}[a-z]|b\d{2,3}[a-z]|cs\d|tm\d|wp\d|psb|EKB\d)[_-]?").unwrap());

fn spaced(s: &str) -> String {
    s.replace(['_', '-'], " ").trim().to_string()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Display name for a source file name.
///
/// `ABC2015_34_Author.pdf` -> `ABC 2015, Author (Paper 34)`,
/// `ABC2020_keynote_talk` -> `ABC 2020, Keynote Talk`,
/// vendor files -> `Vendor: Rest`, anything else has `_`/`-` turned into spaces.
pub fn humanize_source(source: &str, vendors: &VendorRegistry) -> String {
    let mut name = source;
    for ext in EXTENSIONS {
        let cut = name.len().saturating_sub(ext.len());
        if cut > 0 && name.get(cut..).is_some_and(|tail| tail.eq_ignore_ascii_case(ext)) {
            name = &name[..cut];
            break;
        }
    }

    if let Some(c) = PAPER.captures(name) {
        return format!("{} {}, {} (Paper {})", &c[1], &c[2], spaced(&c[4]), &c[3]);
    }
    if let Some(c) = PROCEEDINGS.captures(name) {
        return format!("{} {}, {}", &c[1], &c[2], title_case(&spaced(&c[3])));
    }

    if let Some(vendor) = vendors.detect(source) {
        let lower = name.to_lowercase();
        let prefixes = [vendor.to_lowercase(), vendor.replace('/', "").to_lowercase(), vendor.split('/').next().unwrap_or(vendor).to_lowercase()];
        let rest = prefixes
            .iter()
            .find(|p| !p.is_empty() && lower.starts_with(p.as_str()))
            .map_or(name, |p| name.get(p.len()..).unwrap_or_default().trim_start_matches(['_', '-', ' ']));
        let rest = spaced(&CATALOG_CODE.replace(rest, ""));
        let mut chars = rest.chars();
        return match chars.next() {
            Some(first) => format!("{vendor}: {}{}", first.to_uppercase(), chars.as_str()),
            None => vendor.to_string(),
        };
    }

    let display = spaced(name);
    if display.is_empty() { source.to_string() } else { display }
}

/// `[i] <display name>` per result, 1-based.
pub fn citations(results: &[RankedResult], vendors: &VendorRegistry) -> Vec<String> {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}", i + 1, humanize_source(&r.source, vendors)))
        .collect()
}

/// Warnings in a fixed order: low confidence, contradictions, single source,
/// single vendor, then one line per absorbed degradation.
pub fn warnings(confidence: &ConfidenceAssessment, degradations: &[Degradation]) -> Vec<String> {
    let mut out = Vec::new();
    if confidence.level == ConfidenceLevel::Low {
        out.push("LOW CONFIDENCE: Knowledge base may not cover this topic adequately.".to_string());
    }
    for c in &confidence.contradictions {
        out.push(format!(
            "POTENTIAL CONTRADICTION: {} and {} show low content overlap ({:.1}%). Review both sources.",
            c.source_1,
            c.source_2,
            c.overlap * 100.0
        ));
    }
    if confidence.num_sources == 1 && confidence.num_results > 0 {
        out.push("SINGLE SOURCE: All results come from one document. Cross-reference if possible.".to_string());
    }
    if let Some(vendor) = confidence.dominant_vendor.as_deref().filter(|_| confidence.num_results > 1) {
        out.push(format!(
            "SINGLE VENDOR: Retrieved product information is primarily from {vendor}. Consider cross-referencing with other manufacturers."
        ));
    }
    out.extend(degradations.iter().map(|d| format!("DEGRADED: {d}")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use localrag_core::types::Contradiction;

    fn registry() -> VendorRegistry {
        VendorRegistry::from_rules([("^BETE", "BETE"), ("(?i)^pall", "Pall"), ("^Parker", "Parker/Hannifin")])
    }

    #[test]
    fn humanizes_papers_vendors_and_plain_names() {
        let reg = registry();
        assert_eq!(humanize_source("ILASS2015_34_Vesely.pdf", &reg), "ILASS 2015, Vesely (Paper 34)");
        assert_eq!(humanize_source("ILASS2020_keynote_talk.pdf", &reg), "ILASS 2020, Keynote Talk");
        assert_eq!(humanize_source("BETE_1218USA_Catalog.pdf", &reg), "BETE: 1218USA Catalog");
        assert_eq!(humanize_source("pall-hydraulic_filters.PDF", &reg), "Pall: Hydraulic filters");
        assert_eq!(humanize_source("Parker_HF_guide.md", &reg), "Parker/Hannifin: HF guide");
        assert_eq!(humanize_source("Lefebvre_Atomization_Ch3.pdf", &reg), "Lefebvre Atomization Ch3");
        assert_eq!(humanize_source("BETE.pdf", &reg), "BETE");
        assert_eq!(humanize_source("unknown", &reg), "unknown");
    }

    #[test]
    fn vendor_titles_drop_catalog_codes() {
        let reg = VendorRegistry::from_rules([("^cat7", "Spraying Systems"), ("(?i)^pall", "Pall")]);
        assert_eq!(humanize_source("cat75a_hydraulic_filters.pdf", &reg), "Spraying Systems: Hydraulic filters");
        assert_eq!(humanize_source("Pall_c31a_element_guide.pdf", &reg), "Pall: Element guide");
        assert_eq!(humanize_source("cat75a.pdf", &reg), "Spraying Systems");
        assert_eq!(humanize_source("Pall_cascade_filters.pdf", &reg), "Pall: Cascade filters");
    }

    fn assessment(level: ConfidenceLevel, num_results: usize, num_sources: usize) -> ConfidenceAssessment {
        ConfidenceAssessment {
            level,
            top_score: 0.1,
            num_results,
            num_high_confidence: 0,
            num_sources,
            sources: Vec::new(),
            contradictions: Vec::new(),
            dominant_vendor: None,
            reasoning: String::new(),
        }
    }

    #[test]
    fn warnings_follow_fixed_order() {
        let mut c = assessment(ConfidenceLevel::Low, 3, 1);
        c.contradictions.push(Contradiction { source_1: "a.md".into(), source_2: "b.md".into(), overlap: 0.05, note: String::new() });
        c.dominant_vendor = Some("Pall".into());
        let d = vec![Degradation::unavailable(localrag_core::error::Channel::Reranker, "no model")];
        let w = warnings(&c, &d);
        assert_eq!(w.len(), 5);
        assert!(w[0].starts_with("LOW CONFIDENCE"));
        assert_eq!(w[1], "POTENTIAL CONTRADICTION: a.md and b.md show low content overlap (5.0%). Review both sources.");
        assert!(w[2].starts_with("SINGLE SOURCE"));
        assert!(w[3].contains("primarily from Pall"));
        assert_eq!(w[4], "DEGRADED: reranker channel unavailable: no model");

        assert!(warnings(&assessment(ConfidenceLevel::Medium, 0, 0), &[]).is_empty());
    }
}
