use std::collections::{BTreeMap, BTreeSet};

use crate::model::{rank_order, EvidenceBundle, ResolvedConstituency, ResolvedMapping, Source};

/// Merge one postcode's evidence into a ranked confidence list.
///
/// UPRN contributes `proportion * 0.50` per candidate, ONSPD and MySociety
/// contribute `0.25` each to the constituency they name. A constituency's
/// confidence is the sum over the sources that named it, so it stays within
/// [0, 1]; the total across constituencies is not normalised and falls short
/// of 1.0 whenever a source is silent.
///
/// Ranking is descending by confidence, ascending by code on ties.
pub fn resolve(bundle: &EvidenceBundle) -> ResolvedMapping {
    let mut scores: BTreeMap<&str, f64> = BTreeMap::new();

    // One UPRN contribution per constituency; the highest-ranked entry wins.
    let mut seen_uprn: BTreeSet<&str> = BTreeSet::new();
    for candidate in &bundle.uprn {
        if candidate.weight <= 0.0 || !seen_uprn.insert(candidate.code.as_str()) {
            continue;
        }
        *scores.entry(candidate.code.as_str()).or_insert(0.0) +=
            candidate.weight * Source::Uprn.share();
    }

    for (source, candidate) in [
        (Source::Onspd, &bundle.onspd),
        (Source::MySociety, &bundle.mysociety),
    ] {
        if let Some(candidate) = candidate {
            if candidate.weight > 0.0 {
                *scores.entry(candidate.code.as_str()).or_insert(0.0) +=
                    candidate.weight * source.share();
            }
        }
    }

    let mut constituencies: Vec<ResolvedConstituency> = scores
        .into_iter()
        .map(|(code, confidence)| ResolvedConstituency {
            code: code.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        })
        .collect();
    constituencies.sort_by(|a, b| rank_order(&a.code, a.confidence, &b.code, b.confidence));

    ResolvedMapping {
        postcode: bundle.postcode.clone(),
        constituencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Candidate;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn all_sources_agreeing_on_majority() {
        let bundle = EvidenceBundle::new("SW1A1AA")
            .with_uprn(vec![Candidate::new("A", 0.6), Candidate::new("B", 0.4)])
            .with_onspd("A")
            .with_mysociety("A");
        let mapping = resolve(&bundle);

        assert_eq!(mapping.postcode, "SW1A1AA");
        assert_eq!(mapping.constituencies.len(), 2);
        assert_eq!(mapping.constituencies[0].code, "A");
        assert!(approx(mapping.constituencies[0].confidence, 0.80));
        assert_eq!(mapping.constituencies[1].code, "B");
        assert!(approx(mapping.constituencies[1].confidence, 0.20));
    }

    #[test]
    fn onspd_only() {
        let mapping = resolve(&EvidenceBundle::new("E170GF").with_onspd("X"));
        assert_eq!(mapping.constituencies.len(), 1);
        assert_eq!(mapping.constituencies[0].code, "X");
        assert_eq!(mapping.constituencies[0].confidence, 0.25);
    }

    #[test]
    fn full_agreement_is_certain() {
        let bundle = EvidenceBundle::new("AL19ZZ")
            .with_uprn(vec![Candidate::new("SAL", 1.0)])
            .with_onspd("SAL")
            .with_mysociety("SAL");
        let mapping = resolve(&bundle);
        assert_eq!(mapping.constituencies.len(), 1);
        assert!(approx(mapping.constituencies[0].confidence, 1.0));
    }

    #[test]
    fn disagreeing_single_sources() {
        let bundle = EvidenceBundle::new("AL19ZZ")
            .with_onspd("HAR")
            .with_mysociety("SAL");
        let mapping = resolve(&bundle);
        // Equal confidence: ascending code
        assert_eq!(mapping.constituencies[0].code, "HAR");
        assert_eq!(mapping.constituencies[1].code, "SAL");
        assert_eq!(mapping.confidence_of("SAL"), Some(0.25));
    }

    #[test]
    fn empty_bundle_resolves_to_nothing() {
        let mapping = resolve(&EvidenceBundle::new("AL19ZZ"));
        assert!(mapping.is_empty());
    }

    #[test]
    fn zero_weight_is_not_evidence() {
        let bundle = EvidenceBundle::new("AL19ZZ")
            .with_uprn(vec![Candidate::new("A", 1.0), Candidate::new("B", 0.0)]);
        let mapping = resolve(&bundle);
        assert_eq!(mapping.constituencies.len(), 1);
        assert_eq!(mapping.confidence_of("B"), None);
    }

    #[test]
    fn repeated_uprn_code_counted_once() {
        let bundle = EvidenceBundle {
            postcode: "AL19ZZ".into(),
            uprn: vec![Candidate::new("A", 0.9), Candidate::new("A", 0.9)],
            onspd: Some(Candidate::certain("A")),
            mysociety: Some(Candidate::certain("A")),
        };
        let mapping = resolve(&bundle);
        assert!(approx(mapping.constituencies[0].confidence, 0.95));
    }

    #[test]
    fn confidences_bounded() {
        let bundle = EvidenceBundle::new("AL19ZZ")
            .with_uprn(vec![
                Candidate::new("A", 0.5),
                Candidate::new("B", 0.3),
                Candidate::new("C", 0.2),
            ])
            .with_onspd("B")
            .with_mysociety("C");
        for c in resolve(&bundle).constituencies {
            assert!((0.0..=1.0).contains(&c.confidence), "{} out of range", c.code);
            assert!(c.confidence > 0.0);
        }
    }

    #[test]
    fn deterministic_with_engineered_tie() {
        // B: 0.5*0.5 = 0.25, A: ONSPD 0.25, C: MySociety 0.25 -> three-way tie
        let bundle = EvidenceBundle::new("AL19ZZ")
            .with_uprn(vec![Candidate::new("B", 0.5)])
            .with_onspd("A")
            .with_mysociety("C");
        let first = resolve(&bundle);
        let second = resolve(&bundle);
        assert_eq!(first, second);
        let codes: Vec<&str> = first.constituencies.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
    }

    #[test]
    fn sixth_address_constituency_never_resolved() {
        let mut agg = crate::aggregate::SourceAggregator::new();
        for (code, addresses) in [("A", 3), ("B", 2), ("C", 2), ("D", 1), ("E", 1), ("F", 1)] {
            for _ in 0..addresses {
                agg.add_address("E170GF", code);
            }
        }

        let mapping = resolve(&agg.bundle_for("E170GF"));
        let codes: Vec<&str> = mapping.constituencies.iter().map(|c| c.code.as_str()).collect();
        // D, E and F tie at 0.1; F ranks sixth by code
        assert_eq!(codes, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(mapping.confidence_of("F"), None);
        assert!(approx(mapping.constituencies[0].confidence, 0.15));
    }
}
