//! Lexical similarity between fact contents.
//!
//! Pure-Rust Jaccard index over normalized token sets. Cheap, deterministic,
//! and good enough to collapse restatements of the same fact.

use std::collections::BTreeSet;

/// Words that carry no meaning for deduplication.
const STOPWORDS: &[&str] = &[
    // English function words
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "for", "from", "has",
    "have", "in", "into", "is", "it", "its", "of", "on", "or", "that", "the", "their", "this",
    "to", "was", "were", "will", "with",
    // Korean particles and connectives that survive whitespace tokenization
    "및", "등", "또는", "그리고", "관련", "대한", "위한", "통한", "있음", "없음",
];

/// Normalize text into a set of comparable tokens.
///
/// Lowercases, treats every non-alphanumeric character as a separator,
/// drops tokens of one character or less and stopwords.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 1)
        .filter(|token| !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two texts: `|A ∩ B| / |A ∪ B|` over their token sets.
///
/// Returns a value in [0, 1]. Blank input on either side yields 0; identical
/// non-blank input yields 1 even if every token is filtered out.
pub fn similarity(a: &str, b: &str) -> f32 {
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    jaccard(&tokenize(a), &tokenize(b))
}

/// Jaccard index of two pre-tokenized sets.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_normalizes() {
        let tokens = tokenize("The AI-based platform, and a 3D printer!");
        let expected: BTreeSet<String> = ["ai", "based", "platform", "3d", "printer"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn tokenize_keeps_hangul_words() {
        let tokens = tokenize("AI 기술 역량 및 특허 보유");
        assert!(tokens.contains("기술"));
        assert!(tokens.contains("보유"));
        assert!(!tokens.contains("및"));
    }

    #[test]
    fn identical_is_one() {
        assert_eq!(similarity("AI 기술 역량 보유", "AI 기술 역량 보유"), 1.0);
        // Identical even when tokenization filters everything out.
        assert_eq!(similarity("a", "a"), 1.0);
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(similarity("", "anything"), 0.0);
        assert_eq!(similarity("anything", "   "), 0.0);
        assert_eq!(similarity("", ""), 0.0);
        // Non-identical texts that tokenize to nothing.
        assert_eq!(similarity("a", "b"), 0.0);
    }

    #[test]
    fn disjoint_is_zero() {
        assert_eq!(similarity("patent holder", "export record"), 0.0);
    }

    #[test]
    fn partial_overlap() {
        // {ai, 기술, 역량, 보유} vs {ai, 기술, 인력, 보유}: 3 / 5
        let s = similarity("AI 기술 역량 보유", "AI 기술 인력 보유");
        assert!((s - 0.6).abs() < 1e-6);
    }

    #[test]
    fn case_and_punctuation_insensitive() {
        let s = similarity("Venture certified.", "venture CERTIFIED");
        assert_eq!(s, 1.0);
    }

    #[test]
    fn bounded_and_symmetric() {
        let texts = [
            "",
            "a",
            "R&D center registered",
            "registered R&D center in Seoul",
            "기술성 평가 미달",
            "평가 미달 기술성",
            "the and of",
        ];
        for a in &texts {
            for b in &texts {
                let s = similarity(a, b);
                assert!((0.0..=1.0).contains(&s), "{a:?} vs {b:?} = {s}");
                assert_eq!(s, similarity(b, a));
            }
        }
    }
}
