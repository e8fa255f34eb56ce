use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config, Matcher};

const MAX_SUGGESTIONS: usize = 3;
const MIN_SCORE: u32 = 10;

/// Fuzzy-matches `query` against `candidates` (typically `"<providerID>/<modelID>"`
/// strings), returning up to three matches above a minimum score, ranked
/// best-first.
pub fn fuzzy_search(query: &str, candidates: &[String]) -> Vec<String> {
    if query.is_empty() || candidates.is_empty() {
        return Vec::new();
    }

    let mut matcher = Matcher::new(Config::DEFAULT);
    let pattern = Pattern::parse(query, CaseMatching::Ignore, Normalization::Smart);
    let mut scored = pattern.match_list(candidates.iter().cloned(), &mut matcher);
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    scored
        .into_iter()
        .filter(|(_, score)| *score >= MIN_SCORE)
        .take(MAX_SUGGESTIONS)
        .map(|(candidate, _)| candidate)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_close_match_despite_typo() {
        let candidates = vec!["anthropic/claude-sonnet-4".to_string(), "openai/gpt-5".to_string()];
        let matches = fuzzy_search("calude-sonet", &candidates);
        assert_eq!(matches.first().map(String::as_str), Some("anthropic/claude-sonnet-4"));
    }

    #[test]
    fn caps_at_three_suggestions() {
        let candidates: Vec<String> = (0..10).map(|i| format!("provider/model-{i}")).collect();
        let matches = fuzzy_search("model", &candidates);
        assert!(matches.len() <= 3);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let candidates = vec!["openai/gpt-5".to_string()];
        assert!(fuzzy_search("", &candidates).is_empty());
    }
}
