//! Fuzzy sentence matching for liveness validation.
//!
//! Token-order-insensitive similarity: both sides are lowercased, stripped
//! of punctuation, split on whitespace, token-sorted and rejoined, then
//! compared with a normalized edit-distance ratio in [0, 1]. Word-order
//! variations score 1.0; transcription slips cost proportionally to their
//! edit distance.

/// Similarity between an expected prompt and a transcription, in [0, 1].
/// Case and leading/trailing whitespace are ignored.
pub fn token_sort_ratio(expected: &str, actual: &str) -> f32 {
    let a = normalize_sorted(expected);
    let b = normalize_sorted(actual);
    ratio(&a, &b)
}

/// Lowercase, drop non-alphanumeric characters, sort the tokens, rejoin.
fn normalize_sorted(s: &str) -> String {
    let cleaned: String = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Normalized edit-distance ratio: 1 - levenshtein / max_len.
fn ratio(a: &str, b: &str) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }
    let dist = levenshtein(&a_chars, &b_chars);
    1.0 - dist as f32 / max_len as f32
}

/// Two-row dynamic-programming Levenshtein distance.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_one() {
        assert!((token_sort_ratio("Hello world", "Hello world") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn case_and_outer_whitespace_ignored() {
        assert!((token_sort_ratio("Hello world", "  hello WORLD ") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn word_order_ignored() {
        assert!((token_sort_ratio("the blue car is outside", "outside is the car blue") - 1.0)
            .abs()
            < f32::EPSILON);
    }

    #[test]
    fn punctuation_ignored() {
        assert!((token_sort_ratio("The blue car, is outside.", "the blue car is outside") - 1.0)
            .abs()
            < f32::EPSILON);
    }

    #[test]
    fn minor_difference_scores_high() {
        assert!(token_sort_ratio("The blue car", "The blue cat") > 0.8);
    }

    #[test]
    fn unrelated_content_scores_low() {
        assert!(token_sort_ratio("Hello world", "Goodbye moon") < 0.5);
    }

    #[test]
    fn empty_vs_prompt_scores_zero() {
        assert!(token_sort_ratio("the blue car is outside", "").abs() < f32::EPSILON);
    }

    #[test]
    fn both_empty_is_one() {
        assert!((token_sort_ratio("", "   ") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn levenshtein_basics() {
        let a: Vec<char> = "kitten".chars().collect();
        let b: Vec<char> = "sitting".chars().collect();
        assert_eq!(levenshtein(&a, &b), 3);
        assert_eq!(levenshtein(&a, &a), 0);
        assert_eq!(levenshtein(&a, &[]), 6);
    }
}
