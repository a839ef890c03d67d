//! Syllable counting and readability statistics
//!
//! Pure functions over plain text. These are approximations (vowel-cluster
//! syllables, punctuation-delimited sentences), good enough to rank content
//! by difficulty, not to reproduce a linguist's count.

/// Average adult silent reading speed, in words per minute.
pub const BASELINE_WPM: f32 = 250.0;

/// Aggregate counts over a run of plain text.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextStatistics {
    /// Whitespace-delimited tokens containing at least one alphanumeric char
    pub words: usize,
    /// Sentences (at least 1 whenever there are words)
    pub sentences: usize,
    /// Estimated syllables across all words
    pub syllables: usize,
    /// Alphanumeric characters across all words
    pub letters: usize,
    /// Words longer than six letters
    pub long_words: usize,
    /// Words with three or more syllables
    pub polysyllables: usize,
}

impl TextStatistics {
    /// Gather statistics for `text`.
    pub fn from_text(text: &str) -> Self {
        let mut stats = TextStatistics::default();
        for word in words(text) {
            let letters = word.chars().filter(|c| c.is_alphanumeric()).count();
            let syllables = count_syllables(word);
            stats.words += 1;
            stats.letters += letters;
            stats.syllables += syllables;
            if letters > 6 {
                stats.long_words += 1;
            }
            if syllables >= 3 {
                stats.polysyllables += 1;
            }
        }
        if stats.words > 0 {
            stats.sentences = count_sentences(text).max(1);
        }
        stats
    }

    /// Mean words per sentence, 0 for empty text.
    pub fn avg_words_per_sentence(&self) -> f32 {
        ratio(self.words, self.sentences)
    }

    /// Mean syllables per word, 0 for empty text.
    pub fn avg_syllables_per_word(&self) -> f32 {
        ratio(self.syllables, self.words)
    }

    /// Mean letters per word, 0 for empty text.
    pub fn avg_word_length(&self) -> f32 {
        ratio(self.letters, self.words)
    }

    /// Share of words longer than six letters.
    pub fn long_word_ratio(&self) -> f32 {
        ratio(self.long_words, self.words)
    }

    /// Flesch Reading Ease (higher is easier), 0 for empty text.
    pub fn flesch_reading_ease(&self) -> f32 {
        if self.words == 0 {
            return 0.0;
        }
        206.835 - 1.015 * self.avg_words_per_sentence() - 84.6 * self.avg_syllables_per_word()
    }

    /// Flesch-Kincaid grade level, never negative.
    pub fn flesch_kincaid_grade(&self) -> f32 {
        if self.words == 0 {
            return 0.0;
        }
        (0.39 * self.avg_words_per_sentence() + 11.8 * self.avg_syllables_per_word() - 15.59)
            .max(0.0)
    }
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

/// Iterate the words of `text`.
///
/// A word is a whitespace-delimited token holding at least one
/// alphanumeric character, so stray punctuation ("--", "*") is not counted.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
}

/// Count words in `text`.
pub fn count_words(text: &str) -> usize {
    words(text).count()
}

/// Split `text` into sentences on runs of `.`, `!` or `?`.
///
/// Fragments without any word are dropped, so "..." alone yields nothing.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let mut end = idx + ch.len_utf8();
        while let Some(&(next_idx, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?' | '"' | '\'' | '\u{201d}' | '\u{2019}' | ')') {
                end = next_idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if at_boundary {
            push_sentence(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence<'a>(out: &mut Vec<&'a str>, fragment: &'a str) {
    let trimmed = fragment.trim();
    if count_words(trimmed) > 0 {
        out.push(trimmed);
    }
}

/// Count sentences in `text`.
pub fn count_sentences(text: &str) -> usize {
    split_sentences(text).len()
}

/// Estimate syllables in a single word.
///
/// Vowel-cluster heuristic: drops a silent trailing `e`/`es`/`ed`, ignores a
/// leading `y`, then counts groups of `aeiouy`. Words of three letters or
/// fewer are one syllable; every word has at least one.
pub fn count_syllables(word: &str) -> usize {
    let mut letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if letters.len() <= 3 {
        return 1;
    }

    let soft = |c: char| matches!(c, 'l' | 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let n = letters.len();
    if letters.ends_with(&['e', 'd']) {
        letters.truncate(n - 2);
    } else if letters.ends_with(&['e', 's']) && !soft(letters[n - 3]) {
        letters.truncate(n - 2);
    } else if letters[n - 1] == 'e' && !soft(letters[n - 2]) {
        letters.truncate(n - 1);
    }
    if letters.first() == Some(&'y') {
        letters.remove(0);
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut groups = 0usize;
    let mut in_group = false;
    for &c in &letters {
        if is_vowel(c) {
            if !in_group {
                groups += 1;
            }
            in_group = true;
        } else {
            in_group = false;
        }
    }
    groups.max(1)
}

/// Map a Flesch Reading Ease score onto a 1-10 difficulty scale.
///
/// Very easy text (>= 90) maps to 2, very hard text (< 30) to 8.
pub fn complexity_from_flesch(score: f32) -> u8 {
    match score {
        s if s >= 90.0 => 2,
        s if s >= 80.0 => 3,
        s if s >= 70.0 => 4,
        s if s >= 60.0 => 5,
        s if s >= 50.0 => 6,
        s if s >= 30.0 => 7,
        _ => 8,
    }
}

/// Reading time in whole minutes at [`BASELINE_WPM`], rounded up.
pub fn reading_time_minutes(words: usize) -> u32 {
    (words as f32 / BASELINE_WPM).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_words_are_one_syllable() {
        assert_eq!(count_syllables("a"), 1);
        assert_eq!(count_syllables("the"), 1);
        assert_eq!(count_syllables("cat"), 1);
    }

    #[test]
    fn test_syllables_vowel_clusters() {
        assert_eq!(count_syllables("beautiful"), 3);
        assert_eq!(count_syllables("reading"), 2);
        assert_eq!(count_syllables("information"), 4);
    }

    #[test]
    fn test_silent_trailing_e() {
        assert_eq!(count_syllables("make"), 1);
        assert_eq!(count_syllables("stone"), 1);
        // "le" endings keep their syllable
        assert_eq!(count_syllables("table"), 2);
    }

    #[test]
    fn test_syllables_minimum_one() {
        assert_eq!(count_syllables("rhythm"), 1);
        assert_eq!(count_syllables("1234"), 1);
        assert_eq!(count_syllables("--"), 1);
    }

    #[test]
    fn test_words_skip_punctuation_tokens() {
        assert_eq!(count_words("Hello -- world *"), 2);
        assert_eq!(count_words("   "), 0);
    }

    #[test]
    fn test_split_sentences() {
        let text = "It rained. Did it stop?  No! \"Never,\" she said.";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec!["It rained.", "Did it stop?", "No!", "\"Never,\" she said."]
        );
    }

    #[test]
    fn test_split_sentences_keeps_decimals_together() {
        assert_eq!(split_sentences("Pi is 3.14 roughly. Yes.").len(), 2);
    }

    #[test]
    fn test_unterminated_sentence_counts() {
        assert_eq!(count_sentences("no punctuation here"), 1);
        assert_eq!(count_sentences("..."), 0);
    }

    #[test]
    fn test_statistics_empty() {
        let stats = TextStatistics::from_text("");
        assert_eq!(stats, TextStatistics::default());
        assert_eq!(stats.flesch_reading_ease(), 0.0);
        assert_eq!(stats.avg_words_per_sentence(), 0.0);
    }

    #[test]
    fn test_flesch_easy_text_scores_high() {
        let stats = TextStatistics::from_text("The cat sat. The dog ran. We ate.");
        assert!(stats.flesch_reading_ease() > 90.0);
        assert_eq!(complexity_from_flesch(stats.flesch_reading_ease()), 2);
    }

    #[test]
    fn test_flesch_hard_text_scores_low() {
        let text = "Institutional considerations notwithstanding, comprehensive \
                    organizational restructuring necessitates extraordinarily \
                    sophisticated administrative coordination mechanisms.";
        let stats = TextStatistics::from_text(text);
        assert!(stats.flesch_reading_ease() < 30.0);
        assert_eq!(complexity_from_flesch(stats.flesch_reading_ease()), 8);
        assert!(stats.flesch_kincaid_grade() > 12.0);
    }

    #[test]
    fn test_complexity_mapping_bounds() {
        assert_eq!(complexity_from_flesch(120.0), 2);
        assert_eq!(complexity_from_flesch(75.0), 4);
        assert_eq!(complexity_from_flesch(-40.0), 8);
    }

    #[test]
    fn test_reading_time_rounds_up() {
        assert_eq!(reading_time_minutes(0), 0);
        assert_eq!(reading_time_minutes(1), 1);
        assert_eq!(reading_time_minutes(250), 1);
        assert_eq!(reading_time_minutes(251), 2);
    }
}
