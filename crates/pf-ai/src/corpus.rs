use std::collections::HashMap;

/// Words stripped before corpus lookups so "a birthday cake" and "birthday
/// cake" resolve to the same row.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "my", "your", "his", "her", "its", "our", "their", "this", "that", "these",
    "those",
];

/// Normalize a phrase for corpus lookup: lowercase, stop words removed.
pub fn normalize_for_lookup(phrase: &str) -> String {
    let kept: Vec<&str> = phrase
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if kept.is_empty() {
        phrase.to_lowercase()
    } else {
        kept.join(" ").to_lowercase()
    }
}

/// Minimal CSV row splitter with double-quote support. The corpora are
/// machine-generated and well-formed; this handles quoted commas and
/// doubled quotes, nothing more exotic.
fn split_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Pre-generated quip completions: normalized prompt → candidate phrases.
/// CSV layout: `prompt,phrase_1,…,phrase_10`.
#[derive(Debug, Default, Clone)]
pub struct QuipCorpus {
    by_prompt: HashMap<String, Vec<String>>,
}

impl QuipCorpus {
    pub fn from_csv(csv: &str) -> Self {
        let mut by_prompt = HashMap::new();
        for line in csv.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_row(line);
            let Some(prompt) = fields.first() else {
                continue;
            };
            let prompt = prompt.trim().to_lowercase();
            if prompt.is_empty() {
                continue;
            }
            let phrases: Vec<String> = fields[1..]
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            if !phrases.is_empty() {
                by_prompt.insert(prompt, phrases);
            }
        }
        Self { by_prompt }
    }

    pub fn phrases_for(&self, prompt: &str) -> &[String] {
        self.by_prompt
            .get(&prompt.trim().to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_prompt.len()
    }
    pub fn is_empty(&self) -> bool {
        self.by_prompt.is_empty()
    }
}

/// Pre-generated impostor equivalence sets. Any phrase in a row can play
/// the original; every other phrase in that row is a valid impostor for it.
/// CSV layout: `original_phrase,copy_phrase1,…,copy_phrase5`.
#[derive(Debug, Default, Clone)]
pub struct ImpostorCorpus {
    /// Normalized phrase → the full equivalence set it belongs to.
    by_phrase: HashMap<String, Vec<String>>,
}

impl ImpostorCorpus {
    pub fn from_csv(csv: &str) -> Self {
        let mut by_phrase: HashMap<String, Vec<String>> = HashMap::new();
        for line in csv.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_row(line);
            let set: Vec<String> = fields
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            if set.len() < 2 {
                continue;
            }
            for phrase in &set {
                by_phrase.insert(normalize_for_lookup(phrase), set.clone());
            }
        }
        Self { by_phrase }
    }

    /// Impostor candidates for an original: its equivalence set minus
    /// phrases that normalize to the original itself.
    pub fn impostors_for(&self, original: &str) -> Vec<String> {
        let key = normalize_for_lookup(original);
        let Some(set) = self.by_phrase.get(&key) else {
            return Vec::new();
        };
        set.iter()
            .filter(|p| normalize_for_lookup(p) != key)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIPS: &str = "prompt,phrase_1,phrase_2,phrase_3\n\
        things you shout at a wedding,free cake forever,run while able,open bar panic\n\
        worst superhero power,mild static cling,almost flying,\n";

    const FAKES: &str = "original_phrase,copy_phrase1,copy_phrase2\n\
        a birthday cake,frosted ring of lies,candle bonfire\n";

    #[test]
    fn quip_corpus_keys_by_lowercased_prompt() {
        let corpus = QuipCorpus::from_csv(QUIPS);
        assert_eq!(corpus.len(), 2);
        let phrases = corpus.phrases_for("Things you shout at a wedding");
        assert_eq!(phrases.len(), 3);
        assert_eq!(corpus.phrases_for("worst superhero power").len(), 2);
        assert!(corpus.phrases_for("unknown prompt").is_empty());
    }

    #[test]
    fn impostor_lookup_is_bidirectional_and_stop_word_blind() {
        let corpus = ImpostorCorpus::from_csv(FAKES);
        // forward: original -> copies
        let impostors = corpus.impostors_for("birthday cake");
        assert!(impostors.contains(&"frosted ring of lies".to_string()));
        assert!(!impostors.contains(&"a birthday cake".to_string()));
        // backward: a copy can serve as the original
        let reverse = corpus.impostors_for("candle bonfire");
        assert!(reverse.contains(&"a birthday cake".to_string()));
    }

    #[test]
    fn normalization_strips_stop_words() {
        assert_eq!(normalize_for_lookup("A Birthday Cake"), "birthday cake");
        assert_eq!(normalize_for_lookup("the the the"), "the the the");
    }

    #[test]
    fn csv_rows_with_quotes_parse() {
        let rows = split_csv_row("\"hello, world\",plain,\"with \"\"quotes\"\"\"");
        assert_eq!(rows, vec!["hello, world", "plain", "with \"quotes\""]);
    }
}
