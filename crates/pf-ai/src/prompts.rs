/// Prompt construction for each AI generation task. Responses come back as
/// semicolon-separated candidates (quips, impostors), space-separated words
/// (backronyms), or a bare index (votes).

pub fn build_quip_prompt(prompt_text: &str, common_words: &[String]) -> String {
    format!(
        "You are playing a party word game. Respond to the prompt below with 5 short, \
         funny phrases of 2-5 words each. Do not reuse distinctive words from the prompt \
         (these common words are fine to reuse: {}). Separate the phrases with semicolons \
         and output nothing else.\n\nPrompt: {}",
        common_words.join(", "),
        prompt_text
    )
}

pub fn build_impostor_prompt(
    original_phrase: &str,
    other_copy_phrase: Option<&str>,
    common_words: &[String],
) -> String {
    let mut prompt = format!(
        "You are playing a bluffing word game. A player answered a prompt with: \
         \"{}\". Write 5 phrases of 2-5 words that could plausibly pass as that answer, \
         without reusing its distinctive words (these common words are fine: {}).",
        original_phrase,
        common_words.join(", "),
    );
    if let Some(other) = other_copy_phrase {
        prompt.push_str(&format!(
            " Another impostor already wrote \"{}\"; avoid its distinctive words too.",
            other
        ));
    }
    prompt.push_str(" Separate the phrases with semicolons and output nothing else.");
    prompt
}

pub fn build_backronym_prompt(word: &str) -> String {
    format!(
        "Invent a clever backronym for the word {}. Answer with exactly {} words, one per \
         letter, each starting with the matching letter in order. Output only the words, \
         separated by single spaces.",
        word,
        word.chars().count()
    )
}

pub fn build_backronym_vote_prompt(word: &str, backronyms: &[String]) -> String {
    let mut prompt = format!(
        "Pick the funniest backronym for the word {}. Options:\n",
        word
    );
    for (index, candidate) in backronyms.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", index + 1, candidate));
    }
    prompt.push_str("Answer with just the option number.");
    prompt
}

pub fn build_vote_prompt(prompt_text: &str, phrases: &[String]) -> String {
    let mut prompt = format!(
        "In this game, one of the following answers to the prompt was written first and \
         the others imitate it. Prompt: \"{}\". Answers:\n",
        prompt_text
    );
    for (index, phrase) in phrases.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", index + 1, phrase));
    }
    prompt.push_str("Which answer is the original? Answer with just the number.");
    prompt
}

/// Parse a semicolon-separated candidate list, trimming empties.
pub fn split_candidates(response: &str) -> Vec<String> {
    response
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a 1-based option number, clamping junk to the first option.
pub fn parse_choice(response: &str, options: usize) -> usize {
    match response.trim().parse::<usize>() {
        Ok(n) if (1..=options).contains(&n) => n - 1,
        _ => {
            log::warn!("AI vote response {:?} not a valid option, defaulting", response);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_split_and_trim() {
        assert_eq!(
            split_candidates(" free cake forever ; run while able;;  "),
            vec!["free cake forever".to_string(), "run while able".to_string()]
        );
    }

    #[test]
    fn choice_parses_or_defaults() {
        assert_eq!(parse_choice("2", 3), 1);
        assert_eq!(parse_choice(" 3 ", 3), 2);
        assert_eq!(parse_choice("7", 3), 0);
        assert_eq!(parse_choice("the second one", 3), 0);
    }

    #[test]
    fn impostor_prompt_mentions_other_copy() {
        let p = build_impostor_prompt("kiss the bride", Some("free cake forever"), &[]);
        assert!(p.contains("free cake forever"));
    }
}
