use once_cell::sync::Lazy;
use regex::Regex;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn rules(pairs: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    pairs
        .iter()
        .map(|(pattern, replacement)| {
            (Regex::new(pattern).expect("Invalid regex pattern"), *replacement)
        })
        .collect()
}

// Mojibake left behind by lossy encodings upstream.
static CORRUPTION_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    rules(&[
        (r"\?\?\?+", ""),
        (r"\?\?(\s[A-Z])", "$1"),
        (r"\x{FFFD}+", ""),
    ])
});

// A `?` that stood in for an arrow in navigation paths.
static NAVIGATION_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    rules(&[
        (r#"([a-zA-Z\)])\s*\?\s*([A-Z"„])"#, "$1 → $2"),
        (r#""([^"]+)"\s*\?\s*"([^"]+)""#, "\"$1\" → \"$2\""),
        (r"(?i)Leave Management\s*\?\s*", "Leave Management → "),
        (r"(?i)HRConnect\s*\?\s*", "HRConnect → "),
        (r"(?i)My Requests\s*\?\s*", "My Requests → "),
        (r"(?i)Request Leave\s*\?\s*", "Request Leave → "),
    ])
});

static DASH_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    rules(&[("\u{2011}", "-"), ("\u{2014}", " \u{2014} "), ("\u{2013}", " \u{2013} ")])
});

static SPACE_BEFORE_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([.,!?])").expect("Invalid regex pattern"));

static BOLD_MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("Invalid regex pattern"));

static LABEL_EMOJIS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    rules(&[
        (r"(?i)Vacation:", "🏖️ Vacation:"),
        (r"(?i)Sick:", "🏥 Sick:"),
        (r"(?i)Emergency:", "🚨 Emergency:"),
        (r"(?i)Annual:", "📅 Annual:"),
        (r"(?i)Leave:", "📋 Leave:"),
    ])
});

fn apply(text: String, rules: &[(Regex, &'static str)]) -> String {
    rules.iter().fold(text, |acc, (regex, replacement)| {
        regex.replace_all(&acc, *replacement).into_owned()
    })
}

/// Display clean-up for assistant replies. The stored transcript keeps the raw text.
pub struct MessageFormatter;

impl MessageFormatter {
    /// Repair encoding damage and normalize punctuation.
    pub fn clean(text: &str) -> String {
        let text = apply(text.to_string(), &CORRUPTION_RULES);
        let text = apply(text, &NAVIGATION_RULES);
        let text = apply(text, &DASH_RULES);
        SPACE_BEFORE_PUNCTUATION
            .replace_all(&text, "$1")
            .trim()
            .to_string()
    }

    /// Cleaned text with `**bold**` rendered for a terminal and leave labels decorated.
    pub fn format(text: &str) -> String {
        let text = Self::clean(text);
        let text = BOLD_MARKUP
            .replace_all(&text, format!("{BOLD}$1{RESET}").as_str())
            .into_owned();
        apply(text, &LABEL_EMOJIS)
    }
}
