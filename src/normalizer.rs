//! Text cleanup shared by every extraction step.
//!
//! [`normalize`] turns scraped markup into flat ASCII prose with domain
//! abbreviations spelled out. It never fails: malformed markup falls back to
//! a regex tag stripper and empty input yields an empty string.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

/// Upper bound on cleanup passes. Each pass can only shrink the text, so
/// real input settles in one or two.
const MAX_CLEANUP_PASSES: usize = 8;

static SCRIPT_STYLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script\s*>|<style[^>]*>.*?</style\s*>")
        .expect("static regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("static regex")
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Whole-word abbreviation expansions. No expansion contains a key, which
/// keeps the substitution idempotent.
static ABBREVIATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bsq\.?\s*ft\b\.?", "square feet"),
        (r"(?i)\bsqft\b", "square feet"),
        (r"(?i)\b(\d[\d,.]*)\s?sf\b", "${1} square feet"),
        (r"(?i)\bgc\b", "general contractor"),
        (r"(?i)\brfp\b", "request for proposal"),
        (r"(?i)\brfq\b", "request for qualifications"),
        (r"(?i)\brfi\b", "request for information"),
        (r"(?i)\bmep\b", "mechanical electrical and plumbing"),
        (r"(?i)\bhvac\b", "heating ventilation and air conditioning"),
        (r"(?i)\bti\b", "tenant improvement"),
        (r"(?i)\beir\b", "environmental impact report"),
        (r"(?i)\bbldg\b\.?", "building"),
        (r"(?i)\bapprox\b\.?", "approximately"),
        (r"(?i)\bdept\b\.?", "department"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("static regex"), replacement))
    .collect()
});

/// Cleans `text` for extraction. Idempotent.
pub fn normalize(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let mut current = cleanup(text);
    for _ in 1..MAX_CLEANUP_PASSES {
        let next = cleanup(&current);
        if next == current {
            break;
        }
        current = next;
    }

    let expanded = expand_abbreviations(&current);
    collapse_whitespace(&expanded)
}

/// `None`-tolerant form of [`normalize`].
pub fn normalize_optional(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

fn cleanup(text: &str) -> String {
    let stripped = if text.contains('<') || text.contains('&') {
        strip_markup(text)
    } else {
        text.to_string()
    };
    collapse_whitespace(&fold_to_ascii(&stripped))
}

/// Removes tags and decodes entities, preferring the HTML parser.
pub fn strip_markup(text: &str) -> String {
    match parse_markup(text) {
        Some(plain) => plain,
        None => {
            tracing::debug!("HTML parser produced no text, using regex tag stripper");
            regex_strip(text)
        }
    }
}

fn parse_markup(text: &str) -> Option<String> {
    let without_scripts = SCRIPT_STYLE_RE.replace_all(text, " ");
    let fragment = Html::parse_fragment(&without_scripts);
    let plain = fragment.root_element().text().collect::<Vec<_>>().join(" ");

    if plain.trim().is_empty() && !regex_strip(text).trim().is_empty() {
        return None;
    }
    Some(plain)
}

fn regex_strip(text: &str) -> String {
    let without_scripts = SCRIPT_STYLE_RE.replace_all(text, " ");
    let without_tags = TAG_RE.replace_all(&without_scripts, " ");
    decode_entities(&without_tags)
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "ndash" | "mdash" => Some('-'),
                    "rsquo" | "lsquo" => Some('\''),
                    "rdquo" | "ldquo" => Some('"'),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Maps typographic punctuation and Latin accents to ASCII; drops the rest.
pub fn fold_to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            if c.is_ascii_control() && c != '\n' && c != '\t' {
                out.push(' ');
            } else {
                out.push(c);
            }
            continue;
        }
        if c.is_whitespace() {
            out.push(' ');
            continue;
        }
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' | '\u{00B4}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' | '\u{00AB}' | '\u{00BB}' => {
                out.push('"')
            }
            '\u{2010}'..='\u{2015}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2022}' | '\u{00B7}' => out.push('*'),
            '\u{00D7}' => out.push('x'),
            '\u{00BD}' => out.push_str("1/2"),
            '\u{00BC}' => out.push_str("1/4"),
            '\u{00BE}' => out.push_str("3/4"),
            '\u{00B2}' => out.push('2'),
            '\u{00B3}' => out.push('3'),
            '\u{00C6}' => out.push_str("AE"),
            '\u{00E6}' => out.push_str("ae"),
            '\u{00DF}' => out.push_str("ss"),
            other => {
                if let Some(base) = latin_base(other) {
                    out.push(base);
                }
            }
        }
    }
    out
}

fn latin_base(c: char) -> Option<char> {
    let base = match c {
        'À'..='Å' => 'A',
        'à'..='å' => 'a',
        'Ç' => 'C',
        'ç' => 'c',
        'È'..='Ë' => 'E',
        'è'..='ë' => 'e',
        'Ì'..='Ï' => 'I',
        'ì'..='ï' => 'i',
        'Ñ' => 'N',
        'ñ' => 'n',
        'Ò'..='Ö' | 'Ø' => 'O',
        'ò'..='ö' | 'ø' => 'o',
        'Ù'..='Ü' => 'U',
        'ù'..='ü' => 'u',
        'Ý' => 'Y',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(base)
}

/// Byte offsets where `needle` occurs in `haystack` bounded by non-word
/// characters. Both sides are expected to share the same case.
pub fn whole_word_positions(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(needle)
        .filter(|(start, _)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[*start + needle.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .map(|(start, _)| start)
        .collect()
}

fn expand_abbreviations(text: &str) -> String {
    ABBREVIATIONS
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_missing_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t"), "");
        assert_eq!(normalize_optional(None), "");
    }

    #[test]
    fn strips_tags_and_decodes_entities() {
        let html = "<p>New <b>hospital</b> tower &amp; parking</p><script>var x = 1;</script>";
        assert_eq!(normalize(html), "New hospital tower & parking");
    }

    #[test]
    fn malformed_markup_does_not_panic() {
        let out = normalize("<div><p>Unclosed <span>clinic addition");
        assert!(out.contains("clinic addition"));
        assert_eq!(normalize("<<<>>>"), normalize(&normalize("<<<>>>")));
    }

    #[test]
    fn folds_unicode_to_ascii() {
        assert_eq!(
            normalize("Caf\u{e9} \u{201C}renovation\u{201D} \u{2014} Phase\u{a0}2"),
            "Cafe \"renovation\" - Phase 2"
        );
    }

    #[test]
    fn expands_abbreviations_as_whole_words() {
        assert_eq!(
            normalize("GC selected for 45,000 sq ft TI; RFP due"),
            "general contractor selected for 45,000 square feet tenant improvement; request for proposal due"
        );
        assert_eq!(normalize("12,500 SF clinic"), "12,500 square feet clinic");
        // Not a whole word, left alone.
        assert_eq!(normalize("gcs and rfps"), "gcs and rfps");
    }

    #[test]
    fn whole_words_respect_boundaries() {
        assert_eq!(whole_word_positions("clinic, clinical clinic", "clinic"), vec![0, 17]);
        assert!(whole_word_positions("anything", "").is_empty());
    }

    #[test]
    fn normalization_is_idempotent_on_encoded_markup() {
        let inputs = [
            "&lt;b&gt;bold&lt;/b&gt; move",
            "5 < 10 and 10 > 5",
            "AT&T data center, approx. 20 sqft",
            "<p>Bldg. A &amp;amp; B</p>",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input: {input}");
        }
    }
}
