use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for reviewer language codes
///
/// Play Store exports language as ISO 639-1 codes, sometimes with a region
/// suffix (`pt_BR`, `en-GB`). These helpers reduce such codes to a base
/// language and resolve display names for prompts.

/// Strip the region suffix and normalize case: `pt_BR` -> `pt`
pub fn base_language(code: &str) -> String {
    code.trim()
        .split(['_', '-'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Resolve a code (ISO 639-1, ISO 639-2/T or 639-2/B) to a language
pub fn resolve_language(code: &str) -> Option<Language> {
    let base = base_language(code);
    match base.len() {
        2 => Language::from_639_1(&base),
        3 => Language::from_639_3(&base).or_else(|| {
            // ISO 639-2/B codes that differ from 639-2/T
            let part2t = match base.as_str() {
                "fre" => "fra",
                "ger" => "deu",
                "dut" => "nld",
                "gre" => "ell",
                "chi" => "zho",
                "cze" => "ces",
                "per" => "fas",
                "rum" => "ron",
                "slo" => "slk",
                _ => return None,
            };
            Language::from_639_3(part2t)
        }),
        _ => None,
    }
}

/// Whether the review text is declared as English.
///
/// An empty or unknown code is not treated as English: the translator
/// decides what to do with it.
pub fn is_english(code: &str) -> bool {
    resolve_language(code) == Some(Language::Eng)
}

/// Get the English display name for a language code
pub fn get_language_name(code: &str) -> Result<String> {
    resolve_language(code)
        .map(|lang| lang.to_name().to_string())
        .ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// Display name for prompts, falling back to the raw code
pub fn display_name(code: &str) -> String {
    get_language_name(code).unwrap_or_else(|_| code.trim().to_string())
}
