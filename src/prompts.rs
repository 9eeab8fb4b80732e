/*!
 * Prompt templates for translation and classification.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::taxonomy::{Taxonomy, WEBSITE_ALIASES};

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>\s*").expect("static regex"));

/// Remove `<think>...</think>` reasoning blocks some models prepend to answers
pub fn strip_think_blocks(answer: &str) -> String {
    THINK_BLOCK.replace_all(answer, "").trim().to_string()
}

/// Prompt asking for a bare translation
pub fn translation_prompt(source_language: &str, target_language: &str, text: &str) -> String {
    format!(
        "Translate the following from {} to {}.  Do not provide any analysis or explanation, \
         just the direct translation as the answer.  Text is:  \"{}\"",
        source_language, target_language, text
    )
}

/// Prompt asking for a comma separated list of categories.
///
/// `app_name` is how the product is referred to in the prompt (e.g. "the Firefox browser").
pub fn classification_prompt(app_name: &str, rating: u8, text: &str, taxonomy: &Taxonomy) -> String {
    let websites = WEBSITE_ALIASES
        .iter()
        .map(|(canonical, aliases)| format!("- {} (not {})", canonical, aliases.join(", ")))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "The following is a review from Google Play Store for {app_name} with a star rating of {rating}/5.  \
If the review is mostly positive, simply return 'Satisfied' for your classification.  \
If there are negative complaints in the review, I want to classify it into the following categories, \
or use the category \"Other\" if none match.  More than one category can apply, return a comma separated list.  \
Only use Other if no other categories apply.

For website-specific issues, use these exact formats:
{websites}

For other websites, use proper case format: first letter capitalized, no domain extensions (.com, .org, etc).

Categories:
{categories}

Review:
{text}
",
        app_name = app_name,
        rating = rating,
        websites = websites,
        categories = taxonomy.prompt_listing(),
        text = text,
    )
}
