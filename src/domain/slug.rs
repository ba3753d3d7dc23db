//! Path segments for posts, tags and heading anchors.
//!
//! ASCII slugification (`slug` crate) is combined with Chinese
//! transliteration (`pinyin` crate) so a post file named `基线对齐.md` or a
//! tag like `数据库` still produces a readable path segment.

use std::{collections::HashMap, iter};

use pinyin::ToPinyin;
use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

/// Lowercase, hyphenated ASCII form of `input`.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(transliterate(input));
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// First of `base`, `base-2`, `base-3`, … accepted by `is_free`.
pub fn generate_unique_slug<F>(input: &str, mut is_free: F) -> Result<String, SlugError>
where
    F: FnMut(&str) -> bool,
{
    let base = derive_slug(input)?;

    let found = iter::once(base.clone())
        .chain((2..=MAX_SUFFIX_ATTEMPTS + 1).map(|n| format!("{base}-{n}")))
        .find(|candidate| is_free(candidate));
    found.ok_or(SlugError::Exhausted { base })
}

/// Heading anchors for one document; repeats get `-2`, `-3`, ….
#[derive(Debug, Default)]
pub struct AnchorSlugs {
    seen: HashMap<String, usize>,
}

impl AnchorSlugs {
    pub fn anchor(&mut self, heading: &str) -> Result<String, SlugError> {
        let base = derive_slug(heading)?;
        let seen = self.seen.entry(base.clone()).or_default();
        *seen += 1;

        Ok(match *seen {
            1 => base,
            n => format!("{base}-{n}"),
        })
    }
}

/// Han characters become space-separated pinyin syllables; everything else
/// is left for `slugify` to filter.
fn transliterate(input: &str) -> String {
    input.chars().fold(String::with_capacity(input.len()), |mut out, ch| {
        match ch.to_pinyin() {
            Some(syllable) if !ch.is_ascii() => {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
                out.push_str(syllable.plain());
            }
            _ if !ch.is_ascii() && ch.is_whitespace() => out.push(' '),
            _ => out.push(ch),
        }
        out
    })
}
