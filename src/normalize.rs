//! Canonical text normalization.
//!
//! Every string the engine compares — taxonomy keyword text at
//! precompute time, query text at match time, feature text in the slot
//! rules — goes through [`normalize`] first. The two sides of a
//! similarity comparison must be folded identically or the scores are
//! meaningless, so this is the single normalization entry point for the
//! whole crate.
//!
//! # Pipeline
//!
//! 1. Unicode NFKC fold: full-width ASCII (`ＡＢＣ１２３`), half-width
//!    katakana, and compatibility ligatures collapse to one
//!    representative form.
//! 2. ASCII case fold.
//! 3. Katakana long-vowel mark (`ー`) removal and va-row folding
//!    (`ヴァ→バ` etc.), absorbing common Japanese spelling variation
//!    such as `コンピューター` vs `コンピュータ`.
//! 4. Whitespace runs collapse to a single space; leading/trailing
//!    whitespace is trimmed.
//!
//! Pure and deterministic: no I/O, no locale dependence.

use unicode_normalization::UnicodeNormalization;

/// Fold `text` into its canonical comparison form.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let folded: String = text
        .nfkc()
        .flat_map(|c| c.to_lowercase())
        .filter(|&c| c != 'ー')
        .collect();

    let folded = folded
        .replace("ヴァ", "バ")
        .replace("ヴィ", "ビ")
        .replace("ヴェ", "ベ")
        .replace("ヴォ", "ボ");

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize, then strip the remaining spaces entirely.
///
/// Substring containment checks (keyword fallback, food markers) use
/// this form so that `"黒い 折り畳み傘"` still contains `"折り畳み傘"`.
pub fn normalize_compact(text: &str) -> String {
    normalize(text).replace(' ', "")
}
