//! Query preprocessing.
//! Strips size, pack-count and marketing noise from a retail product name so
//! the external search sees only the words that identify the food.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Maximum query length sent to the external database.
pub const MAX_QUERY_LEN: usize = 100;

/// A word-boundary cut is only taken if it keeps more than this many bytes.
const MIN_WORD_CUT: usize = 50;

static SIZE_QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d+\.?\d*\s*(?:fl\s*)?oz\b|\b\d+\.?\d*\s*(?:fl\s*)?ounces?\b|\b\d+\.?\d*\s*lbs?\b|\b\d+\.?\d*\s*pounds?\b|\b\d+\.?\d*\s*ml\b|\b\d+\.?\d*\s*liters?\b|\b\d+\.?\d*\s*l\b|\b\d+\.?\d*\s*gallons?\b|\b\d+\.?\d*\s*quarts?\b|\b\d+\.?\d*\s*pints?\b|\b\d+\.?\d*\s*kg\b|\b\d+\.?\d*\s*grams?\b|\b\d+\.?\d*\s*g\b",
    )
    .expect("valid size pattern")
});

static PACK_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d+[-\s]*(?:pack|pk|count|ct)(?:\s+\w+)?\b|\bpack\s*of\s*\d+\b|\b\d+\s*cans?\b|\b\d+\s*bottles?\b|\b\d+\s*pouches?\b|\b\d+\s*bars?\b|\b\d+\s*pieces?\b",
    )
    .expect("valid pack pattern")
});

static STANDALONE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[,\-]\s*\d+\.?\d*\s*$|^\d+\.?\d*\s*[,\-]").expect("valid number pattern")
});

static MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

static LONE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[,\-;:]+\s+").expect("valid punctuation pattern"));
static TRAILING_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\-;:]+\s*$").expect("valid punctuation pattern"));
static LEADING_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[,\-;:]+").expect("valid punctuation pattern"));

/// Marketing, size-descriptor and packaging words that never narrow a search.
static NOISE_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // marketing
        "value", "family", "bonus", "new", "improved", "premium", "select", "choice",
        "quality", "best", "great", "delicious", "tasty", "favorite", "special",
        // size descriptors
        "size", "large", "medium", "small", "mini", "jumbo", "giant", "big", "snack",
        "single", "double", "triple",
        // packaging
        "package", "box", "bag", "bottle", "can", "jar", "tub", "carton", "sleeve", "pouch",
        "roll", "tube",
        // generic
        "food", "item", "product", "brand",
    ]
    .into_iter()
    .collect()
});

const WORD_TRIM: &[char] = &[',', '.', '!', '?', ';', ':', '-', '\'', '"'];

/// Clean `product_name` into a search query, prepending `brand` when the
/// cleaned text does not already contain it. Empty input gives an empty
/// query, which callers treat as "no usable query".
pub fn preprocess(product_name: &str, brand: &str) -> String {
    if product_name.trim().is_empty() {
        return String::new();
    }

    let cleaned = SIZE_QUANTITY.replace_all(product_name, " ");
    let cleaned = PACK_COUNT.replace_all(&cleaned, " ");
    let cleaned = STANDALONE_NUMBER.replace_all(&cleaned, " ");
    let cleaned = remove_noise_words(&cleaned);
    let cleaned = clean_orphaned_punctuation(&cleaned);
    let mut cleaned = MULTI_SPACE.replace_all(&cleaned, " ").trim().to_string();

    let brand = brand.trim();
    if !brand.is_empty() && !cleaned.to_lowercase().contains(&brand.to_lowercase()) {
        cleaned = if cleaned.is_empty() {
            brand.to_string()
        } else {
            format!("{brand} {cleaned}")
        };
    }

    let query = truncate_query(&cleaned);
    debug!(input = product_name, brand, query = %query, "query preprocessed");
    query
}

/// Drop noise words. Output is lowercased; punctuation attached to kept words stays.
pub fn remove_noise_words(s: &str) -> String {
    s.to_lowercase()
        .split_whitespace()
        .filter(|w| !NOISE_WORDS.contains(w.trim_matches(WORD_TRIM)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove punctuation left alone by earlier removals (", ," or a trailing "-").
pub fn clean_orphaned_punctuation(s: &str) -> String {
    let out = LONE_PUNCT.replace_all(s, " ");
    let out = TRAILING_PUNCT.replace_all(&out, "");
    LEADING_PUNCT.replace_all(&out, "").into_owned()
}

fn truncate_query(s: &str) -> String {
    if s.len() <= MAX_QUERY_LEN {
        return s.to_string();
    }
    let mut end = MAX_QUERY_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let head = &s[..end];
    match head.rfind(' ') {
        Some(space) if space > MIN_WORD_CUT => head[..space].to_string(),
        _ => head.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_cases() {
        let cases = [
            ("Coca-Cola, 12 fl oz", "", "coca-cola"),
            ("Cheerios Cereal, 18 oz", "", "cheerios cereal"),
            ("Whole Milk, Vitamin D, Gallon, 128 fl oz", "", "whole milk, vitamin d, gallon"),
            ("Coca-Cola Soda Pop, 6 pack", "", "coca-cola soda pop"),
            ("Tyson Chicken Breasts, 2.5 lb", "", "tyson chicken breasts"),
            ("Whole Milk, Vitamin D", "Great Value", "Great Value whole milk, vitamin d"),
            ("Great Value Whole Milk, Vitamin D", "Great Value", "Great Value whole milk, vitamin d"),
            ("Premium Select Quality Chicken Breast", "", "chicken breast"),
            ("Cheese Slices, Box of American Cheese", "", "cheese slices, of american cheese"),
            (
                "Great Value Whole Milk, Vitamin D, Gallon, 128 fl oz",
                "Great Value",
                "Great Value whole milk, vitamin d, gallon",
            ),
            ("", "", ""),
            ("", "Coca-Cola", ""),
            ("Eggs, Large, 12 count", "", "eggs"),
            ("Granola Bars, 6 ct", "", "granola bars"),
            ("Yogurt Drink, 500 ml", "", "yogurt drink"),
            ("Sparkling Water, 2 liters", "", "sparkling water"),
            ("Sparkling Water, 2 L", "", "sparkling water"),
            ("Chocolate Bar, 100 grams", "", "chocolate bar"),
            ("Organic Whole Grain Bread", "", "organic whole grain bread"),
            ("Orange Juice, pack of 6", "", "orange juice"),
        ];
        for (name, brand, want) in cases {
            assert_eq!(preprocess(name, brand), want, "preprocess({name:?}, {brand:?})");
        }
    }

    #[test]
    fn brand_kept_when_already_present() {
        assert_eq!(preprocess("Tyson Chicken Nuggets", "tyson"), "tyson chicken nuggets");
    }

    #[test]
    fn long_input_is_truncated_at_word_boundary() {
        let long_name = "Super Premium Deluxe Ultimate Organic Natural Fresh Farm Raised Free Range Grass Fed Antibiotic Free Hormone Free Non-GMO Certified Gluten Free Dairy Free Vegan Friendly Heart Healthy Chicken Breast Tenderloin Filet";
        let out = preprocess(long_name, "");
        assert!(out.len() <= MAX_QUERY_LEN, "len = {}", out.len());
        assert!(!out.ends_with(' '));
        assert!(out.starts_with("super deluxe ultimate"));
        assert!(out.ends_with("free"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(80);
        let out = truncate_query(&s);
        assert!(out.len() <= MAX_QUERY_LEN);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn noise_words_removed() {
        let cases = [
            ("value brand chicken", "chicken"),
            ("premium select milk", "milk"),
            ("great value cheese", "cheese"),
            ("family size box cereal", "cereal"),
            ("", ""),
            ("chicken breast", "chicken breast"),
        ];
        for (input, want) in cases {
            assert_eq!(remove_noise_words(input), want, "input {input:?}");
        }
    }

    #[test]
    fn orphaned_punctuation() {
        let cases = [
            ("milk , cheese", "milk cheese"),
            (", milk", " milk"),
            ("milk,", "milk"),
            ("milk - cheese", "milk cheese"),
            ("milk", "milk"),
            ("", ""),
        ];
        for (input, want) in cases {
            assert_eq!(clean_orphaned_punctuation(input), want, "input {input:?}");
        }
    }

    #[test]
    fn only_noise_gives_empty_query() {
        assert_eq!(preprocess("Family Size Box, 12 oz", ""), "");
    }
}
