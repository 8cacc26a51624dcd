//! Scoring vocabularies and tokenization.
//! Term sets are built once and shared read-only by every scoring call.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::WeightedToken;

pub const WEIGHT_FOOD: f64 = 3.0;
pub const WEIGHT_DESCRIPTIVE: f64 = 2.0;
pub const WEIGHT_DEFAULT: f64 = 1.0;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid punctuation pattern"));

/// Core food terms: proteins, dairy, grains, produce, beverages, snacks,
/// condiments, prepared foods.
static FOOD_TERMS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // proteins
        "chicken", "beef", "pork", "fish", "salmon", "turkey", "lamb", "shrimp", "tuna",
        "bacon", "sausage", "steak", "ham", "crab", "lobster",
        // dairy
        "milk", "cheese", "yogurt", "butter", "cream", "eggs", "egg", "cheddar",
        "mozzarella", "parmesan",
        // grains
        "bread", "rice", "pasta", "cereal", "oats", "wheat", "flour", "noodles", "tortilla",
        "bagel",
        // produce
        "apple", "banana", "orange", "lettuce", "tomato", "potato", "onion", "carrot",
        "broccoli", "spinach", "strawberry", "blueberry", "grape", "lemon", "lime", "avocado",
        "cucumber", "pepper", "corn", "beans",
        // beverages
        "juice", "soda", "cola", "coffee", "tea", "water", "lemonade", "smoothie", "shake",
        // snacks and sweets
        "chips", "crackers", "cookies", "candy", "chocolate", "cake", "ice", "pie",
        "brownie", "popcorn",
        // condiments
        "ketchup", "mustard", "mayo", "mayonnaise", "sauce", "salsa", "dressing", "syrup",
        "honey", "jam",
        // prepared
        "pizza", "burger", "sandwich", "soup", "salad", "burrito", "taco", "wrap", "hot",
        "dog",
    ]
    .into_iter()
    .collect()
});

/// Preparation, flavor, type and nutritional qualifiers.
static DESCRIPTIVE_TERMS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // preparation
        "whole", "skim", "reduced", "fat", "low", "nonfat", "organic", "natural", "fresh",
        "frozen", "canned", "dried", "raw", "cooked", "grilled", "baked", "fried", "roasted",
        "smoked", "steamed",
        // flavor
        "vanilla", "strawberry", "plain", "flavored", "original", "classic", "sweet", "spicy",
        "mild", "hot", "regular", "lite", "light", "diet",
        // type
        "white", "brown", "refined", "enriched", "fortified", "unsweetened", "sweetened",
        "salted", "unsalted", "boneless", "skinless", "lean",
        // nutritional
        "vitamin", "protein", "fiber", "calcium", "iron", "omega", "probiotic", "gluten",
        "free", "added",
    ]
    .into_iter()
    .collect()
});

/// English stop words plus units, packaging and generic retail words.
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "and", "or", "of", "in", "on", "at", "to", "for", "with", "by",
        "from", "is", "it", "as", "be", "was", "are",
        // units
        "oz", "fl", "lb", "lbs", "ml", "gallon", "quart", "pint", "liter", "liters", "gram",
        "grams", "kg", "ounce", "ounces", "cup", "cups", "tbsp", "tsp",
        // packaging
        "pack", "packs", "count", "ct", "pk", "box", "bag", "bottle", "bottles", "can",
        "cans", "carton", "container", "pouch", "jar", "tub", "sleeve", "roll", "rolls",
        // retail
        "size", "value", "family", "each", "per", "serving", "servings", "approx",
        "approximately", "bonus", "new", "improved", "product",
    ]
    .into_iter()
    .collect()
});

pub fn is_food_term(token: &str) -> bool {
    FOOD_TERMS.contains(token)
}

pub fn is_descriptive_term(token: &str) -> bool {
    DESCRIPTIVE_TERMS.contains(token)
}

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}

/// Food terms outrank descriptive terms ("hot", "strawberry" are both).
pub fn token_weight(token: &str) -> f64 {
    if is_food_term(token) {
        WEIGHT_FOOD
    } else if is_descriptive_term(token) {
        WEIGHT_DESCRIPTIVE
    } else {
        WEIGHT_DEFAULT
    }
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Lowercase, strip punctuation, drop short, stop-word and numeric tokens.
pub fn tokenize(s: &str) -> Vec<String> {
    let lower = s.to_lowercase();
    let cleaned = PUNCTUATION.replace_all(&lower, " ");
    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 1)
        .filter(|w| !is_stop_word(w))
        .filter(|w| !is_numeric(w))
        .map(str::to_string)
        .collect()
}

pub fn tokenize_weighted(s: &str) -> Vec<WeightedToken> {
    tokenize(s)
        .into_iter()
        .map(|text| {
            let weight = token_weight(&text);
            WeightedToken { text, weight }
        })
        .collect()
}

/// Tokens ordered by importance: food terms, then descriptive, then the rest.
pub fn extract_food_keywords(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    let (food, rest): (Vec<_>, Vec<_>) = tokens.into_iter().partition(|t| is_food_term(t));
    let (descriptive, other): (Vec<_>, Vec<_>) =
        rest.into_iter().partition(|t| is_descriptive_term(t));
    food.into_iter().chain(descriptive).chain(other).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_noise() {
        let tokens = tokenize("Whole Milk, Vitamin D, Gallon, 128 fl oz");
        assert_eq!(tokens, vec!["whole", "milk", "vitamin"]);
    }

    #[test]
    fn tokenize_empty_and_noise_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("12 oz box of the").is_empty());
    }

    #[test]
    fn tokenize_splits_on_punctuation() {
        assert_eq!(tokenize("Coca-Cola"), vec!["coca", "cola"]);
        assert_eq!(tokenize("Ben's 2% milk"), vec!["ben", "milk"]);
    }

    #[test]
    fn weights_by_category() {
        assert_eq!(token_weight("chicken"), WEIGHT_FOOD);
        assert_eq!(token_weight("grilled"), WEIGHT_DESCRIPTIVE);
        assert_eq!(token_weight("tyson"), WEIGHT_DEFAULT);
        // in both sets; food wins
        assert_eq!(token_weight("strawberry"), WEIGHT_FOOD);
        assert_eq!(token_weight("hot"), WEIGHT_FOOD);
    }

    #[test]
    fn keywords_put_food_terms_first() {
        let keywords = extract_food_keywords("whole milk vitamin d gallon");
        assert_eq!(keywords, vec!["milk", "whole", "vitamin"]);
        assert!(extract_food_keywords("").is_empty());
    }

    #[test]
    fn keywords_keep_unknown_terms_last() {
        let keywords = extract_food_keywords("tyson grilled chicken");
        assert_eq!(keywords, vec!["chicken", "grilled", "tyson"]);
    }
}
