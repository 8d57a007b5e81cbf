//! Ingredient name normalization and constraint matching
//!
//! Pantry keys, recipe ingredient lines, and user-stated constraints all pass
//! through [`normalize_name`] before being compared, so the trimming only has
//! to agree with itself, not with a dictionary.

/// Measure words stripped from ingredient names. Matched after the plural
/// trim, so the list only needs singular forms.
const UNIT_WORDS: &[&str] = &[
    "g", "kg", "mg", "lb", "oz", "ml", "l", "gram", "kilogram", "pound", "ounce", "liter", "litre", "cup", "tbsp",
    "tsp", "tablespoon", "teaspoon", "clove", "slice", "can", "jar", "bunch", "piece", "pinch", "dash", "handful",
    "stick", "head",
];

/// Normalize a raw ingredient phrase to a comparable key:
/// lowercase, punctuation stripped, quantity and unit tokens dropped,
/// naive plural trim per word.
pub fn normalize_name(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut words: Vec<String> = Vec::new();
    for token in cleaned.split_whitespace() {
        // "2" and "2kg" are quantity tokens, not names
        if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        let word = singularize(token);
        if UNIT_WORDS.contains(&word.as_str()) {
            continue;
        }
        words.push(word);
    }
    words.join(" ")
}

fn singularize(token: &str) -> String {
    if token.len() > 4 && token.ends_with("es") {
        token[..token.len() - 2].to_string()
    } else if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

/// Whether a normalized constraint (allergen, diet-conflict ingredient)
/// matches a normalized ingredient name.
///
/// Every constraint word must appear in the ingredient, either as a whole
/// word or as a prefix of one. Prefix matching over-blocks ("nut" blocks
/// "nutmeg"), which is the safe direction for allergens.
pub fn constraint_matches(constraint: &str, ingredient: &str) -> bool {
    let constraint_words: Vec<&str> = constraint.split_whitespace().collect();
    if constraint_words.is_empty() {
        return false;
    }
    let ingredient_words: Vec<&str> = ingredient.split_whitespace().collect();

    constraint_words
        .iter()
        .all(|cw| ingredient_words.iter().any(|iw| iw.starts_with(cw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_quantity_and_unit() {
        assert_eq!(normalize_name("2 cups flour"), "flour");
        assert_eq!(normalize_name("500g Chicken Breast"), "chicken breast");
        assert_eq!(normalize_name("3 cloves garlic, minced"), "garlic minced");
    }

    #[test]
    fn test_normalize_plural_trim() {
        assert_eq!(normalize_name("Tomatoes"), "tomato");
        assert_eq!(normalize_name("eggs"), "egg");
        assert_eq!(normalize_name("chicken breasts"), "chicken breast");
    }

    #[test]
    fn test_normalize_short_words_kept() {
        // "gas" and "ham" are too short for the plural trim
        assert_eq!(normalize_name("ham"), "ham");
        assert_eq!(normalize_name("peas"), "pea");
    }

    #[test]
    fn test_normalize_double_s_kept() {
        assert_eq!(normalize_name("watercress"), "watercress");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_name("2 cups Cherry Tomatoes");
        assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn test_constraint_matches_whole_word() {
        assert!(constraint_matches("peanut", "peanut butter"));
        assert!(constraint_matches("peanut butter", "peanut butter"));
        assert!(!constraint_matches("peanut", "chicken breast"));
    }

    #[test]
    fn test_constraint_matches_prefix_overblocks() {
        // Over-blocking is deliberate for allergens
        assert!(constraint_matches("nut", "nutmeg"));
    }

    #[test]
    fn test_constraint_matches_after_plural_trim() {
        assert!(constraint_matches(&normalize_name("peanuts"), &normalize_name("peanut butter")));
    }

    #[test]
    fn test_constraint_empty_never_matches() {
        assert!(!constraint_matches("", "flour"));
    }
}
