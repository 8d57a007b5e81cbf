//! Deterministic keyword fallback for intent classification
//!
//! Runs when the text-generation collaborator is down or returns
//! malformed JSON, so a dead model never kills the turn. Coarser than
//! the model on purpose: quantities come from digits and a short list
//! of number words (defaulting to 1 when unstated), preferences from a
//! fixed phrase list, and expiration dates are not parsed at all.

use std::sync::LazyLock;

use pantrystore::PantryDelta;
use regex::Regex;
use tracing::debug;

use crate::domain::{normalize_name, PreferenceDelta, SkillLevel};
use crate::session::{ConversationState, Stage};

use super::{Classification, Intent};

/// Clarifying question used when no rule matches
pub(super) const CLARIFY_FALLBACK: &str =
    "I can update your pantry, suggest recipes, or answer cooking questions. What would you like?";

static SELECT_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:option|number|recipe|choice)\s*#?\s*(\d+|one|two|three)\b").expect("static regex")
});

static SELECT_ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(first|second|third|1st|2nd|3rd)\b").expect("static regex"));

static SELECT_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:the\s+)?#?(\d+|one|two|three)\s*[.!]*\s*$").expect("static regex"));

static SELECT_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:take|try|go with|choose|pick|do)\s+(?:the\s+)?(\d+|one|two|three)\b").expect("static regex")
});

static ADD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:bought|got|picked up|grabbed|added|restocked|brought home)\s+([^.?!]+)").expect("static regex")
});

static REMOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:used up|used|finished|ran out of|threw (?:out|away)|tossed|ate|wasted)\s+([^.?!]+)")
        .expect("static regex")
});

static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^\s*
          (?:(half\ a\ dozen|a\ dozen|a\ couple(?:\ of)?|a\ few|half\ an?|some|\d+(?:\.\d+)?|one|two|three|four|five|six|seven|eight|nine|ten|an?)\s+)?
          (?:(lbs?|pounds?|kilograms?|kgs?|grams?|g|ounces?|oz|cups?|cloves?|cans?|bottles?|bags?|bunch(?:es)?|heads?|liters?|ml|pints?|quarts?|sticks?|cartons?|jars?|packs?|packages?|boxes?|dozen)\s+(?:of\s+)?)?
          (.+?)\s*$",
    )
    .expect("static regex")
});

static SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)\b(?:
            recipes?
          | what\ can\ (?:i|we)\ (?:make|cook|do)
          | what\ should\ (?:i|we)\ (?:make|cook)
          | what(?:'s|\ is)\ for\ dinner
          | (?:dinner|lunch|meal)\ ideas?
          | something\ to\ (?:cook|make|eat)
          | (?:cook|make)\ (?:tonight|today|for\ dinner|for\ lunch)
          | suggest
          | recommend
          | i(?:'m|\ am)\ hungry
        )\b",
    )
    .expect("static regex")
});

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:hi|hiya|hello|hey|yo|howdy|good\s+(?:morning|afternoon|evening)|greetings)(?:\s+there)?\s*[!.]*\s*$")
        .expect("static regex")
});

static QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:how|what|why|when|where|can|could|should|would|is|are|do|does)\b").expect("static regex")
});

static ALLERGY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)allerg(?:ic\s+to|y\s+to|ies\s+to)\s+([a-z, ]+)").expect("static regex"));

static ALLERGY_GONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:no\s+longer|not)\s+allergic\s+to\s+([a-z, ]+)").expect("static regex")
});

static CUISINE_LIKE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:i\s+(?:love|like|prefer|enjoy)|we\s+(?:love|like|prefer|enjoy)|craving|in\s+the\s+mood\s+for)\s+([a-z]+)")
        .expect("static regex")
});

const DIET_KEYWORDS: &[(&str, &str)] = &[
    ("vegetarian", "vegetarian"),
    ("vegan", "vegan"),
    ("gluten free", "gluten free"),
    ("gluten-free", "gluten free"),
    ("dairy free", "dairy free"),
    ("dairy-free", "dairy free"),
    ("pescatarian", "pescatarian"),
    ("keto", "keto"),
    ("paleo", "paleo"),
    ("kosher", "kosher"),
    ("halal", "halal"),
];

const KNOWN_CUISINES: &[&str] = &[
    "italian", "mexican", "chinese", "indian", "thai", "japanese", "french", "greek", "mediterranean", "korean",
    "vietnamese", "spanish", "moroccan", "american",
];

/// Words that mark a pantry-verb capture as conversational spillover
/// rather than an item ("I bought eggs, what can I make?")
const SEGMENT_STOP_WORDS: &[&str] = &[
    "what", "how", "why", "can", "could", "should", "would", "make", "making", "cook", "cooking", "eating", "recipe",
    "recipes", "suggest", "recommend", "idea", "ideas", "me", "you", "we", "it", "tonight", "today", "dinner",
    "lunch", "breakfast", "please", "question", "questions", "about", "help", "thanks", "thank",
];

/// Leading filler stripped from item names before normalization
const NAME_FILLERS: &[&str] = &["the", "my", "our", "your", "this", "that", "some", "all", "of", "more", "leftover", "fresh", "rest"];

/// Classify a message with keyword rules alone. Always succeeds; a
/// message no rule understands comes back as a clarifying question.
pub(super) fn classify(message: &str, state: &ConversationState) -> Classification {
    let preference_delta = extract_preferences(message);
    let mut intents = Vec::new();

    if state.stage == Stage::AwaitingSelection
        && let Some(index) = parse_selection(message)
    {
        debug!(index, "rules: selection parsed");
        return Classification {
            intents: vec![Intent::SelectRecommendation { index }],
            preference_delta,
            used_fallback: true,
        };
    }

    let deltas = parse_pantry_deltas(message);
    if !deltas.is_empty() {
        intents.push(Intent::MutatePantry { deltas });
    }

    if SEARCH_RE.is_match(message) {
        intents.push(Intent::SearchRecipes {
            query: message.trim().to_string(),
        });
    }

    if intents.is_empty() {
        if is_greeting(message) || QUESTION_RE.is_match(message) || !preference_delta.is_empty() {
            intents.push(Intent::GeneralQuery);
        } else {
            intents.push(Intent::Ambiguous {
                question: CLARIFY_FALLBACK.to_string(),
            });
        }
    }

    Classification {
        intents,
        preference_delta,
        used_fallback: true,
    }
}

/// Parse a selection phrase into a 1-based index. Only meaningful while
/// options are awaiting selection; range checking is the caller's job.
pub(super) fn parse_selection(message: &str) -> Option<usize> {
    if let Some(cap) = SELECT_KEYWORD_RE.captures(message) {
        return parse_count(&cap[1]);
    }
    if let Some(cap) = SELECT_ORDINAL_RE.captures(message) {
        return match cap[1].to_lowercase().as_str() {
            "first" | "1st" => Some(1),
            "second" | "2nd" => Some(2),
            "third" | "3rd" => Some(3),
            _ => None,
        };
    }
    if let Some(cap) = SELECT_BARE_RE.captures(message) {
        return parse_count(&cap[1]);
    }
    if let Some(cap) = SELECT_VERB_RE.captures(message) {
        return parse_count(&cap[1]);
    }
    None
}

/// Whether the message is a bare greeting
pub(crate) fn is_greeting(message: &str) -> bool {
    GREETING_RE.is_match(message)
}

fn parse_count(token: &str) -> Option<usize> {
    match token.to_lowercase().as_str() {
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        digits => digits.parse().ok().filter(|n| *n >= 1),
    }
}

fn parse_pantry_deltas(message: &str) -> Vec<PantryDelta> {
    let mut deltas = Vec::new();
    for (re, sign) in [(&*ADD_RE, 1.0), (&*REMOVE_RE, -1.0)] {
        for cap in re.captures_iter(message) {
            for segment in split_segments(&cap[1]) {
                if let Some(delta) = parse_item(&segment, sign) {
                    deltas.push(delta);
                }
            }
        }
    }
    deltas
}

fn split_segments(tail: &str) -> Vec<String> {
    tail.split([',', ';'])
        .flat_map(|s| s.split(" and "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_item(segment: &str, sign: f64) -> Option<PantryDelta> {
    let lower = segment.to_lowercase();
    if lower
        .split_whitespace()
        .any(|w| SEGMENT_STOP_WORDS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())))
    {
        return None;
    }

    let cap = ITEM_RE.captures(&lower)?;
    let quantity = cap.get(1).map(|m| parse_quantity(m.as_str())).unwrap_or(1.0);
    let unit = cap.get(2).map(|m| m.as_str().to_string());

    let mut words = cap[3].split_whitespace().peekable();
    while words.peek().is_some_and(|w| NAME_FILLERS.contains(w)) {
        words.next();
    }
    let name = normalize_name(&words.collect::<Vec<_>>().join(" "));
    if name.is_empty() {
        return None;
    }

    Some(PantryDelta {
        name,
        quantity: sign * quantity,
        unit,
        expires_on: None,
    })
}

fn parse_quantity(token: &str) -> f64 {
    match token.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
        "a" | "an" | "some" => 1.0,
        "half a" | "half an" => 0.5,
        "a couple" | "a couple of" => 2.0,
        "a few" => 3.0,
        "a dozen" => 12.0,
        "half a dozen" => 6.0,
        "one" => 1.0,
        "two" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "seven" => 7.0,
        "eight" => 8.0,
        "nine" => 9.0,
        "ten" => 10.0,
        digits => digits.parse().unwrap_or(1.0),
    }
}

fn extract_preferences(message: &str) -> PreferenceDelta {
    let mut delta = PreferenceDelta::default();
    let lower = message.to_lowercase();

    // Negated allergies first, and blank them out so the additive
    // pattern cannot re-match the same span
    let mut scrubbed = lower.clone();
    for cap in ALLERGY_GONE_RE.captures_iter(&lower) {
        let items = split_list(&cap[1]);
        if !items.is_empty() {
            delta.remove_allergies.get_or_insert_with(Vec::new).extend(items);
        }
        if let Some(m) = cap.get(0) {
            scrubbed.replace_range(m.range(), &" ".repeat(m.len()));
        }
    }

    for cap in ALLERGY_RE.captures_iter(&scrubbed) {
        let items = split_list(&cap[1]);
        if !items.is_empty() {
            delta.allergies.get_or_insert_with(Vec::new).extend(items);
        }
    }

    for (needle, diet) in DIET_KEYWORDS {
        if lower.contains(needle) {
            let restrictions = delta.dietary_restrictions.get_or_insert_with(Vec::new);
            if !restrictions.iter().any(|r| r == diet) {
                restrictions.push(diet.to_string());
            }
        }
    }

    for cap in CUISINE_LIKE_RE.captures_iter(&lower) {
        let word = cap[1].to_string();
        if KNOWN_CUISINES.contains(&word.as_str()) {
            let cuisines = delta.cuisine_preferences.get_or_insert_with(Vec::new);
            if !cuisines.contains(&word) {
                cuisines.push(word);
            }
        }
    }

    if lower.contains("beginner") || lower.contains("new to cooking") || lower.contains("novice") {
        delta.skill_level = Some(SkillLevel::Beginner);
    } else if lower.contains("advanced") || lower.contains("experienced cook") || lower.contains("expert cook") {
        delta.skill_level = Some(SkillLevel::Advanced);
    } else if lower.contains("intermediate") {
        delta.skill_level = Some(SkillLevel::Intermediate);
    }

    delta
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([','])
        .flat_map(|s| s.split(" and "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "and")
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at(stage: Stage) -> ConversationState {
        let mut state = ConversationState::new("s1");
        state.stage = stage;
        state
    }

    // === parse_selection ===

    #[test]
    fn test_selection_keyword_forms() {
        assert_eq!(parse_selection("option 2"), Some(2));
        assert_eq!(parse_selection("Option #3 please"), Some(3));
        assert_eq!(parse_selection("number two"), Some(2));
        assert_eq!(parse_selection("recipe 1"), Some(1));
    }

    #[test]
    fn test_selection_ordinals() {
        assert_eq!(parse_selection("I'll try the first one"), Some(1));
        assert_eq!(parse_selection("the second one sounds good"), Some(2));
        assert_eq!(parse_selection("3rd"), Some(3));
    }

    #[test]
    fn test_selection_bare_numbers() {
        assert_eq!(parse_selection("2"), Some(2));
        assert_eq!(parse_selection(" two! "), Some(2));
        assert_eq!(parse_selection("the 3"), Some(3));
    }

    #[test]
    fn test_selection_verb_forms() {
        assert_eq!(parse_selection("let's go with 2"), Some(2));
        assert_eq!(parse_selection("I'll take the three"), Some(3));
    }

    #[test]
    fn test_selection_rejects_non_selections() {
        assert_eq!(parse_selection("what can I make?"), None);
        assert_eq!(parse_selection("I bought 2 eggs"), None);
        assert_eq!(parse_selection("none of these"), None);
    }

    // === pantry deltas ===

    #[test]
    fn test_parse_bought_with_quantities() {
        let deltas = parse_pantry_deltas("I bought 2 chicken breasts and a dozen eggs");
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].name, "chicken breast");
        assert_eq!(deltas[0].quantity, 2.0);
        assert_eq!(deltas[1].name, "egg");
        assert_eq!(deltas[1].quantity, 12.0);
    }

    #[test]
    fn test_parse_used_up_is_negative() {
        let deltas = parse_pantry_deltas("we used up the milk");
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].name, "milk");
        assert_eq!(deltas[0].quantity, -1.0);
    }

    #[test]
    fn test_parse_units_survive() {
        let deltas = parse_pantry_deltas("bought 2 lbs of ground beef");
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].name, "ground beef");
        assert_eq!(deltas[0].quantity, 2.0);
        assert_eq!(deltas[0].unit.as_deref(), Some("lbs"));
    }

    #[test]
    fn test_parse_drops_question_spillover() {
        let deltas = parse_pantry_deltas("I bought 2 chicken breasts, what can I make?");
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].name, "chicken breast");
    }

    #[test]
    fn test_parse_no_verbs_no_deltas() {
        assert!(parse_pantry_deltas("what's a good pasta recipe?").is_empty());
    }

    // === preference extraction ===

    #[test]
    fn test_extract_allergies() {
        let delta = extract_preferences("I'm allergic to peanuts and shellfish");
        assert_eq!(
            delta.allergies,
            Some(vec!["peanuts".to_string(), "shellfish".to_string()])
        );
    }

    #[test]
    fn test_extract_allergy_removal_does_not_re_add() {
        let delta = extract_preferences("good news, I'm no longer allergic to shellfish");
        assert_eq!(delta.remove_allergies, Some(vec!["shellfish".to_string()]));
        assert!(delta.allergies.is_none());
    }

    #[test]
    fn test_extract_diet_keywords() {
        let delta = extract_preferences("we're vegetarian and gluten-free");
        let restrictions = delta.dietary_restrictions.unwrap();
        assert!(restrictions.contains(&"vegetarian".to_string()));
        assert!(restrictions.contains(&"gluten free".to_string()));
    }

    #[test]
    fn test_extract_cuisine_needs_liking_context() {
        let delta = extract_preferences("I love thai food");
        assert_eq!(delta.cuisine_preferences, Some(vec!["thai".to_string()]));

        // A bare cuisine mention in a query is not a durable preference
        let delta = extract_preferences("show me thai recipes");
        assert!(delta.cuisine_preferences.is_none());
    }

    #[test]
    fn test_extract_skill_level() {
        assert_eq!(
            extract_preferences("I'm a beginner in the kitchen").skill_level,
            Some(SkillLevel::Beginner)
        );
        assert_eq!(
            extract_preferences("I'm an experienced cook").skill_level,
            Some(SkillLevel::Advanced)
        );
    }

    // === whole-message classification ===

    #[test]
    fn test_classify_split_intent_orders_mutate_first() {
        let classification = classify(
            "I bought 2 chicken breasts, what can I make?",
            &state_at(Stage::Initial),
        );
        assert_eq!(classification.intents.len(), 2);
        assert!(matches!(classification.intents[0], Intent::MutatePantry { .. }));
        assert!(matches!(classification.intents[1], Intent::SearchRecipes { .. }));
        assert!(classification.used_fallback);
    }

    #[test]
    fn test_classify_selection_in_awaiting_stage() {
        let classification = classify("option 2", &state_at(Stage::AwaitingSelection));
        assert_eq!(
            classification.intents,
            vec![Intent::SelectRecommendation { index: 2 }]
        );
    }

    #[test]
    fn test_classify_bare_number_outside_awaiting_is_ambiguous() {
        let classification = classify("2", &state_at(Stage::Initial));
        assert!(matches!(classification.intents[0], Intent::Ambiguous { .. }));
    }

    #[test]
    fn test_classify_question_is_general() {
        let classification = classify("how long do I boil an egg?", &state_at(Stage::Initial));
        assert_eq!(classification.intents, vec![Intent::GeneralQuery]);
    }

    #[test]
    fn test_classify_greeting_is_general() {
        let classification = classify("hello!", &state_at(Stage::Initial));
        assert_eq!(classification.intents, vec![Intent::GeneralQuery]);
    }

    #[test]
    fn test_classify_preference_only_message_is_general() {
        let classification = classify("I'm vegan", &state_at(Stage::Initial));
        assert_eq!(classification.intents, vec![Intent::GeneralQuery]);
        assert_eq!(classification.preference_delta.dietary_restrictions, Some(vec!["vegan".to_string()]));
    }

    #[test]
    fn test_classify_gibberish_is_ambiguous() {
        let classification = classify("asdf qwerty", &state_at(Stage::Initial));
        assert!(matches!(classification.intents[0], Intent::Ambiguous { .. }));
    }

    #[test]
    fn test_classify_search_phrases() {
        for message in [
            "what can I make for dinner?",
            "any recipe suggestions?",
            "suggest something to cook",
            "what's for dinner",
        ] {
            let classification = classify(message, &state_at(Stage::Initial));
            assert!(
                classification
                    .intents
                    .iter()
                    .any(|i| matches!(i, Intent::SearchRecipes { .. })),
                "expected search intent for {message:?}"
            );
        }
    }
}
