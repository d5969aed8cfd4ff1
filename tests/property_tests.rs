/// Property-based tests using proptest
/// Tests invariants of the normalization and stripping helpers applied
/// to every answer bag before persistence or comparison.
use financing_api::validation::{digits_only, normalize_name, strip_empty_values, validate_step};
use financing_api::wizard::{WizardStep, STEP_ORDER};
use proptest::prelude::*;
use serde_json::{Map, Value};

// Property: name normalization should never panic and is idempotent
proptest! {
    #[test]
    fn normalize_name_never_panics(name in "\\PC*") {
        let _ = normalize_name(&name);
    }

    #[test]
    fn normalize_name_is_idempotent(name in "\\PC*") {
        let once = normalize_name(&name);
        prop_assert_eq!(normalize_name(&once), once);
    }

    #[test]
    fn normalized_names_carry_no_spanish_diacritics(name in "\\PC*") {
        let normalized = normalize_name(&name);
        for c in ['á', 'é', 'í', 'ó', 'ú', 'ñ', 'ü'] {
            prop_assert!(!normalized.contains(c));
        }
        // Nor decomposed accents: no combining marks survive.
        // (bound to a variable so prop_assert! doesn't treat the `{0300}`
        // escape in the stringified expression as a format placeholder)
        let no_combining_marks = normalized
            .chars()
            .all(|c| !('\u{0300}'..='\u{036f}').contains(&c));
        prop_assert!(no_combining_marks);
    }
}

// Property: digit extraction keeps digits only, in order
proptest! {
    #[test]
    fn digits_only_output_is_all_digits(input in "\\PC*") {
        let digits = digits_only(&input);
        prop_assert!(digits.chars().all(|c| c.is_ascii_digit()));
        prop_assert!(digits.len() <= input.len());
    }

    #[test]
    fn digits_only_preserves_digit_order(digits in "[0-9]{0,12}", noise in "[ ()+-]{0,6}") {
        let mixed = format!("{}{}{}", noise, digits, noise);
        prop_assert_eq!(digits_only(&mixed), digits);
    }
}

// Property: stripping removes exactly the null/empty entries and is idempotent
proptest! {
    #[test]
    fn strip_empty_values_keeps_no_nulls(keys in proptest::collection::vec("[a-z_]{1,12}", 0..8)) {
        let mut bag = Map::new();
        for (i, key) in keys.iter().enumerate() {
            let value = match i % 4 {
                0 => Value::Null,
                1 => Value::String(String::new()),
                2 => Value::String(format!("v{}", i)),
                _ => Value::Bool(false),
            };
            bag.insert(key.clone(), value);
        }
        let cleaned = strip_empty_values(&bag);
        for value in cleaned.values() {
            prop_assert!(!value.is_null());
            prop_assert!(value.as_str() != Some(""));
        }
        prop_assert_eq!(strip_empty_values(&cleaned), cleaned);
    }
}

// Property: validation never panics, whatever shape the answers take
proptest! {
    #[test]
    fn validate_step_never_panics(
        key in "[a-z_]{1,20}",
        value in "\\PC{0,30}",
        step_index in 0usize..8
    ) {
        let mut bag = Map::new();
        bag.insert(key, Value::String(value));
        let step = STEP_ORDER[step_index];
        let _ = validate_step(step, &bag);
    }

    #[test]
    fn empty_bag_fails_every_guarded_step(step_index in 0usize..8) {
        let step = STEP_ORDER[step_index];
        let result = validate_step(step, &Map::new());
        let guarded = matches!(
            step,
            WizardStep::Employment
                | WizardStep::AdditionalDetails
                | WizardStep::References
                | WizardStep::Consent
        );
        prop_assert_eq!(result.is_err(), guarded);
    }
}
