/// Per-step validation behavior: Spanish field messages, phone
/// normalization and the empty-value stripping rules applied before a
/// draft snapshot is persisted.
use financing_api::validation::{digits_only, step_fields, strip_empty_values, validate_step};
use financing_api::wizard::WizardStep;
use serde_json::{json, Map, Value};

fn answers(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn early_steps_have_no_field_rules() {
    assert!(step_fields(WizardStep::VehicleFinancing).is_empty());
    assert!(step_fields(WizardStep::PersonalInfo).is_empty());
    assert!(step_fields(WizardStep::Review).is_empty());
}

#[test]
fn additional_details_requires_all_four_fields() {
    assert_eq!(
        step_fields(WizardStep::AdditionalDetails),
        vec!["time_at_address", "housing_type", "dependents", "grado_de_estudios"]
    );
    let errors = validate_step(WizardStep::AdditionalDetails, &Map::new()).unwrap_err();
    assert_eq!(errors.len(), 4);
}

#[test]
fn messages_are_field_specific_and_in_spanish() {
    let errors = validate_step(WizardStep::Consent, &Map::new()).unwrap_err();
    let terms = errors
        .iter()
        .find(|e| e.field == "terms_and_conditions")
        .unwrap();
    assert!(terms.message.contains("términos y condiciones"));
    let signature = errors
        .iter()
        .find(|e| e.field == "digital_signature")
        .unwrap();
    assert!(signature.message.contains("firma digital"));
}

#[test]
fn company_phone_accepts_formatted_input() {
    let base = answers(&[
        ("fiscal_classification", json!("Asalariado")),
        ("company_name", json!("Grupo Autofin")),
        ("supervisor_name", json!("Raúl Ortega")),
        ("company_address", json!("Calle Hidalgo 123, Centro")),
        ("company_industry", json!("Financiera")),
        ("job_title", json!("Analista")),
        ("job_seniority", json!("2 años")),
        ("net_monthly_income", json!("25000")),
    ]);

    for phone in ["(81) 1234-5678", "81 12 34 56 78", "8112345678"] {
        let mut bag = base.clone();
        bag.insert("company_phone".to_string(), json!(phone));
        assert!(
            validate_step(WizardStep::Employment, &bag).is_ok(),
            "rejected {}",
            phone
        );
    }

    let mut bag = base.clone();
    bag.insert("company_phone".to_string(), json!("12345"));
    assert!(validate_step(WizardStep::Employment, &bag).is_err());
}

#[test]
fn whitespace_only_values_fail_min_length() {
    let bag = answers(&[
        ("time_at_address", json!("   ")),
        ("housing_type", json!("Rentada")),
        ("dependents", json!("2")),
        ("grado_de_estudios", json!("Licenciatura")),
    ]);
    let errors = validate_step(WizardStep::AdditionalDetails, &bag).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "time_at_address");
}

#[test]
fn digits_only_strips_everything_else() {
    assert_eq!(digits_only("+52 (81) 1234-5678"), "528112345678");
    assert_eq!(digits_only("sin números"), "");
}

#[test]
fn strip_drops_nulls_and_empty_strings_only() {
    let bag = answers(&[
        ("kept_string", json!("valor")),
        ("kept_false", json!(false)),
        ("kept_zero", json!(0)),
        ("kept_array", json!(["a"])),
        ("dropped_null", Value::Null),
        ("dropped_empty", json!("")),
    ]);
    let cleaned = strip_empty_values(&bag);
    assert_eq!(cleaned.len(), 4);
    assert!(!cleaned.contains_key("dropped_null"));
    assert!(!cleaned.contains_key("dropped_empty"));
    // Whitespace is a deliberate answer; only the truly empty string goes.
    let bag = answers(&[("spaces", json!(" "))]);
    assert!(strip_empty_values(&bag).contains_key("spaces"));
}
