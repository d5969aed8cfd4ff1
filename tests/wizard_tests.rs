/// Tests for the wizard state machine and entry gate.
/// The gate and step order are pure, so the navigation rules can be
/// exercised without a database.
use financing_api::validation::{spouse_used_as_reference, validate_step};
use financing_api::wizard::{evaluate_entry_gate, EntryGate, WizardStep, STEP_ORDER};
use serde_json::{json, Map, Value};

fn answers(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn step_order_matches_the_flow() {
    let names: Vec<&str> = STEP_ORDER.iter().map(|s| s.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "vehicle-financing",
            "personal-info",
            "employment",
            "additional-details",
            "references",
            "consent",
            "review",
            "complete",
        ]
    );
}

#[test]
fn every_form_step_precedes_review() {
    let review_index = WizardStep::Review.index();
    for step in STEP_ORDER.iter().filter(|s| s.is_form_step()) {
        assert!(step.index() < review_index, "{} after review", step.as_str());
    }
}

#[test]
fn advancing_from_consent_lands_on_review() {
    assert_eq!(WizardStep::Consent.next(), WizardStep::Review);
    assert_eq!(WizardStep::Review.next(), WizardStep::Complete);
}

#[test]
fn gate_remediations_are_checked_in_order() {
    // Incomplete profile wins over everything else.
    assert_eq!(
        evaluate_entry_gate(false, false, true, false, false),
        EntryGate::ProfileIncomplete
    );
    // Bank profiling comes second.
    assert_eq!(
        evaluate_entry_gate(true, false, true, false, false),
        EntryGate::BankProfileIncomplete
    );
    // The active-application rule is last.
    assert_eq!(
        evaluate_entry_gate(true, true, true, false, false),
        EntryGate::ActiveApplicationExists
    );
    assert_eq!(
        evaluate_entry_gate(true, true, false, false, false),
        EntryGate::Ready
    );
}

#[test]
fn admin_may_start_another_application() {
    assert_eq!(
        evaluate_entry_gate(true, true, true, true, false),
        EntryGate::Ready
    );
}

#[test]
fn resuming_a_draft_skips_the_active_check() {
    assert_eq!(
        evaluate_entry_gate(true, true, true, false, true),
        EntryGate::Ready
    );
    // But not the profile gates.
    assert_eq!(
        evaluate_entry_gate(false, true, true, false, true),
        EntryGate::ProfileIncomplete
    );
}

#[test]
fn employment_step_blocks_on_missing_income() {
    let mut bag = answers(&[
        ("fiscal_classification", json!("Asalariado")),
        ("company_name", json!("Autos del Norte")),
        ("company_phone", json!("8112345678")),
        ("supervisor_name", json!("Laura Medina")),
        ("company_address", json!("Av. Constitución 400, Monterrey")),
        ("company_industry", json!("Automotriz")),
        ("job_title", json!("Vendedor")),
        ("job_seniority", json!("3 años")),
    ]);
    let errors = validate_step(WizardStep::Employment, &bag).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "net_monthly_income");

    bag.insert("net_monthly_income".to_string(), json!("18000"));
    assert!(validate_step(WizardStep::Employment, &bag).is_ok());
}

#[test]
fn steps_only_validate_their_own_fragment() {
    // A bag with nothing but consent answers passes the consent step even
    // though every other step's fields are absent.
    let bag = answers(&[
        ("terms_and_conditions", json!(true)),
        ("digital_signature", json!("María Eugenia Salas")),
    ]);
    assert!(validate_step(WizardStep::Consent, &bag).is_ok());
    assert!(validate_step(WizardStep::References, &bag).is_err());
}

#[test]
fn spouse_rule_matches_either_reference() {
    assert!(spouse_used_as_reference(
        "José Pérez",
        Some("jose perez"),
        Some("Ana López")
    ));
    assert!(spouse_used_as_reference(
        "José Pérez",
        Some("Ana López"),
        Some("  JOSÉ PÉREZ ")
    ));
    assert!(!spouse_used_as_reference(
        "José Pérez",
        Some("Ana López"),
        Some("Luis Pérez")
    ));
}

#[test]
fn spouse_rule_catches_decomposed_accents() {
    // NFD input spells the accent as a combining mark after the base
    // letter; it must still match the precomposed spouse name.
    assert!(spouse_used_as_reference(
        "Ana García",
        None,
        Some("Ana Garci\u{0301}a")
    ));
    assert!(spouse_used_as_reference(
        "Ana Garci\u{0301}a",
        Some("ANA GARCÍA"),
        None
    ));
}

#[test]
fn blank_spouse_never_matches() {
    assert!(!spouse_used_as_reference("   ", Some(""), Some("")));
    assert!(!spouse_used_as_reference("", Some("Ana"), None));
}
