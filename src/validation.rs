//! Pure per-step validation over the application answer bag.
//!
//! Each wizard step owns a declarative fragment of field rules; the
//! controller validates only the active step's fragment on advance, so the
//! state machine can be exercised without any HTTP or database harness.

use crate::errors::FieldError;
use crate::wizard::WizardStep;
use serde_json::{Map, Value};

/// A single field constraint within a step fragment.
enum Rule {
    /// Non-empty string with a minimum trimmed length.
    MinLen(&'static str, usize, &'static str),
    /// Exactly ten digits after stripping formatting characters.
    Phone10(&'static str, &'static str),
    /// Boolean that must be `true`.
    MustAccept(&'static str, &'static str),
}

impl Rule {
    fn field(&self) -> &'static str {
        match self {
            Rule::MinLen(f, _, _) | Rule::Phone10(f, _) | Rule::MustAccept(f, _) => f,
        }
    }

    fn check(&self, answers: &Map<String, Value>) -> Option<FieldError> {
        match self {
            Rule::MinLen(field, min, message) => {
                let ok = answer_str(answers, field)
                    .map(|v| v.trim().chars().count() >= *min)
                    .unwrap_or(false);
                (!ok).then(|| FieldError::new(*field, *message))
            }
            Rule::Phone10(field, message) => {
                let ok = answer_str(answers, field)
                    .map(|v| digits_only(v).len() == 10)
                    .unwrap_or(false);
                (!ok).then(|| FieldError::new(*field, *message))
            }
            Rule::MustAccept(field, message) => {
                let ok = answers.get(*field).and_then(Value::as_bool) == Some(true);
                (!ok).then(|| FieldError::new(*field, *message))
            }
        }
    }
}

/// Validation fragment for one step: the required-field subset this step
/// is responsible for. Steps without a fragment validate trivially.
fn step_rules(step: WizardStep) -> &'static [Rule] {
    match step {
        WizardStep::Employment => &[
            Rule::MinLen(
                "fiscal_classification",
                1,
                "Por favor, selecciona tu clasificación fiscal",
            ),
            Rule::MinLen(
                "company_name",
                2,
                "Por favor, ingresa el nombre completo de tu empresa",
            ),
            Rule::Phone10(
                "company_phone",
                "Por favor, ingresa un teléfono de empresa válido de 10 dígitos",
            ),
            Rule::MinLen(
                "supervisor_name",
                2,
                "Por favor, ingresa el nombre completo de tu jefe inmediato",
            ),
            Rule::MinLen(
                "company_address",
                5,
                "Por favor, ingresa la dirección completa de tu empresa",
            ),
            Rule::MinLen(
                "company_industry",
                2,
                "Por favor, indica a qué industria pertenece tu empresa",
            ),
            Rule::MinLen("job_title", 2, "Por favor, ingresa tu puesto en la empresa"),
            Rule::MinLen(
                "job_seniority",
                1,
                "Por favor, indica cuánto tiempo llevas en tu puesto",
            ),
            Rule::MinLen(
                "net_monthly_income",
                1,
                "Por favor, ingresa tu ingreso mensual bruto",
            ),
        ],
        WizardStep::AdditionalDetails => &[
            Rule::MinLen(
                "time_at_address",
                1,
                "Por favor, indica cuánto tiempo llevas viviendo en tu domicilio actual",
            ),
            Rule::MinLen(
                "housing_type",
                1,
                "Por favor, selecciona el tipo de vivienda donde resides",
            ),
            Rule::MinLen(
                "dependents",
                1,
                "Por favor, indica el número de dependientes económicos que tienes",
            ),
            Rule::MinLen(
                "grado_de_estudios",
                1,
                "Por favor, selecciona tu grado de estudios",
            ),
        ],
        WizardStep::References => &[
            Rule::MinLen(
                "friend_reference_name",
                2,
                "Por favor, proporciona el nombre completo de una referencia personal",
            ),
            Rule::Phone10(
                "friend_reference_phone",
                "Por favor, ingresa un teléfono válido de 10 dígitos",
            ),
            Rule::MinLen(
                "friend_reference_relationship",
                2,
                "Por favor, indica tu relación con esta referencia",
            ),
            Rule::MinLen(
                "family_reference_name",
                2,
                "Por favor, proporciona el nombre completo de una referencia familiar",
            ),
            Rule::Phone10(
                "family_reference_phone",
                "Por favor, ingresa un teléfono válido de 10 dígitos",
            ),
            Rule::MinLen(
                "parentesco",
                3,
                "Por favor, especifica tu parentesco con la referencia familiar",
            ),
        ],
        WizardStep::Consent => &[
            Rule::MustAccept(
                "terms_and_conditions",
                "Debes aceptar los términos y condiciones para continuar.",
            ),
            Rule::MinLen(
                "digital_signature",
                1,
                "La firma digital es obligatoria para enviar tu solicitud",
            ),
        ],
        // Vehicle and address checks happen at submit / profile level.
        WizardStep::VehicleFinancing
        | WizardStep::PersonalInfo
        | WizardStep::Review
        | WizardStep::Complete => &[],
    }
}

/// Validates the given step's required fields against the answer bag.
/// Returns every failing field, not just the first.
pub fn validate_step(step: WizardStep, answers: &Map<String, Value>) -> Result<(), Vec<FieldError>> {
    let errors: Vec<FieldError> = step_rules(step)
        .iter()
        .filter_map(|rule| rule.check(answers))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Field names a step is responsible for (used by tests and tooling).
pub fn step_fields(step: WizardStep) -> Vec<&'static str> {
    step_rules(step).iter().map(|r| r.field()).collect()
}

fn answer_str<'a>(answers: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    answers.get(key).and_then(Value::as_str)
}

/// Strips formatting characters, keeping digits only.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalizes a person name for comparison: trimmed, lowercased, with
/// Spanish diacritics folded to their base letters. Handles both
/// precomposed characters and decomposed base-plus-combining-mark
/// sequences (NFD input, as some platforms produce), so `"García"` and
/// `"Garci\u{0301}a"` normalize identically.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}

/// True when the declared spouse matches either reference name,
/// case- and diacritic-insensitively. Blank spouse never matches.
pub fn spouse_used_as_reference(
    spouse_name: &str,
    friend_reference: Option<&str>,
    family_reference: Option<&str>,
) -> bool {
    let spouse = normalize_name(spouse_name);
    if spouse.is_empty() {
        return false;
    }
    let friend = friend_reference.map(normalize_name).unwrap_or_default();
    let family = family_reference.map(normalize_name).unwrap_or_default();
    spouse == friend || spouse == family
}

/// Drops null and empty-string answers before persisting a snapshot.
/// `false` booleans and zeroes are kept; they are real answers.
pub fn strip_empty_values(answers: &Map<String, Value>) -> Map<String, Value> {
    answers
        .iter()
        .filter(|(_, v)| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answers(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_consent_requires_acceptance() {
        let bag = answers(&[
            ("terms_and_conditions", json!(false)),
            ("digital_signature", json!("Juan Pérez")),
        ]);
        let errors = validate_step(WizardStep::Consent, &bag).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "terms_and_conditions");
    }

    #[test]
    fn test_phone_rule_strips_formatting() {
        let bag = answers(&[
            ("friend_reference_name", json!("Luis Torres")),
            ("friend_reference_phone", json!("(81) 1234-5678")),
            ("friend_reference_relationship", json!("Amigo")),
            ("family_reference_name", json!("Marta Torres")),
            ("family_reference_phone", json!("8187654321")),
            ("parentesco", json!("Hermana")),
        ]);
        assert!(validate_step(WizardStep::References, &bag).is_ok());
    }

    #[test]
    fn test_missing_field_reported_per_field() {
        let bag = answers(&[("housing_type", json!("Propia"))]);
        let errors = validate_step(WizardStep::AdditionalDetails, &bag).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["time_at_address", "dependents", "grado_de_estudios"]
        );
    }

    #[test]
    fn test_normalize_name_folds_accents() {
        assert_eq!(normalize_name("  Ana García "), "ana garcia");
        assert_eq!(normalize_name("JOSÉ Núñez"), "jose nunez");
    }

    #[test]
    fn test_normalize_name_strips_combining_marks() {
        // Decomposed form: base letter followed by a combining acute.
        assert_eq!(normalize_name("Ana Garci\u{0301}a"), "ana garcia");
        assert_eq!(
            normalize_name("Jose\u{0301} Nun\u{0303}ez"),
            normalize_name("José Núñez")
        );
    }

    #[test]
    fn test_strip_keeps_false_and_zero() {
        let bag = answers(&[
            ("consent_survey", json!(false)),
            ("dependents", json!(0)),
            ("blank", json!("")),
            ("missing", Value::Null),
        ]);
        let cleaned = strip_empty_values(&bag);
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned.contains_key("consent_survey"));
        assert!(cleaned.contains_key("dependents"));
    }
}
