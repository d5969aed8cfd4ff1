use std::env;
use std::sync::Arc;
use uuid::Uuid;

use chrono::NaiveDate;
use financing_api::applications::ApplicationStore;
use financing_api::bank_profiling::BankProfileStore;
use financing_api::config::Config;
use financing_api::db::Database;
use financing_api::errors::AppError;
use financing_api::handlers::AppState;
use financing_api::models::SubmitRequest;
use financing_api::profiles::ProfileStore;
use financing_api::status::ApplicationStatus;
use financing_api::validation::strip_empty_values;
use financing_api::wizard::{SubmitResponse, WizardService};
use serde_json::{json, Map, Value};
use sqlx::PgPool;

/// Integration tests for draft persistence and the submission transition.
/// Marked ignored to avoid running against production by accident; set
/// TEST_DATABASE_URL (pointing at a database with the full schema) to run.
fn database_url() -> anyhow::Result<String> {
    env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))
}

fn app_err(e: AppError) -> anyhow::Error {
    anyhow::anyhow!(e.to_string())
}

fn test_config(database_url: String) -> Config {
    Config {
        database_url,
        port: 0,
        site_base_url: "https://test.local".to_string(),
        email_api_base_url: "https://api.brevo.com".to_string(),
        email_api_key: None,
        email_sender: "no-reply@test.local".to_string(),
        admin_emails: Vec::new(),
        document_url_secret: "test-secret".to_string(),
        document_url_ttl_secs: 600,
    }
}

/// Inserts a profile with every identity field the entry gate requires.
async fn insert_complete_profile(pool: &PgPool) -> anyhow::Result<Uuid> {
    let user_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO profiles
            (id, email, first_name, last_name, mother_last_name, phone,
             birth_date, rfc, homoclave, fiscal_situation, civil_status, role)
        VALUES ($1, $2, 'Ana', 'Torres', 'Vega', '8112345678',
                $3, 'TOVA900101', 'AB1', 'Asalariada', 'Soltera', 'user')
        "#,
    )
    .bind(user_id)
    .bind(format!("test-{}@example.com", user_id))
    .bind(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap())
    .execute(pool)
    .await?;
    Ok(user_id)
}

fn car_info_value(order_code: &str) -> Value {
    json!({
        "vehicle_title": "Mazda 3 2022",
        "order_code": order_code,
        "price": "300000",
        "min_down_payment": "75000",
        "feature_image": null,
    })
}

/// Every required field across all form fragments plus address answers.
fn full_answers() -> Map<String, Value> {
    json!({
        "fiscal_classification": "Asalariado",
        "company_name": "Autos del Norte",
        "company_phone": "8187654321",
        "supervisor_name": "Laura Medina",
        "company_address": "Av. Constitución 400, Monterrey",
        "company_industry": "Automotriz",
        "job_title": "Vendedora",
        "job_seniority": "3 años",
        "net_monthly_income": "22000",
        "time_at_address": "5 años",
        "housing_type": "Rentada",
        "dependents": "1",
        "grado_de_estudios": "Licenciatura",
        "friend_reference_name": "Luis Campos",
        "friend_reference_phone": "8111111111",
        "friend_reference_relationship": "Amigo",
        "family_reference_name": "Marta Torres",
        "family_reference_phone": "8122222222",
        "parentesco": "Hermana",
        "terms_and_conditions": true,
        "digital_signature": "Ana Torres Vega",
        "address": "Calle Roble 12",
        "colony": "Del Valle",
        "city": "Monterrey",
        "state": "Nuevo León",
        "zip_code": "64000",
    })
    .as_object()
    .cloned()
    .unwrap()
}

#[tokio::test]
#[ignore]
async fn draft_save_reload_round_trip() -> anyhow::Result<()> {
    let db = Database::new(&database_url()?).await?;
    let store = ApplicationStore::new(db.pool.clone());
    let user_id = insert_complete_profile(&db.pool).await?;

    let draft = store.create_draft(user_id, None, None).await.map_err(app_err)?;

    // First save: a snapshot with nulls and empty strings stripped the
    // way the wizard does before persisting.
    let bag: Map<String, Value> = json!({
        "fiscal_classification": "Asalariado",
        "company_name": "Autos del Norte",
        "left_blank": "",
        "never_answered": null,
    })
    .as_object()
    .cloned()
    .unwrap();
    let cleaned = strip_empty_values(&bag);
    store
        .save_draft(draft.id, None, Some(&Value::Object(cleaned.clone())))
        .await
        .map_err(app_err)?;

    let reloaded = store
        .get_by_id(user_id, draft.id)
        .await
        .map_err(app_err)?
        .unwrap();
    let data = reloaded.application_data.unwrap();
    assert_eq!(data, Value::Object(cleaned));
    assert!(data.get("left_blank").is_none());
    assert!(data.get("never_answered").is_none());

    // Second save with more answers: a reload reproduces exactly what
    // was last written, nothing more and nothing less.
    let mut later = data.as_object().cloned().unwrap();
    later.insert("job_title".to_string(), json!("Vendedora"));
    store
        .save_draft(draft.id, None, Some(&Value::Object(later.clone())))
        .await
        .map_err(app_err)?;
    let reloaded = store
        .get_by_id(user_id, draft.id)
        .await
        .map_err(app_err)?
        .unwrap();
    assert_eq!(reloaded.application_data.unwrap(), Value::Object(later));
    assert_eq!(reloaded.status, ApplicationStatus::Draft.as_str());

    Ok(())
}

#[tokio::test]
#[ignore]
async fn submit_transitions_draft_and_blocks_a_second_active() -> anyhow::Result<()> {
    let url = database_url()?;
    let db = Database::new(&url).await?;
    let state = Arc::new(AppState::new(db.pool.clone(), test_config(url)));
    let service = WizardService::from_state(&state);

    let store = ApplicationStore::new(db.pool.clone());
    let profiles = ProfileStore::new(db.pool.clone());
    let user_id = insert_complete_profile(&db.pool).await?;
    BankProfileStore::new(db.pool.clone())
        .save(user_id, &json!({}), "BBVA", None)
        .await
        .map_err(app_err)?;

    let profile = profiles.get(user_id).await.map_err(app_err)?.unwrap();
    let order_code = format!("OC-{}", Uuid::new_v4());
    let draft = store
        .create_draft(user_id, Some(&car_info_value(&order_code)), None)
        .await
        .map_err(app_err)?;

    let request = SubmitRequest {
        answers: full_answers(),
    };
    let response = service
        .submit(&profile, draft.id, &request)
        .await
        .map_err(app_err)?;
    match response {
        SubmitResponse::Submitted { status, .. } => {
            assert_eq!(status, ApplicationStatus::PendingDocuments.as_str())
        }
        other => panic!("expected submission, got {:?}", other),
    }

    let submitted = store
        .get_by_id(user_id, draft.id)
        .await
        .map_err(app_err)?
        .unwrap();
    assert_eq!(submitted.status, ApplicationStatus::PendingDocuments.as_str());
    assert_eq!(submitted.selected_banks, Some(json!(["BBVA"])));
    assert!(submitted.personal_info_snapshot.is_some());
    assert!(store.has_active_application(user_id).await.map_err(app_err)?);

    // A second draft submitted while the first is still undecided hits
    // the pre-write re-check, as when two tabs race.
    let second = store
        .create_draft(user_id, Some(&car_info_value(&order_code)), None)
        .await
        .map_err(app_err)?;
    let profile = profiles.get(user_id).await.map_err(app_err)?.unwrap();
    match service
        .submit(&profile, second.id, &request)
        .await
        .map_err(app_err)?
    {
        SubmitResponse::ActiveApplicationExists { .. } => {}
        other => panic!("expected active-application rejection, got {:?}", other),
    }

    // A rejected application is terminal, not active, so the applicant
    // can correct and resubmit it.
    store
        .update_status(draft.id, ApplicationStatus::Rejected)
        .await
        .map_err(app_err)?;
    let profile = profiles.get(user_id).await.map_err(app_err)?.unwrap();
    match service
        .submit(&profile, draft.id, &request)
        .await
        .map_err(app_err)?
    {
        SubmitResponse::Submitted { status, .. } => {
            assert_eq!(status, ApplicationStatus::PendingDocuments.as_str())
        }
        other => panic!("expected resubmission, got {:?}", other),
    }

    Ok(())
}
