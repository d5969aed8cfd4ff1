//! Inventory lookups and the car_info snapshot taken at selection time.

use crate::errors::{AppError, ResultExt};
use crate::models::{CarInfo, Vehicle};
use sqlx::PgPool;

pub struct VehicleStore {
    pool: PgPool,
}

impl VehicleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Looks up a vehicle by its purchase-order code. Unknown codes are
    /// not an error; the wizard simply starts without a selection.
    pub async fn get_by_order_code(&self, order_code: &str) -> Result<Option<Vehicle>, AppError> {
        if order_code.trim().is_empty() {
            return Ok(None);
        }
        let vehicle = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT order_code, title, price, min_down_payment, recommended_down_payment,
                   recommended_monthly_payment, max_term_months, feature_image
            FROM inventory_vehicles
            WHERE order_code = $1
            "#,
        )
        .bind(order_code)
        .fetch_optional(&self.pool)
        .await
        .context("fetching vehicle by order code")?;
        Ok(vehicle)
    }
}

impl CarInfo {
    /// Snapshot of the catalog row at selection time. Later catalog edits
    /// must not retroactively alter an in-flight application, so every
    /// field the wizard needs is copied here.
    pub fn from_vehicle(vehicle: &Vehicle) -> Self {
        Self {
            vehicle_title: vehicle.title.clone(),
            order_code: vehicle.order_code.clone(),
            feature_image: vehicle.feature_image.clone(),
            price: vehicle.price.clone(),
            min_down_payment: vehicle.min_down_payment.clone(),
            recommended_down_payment: vehicle.recommended_down_payment.clone(),
            recommended_monthly_payment: vehicle.recommended_monthly_payment.clone(),
            max_term_months: vehicle.max_term_months,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    #[test]
    fn test_snapshot_copies_every_field() {
        let vehicle = Vehicle {
            order_code: "OC-1042".to_string(),
            title: "Mazda 3 2022".to_string(),
            price: BigDecimal::from_str("300000").unwrap(),
            min_down_payment: Some(BigDecimal::from_str("75000").unwrap()),
            recommended_down_payment: Some(BigDecimal::from_str("90000").unwrap()),
            recommended_monthly_payment: Some(BigDecimal::from_str("7200").unwrap()),
            max_term_months: Some(60),
            feature_image: Some("https://cdn.example.com/mazda3.jpg".to_string()),
        };
        let snapshot = CarInfo::from_vehicle(&vehicle);
        assert_eq!(snapshot.order_code, "OC-1042");
        assert_eq!(snapshot.vehicle_title, "Mazda 3 2022");
        assert_eq!(snapshot.price, vehicle.price);
        assert_eq!(snapshot.min_down_payment, vehicle.min_down_payment);
        assert_eq!(snapshot.max_term_months, Some(60));
    }
}
