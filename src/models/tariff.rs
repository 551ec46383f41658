use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::driver::VehicleClass;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tariff {
    pub base_rate: f64,
    pub per_km: f64,
    #[serde(default)]
    pub per_minute: Option<f64>,
    pub average_speed_kmh: f64,
}

impl Tariff {
    pub fn new(base_rate: f64, per_km: f64, average_speed_kmh: f64) -> Result<Self, AppError> {
        let tariff = Self {
            base_rate,
            per_km,
            per_minute: None,
            average_speed_kmh,
        };
        tariff.validate()?;
        Ok(tariff)
    }

    pub fn with_per_minute(mut self, per_minute: f64) -> Result<Self, AppError> {
        self.per_minute = Some(per_minute);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let rates = [self.base_rate, self.per_km, self.per_minute.unwrap_or(0.0)];
        if rates.iter().any(|rate| !rate.is_finite() || *rate < 0.0) {
            return Err(AppError::BadRequest(
                "tariff rates must be finite and non-negative".to_string(),
            ));
        }

        if !self.average_speed_kmh.is_finite() || self.average_speed_kmh <= 0.0 {
            return Err(AppError::BadRequest(
                "tariff average speed must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffTable {
    pub currency: String,
    pub tricycle: Tariff,
    pub motorcycle: Tariff,
    pub van: Tariff,
    pub private_car: Tariff,
}

impl TariffTable {
    pub fn for_class(&self, class: VehicleClass) -> &Tariff {
        match class {
            VehicleClass::Tricycle => &self.tricycle,
            VehicleClass::Motorcycle => &self.motorcycle,
            VehicleClass::Van => &self.van,
            VehicleClass::PrivateCar => &self.private_car,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

impl Default for TariffTable {
    fn default() -> Self {
        let tariff = |base_rate, per_km, average_speed_kmh| Tariff {
            base_rate,
            per_km,
            per_minute: None,
            average_speed_kmh,
        };

        Self {
            currency: "PHP".to_string(),
            tricycle: tariff(20.0, 10.0, 30.0),
            motorcycle: tariff(15.0, 8.0, 50.0),
            van: tariff(100.0, 15.0, 60.0),
            private_car: tariff(50.0, 12.0, 70.0),
        }
    }
}
