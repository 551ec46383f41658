use serde::Serialize;

use crate::error::AppError;
use crate::geo::{road_distance_km, GeoPoint};
use crate::models::tariff::Tariff;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FareEstimate {
    /// Road distance, rounded to two decimals.
    pub distance_km: f64,
    pub duration_minutes: u32,
    /// Rounded up to the whole currency unit.
    pub fare: f64,
}

/// Distance, duration and fare between two points under `tariff`.
///
/// There is no live trip trace, so the same estimate is reused as the final
/// fare at completion unless an operator overrides it.
pub fn estimate(
    origin: &GeoPoint,
    destination: &GeoPoint,
    tariff: &Tariff,
) -> Result<FareEstimate, AppError> {
    origin.validate()?;
    destination.validate()?;
    tariff.validate()?;

    let road_km = road_distance_km(origin, destination).max(0.0);
    let raw_minutes = travel_minutes(road_km, tariff);

    let mut fare = tariff.base_rate + road_km * tariff.per_km;
    if let Some(per_minute) = tariff.per_minute {
        fare += raw_minutes * per_minute;
    }

    Ok(FareEstimate {
        distance_km: round_to_cents(road_km),
        duration_minutes: whole_minutes(raw_minutes),
        fare: round_up_to_unit(fare).max(tariff.base_rate),
    })
}

/// Minutes for a vehicle on `tariff` to cover the road distance between two points.
pub fn eta_minutes(from: &GeoPoint, to: &GeoPoint, tariff: &Tariff) -> Result<u32, AppError> {
    from.validate()?;
    to.validate()?;
    tariff.validate()?;

    Ok(whole_minutes(travel_minutes(road_distance_km(from, to), tariff)))
}

fn travel_minutes(road_km: f64, tariff: &Tariff) -> f64 {
    (road_km / tariff.average_speed_kmh * 60.0).max(0.0)
}

fn whole_minutes(minutes: f64) -> u32 {
    minutes.ceil().min(u32::MAX as f64) as u32
}

fn round_up_to_unit(amount: f64) -> f64 {
    // Strip float noise so an exact 35.0000000001 does not become 36.
    ((amount * 1e6).round() / 1e6).ceil()
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{estimate, eta_minutes};
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::tariff::Tariff;

    fn tricycle() -> Tariff {
        Tariff::new(20.0, 10.0, 30.0).unwrap()
    }

    #[test]
    fn short_tricycle_trip_matches_worked_example() {
        let pickup = GeoPoint::new(9.4500, 125.5700);
        let destination = GeoPoint::new(9.4600, 125.5650);

        let result = estimate(&pickup, &destination, &tricycle()).unwrap();

        // 1.240 km straight line, 1.612 km by road.
        assert!((result.distance_km - 1.61).abs() < 0.011);
        assert_eq!(result.fare, 37.0);
        assert_eq!(result.duration_minutes, 4);
    }

    #[test]
    fn same_point_costs_base_rate() {
        let p = GeoPoint::new(9.45, 125.57);
        let result = estimate(&p, &p, &tricycle()).unwrap();

        assert_eq!(result.distance_km, 0.0);
        assert_eq!(result.duration_minutes, 0);
        assert_eq!(result.fare, 20.0);
    }

    #[test]
    fn outputs_stay_non_negative_across_the_globe() {
        let tariff = tricycle();
        let points = [
            GeoPoint::new(-90.0, -180.0),
            GeoPoint::new(90.0, 180.0),
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(9.45, 125.57),
            GeoPoint::new(-33.86, 151.21),
            GeoPoint::new(64.13, -21.9),
        ];

        for a in &points {
            for b in &points {
                let result = estimate(a, b, &tariff).unwrap();
                assert!(result.distance_km >= 0.0);
                assert!(result.fare >= tariff.base_rate);
                assert_eq!(result.fare, result.fare.ceil());
            }
        }
    }

    #[test]
    fn per_minute_component_is_added_when_defined() {
        let pickup = GeoPoint::new(9.4500, 125.5700);
        let destination = GeoPoint::new(9.4600, 125.5650);
        let tariff = tricycle().with_per_minute(2.0).unwrap();

        let without = estimate(&pickup, &destination, &tricycle()).unwrap();
        let with = estimate(&pickup, &destination, &tariff).unwrap();

        // 3.22 raw minutes at 2.0/min on top of 36.12.
        assert_eq!(with.fare, 43.0);
        assert!(with.fare > without.fare);
    }

    #[test]
    fn invalid_coordinates_fail() {
        let ok = GeoPoint::new(9.45, 125.57);
        let bad = GeoPoint::new(95.0, 125.57);

        assert!(matches!(
            estimate(&ok, &bad, &tricycle()),
            Err(AppError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            estimate(&bad, &ok, &tricycle()),
            Err(AppError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn eta_rounds_up() {
        let from = GeoPoint::new(9.4500, 125.5700);
        let to = GeoPoint::new(9.4600, 125.5650);
        assert_eq!(eta_minutes(&from, &to, &tricycle()).unwrap(), 4);
    }
}
