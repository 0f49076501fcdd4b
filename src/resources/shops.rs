//! Shops: owner and geo-radius filters, attached files on create.

use super::{attachments, int_filter};
use crate::error::{AppError, FieldErrors};
use crate::query::QueryParams;
use crate::schema::{OwnerType, Row};
use crate::service::{HookContext, ResourceHooks};
use crate::store::{GeoPoint, Predicate, Query};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Half the earth's circumference; no two points are farther apart.
pub const MAX_RADIUS_KM: f64 = 20_037.5;

#[derive(Clone, Copy, Debug, Default)]
pub struct ShopHooks;

/// Parse `lat`, `lng`, `radius` (km). All three must be present for the filter to apply.
pub fn radius_filter(params: &QueryParams) -> Result<Option<(GeoPoint, f64)>, AppError> {
    let (Some(lat), Some(lng), Some(radius)) = (params.single("lat"), params.single("lng"), params.single("radius")) else {
        return Ok(None);
    };
    let mut errors = FieldErrors::new();
    let mut number = |key: &str, attr: &str, raw: &str, ok: &dyn Fn(f64) -> bool, range: &str| -> f64 {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() && ok(n) => n,
            Ok(n) if n.is_finite() => {
                errors.add(key, format!("The {} field must be {}.", attr, range));
                0.0
            }
            _ => {
                errors.add(key, format!("The {} field must be a number.", attr));
                0.0
            }
        }
    };
    let lat = number("lat", "latitude", lat, &|n| (-90.0..=90.0).contains(&n), "between -90 and 90");
    let lng = number("lng", "longitude", lng, &|n| (-180.0..=180.0).contains(&n), "between -180 and 180");
    let radius = number(
        "radius",
        "radius",
        radius,
        &|n| n > 0.0 && n <= MAX_RADIUS_KM,
        "greater than 0 and at most 20037.5",
    );
    if errors.is_empty() {
        Ok(Some((GeoPoint { lat, lng }, radius)))
    } else {
        Err(AppError::Validation(errors))
    }
}

#[async_trait]
impl ResourceHooks for ShopHooks {
    fn apply_filters(&self, query: &mut Query, params: &QueryParams, _today: NaiveDate) -> Result<(), AppError> {
        if let Some(p) = int_filter(params, "user_id") {
            query.push(p);
        }
        if let Some((origin, radius_km)) = radius_filter(params)? {
            query.push(Predicate::WithinRadius {
                column: "geo".into(),
                origin,
                radius_km,
            });
        }
        Ok(())
    }

    async fn before_create(&self, _ctx: &HookContext<'_>, data: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        attachments::validate(&data)?;
        Ok(data)
    }

    async fn after_create(&self, ctx: &HookContext<'_>, row: &Row, data: &Map<String, Value>) -> Result<(), AppError> {
        attachments::attach(ctx.store, OwnerType::Shop, row.id, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn radius_needs_all_three_params() {
        assert!(radius_filter(&params(&[("lat", "10"), ("lng", "20")])).unwrap().is_none());
        let (p, r) = radius_filter(&params(&[("lat", "10"), ("lng", "20"), ("radius", "5")])).unwrap().unwrap();
        assert_eq!((p.lat, p.lng, r), (10.0, 20.0, 5.0));
    }

    #[test]
    fn out_of_range_values_are_422() {
        for bad in [
            [("lat", "91"), ("lng", "0"), ("radius", "1")],
            [("lat", "0"), ("lng", "-181"), ("radius", "1")],
            [("lat", "0"), ("lng", "0"), ("radius", "0")],
            [("lat", "0"), ("lng", "0"), ("radius", "20038")],
            [("lat", "north"), ("lng", "0"), ("radius", "1")],
        ] {
            assert!(matches!(radius_filter(&params(&bad)), Err(AppError::Validation(_))), "{:?}", bad);
        }
    }
}
