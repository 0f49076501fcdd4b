//! News: creator, date-range and publication filters; attached files follow the item.

use super::{attachments, int_filter};
use crate::error::{AppError, FieldErrors};
use crate::query::date::parse_date;
use crate::query::{ParamValue, QueryParams};
use crate::schema::{parse_bool, ColumnType, OwnerType, Row};
use crate::service::{HookContext, ResourceHooks};
use crate::store::{Predicate, Query};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, Default)]
pub struct NewsHooks;

fn date_range(params: &QueryParams, today: NaiveDate) -> Result<Option<(NaiveDate, NaiveDate)>, AppError> {
    let (Some(from), Some(to)) = (params.filled("date_from"), params.filled("date_to")) else {
        return Ok(None);
    };
    let mut errors = FieldErrors::new();
    let from = parse_date(from, today);
    let to = parse_date(to, today);
    if from.is_none() {
        errors.add("date_from", "The date from field must be a valid date.");
    }
    if to.is_none() {
        errors.add("date_to", "The date to field must be a valid date.");
    }
    match (from, to) {
        (Some(f), Some(t)) => Ok(Some((f, t))),
        _ => Err(AppError::Validation(errors)),
    }
}

#[async_trait]
impl ResourceHooks for NewsHooks {
    fn apply_filters(&self, query: &mut Query, params: &QueryParams, today: NaiveDate) -> Result<(), AppError> {
        match params.get("created_by") {
            Some(ParamValue::List(ids)) => {
                let values = ids
                    .iter()
                    .filter_map(|id| ColumnType::BigInt.coerce(&Value::String(id.clone())))
                    .filter(|v| !v.is_null())
                    .collect();
                query.push(Predicate::is_in("created_by", values));
            }
            Some(ParamValue::Single(_)) => {
                if let Some(p) = int_filter(params, "created_by") {
                    query.push(p);
                }
            }
            None => {}
        }
        if let Some((from, to)) = date_range(params, today)? {
            query.push(Predicate::DateBetween {
                column: "created_at".into(),
                from,
                to,
            });
        }
        if params.has("is_published") {
            let published = params.single("is_published").and_then(parse_bool).unwrap_or(false);
            query.push(Predicate::eq("is_published", published));
        }
        Ok(())
    }

    async fn before_create(&self, _ctx: &HookContext<'_>, data: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        attachments::validate(&data)?;
        Ok(data)
    }

    async fn after_create(&self, ctx: &HookContext<'_>, row: &Row, data: &Map<String, Value>) -> Result<(), AppError> {
        attachments::attach(ctx.store, OwnerType::News, row.id, data).await?;
        Ok(())
    }

    async fn after_delete(&self, ctx: &HookContext<'_>, row: &Row) -> Result<(), AppError> {
        let removed = attachments::detach_all(ctx.store, OwnerType::News, row.id).await?;
        tracing::debug!(news_id = row.id, removed, "removed news files");
        Ok(())
    }
}
