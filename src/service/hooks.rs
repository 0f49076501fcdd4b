//! Per-resource extension points around the generic pipeline.

use crate::auth::Caller;
use crate::error::AppError;
use crate::query::QueryParams;
use crate::schema::Row;
use crate::store::{Query, Store};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// What a hook may use besides its arguments.
pub struct HookContext<'a> {
    pub store: &'a dyn Store,
    pub caller: Option<&'a Caller>,
}

/// Every method defaults to identity / no-op. `before_*` hooks must not persist anything;
/// `after_*` hooks run once the row is stored and may write related rows.
#[async_trait]
pub trait ResourceHooks: Send + Sync {
    /// Resource-specific query filters on top of search. Invalid filter input is a 422.
    fn apply_filters(&self, _query: &mut Query, _params: &QueryParams, _today: NaiveDate) -> Result<(), AppError> {
        Ok(())
    }

    async fn before_create(&self, _ctx: &HookContext<'_>, data: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        Ok(data)
    }

    /// `data` is the validated input, including non-column fields such as attachments.
    async fn after_create(&self, _ctx: &HookContext<'_>, _row: &Row, _data: &Map<String, Value>) -> Result<(), AppError> {
        Ok(())
    }

    async fn before_update(
        &self,
        _ctx: &HookContext<'_>,
        _existing: &Row,
        data: Map<String, Value>,
    ) -> Result<Map<String, Value>, AppError> {
        Ok(data)
    }

    async fn after_update(&self, _ctx: &HookContext<'_>, _row: &Row, _data: &Map<String, Value>) -> Result<(), AppError> {
        Ok(())
    }

    async fn before_delete(&self, _ctx: &HookContext<'_>, _row: &Row) -> Result<(), AppError> {
        Ok(())
    }

    async fn after_delete(&self, _ctx: &HookContext<'_>, _row: &Row) -> Result<(), AppError> {
        Ok(())
    }
}

/// Hooks for resources with no custom behavior.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl ResourceHooks for NoHooks {}
