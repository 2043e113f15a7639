//! Inventory endpoints.

use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use racepay_core::types::{Gender, InventoryItem, InventoryKey, Size};
use racepay_web::{AppError, WebResult};
use serde::{Deserialize, Serialize};

/// Counters of one `(size, gender)` row.
#[derive(Debug, Serialize)]
pub struct InventoryView {
    /// Shirt size
    pub size: Size,
    /// Gender cut
    pub gender: Gender,
    /// Total units
    pub stock: u32,
    /// Held by open groups
    pub reserved: u32,
    /// Committed to confirmed groups
    pub assigned: u32,
    /// `stock - reserved - assigned`
    pub available: u32,
}

impl From<InventoryItem> for InventoryView {
    fn from(item: InventoryItem) -> Self {
        Self {
            size: item.key.size,
            gender: item.key.gender,
            stock: item.stock,
            reserved: item.reserved,
            assigned: item.assigned,
            available: item.available(),
        }
    }
}

/// Stock configuration body.
#[derive(Debug, Deserialize)]
pub struct StockUpdate {
    /// New total stock
    pub stock: u32,
}

/// Counters of every row.
pub async fn list_inventory(State(state): State<AppState>) -> WebResult<Json<Vec<InventoryView>>> {
    let items = state.ledger.items().await?;
    Ok(Json(items.into_iter().map(InventoryView::from).collect()))
}

/// Create or resize a row.
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/inventory/M/F -d '{"stock": 120}' -H 'Content-Type: application/json'
/// ```
pub async fn configure_stock(
    State(state): State<AppState>,
    Path((size, gender)): Path<(String, String)>,
    Json(update): Json<StockUpdate>,
) -> WebResult<Json<InventoryView>> {
    let size: Size = size.parse().map_err(|e| AppError::validation(format!("{e}")))?;
    let gender: Gender = gender.parse().map_err(|e| AppError::validation(format!("{e}")))?;

    let item = state
        .ledger
        .configure(InventoryKey::new(size, gender), update.stock)
        .await?;

    tracing::info!(key = %item.key, stock = item.stock, "Stock configured");
    Ok(Json(item.into()))
}
