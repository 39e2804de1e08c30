//! Outbound purchase-order body for the warehouse endpoint.
//!
//! Mostly a direct camelCase mapping of [`PurchaseOrder`]. Required fields
//! get explicit defaults when blank, optional fields are omitted instead of
//! sent as `null`, and each row is reduced to four fields.

use crate::model::{PurchaseOrder, PurchaseOrderRow, DEFAULT_CURRENCY, DEFAULT_PAYMENT_TERMS};
use serde::Serialize;

/// Delivery name sent when the order has none.
pub const DEFAULT_DELIVERY_NAME: &str = "Leverans";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FortnoxPurchaseOrder {
    pub supplier_number: String,
    pub delivery_name: String,
    pub delivery_address: String,
    pub delivery_city: String,
    pub delivery_zip_code: String,
    pub order_date: String,
    pub currency_code: String,
    pub currency_rate: f64,
    pub payment_terms_code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub our_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_to_supplier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_center_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_point_code: Option<String>,

    pub rows: Vec<FortnoxPurchaseOrderRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FortnoxPurchaseOrderRow {
    pub item_id: String,
    pub ordered_quantity: f64,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_unit: Option<String>,
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

impl From<&PurchaseOrderRow> for FortnoxPurchaseOrderRow {
    fn from(row: &PurchaseOrderRow) -> Self {
        Self {
            item_id: row.item_id.clone(),
            ordered_quantity: row.ordered_quantity,
            price: row.price.unwrap_or(0.0),
            item_unit: row.item_unit.clone(),
        }
    }
}

impl From<&PurchaseOrder> for FortnoxPurchaseOrder {
    fn from(order: &PurchaseOrder) -> Self {
        Self {
            supplier_number: order.supplier_number.clone(),
            delivery_name: or_default(&order.delivery_name, DEFAULT_DELIVERY_NAME),
            delivery_address: order.delivery_address.clone(),
            delivery_city: order.delivery_city.clone(),
            delivery_zip_code: order.delivery_zip_code.clone(),
            order_date: order.order_date.clone(),
            currency_code: or_default(&order.currency_code, DEFAULT_CURRENCY),
            currency_rate: if order.currency_rate == 0.0 || order.currency_rate.is_nan() {
                1.0
            } else {
                order.currency_rate
            },
            payment_terms_code: or_default(&order.payment_terms_code, DEFAULT_PAYMENT_TERMS),

            delivery_country_code: order.delivery_country_code.clone(),
            delivery_date: order.delivery_date.clone(),
            our_reference: order.our_reference.clone(),
            your_reference: order.your_reference.clone(),
            message_to_supplier: non_empty(&order.message_to_supplier)
                .or_else(|| order.note.clone()),
            cost_center_code: order.cost_center_code.clone(),
            project_id: order.project_id.clone(),
            stock_point_code: order.stock_point_code.clone(),

            rows: order.rows.iter().map(FortnoxPurchaseOrderRow::from).collect(),
        }
    }
}
