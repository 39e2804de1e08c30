//! Purchase-order data contracts shared by the extractor, the queue and the
//! gateway.
//!
//! The JSON shape is camelCase on the wire, matching both the instruction
//! prompt given to the vision model and the body accepted by
//! `POST /api/fortnox/purchase-order`. Optional fields are skipped when
//! serialising rather than sent as `null`.

use serde::{Deserialize, Serialize};

/// Currency used when neither the document nor the user supplies one.
pub const DEFAULT_CURRENCY: &str = "SEK";

/// Payment terms used when none are given (30 days net).
pub const DEFAULT_PAYMENT_TERMS: &str = "30";

/// Exchange rate used when none is given.
pub const DEFAULT_CURRENCY_RATE: f64 = 1.0;

/// One line of a purchase order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchaseOrderRow {
    /// Supplier article number / SKU. Required.
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_description: Option<String>,
    /// Required.
    pub ordered_quantity: f64,
    /// Falls back to `ordered_quantity` at submission time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ordered_quantity: Option<f64>,
    /// Falls back to 0 at submission time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_unit: Option<String>,
    /// Required on submission; filled from the order when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_center_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_point_code: Option<String>,
}

/// A purchase order as extracted from a document and edited by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchaseOrder {
    // Supplier
    pub supplier_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_address2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_post_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_email: Option<String>,

    // Delivery
    pub delivery_name: String,
    pub delivery_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address2: Option<String>,
    pub delivery_city: String,
    pub delivery_zip_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,

    // Order
    /// ISO date, `YYYY-MM-DD`.
    pub order_date: String,
    pub currency_code: String,
    pub currency_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_unit: Option<f64>,
    pub payment_terms_code: String,

    // References
    #[serde(skip_serializing_if = "Option::is_none")]
    pub our_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_reference: Option<String>,

    // Misc
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_to_supplier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_center_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_point_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,

    pub rows: Vec<PurchaseOrderRow>,
}

impl Default for PurchaseOrder {
    fn default() -> Self {
        Self {
            supplier_number: String::new(),
            supplier_name: None,
            supplier_address: None,
            supplier_address2: None,
            supplier_city: None,
            supplier_post_code: None,
            supplier_country_code: None,
            supplier_email: None,
            delivery_name: String::new(),
            delivery_address: String::new(),
            delivery_address2: None,
            delivery_city: String::new(),
            delivery_zip_code: String::new(),
            delivery_country_code: None,
            delivery_date: None,
            order_date: String::new(),
            currency_code: DEFAULT_CURRENCY.to_string(),
            currency_rate: DEFAULT_CURRENCY_RATE,
            currency_unit: None,
            payment_terms_code: DEFAULT_PAYMENT_TERMS.to_string(),
            our_reference: None,
            your_reference: None,
            internal_reference: None,
            message_to_supplier: None,
            note: None,
            confirmation_email: None,
            cost_center_code: None,
            project_id: None,
            stock_point_code: None,
            language_code: None,
            rows: Vec::new(),
        }
    }
}

impl PurchaseOrder {
    /// Copy of this order ready for submission.
    ///
    /// Rows without a currency take the order's currency, and rows without a
    /// remaining quantity take their ordered quantity. Empty strings and a
    /// zero remaining quantity count as absent.
    pub fn normalized(&self) -> PurchaseOrder {
        let mut order = self.clone();
        let currency = order.currency_code.clone();
        for row in &mut order.rows {
            if row.currency_code.as_deref().map_or(true, str::is_empty) {
                row.currency_code = Some(currency.clone());
            }
            if row.remaining_ordered_quantity.map_or(true, |q| q == 0.0) {
                row.remaining_ordered_quantity = Some(row.ordered_quantity);
            }
        }
        order
    }
}

/// Output of one successful extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedData {
    pub purchase_order: PurchaseOrder,
    /// Model self-reported certainty in `[0, 1]`.
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_order_takes_defaults() {
        let order: PurchaseOrder = serde_json::from_value(json!({
            "supplierNumber": "1001",
            "rows": [{ "itemId": "A-1", "orderedQuantity": 4 }]
        }))
        .unwrap();

        assert_eq!(order.currency_code, "SEK");
        assert_eq!(order.currency_rate, 1.0);
        assert_eq!(order.payment_terms_code, "30");
        assert_eq!(order.rows[0].ordered_quantity, 4.0);
        assert_eq!(order.rows[0].currency_code, None);
    }

    #[test]
    fn normalized_rows_follow_order_currency() {
        let order = PurchaseOrder {
            currency_code: "EUR".into(),
            rows: vec![
                PurchaseOrderRow {
                    item_id: "A".into(),
                    ordered_quantity: 2.0,
                    ..Default::default()
                },
                PurchaseOrderRow {
                    item_id: "B".into(),
                    ordered_quantity: 5.0,
                    currency_code: Some(String::new()),
                    remaining_ordered_quantity: Some(3.0),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let normalized = order.normalized();
        assert!(normalized
            .rows
            .iter()
            .all(|r| r.currency_code.as_deref() == Some("EUR")));
        assert_eq!(normalized.rows[0].remaining_ordered_quantity, Some(2.0));
        assert_eq!(normalized.rows[1].remaining_ordered_quantity, Some(3.0));
        // the source order is untouched
        assert_eq!(order.rows[0].currency_code, None);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let value = serde_json::to_value(PurchaseOrder::default()).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("supplierName"));
        assert!(!obj.contains_key("deliveryDate"));
        assert_eq!(obj["currencyCode"], "SEK");
        assert_eq!(obj["rows"], json!([]));
    }

    #[test]
    fn extracted_data_requires_confidence() {
        let err = serde_json::from_value::<ExtractedData>(json!({
            "purchaseOrder": { "supplierNumber": "1" }
        }));
        assert!(err.is_err());
    }
}
