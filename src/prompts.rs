//! Instruction prompt for purchase-order extraction.
//!
//! The prompt spells out the exact JSON shape of [`crate::model::ExtractedData`]
//! and the defaulting rules the model must apply itself. Keeping it here lets
//! unit tests assert on the contract without calling a model.
//!
//! Callers can override it via [`crate::config::ExtractionConfig::system_prompt`].

/// Build the default system prompt.
///
/// `today` is the ISO date substituted when the document carries no order
/// date.
pub fn extraction_system_prompt(today: &str) -> String {
    format!(
        r#"You are an expert at extracting data from purchase orders using OCR.
Analyse the image of the purchase order carefully and extract all relevant information.
Return the data as a single JSON object with exactly this shape:

{{
  "purchaseOrder": {{
    "supplierNumber": "Supplier number",
    "supplierName": "Supplier name",
    "supplierAddress": "Supplier street address",
    "supplierAddress2": "Supplier address line 2",
    "supplierCity": "Supplier city",
    "supplierPostCode": "Supplier postal code",
    "supplierCountryCode": "Country code (SE, NO, ...)",
    "supplierEmail": "Supplier e-mail",

    "deliveryName": "Delivery name / recipient",
    "deliveryAddress": "Delivery street address",
    "deliveryAddress2": "Delivery address line 2",
    "deliveryCity": "Delivery city",
    "deliveryZipCode": "Delivery postal code",
    "deliveryCountryCode": "Delivery country code",
    "deliveryDate": "Delivery date (YYYY-MM-DD)",

    "orderDate": "Order date (YYYY-MM-DD)",
    "currencyCode": "Currency code (SEK, EUR, USD, ...)",
    "currencyRate": 1.0,
    "paymentTermsCode": "Payment terms (e.g. 30)",

    "ourReference": "Our reference",
    "yourReference": "Your reference",
    "messageToSupplier": "Message to the supplier",
    "note": "Internal note",

    "rows": [
      {{
        "itemId": "Article number / SKU (REQUIRED)",
        "itemDescription": "Article description",
        "orderedQuantity": 1,
        "itemUnit": "Unit (pcs, kg, m, ...)",
        "price": 100.00,
        "currencyCode": "Currency code (same as the order)"
      }}
    ]
  }},
  "confidence": 0.95
}}

RULES:
- supplierNumber, deliveryName, deliveryAddress, deliveryCity, deliveryZipCode, orderDate, currencyCode, currencyRate and paymentTermsCode are REQUIRED
- For every row, itemId, orderedQuantity and currencyCode are REQUIRED
- If orderDate is missing, use today's date: {today}
- If currencyCode is missing, use "SEK"
- If currencyRate is missing, use 1.0
- If paymentTermsCode is missing, use "30"
- If deliveryName is missing, use the same value as supplierName
- If the delivery address is missing, use the supplier address
- Set every row's currencyCode to the order's currencyCode
- If a field is missing or unclear, make a reasonable guess or leave it empty
- Set confidence between 0 and 1 according to how certain you are of the extraction
- Read every number and every piece of text with great care
- Output ONLY the JSON object, without code fences or commentary"#
    )
}
