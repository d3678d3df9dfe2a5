//! The canonical invoice record and the coercion step that produces it.
//!
//! ## Why a total mapping?
//!
//! Downstream consumers (review forms, spreadsheet export) index the record
//! by field name. A record where `taxAmount` is sometimes missing forces
//! every consumer to null-check fourteen fields. Instead the record is a
//! *total* mapping: every scalar key is always present, absence is the empty
//! string, and `coerce` never fails — malformed model output degrades into
//! empty-looking cells, not errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed scalar field keys, in canonical order.
///
/// This is the exact key set the extraction prompt mandates; [`coerce`]
/// plucks each one from the parsed model output.
pub const SCALAR_FIELDS: [&str; 14] = [
    "invoiceNo",
    "invoiceDate",
    "dueDate",
    "paymentTerms",
    "vendorName",
    "vendorAddress",
    "billToName",
    "billToAddress",
    "amount",
    "currency",
    "taxAmount",
    "poNumber",
    "notes",
    "bankDetails",
];

/// One row of an invoice's itemised charges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineItem {
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub amount: String,
}

/// A fully coerced invoice record.
///
/// Every scalar field is always present; `""` means absent/unknown.
/// Serialises to the same camelCase keys the extraction prompt requests,
/// so `coerce(serde_json::to_value(record))` round-trips exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceRecord {
    pub invoice_no: String,
    pub invoice_date: String,
    pub due_date: String,
    pub payment_terms: String,
    pub vendor_name: String,
    pub vendor_address: String,
    pub bill_to_name: String,
    pub bill_to_address: String,
    pub amount: String,
    pub currency: String,
    pub tax_amount: String,
    pub po_number: String,
    pub notes: String,
    pub bank_details: String,
    pub line_items: Vec<LineItem>,
}

/// Map a parsed model response onto the fixed invoice schema.
///
/// Pure and total: never fails, never panics. Scalars take the value at the
/// expected key when it is a non-empty string; numbers and booleans are
/// stringified (models emit bare numbers for money fields often enough that
/// dropping them would lose real data); null, missing, and composite values
/// become `""`. `lineItems` must be array-shaped or it becomes `[]`; each
/// element is coerced per-field with the same scalar rule, so a malformed
/// entry surfaces as empty cells rather than an error.
pub fn coerce(parsed: &Value) -> InvoiceRecord {
    let field = |key: &str| scalar(parsed.get(key));

    let line_items = match parsed.get("lineItems") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| LineItem {
                description: scalar(item.get("description")),
                quantity: scalar(item.get("quantity")),
                unit_price: scalar(item.get("unitPrice")),
                amount: scalar(item.get("amount")),
            })
            .collect(),
        _ => Vec::new(),
    };

    InvoiceRecord {
        invoice_no: field("invoiceNo"),
        invoice_date: field("invoiceDate"),
        due_date: field("dueDate"),
        payment_terms: field("paymentTerms"),
        vendor_name: field("vendorName"),
        vendor_address: field("vendorAddress"),
        bill_to_name: field("billToName"),
        bill_to_address: field("billToAddress"),
        amount: field("amount"),
        currency: field("currency"),
        tax_amount: field("taxAmount"),
        po_number: field("poNumber"),
        notes: field("notes"),
        bank_details: field("bankDetails"),
        line_items,
    }
}

/// Coerce a single JSON value into a scalar cell.
fn scalar(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        // Arrays/objects in a scalar slot are model noise, not data.
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_empty_object_is_total() {
        let record = coerce(&json!({}));
        assert_eq!(record.invoice_no, "");
        assert_eq!(record.bank_details, "");
        assert!(record.line_items.is_empty());
        assert_eq!(record, InvoiceRecord::default());
    }

    #[test]
    fn coerce_non_object_is_total() {
        assert_eq!(coerce(&json!(null)), InvoiceRecord::default());
        assert_eq!(coerce(&json!([1, 2, 3])), InvoiceRecord::default());
        assert_eq!(coerce(&json!("just a string")), InvoiceRecord::default());
    }

    #[test]
    fn coerce_picks_known_fields() {
        let record = coerce(&json!({
            "invoiceNo": "INV-9",
            "amount": "42.00",
            "currency": "EUR",
            "unknownKey": "ignored",
        }));
        assert_eq!(record.invoice_no, "INV-9");
        assert_eq!(record.amount, "42.00");
        assert_eq!(record.currency, "EUR");
        assert_eq!(record.vendor_name, "");
    }

    #[test]
    fn coerce_stringifies_numbers_and_bools() {
        let record = coerce(&json!({ "amount": 42.5, "taxAmount": 7, "notes": true }));
        assert_eq!(record.amount, "42.5");
        assert_eq!(record.tax_amount, "7");
        assert_eq!(record.notes, "true");
    }

    #[test]
    fn coerce_composite_scalar_becomes_empty() {
        let record = coerce(&json!({ "vendorName": {"nested": "x"}, "amount": [1, 2] }));
        assert_eq!(record.vendor_name, "");
        assert_eq!(record.amount, "");
    }

    #[test]
    fn coerce_line_items_array() {
        let record = coerce(&json!({
            "lineItems": [
                { "description": "Widget", "quantity": "2", "unitPrice": "10.00", "amount": "20.00" },
                { "description": "Gadget" },
            ]
        }));
        assert_eq!(record.line_items.len(), 2);
        assert_eq!(record.line_items[0].unit_price, "10.00");
        assert_eq!(record.line_items[1].description, "Gadget");
        assert_eq!(record.line_items[1].amount, "");
    }

    #[test]
    fn coerce_non_array_line_items_becomes_empty() {
        let record = coerce(&json!({ "lineItems": "not an array" }));
        assert!(record.line_items.is_empty());
        let record = coerce(&json!({ "lineItems": { "description": "x" } }));
        assert!(record.line_items.is_empty());
    }

    #[test]
    fn coerce_malformed_line_item_entries_become_empty_cells() {
        let record = coerce(&json!({ "lineItems": ["a bare string", 42, null] }));
        assert_eq!(record.line_items.len(), 3);
        for item in &record.line_items {
            assert_eq!(*item, LineItem::default());
        }
    }

    #[test]
    fn coerce_is_idempotent_through_serde() {
        let record = coerce(&json!({
            "invoiceNo": "FA/2024/001",
            "vendorName": "Örsted GmbH",
            "amount": "1999.99",
            "lineItems": [
                { "description": "請求書の項目", "quantity": "1", "unitPrice": "1999.99", "amount": "1999.99" }
            ]
        }));
        let round_tripped = serde_json::to_value(&record).expect("record serialises");
        assert_eq!(coerce(&round_tripped), record);
    }

    #[test]
    fn serialised_record_contains_every_scalar_key() {
        let value = serde_json::to_value(InvoiceRecord::default()).expect("serialises");
        let obj = value.as_object().expect("record is an object");
        for key in SCALAR_FIELDS {
            assert!(obj.contains_key(key), "missing key {key}");
            assert_eq!(obj[key], "", "key {key} should default to empty string");
        }
        assert!(obj["lineItems"].as_array().expect("array").is_empty());
    }
}
