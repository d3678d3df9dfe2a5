//! The fixed extraction instruction sent with every document image.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tightening a formatting rule or adding a
//!    field requires editing exactly one place, and the schema keys below
//!    must stay in lock-step with [`crate::record::InvoiceRecord`].
//!
//! 2. **Testability** — unit tests can assert the prompt still names every
//!    schema key without calling a real model.
//!
//! Callers can override via [`crate::config::ExtractionConfigBuilder::prompt`];
//! the constant here is used when no override is provided.
//!
//! The response parser is built to tolerate violations of these rules (fence
//! wrapping, prose preambles, truncation), not to assume compliance.

/// Default extraction prompt.
///
/// Mandates the exact camelCase JSON schema, verbatim transcription of
/// non-Latin scripts, numeric-string money fields, ISO dates, and no
/// markdown wrapping.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are an expert invoice data extractor. Analyze the invoice image and return the extracted data as a single JSON object.

Follow these rules precisely:

1. SCHEMA
   Return exactly this JSON structure, with every key present:
   {
     "invoiceNo": "",
     "invoiceDate": "",
     "dueDate": "",
     "paymentTerms": "",
     "vendorName": "",
     "vendorAddress": "",
     "billToName": "",
     "billToAddress": "",
     "amount": "",
     "currency": "",
     "taxAmount": "",
     "poNumber": "",
     "notes": "",
     "bankDetails": "",
     "lineItems": [
       { "description": "", "quantity": "", "unitPrice": "", "amount": "" }
     ]
   }

2. TEXT PRESERVATION
   - Extract ALL visible text relevant to each field, exactly as printed
   - Keep non-Latin scripts (Chinese, Japanese, Korean, Cyrillic, Arabic, ...) verbatim — do NOT translate or transliterate
   - Use an empty string "" for any field not present on the invoice — never omit a key, never use null

3. FORMATTING
   - Money fields (amount, taxAmount, unitPrice): numeric strings without currency symbols or thousands separators, e.g. "1234.50"
   - currency: the ISO 4217 code when identifiable, e.g. "USD", "EUR", "JPY"
   - Dates (invoiceDate, dueDate): ISO format YYYY-MM-DD when the date is unambiguous; otherwise as printed

4. OUTPUT FORMAT
   - Output ONLY the JSON object
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary or explanations before or after the JSON"#;
