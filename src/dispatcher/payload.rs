//! Trigger payload built from a call and its debtor.

use serde_json::{Value, json};

use crate::domain::Call;
use crate::provider::{ProviderError, TriggerRequest};

/// Build the provider request for a pending call.
///
/// The debtor must be attached (as `list_pending_calls` does) and carry a
/// non-blank phone number; otherwise the trigger fails with `MissingPhone`.
pub fn build_trigger_request(call: &Call) -> Result<TriggerRequest, ProviderError> {
    let debtor = call.debtor.as_ref().ok_or(ProviderError::MissingPhone)?;

    let phone_number = debtor.phone.trim();
    if phone_number.is_empty() {
        return Err(ProviderError::MissingPhone);
    }

    let invoices: Vec<Value> = debtor
        .invoices
        .iter()
        .map(|invoice| {
            json!({
                "invoice_number": invoice.invoice_number,
                "amount": invoice.amount,
                "currency": invoice.currency,
                "due_date": invoice.due_date,
            })
        })
        .collect();

    let metadata = json!({
        "call_id": call.id,
        "campaign_id": call.campaign_id,
        "attempt": call.attempt,
        "debtor": {
            "id": debtor.id,
            "name": debtor.name,
            "customer_number": debtor.customer_number,
        },
        "invoices": invoices,
        "total_due": round_cents(debtor.total_due()),
        "currency": debtor.currency(),
    });

    Ok(TriggerRequest {
        phone_number: phone_number.to_string(),
        metadata,
    })
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CallStatus, Debtor, Invoice};
    use chrono::Utc;

    fn call_with(debtor: Option<Debtor>) -> Call {
        let now = Utc::now();
        Call {
            id: 11,
            campaign_id: 2,
            debtor_id: 7,
            attempt: 1,
            status: CallStatus::Pending,
            run_id: None,
            triggered_at: None,
            completed_at: None,
            outcome: None,
            duration_secs: None,
            summary: None,
            raw_response: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            debtor,
        }
    }

    fn debtor(phone: &str) -> Debtor {
        Debtor {
            id: 7,
            name: "Grace Hopper".to_string(),
            phone: phone.to_string(),
            customer_number: Some("K-7".to_string()),
            invoices: vec![
                Invoice {
                    id: 1,
                    invoice_number: "R-100".to_string(),
                    amount: 10.1,
                    currency: Some("EUR".to_string()),
                    due_date: Some("2026-02-01".to_string()),
                },
                Invoice {
                    id: 2,
                    invoice_number: "R-101".to_string(),
                    amount: 20.2,
                    currency: None,
                    due_date: None,
                },
            ],
        }
    }

    #[test]
    fn test_build_trigger_request() {
        let request = build_trigger_request(&call_with(Some(debtor(" +491701234567 ")))).unwrap();
        assert_eq!(request.phone_number, "+491701234567");

        let meta = &request.metadata;
        assert_eq!(meta["call_id"], 11);
        assert_eq!(meta["campaign_id"], 2);
        assert_eq!(meta["attempt"], 1);
        assert_eq!(meta["debtor"]["name"], "Grace Hopper");
        assert_eq!(meta["debtor"]["customer_number"], "K-7");
        assert_eq!(meta["invoices"].as_array().unwrap().len(), 2);
        assert_eq!(meta["invoices"][0]["invoice_number"], "R-100");
        assert_eq!(meta["total_due"], 30.3);
        assert_eq!(meta["currency"], "EUR");
    }

    #[test]
    fn test_missing_debtor() {
        let result = build_trigger_request(&call_with(None));
        assert!(matches!(result, Err(ProviderError::MissingPhone)));
    }

    #[test]
    fn test_blank_phone() {
        let result = build_trigger_request(&call_with(Some(debtor("   "))));
        assert!(matches!(result, Err(ProviderError::MissingPhone)));
    }

    #[test]
    fn test_no_invoices() {
        let mut d = debtor("+1555");
        d.invoices.clear();
        let request = build_trigger_request(&call_with(Some(d))).unwrap();
        assert_eq!(request.metadata["total_due"], 0.0);
        assert!(request.metadata["currency"].is_null());
    }
}
