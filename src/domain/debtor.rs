//! Debtor and invoice records
//!
//! Read-only inputs to the trigger payload. The dispatcher never mutates them.

use serde::{Deserialize, Serialize};

pub type DebtorId = i64;

/// A person to be called, with the invoices they owe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Debtor {
    pub id: DebtorId,
    pub name: String,
    pub phone: String,
    pub customer_number: Option<String>,
    pub invoices: Vec<Invoice>,
}

impl Debtor {
    /// Sum of all open invoice amounts.
    pub fn total_due(&self) -> f64 {
        self.invoices.iter().map(|i| i.amount).sum()
    }

    /// Currency of the first invoice, if any carry one.
    pub fn currency(&self) -> Option<&str> {
        self.invoices.iter().find_map(|i| i.currency.as_deref())
    }
}

/// One open invoice belonging to a debtor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub amount: f64,
    pub currency: Option<String>,
    /// ISO-8601 date as imported
    pub due_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(number: &str, amount: f64, currency: Option<&str>) -> Invoice {
        Invoice {
            id: 0,
            invoice_number: number.to_string(),
            amount,
            currency: currency.map(String::from),
            due_date: None,
        }
    }

    #[test]
    fn test_total_due_sums_invoices() {
        let debtor = Debtor {
            id: 1,
            name: "Ada Lovelace".to_string(),
            phone: "+4915112345678".to_string(),
            customer_number: None,
            invoices: vec![invoice("R-1", 120.5, Some("EUR")), invoice("R-2", 79.5, None)],
        };
        assert!((debtor.total_due() - 200.0).abs() < f64::EPSILON);
        assert_eq!(debtor.currency(), Some("EUR"));
    }

    #[test]
    fn test_no_invoices() {
        let debtor = Debtor {
            id: 1,
            name: "Ada".to_string(),
            phone: "+1".to_string(),
            customer_number: None,
            invoices: Vec::new(),
        };
        assert_eq!(debtor.total_due(), 0.0);
        assert!(debtor.currency().is_none());
    }
}
