//! Invoice numbers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Externally visible order reference, unique across all orders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for InvoiceNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of fresh invoice numbers.
///
/// No central sequencer exists, so implementations must produce values
/// whose collision probability is negligible across server instances.
pub trait InvoiceNumberGenerator: Send + Sync {
    fn generate(&self) -> InvoiceNumber;
}

/// Generates `INV-<uuid v4>` invoice numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidInvoiceNumbers;

impl InvoiceNumberGenerator for UuidInvoiceNumbers {
    fn generate(&self) -> InvoiceNumber {
        InvoiceNumber(format!("INV-{}", Uuid::new_v4()))
    }
}
