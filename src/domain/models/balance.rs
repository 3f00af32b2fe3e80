#[cfg(test)]
#[path = "balance_test.rs"]
mod tests;

use std::fmt;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;

const COST_PER_THOUSAND_TOKENS: f64 = 0.002;

/// Account balance as reported by the API. A missing or malformed field is
/// `Unknown`, never zero.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum Balance {
    Known(f64),
    #[default]
    Unknown,
}

impl Balance {
    pub fn from_value(body: &Value) -> Balance {
        let field = match body.get("balance") {
            Some(field) => field,
            None => return Balance::Unknown,
        };

        if let Some(amount) = field.as_f64() {
            return Balance::Known(amount);
        }

        if let Some(amount) = field.as_str().and_then(|e| return e.trim().parse::<f64>().ok()) {
            if amount.is_finite() {
                return Balance::Known(amount);
            }
        }

        return Balance::Unknown;
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balance::Known(amount) => return write!(f, "Balance: {amount}"),
            Balance::Unknown => return write!(f, "Balance: unknown"),
        }
    }
}

/// Token usage attached to non-streaming completions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    pub fn estimated_cost(&self) -> f64 {
        return (self.total_tokens as f64 / 1000.0) * COST_PER_THOUSAND_TOKENS;
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(
            f,
            "Tokens: {}, Cost: ${:.4}",
            self.total_tokens,
            self.estimated_cost()
        );
    }
}
