//! Regulatory reporting thresholds and structuring detection.

use super::{SeveritySignal, Tool, ToolError};
use serde_json::{json, Map, Value};

/// Amounts at or above this share of the threshold look like structuring.
const STRUCTURING_RATIO: f64 = 0.9;

/// Reporting threshold per currency code.
pub fn reporting_threshold(currency: &str) -> f64 {
    match currency {
        "USD" | "EUR" | "GBP" => 10_000.0,
        "CHF" => 15_000.0,
        "JPY" => 2_000_000.0,
        _ => 10_000.0,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub struct AmountThresholdTool;

impl AmountThresholdTool {
    pub fn validate(amount: f64, currency: &str, transaction_count_24h: Option<u64>) -> Value {
        let currency = currency.trim().to_uppercase();
        let threshold = reporting_threshold(&currency);

        let mut result = Map::new();
        let mut flags: Vec<String> = Vec::new();
        let mut breached = false;
        let mut structuring = false;
        let mut recommendation = "PROCEED";

        if amount >= threshold {
            breached = true;
            flags.push(format!("EXCEEDS_{}_THRESHOLD", currency));
            recommendation = "FILE_CTR";
            result.insert(
                "report_required".into(),
                json!("Currency Transaction Report (CTR)"),
            );
        }

        let structuring_limit = threshold * STRUCTURING_RATIO;
        if structuring_limit <= amount && amount < threshold {
            structuring = true;
            flags.push("POTENTIAL_STRUCTURING".into());
            recommendation = "MANUAL_REVIEW";
            result.insert(
                "structuring_analysis".into(),
                json!({
                    "amount_percent_of_threshold": round1(amount / threshold * 100.0),
                    "suspicious_reason": "Transaction amount suspiciously close to reporting threshold",
                }),
            );
        }

        if let Some(count) = transaction_count_24h.filter(|c| *c > 3) {
            flags.push("MULTIPLE_TRANSACTIONS_24H".into());
            let aggregate = amount * count as f64;
            if aggregate >= threshold {
                structuring = true;
                flags.push("AGGREGATE_EXCEEDS_THRESHOLD".into());
                recommendation = "FILE_SAR";
                result.insert(
                    "aggregate_analysis".into(),
                    json!({
                        "transaction_count": count,
                        "estimated_aggregate": aggregate,
                    }),
                );
            }
        }

        result.insert("amount".into(), json!(amount));
        result.insert("currency".into(), json!(currency));
        result.insert("threshold".into(), json!(threshold));
        result.insert("threshold_breached".into(), json!(breached));
        result.insert("structuring_suspected".into(), json!(structuring));
        result.insert("flags".into(), json!(flags));
        result.insert("recommendation".into(), json!(recommendation));
        Value::Object(result)
    }
}

impl Tool for AmountThresholdTool {
    fn name(&self) -> &'static str {
        "validate_amount_threshold"
    }

    fn description(&self) -> &'static str {
        "Validates a transaction amount against regulatory reporting thresholds and \
         detects potential structuring just below the threshold."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "amount": {
                    "type": "number",
                    "description": "Transaction amount"
                },
                "currency": {
                    "type": "string",
                    "description": "ISO currency code (USD, EUR, GBP, CHF, JPY). Defaults to USD."
                },
                "transaction_count_24h": {
                    "type": "integer",
                    "description": "Optional number of transactions by the same party in the last 24 hours"
                }
            },
            "required": ["amount"]
        })
    }

    fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let amount = args
            .get("amount")
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::invalid(self.name(), "missing numeric argument 'amount'"))?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(ToolError::invalid(self.name(), "amount must be a non-negative number"));
        }
        let currency = args.get("currency").and_then(Value::as_str).unwrap_or("USD");
        let count = match args.get("transaction_count_24h") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_u64().ok_or_else(|| {
                ToolError::invalid(self.name(), "transaction_count_24h must be a non-negative integer")
            })?),
        };
        Ok(Self::validate(amount, currency, count))
    }

    fn severity(&self, output: &Value) -> Option<SeveritySignal> {
        if output["recommendation"] == "FILE_SAR" {
            Some(SeveritySignal::new(80, "AGGREGATE_EXCEEDS_THRESHOLD"))
        } else if output["structuring_suspected"].as_bool() == Some(true) {
            Some(SeveritySignal::new(70, "POTENTIAL_STRUCTURING"))
        } else if output["threshold_breached"].as_bool() == Some(true) {
            Some(SeveritySignal::new(60, "THRESHOLD_BREACH"))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_proceeds() {
        let result = AmountThresholdTool::validate(2_500.0, "usd", None);
        assert_eq!(result["currency"], "USD");
        assert_eq!(result["recommendation"], "PROCEED");
        assert!(AmountThresholdTool.severity(&result).is_none());
    }

    #[test]
    fn test_breach_files_ctr() {
        let result = AmountThresholdTool::validate(12_000.0, "EUR", None);
        assert_eq!(result["threshold_breached"], true);
        assert_eq!(result["flags"][0], "EXCEEDS_EUR_THRESHOLD");
        assert_eq!(result["recommendation"], "FILE_CTR");
        assert_eq!(AmountThresholdTool.severity(&result).unwrap().factor, "THRESHOLD_BREACH");
    }

    #[test]
    fn test_structuring_band() {
        let result = AmountThresholdTool::validate(9_500.0, "USD", None);
        assert_eq!(result["structuring_suspected"], true);
        assert_eq!(result["structuring_analysis"]["amount_percent_of_threshold"], 95.0);
        assert_eq!(AmountThresholdTool.severity(&result).unwrap().score, 70);
    }

    #[test]
    fn test_aggregate_files_sar() {
        let result = AmountThresholdTool::validate(3_000.0, "USD", Some(5));
        assert_eq!(result["recommendation"], "FILE_SAR");
        assert_eq!(result["aggregate_analysis"]["estimated_aggregate"], 15_000.0);
        assert_eq!(AmountThresholdTool.severity(&result).unwrap().score, 80);
    }

    #[test]
    fn test_chf_and_unknown_currency() {
        assert_eq!(reporting_threshold("CHF"), 15_000.0);
        assert_eq!(reporting_threshold("XYZ"), 10_000.0);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(AmountThresholdTool.execute(&json!({"currency": "USD"})).is_err());
        assert!(AmountThresholdTool.execute(&json!({"amount": -1})).is_err());
        assert!(AmountThresholdTool
            .execute(&json!({"amount": 10, "transaction_count_24h": "many"}))
            .is_err());
        assert!(AmountThresholdTool.execute(&json!({"amount": 10})).is_ok());
    }
}
