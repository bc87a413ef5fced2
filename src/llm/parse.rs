//! Response cleanup and validation
//!
//! Models wrap their JSON in markdown fences or surround it with prose. The
//! content is cleaned, the outermost `{...}` is parsed, and the resulting
//! decision is checked before it leaves the provider.

use serde_json::{Map, Value};

use super::error::DecisionError;
use crate::decision::TradingDecision;

const REQUIRED_KEYS: [&str; 5] = ["position", "confidence", "take_profit", "stop_loss", "reasoning"];

/// Strip code fences and return the outermost JSON object text
pub fn extract_json_object(content: &str) -> Result<String, DecisionError> {
    let cleaned = content.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(cleaned[start..=end].to_string()),
        _ => Err(DecisionError::Decode(
            "no JSON object found in response".to_string(),
        )),
    }
}

/// Numbers and numeric strings
fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

/// "primary_levels" -> "Primary Levels"
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Reasoning maps become one "Title Case: value" line per key
pub fn format_reasoning(reasoning: &Value) -> String {
    match reasoning {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{}: {}", title_case(key), text)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn field<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a Value, DecisionError> {
    map.get(key)
        .ok_or_else(|| DecisionError::Validation(format!("missing required key: {key}")))
}

/// Parse and validate model output against the current price
pub fn parse_decision(
    content: &str,
    current_price: Option<f64>,
) -> Result<TradingDecision, DecisionError> {
    let json = extract_json_object(content)?;
    let value: Value = serde_json::from_str(&json)
        .map_err(|e| DecisionError::Decode(format!("{e}: {json}")))?;

    let Value::Object(map) = value else {
        return Err(DecisionError::Decode(format!("expected a JSON object: {json}")));
    };

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|k| !map.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(DecisionError::Validation(format!(
            "missing required keys: {}",
            missing.join(", ")
        )));
    }

    let position = as_number(field(&map, "position")?)
        .ok_or_else(|| DecisionError::Validation("position must be numeric".to_string()))?;
    if !(-1.0..=1.0).contains(&position) {
        return Err(DecisionError::Validation(format!(
            "position value out of range: {position}"
        )));
    }

    let confidence = as_number(field(&map, "confidence")?)
        .ok_or_else(|| DecisionError::Validation("confidence must be numeric".to_string()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(DecisionError::Validation(format!(
            "confidence value out of range: {confidence}"
        )));
    }

    let (take_profit, stop_loss) = match (
        as_number(field(&map, "take_profit")?),
        as_number(field(&map, "stop_loss")?),
    ) {
        (Some(tp), Some(sl)) => (tp, sl),
        _ => {
            return Err(DecisionError::Validation(
                "take_profit and stop_loss must be numeric values".to_string(),
            ))
        }
    };

    if let Some(cp) = current_price {
        if position > 0.0 {
            if take_profit <= cp {
                return Err(DecisionError::Validation(
                    "take_profit must be above current price for long positions".to_string(),
                ));
            }
            if stop_loss >= cp {
                return Err(DecisionError::Validation(
                    "stop_loss must be below current price for long positions".to_string(),
                ));
            }
        } else if position < 0.0 {
            if take_profit >= cp {
                return Err(DecisionError::Validation(
                    "take_profit must be below current price for short positions".to_string(),
                ));
            }
            if stop_loss <= cp {
                return Err(DecisionError::Validation(
                    "stop_loss must be above current price for short positions".to_string(),
                ));
            }
        }
    }

    Ok(TradingDecision {
        position,
        confidence,
        current_price: None,
        take_profit: Some(take_profit),
        stop_loss: Some(stop_loss),
        reasoning: format_reasoning(field(&map, "reasoning")?),
        size: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_fenced_prose() {
        let content = "Here is my analysis:\n```json\n{\"a\": {\"b\": 1}}\n```\nGood luck";
        assert_eq!(extract_json_object(content).unwrap(), "{\"a\": {\"b\": 1}}");
        assert!(matches!(
            extract_json_object("no json here"),
            Err(DecisionError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_long_with_reasoning_map() {
        let content = r#"```json
{
  "position": 0.6,
  "confidence": "0.75",
  "take_profit": 105.5,
  "stop_loss": "98",
  "reasoning": {
    "primary_levels": "Support at 98",
    "multi_timeframe_alignment": "Bullish",
    "risk_reward": 2.5
  }
}
```"#;
        let d = parse_decision(content, Some(100.0)).unwrap();
        assert_eq!(d.position, 0.6);
        assert_eq!(d.confidence, 0.75);
        assert_eq!(d.take_profit, Some(105.5));
        assert_eq!(d.stop_loss, Some(98.0));
        assert_eq!(
            d.reasoning,
            "Primary Levels: Support at 98\nMulti Timeframe Alignment: Bullish\nRisk Reward: 2.5"
        );
        assert_eq!(d.current_price, None);
    }

    #[test]
    fn test_missing_keys() {
        let err = parse_decision(r#"{"position": 0.5, "confidence": 0.7}"#, None).unwrap_err();
        match err {
            DecisionError::Validation(msg) => {
                assert!(msg.contains("take_profit"));
                assert!(msg.contains("reasoning"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_range_checks() {
        let out_of_range = r#"{"position": 1.5, "confidence": 0.7, "take_profit": 110, "stop_loss": 95, "reasoning": "x"}"#;
        assert!(matches!(
            parse_decision(out_of_range, Some(100.0)),
            Err(DecisionError::Validation(_))
        ));

        let bad_conf = r#"{"position": 0.5, "confidence": -0.1, "take_profit": 110, "stop_loss": 95, "reasoning": "x"}"#;
        assert!(matches!(
            parse_decision(bad_conf, Some(100.0)),
            Err(DecisionError::Validation(_))
        ));

        let null_levels = r#"{"position": 0.0, "confidence": 0.2, "take_profit": null, "stop_loss": null, "reasoning": "x"}"#;
        assert!(matches!(
            parse_decision(null_levels, Some(100.0)),
            Err(DecisionError::Validation(_))
        ));
    }

    #[test]
    fn test_levels_must_match_side() {
        let long_bad_tp = r#"{"position": 0.5, "confidence": 0.7, "take_profit": 99, "stop_loss": 95, "reasoning": "x"}"#;
        assert!(matches!(
            parse_decision(long_bad_tp, Some(100.0)),
            Err(DecisionError::Validation(_))
        ));

        let short_bad_sl = r#"{"position": -0.5, "confidence": 0.7, "take_profit": 95, "stop_loss": 99, "reasoning": "x"}"#;
        assert!(matches!(
            parse_decision(short_bad_sl, Some(100.0)),
            Err(DecisionError::Validation(_))
        ));

        let short_ok = r#"{"position": -0.5, "confidence": 0.7, "take_profit": 95, "stop_loss": 102, "reasoning": "x"}"#;
        let d = parse_decision(short_ok, Some(100.0)).unwrap();
        assert!(d.is_short());
        assert_eq!(d.reasoning, "x");
    }

    #[test]
    fn test_malformed_json_is_decode_error() {
        assert!(matches!(
            parse_decision("{\"position\": 0.5,, }", None),
            Err(DecisionError::Decode(_))
        ));
    }
}
