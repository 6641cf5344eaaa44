//! Alert synthesis from model outcomes.
//!
//! Converts raw predictions into structured, severity-ranked alerts. Each
//! per-metric rule is independently optional (it fires only when its
//! outcome is present) and the composite coastal-flood rule joins two
//! outcomes, so it runs after both have been computed.
//!
//! Composition is isolated per alert: one rule failing can only lose its own
//! alert. Rule failures are returned as diagnostics alongside the alerts
//! that did compose, never as a request error.

use std::collections::BTreeMap;

use crate::inference::dispatch::InferenceOutputs;
use crate::inference::{MODEL_RAIN, MODEL_TEMPERATURE, MODEL_WATER_LEVEL};
use crate::model::{Alert, Severity};

/// Temperature above this (Kelvin) is alerted at full confidence.
const HIGH_TEMPERATURE_K: f64 = 303.0;
/// Water level above this (meters) is alerted at full confidence.
const HIGH_WATER_LEVEL_M: f64 = 2.0;
/// Joint condition for the composite coastal flood rule.
const COMPOSITE_RAIN_PROBABILITY: f64 = 0.5;
const COMPOSITE_WATER_LEVEL_M: f64 = 1.0;

// ---------------------------------------------------------------------------
// Severity mapping
// ---------------------------------------------------------------------------

/// Uniform confidence-to-severity mapping. A missing or non-finite
/// confidence defaults to `Info`.
pub fn severity_from_confidence(confidence: Option<f64>) -> Severity {
    match confidence {
        Some(p) if p.is_finite() && p >= 0.75 => Severity::Critical,
        Some(p) if p.is_finite() && p >= 0.5 => Severity::Warn,
        _ => Severity::Info,
    }
}

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

/// Build the ordered alert list for one batch of outcomes. The second
/// element carries per-rule composition failures (normally empty).
pub fn synthesize(outputs: &InferenceOutputs) -> (Vec<Alert>, Vec<String>) {
    let rules: [(&str, fn(&InferenceOutputs) -> Result<Option<Alert>, String>); 4] = [
        ("rain_24h", rain_rule),
        ("temperature", temperature_rule),
        ("water_level", water_level_rule),
        ("coastal_flood", composite_rule),
    ];

    let mut alerts = Vec::new();
    let mut failures = Vec::new();
    for (rule_id, rule) in rules {
        match rule(outputs) {
            Ok(Some(alert)) => alerts.push(alert),
            Ok(None) => {}
            Err(reason) => failures.push(format!("alert {}: {}", rule_id, reason)),
        }
    }
    (alerts, failures)
}

// ---------------------------------------------------------------------------
// Per-metric rules
// ---------------------------------------------------------------------------

fn meta(key: &str, value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(key.to_string(), value.to_string())])
}

/// Rain: fires whenever the predicted probability is above zero.
fn rain_rule(outputs: &InferenceOutputs) -> Result<Option<Alert>, String> {
    let Some(rain) = &outputs.rain else {
        return Ok(None);
    };
    let Some(p) = rain.probability.filter(|p| *p > 0.0) else {
        return Ok(None);
    };
    let suggested_action = if p >= 0.5 {
        "Carry umbrella, expect localized runoff/flooding"
    } else {
        "Monitor conditions"
    };
    Ok(Some(Alert {
        id: "rain_24h",
        severity: severity_from_confidence(Some(p)),
        metric: "rain",
        value: Some(p),
        unit: "%",
        confidence: Some(p),
        text: format!("Rain likely in next 24h (p={:.0}%)", p * 100.0),
        suggested_action,
        model_meta: meta("model", MODEL_RAIN),
    }))
}

/// Temperature: always fires when a prediction exists. Values above 303 K
/// carry full confidence; anything else is informational.
fn temperature_rule(outputs: &InferenceOutputs) -> Result<Option<Alert>, String> {
    let Some(temperature) = &outputs.temperature else {
        return Ok(None);
    };
    let value = temperature.value;
    let hot = value > HIGH_TEMPERATURE_K;
    let confidence = if hot { 1.0 } else { 0.3 };
    let text = if hot {
        format!("High temperature predicted ({:.1} K)", value)
    } else {
        format!("Temperature predicted ({:.1} K)", value)
    };
    let suggested_action = if hot {
        "Stay hydrated and avoid prolonged sun exposure"
    } else {
        "No immediate action"
    };
    Ok(Some(Alert {
        id: "temperature",
        severity: severity_from_confidence(Some(confidence)),
        metric: "temperature",
        value: Some(value),
        unit: "K",
        confidence: Some(confidence),
        text,
        suggested_action,
        model_meta: meta("model", MODEL_TEMPERATURE),
    }))
}

/// Water level: always fires when a prediction exists. Levels above 2 m
/// carry full confidence.
fn water_level_rule(outputs: &InferenceOutputs) -> Result<Option<Alert>, String> {
    let Some(water) = &outputs.water_level else {
        return Ok(None);
    };
    let value = water.value;
    let high = value > HIGH_WATER_LEVEL_M;
    let confidence = if high { 1.0 } else { 0.3 };
    let suggested_action = if high {
        "Avoid low-lying areas if water level rises further"
    } else {
        "Monitor water level"
    };
    Ok(Some(Alert {
        id: "water_level",
        severity: severity_from_confidence(Some(confidence)),
        metric: "water_level",
        value: Some(value),
        unit: "m",
        confidence: Some(confidence),
        text: format!("Water level predicted {:.2} m", value),
        suggested_action,
        model_meta: meta("model", MODEL_WATER_LEVEL),
    }))
}

/// Composite coastal flood: fires only on the joint condition of heavy rain
/// probability and elevated water level. Confidence is the rain probability.
fn composite_rule(outputs: &InferenceOutputs) -> Result<Option<Alert>, String> {
    let rain_p = outputs
        .rain
        .as_ref()
        .and_then(|o| o.probability)
        .unwrap_or(0.0);
    let water_level = outputs.water_level.as_ref().map(|o| o.value).unwrap_or(0.0);
    if rain_p < COMPOSITE_RAIN_PROBABILITY || water_level < COMPOSITE_WATER_LEVEL_M {
        return Ok(None);
    }
    Ok(Some(Alert {
        id: "coastal_flood",
        severity: severity_from_confidence(Some(rain_p)),
        metric: "multi",
        value: None,
        unit: "",
        confidence: Some(rain_p.max(0.0)),
        text: "Elevated coastal flood risk due to rainfall and rising water levels".to_string(),
        suggested_action: "Follow local advisories and consider temporary evacuation if in flood-prone areas",
        model_meta: meta("derived", "true"),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelOutcome;

    fn outcome(model_id: &'static str, value: f64, probability: Option<f64>) -> ModelOutcome {
        ModelOutcome {
            model_id,
            value,
            probability,
        }
    }

    fn with_rain_and_water(rain_p: f64, water_m: f64) -> InferenceOutputs {
        InferenceOutputs {
            rain: Some(outcome(MODEL_RAIN, 1.0, Some(rain_p))),
            water_level: Some(outcome(MODEL_WATER_LEVEL, water_m, None)),
            ..InferenceOutputs::default()
        }
    }

    fn alert_ids(outputs: &InferenceOutputs) -> Vec<&'static str> {
        let (alerts, _) = synthesize(outputs);
        alerts.iter().map(|a| a.id).collect()
    }

    // --- Severity mapping ---------------------------------------------------

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(severity_from_confidence(Some(0.75)), Severity::Critical);
        assert_eq!(severity_from_confidence(Some(0.9)), Severity::Critical);
        assert_eq!(severity_from_confidence(Some(0.5)), Severity::Warn);
        assert_eq!(severity_from_confidence(Some(0.74)), Severity::Warn);
        assert_eq!(severity_from_confidence(Some(0.49)), Severity::Info);
        assert_eq!(severity_from_confidence(Some(0.0)), Severity::Info);
        assert_eq!(severity_from_confidence(None), Severity::Info);
        assert_eq!(severity_from_confidence(Some(f64::NAN)), Severity::Info);
    }

    // --- Rain rule ----------------------------------------------------------

    #[test]
    fn test_rain_alert_fires_at_any_positive_probability() {
        let outputs = InferenceOutputs {
            rain: Some(outcome(MODEL_RAIN, 0.0, Some(0.1))),
            ..InferenceOutputs::default()
        };
        let (alerts, _) = synthesize(&outputs);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, "rain_24h");
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[0].suggested_action, "Monitor conditions");
    }

    #[test]
    fn test_rain_alert_silent_at_zero_probability() {
        let outputs = InferenceOutputs {
            rain: Some(outcome(MODEL_RAIN, 0.0, Some(0.0))),
            ..InferenceOutputs::default()
        };
        assert!(alert_ids(&outputs).is_empty());
    }

    #[test]
    fn test_rain_alert_critical_at_high_probability() {
        let outputs = InferenceOutputs {
            rain: Some(outcome(MODEL_RAIN, 1.0, Some(0.8))),
            ..InferenceOutputs::default()
        };
        let (alerts, _) = synthesize(&outputs);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].confidence, Some(0.8));
        assert_eq!(alerts[0].text, "Rain likely in next 24h (p=80%)");
        assert_eq!(
            alerts[0].suggested_action,
            "Carry umbrella, expect localized runoff/flooding"
        );
    }

    // --- Temperature rule ---------------------------------------------------

    #[test]
    fn test_temperature_above_303_is_critical() {
        let outputs = InferenceOutputs {
            temperature: Some(outcome(MODEL_TEMPERATURE, 305.2, None)),
            ..InferenceOutputs::default()
        };
        let (alerts, _) = synthesize(&outputs);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].confidence, Some(1.0));
        assert_eq!(alerts[0].text, "High temperature predicted (305.2 K)");
    }

    #[test]
    fn test_temperature_below_303_is_info() {
        let outputs = InferenceOutputs {
            temperature: Some(outcome(MODEL_TEMPERATURE, 295.0, None)),
            ..InferenceOutputs::default()
        };
        let (alerts, _) = synthesize(&outputs);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[0].confidence, Some(0.3));
        assert_eq!(alerts[0].suggested_action, "No immediate action");
    }

    // --- Water level rule ---------------------------------------------------

    #[test]
    fn test_water_level_above_two_meters_is_critical() {
        let outputs = InferenceOutputs {
            water_level: Some(outcome(MODEL_WATER_LEVEL, 2.4, None)),
            ..InferenceOutputs::default()
        };
        let (alerts, _) = synthesize(&outputs);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].text, "Water level predicted 2.40 m");
        assert_eq!(
            alerts[0].suggested_action,
            "Avoid low-lying areas if water level rises further"
        );
    }

    // --- Composite rule -----------------------------------------------------

    #[test]
    fn test_composite_fires_on_joint_condition() {
        let ids = alert_ids(&with_rain_and_water(0.6, 1.2));
        assert!(ids.contains(&"coastal_flood"), "0.6 rain and 1.2 m fires composite");
    }

    #[test]
    fn test_composite_silent_when_rain_probability_low() {
        let ids = alert_ids(&with_rain_and_water(0.4, 5.0));
        assert!(
            !ids.contains(&"coastal_flood"),
            "high water alone must not fire the composite"
        );
    }

    #[test]
    fn test_composite_silent_when_water_low() {
        let ids = alert_ids(&with_rain_and_water(0.9, 0.5));
        assert!(!ids.contains(&"coastal_flood"));
    }

    #[test]
    fn test_composite_fires_exactly_at_boundaries() {
        let ids = alert_ids(&with_rain_and_water(0.5, 1.0));
        assert!(ids.contains(&"coastal_flood"), "thresholds are inclusive");
    }

    #[test]
    fn test_composite_confidence_is_rain_probability() {
        let (alerts, _) = synthesize(&with_rain_and_water(0.6, 1.2));
        let composite = alerts.iter().find(|a| a.id == "coastal_flood").unwrap();
        assert_eq!(composite.confidence, Some(0.6));
        assert_eq!(composite.value, None);
    }

    #[test]
    fn test_composite_requires_both_outcomes() {
        let outputs = InferenceOutputs {
            rain: Some(outcome(MODEL_RAIN, 1.0, Some(0.9))),
            ..InferenceOutputs::default()
        };
        assert!(!alert_ids(&outputs).contains(&"coastal_flood"));
    }

    // --- Ordering and isolation ---------------------------------------------

    #[test]
    fn test_alert_order_is_stable_with_composite_last() {
        let outputs = InferenceOutputs {
            rain: Some(outcome(MODEL_RAIN, 1.0, Some(0.8))),
            temperature: Some(outcome(MODEL_TEMPERATURE, 300.0, None)),
            humidity: None,
            water_level: Some(outcome(MODEL_WATER_LEVEL, 1.5, None)),
            errors: Vec::new(),
        };
        assert_eq!(
            alert_ids(&outputs),
            vec!["rain_24h", "temperature", "water_level", "coastal_flood"]
        );
    }

    #[test]
    fn test_no_outcomes_no_alerts_no_failures() {
        let (alerts, failures) = synthesize(&InferenceOutputs::default());
        assert!(alerts.is_empty());
        assert!(failures.is_empty());
    }
}
