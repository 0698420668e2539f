//! 健康数据的本地分析动作：趋势与完整性

use serde_json::{json, Value};

/// 趋势判定带宽：后半段均值相对前半段超过 ±10% 才算上升 / 下降
const TREND_BAND: f64 = 0.10;

fn reading(item: &Value, data_type: &str) -> Option<f64> {
    let key = match data_type {
        "glucose" => "value",
        "pressure" => "systolic",
        "weight" => "weight",
        _ => return None,
    };
    match item.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// 对一组记录做统计：count / average / max / min / trend（rising / falling / stable）
pub fn analyze_trend(data_list: &[Value], data_type: &str) -> Value {
    if data_list.is_empty() {
        return json!({ "trend": "no data" });
    }
    let values: Vec<f64> = data_list.iter().filter_map(|i| reading(i, data_type)).collect();
    if values.is_empty() {
        return json!({ "trend": "no valid data" });
    }

    let max = values.iter().copied().fold(f64::MIN, f64::max);
    let min = values.iter().copied().fold(f64::MAX, f64::min);
    let (first, second) = values.split_at(values.len() / 2);
    let trend = if first.is_empty() {
        "stable"
    } else {
        let (a, b) = (mean(first), mean(second));
        if b > a * (1.0 + TREND_BAND) {
            "rising"
        } else if b < a * (1.0 - TREND_BAND) {
            "falling"
        } else {
            "stable"
        }
    };

    json!({
        "count": values.len(),
        "average": round2(mean(&values)),
        "max": max,
        "min": min,
        "trend": trend,
    })
}

/// 各类记录是否存在及条数；输入为 query_user_health_records 的返回
pub fn analyze_completeness(health_data: &Value) -> Value {
    let records = health_data.get("health_records");
    let count = |t: &str| {
        records
            .and_then(|r| r.get(t))
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    };
    let (g, p, w) = (count("glucose"), count("pressure"), count("weight"));
    json!({
        "has_glucose": g > 0,
        "has_pressure": p > 0,
        "has_weight": w > 0,
        "glucose_count": g,
        "pressure_count": p,
        "weight_count": w,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_rising() {
        let data: Vec<Value> = [6.0, 6.2, 7.6, 8.0].iter().map(|v| json!({"value": v})).collect();
        let out = analyze_trend(&data, "glucose");
        assert_eq!(out["trend"], "rising");
        assert_eq!(out["count"], 4);
        assert!((out["average"].as_f64().unwrap() - 6.95).abs() < 0.01);
        assert_eq!(out["max"], 8.0);
        assert_eq!(out["min"], 6.0);
    }

    #[test]
    fn test_trend_stable_within_band_and_falling() {
        let stable: Vec<Value> = [120.0, 125.0].iter().map(|v| json!({"systolic": v})).collect();
        assert_eq!(analyze_trend(&stable, "pressure")["trend"], "stable");
        let falling: Vec<Value> = [90.0, 88.0, 80.0, 78.0].iter().map(|v| json!({"weight": v})).collect();
        assert_eq!(analyze_trend(&falling, "weight")["trend"], "falling");
    }

    #[test]
    fn test_trend_edge_cases() {
        assert_eq!(analyze_trend(&[], "glucose")["trend"], "no data");
        assert_eq!(analyze_trend(&[json!({"x": 1})], "glucose")["trend"], "no valid data");
        assert_eq!(analyze_trend(&[json!({"value": 5.0})], "glucose")["trend"], "stable");
    }

    #[test]
    fn test_completeness_counts() {
        let data = json!({"health_records": {"glucose": [{}, {}], "pressure": [], "weight": [{}]}});
        let out = analyze_completeness(&data);
        assert_eq!(out["has_glucose"], true);
        assert_eq!(out["has_pressure"], false);
        assert_eq!(out["glucose_count"], 2);
        assert_eq!(out["weight_count"], 1);
        assert_eq!(analyze_completeness(&Value::Null)["has_weight"], false);
    }
}
