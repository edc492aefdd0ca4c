//! Statutory and custom deductions.

use std::collections::BTreeMap;

use crate::model::payroll::round2;

pub const IGSS: &str = "igss";
pub const ISR: &str = "isr";

const IGSS_RATE: f64 = 0.0483;

/// ISR applies one flat rate to the whole gross amount, picked by the highest
/// threshold the amount strictly exceeds.
const ISR_BRACKETS: [(f64, f64); 3] = [(100_000.0, 0.15), (50_000.0, 0.10), (30_000.0, 0.05)];

pub fn igss(gross: f64) -> f64 {
    round2(gross * IGSS_RATE)
}

pub fn isr(gross: f64) -> f64 {
    let rate = ISR_BRACKETS
        .iter()
        .find(|(threshold, _)| gross > *threshold)
        .map_or(0.0, |(_, rate)| *rate);

    round2(gross * rate)
}

/// Statutory deductions plus custom ones. A custom entry named like a
/// statutory deduction is added on top of it.
pub fn compute_deductions(gross: f64, custom: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let mut deductions = BTreeMap::from([
        (IGSS.to_string(), igss(gross)),
        (ISR.to_string(), isr(gross)),
    ]);

    for (name, amount) in custom {
        *deductions.entry(name.clone()).or_insert(0.0) += amount;
    }

    deductions
}

pub fn net_amount(gross: f64, deductions: &BTreeMap<String, f64>) -> f64 {
    round2(gross - deductions.values().sum::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn igss_is_rounded_share_of_gross() {
        assert_eq!(igss(7500.0), 362.25);
        assert_eq!(igss(1000.0), 48.3);
        assert_eq!(igss(1234.56), 59.63);
    }

    #[test]
    fn isr_brackets_apply_flat_rate_with_cliffs() {
        assert_eq!(isr(0.0), 0.0);
        assert_eq!(isr(30_000.0), 0.0);
        assert_eq!(isr(30_000.01), 1500.0);
        assert_eq!(isr(50_000.0), 2500.0);
        assert_eq!(isr(50_000.5), 5000.05);
        assert_eq!(isr(100_000.0), 10_000.0);
        assert_eq!(isr(100_001.0), 15_000.15);
    }

    #[test]
    fn custom_deductions_are_merged_additively() {
        let custom = BTreeMap::from([("isr".to_string(), 100.0), ("loan".to_string(), 250.5)]);

        let deductions = compute_deductions(40_000.0, &custom);

        assert_eq!(deductions["igss"], 1932.0);
        assert_eq!(deductions["isr"], 2100.0);
        assert_eq!(deductions["loan"], 250.5);
        assert_eq!(deductions.len(), 3);
    }

    #[test]
    fn net_subtracts_every_deduction() {
        let deductions = compute_deductions(7500.0, &BTreeMap::new());
        assert_eq!(deductions["isr"], 0.0);
        assert_eq!(net_amount(7500.0, &deductions), 7137.75);

        let custom = BTreeMap::from([("uniform".to_string(), 37.75)]);
        let deductions = compute_deductions(7500.0, &custom);
        assert_eq!(net_amount(7500.0, &deductions), 7100.0);
    }
}
