use anyhow::bail;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Above => f.write_str("above"),
            Direction::Below => f.write_str("below"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub pair_address: String,
    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub token_symbol: String,
    pub target_price: f64,
    pub direction: Direction,
}

/// Identifies alerts for removal: an alert is its pair, target and direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertKey {
    pub pair_address: String,
    pub target_price: f64,
    pub direction: Direction,
}

impl Alert {
    pub fn key(&self) -> AlertKey {
        AlertKey {
            pair_address: self.pair_address.clone(),
            target_price: self.target_price,
            direction: self.direction,
        }
    }

    pub fn matches(&self, key: &AlertKey) -> bool {
        self.pair_address == key.pair_address
            && self.target_price == key.target_price
            && self.direction == key.direction
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pair_address.trim().is_empty() {
            bail!("pair address is required");
        }
        if !self.target_price.is_finite() || self.target_price <= 0.0 {
            bail!("target price must be a positive number");
        }
        Ok(())
    }

    /// Target as the shortest decimal that reads back as the same `f64`, so 0.1 is exactly 0.1.
    fn target(&self) -> Option<BigDecimal> {
        BigDecimal::from_str(&self.target_price.to_string()).ok()
    }

    pub fn is_met(&self, price: &BigDecimal) -> bool {
        let Some(target) = self.target() else {
            return false;
        };
        match self.direction {
            Direction::Above => *price >= target,
            Direction::Below => *price <= target,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertBook(Vec<Alert>);

impl AlertBook {
    /// Validates and appends. Returns `false` when an alert with the same key exists.
    pub fn add(&mut self, alert: Alert) -> anyhow::Result<bool> {
        alert.validate()?;
        let key = alert.key();
        if self.0.iter().any(|a| a.matches(&key)) {
            return Ok(false);
        }
        self.0.push(alert);
        Ok(true)
    }

    /// Removes every alert with the given key, returning how many were dropped.
    pub fn remove(&mut self, key: &AlertKey) -> usize {
        let before = self.0.len();
        self.0.retain(|a| !a.matches(key));
        before - self.0.len()
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.0
    }

    /// Distinct pair addresses in first-seen order.
    pub fn pair_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = Vec::new();
        for alert in &self.0 {
            if !addresses.contains(&alert.pair_address) {
                addresses.push(alert.pair_address.clone());
            }
        }
        addresses
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Announces an alert when its condition starts holding, not on every check while it holds.
#[derive(Debug, Default)]
pub struct AlertMonitor {
    met: HashSet<String>,
}

impl AlertMonitor {
    fn met_key(alert: &Alert) -> String {
        format!(
            "{}:{}:{}",
            alert.pair_address, alert.target_price, alert.direction
        )
    }

    /// `prices` maps pair address to USD price. Alerts without a price keep their previous state.
    pub fn check(
        &mut self,
        book: &AlertBook,
        prices: &HashMap<String, BigDecimal>,
    ) -> Vec<(Alert, BigDecimal)> {
        let mut met = HashSet::new();
        let mut triggered = Vec::new();

        for alert in book.alerts() {
            let key = Self::met_key(alert);
            match prices.get(&alert.pair_address) {
                Some(price) if alert.is_met(price) => {
                    if !self.met.contains(&key) {
                        triggered.push((alert.clone(), price.clone()));
                    }
                    met.insert(key);
                }
                Some(_) => {}
                None => {
                    if self.met.contains(&key) {
                        met.insert(key);
                    }
                }
            }
        }

        self.met = met;
        triggered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn alert(pair: &str, target: f64, direction: Direction) -> Alert {
        Alert {
            pair_address: pair.to_string(),
            token_name: "Degen".to_string(),
            token_symbol: "DEGEN".to_string(),
            target_price: target,
            direction,
        }
    }

    #[test]
    fn test_is_met_inclusive() {
        let price = BigDecimal::from_str("0.5").unwrap();

        assert!(alert("0x1", 0.5, Direction::Above).is_met(&price));
        assert!(alert("0x1", 0.5, Direction::Below).is_met(&price));
        assert!(alert("0x1", 0.4, Direction::Above).is_met(&price));
        assert!(!alert("0x1", 0.4, Direction::Below).is_met(&price));
        assert!(!alert("0x1", 0.6, Direction::Above).is_met(&price));
    }

    #[test]
    fn test_is_met_at_decimal_targets() {
        for target in ["0.1", "0.01", "1.1", "0.3", "2.675"] {
            let price = BigDecimal::from_str(target).unwrap();
            let target: f64 = target.parse().unwrap();

            assert!(alert("0x1", target, Direction::Above).is_met(&price), "above {target}");
            assert!(alert("0x1", target, Direction::Below).is_met(&price), "below {target}");
        }

        let just_above = BigDecimal::from_str("0.1000000000000000001").unwrap();
        assert!(alert("0x1", 0.1, Direction::Above).is_met(&just_above));
        assert!(!alert("0x1", 0.1, Direction::Below).is_met(&just_above));
    }

    #[test]
    fn test_add_rejects_invalid() {
        let mut book = AlertBook::default();

        assert!(book.add(alert("", 1.0, Direction::Above)).is_err());
        assert!(book.add(alert("0x1", 0.0, Direction::Above)).is_err());
        assert!(book.add(alert("0x1", -2.0, Direction::Below)).is_err());
        assert!(book.add(alert("0x1", f64::NAN, Direction::Below)).is_err());
        assert!(book.is_empty());
    }

    #[test]
    fn test_remove_uses_composite_key() {
        let mut book = AlertBook::default();
        book.add(alert("0x1", 1.0, Direction::Above)).unwrap();
        book.add(alert("0x1", 1.0, Direction::Below)).unwrap();
        book.add(alert("0x1", 2.0, Direction::Above)).unwrap();
        assert!(!book.add(alert("0x1", 2.0, Direction::Above)).unwrap());

        let removed = book.remove(&alert("0x1", 1.0, Direction::Above).key());

        assert_eq!(removed, 1);
        assert_eq!(book.alerts().len(), 2);
        assert_eq!(book.pair_addresses(), vec!["0x1".to_string()]);
    }

    #[test]
    fn test_monitor_triggers_on_edges_only() {
        let mut book = AlertBook::default();
        book.add(alert("0xp", 1.0, Direction::Above)).unwrap();
        let mut monitor = AlertMonitor::default();
        let price = |p: &str| HashMap::from([("0xp".to_string(), BigDecimal::from_str(p).unwrap())]);

        assert!(monitor.check(&book, &price("0.9")).is_empty());
        let fired = monitor.check(&book, &price("1.2"));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].1, BigDecimal::from_str("1.2").unwrap());
        assert!(monitor.check(&book, &price("1.3")).is_empty());
        // No price this round: state carries over.
        assert!(monitor.check(&book, &HashMap::new()).is_empty());
        assert!(monitor.check(&book, &price("1.4")).is_empty());
        assert!(monitor.check(&book, &price("0.8")).is_empty());
        assert_eq!(monitor.check(&book, &price("1.0")).len(), 1);
    }

    #[test]
    fn test_wire_format() {
        let json = r#"[{"pairAddress":"0xp","tokenName":"Degen","tokenSymbol":"DEGEN","targetPrice":0.01,"direction":"below"}]"#;
        let book: AlertBook = serde_json::from_str(json).unwrap();

        assert_eq!(book.alerts()[0].direction, Direction::Below);
        assert_eq!(serde_json::to_string(&book).unwrap(), json);
    }
}
