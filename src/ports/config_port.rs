//! Configuration access port trait.

use rust_decimal::Decimal;
use std::str::FromStr;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Exact decimal value. Unparseable or missing values yield `default`.
    fn get_decimal(&self, section: &str, key: &str, default: Decimal) -> Decimal {
        self.get_string(section, key)
            .and_then(|v| Decimal::from_str(v.trim()).ok())
            .unwrap_or(default)
    }
}
