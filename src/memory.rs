use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use log::debug;

use crate::error::{MathError, code};
use crate::number;

/// Named values that outlive a single calculation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Memory {
    entries: BTreeMap<String, BigDecimal>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&BigDecimal> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: BigDecimal) {
        self.entries.insert(name.into(), value);
    }

    /// Stores `text` parsed as a decimal.
    pub fn set(&mut self, name: impl Into<String>, text: &str) -> Result<(), MathError> {
        let name = name.into();
        let value = number::parse_signed(text).ok_or_else(|| {
            MathError::conversion(
                code::CONVERSION_FAILED,
                format!("Cannot store '{text}' in '{name}': not a number"),
            )
        })?;
        debug!("memory {name} = {}", number::plain_string(&value));
        self.entries.insert(name, value);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<BigDecimal, MathError> {
        self.entries.remove(name).ok_or_else(|| {
            MathError::config(
                code::UNKNOWN_MEMORY_ENTRY,
                format!("'{name}' is not stored in memory"),
            )
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BigDecimal)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_parsed_values() {
        let mut memory = Memory::new();
        memory.set("LEVEL", "5").unwrap();
        memory.set("rate", "-0.25").unwrap();
        assert_eq!(memory.get("LEVEL"), Some(&BigDecimal::from(5)));
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.set("x", "five").unwrap_err().code, code::CONVERSION_FAILED);
    }

    #[test]
    fn delete_reports_missing_entries() {
        let mut memory = Memory::new();
        memory.insert("a", BigDecimal::from(1));
        assert_eq!(memory.delete("a").unwrap(), BigDecimal::from(1));
        assert_eq!(memory.delete("a").unwrap_err().code, code::UNKNOWN_MEMORY_ENTRY);
        memory.insert("b", BigDecimal::from(2));
        memory.clear();
        assert!(memory.is_empty());
    }
}
