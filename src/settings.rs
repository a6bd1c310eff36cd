use std::collections::BTreeMap;
use std::fmt::{self, Display};

use log::debug;

use crate::bits::{BitEngine, Radix};
use crate::error::{MathError, code};
use crate::format::OutputFormat;

pub const VALID_WORD_SIZES: [u32; 6] = [0, 8, 16, 32, 64, 128];

/// A loosely typed settings value as it arrives from a caller or preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{b}"),
            SettingValue::Int(n) => write!(f, "{n}"),
            SettingValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        SettingValue::Int(value.into())
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

/// Everything that changes how an expression is read, computed or printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub decimal_places: u32,
    pub use_degrees: bool,
    pub allow_augmented_assignment: bool,
    pub fractions: bool,
    pub allow_non_decimal: bool,
    pub debug: bool,
    pub correct_output_format: bool,
    pub default_output_format: OutputFormat,
    pub only_hex: bool,
    pub only_binary: bool,
    pub only_octal: bool,
    pub signed_mode: bool,
    pub word_size: u32,
    pub readable_error: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            decimal_places: 2,
            use_degrees: false,
            allow_augmented_assignment: true,
            fractions: false,
            allow_non_decimal: true,
            debug: false,
            correct_output_format: true,
            default_output_format: OutputFormat::Decimal,
            only_hex: false,
            only_binary: false,
            only_octal: false,
            signed_mode: false,
            word_size: 0,
            readable_error: false,
        }
    }
}

impl Settings {
    pub const KEYS: [&'static str; 14] = [
        "decimal_places",
        "use_degrees",
        "allow_augmented_assignment",
        "fractions",
        "allow_non_decimal",
        "debug",
        "correct_output_format",
        "default_output_format",
        "only_hex",
        "only_binary",
        "only_octal",
        "signed_mode",
        "word_size",
        "readable_error",
    ];

    /// The radix forced by an only-base flag, if any.
    pub fn only_radix(&self) -> Option<Radix> {
        if self.only_hex {
            Some(Radix::Hex)
        } else if self.only_binary {
            Some(Radix::Binary)
        } else if self.only_octal {
            Some(Radix::Octal)
        } else {
            None
        }
    }

    pub fn only_base(&self) -> bool {
        self.only_radix().is_some()
    }

    pub fn bit_engine(&self) -> BitEngine {
        BitEngine::new(self.word_size, self.signed_mode)
    }

    pub fn get(&self, key: &str) -> Option<SettingValue> {
        let value = match key {
            "decimal_places" => SettingValue::Int(self.decimal_places.into()),
            "use_degrees" => self.use_degrees.into(),
            "allow_augmented_assignment" => self.allow_augmented_assignment.into(),
            "fractions" => self.fractions.into(),
            "allow_non_decimal" => self.allow_non_decimal.into(),
            "debug" => self.debug.into(),
            "correct_output_format" => self.correct_output_format.into(),
            "default_output_format" => SettingValue::Text(self.default_output_format.to_string()),
            "only_hex" => self.only_hex.into(),
            "only_binary" => self.only_binary.into(),
            "only_octal" => self.only_octal.into(),
            "signed_mode" => self.signed_mode.into(),
            "word_size" => SettingValue::Int(self.word_size.into()),
            "readable_error" => self.readable_error.into(),
            _ => return None,
        };
        Some(value)
    }

    /// Changes one setting.
    ///
    /// Booleans also accept 0 and 1. Turning on one only-base flag turns the
    /// other two off.
    pub fn set(&mut self, key: &str, value: impl Into<SettingValue>) -> Result<(), MathError> {
        let value = value.into();
        debug!("setting {key} = {value}");
        match key {
            "decimal_places" => {
                let places = expect_int(key, &value)?;
                self.decimal_places = u32::try_from(places).map_err(|_| {
                    MathError::config(
                        code::SETTING_VALUE,
                        format!("'{key}' must be a non-negative integer, got {places}"),
                    )
                })?;
            }
            "word_size" => {
                let size = expect_int(key, &value)?;
                self.word_size = u32::try_from(size)
                    .ok()
                    .filter(|size| VALID_WORD_SIZES.contains(size))
                    .ok_or_else(|| {
                        MathError::config(
                            code::PRESET_UNKNOWN,
                            format!("Invalid word size {size}; expected one of {VALID_WORD_SIZES:?}"),
                        )
                    })?;
            }
            "default_output_format" => {
                let SettingValue::Text(text) = &value else {
                    return Err(type_mismatch(key, "a string", &value));
                };
                self.default_output_format = text.parse()?;
            }
            "only_hex" | "only_binary" | "only_octal" => {
                let enabled = expect_bool(key, &value)?;
                if enabled {
                    self.only_hex = false;
                    self.only_binary = false;
                    self.only_octal = false;
                }
                match key {
                    "only_hex" => self.only_hex = enabled,
                    "only_binary" => self.only_binary = enabled,
                    _ => self.only_octal = enabled,
                }
            }
            _ => {
                let flag = match key {
                    "use_degrees" => &mut self.use_degrees,
                    "allow_augmented_assignment" => &mut self.allow_augmented_assignment,
                    "fractions" => &mut self.fractions,
                    "allow_non_decimal" => &mut self.allow_non_decimal,
                    "debug" => &mut self.debug,
                    "correct_output_format" => &mut self.correct_output_format,
                    "signed_mode" => &mut self.signed_mode,
                    "readable_error" => &mut self.readable_error,
                    _ => {
                        return Err(MathError::config(
                            code::SETTING_VALUE,
                            format!("Unknown setting '{key}'"),
                        ));
                    }
                };
                *flag = expect_bool(key, &value)?;
            }
        }
        Ok(())
    }

    /// Applies a complete preset. Unknown keys and missing keys are both
    /// rejected before anything changes.
    pub fn load_preset(&mut self, preset: &BTreeMap<String, SettingValue>) -> Result<(), MathError> {
        if let Some(unknown) = preset.keys().find(|key| !Self::KEYS.contains(&key.as_str())) {
            return Err(MathError::config(
                code::PRESET_UNKNOWN,
                format!("Unknown setting '{unknown}' in preset"),
            ));
        }
        let missing: Vec<_> = Self::KEYS
            .iter()
            .filter(|key| !preset.contains_key(**key))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(MathError::config(
                code::PRESET_MISSING,
                format!("Preset is missing: {}", missing.join(", ")),
            ));
        }

        let mut next = self.clone();
        for key in Self::KEYS {
            next.set(key, preset[key].clone())?;
        }
        *self = next;
        Ok(())
    }

    /// Every setting as a preset that [`Settings::load_preset`] accepts.
    pub fn to_preset(&self) -> BTreeMap<String, SettingValue> {
        Self::KEYS
            .iter()
            .filter_map(|key| Some((key.to_string(), self.get(key)?)))
            .collect()
    }
}

fn type_mismatch(key: &str, expected: &str, got: &SettingValue) -> MathError {
    MathError::config(
        code::SETTING_TYPE,
        format!("'{key}' expects {expected}, got {got}"),
    )
}

fn expect_bool(key: &str, value: &SettingValue) -> Result<bool, MathError> {
    match value {
        SettingValue::Bool(b) => Ok(*b),
        SettingValue::Int(0) => Ok(false),
        SettingValue::Int(1) => Ok(true),
        other => Err(type_mismatch(key, "a boolean", other)),
    }
}

fn expect_int(key: &str, value: &SettingValue) -> Result<i64, MathError> {
    match value {
        SettingValue::Int(n) => Ok(*n),
        SettingValue::Bool(b) => Ok(i64::from(*b)),
        other => Err(type_mismatch(key, "an integer", other)),
    }
}
