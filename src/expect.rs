use std::{fmt, str::FromStr};

use crate::{
    runtime::RunState,
    symbol::{FxMap, Register},
};

/// Expected register contents after a run. Registers not named are not checked.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Expectation {
    values: FxMap<Register, u16>,
}

/// Register whose value differs from the expectation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Mismatch {
    pub register: Register,
    pub expected: u16,
    pub actual: u16,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} does not match: expected {} (0x{:04X}), found {} (0x{:04X})",
            self.register, self.expected, self.expected, self.actual, self.actual
        )
    }
}

impl Expectation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, register: Register, value: u16) -> Self {
        self.values.insert(register, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compare against live state, in the order the registers were given.
    pub fn check(&self, state: &RunState) -> Vec<Mismatch> {
        self.values
            .iter()
            .filter_map(|(&register, &expected)| {
                let actual = state.reg(register);
                (actual != expected).then_some(Mismatch {
                    register,
                    expected,
                    actual,
                })
            })
            .collect()
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ExpectationError {
    /// Entry is not of the form `REG=value`
    Malformed(String),
    UnknownRegister(String),
    BadValue(String),
}

impl fmt::Display for ExpectationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectationError::Malformed(entry) => {
                write!(f, "Expected `REGISTER=VALUE`, found `{entry}`")
            }
            ExpectationError::UnknownRegister(name) => write!(f, "Unknown register `{name}`"),
            ExpectationError::BadValue(value) => {
                write!(f, "`{value}` is not a 16-bit value")
            }
        }
    }
}

impl std::error::Error for ExpectationError {}

/// Parses `R1=25,R2=-5,IO=0x4000`.
impl FromStr for Expectation {
    type Err = ExpectationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut expectation = Expectation::new();
        for entry in s.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| ExpectationError::Malformed(entry.to_string()))?;
            let (name, value) = (name.trim(), value.trim());
            let register = name
                .parse::<Register>()
                .map_err(|_| ExpectationError::UnknownRegister(name.to_string()))?;
            let value = parse_value(value).ok_or_else(|| ExpectationError::BadValue(value.to_string()))?;
            expectation = expectation.with(register, value);
        }
        Ok(expectation)
    }
}

/// Decimal (possibly negative) or `0x` hex value that fits in 16 bits.
pub(crate) fn parse_value(value: &str) -> Option<u16> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        return u16::from_str_radix(hex, 16).ok();
    }
    match value.parse::<i32>().ok()? {
        n @ 0..=0xFFFF => Some(n as u16),
        n @ -0x8000..=-1 => Some(n as i16 as u16),
        _ => None,
    }
}
