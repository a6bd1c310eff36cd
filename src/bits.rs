use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::error::{MathError, code};
use crate::number;

/// Upper bound for left shifts when no word size truncates the result.
const MAX_UNBOUNDED_SHIFT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitFunction {
    SetBit,
    ClrBit,
    TogBit,
    TestBit,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Shl,
    Shr,
}

impl BitFunction {
    pub const ALL: [BitFunction; 10] = [
        BitFunction::SetBit,
        BitFunction::ClrBit,
        BitFunction::TogBit,
        BitFunction::TestBit,
        BitFunction::BitAnd,
        BitFunction::BitOr,
        BitFunction::BitXor,
        BitFunction::BitNot,
        BitFunction::Shl,
        BitFunction::Shr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BitFunction::SetBit => "setbit",
            BitFunction::ClrBit => "clrbit",
            BitFunction::TogBit => "togbit",
            BitFunction::TestBit => "testbit",
            BitFunction::BitAnd => "bitand",
            BitFunction::BitOr => "bitor",
            BitFunction::BitXor => "bitxor",
            BitFunction::BitNot => "bitnot",
            BitFunction::Shl => "shl",
            BitFunction::Shr => "shr",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            BitFunction::BitNot => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Radix {
    Hex,
    Binary,
    Octal,
}

impl Radix {
    pub fn base(self) -> u32 {
        match self {
            Radix::Hex => 16,
            Radix::Binary => 2,
            Radix::Octal => 8,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Radix::Hex => "0x",
            Radix::Binary => "0b",
            Radix::Octal => "0o",
        }
    }

    /// Radix selected by the letter after a leading `0`.
    pub fn from_marker(marker: char) -> Option<Radix> {
        match marker {
            'x' | 'X' => Some(Radix::Hex),
            'b' | 'B' => Some(Radix::Binary),
            'o' | 'O' => Some(Radix::Octal),
            _ => None,
        }
    }
}

/// Two's complement arithmetic on integers of a configurable width.
///
/// A word size of 0 means unbounded: nothing is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BitEngine {
    word_size: u32,
    signed: bool,
}

impl BitEngine {
    pub fn new(word_size: u32, signed: bool) -> Self {
        BitEngine { word_size, signed }
    }

    pub fn word_size(&self) -> u32 {
        self.word_size
    }

    /// Reduces `value` modulo 2^N, remapping the upper half to negatives in
    /// signed mode.
    pub fn wrap(&self, value: BigInt) -> BigInt {
        if self.word_size == 0 {
            return value;
        }
        let modulus = BigInt::one() << self.word_size;
        let mut wrapped = value % &modulus;
        if wrapped.is_negative() {
            wrapped += &modulus;
        }
        if self.signed && wrapped >= (&modulus >> 1u32) {
            wrapped -= &modulus;
        }
        wrapped
    }

    pub fn and(&self, lhs: &BigInt, rhs: &BigInt) -> BigInt {
        self.wrap(self.wrap(lhs.clone()) & self.wrap(rhs.clone()))
    }

    pub fn or(&self, lhs: &BigInt, rhs: &BigInt) -> BigInt {
        self.wrap(self.wrap(lhs.clone()) | self.wrap(rhs.clone()))
    }

    pub fn xor(&self, lhs: &BigInt, rhs: &BigInt) -> BigInt {
        self.wrap(self.wrap(lhs.clone()) ^ self.wrap(rhs.clone()))
    }

    pub fn not(&self, value: &BigInt) -> BigInt {
        self.wrap(!self.wrap(value.clone()))
    }

    pub fn shl(&self, value: &BigInt, amount: &BigInt) -> Result<BigInt, MathError> {
        let amount = shift_amount(amount)?;
        if self.word_size > 0 && amount >= self.word_size as usize {
            return Ok(BigInt::zero());
        }
        if self.word_size == 0 && amount > MAX_UNBOUNDED_SHIFT {
            return Err(MathError::calculation(code::OVERFLOW, "Number too large to calculate."));
        }
        Ok(self.wrap(self.wrap(value.clone()) << amount))
    }

    pub fn shr(&self, value: &BigInt, amount: &BigInt) -> Result<BigInt, MathError> {
        let value = self.wrap(value.clone());
        let amount = shift_amount(amount)?;
        let bits = value.bits() as usize;
        if amount > bits {
            // floor division drains everything but the sign
            return Ok(if value.is_negative() { -BigInt::one() } else { BigInt::zero() });
        }
        Ok(self.wrap(value >> amount))
    }

    pub fn setbit(&self, value: &BigInt, index: &BigInt) -> Result<BigInt, MathError> {
        let mask = self.mask(index)?;
        Ok(self.wrap(self.wrap(value.clone()) | mask))
    }

    pub fn clrbit(&self, value: &BigInt, index: &BigInt) -> Result<BigInt, MathError> {
        let mask = self.mask(index)?;
        Ok(self.wrap(self.wrap(value.clone()) & !mask))
    }

    pub fn togbit(&self, value: &BigInt, index: &BigInt) -> Result<BigInt, MathError> {
        let mask = self.mask(index)?;
        Ok(self.wrap(self.wrap(value.clone()) ^ mask))
    }

    pub fn testbit(&self, value: &BigInt, index: &BigInt) -> Result<bool, MathError> {
        let mask = self.mask(index)?;
        Ok(!(self.wrap(value.clone()) & mask).is_zero())
    }

    fn mask(&self, index: &BigInt) -> Result<BigInt, MathError> {
        let invalid = || {
            MathError::syntax(code::BIT_INDEX, format!("Invalid bit index: {index}"))
        };
        let index = index.to_usize().ok_or_else(invalid)?;
        if self.word_size > 0 && index >= self.word_size as usize {
            return Err(invalid());
        }
        if index > MAX_UNBOUNDED_SHIFT {
            return Err(invalid());
        }
        Ok(BigInt::one() << index)
    }

    /// Runs a bit function on already folded arguments. Non-integral
    /// arguments are rejected with code 3041.
    pub fn apply(&self, function: BitFunction, args: &[BigDecimal]) -> Result<BigDecimal, MathError> {
        let args = args
            .iter()
            .map(number::integral)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                MathError::calculation(
                    code::BIT_FUNCTION_INTEGERS,
                    format!("'{}' only accepts integer arguments", function.name()),
                )
            })?;
        let result = match (function, args.as_slice()) {
            (BitFunction::BitNot, [value]) => self.not(value),
            (BitFunction::SetBit, [value, index]) => self.setbit(value, index)?,
            (BitFunction::ClrBit, [value, index]) => self.clrbit(value, index)?,
            (BitFunction::TogBit, [value, index]) => self.togbit(value, index)?,
            (BitFunction::TestBit, [value, index]) => {
                if self.testbit(value, index)? { BigInt::one() } else { BigInt::zero() }
            }
            (BitFunction::BitAnd, [lhs, rhs]) => self.and(lhs, rhs),
            (BitFunction::BitOr, [lhs, rhs]) => self.or(lhs, rhs),
            (BitFunction::BitXor, [lhs, rhs]) => self.xor(lhs, rhs),
            (BitFunction::Shl, [value, amount]) => self.shl(value, amount)?,
            (BitFunction::Shr, [value, amount]) => self.shr(value, amount)?,
            (function, args) => {
                return Err(MathError::syntax(
                    code::ARGUMENT_COUNT,
                    format!(
                        "'{}' expects {} argument(s), got {}",
                        function.name(),
                        function.arity(),
                        args.len()
                    ),
                ));
            }
        };
        Ok(number::from_integer(result))
    }

    /// Prefixed lowercase digits of the wrapped value; negatives keep a
    /// leading `-`.
    pub fn to_radix_string(&self, value: &BigInt, radix: Radix) -> String {
        let value = self.wrap(value.clone());
        let sign = if value.is_negative() { "-" } else { "" };
        let digits = value.magnitude().to_str_radix(radix.base());
        format!("{sign}{}{digits}", radix.prefix())
    }
}

fn shift_amount(amount: &BigInt) -> Result<usize, MathError> {
    amount.to_usize().ok_or_else(|| {
        MathError::calculation(
            code::BIT_FUNCTION_INTEGERS,
            format!("Shift amount must be a non-negative integer, got {amount}"),
        )
    })
}
