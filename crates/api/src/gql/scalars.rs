use async_graphql::{InputValueError, InputValueResult, Scalar, ScalarType, Value};
use std::fmt;

/// Amount in minor currency units (e.g. 1299 == 12.99).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Money(pub i64);

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Money(cents)
    }
}

#[Scalar]
impl ScalarType for Money {
    fn parse(value: Value) -> InputValueResult<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Money(i)),
                None => Err(InputValueError::custom("Money expects integer minor units")),
            },
            _ => Err(InputValueError::custom("Money must be a number (integer minor units)")),
        }
    }

    fn to_value(&self) -> Value {
        Value::Number(self.0.into())
    }
}
