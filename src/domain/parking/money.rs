use std::fmt;

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

/// 通貨
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    CAD,
    USD,
}

impl Currency {
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::CAD => "CA$",
            Currency::USD => "US$",
        }
    }
}

/// 金額 (補助単位=セントで保持する)
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    pub fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// `3.5` のような主単位の値から生成する。セント未満は四捨五入。
    pub fn from_major(value: f64, currency: Currency) -> Self {
        Self::new((value * 100.0).round() as i64, currency)
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn as_major(&self) -> f64 {
        self.amount as f64 / 100.0
    }

    /// 時間単価から `minutes` 分の料金を求める。セント未満は四捨五入。
    ///
    /// 桁あふれする場合は `None`。
    pub fn per_hour_for(&self, minutes: u32) -> Option<Self> {
        let total = self.amount.checked_mul(i64::from(minutes))?;
        let rounded = if total >= 0 {
            total.checked_add(30)? / 60
        } else {
            total.checked_sub(30)? / 60
        };
        Some(Self::new(rounded, self.currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        write!(
            f,
            "{}{}{}.{:02}",
            sign,
            self.currency.symbol(),
            (abs / 100).to_formatted_string(&Locale::en),
            abs % 100
        )
    }
}
