//! Common types used across the ledger

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Warehouse, store or any other place stock is kept
    LocationId
);
id_type!(
    /// Catalogue product (article)
    ProductId
);
id_type!(ColorId);
id_type!(
    /// Shoe size; only paired stock is tracked per size
    SizeId
);

/// The two independent stock kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockKind {
    /// Sealed boxes ("dus"), counted per location, product and color
    Dus,
    /// Loose pairs ("pasang"), counted per location, product, color and size
    Pasang,
}

impl StockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockKind::Dus => "dus",
            StockKind::Pasang => "pasang",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "dus" => Some(StockKind::Dus),
            "pasang" => Some(StockKind::Pasang),
            _ => None,
        }
    }
}

impl fmt::Display for StockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a stock cell.
///
/// A key without a size holds box stock; a key with a size holds pair stock.
/// The derived ordering sorts the size-less key before any sized key of the
/// same (location, product, color), which is the global lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub color_id: ColorId,
    pub size_id: Option<SizeId>,
}

impl CellKey {
    /// Key of the box-stock cell
    pub fn dus(location_id: LocationId, product_id: ProductId, color_id: ColorId) -> Self {
        Self {
            location_id,
            product_id,
            color_id,
            size_id: None,
        }
    }

    /// Key of a pair-stock cell
    pub fn pasang(
        location_id: LocationId,
        product_id: ProductId,
        color_id: ColorId,
        size_id: SizeId,
    ) -> Self {
        Self {
            location_id,
            product_id,
            color_id,
            size_id: Some(size_id),
        }
    }

    /// Which balance this key carries
    pub fn kind(&self) -> StockKind {
        match self.size_id {
            None => StockKind::Dus,
            Some(_) => StockKind::Pasang,
        }
    }

    /// Same cell identity at another location
    pub fn at(&self, location_id: LocationId) -> Self {
        Self {
            location_id,
            ..*self
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "location {} / product {} / color {}",
            self.location_id, self.product_id, self.color_id
        )?;
        if let Some(size) = self.size_id {
            write!(f, " / size {}", size)?;
        }
        Ok(())
    }
}

/// Both balances of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub box_stock: i64,
    pub pair_stock: i64,
}

impl Balance {
    pub const ZERO: Balance = Balance {
        box_stock: 0,
        pair_stock: 0,
    };

    pub fn new(box_stock: i64, pair_stock: i64) -> Self {
        Self {
            box_stock,
            pair_stock,
        }
    }

    /// Balance of the given kind
    pub fn of(&self, kind: StockKind) -> i64 {
        match kind {
            StockKind::Dus => self.box_stock,
            StockKind::Pasang => self.pair_stock,
        }
    }

    /// Add signed deltas; `None` if the addition overflows
    pub fn checked_add(&self, box_delta: i64, pair_delta: i64) -> Option<Balance> {
        Some(Balance {
            box_stock: self.box_stock.checked_add(box_delta)?,
            pair_stock: self.pair_stock.checked_add(pair_delta)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.box_stock == 0 && self.pair_stock == 0
    }
}

/// A cell together with its balances, as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCell {
    #[serde(flatten)]
    pub key: CellKey,
    pub box_stock: i64,
    pub pair_stock: i64,
}

impl StockCell {
    pub fn new(key: CellKey, balance: Balance) -> Self {
        Self {
            key,
            box_stock: balance.box_stock,
            pair_stock: balance.pair_stock,
        }
    }

    pub fn balance(&self) -> Balance {
        Balance::new(self.box_stock, self.pair_stock)
    }
}

/// Half-open timestamp range `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}
