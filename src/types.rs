//! SQL Server target types and SSIS interchange types.
//!
//! [`map_to_target_type`] decides the warehouse column type from a column's
//! runtime type, its name, and the longest string observed in it. Name-based
//! rules are checked before the runtime type, in a fixed order; the first
//! rule that matches wins.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    data::SourceType,
    fields::{self, DURATION, STREET},
};

/// Length breakpoints for string columns; longer values map to `NVARCHAR(MAX)`.
pub const NVARCHAR_BREAKPOINTS: &[u32] = &[50, 100, 255, 1000, 4000];
pub const STREET_SHORT_LENGTH: u32 = 100;
pub const STREET_LONG_LENGTH: u32 = 4000;
pub const DEFAULT_NVARCHAR_LENGTH: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Decimal { precision: u8, scale: u8 },
    /// `None` is `NVARCHAR(MAX)`.
    NVarChar(Option<u32>),
    Date,
    DateTime2,
    Time,
}

impl SqlType {
    pub const COORDINATE: SqlType = SqlType::Decimal {
        precision: 9,
        scale: 6,
    };
    pub const MEASURE: SqlType = SqlType::Decimal {
        precision: 8,
        scale: 4,
    };

    pub fn is_long_string(self) -> bool {
        match self {
            SqlType::NVarChar(None) => true,
            SqlType::NVarChar(Some(len)) => len >= STREET_LONG_LENGTH,
            _ => false,
        }
    }

    pub fn interchange(self) -> InterchangeType {
        map_to_interchange_type(self)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Bit => f.write_str("BIT"),
            SqlType::TinyInt => f.write_str("TINYINT"),
            SqlType::SmallInt => f.write_str("SMALLINT"),
            SqlType::Int => f.write_str("INT"),
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            SqlType::NVarChar(Some(len)) => write!(f, "NVARCHAR({len})"),
            SqlType::NVarChar(None) => f.write_str("NVARCHAR(MAX)"),
            SqlType::Date => f.write_str("DATE"),
            SqlType::DateTime2 => f.write_str("DATETIME2"),
            SqlType::Time => f.write_str("TIME"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSqlType(pub String);

impl fmt::Display for UnknownSqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized SQL Server type '{}'", self.0)
    }
}

impl std::error::Error for UnknownSqlType {}

impl FromStr for SqlType {
    type Err = UnknownSqlType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_uppercase().replace(' ', "");
        let unknown = || UnknownSqlType(s.to_string());
        let (base, args) = match label.split_once('(') {
            Some((base, rest)) => (base, Some(rest.strip_suffix(')').ok_or_else(unknown)?)),
            None => (label.as_str(), None),
        };
        let parsed = match (base, args) {
            ("BIT", None) => SqlType::Bit,
            ("TINYINT", None) => SqlType::TinyInt,
            ("SMALLINT", None) => SqlType::SmallInt,
            ("INT", None) => SqlType::Int,
            ("BIGINT", None) => SqlType::BigInt,
            ("DATE", None) => SqlType::Date,
            ("DATETIME2", None) => SqlType::DateTime2,
            ("TIME", None) => SqlType::Time,
            ("NVARCHAR", Some("MAX")) => SqlType::NVarChar(None),
            ("NVARCHAR", Some(len)) => SqlType::NVarChar(Some(len.parse().map_err(|_| unknown())?)),
            ("DECIMAL" | "NUMERIC", Some(precision_scale)) => {
                let (precision, scale) = precision_scale.split_once(',').ok_or_else(unknown)?;
                SqlType::Decimal {
                    precision: precision.parse().map_err(|_| unknown())?,
                    scale: scale.parse().map_err(|_| unknown())?,
                }
            }
            _ => return Err(unknown()),
        };
        Ok(parsed)
    }
}

/// SSIS pipeline data types consumed by the bulk-load package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InterchangeType {
    Bool,
    UnsignedInt8,
    Int16,
    Int32,
    Int64,
    Numeric { precision: u8, scale: u8 },
    WideString(u32),
    WideText,
    DbDate,
    DbTimestamp2,
    DbTime2,
}

impl fmt::Display for InterchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterchangeType::Bool => f.write_str("DT_BOOL"),
            InterchangeType::UnsignedInt8 => f.write_str("DT_UI1"),
            InterchangeType::Int16 => f.write_str("DT_I2"),
            InterchangeType::Int32 => f.write_str("DT_I4"),
            InterchangeType::Int64 => f.write_str("DT_I8"),
            InterchangeType::Numeric { precision, scale } => {
                write!(f, "DT_NUMERIC({precision},{scale})")
            }
            InterchangeType::WideString(len) => write!(f, "DT_WSTR({len})"),
            InterchangeType::WideText => f.write_str("DT_NTEXT"),
            InterchangeType::DbDate => f.write_str("DT_DBDATE"),
            InterchangeType::DbTimestamp2 => f.write_str("DT_DBTIMESTAMP2"),
            InterchangeType::DbTime2 => f.write_str("DT_DBTIME2"),
        }
    }
}

pub const DEFAULT_INTERCHANGE: InterchangeType = InterchangeType::WideString(DEFAULT_NVARCHAR_LENGTH);

/// Maps a column to its SQL Server type. Pure: identical inputs always map
/// to the identical type.
pub fn map_to_target_type(
    source_type: SourceType,
    column_name: &str,
    observed_max_length: usize,
) -> SqlType {
    if fields::is_date_dimension(column_name) {
        return SqlType::Date;
    }
    if fields::is_coordinate_column(column_name) {
        return SqlType::COORDINATE;
    }
    let name = fields::standardize_column_name(column_name);
    if name == STREET {
        return if observed_max_length <= STREET_SHORT_LENGTH as usize {
            SqlType::NVarChar(Some(STREET_SHORT_LENGTH))
        } else {
            SqlType::NVarChar(Some(STREET_LONG_LENGTH))
        };
    }
    if fields::is_flag_column(column_name) {
        return SqlType::Bit;
    }
    if name == DURATION {
        return SqlType::BigInt;
    }

    match source_type {
        SourceType::Int8 => SqlType::TinyInt,
        SourceType::Int16 => SqlType::SmallInt,
        SourceType::Int32 | SourceType::Int64 => SqlType::Int,
        SourceType::Boolean => SqlType::Bit,
        SourceType::Float32 | SourceType::Float64 => SqlType::MEASURE,
        SourceType::String | SourceType::Category => nvarchar_for_length(observed_max_length),
        SourceType::DateTime => SqlType::DateTime2,
        SourceType::Date => SqlType::Date,
        SourceType::Duration => SqlType::Time,
        SourceType::Unknown => SqlType::NVarChar(Some(DEFAULT_NVARCHAR_LENGTH)),
    }
}

pub fn nvarchar_for_length(observed_max_length: usize) -> SqlType {
    NVARCHAR_BREAKPOINTS
        .iter()
        .find(|limit| observed_max_length <= **limit as usize)
        .map(|limit| SqlType::NVarChar(Some(*limit)))
        .unwrap_or(SqlType::NVarChar(None))
}

pub fn map_to_interchange_type(target: SqlType) -> InterchangeType {
    match target {
        SqlType::Bit => InterchangeType::Bool,
        SqlType::TinyInt => InterchangeType::UnsignedInt8,
        SqlType::SmallInt => InterchangeType::Int16,
        SqlType::Int => InterchangeType::Int32,
        SqlType::BigInt => InterchangeType::Int64,
        SqlType::Decimal { precision, scale } => InterchangeType::Numeric { precision, scale },
        SqlType::NVarChar(Some(len)) => InterchangeType::WideString(len),
        SqlType::NVarChar(None) => InterchangeType::WideText,
        SqlType::Date => InterchangeType::DbDate,
        SqlType::DateTime2 => InterchangeType::DbTimestamp2,
        SqlType::Time => InterchangeType::DbTime2,
    }
}

/// Interchange type for a SQL type label such as `"DECIMAL(9,6)"`; labels
/// that do not parse fall back to `DT_WSTR(100)`.
pub fn interchange_for_label(label: &str) -> InterchangeType {
    label
        .parse::<SqlType>()
        .map(map_to_interchange_type)
        .unwrap_or(DEFAULT_INTERCHANGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_map_to_fixed_decimal() {
        let ty = map_to_target_type(SourceType::Float64, "Start_Lat", 0);
        assert_eq!(ty.to_string(), "DECIMAL(9,6)");
        assert_eq!(map_to_target_type(SourceType::Float64, "LONGITUDE", 0), SqlType::COORDINATE);
    }

    #[test]
    fn date_dimension_wins_over_source_type() {
        assert_eq!(map_to_target_type(SourceType::String, "date", 10), SqlType::Date);
    }

    #[test]
    fn street_is_sized_by_observed_length() {
        assert_eq!(
            map_to_target_type(SourceType::String, "Street", 100),
            SqlType::NVarChar(Some(100))
        );
        assert_eq!(
            map_to_target_type(SourceType::String, "STREET", 101),
            SqlType::NVarChar(Some(4000))
        );
    }

    #[test]
    fn flag_names_are_bits_regardless_of_source_type() {
        for source in [SourceType::Int64, SourceType::String, SourceType::Float64] {
            assert_eq!(map_to_target_type(source, "Crossing", 5), SqlType::Bit);
        }
        assert_eq!(map_to_target_type(SourceType::Int8, "IS_WEEKEND", 0), SqlType::Bit);
    }

    #[test]
    fn name_rules_follow_the_column_vocabulary() {
        for name in ["Full Date", "Traffic Signal", "End_Lng", "Give_Way"] {
            let mapped = map_to_target_type(SourceType::String, name, 10);
            let expected = if fields::is_date_dimension(name) {
                SqlType::Date
            } else if fields::is_coordinate_column(name) {
                SqlType::COORDINATE
            } else {
                assert!(fields::is_flag_column(name), "{name}");
                SqlType::Bit
            };
            assert_eq!(mapped, expected, "{name}");
        }
    }

    #[test]
    fn duration_is_bigint() {
        assert_eq!(map_to_target_type(SourceType::Int64, "DURATION", 0), SqlType::BigInt);
    }

    #[test]
    fn source_type_dispatch() {
        assert_eq!(map_to_target_type(SourceType::Int8, "HOUR", 0), SqlType::TinyInt);
        assert_eq!(map_to_target_type(SourceType::Int16, "YEAR", 0), SqlType::SmallInt);
        assert_eq!(map_to_target_type(SourceType::Int64, "SEVERITY", 0), SqlType::Int);
        assert_eq!(map_to_target_type(SourceType::Boolean, "FLAG", 0), SqlType::Bit);
        assert_eq!(map_to_target_type(SourceType::Float32, "DISTANCE", 0), SqlType::MEASURE);
        assert_eq!(map_to_target_type(SourceType::DateTime, "WHEN", 0), SqlType::DateTime2);
        assert_eq!(map_to_target_type(SourceType::Duration, "ELAPSED", 0), SqlType::Time);
        assert_eq!(
            map_to_target_type(SourceType::Unknown, "MYSTERY", 0),
            SqlType::NVarChar(Some(100))
        );
    }

    #[test]
    fn string_breakpoints() {
        assert_eq!(nvarchar_for_length(0), SqlType::NVarChar(Some(50)));
        assert_eq!(nvarchar_for_length(30), SqlType::NVarChar(Some(50)));
        assert_eq!(nvarchar_for_length(51), SqlType::NVarChar(Some(100)));
        assert_eq!(nvarchar_for_length(255), SqlType::NVarChar(Some(255)));
        assert_eq!(nvarchar_for_length(256), SqlType::NVarChar(Some(1000)));
        assert_eq!(nvarchar_for_length(4000), SqlType::NVarChar(Some(4000)));
        assert_eq!(nvarchar_for_length(4001), SqlType::NVarChar(None));
    }

    #[test]
    fn interchange_table() {
        assert_eq!(SqlType::Bit.interchange().to_string(), "DT_BOOL");
        assert_eq!(SqlType::TinyInt.interchange().to_string(), "DT_UI1");
        assert_eq!(SqlType::COORDINATE.interchange().to_string(), "DT_NUMERIC(9,6)");
        assert_eq!(SqlType::NVarChar(Some(50)).interchange().to_string(), "DT_WSTR(50)");
        assert_eq!(SqlType::NVarChar(None).interchange().to_string(), "DT_NTEXT");
        assert_eq!(SqlType::DateTime2.interchange().to_string(), "DT_DBTIMESTAMP2");
    }

    #[test]
    fn labels_round_trip_and_fall_back() {
        for label in ["BIT", "DECIMAL(8,4)", "NVARCHAR(MAX)", "NVARCHAR(255)", "DATETIME2"] {
            let parsed: SqlType = label.parse().unwrap();
            assert_eq!(parsed.to_string(), label);
        }
        assert_eq!(interchange_for_label("decimal(9, 6)").to_string(), "DT_NUMERIC(9,6)");
        assert_eq!(interchange_for_label("GEOGRAPHY"), DEFAULT_INTERCHANGE);
        assert_eq!(interchange_for_label("NVARCHAR(abc)"), DEFAULT_INTERCHANGE);
    }
}
