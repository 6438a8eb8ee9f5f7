//! The tagged value sum shared by the pool, import, and export pipelines.
//!
//! Every PostgreSQL value a query can return maps onto exactly one [`Value`]
//! variant, and every variant has a total textual, JSON, and SQL-literal
//! form. Paths that touch data match exhaustively on this enum; there are no
//! stringly downcasts.

use tokio_postgres::types::{Kind, Type};
use tokio_postgres::Row;

/// One PostgreSQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Arbitrary-precision numeric, kept as its decimal string.
    Numeric(String),
    Text(String),
    /// json and jsonb both land here; the structure is preserved.
    Json(serde_json::Value),
    /// `YYYY-MM-DD HH:MM:SS[.ffffff]` lexical form.
    Timestamp(String),
    /// Lexical form with offset, e.g. `2024-01-15 08:30:00+00`.
    TimestampTz(String),
    Date(String),
    Time(String),
    TimeTz(String),
    Uuid(uuid::Uuid),
    Bytea(Vec<u8>),
    /// ISO 8601 duration, e.g. `P1DT2H`.
    Interval(String),
    Point {
        x: f64,
        y: f64,
    },
    Inet(String),
    Cidr(String),
    MacAddr(String),
    Array(Vec<Value>),
    /// A type this client does not decode; carries whatever text we have.
    Unknown(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical text form. Total over all variants; `Null` renders empty
    /// (callers that need a null marker check [`Value::is_null`] first).
    pub fn canonical_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int16(n) => n.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::Int64(n) => n.to_string(),
            Value::Float32(f) => format_float(*f as f64),
            Value::Float64(f) => format_float(*f),
            Value::Numeric(s) => s.clone(),
            Value::Text(s) => s.clone(),
            Value::Json(v) => v.to_string(),
            Value::Timestamp(s)
            | Value::TimestampTz(s)
            | Value::Date(s)
            | Value::Time(s)
            | Value::TimeTz(s) => s.clone(),
            Value::Uuid(u) => u.to_string(),
            Value::Bytea(bytes) => format!("\\x{}", hex_encode(bytes)),
            Value::Interval(s) => s.clone(),
            Value::Point { x, y } => format!("({},{})", format_float(*x), format_float(*y)),
            Value::Inet(s) | Value::Cidr(s) | Value::MacAddr(s) => s.clone(),
            Value::Array(items) => array_text(items),
            Value::Unknown(s) => s.clone(),
        }
    }

    /// JSON form. `Json` inlines its structure; binary-ish variants become
    /// small tagged objects so nothing is silently lost.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int16(n) => json!(n),
            Value::Int32(n) => json!(n),
            Value::Int64(n) => json!(n),
            Value::Float32(f) => float_json(*f as f64),
            Value::Float64(f) => float_json(*f),
            Value::Numeric(s) => match s.parse::<f64>() {
                Ok(f) if f.is_finite() => float_json(f),
                _ => json!(s),
            },
            Value::Text(s) => json!(s),
            Value::Json(v) => v.clone(),
            Value::Timestamp(s)
            | Value::TimestampTz(s)
            | Value::Date(s)
            | Value::Time(s)
            | Value::TimeTz(s) => json!(s),
            Value::Uuid(u) => json!(u.to_string()),
            Value::Bytea(bytes) => json!({ "type": "bytea", "hex": hex_encode(bytes) }),
            Value::Interval(s) => json!({ "type": "interval", "value": s }),
            Value::Point { x, y } => json!({ "type": "point", "x": x, "y": y }),
            Value::Inet(s) | Value::Cidr(s) | Value::MacAddr(s) => json!(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Unknown(s) => json!(s),
        }
    }

    /// SQL literal form with the casts PostgreSQL needs to round-trip the
    /// value through an INSERT or UPDATE statement.
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Int16(n) => n.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::Int64(n) => n.to_string(),
            Value::Float32(f) => float_literal(*f as f64, "float4"),
            Value::Float64(f) => float_literal(*f, "float8"),
            Value::Numeric(s) => s.clone(),
            Value::Text(s) => quote_str(s),
            Value::Json(v) => format!("{}::jsonb", quote_str(&v.to_string())),
            Value::Timestamp(s) => format!("{}::timestamp", quote_str(s)),
            Value::TimestampTz(s) => format!("{}::timestamptz", quote_str(s)),
            Value::Date(s) => format!("{}::date", quote_str(s)),
            Value::Time(s) => format!("{}::time", quote_str(s)),
            Value::TimeTz(s) => format!("{}::timetz", quote_str(s)),
            Value::Uuid(u) => format!("'{}'::uuid", u),
            Value::Bytea(bytes) => format!("'\\x{}'::bytea", hex_encode(bytes)),
            Value::Interval(s) => format!("{}::interval", quote_str(s)),
            Value::Point { x, y } => {
                format!("point({}, {})", format_float(*x), format_float(*y))
            }
            Value::Inet(s) => format!("{}::inet", quote_str(s)),
            Value::Cidr(s) => format!("{}::cidr", quote_str(s)),
            Value::MacAddr(s) => format!("{}::macaddr", quote_str(s)),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(Value::sql_literal).collect();
                format!("ARRAY[{}]", inner.join(", "))
            }
            Value::Unknown(s) => quote_str(s),
        }
    }
}

/// Single-quote a string literal, doubling interior quotes.
pub fn quote_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Floats print in PostgreSQL's spelling for the non-finite values.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "Infinity".to_string()
    } else if f == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        f.to_string()
    }
}

fn float_literal(f: f64, cast: &str) -> String {
    if f.is_finite() {
        f.to_string()
    } else {
        format!("'{}'::{}", format_float(f), cast)
    }
}

fn float_json(f: f64) -> serde_json::Value {
    match serde_json::Number::from_f64(f) {
        Some(n) => serde_json::Value::Number(n),
        None => serde_json::Value::String(format_float(f)),
    }
}

/// PostgreSQL array-literal text: `{a,b,c}`, quoting elements that need it.
fn array_text(items: &[Value]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if item.is_null() {
            out.push_str("NULL");
            continue;
        }
        let text = item.canonical_text();
        let needs_quote = text.is_empty()
            || text
                .chars()
                .any(|c| matches!(c, ',' | '{' | '}' | '"' | '\\') || c.is_whitespace());
        if needs_quote {
            out.push('"');
            out.push_str(&text.replace('\\', "\\\\").replace('"', "\\\""));
            out.push('"');
        } else {
            out.push_str(&text);
        }
    }
    out.push('}');
    out
}

// ── Row conversion ──

/// Convert one column of a query row into a [`Value`].
///
/// Unsupported or undecodable columns degrade to [`Value::Unknown`] carrying
/// the type name rather than failing the whole row.
pub fn from_row_column(row: &Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_();
    match decode_column(row, idx, ty) {
        Ok(v) => v,
        Err(e) => {
            log::warn!(
                "Failed to decode column; index={}, type={}, error={}",
                idx,
                ty.name(),
                e
            );
            Value::Unknown(format!("<{}>", ty.name()))
        }
    }
}

/// Convert a whole row.
pub fn from_row(row: &Row) -> Vec<Value> {
    (0..row.columns().len())
        .map(|idx| from_row_column(row, idx))
        .collect()
}

type DecodeResult = std::result::Result<Value, tokio_postgres::Error>;

// Lexical forms shared by the scalar and array element decoders.

fn timestamp_value(t: chrono::NaiveDateTime) -> Value {
    Value::Timestamp(t.format("%Y-%m-%d %H:%M:%S%.f").to_string())
}

fn timestamptz_value(t: chrono::DateTime<chrono::Utc>) -> Value {
    Value::TimestampTz(t.format("%Y-%m-%d %H:%M:%S%.f+00").to_string())
}

fn date_value(d: chrono::NaiveDate) -> Value {
    Value::Date(d.format("%Y-%m-%d").to_string())
}

fn time_value(t: chrono::NaiveTime) -> Value {
    Value::Time(t.format("%H:%M:%S%.f").to_string())
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> DecodeResult {
    macro_rules! get {
        ($rust:ty, $variant:expr) => {
            row.try_get::<_, Option<$rust>>(idx)
                .map(|opt| opt.map($variant).unwrap_or(Value::Null))
        };
    }

    match *ty {
        Type::BOOL => get!(bool, Value::Bool),
        Type::INT2 => get!(i16, Value::Int16),
        Type::INT4 => get!(i32, Value::Int32),
        Type::INT8 => get!(i64, Value::Int64),
        Type::FLOAT4 => get!(f32, Value::Float32),
        Type::FLOAT8 => get!(f64, Value::Float64),
        Type::NUMERIC => get!(pg::Numeric, |n: pg::Numeric| Value::Numeric(n.0)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get!(String, Value::Text)
        }
        Type::JSON | Type::JSONB => get!(serde_json::Value, Value::Json),
        Type::TIMESTAMP => get!(chrono::NaiveDateTime, timestamp_value),
        Type::TIMESTAMPTZ => get!(chrono::DateTime<chrono::Utc>, timestamptz_value),
        Type::DATE => get!(chrono::NaiveDate, date_value),
        Type::TIME => get!(chrono::NaiveTime, time_value),
        Type::TIMETZ => get!(pg::TimeTz, |t: pg::TimeTz| Value::TimeTz(t.0)),
        Type::UUID => get!(uuid::Uuid, Value::Uuid),
        Type::BYTEA => get!(Vec<u8>, Value::Bytea),
        Type::INTERVAL => get!(pg::Interval, |i: pg::Interval| Value::Interval(i.0)),
        Type::POINT => get!(pg::Point, |p: pg::Point| Value::Point { x: p.x, y: p.y }),
        Type::INET => get!(pg::Inet, |i: pg::Inet| Value::Inet(i.0)),
        Type::CIDR => get!(pg::Cidr, |c: pg::Cidr| Value::Cidr(c.0)),
        Type::MACADDR => get!(pg::MacAddr, |m: pg::MacAddr| Value::MacAddr(m.0)),
        _ => match ty.kind() {
            Kind::Array(inner) => decode_array(row, idx, inner),
            _ => get!(pg::AnyText, |t: pg::AnyText| Value::Unknown(t.0)),
        },
    }
}

/// Decode an array column element-wise. Every inner type the scalar path
/// handles decodes here too; `Unknown` is reserved for genuinely
/// unforeseen element types.
fn decode_array(row: &Row, idx: usize, inner: &Type) -> DecodeResult {
    macro_rules! get_vec {
        ($rust:ty, $variant:expr) => {
            row.try_get::<_, Option<Vec<Option<$rust>>>>(idx).map(|opt| {
                opt.map(|items| {
                    Value::Array(
                        items
                            .into_iter()
                            .map(|item| item.map($variant).unwrap_or(Value::Null))
                            .collect(),
                    )
                })
                .unwrap_or(Value::Null)
            })
        };
    }

    match *inner {
        Type::BOOL => get_vec!(bool, Value::Bool),
        Type::INT2 => get_vec!(i16, Value::Int16),
        Type::INT4 => get_vec!(i32, Value::Int32),
        Type::INT8 => get_vec!(i64, Value::Int64),
        Type::FLOAT4 => get_vec!(f32, Value::Float32),
        Type::FLOAT8 => get_vec!(f64, Value::Float64),
        Type::NUMERIC => get_vec!(pg::Numeric, |n: pg::Numeric| Value::Numeric(n.0)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get_vec!(String, Value::Text)
        }
        Type::JSON | Type::JSONB => get_vec!(serde_json::Value, Value::Json),
        Type::TIMESTAMP => get_vec!(chrono::NaiveDateTime, timestamp_value),
        Type::TIMESTAMPTZ => get_vec!(chrono::DateTime<chrono::Utc>, timestamptz_value),
        Type::DATE => get_vec!(chrono::NaiveDate, date_value),
        Type::TIME => get_vec!(chrono::NaiveTime, time_value),
        Type::TIMETZ => get_vec!(pg::TimeTz, |t: pg::TimeTz| Value::TimeTz(t.0)),
        Type::UUID => get_vec!(uuid::Uuid, Value::Uuid),
        Type::BYTEA => get_vec!(Vec<u8>, Value::Bytea),
        Type::INTERVAL => get_vec!(pg::Interval, |i: pg::Interval| Value::Interval(i.0)),
        Type::POINT => get_vec!(pg::Point, |p: pg::Point| Value::Point { x: p.x, y: p.y }),
        Type::INET => get_vec!(pg::Inet, |i: pg::Inet| Value::Inet(i.0)),
        Type::CIDR => get_vec!(pg::Cidr, |c: pg::Cidr| Value::Cidr(c.0)),
        Type::MACADDR => get_vec!(pg::MacAddr, |m: pg::MacAddr| Value::MacAddr(m.0)),
        _ => Ok(Value::Unknown(format!("<{}[]>", inner.name()))),
    }
}

/// Binary-protocol decoders for the types the driver's feature flags do not
/// cover. Each wrapper renders straight to the lexical form [`Value`] keeps.
mod pg {
    use std::error::Error;

    use tokio_postgres::types::{FromSql, Type};

    type BoxError = Box<dyn Error + Sync + Send>;

    fn read_i16(raw: &[u8], at: usize) -> i16 {
        i16::from_be_bytes([raw[at], raw[at + 1]])
    }

    fn read_u16(raw: &[u8], at: usize) -> u16 {
        u16::from_be_bytes([raw[at], raw[at + 1]])
    }

    fn read_i32(raw: &[u8], at: usize) -> i32 {
        i32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
    }

    fn read_i64(raw: &[u8], at: usize) -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&raw[at..at + 8]);
        i64::from_be_bytes(buf)
    }

    fn read_f64(raw: &[u8], at: usize) -> f64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&raw[at..at + 8]);
        f64::from_be_bytes(buf)
    }

    /// `numeric` rendered as its decimal string.
    pub struct Numeric(pub String);

    impl<'a> FromSql<'a> for Numeric {
        fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
            Ok(Numeric(decode_numeric(raw)?))
        }

        fn accepts(ty: &Type) -> bool {
            *ty == Type::NUMERIC
        }
    }

    /// Decode the base-10000 wire format of `numeric`.
    pub(super) fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
        if raw.len() < 8 {
            return Err("numeric value too short".into());
        }
        let ndigits = read_u16(raw, 0) as usize;
        let weight = read_i16(raw, 2) as i32;
        let sign = read_u16(raw, 4);
        let dscale = read_u16(raw, 6) as usize;
        if raw.len() < 8 + ndigits * 2 {
            return Err("numeric digit groups truncated".into());
        }
        match sign {
            0xC000 => return Ok("NaN".to_string()),
            0xD000 => return Ok("Infinity".to_string()),
            0xF000 => return Ok("-Infinity".to_string()),
            _ => {}
        }

        let digits: Vec<i16> = (0..ndigits).map(|i| read_i16(raw, 8 + i * 2)).collect();

        let mut int_part = String::new();
        if weight >= 0 {
            for i in 0..=(weight as usize) {
                let group = digits.get(i).copied().unwrap_or(0);
                if i == 0 {
                    int_part.push_str(&group.to_string());
                } else {
                    int_part.push_str(&format!("{:04}", group));
                }
            }
        } else {
            int_part.push('0');
        }

        let mut frac_part = String::new();
        if dscale > 0 {
            let first_frac = (weight + 1).max(0) as usize;
            // Leading zero groups when the first digit group sits below the decimal point
            for _ in 0..((-(weight + 1)).max(0) as usize) {
                frac_part.push_str("0000");
            }
            for i in first_frac..ndigits {
                frac_part.push_str(&format!("{:04}", digits[i]));
            }
            if frac_part.len() > dscale {
                frac_part.truncate(dscale);
            } else {
                while frac_part.len() < dscale {
                    frac_part.push('0');
                }
            }
        }

        let mut out = String::new();
        if sign == 0x4000 {
            out.push('-');
        }
        out.push_str(&int_part);
        if !frac_part.is_empty() {
            out.push('.');
            out.push_str(&frac_part);
        }
        Ok(out)
    }

    /// `interval` rendered as an ISO 8601 duration.
    pub struct Interval(pub String);

    impl<'a> FromSql<'a> for Interval {
        fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
            if raw.len() < 16 {
                return Err("interval value too short".into());
            }
            let micros = read_i64(raw, 0);
            let days = read_i32(raw, 8);
            let months = read_i32(raw, 12);
            Ok(Interval(format_interval(months, days, micros)))
        }

        fn accepts(ty: &Type) -> bool {
            *ty == Type::INTERVAL
        }
    }

    pub(super) fn format_interval(months: i32, days: i32, micros: i64) -> String {
        let years = months / 12;
        let months = months % 12;
        let mut out = String::from("P");
        if years != 0 {
            out.push_str(&format!("{}Y", years));
        }
        if months != 0 {
            out.push_str(&format!("{}M", months));
        }
        if days != 0 {
            out.push_str(&format!("{}D", days));
        }
        if micros != 0 {
            out.push('T');
            let hours = micros / 3_600_000_000;
            let minutes = (micros % 3_600_000_000) / 60_000_000;
            let secs_micros = micros % 60_000_000;
            if hours != 0 {
                out.push_str(&format!("{}H", hours));
            }
            if minutes != 0 {
                out.push_str(&format!("{}M", minutes));
            }
            if secs_micros != 0 {
                let secs = secs_micros as f64 / 1_000_000.0;
                // Trim trailing zeros from fractional seconds
                let formatted = format!("{}", secs);
                out.push_str(&format!("{}S", formatted));
            }
        }
        if out == "P" {
            out.push_str("T0S");
        }
        out
    }

    /// `point` as its two coordinates.
    pub struct Point {
        pub x: f64,
        pub y: f64,
    }

    impl<'a> FromSql<'a> for Point {
        fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
            if raw.len() < 16 {
                return Err("point value too short".into());
            }
            Ok(Point {
                x: read_f64(raw, 0),
                y: read_f64(raw, 8),
            })
        }

        fn accepts(ty: &Type) -> bool {
            *ty == Type::POINT
        }
    }

    /// `timetz` rendered as `HH:MM:SS[.ffffff]±HH[:MM]`.
    pub struct TimeTz(pub String);

    impl<'a> FromSql<'a> for TimeTz {
        fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
            if raw.len() < 12 {
                return Err("timetz value too short".into());
            }
            let micros = read_i64(raw, 0);
            // Wire value is seconds west of UTC; the displayed offset flips the sign
            let zone_secs = -read_i32(raw, 8);
            Ok(TimeTz(format_timetz(micros, zone_secs)))
        }

        fn accepts(ty: &Type) -> bool {
            *ty == Type::TIMETZ
        }
    }

    pub(super) fn format_timetz(micros: i64, zone_secs: i32) -> String {
        let total_secs = micros / 1_000_000;
        let frac = micros % 1_000_000;
        let h = total_secs / 3600;
        let m = (total_secs % 3600) / 60;
        let s = total_secs % 60;
        let mut out = format!("{:02}:{:02}:{:02}", h, m, s);
        if frac != 0 {
            out.push_str(format!(".{:06}", frac).trim_end_matches('0'));
        }
        let sign = if zone_secs < 0 { '-' } else { '+' };
        let z = zone_secs.abs();
        let zh = z / 3600;
        let zm = (z % 3600) / 60;
        if zm != 0 {
            out.push_str(&format!("{}{:02}:{:02}", sign, zh, zm));
        } else {
            out.push_str(&format!("{}{:02}", sign, zh));
        }
        out
    }

    /// Shared wire layout for `inet` and `cidr`.
    fn decode_inet(raw: &[u8], always_mask: bool) -> Result<String, BoxError> {
        if raw.len() < 4 {
            return Err("inet value too short".into());
        }
        let bits = raw[1];
        let nb = raw[3] as usize;
        let addr = &raw[4..];
        if addr.len() < nb {
            return Err("inet address truncated".into());
        }
        let (text, full) = match nb {
            4 => {
                let ip = std::net::Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]);
                (ip.to_string(), 32)
            }
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&addr[..16]);
                (std::net::Ipv6Addr::from(octets).to_string(), 128)
            }
            n => return Err(format!("unexpected inet address length: {}", n).into()),
        };
        if always_mask || bits != full {
            Ok(format!("{}/{}", text, bits))
        } else {
            Ok(text)
        }
    }

    pub struct Inet(pub String);

    impl<'a> FromSql<'a> for Inet {
        fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
            Ok(Inet(decode_inet(raw, false)?))
        }

        fn accepts(ty: &Type) -> bool {
            *ty == Type::INET
        }
    }

    pub struct Cidr(pub String);

    impl<'a> FromSql<'a> for Cidr {
        fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
            Ok(Cidr(decode_inet(raw, true)?))
        }

        fn accepts(ty: &Type) -> bool {
            *ty == Type::CIDR
        }
    }

    pub struct MacAddr(pub String);

    impl<'a> FromSql<'a> for MacAddr {
        fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
            if raw.len() < 6 {
                return Err("macaddr value too short".into());
            }
            Ok(MacAddr(format!(
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5]
            )))
        }

        fn accepts(ty: &Type) -> bool {
            *ty == Type::MACADDR
        }
    }

    /// Last-resort decoder: accept anything and keep the UTF-8 text if the
    /// wire bytes happen to be text (enum labels, citext, domains over text).
    pub struct AnyText(pub String);

    impl<'a> FromSql<'a> for AnyText {
        fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
            match std::str::from_utf8(raw) {
                Ok(s) => Ok(AnyText(s.to_string())),
                Err(_) => Ok(AnyText(format!("<{}>", ty.name()))),
            }
        }

        fn accepts(_ty: &Type) -> bool {
            true
        }
    }
}
