//! Validator for the Iceberg type grammar (spec.md §3 invariant 3, §7 validation
//! rule 2/5): primitives, `decimal(p,s)`, and nested `list<T>` / `map<K,V>` /
//! `struct<...>`, bounded to a nesting depth of 5.

use crate::error::Error;

pub const MAX_NESTING_DEPTH: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IcebergType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    String,
    Uuid,
    Binary,
    Decimal { precision: u32, scale: u32 },
    List(Box<IcebergType>),
    Map(Box<IcebergType>, Box<IcebergType>),
    Struct(Vec<(String, IcebergType)>),
}

impl IcebergType {
    /// Depth of 1 for a bare primitive; each nesting level adds 1.
    pub fn depth(&self) -> u32 {
        match self {
            IcebergType::List(inner) => 1 + inner.depth(),
            IcebergType::Map(_, v) => 1 + v.depth(),
            IcebergType::Struct(fields) => {
                1 + fields.iter().map(|(_, t)| t.depth()).max().unwrap_or(0)
            }
            _ => 1,
        }
    }
}

/// Parses and validates an Iceberg type string, enforcing the nesting-depth bound.
pub fn parse_iceberg_type(s: &str) -> Result<IcebergType, Error> {
    parse_at_depth(s.trim(), 1)
}

fn parse_at_depth(s: &str, depth: u32) -> Result<IcebergType, Error> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Error::InvalidInput(format!(
            "type nesting depth exceeds max {MAX_NESTING_DEPTH}: {s}"
        )));
    }
    if s.is_empty() {
        return Err(Error::InvalidInput("empty type string".to_string()));
    }

    let open = s.find(['<', '(']);
    let (head, rest) = match open {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    };

    match head {
        "boolean" => Ok(IcebergType::Boolean),
        "int" => Ok(IcebergType::Int),
        "long" => Ok(IcebergType::Long),
        "float" => Ok(IcebergType::Float),
        "double" => Ok(IcebergType::Double),
        "date" => Ok(IcebergType::Date),
        "time" => Ok(IcebergType::Time),
        "timestamp" => Ok(IcebergType::Timestamp),
        "timestamptz" => Ok(IcebergType::TimestampTz),
        "string" => Ok(IcebergType::String),
        "uuid" => Ok(IcebergType::Uuid),
        "binary" => Ok(IcebergType::Binary),
        "decimal" => parse_decimal(s, rest),
        "list" => parse_list(s, rest, depth),
        "map" => parse_map(s, rest, depth),
        "struct" => parse_struct(s, rest, depth),
        other => Err(Error::InvalidInput(format!("unknown iceberg type: {other} (in {s})"))),
    }
}

/// Strips a single matching pair of delimiters from the front of `rest`
/// (`rest` starts with `open` and must end with the matching `close`).
fn strip_delims<'a>(full: &str, rest: &'a str, open: char, close: char) -> Result<&'a str, Error> {
    if !rest.starts_with(open) || !rest.ends_with(close) || rest.len() < 2 {
        return Err(Error::InvalidInput(format!("malformed type: {full}")));
    }
    Ok(&rest[1..rest.len() - 1])
}

fn parse_decimal(full: &str, rest: &str) -> Result<IcebergType, Error> {
    let inner = strip_delims(full, rest, '(', ')')?;
    let parts: Vec<&str> = inner.split(',').map(|s| s.trim()).collect();
    if parts.len() != 2 {
        return Err(Error::InvalidInput(format!(
            "decimal requires precision,scale: {full}"
        )));
    }
    let precision: u32 = parts[0]
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid decimal precision in {full}")))?;
    let scale: u32 = parts[1]
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid decimal scale in {full}")))?;
    if scale > precision {
        return Err(Error::InvalidInput(format!(
            "decimal scale {scale} exceeds precision {precision} in {full}"
        )));
    }
    Ok(IcebergType::Decimal { precision, scale })
}

fn parse_list(full: &str, rest: &str, depth: u32) -> Result<IcebergType, Error> {
    let inner = strip_delims(full, rest, '<', '>')?;
    let inner_type = parse_at_depth(inner.trim(), depth + 1)?;
    Ok(IcebergType::List(Box::new(inner_type)))
}

fn parse_map(full: &str, rest: &str, depth: u32) -> Result<IcebergType, Error> {
    let inner = strip_delims(full, rest, '<', '>')?;
    let (key_str, value_str) = split_top_level_comma(inner)
        .ok_or_else(|| Error::InvalidInput(format!("map requires key,value: {full}")))?;
    let key_type = parse_at_depth(key_str.trim(), depth + 1)?;
    let value_type = parse_at_depth(value_str.trim(), depth + 1)?;
    Ok(IcebergType::Map(Box::new(key_type), Box::new(value_type)))
}

fn parse_struct(full: &str, rest: &str, depth: u32) -> Result<IcebergType, Error> {
    let inner = strip_delims(full, rest, '<', '>')?;
    if inner.trim().is_empty() {
        return Err(Error::InvalidInput(format!("empty struct: {full}")));
    }
    let mut fields = Vec::new();
    for field_str in split_top_level_list(inner) {
        let (name, ty) = field_str
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("struct field missing ':': {full}")))?;
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput(format!(
                "struct field with empty name: {full}"
            )));
        }
        let field_type = parse_at_depth(ty.trim(), depth + 1)?;
        fields.push((name, field_type));
    }
    Ok(IcebergType::Struct(fields))
}

/// Splits `a, b` into `(a, b)` at the first top-level comma (not inside `<...>`/`(...)`).
fn split_top_level_comma(s: &str) -> Option<(&str, &str)> {
    let mut nesting = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '<' | '(' => nesting += 1,
            '>' | ')' => nesting -= 1,
            ',' if nesting == 0 => return Some((&s[..i], &s[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Splits a comma-separated list at top level, for `struct<a:int,b:string>`.
fn split_top_level_list(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut nesting = 0i32;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '<' | '(' => nesting += 1,
            '>' | ')' => nesting -= 1,
            ',' if nesting == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitives() {
        assert_eq!(parse_iceberg_type("boolean").unwrap(), IcebergType::Boolean);
        assert_eq!(parse_iceberg_type("long").unwrap(), IcebergType::Long);
        assert_eq!(parse_iceberg_type("string").unwrap(), IcebergType::String);
    }

    #[test]
    fn parses_decimal() {
        let t = parse_iceberg_type("decimal(10,2)").unwrap();
        assert_eq!(
            t,
            IcebergType::Decimal {
                precision: 10,
                scale: 2
            }
        );
    }

    #[test]
    fn rejects_scale_greater_than_precision() {
        assert!(parse_iceberg_type("decimal(2,10)").is_err());
    }

    #[test]
    fn parses_list() {
        let t = parse_iceberg_type("list<long>").unwrap();
        assert_eq!(t, IcebergType::List(Box::new(IcebergType::Long)));
    }

    #[test]
    fn parses_map() {
        let t = parse_iceberg_type("map<string,long>").unwrap();
        assert_eq!(
            t,
            IcebergType::Map(Box::new(IcebergType::String), Box::new(IcebergType::Long))
        );
    }

    #[test]
    fn parses_struct() {
        let t = parse_iceberg_type("struct<a:int,b:string>").unwrap();
        match t {
            IcebergType::Struct(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].0, "a");
                assert_eq!(fields[1].0, "b");
            }
            _ => panic!("expected struct"),
        }
    }

    #[test]
    fn parses_nested_struct_of_list_of_map() {
        let t = parse_iceberg_type("struct<a:list<map<string,int>>>").unwrap();
        assert_eq!(t.depth(), 4);
    }

    #[test]
    fn rejects_excessive_nesting() {
        let deep = "list<list<list<list<list<long>>>>>";
        assert!(parse_iceberg_type(deep).is_err());
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(parse_iceberg_type("bignum").is_err());
    }

    #[test]
    fn rejects_unterminated_nested_type() {
        assert!(parse_iceberg_type("list<long").is_err());
    }
}
