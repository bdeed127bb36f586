//! Type descriptors handed over by the type checker.
//!
//! Descriptors are assumed well formed; layout computation re-checks only the
//! properties it cannot work without (see [`crate::LayoutError`]). The
//! canonical notation implemented by [`fmt::Display`] and [`FromStr`] is the
//! one used in layout reports and test fixtures:
//!
//! ```text
//! uint8  int128  bool  address
//! uint16[4]  uint256[]  uint8[][3]
//! mapping(address => uint256)
//! struct { uint128 x; bool flag; }
//! ```

use std::fmt;
use std::str::FromStr;

use common::diagnostics::SourceLocation;
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Integer-like value occupying `width_bytes` bytes.
    Scalar { width_bytes: u8, signed: bool },
    FixedArray {
        elem: Box<TypeDescriptor>,
        length: u64,
    },
    DynamicArray(Box<TypeDescriptor>),
    Mapping {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Struct(Vec<StructField>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: SmolStr,
    pub ty: TypeDescriptor,
}

impl StructField {
    pub fn new(name: impl Into<SmolStr>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl TypeDescriptor {
    pub fn uint(bits: u16) -> Self {
        Self::scalar(bits, false)
    }

    pub fn int(bits: u16) -> Self {
        Self::scalar(bits, true)
    }

    /// Widths past `u8::MAX` bytes saturate so layout validation still sees
    /// an oversized scalar.
    fn scalar(bits: u16, signed: bool) -> Self {
        Self::Scalar {
            width_bytes: u8::try_from(bits / 8).unwrap_or(u8::MAX),
            signed,
        }
    }

    pub fn bool() -> Self {
        Self::uint(8)
    }

    pub fn address() -> Self {
        Self::uint(160)
    }

    pub fn array(elem: TypeDescriptor, length: u64) -> Self {
        Self::FixedArray {
            elem: Box::new(elem),
            length,
        }
    }

    pub fn dyn_array(elem: TypeDescriptor) -> Self {
        Self::DynamicArray(Box::new(elem))
    }

    pub fn mapping(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::Mapping {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn structure(fields: impl IntoIterator<Item = StructField>) -> Self {
        Self::Struct(fields.into_iter().collect())
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar { .. })
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar {
                width_bytes,
                signed,
            } => {
                let prefix = if *signed { "int" } else { "uint" };
                write!(f, "{prefix}{}", *width_bytes as u16 * 8)
            }
            Self::FixedArray { elem, length } => write!(f, "{elem}[{length}]"),
            Self::DynamicArray(elem) => write!(f, "{elem}[]"),
            Self::Mapping { key, value } => write!(f, "mapping({key} => {value})"),
            Self::Struct(fields) => {
                write!(f, "struct {{")?;
                for field in fields {
                    write!(f, " {} {};", field.ty, field.name)?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// A top-level stored field, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDecl {
    pub name: SmolStr,
    pub ty: TypeDescriptor,
    pub location: Option<SourceLocation>,
}

impl FieldDecl {
    pub fn new(name: impl Into<SmolStr>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            location: None,
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParseError {
    pub message: String,
    pub offset: usize,
}

impl fmt::Display for TypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for TypeParseError {}

impl FromStr for TypeDescriptor {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = NotationParser::new(s);
        let ty = parser.ty()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ty)
    }
}

/// Parses one `<type> <name>` declaration per line.
///
/// Blank lines and lines starting with `//` are skipped, a trailing `;` is
/// optional. Each declaration records its byte range as its location, using
/// `source` as the source name.
pub fn parse_field_decls(source: &str, text: &str) -> Result<Vec<FieldDecl>, TypeParseError> {
    let mut decls = Vec::new();
    let mut line_start = 0;
    for line in text.split_inclusive('\n') {
        let start = line_start;
        line_start += line.len();

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        let lead = line.len() - line.trim_start().len();
        let mut parser = NotationParser::new(line);
        parser.pos = lead;
        let ty = parser.ty().map_err(|err| TypeParseError {
            offset: err.offset + start,
            ..err
        })?;
        parser.skip_ws();
        let Some(name) = parser.ident() else {
            return Err(TypeParseError {
                message: "expected a field name".into(),
                offset: parser.pos + start,
            });
        };
        let end = parser.pos;
        parser.skip_ws();
        parser.eat(";");
        parser.skip_ws();
        if !parser.at_end() {
            return Err(TypeParseError {
                message: "unexpected trailing input".into(),
                offset: parser.pos + start,
            });
        }
        decls.push(
            FieldDecl::new(name, ty).with_location(SourceLocation::new(
                source,
                (start + lead) as u32,
                (start + end) as u32,
            )),
        );
    }
    Ok(decls)
}

struct NotationParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> NotationParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn error(&self, message: impl Into<String>) -> TypeParseError {
        TypeParseError {
            message: message.into(),
            offset: self.pos,
        }
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), TypeParseError> {
        self.skip_ws();
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{token}`")))
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return None,
        }
        let len = chars
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        self.pos += len;
        Some(&rest[..len])
    }

    fn number(&mut self) -> Option<u64> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        let value = rest[..len].parse().ok()?;
        self.pos += len;
        Some(value)
    }

    fn ty(&mut self) -> Result<TypeDescriptor, TypeParseError> {
        let mut ty = self.base()?;
        loop {
            self.skip_ws();
            if !self.eat("[") {
                return Ok(ty);
            }
            self.skip_ws();
            if self.eat("]") {
                ty = TypeDescriptor::dyn_array(ty);
                continue;
            }
            let Some(length) = self.number() else {
                return Err(self.error("expected an array length"));
            };
            self.expect("]")?;
            ty = TypeDescriptor::array(ty, length);
        }
    }

    fn base(&mut self) -> Result<TypeDescriptor, TypeParseError> {
        self.skip_ws();
        let start = self.pos;
        let Some(word) = self.ident() else {
            return Err(self.error("expected a type"));
        };
        match word {
            "bool" => Ok(TypeDescriptor::bool()),
            "address" => Ok(TypeDescriptor::address()),
            "mapping" => {
                self.expect("(")?;
                let key = self.ty()?;
                self.expect("=>")?;
                let value = self.ty()?;
                self.expect(")")?;
                Ok(TypeDescriptor::mapping(key, value))
            }
            "struct" => {
                self.expect("{")?;
                let mut fields = Vec::new();
                loop {
                    self.skip_ws();
                    if self.eat("}") {
                        return Ok(TypeDescriptor::Struct(fields));
                    }
                    let ty = self.ty()?;
                    self.skip_ws();
                    let Some(name) = self.ident() else {
                        return Err(self.error("expected a member name"));
                    };
                    self.expect(";")?;
                    fields.push(StructField::new(name, ty));
                }
            }
            _ => {
                let (signed, digits) = if let Some(digits) = word.strip_prefix("uint") {
                    (false, digits)
                } else if let Some(digits) = word.strip_prefix("int") {
                    (true, digits)
                } else {
                    self.pos = start;
                    return Err(self.error(format!("unknown type `{word}`")));
                };
                let bits: u32 = if digits.is_empty() {
                    256
                } else {
                    digits.parse().map_err(|_| TypeParseError {
                        message: format!("unknown type `{word}`"),
                        offset: start,
                    })?
                };
                let width_bytes = match u8::try_from(bits / 8) {
                    Ok(width) if width != 0 && bits % 8 == 0 => width,
                    _ => {
                        return Err(TypeParseError {
                            message: format!("invalid integer width in `{word}`"),
                            offset: start,
                        });
                    }
                };
                Ok(TypeDescriptor::Scalar {
                    width_bytes,
                    signed,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> TypeDescriptor {
        s.parse().unwrap()
    }

    #[test]
    fn scalars() {
        assert_eq!(parse("uint8"), TypeDescriptor::uint(8));
        assert_eq!(parse("int128"), TypeDescriptor::int(128));
        assert_eq!(parse("uint"), TypeDescriptor::uint(256));
        assert_eq!(parse("bool"), TypeDescriptor::uint(8));
        assert_eq!(parse("address"), TypeDescriptor::uint(160));
    }

    #[test]
    fn wide_scalars_do_not_wrap() {
        assert_eq!(
            TypeDescriptor::uint(2048),
            TypeDescriptor::Scalar {
                width_bytes: u8::MAX,
                signed: false
            }
        );
        assert_eq!(
            TypeDescriptor::int(4096),
            TypeDescriptor::Scalar {
                width_bytes: u8::MAX,
                signed: true
            }
        );
        assert_eq!(TypeDescriptor::uint(2040), parse("uint2040"));
    }

    #[test]
    fn array_suffixes_apply_left_to_right() {
        let ty = parse("uint8[][3]");
        assert_eq!(
            ty,
            TypeDescriptor::array(TypeDescriptor::dyn_array(TypeDescriptor::uint(8)), 3)
        );
        assert_eq!(ty.to_string(), "uint8[][3]");
    }

    #[test]
    fn nested_notation_displays_back() {
        for src in [
            "mapping(uint256 => uint16[])",
            "struct { uint128 x; int8 y; mapping(uint8 => uint8) m; }",
            "mapping(int32 => struct { uint256[] xs; uint8[4] small; })",
        ] {
            assert_eq!(parse(src).to_string(), src);
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert!("uint7".parse::<TypeDescriptor>().is_err());
        assert!("float".parse::<TypeDescriptor>().is_err());
        assert!("uint8[".parse::<TypeDescriptor>().is_err());
        assert!("mapping(uint8 uint8)".parse::<TypeDescriptor>().is_err());
        assert!("uint8 x".parse::<TypeDescriptor>().is_err());
    }

    #[test]
    fn field_decls_carry_locations() {
        let text = "// counters\nuint8 a;\n\n  uint256[] values\n";
        let decls = parse_field_decls("demo.fe", text).unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name, "a");
        assert_eq!(
            decls[0].location,
            Some(SourceLocation::new("demo.fe", 12, 19))
        );
        assert_eq!(decls[1].name, "values");
        assert_eq!(decls[1].ty, TypeDescriptor::dyn_array(TypeDescriptor::uint(256)));
        assert_eq!(
            decls[1].location,
            Some(SourceLocation::new("demo.fe", 24, 40))
        );
    }

    #[test]
    fn field_decl_errors_are_offset_into_the_text() {
        let err = parse_field_decls("demo.fe", "uint8 a\nuint9 b\n").unwrap_err();
        assert_eq!(err.offset, 8);
    }
}
