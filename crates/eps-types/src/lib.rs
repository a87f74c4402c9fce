/// Errors that can occur when creating validated primitive types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypesError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The input was not a hexadecimal serial number
    #[error("Invalid serial number: {0}")]
    InvalidSerialNumber(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Arguments
    ///
    /// * `input` - Any type that can be converted to a string reference
    ///
    /// # Returns
    ///
    /// Returns `Ok(NonEmptyText)` if the trimmed input is non-empty,
    /// or `Err(TypesError::Empty)` if it's empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypesError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypesError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A certificate serial number as lowercase hexadecimal.
///
/// Serial numbers are compared by value: leading zero octets (such as the sign byte DER adds
/// to a serial with its high bit set) are stripped, and a zero serial is `"00"`. Certificates
/// and revocation list entries are matched through this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SerialNumberHex(String);

impl SerialNumberHex {
    /// Build from the big-endian serial number octets.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let significant = match bytes.iter().position(|b| *b != 0) {
            Some(first) => &bytes[first..],
            None => &[0u8][..],
        };
        Self(hex::encode(significant))
    }

    /// Parse a hexadecimal serial number.
    ///
    /// Case is ignored and `:` or space separators (as printed by most certificate tools) are
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns `TypesError::InvalidSerialNumber` if the input is empty or not hexadecimal.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TypesError> {
        let raw = input.as_ref();
        let mut digits: String = raw
            .chars()
            .filter(|c| *c != ':' && !c.is_whitespace())
            .collect();
        if digits.is_empty() {
            return Err(TypesError::InvalidSerialNumber(raw.to_owned()));
        }
        if digits.len() % 2 == 1 {
            digits.insert(0, '0');
        }
        let bytes =
            hex::decode(&digits).map_err(|_| TypesError::InvalidSerialNumber(raw.to_owned()))?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Returns the lowercase hex digits.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SerialNumberHex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SerialNumberHex {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for SerialNumberHex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for SerialNumberHex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SerialNumberHex::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  MIIC  ").unwrap();
        assert_eq!(text.as_str(), "MIIC");
        assert_eq!(NonEmptyText::new(" \n\t "), Err(TypesError::Empty));
    }

    #[test]
    fn non_empty_text_rejects_empty_json() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"   \"");
        assert!(result.is_err());
    }

    #[test]
    fn serial_ignores_leading_zero_octets() {
        let with_sign_byte = SerialNumberHex::from_bytes(&[0x00, 0x9f, 0x01]);
        let without = SerialNumberHex::from_bytes(&[0x9f, 0x01]);
        assert_eq!(with_sign_byte, without);
        assert_eq!(without.as_str(), "9f01");
        assert_eq!(SerialNumberHex::from_bytes(&[0, 0]).as_str(), "00");
    }

    #[test]
    fn serial_parse_accepts_tool_formats() {
        let expected = SerialNumberHex::from_bytes(&[0x0a, 0xbc, 0xde]);
        assert_eq!(SerialNumberHex::parse("0A:BC:DE").unwrap(), expected);
        assert_eq!(SerialNumberHex::parse("abcde").unwrap(), expected);
        assert_eq!("00abcde".parse::<SerialNumberHex>().unwrap(), expected);
    }

    #[test]
    fn serial_parse_rejects_non_hex() {
        assert!(matches!(
            SerialNumberHex::parse("xyz"),
            Err(TypesError::InvalidSerialNumber(_))
        ));
        assert!(matches!(
            SerialNumberHex::parse(""),
            Err(TypesError::InvalidSerialNumber(_))
        ));
    }
}
