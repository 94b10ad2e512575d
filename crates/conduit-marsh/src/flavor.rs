use std::fmt;

/// A named direction/encoding for the mapping engine. Descriptor graphs
/// are flavor-specific and cached per flavor (the same type walked for
/// `JsonEncode` and `JsonDecode` yields two distinct graphs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    JsonEncode,
    JsonDecode,
    BinaryEncode,
    BinaryDecode,
}

impl Flavor {
    pub fn as_str(self) -> &'static str {
        match self {
            Flavor::JsonEncode => "json-encode",
            Flavor::JsonDecode => "json-decode",
            Flavor::BinaryEncode => "binary-encode",
            Flavor::BinaryDecode => "binary-decode",
        }
    }

    /// `flavor:qualified-name`, the full name a [`crate::descriptor::Descriptor::Ref`]
    /// resolves through the Linker's name registry.
    pub fn qualify(self, name: &str) -> String {
        format!("{}:{}", self.as_str(), name)
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
