use crate::config::NamingConfig;

/// The stored-image naming convention: `{prefix}{index:0digits}{suffix}`.
///
/// The capture loop and the boot-time scanner must share one instance so
/// that every name written can be parsed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNaming {
    prefix: String,
    suffix: String,
    digits: usize,
}

impl ImageNaming {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>, digits: usize) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            digits,
        }
    }

    /// e.g. `img_0042.pgm`. Indices wider than `digits` are not truncated.
    pub fn file_name(&self, index: u32) -> String {
        format!(
            "{prefix}{index:0width$}{suffix}",
            prefix = self.prefix,
            suffix = self.suffix,
            width = self.digits,
        )
    }

    /// Extract the index from a file name, or `None` if the name does not
    /// follow the convention (wrong prefix/suffix, too few digits, non-digit
    /// characters, or an index that overflows `u32`).
    pub fn parse(&self, name: &str) -> Option<u32> {
        let digits = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if digits.len() < self.digits || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl Default for ImageNaming {
    fn default() -> Self {
        Self::from(&NamingConfig::default())
    }
}

impl From<&NamingConfig> for ImageNaming {
    fn from(config: &NamingConfig) -> Self {
        Self::new(&config.prefix, &config.suffix, config.digits)
    }
}
