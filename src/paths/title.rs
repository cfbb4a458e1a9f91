use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use unicode_normalization::UnicodeNormalization;

/// Case- and normalization-insensitive key for matching reference targets to page titles.
///
/// Two titles are the same page target when their NFC forms compare equal after trimming and
/// lowercasing, so `Café` (precomposed), `Cafe\u{301}` and ` CAFÉ ` share one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TitleKey(String);

impl TitleKey {
    pub fn new(title: &str) -> TitleKey {
        TitleKey(title.trim().nfc().collect::<String>().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for TitleKey {
    fn from(title: &str) -> Self {
        TitleKey::new(title)
    }
}

impl Display for TitleKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
