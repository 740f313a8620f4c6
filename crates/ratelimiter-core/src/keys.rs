//! Ergonomic input for the `key | [keys]` shape spec.md's public
//! methods all accept.

/// One or more caller-supplied identifiers, before prefixing or
/// empty-key filtering.
#[derive(Debug, Clone)]
pub enum KeyArg {
    One(String),
    Many(Vec<String>),
}

impl KeyArg {
    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            KeyArg::One(k) => vec![k],
            KeyArg::Many(ks) => ks,
        }
    }
}

impl From<&str> for KeyArg {
    fn from(s: &str) -> Self {
        KeyArg::One(s.to_string())
    }
}

impl From<String> for KeyArg {
    fn from(s: String) -> Self {
        KeyArg::One(s)
    }
}

impl From<&String> for KeyArg {
    fn from(s: &String) -> Self {
        KeyArg::One(s.clone())
    }
}

impl From<Vec<String>> for KeyArg {
    fn from(ks: Vec<String>) -> Self {
        KeyArg::Many(ks)
    }
}

impl From<&[&str]> for KeyArg {
    fn from(ks: &[&str]) -> Self {
        KeyArg::Many(ks.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeyArg {
    fn from(ks: [&str; N]) -> Self {
        KeyArg::Many(ks.iter().map(|s| s.to_string()).collect())
    }
}
