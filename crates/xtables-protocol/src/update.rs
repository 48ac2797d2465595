//! The subscription-delivery unit, and the category that routes it between
//! per-key/wildcard dispatch, log dispatch, and the telemetry responder.

/// Which bucket an [`Update`] belongs to once it reaches the Sub transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Category {
    Update = 0,
    Publish = 1,
    Log = 2,
    Information = 3,
    Registry = 4,
}

impl Category {
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Category::Update,
            1 => Category::Publish,
            2 => Category::Log,
            3 => Category::Information,
            4 => Category::Registry,
            _ => return None,
        })
    }

    pub(crate) fn tag(self) -> u8 {
        self as u8
    }

    /// INFORMATION/REGISTRY are server solicitations: they never reach the
    /// coalescing buffer, only the telemetry responder.
    pub fn is_solicitation(self) -> bool {
        matches!(self, Category::Information | Category::Registry)
    }
}

/// A subscription-frame payload: `{category, key, value}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub category: Category,
    pub key: String,
    pub value: Vec<u8>,
}

impl Update {
    pub fn new(category: Category, key: impl Into<String>, value: Vec<u8>) -> Self {
        Update {
            category,
            key: key.into(),
            value,
        }
    }
}
