use serde_json::{json, Value};

/// One item that could not be exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Every item was delivered.
    Completed,
    /// The request failed as a whole; no per-item results exist.
    Rejected(String),
    /// Some items failed; the others were delivered.
    PartialFailure(Vec<ItemFailure>),
}

impl ExportOutcome {
    pub fn from_failures(failures: Vec<ItemFailure>) -> Self {
        if failures.is_empty() {
            Self::Completed
        } else {
            Self::PartialFailure(failures)
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn failures(&self) -> &[ItemFailure] {
        match self {
            Self::PartialFailure(failures) => failures,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Rejected(error) => Some(error),
            _ => None,
        }
    }

    /// Wire shape: `{ok:true}`, `{ok:false,error}` or `{ok:false,failures:[{url,error}]}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Completed => json!({ "ok": true }),
            Self::Rejected(error) => json!({ "ok": false, "error": error }),
            Self::PartialFailure(failures) => json!({
                "ok": false,
                "failures": failures.iter().map(|f| {
                    json!({ "url": f.url, "error": f.error })
                }).collect::<Vec<_>>()
            }),
        }
    }
}
