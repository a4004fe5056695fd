//! Stable error taxonomy shared by every component.
//!
//! Codes are grouped by leading digit of the 4-digit numeric part and
//! prefixed `E` (error), `W` (warning) or `X` (exhausted/terminal). See
//! `SPEC_FULL.md` §7 for the authoritative table this mirrors.

use std::fmt;

use owo_colors::OwoColorize;

/// Broad grouping used for the HTTP-mappable payload's `type` field
/// (`optics:<category>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Driver,
    Element,
    Screenshot,
    Keyword,
    Config,
    Module,
    Test,
    General,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Driver => "driver",
            Category::Element => "element",
            Category::Screenshot => "screenshot",
            Category::Keyword => "keyword",
            Category::Config => "config",
            Category::Module => "module",
            Category::Test => "test",
            Category::General => "general",
        };
        f.write_str(s)
    }
}

macro_rules! codes {
    ($($variant:ident => $code:literal, $category:ident, $status:literal, $msg:literal;)*) => {
        /// A stable error code. The `Display` impl produces the exact wire
        /// string (e.g. `"E0201"`).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum Code {
            $($variant,)*
        }

        impl Code {
            /// The registry's default message for this code.
            pub fn default_message(self) -> &'static str {
                match self {
                    $(Code::$variant => $msg,)*
                }
            }

            /// The category this code belongs to.
            pub fn category(self) -> Category {
                match self {
                    $(Code::$variant => Category::$category,)*
                }
            }

            /// The default HTTP status this code maps to.
            pub fn default_http_status(self) -> u16 {
                match self {
                    $(Code::$variant => $status,)*
                }
            }

            /// The wire string for this code, e.g. `"E0201"`.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Code::$variant => $code,)*
                }
            }
        }

        impl fmt::Display for Code {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

codes! {
    E0101 => "E0101", Driver, 500, "Driver not initialized";
    E0102 => "E0102", Driver, 500, "Failed to start session / async timeout";
    E0201 => "E0201", Element, 404, "Element not found";
    X0201 => "X0201", Element, 500, "Element not found after all fallbacks";
    E0205 => "E0205", Element, 400, "Invalid element/AOI parameters";
    E0303 => "E0303", Screenshot, 500, "Empty/black screenshot";
    E0401 => "E0401", Keyword, 500, "Action failed";
    X0401 => "X0401", Keyword, 500, "Action failed with exception";
    E0402 => "E0402", Keyword, 404, "Keyword not found";
    E0403 => "E0403", Keyword, 400, "Invalid parameters";
    E0501 => "E0501", Config, 400, "Missing required files";
    E0601 => "E0601", Module, 404, "Module not found";
    E0702 => "E0702", Test, 404, "Parameter resolution failed";
    E0801 => "E0801", General, 500, "Unexpected";
}

impl Code {
    /// Whether a failure carrying this code should be treated as a
    /// "try the next candidate" signal by the scheduler, rather than a
    /// hard failure (§4.7.2 step 3e, §4.7.6).
    ///
    /// This is the `retryable()` predicate the spec's Design Notes leave as
    /// an open implementation choice between a textual `E02*` prefix check
    /// and an explicit predicate on the error type; here it is the latter.
    pub fn retryable(self) -> bool {
        matches!(self, Code::E0201 | Code::E0205 | Code::X0201)
    }
}

/// A structured failure: stable code, category, HTTP status, human message,
/// optional free-form details, and an optional error cause chain.
#[derive(Debug)]
pub struct OpticsError {
    pub code: Code,
    pub message: String,
    pub details: Option<String>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    pub meta: Option<serde_json::Value>,
}

impl OpticsError {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            cause: None,
            meta: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn category(&self) -> Category {
        self.code.category()
    }

    pub fn http_status(&self) -> u16 {
        self.code.default_http_status()
    }

    /// Whether this error should make the scheduler try the next
    /// fallback candidate rather than failing the keyword outright.
    pub fn retryable(&self) -> bool {
        self.code.retryable()
    }

    /// The `{type, code, status, message, details?, meta?}` payload shared
    /// by logs and the HTTP surface contract (§4.1).
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "type": format!("optics:{}", self.category()),
            "code": self.code.as_str(),
            "status": self.http_status(),
            "message": self.message,
            "details": self.details,
            "meta": self.meta,
        })
    }

    /// One-line colored rendering for terminal/CLI output, in the style of
    /// the teacher's `owo-colors`-based printer.
    pub fn render(&self) -> String {
        format!(
            "{} {} {}",
            format!("[{}]", self.code).red().bold(),
            self.message,
            self.details
                .as_deref()
                .map(|d| format!("({d})").dimmed().to_string())
                .unwrap_or_default()
        )
    }
}

impl fmt::Display for OpticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for OpticsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("no enabled drivers found in configuration")]
    NoEnabledDrivers,
    #[error("missing required suite file: {0}")]
    MissingSuiteFile(String),
    #[error(transparent)]
    Optics(#[from] OpticsErrorBox),
}

/// `OpticsError` does not implement `Clone` (its `cause` is a trait object),
/// so boundaries that need to hand an error across an owned channel wrap it
/// here. `thiserror`'s `#[from]` needs the wrapped type to implement
/// `std::error::Error`, which this forwards to the inner value.
#[derive(Debug)]
pub struct OpticsErrorBox(pub Box<OpticsError>);

impl fmt::Display for OpticsErrorBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for OpticsErrorBox {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<OpticsError> for OpticsErrorBox {
    fn from(e: OpticsError) -> Self {
        OpticsErrorBox(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_family_codes_are_retryable() {
        assert!(Code::E0201.retryable());
        assert!(Code::X0201.retryable());
        assert!(!Code::E0402.retryable());
        assert!(!Code::E0801.retryable());
    }

    #[test]
    fn payload_shape() {
        let err = OpticsError::new(Code::E0201, "Element not found: login_btn");
        let payload = err.payload();
        assert_eq!(payload["code"], "E0201");
        assert_eq!(payload["status"], 404);
        assert_eq!(payload["type"], "optics:element");
    }

    #[test]
    fn display_matches_code_and_message() {
        let err = OpticsError::new(Code::E0402, "Keyword not found: frobnicate");
        assert_eq!(format!("{err}"), "[E0402] Keyword not found: frobnicate");
    }
}
