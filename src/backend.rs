//! Capability-typed collections of backend instances with fallback order
//! (§4.4). A backend instance is a concrete implementor of one or more of
//! the four capabilities below; the Strategy Manager (§strategy.rs) walks
//! `ElementSource` instances to build its strategy catalog.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OpticsError;
use crate::strategy::ElementKind;

/// One of the four capability kinds a backend instance may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Drive,
    ElementSource,
    TextDetect,
    ImageDetect,
}

/// On-disk config record for one backend instance (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

fn default_true() -> bool {
    true
}

/// A driver that launches and terminates without talking to any real
/// device or browser. A concrete `appium`/`selenium`/... driver is an
/// external collaborator this crate does not implement (§1 Non-goals);
/// this stands in for one so a suite with no real `ElementSource`/
/// `TextDetect`/`ImageDetect` backends configured can still run timing
/// and session-lifecycle keywords end to end (§4.14).
pub struct NullDriver;

#[async_trait]
impl Drive for NullDriver {
    fn name(&self) -> &str {
        "null"
    }
    async fn launch(&self) -> Result<(), OpticsError> {
        Ok(())
    }
    async fn terminate(&self) -> Result<(), OpticsError> {
        Ok(())
    }
}

/// A screen-capturing, element-locating backend. Implementors that cannot
/// support a method leave its default body in place, which reports
/// "not implemented" via `is_supported` rather than silently succeeding —
/// mirroring the source's "stub body does not count as supported" rule
/// (§4.4).
#[async_trait]
pub trait Drive: Send + Sync {
    fn name(&self) -> &str;
    async fn launch(&self) -> Result<(), OpticsError>;
    async fn terminate(&self) -> Result<(), OpticsError>;
    fn is_supported(&self) -> bool {
        true
    }
}

/// A page-source / native element locator.
#[async_trait]
pub trait ElementSource: Send + Sync {
    fn name(&self) -> &str;

    /// Native locate for Text/CSS/XPath kinds (strategy #1/#2, §4.5.2).
    async fn locate(&self, element: &str, kind: ElementKind) -> Result<(i32, i32), OpticsError>;

    /// Screenshot capture; used by OCR/image strategies and by the AOI
    /// pipeline (§4.5.5, §4.5.6).
    async fn capture_screenshot(&self) -> Result<Vec<u8>, OpticsError> {
        Err(OpticsError::new(crate::error::Code::E0101, "screenshot capture not implemented"))
    }

    /// Pixel dimensions of the frame `capture_screenshot` returns, needed
    /// to convert an AOI's percentage bounds to pixel bounds before
    /// cropping (§4.5.5).
    async fn screen_dimensions(&self) -> Result<(u32, u32), OpticsError> {
        Err(OpticsError::new(crate::error::Code::E0101, "screen dimensions not available"))
    }

    fn supports_locate(&self) -> bool {
        true
    }

    fn supports_screenshot(&self) -> bool {
        false
    }
}

/// An OCR engine.
#[async_trait]
pub trait TextDetect: Send + Sync {
    fn name(&self) -> &str;
    async fn detect(&self, frame: &[u8], text: &str) -> Result<Option<(i32, i32)>, OpticsError>;
    fn is_supported(&self) -> bool {
        true
    }
}

/// An image matcher.
#[async_trait]
pub trait ImageDetect: Send + Sync {
    fn name(&self) -> &str;
    async fn detect(&self, frame: &[u8], template_path: &str) -> Result<Option<(i32, i32)>, OpticsError>;
    fn is_supported(&self) -> bool {
        true
    }
}

/// Wraps an ordered, enabled-only instance list for one capability.
/// Callers may iterate in priority order or pin the current instance
/// (§4.4).
pub struct InstanceFallback<T: ?Sized> {
    instances: Vec<Arc<T>>,
    current: usize,
}

impl<T: ?Sized> InstanceFallback<T> {
    pub fn new(instances: Vec<Arc<T>>) -> Self {
        Self {
            instances,
            current: 0,
        }
    }

    pub fn current_instance(&self) -> Option<&Arc<T>> {
        self.instances.get(self.current)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.instances.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn pin(&mut self, index: usize) {
        if index < self.instances.len() {
            self.current = index;
        }
    }
}

/// Per-session collection of enabled backend instances, grouped by
/// capability, in declared priority order (§4.4).
pub struct BackendRegistry {
    pub drivers: InstanceFallback<dyn Drive>,
    pub element_sources: InstanceFallback<dyn ElementSource>,
    pub text_detectors: InstanceFallback<dyn TextDetect>,
    pub image_detectors: InstanceFallback<dyn ImageDetect>,
}

impl BackendRegistry {
    pub fn new(
        drivers: Vec<Arc<dyn Drive>>,
        element_sources: Vec<Arc<dyn ElementSource>>,
        text_detectors: Vec<Arc<dyn TextDetect>>,
        image_detectors: Vec<Arc<dyn ImageDetect>>,
    ) -> Self {
        Self {
            drivers: InstanceFallback::new(drivers),
            element_sources: InstanceFallback::new(element_sources),
            text_detectors: InstanceFallback::new(text_detectors),
            image_detectors: InstanceFallback::new(image_detectors),
        }
    }

    /// The primary driver: the first enabled `Drive` instance (§4.6).
    pub fn primary_driver(&self) -> Option<&Arc<dyn Drive>> {
        self.drivers.current_instance()
    }

    pub fn capability_summary(&self) -> HashMap<Capability, usize> {
        let mut out = HashMap::new();
        out.insert(Capability::Drive, self.drivers.iter().count());
        out.insert(Capability::ElementSource, self.element_sources.iter().count());
        out.insert(Capability::TextDetect, self.text_detectors.iter().count());
        out.insert(Capability::ImageDetect, self.image_detectors.iter().count());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDriver;

    #[async_trait]
    impl Drive for NullDriver {
        fn name(&self) -> &str {
            "null"
        }
        async fn launch(&self) -> Result<(), OpticsError> {
            Ok(())
        }
        async fn terminate(&self) -> Result<(), OpticsError> {
            Ok(())
        }
    }

    #[test]
    fn instance_fallback_reports_current_instance() {
        let fb: InstanceFallback<dyn Drive> = InstanceFallback::new(vec![Arc::new(NullDriver)]);
        assert!(fb.current_instance().is_some());
        assert_eq!(fb.current_instance().unwrap().name(), "null");
    }

    #[test]
    fn empty_registry_has_no_primary_driver() {
        let registry = BackendRegistry::new(vec![], vec![], vec![], vec![]);
        assert!(registry.primary_driver().is_none());
    }
}
