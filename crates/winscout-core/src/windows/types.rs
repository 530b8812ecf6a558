use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::providers::ProviderId;

/// Opaque platform identifier for a window.
///
/// Not unique across time, and several records (tabs of one process) may
/// legitimately share a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(u64);

impl WindowHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for WindowHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One window as reported by a provider or the worker, before reconciliation.
///
/// Field names match the worker wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub hwnd: WindowHandle,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub process_name: String,
    #[serde(default)]
    pub executable_path: String,
    #[serde(default)]
    pub is_fallback: bool,
}

impl WindowInfo {
    pub fn new(hwnd: impl Into<WindowHandle>, title: impl Into<String>) -> Self {
        Self {
            hwnd: hwnd.into(),
            title: title.into(),
            process_name: String::new(),
            executable_path: String::new(),
            is_fallback: false,
        }
    }

    pub fn with_process(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.process_name = name.into();
        self.executable_path = path.into();
        self
    }

    pub fn fallback(mut self) -> Self {
        self.is_fallback = true;
        self
    }
}

/// Process-unique identity of a [`WindowRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Opaque image data produced by an [`ImageLookup`](crate::providers::ImageLookup).
#[derive(Clone, PartialEq, Eq)]
pub struct ImageHandle(Arc<[u8]>);

impl ImageHandle {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageHandle({} bytes)", self.0.len())
    }
}

/// Descriptive fields of a record, replaced on every matching refresh.
#[derive(Debug, Clone)]
struct RecordDetails {
    title: String,
    process_name: String,
    executable_path: String,
    is_fallback: bool,
}

/// The canonical entity for one discoverable window or tab.
///
/// Records are shared as `Arc<WindowRecord>`; a record matched across
/// refreshes is the same allocation until it is evicted. `id`, `handle`
/// and `source` never change after creation.
#[derive(Debug)]
pub struct WindowRecord {
    id: RecordId,
    handle: WindowHandle,
    source: ProviderId,
    details: RwLock<RecordDetails>,
    image: RwLock<Option<ImageHandle>>,
}

impl WindowRecord {
    pub(crate) fn from_info(info: WindowInfo, source: ProviderId) -> Self {
        Self {
            id: RecordId::next(),
            handle: info.hwnd,
            source,
            details: RwLock::new(RecordDetails {
                title: info.title,
                process_name: info.process_name,
                executable_path: info.executable_path,
                is_fallback: info.is_fallback,
            }),
            image: RwLock::new(None),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn source(&self) -> &ProviderId {
        &self.source
    }

    pub fn title(&self) -> String {
        self.read_details().title.clone()
    }

    pub fn process_name(&self) -> String {
        self.read_details().process_name.clone()
    }

    pub fn executable_path(&self) -> String {
        self.read_details().executable_path.clone()
    }

    pub fn is_fallback(&self) -> bool {
        self.read_details().is_fallback
    }

    pub fn image(&self) -> Option<ImageHandle> {
        self.image
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn title_matches(&self, title: &str) -> bool {
        self.read_details().title == title
    }

    /// Copy the mutable fields of a newer observation onto this record.
    ///
    /// A changed executable path drops the cached image so the next image
    /// pass looks it up again.
    pub(crate) fn update_from(&self, info: WindowInfo) {
        let mut details = self.details.write().unwrap_or_else(PoisonError::into_inner);
        let path_changed = details.executable_path != info.executable_path;
        details.title = info.title;
        details.process_name = info.process_name;
        details.executable_path = info.executable_path;
        details.is_fallback = info.is_fallback;
        drop(details);

        if path_changed {
            *self.image.write().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }

    pub(crate) fn set_image(&self, image: ImageHandle) {
        *self.image.write().unwrap_or_else(PoisonError::into_inner) = Some(image);
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        let details = self.read_details();
        WindowSnapshot {
            id: self.id,
            hwnd: self.handle,
            title: details.title.clone(),
            process_name: details.process_name.clone(),
            executable_path: details.executable_path.clone(),
            is_fallback: details.is_fallback,
            source: self.source.as_str().to_string(),
            has_image: self.image().is_some(),
        }
    }

    fn read_details(&self) -> std::sync::RwLockReadGuard<'_, RecordDetails> {
        self.details.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Immutable copy of a [`WindowRecord`] handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub id: RecordId,
    pub hwnd: WindowHandle,
    pub title: String,
    pub process_name: String,
    pub executable_path: String,
    pub is_fallback: bool,
    pub source: String,
    pub has_image: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_info_wire_names() {
        let info = WindowInfo::new(555u64, "Tab A")
            .with_process("chrome", "/usr/bin/chrome")
            .fallback();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["hwnd"], 555);
        assert_eq!(json["title"], "Tab A");
        assert_eq!(json["processName"], "chrome");
        assert_eq!(json["executablePath"], "/usr/bin/chrome");
        assert_eq!(json["isFallback"], true);
    }

    #[test]
    fn test_window_info_missing_optional_fields() {
        let info: WindowInfo = serde_json::from_str(r#"{"hwnd": 7}"#).unwrap();
        assert_eq!(info.hwnd, WindowHandle::new(7));
        assert!(info.title.is_empty());
        assert!(!info.is_fallback);
    }

    #[test]
    fn test_record_ids_are_unique() {
        let source = ProviderId::new("test");
        let a = WindowRecord::from_info(WindowInfo::new(1u64, "a"), source.clone());
        let b = WindowRecord::from_info(WindowInfo::new(1u64, "a"), source);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_update_from_keeps_identity_and_source() {
        let record = WindowRecord::from_info(
            WindowInfo::new(9u64, "old").with_process("app", "/bin/app"),
            ProviderId::new("first"),
        );
        let id = record.id();
        record.update_from(WindowInfo::new(9u64, "new").with_process("app2", "/bin/app"));
        assert_eq!(record.id(), id);
        assert_eq!(record.title(), "new");
        assert_eq!(record.process_name(), "app2");
        assert_eq!(record.source().as_str(), "first");
    }

    #[test]
    fn test_update_from_clears_image_when_path_changes() {
        let record = WindowRecord::from_info(
            WindowInfo::new(1u64, "t").with_process("app", "/bin/app"),
            ProviderId::new("p"),
        );
        record.set_image(ImageHandle::new(vec![1u8, 2, 3]));

        record.update_from(WindowInfo::new(1u64, "t2").with_process("app", "/bin/app"));
        assert!(record.image().is_some());

        record.update_from(WindowInfo::new(1u64, "t2").with_process("app", "/opt/app"));
        assert!(record.image().is_none());
    }

    #[test]
    fn test_snapshot_copies_fields() {
        let record = WindowRecord::from_info(
            WindowInfo::new(3u64, "Editor").with_process("code", "/usr/bin/code"),
            ProviderId::new("native"),
        );
        let snapshot = record.snapshot();
        assert_eq!(snapshot.id, record.id());
        assert_eq!(snapshot.title, "Editor");
        assert_eq!(snapshot.source, "native");
        assert!(!snapshot.has_image);
    }
}
