//! Playable audio resource handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle to synthesized audio that an [`AudioElement`] can play.
///
/// Clones share the underlying bytes and the released flag. Releasing is the
/// analogue of revoking a transient object URL: the bytes stay alive for any
/// element still holding a clone, but the handle is no longer owned by the
/// cache.
///
/// [`AudioElement`]: crate::core::playback::AudioElement
#[derive(Debug, Clone)]
pub struct AudioResource {
    inner: Arc<ResourceInner>,
}

#[derive(Debug)]
struct ResourceInner {
    id: u64,
    data: Bytes,
    mime_type: &'static str,
    released: AtomicBool,
}

impl AudioResource {
    /// Wrap decoded audio bytes, sniffing the container format.
    pub fn new(data: Bytes) -> Self {
        let mime_type = sniff_mime_type(&data);
        Self::with_mime_type(data, mime_type)
    }

    pub fn with_mime_type(data: Bytes, mime_type: &'static str) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
                data,
                mime_type,
                released: AtomicBool::new(false),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.inner.data
    }

    #[inline]
    pub fn mime_type(&self) -> &'static str {
        self.inner.mime_type
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }

    /// Release the handle. Idempotent; returns `true` on the first call.
    pub fn release(&self) -> bool {
        !self.inner.released.swap(true, Ordering::SeqCst)
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Whether two handles refer to the same resource.
    #[inline]
    pub fn same_as(&self, other: &AudioResource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Detect the container from magic bytes; the backend defaults to MP3.
fn sniff_mime_type(data: &[u8]) -> &'static str {
    if data.starts_with(b"RIFF") {
        "audio/wav"
    } else if data.starts_with(b"OggS") {
        "audio/ogg"
    } else if data.starts_with(b"fLaC") {
        "audio/flac"
    } else {
        "audio/mpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_is_idempotent() {
        let resource = AudioResource::new(Bytes::from_static(b"ID3abc"));
        assert!(!resource.is_released());
        assert!(resource.release());
        assert!(!resource.release());
        assert!(resource.clone().is_released());
    }

    #[test]
    fn test_mime_sniffing() {
        assert_eq!(AudioResource::new(Bytes::from_static(b"RIFF....")).mime_type(), "audio/wav");
        assert_eq!(AudioResource::new(Bytes::from_static(b"OggS....")).mime_type(), "audio/ogg");
        assert_eq!(AudioResource::new(Bytes::from_static(b"\xff\xfb")).mime_type(), "audio/mpeg");
    }

    #[test]
    fn test_ids_are_unique() {
        let a = AudioResource::new(Bytes::from_static(b"a"));
        let b = AudioResource::new(Bytes::from_static(b"a"));
        assert_ne!(a.id(), b.id());
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }
}
