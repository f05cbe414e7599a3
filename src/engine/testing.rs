//! In-memory probe for classifier and session tests.

use super::metadata::{MetadataProbe, MultiframeModule, SopCommonModule};
use super::ImageLocator;
use crate::error::EngineError;
use crate::model::UploadedFile;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    sop_class_uid: Option<String>,
    multiframe_frames: Option<u32>,
    direct_frames: Option<u32>,
    fail: bool,
    gate: Option<Arc<Notify>>,
    loads: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeProbe {
    inner: Arc<Inner>,
}

impl FakeProbe {
    pub fn with_metadata(
        sop_class_uid: Option<&str>,
        multiframe_frames: Option<u32>,
        direct_frames: Option<u32>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                sop_class_uid: sop_class_uid.map(str::to_string),
                multiframe_frames,
                direct_frames,
                ..Default::default()
            }),
        }
    }

    pub fn failing() -> Self {
        Self {
            inner: Arc::new(Inner {
                fail: true,
                ..Default::default()
            }),
        }
    }

    /// A probe whose `load_metadata` waits until the returned notifier fires.
    pub fn gated(multiframe_frames: u32) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let probe = Self {
            inner: Arc::new(Inner {
                multiframe_frames: Some(multiframe_frames),
                gate: Some(Arc::clone(&gate)),
                ..Default::default()
            }),
        };
        (probe, gate)
    }

    pub fn loads(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }
}

impl MetadataProbe for FakeProbe {
    fn register_file(&self, file: &UploadedFile) -> ImageLocator {
        ImageLocator(format!("fake:{}", file.id()))
    }

    fn load_metadata(
        &self,
        _locator: &ImageLocator,
    ) -> impl Future<Output = Result<(), EngineError>> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            inner.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &inner.gate {
                gate.notified().await;
            }
            if inner.fail {
                Err(EngineError::Decode(String::from("unsupported probe")))
            } else {
                Ok(())
            }
        }
    }

    fn sop_common_module(&self, _locator: &ImageLocator) -> Option<SopCommonModule> {
        self.inner
            .sop_class_uid
            .as_ref()
            .map(|uid| SopCommonModule {
                sop_class_uid: uid.clone(),
                sop_instance_uid: None,
            })
    }

    fn multiframe_module(&self, _locator: &ImageLocator) -> Option<MultiframeModule> {
        self.inner
            .multiframe_frames
            .map(|number_of_frames| MultiframeModule {
                number_of_frames,
                frame_time_ms: None,
            })
    }

    fn number_of_frames(&self, _locator: &ImageLocator) -> Option<u32> {
        self.inner.direct_frames
    }
}
