//! Per-process signing session: the loaded document, the signature pad and
//! the last signed output.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capture::{Layout, SignatureRaster, Surface, SurfaceState};
use crate::compositor::Compositor;
use crate::config::Config;
use crate::error::SignError;
use crate::viewer::PagedViewer;

pub type SharedSession = Arc<Mutex<SigningSession>>;

pub struct SigningSession {
    pub config: Config,
    pub surface: Surface,
    pub viewer: PagedViewer,
    source: Option<Arc<[u8]>>,
    output: Option<Arc<[u8]>>,
    busy: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub has_document: bool,
    pub has_output: bool,
    pub busy: bool,
    pub state: SurfaceState,
    pub captures_touch: bool,
    pub surface_size: (u32, u32),
    pub layout: Layout,
    pub scale_factor: f32,
    pub ink_pixels: usize,
    pub viewer: PagedViewer,
}

/// Everything a signing run needs, detached from the session.
pub struct SigningJob {
    source: Arc<[u8]>,
    raster: SignatureRaster,
    compositor: Compositor,
}

impl SigningJob {
    pub fn raster(&self) -> &SignatureRaster {
        &self.raster
    }

    pub fn run(self) -> Result<Vec<u8>, SignError> {
        self.compositor.sign_last_page(&self.source, &self.raster.png)
    }
}

impl SigningSession {
    pub fn new(config: Config) -> anyhow::Result<SigningSession> {
        let surface = config.new_surface()?;
        Ok(SigningSession {
            config,
            surface,
            viewer: PagedViewer::default(),
            source: None,
            output: None,
            busy: false,
        })
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            has_document: self.source.is_some(),
            has_output: self.output.is_some(),
            busy: self.busy,
            state: self.surface.state(),
            captures_touch: self.surface.captures_touch(),
            surface_size: (self.surface.width(), self.surface.height()),
            layout: self.surface.layout(),
            scale_factor: self.surface.scale().factor(),
            ink_pixels: self.surface.ink_coverage(),
            viewer: self.viewer,
        }
    }

    /// Replaces the source document. The previous output no longer applies.
    ///
    /// Refused while a signing run is in flight, whose output belongs to the
    /// current document.
    pub fn load_source(&mut self, bytes: Vec<u8>) -> Result<(), SignError> {
        if self.busy {
            return Err(SignError::Busy);
        }
        log::info!("source document loaded ({} bytes)", bytes.len());
        self.source = Some(bytes.into());
        self.output = None;
        self.viewer = PagedViewer::default();
        Ok(())
    }

    pub fn output(&self) -> Option<Arc<[u8]>> {
        self.output.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Validates the inputs and snapshots them. Marks the session busy.
    pub fn begin_signing(&mut self) -> Result<SigningJob, SignError> {
        if self.busy {
            return Err(SignError::Busy);
        }
        let source = self
            .source
            .clone()
            .ok_or(SignError::MissingInput("no document selected"))?;
        if self.surface.is_blank() {
            return Err(SignError::MissingInput("the signature is empty"));
        }
        let raster = self.surface.export_png()?;
        self.busy = true;
        Ok(SigningJob {
            source,
            raster,
            compositor: self.config.compositor(),
        })
    }

    /// Stores the outcome of a run and makes the session usable again.
    pub fn finish_signing(&mut self, result: Result<(Arc<[u8]>, PagedViewer), SignError>) -> Result<PagedViewer, SignError> {
        self.busy = false;
        let (output, viewer) = result?;
        log::info!("signed document ready ({} bytes, {} pages)", output.len(), viewer.total_pages());
        self.output = Some(output);
        self.viewer = viewer;
        Ok(viewer)
    }
}

pub fn lock(session: &SharedSession) -> MutexGuard<'_, SigningSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Signs the loaded document with the current pad contents.
///
/// The inputs are captured under the lock, so strokes drawn while the run is
/// in flight do not end up in its output. Compositing itself runs on the
/// blocking pool.
pub async fn sign(session: &SharedSession) -> Result<PagedViewer, SignError> {
    let job = lock(session).begin_signing()?;
    let result = run_job(job).await;
    lock(session).finish_signing(result)
}

async fn run_job(job: SigningJob) -> Result<(Arc<[u8]>, PagedViewer), SignError> {
    let output: Arc<[u8]> = tokio::task::spawn_blocking(move || job.run())
        .await
        .map_err(|e| SignError::Serialize(format!("signing task failed: {e}")))??
        .into();
    let mut viewer = PagedViewer::default();
    viewer.load_document(output.clone()).await?;
    Ok((output, viewer))
}
