//! Asynchronous title recognition.
//!
//! Optical recognition is the one operation too slow to run on the frame
//! loop, so it is pushed onto a single worker thread. The loop submits a
//! request at most once per play cycle and polls the returned handle each
//! frame; it never blocks. A handle carries the generation of the aggregate
//! record that issued it, so a result that arrives after the record was
//! reset is recognized as stale and dropped instead of contaminating the
//! next play.

pub mod preprocess;
pub mod tesseract;

use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::JoinHandle;

use anyhow::{Context, Result, bail};
use image::GrayImage;
use tracing::{debug, warn};

use crate::types::OcrTitles;

/// Language profile for a recognition request. The game renders titles in
/// two scripts; both are read and kept separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrLanguage {
    English,
    Japanese,
}

/// Whether the backend should expect a line of text or one glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    Line,
    SingleGlyph,
}

/// The recognition collaborator. Implementations run on the worker thread.
pub trait OcrBackend: Send {
    fn recognize(&self, image: &GrayImage, language: OcrLanguage, mode: OcrMode)
    -> Result<String>;
}

struct TitleJob {
    title: GrayImage,
    artist: GrayImage,
    generation: u64,
    respond_to: Sender<Result<OcrTitles>>,
}

/// Single-worker executor for title reads.
pub struct TitleReader {
    jobs: Option<Sender<TitleJob>>,
    worker: Option<JoinHandle<()>>,
}

impl TitleReader {
    /// Spawns the worker thread that owns the backend.
    pub fn new(backend: Box<dyn OcrBackend>) -> Self {
        let (jobs, job_queue) = channel::<TitleJob>();
        let worker = std::thread::Builder::new()
            .name("title-ocr".into())
            .spawn(move || run_worker(backend, job_queue))
            .expect("failed to spawn OCR worker thread");
        Self { jobs: Some(jobs), worker: Some(worker) }
    }

    /// Queues one title/artist read and returns the handle to poll.
    ///
    /// `generation` identifies the aggregate record issuing the request;
    /// the consumer checks it before trusting the result.
    pub fn submit(&self, title: GrayImage, artist: GrayImage, generation: u64) -> TitleHandle {
        let (respond_to, result) = channel();
        let job = TitleJob { title, artist, generation, respond_to };
        if let Some(jobs) = &self.jobs {
            // a send failure means the worker died; the handle then simply
            // never settles, which the commit-readiness check treats as
            // incomplete
            if jobs.send(job).is_err() {
                warn!("OCR worker is gone, title request dropped");
            }
        }
        TitleHandle { generation, result, settled_empty: false }
    }
}

impl Drop for TitleReader {
    fn drop(&mut self) {
        // closing the job channel lets the worker drain and exit
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(backend: Box<dyn OcrBackend>, jobs: Receiver<TitleJob>) {
    debug!("OCR worker started");
    while let Ok(job) = jobs.recv() {
        debug!(generation = job.generation, "OCR worker: reading title strips");
        let outcome = read_titles(backend.as_ref(), &job.title, &job.artist);
        // the requesting record may have been reset meanwhile; a dropped
        // receiver is expected, not an error
        let _ = job.respond_to.send(outcome);
    }
    debug!("OCR worker: channel closed, exiting");
}

/// Reads both strips under both language profiles.
///
/// All four readings coming back empty means the strips held no legible
/// text at all; that is reported as an error so the poll side can log it.
fn read_titles(
    backend: &dyn OcrBackend,
    title: &GrayImage,
    artist: &GrayImage,
) -> Result<OcrTitles> {
    let titles = OcrTitles {
        en_title: recognize_trimmed(backend, title, OcrLanguage::English)?,
        en_artist: recognize_trimmed(backend, artist, OcrLanguage::English)?,
        jp_title: recognize_trimmed(backend, title, OcrLanguage::Japanese)?,
        jp_artist: recognize_trimmed(backend, artist, OcrLanguage::Japanese)?,
    };
    if titles.en_title.is_empty()
        && titles.en_artist.is_empty()
        && titles.jp_title.is_empty()
        && titles.jp_artist.is_empty()
    {
        bail!("no legible text in title or artist strip");
    }
    Ok(titles)
}

fn recognize_trimmed(
    backend: &dyn OcrBackend,
    image: &GrayImage,
    language: OcrLanguage,
) -> Result<String> {
    let text = backend
        .recognize(image, language, OcrMode::Line)
        .context("OCR backend failed")?;
    Ok(text.trim().to_string())
}

/// A pending title read. Submit once, poll every frame.
pub struct TitleHandle {
    generation: u64,
    result: Receiver<Result<OcrTitles>>,
    settled_empty: bool,
}

impl TitleHandle {
    /// The aggregate-record generation this request belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Non-blocking check for the result.
    ///
    /// Returns `None` while pending, and permanently after a backend
    /// failure; an unreadable title leaves the field unset so the record is
    /// eventually abandoned rather than mis-attributed.
    pub fn poll(&mut self) -> Option<OcrTitles> {
        if self.settled_empty {
            return None;
        }
        match self.result.try_recv() {
            Ok(Ok(titles)) => Some(titles),
            Ok(Err(error)) => {
                warn!(%error, "title OCR failed");
                self.settled_empty = true;
                None
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.settled_empty = true;
                None
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::FixedBackend;
    use super::*;
    use std::time::{Duration, Instant};

    fn poll_until_some(handle: &mut TitleHandle) -> Option<OcrTitles> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(titles) = handle.poll() {
                return Some(titles);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn submitted_job_settles_with_both_languages() {
        let reader = TitleReader::new(Box::new(FixedBackend {
            en: "GAMBOL".into(),
            jp: "ギャンボル".into(),
        }));
        let mut handle = reader.submit(GrayImage::new(8, 8), GrayImage::new(8, 8), 1);
        let titles = poll_until_some(&mut handle).expect("OCR result never arrived");
        assert_eq!(titles.en_title, "GAMBOL");
        assert_eq!(titles.jp_artist, "ギャンボル");
        assert_eq!(handle.generation(), 1);
    }

    #[test]
    fn all_empty_text_settles_as_failure() {
        let reader =
            TitleReader::new(Box::new(FixedBackend { en: "  ".into(), jp: String::new() }));
        let mut handle = reader.submit(GrayImage::new(8, 8), GrayImage::new(8, 8), 3);
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && !handle.settled_empty {
            assert!(handle.poll().is_none());
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.settled_empty);
        // a settled failure stays empty forever
        assert!(handle.poll().is_none());
    }

    #[test]
    fn dropping_the_handle_discards_the_result() {
        // the worker must tolerate responding to an abandoned request
        let reader = TitleReader::new(Box::new(FixedBackend { en: "X".into(), jp: "Y".into() }));
        let handle = reader.submit(GrayImage::new(8, 8), GrayImage::new(8, 8), 1);
        drop(handle);
        // a second request still works
        let mut handle = reader.submit(GrayImage::new(8, 8), GrayImage::new(8, 8), 2);
        assert!(poll_until_some(&mut handle).is_some());
    }
}
