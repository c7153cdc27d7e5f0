//! Deterministic fakes shared by unit tests.

use crate::answer::{AnswerGenerator, ContextPage, ConversationTurn, TokenStream};
use crate::embedding::{MultiVector, PageEmbedder, PageEmbedding, PatchGrid};
use crate::error::{AnswerError, EmbeddingError, OcrError};
use crate::gateway::{EmbeddingGateway, GatewayError, GatewayStats};
use crate::ocr::{OcrBox, OcrEngine};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use image::{Rgb, RgbImage};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// A page filled with one colour.
pub fn solid_page(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

/// Embeds pages on a 2x2 grid, each patch vector being the mean colour of
/// its quadrant scaled to 0..1. Queries are written as `r,g,b|r,g,b`, one
/// token per `|`-separated triple; blank text embeds to zero tokens.
pub struct PixelEmbedder;

impl PageEmbedder for PixelEmbedder {
    fn embed_page(&self, image: &RgbImage) -> Result<PageEmbedding, EmbeddingError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EmbeddingError::InvalidInput("empty page".to_string()));
        }
        let grid = PatchGrid::new(2, 2, image.width(), image.height());
        let mut data = Vec::with_capacity(grid.len() * 3);
        for i in 0..grid.len() {
            let rect = grid
                .patch_rect(i)
                .ok_or_else(|| EmbeddingError::InferenceFailed("bad patch".to_string()))?;
            let mut sum = [0.0f32; 3];
            let mut count = 0.0f32;
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    let Rgb(p) = *image.get_pixel(x, y);
                    for c in 0..3 {
                        sum[c] += p[c] as f32 / 255.0;
                    }
                    count += 1.0;
                }
            }
            for value in sum {
                data.push(if count > 0.0 { value / count } else { 0.0 });
            }
        }
        Ok(PageEmbedding {
            patches: MultiVector::new(data, 3)?,
            grid,
        })
    }

    fn embed_query(&self, text: &str) -> Result<MultiVector, EmbeddingError> {
        if text.trim().is_empty() {
            return Ok(MultiVector::empty(3));
        }
        let rows = text
            .split('|')
            .map(|token| {
                token
                    .split(',')
                    .map(|v| v.trim().parse::<f32>())
                    .collect::<Result<Vec<f32>, _>>()
                    .map_err(|e| EmbeddingError::InvalidInput(format!("{}: {}", token, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if rows.iter().any(|r| r.len() != 3) {
            return Err(EmbeddingError::InvalidInput(
                "query tokens must have 3 components".to_string(),
            ));
        }
        MultiVector::from_rows(rows)
    }
}

/// Test-side handle of a [`GatedEmbedder`].
pub struct GateControl {
    entered: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
    log: Arc<Mutex<Vec<String>>>,
}

impl GateControl {
    /// Blocks until the embedder's first call has started.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(5))
            .expect("gated embedder was never entered");
    }

    /// Lets the first call finish.
    pub fn release(&self) {
        let _ = self.release.send(());
    }

    /// Labels of every executed request, in execution order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

/// [`PixelEmbedder`] whose first call blocks until released, so tests can
/// queue requests behind a running one.
///
/// Executed requests are logged as `page:<red of pixel (0,0)>` or
/// `query:<text>`.
pub struct GatedEmbedder {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
    first: Cell<bool>,
    log: Arc<Mutex<Vec<String>>>,
}

impl GatedEmbedder {
    pub fn new() -> (GateControl, GatedEmbedder) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            GateControl {
                entered: entered_rx,
                release: release_tx,
                log: log.clone(),
            },
            GatedEmbedder {
                entered: entered_tx,
                release: release_rx,
                first: Cell::new(true),
                log,
            },
        )
    }

    fn gate(&self, label: String) {
        self.log.lock().unwrap().push(label);
        if self.first.replace(false) {
            let _ = self.entered.send(());
            let _ = self.release.recv_timeout(Duration::from_secs(5));
        }
    }
}

impl PageEmbedder for GatedEmbedder {
    fn embed_page(&self, image: &RgbImage) -> Result<PageEmbedding, EmbeddingError> {
        self.gate(format!("page:{}", image.get_pixel(0, 0).0[0]));
        PixelEmbedder.embed_page(image)
    }

    fn embed_query(&self, text: &str) -> Result<MultiVector, EmbeddingError> {
        self.gate(format!("query:{}", text));
        PixelEmbedder.embed_query(text)
    }
}

/// Async gate for interleaving tests: every `pass` parks until `release`,
/// after which the gate stays open.
#[derive(Default)]
pub struct AsyncGate {
    entered: Notify,
    opened: Notify,
    open: AtomicBool,
}

impl AsyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pass(&self) {
        let opened = self.opened.notified();
        if self.open.load(Ordering::SeqCst) {
            return;
        }
        self.entered.notify_one();
        opened.await;
    }

    /// Resolves once some caller is parked in `pass`.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.opened.notify_waiters();
    }
}

/// Gateway that embeds inline with [`PixelEmbedder`], counting calls.
#[derive(Default)]
pub struct StaticGateway {
    page_calls: AtomicUsize,
    query_calls: AtomicUsize,
    failing_red: Option<u8>,
    page_gate: Option<Arc<AsyncGate>>,
    query_gate: Option<Arc<AsyncGate>>,
}

impl StaticGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every page whose pixel (0,0) has this red value fail to embed.
    pub fn fail_pages_with_red(mut self, red: u8) -> Self {
        self.failing_red = Some(red);
        self
    }

    /// Parks every page embedding at `gate`.
    pub fn with_page_gate(mut self, gate: Arc<AsyncGate>) -> Self {
        self.page_gate = Some(gate);
        self
    }

    /// Parks every query embedding at `gate`.
    pub fn with_query_gate(mut self, gate: Arc<AsyncGate>) -> Self {
        self.query_gate = Some(gate);
        self
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingGateway for StaticGateway {
    async fn embed_page(&self, image: Arc<RgbImage>) -> Result<PageEmbedding, GatewayError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.page_gate {
            gate.pass().await;
        }
        if Some(image.get_pixel(0, 0).0[0]) == self.failing_red {
            return Err(GatewayError::Embedding(EmbeddingError::InferenceFailed(
                "scripted failure".to_string(),
            )));
        }
        PixelEmbedder
            .embed_page(&image)
            .map_err(GatewayError::Embedding)
    }

    async fn embed_query(&self, text: &str) -> Result<MultiVector, GatewayError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.query_gate {
            gate.pass().await;
        }
        PixelEmbedder
            .embed_query(text)
            .map_err(GatewayError::Embedding)
    }

    fn stats(&self) -> GatewayStats {
        GatewayStats {
            gateway_name: "StaticGateway",
            requests_completed: (self.page_calls() + self.query_calls()) as u64,
            ..GatewayStats::default()
        }
    }
}

/// OCR engine returning fixed boxes for every page.
pub struct FakeOcr {
    boxes: Vec<OcrBox>,
    calls: AtomicUsize,
    gate: Option<Arc<AsyncGate>>,
}

impl FakeOcr {
    pub fn new(boxes: Vec<OcrBox>) -> Self {
        Self {
            boxes,
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Parks every detection at `gate`.
    pub fn with_gate(mut self, gate: Arc<AsyncGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for FakeOcr {
    async fn detect(&self, _image: &RgbImage) -> Result<Vec<OcrBox>, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        Ok(self.boxes.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// OCR engine that always fails.
pub struct FailingOcr;

#[async_trait]
impl OcrEngine for FailingOcr {
    async fn detect(&self, _image: &RgbImage) -> Result<Vec<OcrBox>, OcrError> {
        Err(OcrError::Unavailable("no OCR in tests".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Answer service returning a fixed answer and summary.
///
/// Streams the answer split after each space.
pub struct ScriptedGenerator {
    answer: String,
    summary: String,
    fail: bool,
    summary_calls: AtomicUsize,
    last_query: Mutex<Option<String>>,
    last_context: Mutex<Vec<(u64, u32)>>,
}

impl ScriptedGenerator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            summary: String::new(),
            fail: false,
            summary_calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
            last_context: Mutex::new(Vec::new()),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Makes answer generation fail with a 503.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }

    /// `(document, page)` of the context pages of the last call.
    pub fn last_context(&self) -> Vec<(u64, u32)> {
        self.last_context.lock().unwrap().clone()
    }

    fn record(&self, query: &str, context: &[ContextPage]) -> Result<(), AnswerError> {
        *self.last_query.lock().unwrap() = Some(query.to_string());
        *self.last_context.lock().unwrap() = context
            .iter()
            .map(|c| (c.document_id.as_u64(), c.page_number))
            .collect();
        if self.fail {
            return Err(AnswerError::Status {
                status: 503,
                body: "overloaded".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    async fn summarize(&self, _turns: &[ConversationTurn]) -> Result<String, AnswerError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.summary.clone())
    }

    async fn generate(&self, query: &str, context: &[ContextPage]) -> Result<String, AnswerError> {
        self.record(query, context)?;
        Ok(self.answer.clone())
    }

    async fn generate_stream(
        &self,
        query: &str,
        context: &[ContextPage],
    ) -> Result<TokenStream, AnswerError> {
        self.record(query, context)?;
        let tokens: Vec<Result<String, AnswerError>> = self
            .answer
            .split_inclusive(' ')
            .map(|t| Ok(t.to_string()))
            .collect();
        Ok(stream::iter(tokens).boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
