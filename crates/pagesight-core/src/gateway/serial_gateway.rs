//! Serial embedding gateway implementation.
//!
//! A single dedicated thread owns the embedding model and processes requests
//! one at a time from a priority queue. This is the only place in the crate
//! where model inference happens.

use super::error::GatewayError;
use super::scheduler::EmbeddingGateway;
use super::types::{EmbedInput, EmbedOutput, GatewayStats, Priority};
use crate::embedding::{MultiVector, PageEmbedder, PageEmbedding};
use crate::error::EmbeddingError;
use crate::metrics::global_metrics;
use async_trait::async_trait;
use image::RgbImage;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Serial embedding gateway - single thread owns the model.
///
/// # Thread Safety
///
/// - Worker thread: sole owner of the embedder and the priority queue
/// - Callers: only send jobs over the channel and await a oneshot response
///
/// # Example
///
/// ```ignore
/// let gateway = SerialGateway::start(
///     move || Ok(Box::new(HttpPageEmbedder::new(config)?) as Box<dyn PageEmbedder>),
///     Duration::from_secs(30),
/// )
/// .await?;
///
/// let vectors = gateway.embed_query("quarterly revenue").await?;
/// ```
pub struct SerialGateway {
    /// Channel to send jobs to the worker thread
    tx: mpsc::Sender<EmbedJob>,
    /// Statistics shared with the worker
    stats: Arc<GatewayStatsInner>,
    /// Admission deadline applied to every new request
    admission_timeout: Duration,
}

/// A queued embedding request as seen by the worker.
struct EmbedJob {
    input: EmbedInput,
    enqueued_at: Instant,
    deadline: Instant,
    state: JobState,
    response: oneshot::Sender<Result<EmbedOutput, GatewayError>>,
}

const QUEUED: u8 = 0;
const STARTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Lifecycle of a request, shared by the worker and the caller.
///
/// Moves out of `QUEUED` exactly once: the worker claims it (`STARTED`) or
/// the caller withdraws it (`ABANDONED`). Whichever side loses the exchange
/// yields to the other.
#[derive(Clone)]
struct JobState(Arc<AtomicU8>);

impl JobState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(QUEUED)))
    }

    /// Worker side. False if the caller already gave up on the request.
    fn try_start(&self) -> bool {
        self.0
            .compare_exchange(QUEUED, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Caller side. False if the worker already started the request.
    fn try_abandon(&self) -> bool {
        self.0
            .compare_exchange(QUEUED, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_started(&self) -> bool {
        self.0.load(Ordering::Acquire) == STARTED
    }
}

/// Wrapper for priority queue ordering.
struct PrioritizedJob {
    priority: Priority,
    sequence: u64, // For FIFO within same priority
    job: EmbedJob,
}

impl PartialEq for PrioritizedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for PrioritizedJob {}

impl PartialOrd for PrioritizedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap: the lower priority value and the lower
        // sequence must compare as "greater" to pop first.
        match other.priority.cmp(&self.priority) {
            std::cmp::Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

/// Internal statistics tracking.
struct GatewayStatsInner {
    queue_depth: AtomicUsize,
    requests_completed: AtomicU64,
    requests_timed_out: AtomicU64,
    requests_cancelled: AtomicU64,
}

impl GatewayStatsInner {
    fn new() -> Self {
        Self {
            queue_depth: AtomicUsize::new(0),
            requests_completed: AtomicU64::new(0),
            requests_timed_out: AtomicU64::new(0),
            requests_cancelled: AtomicU64::new(0),
        }
    }

    fn to_stats(&self) -> GatewayStats {
        GatewayStats {
            gateway_name: "SerialGateway",
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            requests_completed: self.requests_completed.load(Ordering::Relaxed),
            requests_timed_out: self.requests_timed_out.load(Ordering::Relaxed),
            requests_cancelled: self.requests_cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a submitted embedding request.
///
/// The request is already in the admission queue when this handle exists.
/// Dropping the handle before the worker starts the request cancels it;
/// dropping it afterwards only discards the result.
pub struct PendingEmbedding {
    response: oneshot::Receiver<Result<EmbedOutput, GatewayError>>,
    state: JobState,
    enqueued_at: Instant,
    deadline: Instant,
    priority: Priority,
}

impl PendingEmbedding {
    /// Priority class the request was admitted with.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Whether the worker has started computing this request.
    pub fn has_started(&self) -> bool {
        self.state.is_started()
    }

    /// Waits for the result.
    ///
    /// If the admission deadline passes while the request is still queued,
    /// returns `GatewayError::Timeout` and the request is withdrawn; the
    /// worker will never run it. If the computation has already started it is
    /// not preemptible, so this keeps waiting for it to finish.
    pub async fn wait(mut self) -> Result<EmbedOutput, GatewayError> {
        let deadline = tokio::time::Instant::from_std(self.deadline);
        match tokio::time::timeout_at(deadline, &mut self.response).await {
            Ok(received) => flatten_response(received),
            Err(_) if self.state.try_abandon() => Err(GatewayError::Timeout {
                waited_ms: self.enqueued_at.elapsed().as_millis() as u64,
            }),
            Err(_) => flatten_response((&mut self.response).await),
        }
    }

    /// Waits for a page embedding result.
    pub async fn wait_page(self) -> Result<PageEmbedding, GatewayError> {
        match self.wait().await? {
            EmbedOutput::Page(embedding) => Ok(embedding),
            EmbedOutput::Query(_) => Err(GatewayError::UnexpectedOutput),
        }
    }

    /// Waits for a query embedding result.
    pub async fn wait_query(self) -> Result<MultiVector, GatewayError> {
        match self.wait().await? {
            EmbedOutput::Query(vectors) => Ok(vectors),
            EmbedOutput::Page(_) => Err(GatewayError::UnexpectedOutput),
        }
    }
}

impl Drop for PendingEmbedding {
    fn drop(&mut self) {
        self.state.try_abandon();
    }
}

fn flatten_response(
    received: Result<Result<EmbedOutput, GatewayError>, oneshot::error::RecvError>,
) -> Result<EmbedOutput, GatewayError> {
    received.map_err(|e| GatewayError::ResponseFailed(e.to_string()))?
}

impl SerialGateway {
    /// Start the gateway.
    ///
    /// Spawns a dedicated OS thread, builds the embedder on it with `factory`
    /// and waits until construction finishes. The thread runs until the
    /// gateway is dropped and its queue is drained.
    ///
    /// # Errors
    ///
    /// - `GatewayError::ThreadSpawnFailed` if thread creation fails
    /// - `GatewayError::ModelInit` if the factory fails
    pub async fn start<F>(factory: F, admission_timeout: Duration) -> Result<Self, GatewayError>
    where
        F: FnOnce() -> Result<Box<dyn PageEmbedder>, EmbeddingError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let stats = Arc::new(GatewayStatsInner::new());
        let stats_clone = stats.clone();

        thread::Builder::new()
            .name("embedding-gateway".to_string())
            .spawn(move || {
                let embedder = match factory() {
                    Ok(embedder) => {
                        let _ = ready_tx.send(Ok(()));
                        embedder
                    }
                    Err(e) => {
                        warn!("Embedding model failed to initialize: {}", e);
                        let _ = ready_tx.send(Err(GatewayError::ModelInit(e)));
                        return;
                    }
                };
                Self::worker_loop(embedder.as_ref(), rx, stats_clone);
            })
            .map_err(|e| GatewayError::ThreadSpawnFailed(e.to_string()))?;

        ready_rx
            .await
            .map_err(|e| GatewayError::ResponseFailed(e.to_string()))??;

        info!(
            "Embedding gateway initialized (admission timeout {:?})",
            admission_timeout
        );

        Ok(Self {
            tx,
            stats,
            admission_timeout,
        })
    }

    /// Admission deadline applied to new requests.
    pub fn admission_timeout(&self) -> Duration {
        self.admission_timeout
    }

    /// Enqueues a page embedding at background priority.
    pub fn submit_page(&self, image: Arc<RgbImage>) -> Result<PendingEmbedding, GatewayError> {
        self.submit(EmbedInput::Page(image))
    }

    /// Enqueues a query embedding at immediate priority.
    pub fn submit_query(&self, text: impl Into<String>) -> Result<PendingEmbedding, GatewayError> {
        self.submit(EmbedInput::Query(text.into()))
    }

    fn submit(&self, input: EmbedInput) -> Result<PendingEmbedding, GatewayError> {
        let (response_tx, response_rx) = oneshot::channel();
        let state = JobState::new();
        let enqueued_at = Instant::now();
        let deadline = enqueued_at + self.admission_timeout;
        let priority = input.priority();

        self.stats.queue_depth.fetch_add(1, Ordering::Relaxed);
        let sent = self.tx.send(EmbedJob {
            input,
            enqueued_at,
            deadline,
            state: state.clone(),
            response: response_tx,
        });
        if sent.is_err() {
            self.stats.queue_depth.fetch_sub(1, Ordering::Relaxed);
            return Err(GatewayError::ChannelDisconnected);
        }

        Ok(PendingEmbedding {
            response: response_rx,
            state,
            enqueued_at,
            deadline,
            priority,
        })
    }

    /// Worker thread main loop.
    fn worker_loop(
        embedder: &dyn PageEmbedder,
        rx: mpsc::Receiver<EmbedJob>,
        stats: Arc<GatewayStatsInner>,
    ) {
        info!("Embedding gateway worker thread started");

        let mut queue: BinaryHeap<PrioritizedJob> = BinaryHeap::new();
        let mut sequence: u64 = 0;
        let mut disconnected = false;

        loop {
            // Phase 1: Drain channel into priority queue (non-blocking)
            while !disconnected {
                match rx.try_recv() {
                    Ok(job) => Self::enqueue(&mut queue, &mut sequence, job),
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => disconnected = true,
                }
            }

            // Phase 2: Process highest priority request
            if let Some(PrioritizedJob { job, .. }) = queue.pop() {
                stats.queue_depth.fetch_sub(1, Ordering::Relaxed);
                Self::run_job(embedder, job, &stats);
                let snapshot = stats.to_stats();
                global_metrics()
                    .update_gateway_stats(snapshot.queue_depth, snapshot.requests_completed);
            } else if disconnected {
                info!("Embedding gateway channel disconnected, shutting down");
                return;
            } else {
                // No work available, block waiting for next request
                match rx.recv() {
                    Ok(job) => Self::enqueue(&mut queue, &mut sequence, job),
                    Err(_) => disconnected = true,
                }
            }
        }
    }

    fn enqueue(queue: &mut BinaryHeap<PrioritizedJob>, sequence: &mut u64, job: EmbedJob) {
        queue.push(PrioritizedJob {
            priority: job.input.priority(),
            sequence: *sequence,
            job,
        });
        *sequence = sequence.wrapping_add(1);
    }

    /// Runs one job unless it was cancelled or missed its deadline.
    fn run_job(embedder: &dyn PageEmbedder, job: EmbedJob, stats: &GatewayStatsInner) {
        let EmbedJob {
            input,
            enqueued_at,
            deadline,
            state,
            response,
        } = job;
        let priority = input.priority();

        if response.is_closed() {
            stats.requests_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!("Skipping cancelled {:?} request", priority);
            return;
        }

        let waited = enqueued_at.elapsed();
        if Instant::now() >= deadline {
            stats.requests_timed_out.fetch_add(1, Ordering::Relaxed);
            warn!(
                "{:?} request missed its admission deadline after {:?}",
                priority, waited
            );
            let _ = response.send(Err(GatewayError::Timeout {
                waited_ms: waited.as_millis() as u64,
            }));
            return;
        }

        if !state.try_start() {
            stats.requests_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!("Skipping {:?} request withdrawn by its caller", priority);
            return;
        }

        let inference_start = Instant::now();
        let result = match &input {
            EmbedInput::Page(image) => embedder.embed_page(image).map(EmbedOutput::Page),
            EmbedInput::Query(text) => embedder.embed_query(text).map(EmbedOutput::Query),
        }
        .map_err(GatewayError::Embedding);
        let inference = inference_start.elapsed();

        stats.requests_completed.fetch_add(1, Ordering::Relaxed);
        global_metrics().record_gateway_request(
            waited.as_secs_f64() * 1000.0,
            inference.as_secs_f64() * 1000.0,
        );
        debug!(
            "Processed {:?} request (waited {:?}, inference {:?}, ok: {})",
            priority,
            waited,
            inference,
            result.is_ok()
        );

        if response.send(result).is_err() {
            debug!("Caller went away during {:?} embedding; result discarded", priority);
        }
    }
}

#[async_trait]
impl EmbeddingGateway for SerialGateway {
    async fn embed_page(&self, image: Arc<RgbImage>) -> Result<PageEmbedding, GatewayError> {
        self.submit_page(image)?.wait_page().await
    }

    async fn embed_query(&self, text: &str) -> Result<MultiVector, GatewayError> {
        self.submit_query(text)?.wait_query().await
    }

    fn stats(&self) -> GatewayStats {
        self.stats.to_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{solid_page, GatedEmbedder, PixelEmbedder};

    fn job(priority: Priority) -> EmbedJob {
        let (response, _) = oneshot::channel();
        let input = match priority {
            Priority::Immediate => EmbedInput::Query("q".to_string()),
            Priority::Background => EmbedInput::Page(Arc::new(RgbImage::new(1, 1))),
        };
        EmbedJob {
            input,
            enqueued_at: Instant::now(),
            deadline: Instant::now(),
            state: JobState::new(),
            response,
        }
    }

    fn prioritized(priority: Priority, sequence: u64) -> PrioritizedJob {
        PrioritizedJob {
            priority,
            sequence,
            job: job(priority),
        }
    }

    #[test]
    fn test_priority_queue_ordering() {
        let mut heap = BinaryHeap::new();
        heap.push(prioritized(Priority::Background, 0));
        heap.push(prioritized(Priority::Immediate, 1));

        assert_eq!(heap.pop().unwrap().priority, Priority::Immediate);
        assert_eq!(heap.pop().unwrap().priority, Priority::Background);
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut heap = BinaryHeap::new();
        heap.push(prioritized(Priority::Immediate, 0));
        heap.push(prioritized(Priority::Immediate, 1));
        heap.push(prioritized(Priority::Immediate, 2));

        assert_eq!(heap.pop().unwrap().sequence, 0);
        assert_eq!(heap.pop().unwrap().sequence, 1);
        assert_eq!(heap.pop().unwrap().sequence, 2);
    }

    async fn gated_gateway(timeout: Duration) -> (SerialGateway, crate::test_utils::GateControl) {
        let (control, embedder) = GatedEmbedder::new();
        let gateway = SerialGateway::start(
            move || Ok(Box::new(embedder) as Box<dyn PageEmbedder>),
            timeout,
        )
        .await
        .unwrap();
        (gateway, control)
    }

    #[tokio::test]
    async fn test_query_overtakes_queued_page() {
        let (gateway, control) = gated_gateway(Duration::from_secs(5)).await;

        let running = gateway.submit_page(Arc::new(solid_page(4, 4, [1, 0, 0]))).unwrap();
        control.wait_entered();

        let queued_page = gateway.submit_page(Arc::new(solid_page(4, 4, [2, 0, 0]))).unwrap();
        let query_a = gateway.submit_query("a").unwrap();
        let query_b = gateway.submit_query("b").unwrap();
        control.release();

        running.wait_page().await.unwrap();
        query_a.wait_query().await.unwrap();
        query_b.wait_query().await.unwrap();
        queued_page.wait_page().await.unwrap();

        assert_eq!(control.log(), vec!["page:1", "query:a", "query:b", "page:2"]);
        assert_eq!(gateway.stats().requests_completed, 4);
    }

    #[tokio::test]
    async fn test_queued_request_times_out_without_running() {
        let (gateway, control) = gated_gateway(Duration::from_millis(100)).await;

        let running = gateway.submit_page(Arc::new(solid_page(4, 4, [1, 0, 0]))).unwrap();
        control.wait_entered();

        let late = gateway.submit_query("late").unwrap();
        let result = late.wait_query().await;
        assert!(matches!(result, Err(GatewayError::Timeout { .. })));

        // The running page outlives its deadline but is not preempted.
        control.release();
        assert!(running.wait_page().await.is_ok());

        let fresh = gateway.submit_query("fresh").unwrap();
        fresh.wait_query().await.unwrap();

        assert_eq!(control.log(), vec!["page:1", "query:fresh"]);
        let stats = gateway.stats();
        assert_eq!(stats.requests_cancelled + stats.requests_timed_out, 1);
        assert_eq!(stats.queue_depth, 0);
    }

    #[tokio::test]
    async fn test_dropped_request_is_cancelled() {
        let (gateway, control) = gated_gateway(Duration::from_secs(5)).await;

        let running = gateway.submit_page(Arc::new(solid_page(4, 4, [1, 0, 0]))).unwrap();
        control.wait_entered();

        let dropped = gateway.submit_query("dropped").unwrap();
        let kept = gateway.submit_query("kept").unwrap();
        drop(dropped);
        control.release();

        running.wait_page().await.unwrap();
        kept.wait_query().await.unwrap();

        assert_eq!(control.log(), vec!["page:1", "query:kept"]);
        assert_eq!(gateway.stats().requests_cancelled, 1);
    }

    #[test]
    fn test_withdrawn_job_is_never_run() {
        let (response, mut receiver) = oneshot::channel();
        let state = JobState::new();
        assert!(state.try_abandon());
        let job = EmbedJob {
            input: EmbedInput::Query("1,0,0".to_string()),
            enqueued_at: Instant::now(),
            deadline: Instant::now() + Duration::from_secs(60),
            state: state.clone(),
            response,
        };
        let stats = GatewayStatsInner::new();

        SerialGateway::run_job(&PixelEmbedder, job, &stats);

        assert!(!state.is_started());
        assert!(receiver.try_recv().is_err());
        let stats = stats.to_stats();
        assert_eq!(stats.requests_completed, 0);
        assert_eq!(stats.requests_cancelled, 1);
    }

    type Reply = oneshot::Sender<Result<EmbedOutput, GatewayError>>;

    /// A handle whose deadline has already passed.
    fn expired_handle(state: JobState) -> (PendingEmbedding, Reply) {
        let (response_tx, response_rx) = oneshot::channel();
        let now = Instant::now();
        let pending = PendingEmbedding {
            response: response_rx,
            state,
            enqueued_at: now,
            deadline: now,
            priority: Priority::Immediate,
        };
        (pending, response_tx)
    }

    #[tokio::test]
    async fn test_timeout_withdraws_queued_request() {
        let state = JobState::new();
        let (pending, _response) = expired_handle(state.clone());

        let result = pending.wait_query().await;

        assert!(matches!(result, Err(GatewayError::Timeout { .. })));
        assert!(!state.try_start());
    }

    #[tokio::test]
    async fn test_started_request_is_awaited_past_deadline() {
        let state = JobState::new();
        let (pending, response) = expired_handle(state.clone());
        assert!(state.try_start());

        let waiter = tokio::spawn(pending.wait_query());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let vectors = MultiVector::new(vec![1.0, 0.0], 2).unwrap();
        assert!(response.send(Ok(EmbedOutput::Query(vectors))).is_ok());

        let received = waiter.await.unwrap().unwrap();
        assert_eq!(received.rows(), 1);
    }

    #[tokio::test]
    async fn test_model_init_failure() {
        let result = SerialGateway::start(
            || Err(EmbeddingError::ModelUnavailable("no weights".to_string())),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(GatewayError::ModelInit(_))));
    }

    #[tokio::test]
    async fn test_embedding_error_propagates() {
        let gateway = SerialGateway::start(
            || Ok(Box::new(PixelEmbedder) as Box<dyn PageEmbedder>),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let result = gateway.embed_query("not a vector").await;
        assert!(matches!(
            result,
            Err(GatewayError::Embedding(EmbeddingError::InvalidInput(_)))
        ));

        let vectors = gateway.embed_query("1,0,0|0,1,0").await.unwrap();
        assert_eq!(vectors.rows(), 2);
    }
}
