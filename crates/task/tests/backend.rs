use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swipe_config::SwipeConfig;
use swipe_core::{Bindings, Error, Result, RunId, Value};
use swipe_store::MemoryObjectStore;
use swipe_task::{
    BatchBackend, ComputeApi, HybridRunner, JobDescription, JobStatus, LogPage, RuntimeValues,
    StderrSink, SubmitJobRequest, TaskRequest, TaskRunner, Terminating,
};
use tempfile::TempDir;

const PAGE_SIZE: usize = 2;

/// One describe result plus how many log lines are visible at that point
struct Step {
    description: JobDescription,
    visible_lines: usize,
}

/// Batch service that replays a scripted sequence of job states
struct ScriptedCompute {
    steps: Vec<Step>,
    lines: Vec<String>,
    describes: AtomicUsize,
    terminates: AtomicUsize,
    log_reads: AtomicUsize,
    /// Serve every visible line from the start with no forward token
    tokenless: bool,
    submitted: Mutex<Vec<SubmitJobRequest>>,
}

impl ScriptedCompute {
    fn new(lines: &[&str]) -> Self {
        Self {
            steps: Vec::new(),
            lines: lines.iter().map(|line| line.to_string()).collect(),
            describes: AtomicUsize::new(0),
            terminates: AtomicUsize::new(0),
            log_reads: AtomicUsize::new(0),
            tokenless: false,
            submitted: Mutex::new(Vec::new()),
        }
    }

    fn without_tokens(mut self) -> Self {
        self.tokenless = true;
        self
    }

    fn step(mut self, status: JobStatus, visible_lines: usize, exit_code: Option<i32>) -> Self {
        let mut description = JobDescription::new(status);
        if status.has_logs() {
            description.log_stream_name = Some("job/default/abc".to_string());
        }
        description.exit_code = exit_code;
        self.steps.push(Step {
            description,
            visible_lines,
        });
        self
    }

    fn visible_now(&self) -> usize {
        let index = self.describes.load(Ordering::SeqCst).saturating_sub(1);
        self.steps[index.min(self.steps.len() - 1)].visible_lines
    }
}

#[async_trait]
impl ComputeApi for ScriptedCompute {
    async fn submit_job(&self, request: SubmitJobRequest) -> Result<String> {
        self.submitted.lock().push(request);
        Ok("job-1".to_string())
    }

    async fn describe_job(&self, job_id: &str) -> Result<JobDescription> {
        assert_eq!(job_id, "job-1");
        let index = self.describes.fetch_add(1, Ordering::SeqCst);
        Ok(self.steps[index.min(self.steps.len() - 1)].description.clone())
    }

    async fn terminate_job(&self, _job_id: &str, _reason: &str) -> Result<()> {
        self.terminates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_log_events(
        &self,
        log_group: &str,
        _log_stream: &str,
        next_token: Option<String>,
    ) -> Result<LogPage> {
        assert_eq!(log_group, "/aws/batch/job");
        self.log_reads.fetch_add(1, Ordering::SeqCst);
        if self.tokenless {
            return Ok(LogPage {
                events: self.lines[..self.visible_now()].to_vec(),
                next_forward_token: None,
            });
        }
        let start: usize = next_token.as_deref().map_or(0, |t| t.parse().unwrap());
        let end = (start + PAGE_SIZE).min(self.visible_now()).max(start);
        Ok(LogPage {
            events: self.lines[start..end].to_vec(),
            next_forward_token: Some(end.to_string()),
        })
    }
}

fn config() -> Arc<SwipeConfig> {
    Arc::new(
        SwipeConfig::builder()
            .upload_prefix("s3://bucket/run")
            .job_definition("swipe-job")
            .batch_queue("hello", "spot-queue")
            .passthrough_env("SFN_EXECUTION_ID", "exec-7")
            .build()
            .unwrap(),
    )
}

fn request(dir: &TempDir, step: &str) -> TaskRequest {
    let mut inputs = Bindings::new();
    inputs.insert("name", Value::String("world".into()));
    TaskRequest {
        run_id: RunId::new(["wf", step]),
        run_dir: dir.path().to_path_buf(),
        command: "echo hello".to_string(),
        inputs,
        runtime: RuntimeValues {
            memory_mib: Some(2048),
            ..RuntimeValues::default()
        },
    }
}

fn backend(compute: Arc<ScriptedCompute>, store: Arc<MemoryObjectStore>) -> BatchBackend {
    BatchBackend::new(config(), compute, store)
        .with_poll_interval(Duration::from_millis(10), Duration::from_millis(20))
}

#[tokio::test(start_paused = true)]
async fn test_successful_job_streams_every_line_once() {
    let temp_dir = TempDir::new().unwrap();
    let compute = Arc::new(
        ScriptedCompute::new(&["l1", "l2", "l3", "l4", "l5"])
            .step(JobStatus::Runnable, 0, None)
            .step(JobStatus::Running, 2, None)
            .step(JobStatus::Running, 3, None)
            .step(JobStatus::Succeeded, 5, Some(0)),
    );
    let store = Arc::new(MemoryObjectStore::new());

    let mut lines = Vec::new();
    let code = backend(compute.clone(), store)
        .run(&request(&temp_dir, "call-hello"), &|| false, &mut |line: &str| {
            lines.push(line.to_string())
        })
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(lines, vec!["l1", "l2", "l3", "l4", "l5"]);
    let stdout = std::fs::read_to_string(temp_dir.path().join("stdout.txt")).unwrap();
    assert_eq!(stdout, "l1\nl2\nl3\nl4\nl5\n");
    // the terminal state is described twice: once to see it, once more for late lines
    assert_eq!(compute.describes.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_pages_without_forward_token_end_each_read() {
    let temp_dir = TempDir::new().unwrap();
    let compute = Arc::new(
        ScriptedCompute::new(&["l1", "l2", "l3"])
            .without_tokens()
            .step(JobStatus::Running, 1, None)
            .step(JobStatus::Running, 1, None)
            .step(JobStatus::Succeeded, 3, Some(0)),
    );
    let store = Arc::new(MemoryObjectStore::new());

    let mut lines = Vec::new();
    let code = backend(compute.clone(), store)
        .run(&request(&temp_dir, "call-hello"), &|| false, &mut |line: &str| {
            lines.push(line.to_string())
        })
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(lines, vec!["l1", "l2", "l3"]);
    let stdout = std::fs::read_to_string(temp_dir.path().join("stdout.txt")).unwrap();
    assert_eq!(stdout, "l1\nl2\nl3\n");
    // one read per poll cycle
    assert_eq!(compute.log_reads.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_submission_carries_inputs_and_environment() {
    let temp_dir = TempDir::new().unwrap();
    let compute = Arc::new(ScriptedCompute::new(&[]).step(JobStatus::Succeeded, 0, Some(0)));
    let store = Arc::new(MemoryObjectStore::new());

    backend(compute.clone(), store.clone())
        .run(&request(&temp_dir, "call-hello-2"), &|| false, &mut |_: &str| {})
        .await
        .unwrap();

    assert_eq!(
        store.object("s3://bucket/run/hello/call-hello-2-input.json").unwrap(),
        bytes::Bytes::from_static(br#"{"name":"world"}"#)
    );

    let submitted = compute.submitted.lock();
    assert_eq!(submitted.len(), 1);
    let job = &submitted[0];
    assert_eq!(job.job_queue, "spot-queue");
    assert_eq!(job.job_definition, "swipe-job");
    assert_eq!(job.memory_mib, 2048);
    assert_eq!(job.vcpus, 4);
    assert_eq!(job.retry_attempts, 3);
    assert!(uuid::Uuid::parse_str(&job.job_name).is_ok());

    let env: std::collections::HashMap<_, _> = job.environment.iter().cloned().collect();
    assert_eq!(env["SFN_EXECUTION_ID"], "exec-7");
    assert_eq!(env["TASK"], "hello");
    assert_eq!(
        env["WDL_INPUT_URI"],
        "s3://bucket/run/hello/call-hello-2-input.json"
    );
    assert_eq!(
        env["WDL_OUTPUT_URI"],
        "s3://bucket/run/hello/call-hello-2-output.json"
    );
    assert!(!env.contains_key("WDL_WORKFLOW_URI"));
}

#[tokio::test(start_paused = true)]
async fn test_exit_code_fallbacks() {
    let temp_dir = TempDir::new().unwrap();

    let failed = Arc::new(ScriptedCompute::new(&[]).step(JobStatus::Failed, 0, None));
    let code = backend(failed, Arc::new(MemoryObjectStore::new()))
        .run(&request(&temp_dir, "call-hello"), &|| false, &mut |_: &str| {})
        .await
        .unwrap();
    assert_eq!(code, -1);

    let succeeded = Arc::new(ScriptedCompute::new(&[]).step(JobStatus::Succeeded, 0, None));
    let code = backend(succeeded, Arc::new(MemoryObjectStore::new()))
        .run(&request(&temp_dir, "call-hello"), &|| false, &mut |_: &str| {})
        .await
        .unwrap();
    assert_eq!(code, 1);

    let reported = Arc::new(ScriptedCompute::new(&[]).step(JobStatus::Failed, 0, Some(137)));
    let code = backend(reported, Arc::new(MemoryObjectStore::new()))
        .run(&request(&temp_dir, "call-hello"), &|| false, &mut |_: &str| {})
        .await
        .unwrap();
    assert_eq!(code, 137);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_terminates_once() {
    let temp_dir = TempDir::new().unwrap();
    let compute = Arc::new(ScriptedCompute::new(&["l1"]).step(JobStatus::Running, 1, None));
    let store = Arc::new(MemoryObjectStore::new());

    let observed = compute.clone();
    let terminating = move || observed.describes.load(Ordering::SeqCst) >= 3;
    let err = backend(compute.clone(), store)
        .run(&request(&temp_dir, "call-hello"), &terminating, &mut |_: &str| {})
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { ref job_id } if job_id == "job-1"));
    assert_eq!(compute.terminates.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unrouted_task_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let compute = Arc::new(ScriptedCompute::new(&[]).step(JobStatus::Succeeded, 0, Some(0)));
    let err = backend(compute.clone(), Arc::new(MemoryObjectStore::new()))
        .run(&request(&temp_dir, "call-goodbye"), &|| false, &mut |_: &str| {})
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration { .. }));
    assert!(compute.submitted.lock().is_empty());
}

struct CountingRunner {
    runs: AtomicUsize,
}

#[async_trait]
impl TaskRunner for CountingRunner {
    async fn run(
        &self,
        _request: &TaskRequest,
        _terminating: &Terminating<'_>,
        _stderr: &mut StderrSink<'_>,
    ) -> Result<i32> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

#[tokio::test(start_paused = true)]
async fn test_hybrid_runner_routes_by_task_name() {
    let temp_dir = TempDir::new().unwrap();
    let compute = Arc::new(ScriptedCompute::new(&[]).step(JobStatus::Succeeded, 0, Some(0)));
    let local = Arc::new(CountingRunner {
        runs: AtomicUsize::new(0),
    });
    let runner = HybridRunner::new(
        config(),
        local.clone(),
        Arc::new(backend(compute.clone(), Arc::new(MemoryObjectStore::new()))),
    );

    assert!(runner.is_remote(&RunId::new(["wf", "call-hello"])));
    assert!(!runner.is_remote(&RunId::new(["wf", "call-goodbye"])));

    runner
        .run(&request(&temp_dir, "call-goodbye"), &|| false, &mut |_: &str| {})
        .await
        .unwrap();
    assert_eq!(local.runs.load(Ordering::SeqCst), 1);
    assert!(compute.submitted.lock().is_empty());

    runner
        .run(&request(&temp_dir, "call-hello"), &|| false, &mut |_: &str| {})
        .await
        .unwrap();
    assert_eq!(local.runs.load(Ordering::SeqCst), 1);
    assert_eq!(compute.submitted.lock().len(), 1);
}
